use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use serde_json::{Map, Value};

use crate::storage::store::{FileStore, Record, StoreResult};

/// How long an issued code stays valid
pub const CODE_EXPIRY_SECONDS: i64 = 300;

/// A freshly issued verification code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of checking a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeVerification {
    /// The code matched and has been consumed
    Valid,
    /// No unused code matches the email/code pair
    UnknownOrUsed,
    /// The code matched but its validity window has passed
    Expired,
}

impl CodeVerification {
    pub fn is_valid(&self) -> bool {
        matches!(self, CodeVerification::Valid)
    }
}

/// Generate a 6-digit numeric verification code.
fn generate_code() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

/// Issue a new verification code for `email`.
///
/// Any earlier unused codes for the same address are marked used first, so
/// only the newest code can ever verify.
pub async fn create_verification_code(
    codes: &FileStore,
    email: &str,
) -> StoreResult<IssuedCode> {
    let mut stale_query = Map::new();
    stale_query.insert("email".to_string(), Value::from(email));
    stale_query.insert("used".to_string(), Value::from(false));

    for stale in codes.find(&stale_query).await? {
        if let Some(id) = stale.get("id").and_then(Value::as_i64) {
            let mut updates = Map::new();
            updates.insert("used".to_string(), Value::from(true));
            codes.update(id, updates).await?;
        }
    }

    let code = generate_code();
    let expires_at = Utc::now() + Duration::seconds(CODE_EXPIRY_SECONDS);

    let mut record = Map::new();
    record.insert("email".to_string(), Value::from(email));
    record.insert("code".to_string(), Value::from(code.clone()));
    record.insert(
        "expires_at".to_string(),
        Value::from(expires_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    record.insert("used".to_string(), Value::from(false));

    codes.create(record).await?;

    Ok(IssuedCode { code, expires_at })
}

/// Check a submitted code against the latest unused record for `email`.
///
/// The matching record is consumed whether it verifies or turns out to be
/// expired; a code can never be checked twice.
pub async fn verify_code(
    codes: &FileStore,
    email: &str,
    code: &str,
) -> StoreResult<CodeVerification> {
    let mut query = Map::new();
    query.insert("email".to_string(), Value::from(email));
    query.insert("code".to_string(), Value::from(code));
    query.insert("used".to_string(), Value::from(false));

    // Newest matching record wins; records are stored in insertion order.
    let candidate = codes.find(&query).await?.into_iter().last();
    let record = match candidate {
        Some(record) => record,
        None => return Ok(CodeVerification::UnknownOrUsed),
    };

    let id = match record.get("id").and_then(Value::as_i64) {
        Some(id) => id,
        None => return Ok(CodeVerification::UnknownOrUsed),
    };

    let mut consume = Map::new();
    consume.insert("used".to_string(), Value::from(true));
    codes.update(id, consume).await?;

    if is_expired(&record) {
        return Ok(CodeVerification::Expired);
    }

    Ok(CodeVerification::Valid)
}

/// Delete every used or expired code record. Returns how many were removed.
pub async fn cleanup_expired_codes(codes: &FileStore) -> StoreResult<usize> {
    let mut removed = 0;

    for record in codes.get_all().await? {
        let stale = record.get("used").and_then(Value::as_bool).unwrap_or(false)
            || is_expired(&record);
        if !stale {
            continue;
        }
        if let Some(id) = record.get("id").and_then(Value::as_i64) {
            if codes.delete(id).await? {
                removed += 1;
            }
        }
    }

    Ok(removed)
}

/// A record with a missing or unparseable `expires_at` counts as expired.
fn is_expired(record: &Record) -> bool {
    record
        .get("expires_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|expires_at| Utc::now() > expires_at.with_timezone(&Utc))
        .unwrap_or(true)
}
