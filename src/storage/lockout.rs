use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::storage::store::{FileStore, Record, StoreResult};

/// Failed logins allowed before the account locks
pub const MAX_FAILED_ATTEMPTS: i64 = 10;

/// How long a locked account stays locked
pub const LOCK_DURATION_HOURS: i64 = 24;

/// Result of a lock check on a user account.
#[derive(Debug, Clone, PartialEq)]
pub struct LockStatus {
    pub locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    /// Whole minutes until the lock expires, rounded up
    pub remaining_minutes: Option<i64>,
}

impl LockStatus {
    fn unlocked() -> Self {
        Self {
            locked: false,
            locked_until: None,
            remaining_minutes: None,
        }
    }
}

/// Outcome of recording one failed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub locked: bool,
    pub attempts: i64,
}

/// Check whether a user account is currently locked.
///
/// An expired lock is cleared as a side effect (the counter resets too), so
/// the next failed login starts a fresh count. Unknown users and users
/// without a `locked_until` field report unlocked.
pub async fn check_account_lock(users: &FileStore, user_id: i64) -> StoreResult<LockStatus> {
    let user = match users.find_by_id(user_id).await? {
        Some(user) => user,
        None => return Ok(LockStatus::unlocked()),
    };

    let locked_until = match lock_expiry(&user) {
        Some(locked_until) => locked_until,
        None => return Ok(LockStatus::unlocked()),
    };

    let now = Utc::now();
    if now > locked_until {
        let mut updates = Map::new();
        updates.insert("locked_until".to_string(), Value::Null);
        updates.insert("failed_login_attempts".to_string(), Value::from(0));
        users.update(user_id, updates).await?;
        return Ok(LockStatus::unlocked());
    }

    let remaining = locked_until - now;
    let remaining_minutes = (remaining.num_seconds() + 59) / 60;

    Ok(LockStatus {
        locked: true,
        locked_until: Some(locked_until),
        remaining_minutes: Some(remaining_minutes),
    })
}

/// Record one failed login attempt for a user.
///
/// Locks the account for [`LOCK_DURATION_HOURS`] once the attempt count
/// reaches [`MAX_FAILED_ATTEMPTS`]. Unknown users report zero attempts.
pub async fn record_failed_login(users: &FileStore, user_id: i64) -> StoreResult<FailedLogin> {
    let user = match users.find_by_id(user_id).await? {
        Some(user) => user,
        None => {
            return Ok(FailedLogin {
                locked: false,
                attempts: 0,
            })
        }
    };

    let attempts = user
        .get("failed_login_attempts")
        .and_then(Value::as_i64)
        .unwrap_or(0)
        + 1;

    let mut updates = Map::new();
    updates.insert("failed_login_attempts".to_string(), Value::from(attempts));

    let locked = attempts >= MAX_FAILED_ATTEMPTS;
    if locked {
        let locked_until = Utc::now() + Duration::hours(LOCK_DURATION_HOURS);
        updates.insert(
            "locked_until".to_string(),
            Value::from(locked_until.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }

    users.update(user_id, updates).await?;

    Ok(FailedLogin { locked, attempts })
}

/// Reset the failure counter and clear any lock. Called on successful login.
pub async fn clear_failed_login(users: &FileStore, user_id: i64) -> StoreResult<()> {
    let mut updates = Map::new();
    updates.insert("failed_login_attempts".to_string(), Value::from(0));
    updates.insert("locked_until".to_string(), Value::Null);

    users.update(user_id, updates).await?;
    Ok(())
}

/// Parse the `locked_until` field, treating null/missing/garbage as no lock.
fn lock_expiry(user: &Record) -> Option<DateTime<Utc>> {
    user.get("locked_until")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
