use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::{Map, Value};

use crate::core::config::Config;
use crate::storage::store::FileStore;

/// Password used for the seeded administrator when neither the config file
/// nor the `ADMIN_PASSWORD` environment variable provides one.
const FALLBACK_ADMIN_PASSWORD: &str =
    "4ztvavncDY#ZDKbP.)0FukJ&D4W)myFO*RzHloV7WpmMuP$4FD;LOhTVOU={D[h(";

/// Work factor for the administrator password hash
const BCRYPT_COST: u32 = 10;

/// Seed a default administrator account when the users collection is empty.
///
/// Runs once at startup. The check-then-insert is only serialized within
/// this process; two processes sharing a data directory can both pass the
/// emptiness check and each seed an administrator.
///
/// Returns `true` when an account was created.
pub async fn ensure_default_admin(users: &FileStore, config: &Config) -> Result<bool> {
    let existing = users
        .get_all()
        .await
        .context("Failed to read users collection")?;

    if !existing.is_empty() {
        return Ok(false);
    }

    let password = config
        .admin
        .password
        .clone()
        .or_else(|| std::env::var("ADMIN_PASSWORD").ok())
        .unwrap_or_else(|| FALLBACK_ADMIN_PASSWORD.to_string());

    let password_hash =
        bcrypt::hash(&password, BCRYPT_COST).context("Failed to hash administrator password")?;

    let mut admin = Map::new();
    admin.insert("username".to_string(), Value::from("Admin"));
    admin.insert("email".to_string(), Value::from("Admin@center.com"));
    admin.insert("password_hash".to_string(), Value::from(password_hash));
    admin.insert("role".to_string(), Value::from("admin"));
    admin.insert("email_verified".to_string(), Value::from(true));

    users
        .create(admin)
        .await
        .context("Failed to create default administrator account")?;

    info!("Default administrator account created");
    info!("  Username: Admin");
    info!("  Password: {}", password);
    warn!("Log in and change the administrator password immediately");

    Ok(true)
}
