//! Storage module for Inkstore
//!
//! This module implements the file-backed record store used by the blog
//! backend: one pretty-printed JSON array file per collection, with
//! self-healing loads, a collection manager, default-admin bootstrap, and
//! the account-lockout and email-verification bookkeeping built on top.

mod bootstrap;
mod lockout;
mod manager;
mod store;
mod verification;

pub use bootstrap::ensure_default_admin;
pub use lockout::{
    check_account_lock, clear_failed_login, record_failed_login, FailedLogin, LockStatus,
    LOCK_DURATION_HOURS, MAX_FAILED_ATTEMPTS,
};
pub use manager::Storage;
pub use store::{FileStore, Record, StoreError, StoreResult};
pub use verification::{
    cleanup_expired_codes, create_verification_code, verify_code, CodeVerification, IssuedCode,
    CODE_EXPIRY_SECONDS,
};
