use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::storage::store::{FileStore, StoreResult};

/// Storage coordinates access to every collection the platform uses.
///
/// One `FileStore` per collection, all under a single data directory. The
/// manager is constructed once at startup and passed to whoever needs a
/// collection; there is no process-wide instance.
pub struct Storage {
    /// Base directory for all collection files
    data_dir: PathBuf,

    users: Arc<FileStore>,
    articles: Arc<FileStore>,
    payment_configs: Arc<FileStore>,
    donations: Arc<FileStore>,
    oauth_providers: Arc<FileStore>,
    system_configs: Arc<FileStore>,
    verification_codes: Arc<FileStore>,
}

impl Storage {
    /// Open (or create) the storage rooted at `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        Ok(Self {
            users: Arc::new(FileStore::new(&data_dir, "users")?),
            articles: Arc::new(FileStore::new(&data_dir, "articles")?),
            payment_configs: Arc::new(FileStore::new(&data_dir, "payment_configs")?),
            donations: Arc::new(FileStore::new(&data_dir, "donations")?),
            oauth_providers: Arc::new(FileStore::new(&data_dir, "oauth_providers")?),
            system_configs: Arc::new(FileStore::new(&data_dir, "system_configs")?),
            verification_codes: Arc::new(FileStore::new(&data_dir, "email_verification_codes")?),
            data_dir,
        })
    }

    /// Base directory holding the collection files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The user accounts collection
    pub fn users(&self) -> Arc<FileStore> {
        self.users.clone()
    }

    /// The articles collection
    pub fn articles(&self) -> Arc<FileStore> {
        self.articles.clone()
    }

    /// The payment configurations collection
    pub fn payment_configs(&self) -> Arc<FileStore> {
        self.payment_configs.clone()
    }

    /// The donations collection
    pub fn donations(&self) -> Arc<FileStore> {
        self.donations.clone()
    }

    /// The OAuth providers collection
    pub fn oauth_providers(&self) -> Arc<FileStore> {
        self.oauth_providers.clone()
    }

    /// The system configuration collection
    pub fn system_configs(&self) -> Arc<FileStore> {
        self.system_configs.clone()
    }

    /// The email verification codes collection
    pub fn verification_codes(&self) -> Arc<FileStore> {
        self.verification_codes.clone()
    }

    /// Every collection with its name, for startup reporting.
    pub fn collections(&self) -> Vec<(&'static str, Arc<FileStore>)> {
        vec![
            ("users", self.users()),
            ("articles", self.articles()),
            ("payment_configs", self.payment_configs()),
            ("donations", self.donations()),
            ("oauth_providers", self.oauth_providers()),
            ("system_configs", self.system_configs()),
            ("email_verification_codes", self.verification_codes()),
        ]
    }
}
