//! Store selection and the bridge from async handlers to the blocking
//! repository calls.

use std::sync::Arc;
use std::time::SystemTime;

use domain::adapters::memory_repo::InMemoryRepo;
use domain::code::RandomCodeGenerator;
use domain::service::{LinkService, ServiceOptions};
use domain::{CoreError, LinkRepository, ShortCode, ShortLink, SystemClock};

use crate::config;

// Local repo abstraction supporting memory or sqlite (feature-gated).
enum RepoKind {
    Memory(InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteRepo),
}

pub struct AnyRepo {
    kind: RepoKind,
}

impl AnyRepo {
    pub fn memory(cfg: &config::Config) -> Self {
        Self {
            kind: RepoKind::Memory(InMemoryRepo::with_lock_timeout(cfg.store_timeout)),
        }
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite(cfg: &config::Config) -> Result<Self, CoreError> {
        let repo = sqlite_adapter::SqliteRepo::with_timeout(&cfg.db_path, cfg.store_timeout)?;
        tracing::info!(path = %cfg.db_path.display(), links = repo.count()?, "sqlite store opened");
        Ok(Self {
            kind: RepoKind::Sqlite(repo),
        })
    }

    /// Construct a repository instance based on config and feature flags.
    pub fn from_config(cfg: &config::Config) -> Result<Self, CoreError> {
        match cfg.storage_provider {
            #[cfg(feature = "sqlite")]
            config::StorageProvider::Sqlite => Self::sqlite(cfg),
            #[cfg(not(feature = "sqlite"))]
            config::StorageProvider::Sqlite => {
                tracing::warn!("built without the `sqlite` feature, using memory storage");
                Ok(Self::memory(cfg))
            }
            config::StorageProvider::Memory => Ok(Self::memory(cfg)),
        }
    }
}

impl LinkRepository for AnyRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        match &self.kind {
            RepoKind::Memory(r) => r.insert(link),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.insert(link),
        }
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        match &self.kind {
            RepoKind::Memory(r) => r.find_by_code(code),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_by_code(code),
        }
    }

    fn record_click(&self, code: &ShortCode, at: SystemTime) -> Result<ShortLink, CoreError> {
        match &self.kind {
            RepoKind::Memory(r) => r.record_click(code, at),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.record_click(code, at),
        }
    }

    fn list_all(&self) -> Result<Vec<ShortLink>, CoreError> {
        match &self.kind {
            RepoKind::Memory(r) => r.list_all(),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.list_all(),
        }
    }
}

pub type Service = LinkService<AnyRepo, RandomCodeGenerator, SystemClock>;

/// Wire the link service from validated config.
pub fn build_service(cfg: &config::Config, repo: AnyRepo) -> Result<Service, CoreError> {
    let generator = RandomCodeGenerator::new(cfg.code_length)?;
    let options = ServiceOptions::new(cfg.base_url.clone()).with_max_attempts(cfg.max_code_attempts);
    Ok(LinkService::new(repo, generator, SystemClock, options))
}

/// Run a synchronous service call on the blocking pool. The store bounds
/// its own waits, so the call always finishes; a panicked task surfaces as
/// a repository error.
pub async fn blocking<T, F>(svc: &Arc<Service>, op: F) -> Result<T, CoreError>
where
    F: FnOnce(&Service) -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    let svc = Arc::clone(svc);
    tokio::task::spawn_blocking(move || op(&svc))
        .await
        .map_err(|e| CoreError::Repository(format!("store task failed: {e}")))?
}
