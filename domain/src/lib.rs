//! Domain library for the URL Shortener.
//!
//! Holds the domain types, ports (traits), and error definitions. Keep
//! adapters with real IO (SQLite, HTTP) out of this crate; the in-memory
//! repository under `adapters` is the only store that lives here.

use std::time::SystemTime;

use uuid::Uuid;

/// A URL-safe short code identifying a short link.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidInput("empty short code".into()));
        }
        if !val.bytes().all(code::is_code_byte) {
            return Err(CoreError::InvalidInput(
                "short code has invalid characters".into(),
            ));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored short link mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortLink {
    pub id: Uuid,
    pub original_url: String,
    pub short_code: ShortCode,
    /// Full short URL, fixed at creation time.
    pub short_url: String,
    /// Number of times this link has been visited (redirected).
    pub clicks: u64,
    pub created_at: SystemTime,
    /// Time of the most recent redirect; `None` until the first one.
    pub last_clicked: Option<SystemTime>,
}

impl ShortLink {
    /// Create a fresh link with a new id, zero clicks and no click timestamp.
    pub fn new(
        original_url: String,
        short_code: ShortCode,
        short_url: String,
        created_at: SystemTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_url,
            short_code,
            short_url,
            clicks: 0,
            created_at,
            last_clicked: None,
        }
    }

    /// Clamp a click timestamp so `last_clicked` never precedes `created_at`.
    pub fn click_time(&self, at: SystemTime) -> SystemTime {
        at.max(self.created_at)
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Short code generator interface. Generators never consult the store;
/// uniqueness is decided by `LinkRepository::insert`.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> ShortCode;
}

/// Repository port for persisting and loading links.
pub trait LinkRepository: Send + Sync {
    /// Insert a new link. Fails with `AlreadyExists` if the short code is
    /// taken; an existing record is never overwritten.
    fn insert(&self, link: ShortLink) -> Result<(), CoreError>;
    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError>;
    /// Atomically increment the click count and set `last_clicked` to `at`
    /// (clamped to `created_at`). Returns the updated record.
    fn record_click(&self, code: &ShortCode, at: SystemTime) -> Result<ShortLink, CoreError>;
    /// All links, newest first.
    fn list_all(&self) -> Result<Vec<ShortLink>, CoreError>;
}

impl<R: LinkRepository + ?Sized> LinkRepository for std::sync::Arc<R> {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        (**self).insert(link)
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        (**self).find_by_code(code)
    }

    fn record_click(&self, code: &ShortCode, at: SystemTime) -> Result<ShortLink, CoreError> {
        (**self).record_click(code, at)
    }

    fn list_all(&self) -> Result<Vec<ShortLink>, CoreError> {
        (**self).list_all()
    }
}

/// Core domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found")]
    NotFound,
    #[error("short code already exists")]
    AlreadyExists,
    #[error("could not generate a unique short code after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("repository error: {0}")]
    Repository(String),
}

impl CoreError {
    /// Transient failures the caller may retry as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }
}

pub mod adapters;
pub mod code;
pub mod service;
pub mod validate;
