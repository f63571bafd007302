use tracing::{debug, error, warn};

use crate::code::is_reserved;
use crate::validate::validate_original_url;
use crate::{Clock, CodeGenerator, CoreError, LinkRepository, ShortCode, ShortLink};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Settings fixed for the lifetime of a [`LinkService`].
#[derive(Clone, Debug)]
pub struct ServiceOptions {
    /// Prefix for generated short URLs, without a trailing slash.
    pub base_url: String,
    /// Bound on code generation attempts per `create`.
    pub max_attempts: u32,
}

impl ServiceOptions {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn short_url(&self, code: &ShortCode) -> String {
        format!("{}/{}", self.base_url, code.as_str())
    }
}

/// Application service orchestrating creation, resolution and click
/// recording of short links.
///
/// Generic over repository, code generator, and clock. Uniqueness is left to
/// the repository: `create` inserts and retries on `AlreadyExists`, so there
/// is no check-then-write window between concurrent creators.
pub struct LinkService<R: LinkRepository, G: CodeGenerator, C: Clock> {
    repo: R,
    generator: G,
    clock: C,
    options: ServiceOptions,
}

impl<R: LinkRepository, G: CodeGenerator, C: Clock> LinkService<R, G, C> {
    pub fn new(repo: R, generator: G, clock: C, options: ServiceOptions) -> Self {
        Self {
            repo,
            generator,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Create a new short link for `original_url`.
    pub fn create(&self, original_url: &str) -> Result<ShortLink, CoreError> {
        let original_url = validate_original_url(original_url)?;
        let attempts = self.options.max_attempts;

        for attempt in 1..=attempts {
            let code = self.generator.generate();
            if is_reserved(&code) {
                warn!(code = %code, attempt, "generated a reserved code, regenerating");
                continue;
            }
            let link = ShortLink::new(
                original_url.to_string(),
                code.clone(),
                self.options.short_url(&code),
                self.clock.now(),
            );
            match self.repo.insert(link.clone()) {
                Ok(()) => {
                    debug!(code = %code, attempt, "short link created");
                    return Ok(link);
                }
                Err(CoreError::AlreadyExists) => {
                    warn!(code = %code, attempt, "short code collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        error!(attempts, "short code generation exhausted");
        Err(CoreError::Exhausted { attempts })
    }

    /// Read-only lookup.
    pub fn find_by_code(&self, code: &ShortCode) -> Result<ShortLink, CoreError> {
        self.repo.find_by_code(code)?.ok_or(CoreError::NotFound)
    }

    /// Count one redirect for `code` and return the updated record.
    pub fn record_click(&self, code: &ShortCode) -> Result<ShortLink, CoreError> {
        self.repo.record_click(code, self.clock.now())
    }

    /// Every link, newest first.
    pub fn list_all(&self) -> Result<Vec<ShortLink>, CoreError> {
        self.repo.list_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;
    use crate::code::{RandomCodeGenerator, ALPHABET};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, SystemTime};

    /// Advances one millisecond per reading.
    #[derive(Default)]
    struct StepClock(AtomicU64);
    impl Clock for StepClock {
        fn now(&self) -> SystemTime {
            let ms = self.0.fetch_add(1, Ordering::SeqCst);
            SystemTime::UNIX_EPOCH + Duration::from_millis(1_000 + ms)
        }
    }

    /// Yields the given codes in order, repeating the last one.
    struct Scripted {
        codes: Vec<&'static str>,
        calls: AtomicU32,
    }
    impl Scripted {
        fn new(codes: Vec<&'static str>) -> Self {
            Self {
                codes,
                calls: AtomicU32::new(0),
            }
        }
    }
    impl CodeGenerator for Scripted {
        fn generate(&self) -> ShortCode {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let raw = self.codes[i.min(self.codes.len() - 1)];
            ShortCode::new(raw).unwrap()
        }
    }

    fn opts() -> ServiceOptions {
        ServiceOptions::new("http://localhost:5000/")
    }

    fn svc() -> LinkService<InMemoryRepo, RandomCodeGenerator, StepClock> {
        LinkService::new(
            InMemoryRepo::new(),
            RandomCodeGenerator::default(),
            StepClock::default(),
            opts(),
        )
    }

    #[test]
    fn create_then_find() {
        let svc = svc();
        let created = svc.create("https://example.com/very/long/path").unwrap();
        assert_eq!(created.short_code.as_str().len(), 6);
        assert!(created
            .short_code
            .as_str()
            .chars()
            .all(|c| ALPHABET.contains(&c)));
        assert_eq!(
            created.short_url,
            format!("http://localhost:5000/{}", created.short_code)
        );
        assert_eq!(created.clicks, 0);
        assert!(created.last_clicked.is_none());

        let found = svc.find_by_code(&created.short_code).unwrap();
        assert_eq!(found.original_url, "https://example.com/very/long/path");
        assert_eq!(found.clicks, 0);
        assert_eq!(found, created);
    }

    #[test]
    fn create_empty_is_rejected_and_not_persisted() {
        let svc = svc();
        assert!(matches!(svc.create(""), Err(CoreError::InvalidInput(_))));
        assert!(matches!(svc.create("nope"), Err(CoreError::InvalidInput(_))));
        assert!(svc.list_all().unwrap().is_empty());
    }

    #[test]
    fn created_codes_are_unique() {
        let svc = svc();
        let mut seen = HashSet::new();
        for i in 0..300 {
            let link = svc.create(&format!("https://e.com/{i}")).unwrap();
            assert!(seen.insert(link.short_code));
        }
    }

    #[test]
    fn collision_is_retried() {
        let repo = Arc::new(InMemoryRepo::new());
        let first = LinkService::new(
            repo.clone(),
            Scripted::new(vec!["taken1"]),
            StepClock::default(),
            opts(),
        );
        first.create("https://one.example").unwrap();

        let gen = Scripted::new(vec!["taken1", "fresh1"]);
        let second = LinkService::new(repo.clone(), gen, StepClock::default(), opts());
        let link = second.create("https://two.example").unwrap();
        assert_eq!(link.short_code.as_str(), "fresh1");
        assert_eq!(second.generator.calls.load(Ordering::SeqCst), 2);
        // The original record is untouched.
        let kept = second
            .find_by_code(&ShortCode::new("taken1").unwrap())
            .unwrap();
        assert_eq!(kept.original_url, "https://one.example");
    }

    #[test]
    fn reserved_codes_are_skipped() {
        let svc = LinkService::new(
            InMemoryRepo::new(),
            Scripted::new(vec!["urls", "shorten", "fresh1"]),
            StepClock::default(),
            opts(),
        );
        let link = svc.create("https://example.com").unwrap();
        assert_eq!(link.short_code.as_str(), "fresh1");
        assert_eq!(svc.generator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(svc.list_all().unwrap().len(), 1);

        let only_reserved = LinkService::new(
            InMemoryRepo::new(),
            Scripted::new(vec!["urls"]),
            StepClock::default(),
            opts().with_max_attempts(2),
        );
        let err = only_reserved.create("https://example.com").unwrap_err();
        assert!(matches!(err, CoreError::Exhausted { attempts: 2 }));
    }

    #[test]
    fn exhausted_after_bounded_attempts() {
        let repo = Arc::new(InMemoryRepo::new());
        let seed = LinkService::new(
            repo.clone(),
            Scripted::new(vec!["same00"]),
            StepClock::default(),
            opts(),
        );
        seed.create("https://one.example").unwrap();

        let svc = LinkService::new(
            repo.clone(),
            Scripted::new(vec!["same00"]),
            StepClock::default(),
            opts().with_max_attempts(3),
        );
        let err = svc.create("https://two.example").unwrap_err();
        assert!(matches!(err, CoreError::Exhausted { attempts: 3 }));
        assert_eq!(svc.generator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(svc.list_all().unwrap().len(), 1);
    }

    #[test]
    fn unknown_code_is_not_found() {
        let svc = svc();
        let missing = ShortCode::new("missing").unwrap();
        assert!(matches!(svc.find_by_code(&missing), Err(CoreError::NotFound)));
        assert!(matches!(svc.record_click(&missing), Err(CoreError::NotFound)));
    }

    #[test]
    fn list_is_newest_first() {
        let svc = svc();
        let a = svc.create("https://a.example").unwrap();
        let b = svc.create("https://b.example").unwrap();
        let all = svc.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].short_code, b.short_code);
        assert_eq!(all[1].short_code, a.short_code);
    }

    #[test]
    fn three_redirects_then_stats() {
        let svc = svc();
        let link = svc.create("https://example.com/very/long/path").unwrap();
        for _ in 0..3 {
            let clicked = svc.record_click(&link.short_code).unwrap();
            assert_eq!(clicked.original_url, link.original_url);
        }
        let stats = svc.find_by_code(&link.short_code).unwrap();
        assert_eq!(stats.clicks, 3);
        assert!(stats.last_clicked.unwrap() > stats.created_at);
    }

    #[test]
    fn concurrent_clicks_are_not_lost() {
        let svc = Arc::new(LinkService::new(
            InMemoryRepo::new(),
            RandomCodeGenerator::default(),
            crate::SystemClock,
            opts(),
        ));
        let link = svc.create("https://example.com").unwrap();
        let before = SystemTime::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                let code = link.short_code.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        svc.record_click(&code).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = svc.find_by_code(&link.short_code).unwrap();
        assert_eq!(stats.clicks, 400);
        let last = stats.last_clicked.unwrap();
        assert!(last >= before);
        assert!(last >= stats.created_at);
    }
}
