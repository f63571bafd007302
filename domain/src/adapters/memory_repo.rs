use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, MutexGuard};

use crate::{CoreError, LinkRepository, ShortCode, ShortLink};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

struct Entry {
    seq: u64,
    link: ShortLink,
}

#[derive(Default)]
struct Inner {
    links: BTreeMap<String, Entry>,
    next_seq: u64,
}

/// In-memory repository. Every operation runs inside one critical section,
/// which makes insert-if-absent and click increments atomic. Data is lost
/// on restart.
pub struct InMemoryRepo {
    inner: Mutex<Inner>,
    lock_timeout: Duration,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Operations that cannot take the lock within `lock_timeout` fail with
    /// `StoreUnavailable`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            lock_timeout,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, CoreError> {
        self.inner
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| CoreError::StoreUnavailable("memory store lock timed out".into()))
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkRepository for InMemoryRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        let mut inner = self.lock()?;
        let key = link.short_code.as_str().to_string();
        if inner.links.contains_key(&key) {
            return Err(CoreError::AlreadyExists);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.links.insert(key, Entry { seq, link });
        Ok(())
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        let inner = self.lock()?;
        Ok(inner.links.get(code.as_str()).map(|e| e.link.clone()))
    }

    fn record_click(&self, code: &ShortCode, at: SystemTime) -> Result<ShortLink, CoreError> {
        let mut inner = self.lock()?;
        match inner.links.get_mut(code.as_str()) {
            Some(entry) => {
                let link = &mut entry.link;
                link.clicks += 1;
                link.last_clicked = Some(link.click_time(at));
                Ok(link.clone())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn list_all(&self) -> Result<Vec<ShortLink>, CoreError> {
        let inner = self.lock()?;
        let mut entries: Vec<&Entry> = inner.links.values().collect();
        // Sort by created_at desc, later inserts first on ties
        entries.sort_by(|a, b| {
            b.link
                .created_at
                .cmp(&a.link.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(entries.into_iter().map(|e| e.link.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::UNIX_EPOCH;

    fn mk_link(code: &str, created_secs: u64) -> ShortLink {
        ShortLink::new(
            "https://example.com".to_string(),
            ShortCode::new(code).unwrap(),
            format!("http://s/{code}"),
            UNIX_EPOCH + Duration::from_secs(created_secs),
        )
    }

    #[test]
    fn insert_find_roundtrip() {
        let repo = InMemoryRepo::new();
        let link = mk_link("abc", 0);
        repo.insert(link.clone()).unwrap();
        let got = repo.find_by_code(&link.short_code).unwrap().unwrap();
        assert_eq!(got, link);
        assert!(repo
            .find_by_code(&ShortCode::new("zzz").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn insert_rejects_duplicate_without_overwrite() {
        let repo = InMemoryRepo::new();
        repo.insert(mk_link("dup", 0)).unwrap();
        let mut other = mk_link("dup", 5);
        other.original_url = "https://other.example".into();
        let err = repo.insert(other).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
        let kept = repo
            .find_by_code(&ShortCode::new("dup").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(kept.original_url, "https://example.com");
    }

    #[test]
    fn record_click_increments_and_clamps() {
        let repo = InMemoryRepo::new();
        let link = mk_link("click", 100);
        repo.insert(link.clone()).unwrap();

        let early = UNIX_EPOCH + Duration::from_secs(10);
        let got = repo.record_click(&link.short_code, early).unwrap();
        assert_eq!(got.clicks, 1);
        assert_eq!(got.last_clicked, Some(link.created_at));

        let later = UNIX_EPOCH + Duration::from_secs(200);
        let got = repo.record_click(&link.short_code, later).unwrap();
        assert_eq!(got.clicks, 2);
        assert_eq!(got.last_clicked, Some(later));
    }

    #[test]
    fn record_click_unknown_is_not_found() {
        let repo = InMemoryRepo::new();
        let err = repo
            .record_click(&ShortCode::new("nope").unwrap(), UNIX_EPOCH)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[test]
    fn list_orders_newest_first_with_insert_tiebreak() {
        let repo = InMemoryRepo::new();
        repo.insert(mk_link("old", 1)).unwrap();
        repo.insert(mk_link("tie-a", 5)).unwrap();
        repo.insert(mk_link("tie-b", 5)).unwrap();
        repo.insert(mk_link("mid", 3)).unwrap();
        let codes: Vec<_> = repo
            .list_all()
            .unwrap()
            .into_iter()
            .map(|l| l.short_code.as_str().to_string())
            .collect();
        assert_eq!(codes, ["tie-b", "tie-a", "mid", "old"]);
    }

    #[test]
    fn concurrent_inserts_of_same_code_admit_one() {
        let repo = Arc::new(InMemoryRepo::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                thread::spawn(move || repo.insert(mk_link("race", i)).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(repo.list_all().unwrap().len(), 1);
    }

    #[test]
    fn held_lock_times_out_as_unavailable() {
        let repo = InMemoryRepo::with_lock_timeout(Duration::from_millis(20));
        let _guard = repo.inner.lock();
        let err = repo.list_all().unwrap_err();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
    }
}
