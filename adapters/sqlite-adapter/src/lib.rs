//! sqlite-adapter — SQLite implementation of the LinkRepository port.
//!
//! Purpose
//! - Provide a lightweight, file-based repository so the service persists
//!   links without an external database server.
//! - Implements the `LinkRepository` trait from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - `short_code` carries a UNIQUE constraint; duplicate inserts surface as
//!   `CoreError::AlreadyExists`.
//! - Clicks are incremented in SQL (`clicks = clicks + 1`), never
//!   read-modify-written in Rust.
//! - Stores timestamps as milliseconds since UNIX_EPOCH.
//! - Waiting on the connection lock or on SQLite's own locks is bounded by the
//!   configured timeout and reported as `CoreError::StoreUnavailable`.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{CoreError, LinkRepository, ShortCode, ShortLink};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, ErrorCode};
use uuid::Uuid;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

const SELECT_COLUMNS: &str =
    "SELECT id, original_url, short_code, short_url, clicks, created_at, last_clicked FROM shortlinks";

/// SQLite-backed link repository.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
    timeout: Duration,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        Self::with_timeout(path, DEFAULT_TIMEOUT)
    }

    /// Like [`SqliteRepo::new`] with an explicit bound on lock waits.
    pub fn with_timeout<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| CoreError::Repository(format!("create db dir: {e}")))?;
            }
        }
        let conn = Connection::open(path).map_err(map_sqerr)?;
        conn.busy_timeout(timeout).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            timeout,
        })
    }

    /// Number of stored links.
    pub fn count(&self) -> Result<u64, CoreError> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM shortlinks", [], |row| row.get(0))
            .map_err(map_sqerr)?;
        Ok(n.max(0) as u64)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .try_lock_for(self.timeout)
            .ok_or_else(|| CoreError::StoreUnavailable("sqlite connection lock timed out".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS shortlinks (
            id TEXT PRIMARY KEY,
            original_url TEXT NOT NULL,
            short_code TEXT NOT NULL UNIQUE,
            short_url TEXT NOT NULL,
            clicks INTEGER NOT NULL DEFAULT 0 CHECK (clicks >= 0),
            created_at INTEGER NOT NULL,
            last_clicked INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_shortlinks_created_at ON shortlinks(created_at);
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr(e: rusqlite::Error) -> CoreError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
            return CoreError::StoreUnavailable(format!("sqlite busy: {e}"));
        }
    }
    CoreError::Repository(format!("sqlite error: {e}"))
}

fn system_time_to_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i64
}

fn millis_to_system_time(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}

fn row_to_shortlink(row: &rusqlite::Row) -> Result<ShortLink, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let original_url: String = row.get(1).map_err(map_sqerr)?;
    let code: String = row.get(2).map_err(map_sqerr)?;
    let short_url: String = row.get(3).map_err(map_sqerr)?;
    let clicks: i64 = row.get(4).map_err(map_sqerr)?;
    let created_at: i64 = row.get(5).map_err(map_sqerr)?;
    let last_clicked: Option<i64> = row.get(6).map_err(map_sqerr)?;

    let id = Uuid::parse_str(&id).map_err(|e| CoreError::Repository(format!("bad id in db: {e}")))?;
    let short_code =
        ShortCode::new(code).map_err(|e| CoreError::Repository(format!("bad code in db: {e}")))?;
    Ok(ShortLink {
        id,
        original_url,
        short_code,
        short_url,
        clicks: clicks.max(0) as u64,
        created_at: millis_to_system_time(created_at),
        last_clicked: last_clicked.map(millis_to_system_time),
    })
}

fn query_by_code(conn: &Connection, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
    let mut stmt = conn
        .prepare_cached(&format!("{SELECT_COLUMNS} WHERE short_code = ?1"))
        .map_err(map_sqerr)?;
    let mut rows = stmt.query(params![code.as_str()]).map_err(map_sqerr)?;
    let link = match rows.next().map_err(map_sqerr)? {
        Some(row) => Some(row_to_shortlink(row)?),
        None => None,
    };
    Ok(link)
}

impl LinkRepository for SqliteRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let res = conn.execute(
            "INSERT INTO shortlinks(id, original_url, short_code, short_url, clicks, created_at, last_clicked) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                link.id.to_string(),
                link.original_url,
                link.short_code.as_str(),
                link.short_url,
                link.clicks as i64,
                system_time_to_millis(link.created_at),
                link.last_clicked.map(system_time_to_millis),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(CoreError::AlreadyExists)
            }
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        let conn = self.conn()?;
        query_by_code(&conn, code)
    }

    fn record_click(&self, code: &ShortCode, at: SystemTime) -> Result<ShortLink, CoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let changed = tx
            .execute(
                "UPDATE shortlinks SET clicks = clicks + 1, last_clicked = MAX(?1, created_at) WHERE short_code = ?2",
                params![system_time_to_millis(at), code.as_str()],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            return Err(CoreError::NotFound);
        }
        let link = query_by_code(&tx, code)?.ok_or(CoreError::NotFound)?;
        tx.commit().map_err(map_sqerr)?;
        Ok(link)
    }

    fn list_all(&self) -> Result<Vec<ShortLink>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"
            ))
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_shortlink(row)?);
        }
        Ok(out)
    }
}
