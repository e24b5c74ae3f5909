//! kv-engine — the thread-safe facade around [`kv_core::Table`].
//!
//! Every public operation here takes a single mutex for its whole duration,
//! including the synchronous file I/O in `save`/`load`/`backup`. There is no
//! finer-grained locking. Callers above this crate (the wire protocol
//! handlers in `kvstored`) never reach into the table directly.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use kv_core::codec;
use kv_core::error::{EngineError, EngineResult};
use kv_core::table::{Table, TableStats};
use kv_core::value::Value;

/// Configuration the engine is constructed with — mirrors the reference
/// implementation's `kvapi_config_t`: capacity hint, snapshot file, and
/// whether to auto-save on close.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub capacity: usize,
    pub db_file: Option<PathBuf>,
    pub auto_save: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            db_file: None,
            auto_save: true,
        }
    }
}

pub struct Engine {
    table: Mutex<Table>,
    db_file: Option<PathBuf>,
    auto_save: bool,
}

impl Engine {
    /// Creates a new engine. If `config.db_file` is set and the file
    /// exists, the engine is pre-loaded from it; a missing file is not an
    /// error — the engine simply starts empty.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let engine = Self {
            table: Mutex::new(Table::new(config.capacity)),
            db_file: config.db_file,
            auto_save: config.auto_save,
        };
        if engine.db_file.is_some() {
            engine.load(None)?;
        }
        Ok(engine)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── typed setters ────────────────────────────────────────────────────

    pub fn set(&self, key: &[u8], value: Value) -> EngineResult<()> {
        self.lock().put(key, value)
    }

    pub fn set_string(&self, key: &[u8], value: Vec<u8>) -> EngineResult<()> {
        self.set(key, Value::String(value))
    }

    pub fn set_int64(&self, key: &[u8], value: i64) -> EngineResult<()> {
        self.set(key, Value::Int64(value))
    }

    pub fn set_double(&self, key: &[u8], value: f64) -> EngineResult<()> {
        self.set(key, Value::Double(value))
    }

    pub fn set_bool(&self, key: &[u8], value: bool) -> EngineResult<()> {
        self.set(key, Value::Bool(value))
    }

    pub fn set_binary(&self, key: &[u8], value: Vec<u8>) -> EngineResult<()> {
        self.set(key, Value::Binary(value))
    }

    pub fn set_null(&self, key: &[u8]) -> EngineResult<()> {
        self.set(key, Value::Null)
    }

    // ── getters ──────────────────────────────────────────────────────────

    pub fn get(&self, key: &[u8]) -> EngineResult<Value> {
        self.lock().get(key)
    }

    pub fn get_type(&self, key: &[u8]) -> EngineResult<&'static str> {
        self.lock().get_type(key)
    }

    pub fn get_string(&self, key: &[u8]) -> EngineResult<Vec<u8>> {
        match self.get(key)? {
            Value::String(s) => Ok(s),
            other => Err(type_mismatch("string", other.type_name())),
        }
    }

    pub fn get_int64(&self, key: &[u8]) -> EngineResult<i64> {
        match self.get(key)? {
            Value::Int64(v) => Ok(v),
            other => Err(type_mismatch("int64", other.type_name())),
        }
    }

    pub fn get_double(&self, key: &[u8]) -> EngineResult<f64> {
        match self.get(key)? {
            Value::Double(v) => Ok(v),
            other => Err(type_mismatch("double", other.type_name())),
        }
    }

    pub fn get_bool(&self, key: &[u8]) -> EngineResult<bool> {
        match self.get(key)? {
            Value::Bool(v) => Ok(v),
            other => Err(type_mismatch("bool", other.type_name())),
        }
    }

    pub fn get_binary(&self, key: &[u8]) -> EngineResult<Vec<u8>> {
        match self.get(key)? {
            Value::Binary(b) => Ok(b),
            other => Err(type_mismatch("binary", other.type_name())),
        }
    }

    // ── mutation / membership ───────────────────────────────────────────

    pub fn delete(&self, key: &[u8]) -> bool {
        self.lock().delete(key)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.lock().exists(key)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // ── observability ────────────────────────────────────────────────────

    pub fn size(&self) -> usize {
        self.lock().size()
    }

    pub fn stats(&self) -> TableStats {
        self.lock().stats()
    }

    /// All keys currently in the table. Order is unspecified.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.lock().iter().map(|(k, _)| k).collect()
    }

    // ── persistence ──────────────────────────────────────────────────────

    fn resolve_path(&self, path: Option<&Path>) -> EngineResult<PathBuf> {
        path.map(Path::to_path_buf)
            .or_else(|| self.db_file.clone())
            .ok_or_else(|| EngineError::InvalidArgument("no snapshot file configured".into()))
    }

    pub fn save(&self, path: Option<&Path>) -> EngineResult<()> {
        let path = self.resolve_path(path)?;
        let table = self.lock();
        let file = create_snapshot_file(&path)?;
        let mut writer = BufWriter::new(file);
        codec::write_snapshot(&mut writer, &table)?;
        use std::io::Write;
        writer.flush()?;
        tracing::debug!(path = %path.display(), entries = table.size(), "snapshot saved");
        Ok(())
    }

    /// Restores the keyspace from `path` (or the configured file). A
    /// missing file is not an error — the engine is left as-is (empty, on
    /// the usual startup path). The file is fully parsed before the table
    /// is touched, so a truncated or malformed snapshot never leaves the
    /// table half-populated.
    pub fn load(&self, path: Option<&Path>) -> EngineResult<()> {
        let path = self.resolve_path(path)?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "snapshot file absent, starting empty");
            return Ok(());
        }

        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);
        let pairs = codec::read_snapshot(&mut reader)?;

        let mut table = self.lock();
        table.clear();
        for (key, value) in pairs {
            table.put(&key, value)?;
        }
        tracing::info!(path = %path.display(), entries = table.size(), "snapshot loaded");
        Ok(())
    }

    /// Saves a timestamped backup. If `path` is `None`, the name is
    /// `<db_file>.backup.<YYYYMMDD-hhmmss>` in local time.
    pub fn backup(&self, path: Option<&Path>) -> EngineResult<PathBuf> {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let db_file = self
                    .db_file
                    .clone()
                    .ok_or_else(|| EngineError::InvalidArgument("no snapshot file configured".into()))?;
                let stamp = backup_timestamp();
                let mut name = db_file.into_os_string();
                name.push(format!(".backup.{stamp}"));
                PathBuf::from(name)
            }
        };
        self.save(Some(&target))?;
        Ok(target)
    }

    /// Closes the engine, auto-saving first if configured to. Safe to call
    /// more than once; the second call is a no-op beyond another save.
    pub fn close(&self) {
        if self.auto_save && self.db_file.is_some() {
            match self.save(None) {
                Ok(()) => tracing::info!("auto-save on close succeeded"),
                Err(e) => tracing::warn!(error = %e, "auto-save on close failed"),
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens/truncates the snapshot file with mode 0644, per spec.md §4.4 —
/// `File::create` alone only yields 0666 pre-umask.
#[cfg(unix)]
fn create_snapshot_file(path: &Path) -> EngineResult<File> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)?)
}

#[cfg(not(unix))]
fn create_snapshot_file(path: &Path) -> EngineResult<File> {
    Ok(OpenOptions::new().write(true).create(true).truncate(true).open(path)?)
}

fn type_mismatch(expected: &'static str, actual: &'static str) -> EngineError {
    EngineError::TypeMismatch { expected, actual }
}

fn backup_timestamp() -> String {
    use time::macros::format_description;
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let fmt = format_description!("[year][month][day]-[hour][minute][second]");
    now.format(&fmt).unwrap_or_else(|_| "unknown-time".to_string())
}
