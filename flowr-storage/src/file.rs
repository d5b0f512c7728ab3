//! File-backed record store.
//!
//! Layout:
//!
//! ```text
//! <dir>/
//!   rule_sets/<id>.json
//!   flows/<id>.json
//!   states/<id>.json
//! ```
//!
//! Each file holds an 8-digit hex crc32c of the record bytes on the first
//! line, followed by the JSON record. Writes go to a temporary file that is
//! renamed over the target, so a reader never sees a partial record.

use crate::error::StoreError;
use crate::record::{validate_id, RecordKind, RecordStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// Fsync policy for record writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncPolicy {
    /// Fsync every record before it replaces the previous one.
    #[default]
    EveryWrite,
    /// Never fsync, rely on the OS.
    Never,
}

/// File store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base directory.
    pub dir: PathBuf,
    /// Fsync policy.
    pub fsync_policy: FsyncPolicy,
}

impl StoreConfig {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            fsync_policy: FsyncPolicy::default(),
        }
    }

    pub fn with_fsync_policy(mut self, policy: FsyncPolicy) -> Self {
        self.fsync_policy = policy;
        self
    }
}

/// Record store persisting one checksummed JSON file per record.
pub struct FileStore {
    config: StoreConfig,

    /// Serializes writers so temp files never collide.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens or creates a store at the configured directory.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        for kind in RecordKind::ALL {
            fs::create_dir_all(config.dir.join(kind.as_str()))?;
        }

        tracing::info!("Opened record store at {}", config.dir.display());

        Ok(Self {
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    fn record_path(&self, kind: RecordKind, id: &str) -> PathBuf {
        self.config
            .dir
            .join(kind.as_str())
            .join(format!("{}.{}", id, RECORD_EXT))
    }

    fn read_record(path: &Path) -> Result<Value, StoreError> {
        let content = fs::read(path)?;
        let split = content
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| {
                StoreError::Corruption(format!("{}: missing checksum header", path.display()))
            })?;
        let (header, body) = (&content[..split], &content[split + 1..]);

        let expected = std::str::from_utf8(header)
            .ok()
            .and_then(|h| u32::from_str_radix(h.trim(), 16).ok())
            .ok_or_else(|| {
                StoreError::Corruption(format!("{}: malformed checksum header", path.display()))
            })?;
        let actual = crc32c::crc32c(body);
        if actual != expected {
            return Err(StoreError::Corruption(format!(
                "{}: checksum mismatch (expected {:08x}, got {:08x})",
                path.display(),
                expected,
                actual
            )));
        }

        Ok(serde_json::from_slice(body)?)
    }
}

impl RecordStore for FileStore {
    fn put(&self, kind: RecordKind, id: &str, value: &Value) -> Result<(), StoreError> {
        validate_id(id)?;
        let body = serde_json::to_vec_pretty(value)?;
        let checksum = crc32c::crc32c(&body);

        let path = self.record_path(kind, id);
        let temp = path.with_extension(TEMP_EXT);

        let _guard = self.write_lock.lock();
        {
            let mut file = File::create(&temp)?;
            writeln!(file, "{:08x}", checksum)?;
            file.write_all(&body)?;
            if self.config.fsync_policy == FsyncPolicy::EveryWrite {
                file.sync_all()?;
            }
        }
        fs::rename(&temp, &path)?;

        tracing::debug!("Stored {} record {} ({} bytes)", kind, id, body.len());

        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError> {
        validate_id(id)?;
        let path = self.record_path(kind, id);
        match Self::read_record(&path) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StoreError> {
        validate_id(id)?;
        let path = self.record_path(kind, id);

        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Deleted {} record {}", kind, id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<(String, Value)>, StoreError> {
        let dir = self.config.dir.join(kind.as_str());
        let mut records = Vec::new();

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e != RECORD_EXT).unwrap_or(true) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            records.push((id.to_string(), Self::read_record(&path)?));
        }

        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }
}
