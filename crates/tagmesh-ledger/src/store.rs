//! Storage backend for the ledger (Fjall disk or pure in-memory).
//!
//! Four tables:
//!
//! - `statements`: `edge key ++ clock (u64 BE)` → encoded statement
//! - `clocks`: `edge key` → highest clock stored (u64 BE)
//! - `log`: arrival sequence (u64 BE) → statement key
//! - `meta`: `"seq"` → last assigned arrival sequence
//!
//! Edge keys start with the subject, so a prefix scan over `statements`
//! returns a subject's full history grouped by edge and ordered by clock.
//!
//! Writes are serialized by a store-wide write lock so arrival sequence
//! numbers become visible in order. The store does not check for an
//! existing `(edge, clock)` row; callers hold the edge lock (see
//! [`crate::clock`]) around the check and the `put`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tracing::debug;

use crate::error::LedgerError;
use crate::statement::Statement;

type Result<T> = std::result::Result<T, LedgerError>;

const SEQ_KEY: &[u8] = b"seq";

/// Inner backend: either Fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        statements: Keyspace,
        clocks: Keyspace,
        log: Keyspace,
        meta: Keyspace,
    },
    Memory(Box<RwLock<MemoryTables>>),
}

/// Pure in-memory tables, swapped under one lock per write.
#[derive(Default)]
struct MemoryTables {
    statements: BTreeMap<Vec<u8>, Vec<u8>>,
    clocks: HashMap<Vec<u8>, u64>,
    log: BTreeMap<u64, Vec<u8>>,
}

/// Durable, append-only statement storage.
pub struct LedgerStore {
    backend: Backend,
    /// Last assigned arrival sequence number.
    seq: AtomicU64,
    /// Held while assigning a sequence number and writing its rows.
    write_lock: Mutex<()>,
    /// Backing directory of a temporary store, removed on drop.
    _tmp: Option<tempfile::TempDir>,
}

fn storage_err(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn poisoned<T>(_: T) -> LedgerError {
    LedgerError::Storage("memory backend lock poisoned".to_string())
}

fn be_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| storage_err(format!("expected 8-byte integer, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

/// Storage key of one statement: `edge key ++ clock`.
pub(crate) fn statement_key(edge_key: &[u8], clock: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(edge_key.len() + 8);
    key.extend_from_slice(edge_key);
    key.extend_from_slice(&clock.to_be_bytes());
    key
}

impl LedgerStore {
    /// Open a persistent store at the given path (Fjall backend).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_fjall(db)
    }

    /// Open a temporary store backed by Fjall (cleaned up on drop).
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(storage_err)?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        let mut store = Self::init_fjall(db)?;
        store._tmp = Some(tmp);
        Ok(store)
    }

    /// Create a pure in-memory store.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Box::default()),
            seq: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            _tmp: None,
        }
    }

    fn init_fjall(db: Database) -> Result<Self> {
        let statements = db.keyspace("statements", KeyspaceCreateOptions::default)?;
        let clocks = db.keyspace("clocks", KeyspaceCreateOptions::default)?;
        let log = db.keyspace("log", KeyspaceCreateOptions::default)?;
        let meta = db.keyspace("meta", KeyspaceCreateOptions::default)?;

        let mut seq = match meta.get(SEQ_KEY)? {
            Some(v) => be_u64(&v)?,
            None => 0,
        };
        // A crash after the log write but before the counter write leaves
        // log entries past the stored counter.
        for guard in log.range((seq + 1).to_be_bytes()..) {
            let k = guard.key().map_err(storage_err)?;
            seq = seq.max(be_u64(&k)?);
        }

        debug!(seq, "opened ledger store");

        Ok(Self {
            backend: Backend::Fjall {
                db,
                statements,
                clocks,
                log,
                meta,
            },
            seq: AtomicU64::new(seq),
            write_lock: Mutex::new(()),
            _tmp: None,
        })
    }

    // ----- Writes -----

    /// Store a statement and return its arrival sequence number.
    ///
    /// Rows are written statement first and sequence counter last, so a
    /// log entry never points at a missing statement.
    pub fn put(&self, edge_key: &[u8], statement: &Statement) -> Result<u64> {
        let key = statement_key(edge_key, statement.clock);
        let encoded = statement.encode();
        let _write = self.write_lock.lock().map_err(poisoned)?;
        let seq = self.seq.load(Ordering::SeqCst) + 1;
        let new_max = self
            .max_clock(edge_key)?
            .map_or(statement.clock, |c| c.max(statement.clock));

        match &self.backend {
            Backend::Fjall {
                statements,
                clocks,
                log,
                meta,
                ..
            } => {
                statements.insert(key.as_slice(), encoded)?;
                clocks.insert(edge_key, new_max.to_be_bytes())?;
                log.insert(seq.to_be_bytes(), key.as_slice())?;
                meta.insert(SEQ_KEY, seq.to_be_bytes())?;
            }
            Backend::Memory(m) => {
                let mut tables = m.write().map_err(poisoned)?;
                tables.statements.insert(key.clone(), encoded);
                tables.clocks.insert(edge_key.to_vec(), new_max);
                tables.log.insert(seq, key);
            }
        }
        self.seq.store(seq, Ordering::SeqCst);
        Ok(seq)
    }

    // ----- Reads -----

    /// Encoded statement stored at `(edge, clock)`, if any.
    pub fn get_raw(&self, edge_key: &[u8], clock: u64) -> Result<Option<Vec<u8>>> {
        let key = statement_key(edge_key, clock);
        match &self.backend {
            Backend::Fjall { statements, .. } => Ok(statements.get(&key)?.map(|v| v.to_vec())),
            Backend::Memory(m) => Ok(m.read().map_err(poisoned)?.statements.get(&key).cloned()),
        }
    }

    /// Highest clock stored for an edge.
    pub fn max_clock(&self, edge_key: &[u8]) -> Result<Option<u64>> {
        match &self.backend {
            Backend::Fjall { clocks, .. } => match clocks.get(edge_key)? {
                Some(v) => Ok(Some(be_u64(&v)?)),
                None => Ok(None),
            },
            Backend::Memory(m) => Ok(m.read().map_err(poisoned)?.clocks.get(edge_key).copied()),
        }
    }

    /// All statements whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Statement>> {
        match &self.backend {
            Backend::Fjall { statements, .. } => {
                let mut result = Vec::new();
                for guard in statements.prefix(prefix) {
                    let (_, v) = guard.into_inner().map_err(storage_err)?;
                    result.push(Statement::decode(&v)?);
                }
                Ok(result)
            }
            Backend::Memory(m) => {
                let tables = m.read().map_err(poisoned)?;
                tables
                    .statements
                    .range(prefix.to_vec()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(_, v)| Statement::decode(v))
                    .collect()
            }
        }
    }

    /// Up to `limit` statements with arrival sequence greater than `after`.
    pub fn since(&self, after: u64, limit: usize) -> Result<Vec<(u64, Statement)>> {
        let start = after.saturating_add(1);
        let keys: Vec<(u64, Vec<u8>)> = match &self.backend {
            Backend::Fjall { log, .. } => {
                let mut keys = Vec::new();
                for guard in log.range(start.to_be_bytes()..).take(limit) {
                    let (k, v) = guard.into_inner().map_err(storage_err)?;
                    keys.push((be_u64(&k)?, v.to_vec()));
                }
                keys
            }
            Backend::Memory(m) => m
                .read()
                .map_err(poisoned)?
                .log
                .range(start..)
                .take(limit)
                .map(|(seq, key)| (*seq, key.clone()))
                .collect(),
        };

        let mut result = Vec::with_capacity(keys.len());
        for (seq, key) in keys {
            let bytes = self
                .get_by_key(&key)?
                .ok_or_else(|| storage_err(format!("log entry {seq} points at a missing statement")))?;
            result.push((seq, Statement::decode(&bytes)?));
        }
        Ok(result)
    }

    fn get_by_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match &self.backend {
            Backend::Fjall { statements, .. } => Ok(statements.get(key)?.map(|v| v.to_vec())),
            Backend::Memory(m) => Ok(m.read().map_err(poisoned)?.statements.get(key).cloned()),
        }
    }

    /// Last assigned arrival sequence number (0 when empty).
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Number of stored statements.
    pub fn len(&self) -> Result<usize> {
        match &self.backend {
            Backend::Fjall { statements, .. } => {
                let mut n = 0;
                for guard in statements.iter() {
                    guard.key().map_err(storage_err)?;
                    n += 1;
                }
                Ok(n)
            }
            Backend::Memory(m) => Ok(m.read().map_err(poisoned)?.statements.len()),
        }
    }

    /// Whether the store holds no statements.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
