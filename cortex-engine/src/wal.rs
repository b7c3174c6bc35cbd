//! Write-ahead journal for the per-tenant Writer Queue (`spec.md` §4.B).
//!
//! Every submission is appended to the journal before being applied to
//! the ledger. On restart, a committer replays unacknowledged entries so
//! a crash between journal-append and ledger-commit cannot silently
//! drop a write.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::CortexError;
use crate::types::{TenantId, Transaction};

/// A durable, append-only log of submitted-but-not-yet-acknowledged
/// transactions for one tenant committer.
pub trait WalJournal: Send + Sync {
    /// Appends `tx` to the journal. Must be durable before returning.
    fn append(&self, tx: &Transaction) -> Result<(), CortexError>;
    /// Marks every entry up to and including `tx_id` as committed, so a
    /// future replay does not re-apply it.
    fn acknowledge(&self, tenant_id: &TenantId, up_to: u64) -> Result<(), CortexError>;
    /// Returns every entry not yet acknowledged, in submission order.
    fn replay(&self, tenant_id: &TenantId) -> Result<Vec<Transaction>, CortexError>;
}

/// In-memory journal, used by tests and the demo binary's ephemeral
/// mode. Replay survives only within the process, which is adequate for
/// its purpose: exercising the replay code path without touching disk.
#[derive(Default)]
pub struct InMemoryWalJournal {
    entries: Mutex<HashMap<TenantId, Vec<Transaction>>>,
}

impl InMemoryWalJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalJournal for InMemoryWalJournal {
    fn append(&self, tx: &Transaction) -> Result<(), CortexError> {
        let mut entries = self.entries.lock().map_err(|_| CortexError::Storage("wal mutex poisoned".to_string()))?;
        entries.entry(tx.tenant_id.clone()).or_default().push(tx.clone());
        Ok(())
    }

    fn acknowledge(&self, tenant_id: &TenantId, up_to: u64) -> Result<(), CortexError> {
        let mut entries = self.entries.lock().map_err(|_| CortexError::Storage("wal mutex poisoned".to_string()))?;
        if let Some(v) = entries.get_mut(tenant_id) {
            v.retain(|tx| tx.id.0 > up_to);
        }
        Ok(())
    }

    fn replay(&self, tenant_id: &TenantId) -> Result<Vec<Transaction>, CortexError> {
        let entries = self.entries.lock().map_err(|_| CortexError::Storage("wal mutex poisoned".to_string()))?;
        Ok(entries.get(tenant_id).cloned().unwrap_or_default())
    }
}

/// File-backed journal: one append-only file per tenant under `dir`,
/// with each record length-prefixed (4-byte big-endian length, then the
/// JSON-encoded [`Transaction`]).
pub struct FileWalJournal {
    dir: PathBuf,
    write_locks: Mutex<HashMap<TenantId, ()>>,
}

impl FileWalJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CortexError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CortexError::Storage(e.to_string()))?;
        Ok(Self { dir, write_locks: Mutex::new(HashMap::new()) })
    }

    fn path_for(&self, tenant_id: &TenantId) -> PathBuf {
        self.dir.join(format!("{}.wal", tenant_id.as_str()))
    }
}

impl WalJournal for FileWalJournal {
    fn append(&self, tx: &Transaction) -> Result<(), CortexError> {
        let _guard = self.write_locks.lock().map_err(|_| CortexError::Storage("wal mutex poisoned".to_string()))?;
        let path = self.path_for(&tx.tenant_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CortexError::Storage(e.to_string()))?;

        let body = serde_json::to_vec(tx).map_err(|e| CortexError::EncodingError(e.to_string()))?;
        let len = (body.len() as u32).to_be_bytes();
        file.write_all(&len).map_err(|e| CortexError::Storage(e.to_string()))?;
        file.write_all(&body).map_err(|e| CortexError::Storage(e.to_string()))?;
        file.flush().map_err(|e| CortexError::Storage(e.to_string()))?;
        Ok(())
    }

    fn acknowledge(&self, tenant_id: &TenantId, up_to: u64) -> Result<(), CortexError> {
        // Rewrite the journal with only the entries past `up_to`. Simple
        // and correct; tenant journals are bounded by queue capacity so
        // this is not a throughput-critical path.
        let remaining: Vec<Transaction> = self
            .replay(tenant_id)?
            .into_iter()
            .filter(|tx| tx.id.0 > up_to)
            .collect();

        let path = self.path_for(tenant_id);
        let tmp_path = path.with_extension("wal.tmp");
        {
            let mut file = File::create(&tmp_path).map_err(|e| CortexError::Storage(e.to_string()))?;
            for tx in &remaining {
                let body = serde_json::to_vec(tx).map_err(|e| CortexError::EncodingError(e.to_string()))?;
                let len = (body.len() as u32).to_be_bytes();
                file.write_all(&len).map_err(|e| CortexError::Storage(e.to_string()))?;
                file.write_all(&body).map_err(|e| CortexError::Storage(e.to_string()))?;
            }
            file.flush().map_err(|e| CortexError::Storage(e.to_string()))?;
        }
        std::fs::rename(&tmp_path, &path).map_err(|e| CortexError::Storage(e.to_string()))?;
        Ok(())
    }

    fn replay(&self, tenant_id: &TenantId) -> Result<Vec<Transaction>, CortexError> {
        let path = self.path_for(tenant_id);
        if !Path::new(&path).exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|e| CortexError::Storage(e.to_string()))?;
        let mut reader = BufReader::new(file);
        let mut out = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(CortexError::Storage(e.to_string())),
            }
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).map_err(|e| CortexError::Storage(e.to_string()))?;
            let tx: Transaction = serde_json::from_slice(&body).map_err(|e| CortexError::EncodingError(e.to_string()))?;
            out.push(tx);
        }
        Ok(out)
    }
}
