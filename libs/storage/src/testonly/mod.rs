//! Test-only utilities.
use std::sync::{Arc, Mutex};

use tbft_roles::validator::Height;

use crate::{
    file::{encode, parse},
    Wal, WalEntry, WalError, WalWriteMode,
};

/// In-memory [`Wal`]. Clones share the same log, so that a test can
/// "restart" a node on top of the log left behind by its previous instance.
/// Records go through the same encoding as [`crate::FileWal`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryWal(Arc<Mutex<Vec<u8>>>);

impl InMemoryWal {
    /// Raw bytes of the log.
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    /// Cuts the log down to `len` bytes, simulating a crash in the middle of a write.
    pub fn truncate(&self, len: usize) {
        self.0.lock().unwrap().truncate(len);
    }

    /// Decoded entries of the log.
    pub fn entries(&self) -> Vec<WalEntry> {
        parse(&self.0.lock().unwrap()).unwrap().0
    }

    /// Byte offsets at which the records end.
    pub fn record_ends(&self) -> Vec<usize> {
        let entries = self.entries();
        let mut ends = vec![];
        let mut offset = 0;
        for e in &entries {
            offset += encode(e).len();
            ends.push(offset);
        }
        ends
    }
}

impl Wal for InMemoryWal {
    fn mode(&self) -> WalWriteMode {
        WalWriteMode::Sync
    }

    fn append(&mut self, entry: &WalEntry) -> Result<(), WalError> {
        self.0.lock().unwrap().extend(encode(entry));
        Ok(())
    }

    fn replay(&mut self) -> Result<Vec<WalEntry>, WalError> {
        let mut bytes = self.0.lock().unwrap();
        let (entries, valid) = parse(&bytes)?;
        bytes.truncate(valid);
        Ok(entries)
    }

    fn compact(&mut self, height: Height) -> Result<(), WalError> {
        *self.0.lock().unwrap() = encode(&WalEntry::Checkpoint { height });
        Ok(())
    }
}
