//! WAL backed by a single append-only file.
//!
//! Every record is a big-endian `u32` length followed by the protobuf encoding
//! of a [`WalEntry`]. A record cut short by a crash is dropped (and the file
//! truncated) when the log is opened.
use std::{
    fs,
    io::{Seek as _, SeekFrom, Write as _},
    path::{Path, PathBuf},
};

use prost::Message as _;
use tbft_protobuf::ProtoFmt as _;
use tbft_roles::validator::Height;

use crate::{
    metrics::{WalEntryLabel, METRICS},
    Wal, WalEntry, WalError, WalWriteMode,
};

/// Size of the length prefix.
const LEN_SIZE: usize = 4;

/// File-backed [`Wal`].
#[derive(Debug)]
pub struct FileWal {
    path: PathBuf,
    file: fs::File,
    mode: WalWriteMode,
    size: u64,
}

/// Parses the records in `bytes`. Returns the entries and the length of the
/// prefix of `bytes` made of complete records.
pub(crate) fn parse(bytes: &[u8]) -> Result<(Vec<WalEntry>, usize), WalError> {
    let mut entries = vec![];
    let mut offset = 0;
    while bytes.len() - offset >= LEN_SIZE {
        let mut len = [0; LEN_SIZE];
        len.copy_from_slice(&bytes[offset..offset + LEN_SIZE]);
        let len = u32::from_be_bytes(len) as usize;
        let start = offset + LEN_SIZE;
        let Some(data) = bytes.get(start..start + len) else {
            break;
        };
        let entry = tbft_protobuf::decode(data).map_err(|err| WalError::Decode {
            offset: offset as u64,
            err,
        })?;
        entries.push(entry);
        offset = start + len;
    }
    Ok((entries, offset))
}

pub(crate) fn encode(entry: &WalEntry) -> Vec<u8> {
    let data = entry.build().encode_to_vec();
    let mut buf = Vec::with_capacity(LEN_SIZE + data.len());
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&data);
    buf
}

impl FileWal {
    /// Opens the log at `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>, mode: WalWriteMode) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let bytes = fs::read(&path)?;
        let (entries, valid) = parse(&bytes)?;
        if valid < bytes.len() {
            tracing::warn!(
                path = %path.display(),
                dropped = bytes.len() - valid,
                "WAL ends with a partial record: truncating"
            );
            METRICS.truncated_tails.inc();
            file.set_len(valid as u64)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;
        tracing::info!(path = %path.display(), entries = entries.len(), "opened WAL");
        METRICS.size.set(valid as u64);
        Ok(Self {
            path,
            file,
            mode,
            size: valid as u64,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("compact")
    }
}

impl Wal for FileWal {
    fn mode(&self) -> WalWriteMode {
        self.mode
    }

    fn append(&mut self, entry: &WalEntry) -> Result<(), WalError> {
        let t = METRICS.append_latency.start();
        let buf = encode(entry);
        self.file.write_all(&buf)?;
        if self.mode == WalWriteMode::Sync {
            self.file.sync_data()?;
        }
        t.observe();
        self.size += buf.len() as u64;
        METRICS.size.set(self.size);
        METRICS.appended[&WalEntryLabel::from(entry)].inc();
        Ok(())
    }

    fn replay(&mut self) -> Result<Vec<WalEntry>, WalError> {
        let bytes = fs::read(&self.path)?;
        let (entries, _) = parse(&bytes)?;
        METRICS.replayed.inc_by(entries.len() as u64);
        Ok(entries)
    }

    fn compact(&mut self, height: Height) -> Result<(), WalError> {
        let buf = encode(&WalEntry::Checkpoint { height });
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&buf)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)?;
        file.seek(SeekFrom::End(0))?;
        self.file = file;
        self.size = buf.len() as u64;
        METRICS.size.set(self.size);
        tracing::debug!(%height, "compacted WAL");
        Ok(())
    }
}

impl Drop for FileWal {
    fn drop(&mut self) {
        if let Err(err) = self.file.flush().and_then(|()| self.file.sync_data()) {
            tracing::warn!("failed to sync WAL on drop: {err}");
        }
    }
}
