use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::{MAX_RECORD_BYTES, SNAPSHOT_CHUNK_BYTES};
use crate::model::{Ms, Mutation, Transaction};

/// Leading byte of every record payload. Bump when `Transaction` changes shape.
pub const FORMAT_VERSION: u8 = 1;

/// Encode one transaction as `[len][version][bincode][crc32]`. A payload
/// that replay would refuse is rejected here, before any byte is written.
pub fn encode_record(tx: &Transaction) -> io::Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(128);
    payload.push(FORMAT_VERSION);
    bincode::serialize_into(&mut payload, tx)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_RECORD_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "journal record of {} bytes exceeds the {MAX_RECORD_BYTES} byte limit",
                payload.len()
            ),
        ));
    }
    let mut record = Vec::with_capacity(payload.len() + 8);
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&payload);
    record.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(record)
}

/// Split a table snapshot into transactions of at most `budget` encoded
/// bytes each, keeping mutation order. A single mutation larger than the
/// budget gets a transaction of its own.
pub fn snapshot_records(committed_at: Ms, mutations: Vec<Mutation>) -> Vec<Transaction> {
    split_snapshot(committed_at, mutations, SNAPSHOT_CHUNK_BYTES as u64)
}

fn split_snapshot(committed_at: Ms, mutations: Vec<Mutation>, budget: u64) -> Vec<Transaction> {
    let mut records = Vec::new();
    let mut current = Vec::new();
    let mut size = 0u64;
    for m in mutations {
        let m_size = bincode::serialized_size(&m).unwrap_or(budget);
        if !current.is_empty() && size + m_size > budget {
            records.push(Transaction {
                committed_at,
                mutations: std::mem::take(&mut current),
            });
            size = 0;
        }
        size += m_size;
        current.push(m);
    }
    if !current.is_empty() {
        records.push(Transaction {
            committed_at,
            mutations: current,
        });
    }
    records
}

/// Append-only journal of committed transactions.
///
/// Record layout: `[u32: len][u8: version][bincode: Transaction][u32: crc32]`.
/// `len` covers the version byte and the bincode payload; the CRC covers the same bytes.
/// A torn or corrupt tail is discarded on replay, so a crash mid-append loses
/// only the transaction that was never acknowledged.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length up to the last successful `flush_sync`.
    durable_len: u64,
    pending_records: u64,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let durable_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            durable_len,
            pending_records: 0,
            appends_since_compact: 0,
        })
    }

    /// Open for appends after cutting the file back to `valid_len`, the end
    /// of the last intact record found by `replay_prefix`.
    pub fn open_at(path: &Path, valid_len: u64) -> io::Result<Self> {
        if let Ok(meta) = fs::metadata(path)
            && meta.len() > valid_len
        {
            tracing::warn!(
                dropped = meta.len() - valid_len,
                "truncating unreadable journal tail"
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
        }
        Self::open(path)
    }

    #[cfg(test)]
    pub fn append(&mut self, tx: &Transaction) -> io::Result<()> {
        self.append_buffered(tx)?;
        self.flush_sync()
    }

    /// Buffer one record. Nothing is durable until `flush_sync`.
    #[cfg(test)]
    pub fn append_buffered(&mut self, tx: &Transaction) -> io::Result<()> {
        let record = encode_record(tx)?;
        self.append_encoded(&record)
    }

    /// Buffer a record produced by `encode_record`.
    pub fn append_encoded(&mut self, record: &[u8]) -> io::Result<()> {
        self.writer.write_all(record)?;
        self.pending_records += 1;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.durable_len = self.writer.get_ref().metadata()?.len();
        self.pending_records = 0;
        Ok(())
    }

    /// Drop everything buffered or written since the last successful
    /// `flush_sync`, so none of it can come back on replay.
    pub fn discard_pending(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let old = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (old_file, _unwritten) = old.into_parts();
        old_file.set_len(self.durable_len)?;
        self.appends_since_compact = self.appends_since_compact.saturating_sub(self.pending_records);
        self.pending_records = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot journal to `<path>.tmp` and fsync it.
    pub fn write_compact_file(path: &Path, records: &[Transaction]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for tx in records {
            writer.write_all(&encode_record(tx)?)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Rename the snapshot over the live journal and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.pending_records = 0;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, records: &[Transaction]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every intact record. Stops at the first torn, oversized, corrupt
    /// or unknown-version record.
    pub fn replay(path: &Path) -> io::Result<Vec<Transaction>> {
        Ok(Self::replay_prefix(path)?.records)
    }

    /// Like `replay`, also reporting where the intact prefix ends and why
    /// reading stopped.
    pub fn replay_prefix(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Replay {
                    records: Vec::new(),
                    valid_len: 0,
                    tail: Tail::Clean,
                });
            }
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut valid_len = 0u64;

        let tail = loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break Tail::Torn,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_RECORD_BYTES {
                tracing::warn!(len, "journal record length out of range, truncating replay");
                break Tail::Torn;
            }

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break Tail::Torn,
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break Tail::Torn,
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!(offset = records.len(), "journal checksum mismatch, truncating replay");
                break Tail::Torn;
            }

            if payload[0] != FORMAT_VERSION {
                tracing::warn!(version = payload[0], "unknown journal format version");
                break Tail::Unreadable(format!("record with format version {}", payload[0]));
            }
            match bincode::deserialize::<Transaction>(&payload[1..]) {
                Ok(tx) => records.push(tx),
                Err(e) => break Tail::Unreadable(format!("undecodable record: {e}")),
            }
            valid_len += (len + 8) as u64;
        };
        let tail = if tail == Tail::Torn && valid_len == file_len {
            Tail::Clean
        } else {
            tail
        };

        Ok(Replay {
            records,
            valid_len,
            tail,
        })
    }
}

/// Why replay stopped reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tail {
    /// End of file on a record boundary.
    Clean,
    /// Partial or corrupt bytes after the last intact record, safe to cut.
    Torn,
    /// A well-formed record this build cannot read. Never cut.
    Unreadable(String),
}

#[derive(Debug)]
pub struct Replay {
    pub records: Vec<Transaction>,
    /// Byte length of the intact prefix.
    pub valid_len: u64,
    pub tail: Tail,
}
