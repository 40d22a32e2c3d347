mod artists;
mod assignments;
pub mod auto_assign;
mod bookings;
mod error;
mod health;
mod inventory;
mod queries;
mod store;
mod validate;

pub use error::{Entity, EngineError};
pub use inventory::{count_artist_demand, count_demand};
pub use store::Tables;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::catalog::Catalog;
use crate::model::*;
use crate::signature::SignatureStore;
use crate::wal::{Tail, Wal};

pub const WAL_FILE_NAME: &str = "eventdesk.wal";

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

// ── Group-commit journal channel ─────────────────────────

enum WalCommand {
    Append {
        tx: Transaction,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<Transaction>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = Vec<(Transaction, oneshot::Sender<io::Result<()>>)>;

/// Owns the journal. Appends that arrive while a flush is being prepared are
/// batched into one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { tx, response } => {
                let mut batch = vec![(tx, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { tx, response }) => batch.push((tx, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                flush_and_respond(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Pending) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let results = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    for ((_, response), result) in batch.drain(..).zip(results) {
        let _ = response.send(result);
    }
}

/// One result per transaction, in batch order. A transaction that cannot be
/// encoded fails alone. A write or fsync failure fails every transaction in
/// the batch and cuts the batch back out of the file.
fn flush_batch(wal: &mut Wal, batch: &Pending) -> Vec<io::Result<()>> {
    let encoded: Vec<io::Result<Vec<u8>>> =
        batch.iter().map(|(tx, _)| crate::wal::encode_record(tx)).collect();
    for e in encoded.iter().filter_map(|r| r.as_ref().err()) {
        tracing::error!("journal record refused: {e}");
    }

    let written = encoded
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .try_for_each(|record| wal.append_encoded(record))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &written {
        tracing::error!("journal flush failed for {} transactions: {e}", batch.len());
        if let Err(e) = wal.discard_pending() {
            tracing::error!("failed batch could not be cut from the journal: {e}");
        }
    }

    encoded
        .into_iter()
        .map(|record| match (record, &written) {
            (Err(e), _) => Err(e),
            (Ok(_), Ok(())) => Ok(()),
            (Ok(_), Err(e)) => Err(io::Error::new(e.kind(), e.to_string())),
        })
        .collect()
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { records, response } => {
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

/// The registration database: relational tables behind one lock, a journal,
/// the static catalog and the signature directory.
///
/// Every write takes the table write lock for its whole check-then-commit
/// sequence, so duplicate, quota and capacity checks see the rows they guard.
pub struct Engine {
    pub(super) tables: RwLock<Tables>,
    pub(super) catalog: Arc<Catalog>,
    pub(super) signatures: SignatureStore,
    data_dir: PathBuf,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    /// Replay `<data_dir>/eventdesk.wal` and start the journal writer.
    /// Must be called inside a tokio runtime.
    pub fn new(data_dir: &Path, catalog: Arc<Catalog>) -> io::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let wal_path: PathBuf = data_dir.join(WAL_FILE_NAME);
        let replay = Wal::replay_prefix(&wal_path)?;
        if let Tail::Unreadable(reason) = &replay.tail {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: {reason}", wal_path.display()),
            ));
        }
        let records = replay.records;
        let wal = Wal::open_at(&wal_path, replay.valid_len)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut tables = Tables::new();
        for tx in &records {
            for m in &tx.mutations {
                tables.apply(m);
            }
        }
        tracing::info!(
            transactions = records.len(),
            bookings = tables.bookings.len(),
            assignments = tables.assignments.len(),
            "journal replayed"
        );

        Ok(Self {
            tables: RwLock::new(tables),
            catalog,
            signatures: SignatureStore::new(data_dir),
            data_dir: data_dir.to_path_buf(),
            wal_tx,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn wal_append(&self, tx: Transaction) -> Result<(), EngineError> {
        let (response, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { tx, response })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Journal the mutations as one transaction, then apply them.
    /// The caller holds the write guard. On error nothing is applied.
    pub(super) async fn commit(
        &self,
        tables: &mut Tables,
        mutations: Vec<Mutation>,
    ) -> Result<(), EngineError> {
        if mutations.is_empty() {
            return Ok(());
        }
        let tx = Transaction {
            committed_at: now_ms(),
            mutations,
        };
        self.wal_append(tx.clone()).await?;
        for m in &tx.mutations {
            tables.apply(m);
        }
        Ok(())
    }

    /// Rewrite the journal as a snapshot of the current tables, split into
    /// records that stay under the replay size limit.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Holding the read lock keeps writers out until the swap is done, so no
        // append can land between the snapshot and the rename.
        let tables = self.tables.read().await;
        let records = crate::wal::snapshot_records(now_ms(), tables.snapshot());
        let (response, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { records, response })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.journal_appends().await.unwrap_or(0)
    }

    /// `None` when the journal writer no longer answers.
    pub(super) async fn journal_appends(&self) -> Option<u64> {
        let (response, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response })
            .await
            .ok()?;
        rx.await.ok()
    }
}
