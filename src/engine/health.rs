use std::path::Path;
use std::time::Instant;

use crate::model::*;

use super::{now_ms, Engine};

const WRITE_CHECK_FILE: &str = ".health";

/// Write and remove a scratch file in `dir`.
async fn dir_writable(dir: &Path) -> bool {
    let path = dir.join(WRITE_CHECK_FILE);
    let result = match tokio::fs::write(&path, b"ok").await {
        Ok(()) => tokio::fs::remove_file(&path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        tracing::warn!(dir = %dir.display(), "data directory not writable: {e}");
    }
    result.is_ok()
}

impl Engine {
    /// Liveness of the journal writer and the data directory, plus row counts.
    pub async fn health(&self) -> HealthReport {
        let started = Instant::now();
        let appends = self.journal_appends().await;
        if appends.is_none() {
            tracing::error!("journal writer not answering");
        }
        let storage_ok = dir_writable(&self.data_dir).await;
        let (bookings, artist_bookings, assignments) = {
            let tables = self.tables.read().await;
            (
                tables.bookings.len() as u64,
                tables.artist_bookings.len() as u64,
                tables.assignments.len() as u64,
            )
        };

        let status = match (appends.is_some(), storage_ok) {
            (false, _) => HealthStatus::Unhealthy,
            (true, false) => HealthStatus::Degraded,
            (true, true) => HealthStatus::Healthy,
        };
        HealthReport {
            status,
            journal_ok: appends.is_some(),
            storage_ok,
            bookings,
            artist_bookings,
            assignments,
            appends_since_compact: appends.unwrap_or(0),
            checked_at: now_ms(),
            response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}
