use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "eventdesk_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "eventdesk_query_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: registrations stored. Labels: kind (attendee, artist).
pub const BOOKINGS_CREATED_TOTAL: &str = "eventdesk_bookings_created_total";

/// Counter: registrations rejected as duplicates. Labels: kind.
pub const BOOKINGS_DUPLICATE_TOTAL: &str = "eventdesk_bookings_duplicate_total";

/// Counter: assignment rows created. Labels: source (manual, bulk, auto).
pub const ASSIGNMENTS_CREATED_TOTAL: &str = "eventdesk_assignments_created_total";

/// Counter: assignment attempts refused. Labels: reason.
pub const ASSIGNMENTS_REJECTED_TOTAL: &str = "eventdesk_assignments_rejected_total";

/// Histogram: auto-assignment run time in seconds. Labels: strategy.
pub const AUTO_ASSIGN_DURATION_SECONDS: &str = "eventdesk_auto_assign_duration_seconds";

/// Counter: confirmation mails that failed to send.
pub const MAIL_FAILURES_TOTAL: &str = "eventdesk_mail_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "eventdesk_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "eventdesk_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "eventdesk_connections_rejected_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "eventdesk_wal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (transactions per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "eventdesk_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op when `port` is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectFormContent => "select_form_content",
        Command::SelectArtistFormContent => "select_artist_form_content",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectArtistBookings { .. } => "select_artist_bookings",
        Command::SelectAssignments { .. } => "select_assignments",
        Command::SelectBookingSummary => "select_booking_summary",
        Command::SelectTimeslotSummary => "select_timeslot_summary",
        Command::SelectShiftCount { .. } => "select_shift_count",
        Command::SelectTimeslotCount { .. } => "select_timeslot_count",
        Command::InsertBooking(_) => "insert_booking",
        Command::InsertAttendeeBooking { .. } => "insert_attendee_booking",
        Command::UpdateBooking { .. } => "update_booking",
        Command::UpdatePayment { .. } => "update_payment",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::InsertArtistBooking(_) => "insert_artist_booking",
        Command::UpdateArtistBooking { .. } => "update_artist_booking",
        Command::UpdateArtistPayment { .. } => "update_artist_payment",
        Command::DeleteArtistBooking { .. } => "delete_artist_booking",
        Command::InsertAssignment { .. } => "insert_assignment",
        Command::UpdateAssignment { .. } => "update_assignment",
        Command::DeleteAssignment { .. } => "delete_assignment",
        Command::BulkAssign { .. } => "bulk_assign",
        Command::AutoAssign { .. } => "auto_assign",
        Command::ResendConfirmation { .. } => "resend_confirmation",
        Command::ResendArtistConfirmation { .. } => "resend_artist_confirmation",
        Command::SelectHealth => "select_health",
    }
}
