/// Upper bound on `amount_shifts` for a single booking.
pub const MAX_SHIFTS_PER_BOOKING: u8 = 3;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_TEXT_LEN: usize = 4_000;
pub const MAX_NOTES_LEN: usize = 2_000;

/// Max material/profession ids attached to one booking.
pub const MAX_IDS_PER_LIST: usize = 64;

/// Max booking x timeslot pairs in one bulk assignment request.
pub const MAX_BULK_PAIRS: usize = 10_000;

/// Decoded signature images larger than this are rejected.
pub const MAX_SIGNATURE_BYTES: usize = 2 * 1024 * 1024;

/// Journal records larger than this are refused on write and treated as
/// corrupt on replay.
pub const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

/// Target size of one compaction snapshot record.
pub const SNAPSHOT_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// How long a form-content read waits for the table lock before falling back
/// to zero counts.
pub const FORM_CONTENT_READ_TIMEOUT_MS: u64 = 2_000;

/// Auto-assignment runs slower than this are logged as a warning.
pub const AUTO_ASSIGN_SLOW_SECS: u64 = 30;
