use serde::{Deserialize, Serialize};

/// Unix milliseconds.
pub type Ms = i64;

pub type AttendeeId = u64;
pub type BookingId = u64;
pub type ArtistId = u64;
pub type ArtistBookingId = u64;
pub type AssignmentId = u64;

/// Position of a ticket/beverage/food/material/profession in the catalog.
pub type OptionId = u32;
/// Global timeslot index across all work shifts of the catalog.
pub type TimeslotId = u32;

// ── People ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl Person {
    pub fn key(&self) -> PersonKey {
        PersonKey {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// The (first_name, last_name, email) triple that must be unique per registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonKey {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub id: AttendeeId,
    pub person: Person,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub person: Person,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub is_paid: bool,
    pub paid_amount: f64,
    pub payment_notes: String,
    pub payment_date: Option<String>,
}

/// Everything an attendee picks on the form, minus the association lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingChoices {
    pub ticket_id: Option<OptionId>,
    pub beverage_id: Option<OptionId>,
    pub food_id: Option<OptionId>,
    pub timeslot_priority_1: Option<TimeslotId>,
    pub timeslot_priority_2: Option<TimeslotId>,
    pub timeslot_priority_3: Option<TimeslotId>,
    /// Max number of shifts this person will work (0..=3).
    pub amount_shifts: u8,
    pub supporter_buddy: String,
    pub total_price: f64,
}

impl BookingChoices {
    /// Preferred timeslot at `level` (1, 2 or 3).
    pub fn priority(&self, level: u8) -> Option<TimeslotId> {
        match level {
            1 => self.timeslot_priority_1,
            2 => self.timeslot_priority_2,
            3 => self.timeslot_priority_3,
            _ => None,
        }
    }

    /// Rank (1..=3) of `timeslot_id` among the preferences, or 0 if absent.
    pub fn rank_of(&self, timeslot_id: TimeslotId) -> u8 {
        (1..=3)
            .find(|&level| self.priority(level) == Some(timeslot_id))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRow {
    pub id: BookingId,
    pub attendee_id: AttendeeId,
    pub choices: BookingChoices,
    pub payment: Payment,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub person: Person,
    pub choices: BookingChoices,
    pub material_ids: Vec<OptionId>,
    pub profession_ids: Vec<OptionId>,
    /// Base64 image, optionally with a `data:...;base64,` prefix.
    pub signature: String,
}

/// Extra booking attached by an admin to an attendee that already exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraBooking {
    pub choices: BookingChoices,
    pub material_ids: Vec<OptionId>,
    pub profession_ids: Vec<OptionId>,
}

/// Full-record update. Association lists are replaced wholesale when `Some`.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingUpdate {
    pub person: Person,
    pub choices: BookingChoices,
    pub material_ids: Option<Vec<OptionId>>,
    pub profession_ids: Option<Vec<OptionId>>,
}

/// A booking joined with its attendee and association ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingRecord {
    pub id: BookingId,
    pub attendee_id: AttendeeId,
    #[serde(flatten)]
    pub person: Person,
    #[serde(flatten)]
    pub choices: BookingChoices,
    pub material_ids: Vec<OptionId>,
    pub profession_ids: Vec<OptionId>,
    #[serde(flatten)]
    pub payment: Payment,
    pub created_at: Ms,
}

// ── Artist bookings ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistChoices {
    pub ticket_id: Option<OptionId>,
    pub beverage_id: Option<OptionId>,
    pub food_id: Option<OptionId>,
    pub total_price: f64,
    pub equipment: String,
    pub special_requests: String,
    pub performance_details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistBookingRow {
    pub id: ArtistBookingId,
    pub artist_id: ArtistId,
    pub choices: ArtistChoices,
    pub payment: Payment,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewArtistBooking {
    pub person: Person,
    pub choices: ArtistChoices,
    pub artist_material_ids: Vec<OptionId>,
    pub profession_ids: Vec<OptionId>,
    pub payment: Payment,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistBookingUpdate {
    pub person: Person,
    pub choices: ArtistChoices,
    pub payment: Payment,
    pub artist_material_ids: Option<Vec<OptionId>>,
    pub profession_ids: Option<Vec<OptionId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistBookingRecord {
    pub id: ArtistBookingId,
    pub artist_id: ArtistId,
    #[serde(flatten)]
    pub person: Person,
    #[serde(flatten)]
    pub choices: ArtistChoices,
    pub artist_material_ids: Vec<OptionId>,
    pub profession_ids: Vec<OptionId>,
    #[serde(flatten)]
    pub payment: Payment,
    pub created_at: Ms,
}

/// Result of a duplicate-checked insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome<Id> {
    Inserted(Id),
    Duplicate,
}

// ── Shift assignments ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub id: AssignmentId,
    pub booking_id: BookingId,
    pub timeslot_id: TimeslotId,
    pub is_confirmed: bool,
    pub admin_notes: String,
    pub assigned_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentDetail {
    pub id: AssignmentId,
    pub booking_id: BookingId,
    pub timeslot_id: TimeslotId,
    pub is_confirmed: bool,
    pub admin_notes: String,
    pub assigned_at: Ms,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub workshift_title: String,
    pub timeslot_title: String,
    pub timeslot_start: String,
    pub timeslot_end: String,
    /// 1..=3 when the timeslot was one of the booking's preferences, else 0.
    pub priority: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentFilter {
    All,
    ByBooking(BookingId),
    ByTimeslot(TimeslotId),
}

/// Outcome of a manual assignment. Conflicts are values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateAssignment {
    Created(AssignmentId),
    Duplicate,
    BookingAtQuota { current: u32, max: u8 },
    TimeslotFull { current: u32, capacity: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingShiftSummary {
    pub booking_id: BookingId,
    pub first_name: String,
    pub last_name: String,
    pub max_shifts: u8,
    pub assigned_shifts: u32,
    pub is_fully_assigned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeslotSummary {
    pub timeslot_id: TimeslotId,
    pub workshift_title: String,
    pub timeslot_title: String,
    pub start_time: String,
    pub end_time: String,
    pub capacity: u32,
    pub assigned_count: u32,
    pub remaining: u32,
    pub is_filled: bool,
    pub fill_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but the data directory refuses writes.
    Degraded,
    /// The journal writer is gone; every write would fail.
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub journal_ok: bool,
    pub storage_ok: bool,
    pub bookings: u64,
    pub artist_bookings: u64,
    pub assignments: u64,
    /// Journal records since the last compaction; 0 when the journal is down.
    pub appends_since_compact: u64,
    pub checked_at: Ms,
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkFailureReason {
    UnknownBooking,
    UnknownTimeslot,
    BookingAtQuota,
    TimeslotFull,
    AlreadyAssigned,
}

impl BulkFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkFailureReason::UnknownBooking => "unknown_booking",
            BulkFailureReason::UnknownTimeslot => "unknown_timeslot",
            BulkFailureReason::BookingAtQuota => "booking_at_quota",
            BulkFailureReason::TimeslotFull => "timeslot_full",
            BulkFailureReason::AlreadyAssigned => "duplicate",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            BulkFailureReason::UnknownBooking => "booking not found",
            BulkFailureReason::UnknownTimeslot => "timeslot not found",
            BulkFailureReason::BookingAtQuota => "booking at maximum shifts",
            BulkFailureReason::TimeslotFull => "timeslot at capacity",
            BulkFailureReason::AlreadyAssigned => "assignment already exists",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkAssignFailure {
    pub booking_id: BookingId,
    pub timeslot_id: TimeslotId,
    pub reason: BulkFailureReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAssignResult {
    pub successful_assignments: u32,
    pub failed_assignments: Vec<BulkAssignFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Every booking's 1st choice before anyone's 2nd choice.
    Priority,
    /// Scarcest timeslots first, candidates ordered by preference rank.
    Fill,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Priority => "priority",
            Strategy::Fill => "fill",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(Strategy::Priority),
            "fill" => Ok(Strategy::Fill),
            other => Err(format!("unknown strategy '{other}' (expected 'priority' or 'fill')")),
        }
    }
}

/// A booking has all its shifts once `assigned` reaches its quota. A
/// zero-shift booking is always complete.
pub fn quota_met(assigned: u32, amount_shifts: u8) -> bool {
    assigned >= u32::from(amount_shifts)
}

/// A timeslot is filled once `assigned` reaches its capacity. A zero-capacity
/// timeslot is always filled.
pub fn timeslot_filled(assigned: u32, capacity: u32) -> bool {
    assigned >= capacity
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutoAssignStats {
    pub strategy: Strategy,
    pub assignments_made: u32,
    pub bookings_satisfied: u32,
    pub timeslots_filled: u32,
}

// ── Journal records ──────────────────────────────────────────────

/// Id counters, persisted so ids are never reused after rows are deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequences {
    pub attendee: AttendeeId,
    pub booking: BookingId,
    pub artist: ArtistId,
    pub artist_booking: ArtistBookingId,
    pub assignment: AssignmentId,
}

/// Row-level change. A committed operation is a list of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    AttendeeInserted(Attendee),
    AttendeeUpdated(Attendee),
    AttendeeDeleted {
        id: AttendeeId,
    },
    BookingInserted {
        row: BookingRow,
        material_ids: Vec<OptionId>,
        profession_ids: Vec<OptionId>,
    },
    BookingUpdated(BookingRow),
    BookingMaterialsReplaced {
        booking_id: BookingId,
        material_ids: Vec<OptionId>,
    },
    BookingProfessionsReplaced {
        booking_id: BookingId,
        profession_ids: Vec<OptionId>,
    },
    BookingPaymentUpdated {
        booking_id: BookingId,
        payment: Payment,
    },
    BookingDeleted {
        id: BookingId,
    },
    ArtistInserted(Artist),
    ArtistUpdated(Artist),
    ArtistDeleted {
        id: ArtistId,
    },
    ArtistBookingInserted {
        row: ArtistBookingRow,
        artist_material_ids: Vec<OptionId>,
        profession_ids: Vec<OptionId>,
    },
    ArtistBookingUpdated(ArtistBookingRow),
    ArtistMaterialsReplaced {
        booking_id: ArtistBookingId,
        artist_material_ids: Vec<OptionId>,
    },
    ArtistProfessionsReplaced {
        booking_id: ArtistBookingId,
        profession_ids: Vec<OptionId>,
    },
    ArtistPaymentUpdated {
        booking_id: ArtistBookingId,
        payment: Payment,
    },
    ArtistBookingDeleted {
        id: ArtistBookingId,
    },
    AssignmentInserted(AssignmentRow),
    AssignmentUpdated {
        id: AssignmentId,
        is_confirmed: bool,
        admin_notes: String,
    },
    AssignmentDeleted {
        id: AssignmentId,
    },
    /// Drops every assignment row (start of an auto-assignment run).
    AssignmentsCleared,
    SequencesRestored(Sequences),
}

/// One committed operation. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub committed_at: Ms,
    pub mutations: Vec<Mutation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices(p1: Option<u32>, p2: Option<u32>, p3: Option<u32>) -> BookingChoices {
        BookingChoices {
            timeslot_priority_1: p1,
            timeslot_priority_2: p2,
            timeslot_priority_3: p3,
            amount_shifts: 2,
            ..Default::default()
        }
    }

    #[test]
    fn priority_levels() {
        let c = choices(Some(4), None, Some(7));
        assert_eq!(c.priority(1), Some(4));
        assert_eq!(c.priority(2), None);
        assert_eq!(c.priority(3), Some(7));
        assert_eq!(c.priority(4), None);
    }

    #[test]
    fn rank_of_prefers_highest_priority() {
        let c = choices(Some(4), Some(4), Some(9));
        assert_eq!(c.rank_of(4), 1);
        assert_eq!(c.rank_of(9), 3);
        assert_eq!(c.rank_of(5), 0);
    }

    #[test]
    fn person_key_ignores_phone() {
        let a = Person {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.org".into(),
            phone: "1".into(),
        };
        let mut b = a.clone();
        b.phone = "2".into();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("priority".parse::<Strategy>(), Ok(Strategy::Priority));
        assert_eq!(" FILL ".parse::<Strategy>(), Ok(Strategy::Fill));
        assert!("greedy".parse::<Strategy>().is_err());
    }

    #[test]
    fn booking_record_serializes_flat() {
        let record = BookingRecord {
            id: 1,
            attendee_id: 2,
            person: Person {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@example.org".into(),
                phone: "".into(),
            },
            choices: choices(Some(0), None, None),
            material_ids: vec![1, 2],
            profession_ids: vec![],
            payment: Payment::default(),
            created_at: 0,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["first_name"], "Ada");
        assert_eq!(json["timeslot_priority_1"], 0);
        assert_eq!(json["is_paid"], false);
        assert_eq!(json["material_ids"], serde_json::json!([1, 2]));
    }

    #[test]
    fn transaction_bincode_roundtrip() {
        let tx = Transaction {
            committed_at: 42,
            mutations: vec![
                Mutation::AttendeeDeleted { id: 3 },
                Mutation::AssignmentsCleared,
            ],
        };
        let bytes = bincode::serialize(&tx).unwrap();
        let decoded: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(tx, decoded);
    }
}
