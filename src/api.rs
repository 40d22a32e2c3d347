//! Typed request surface over the engine.
//!
//! Every transport goes through [`Api`]: it checks the caller's role, maps
//! engine failures onto [`ApiError`] (which knows its HTTP status), and sends
//! confirmation mail after a registration commits.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::{ArtistFormContent, FormContent};
use crate::engine::{Engine, EngineError};
use crate::mail::{self, ConfirmationMail, Mailer};
use crate::model::*;
use crate::observability::MAIL_FAILURES_TOTAL;

pub const ADMIN_ROLE: &str = "admin";

/// Caller role as established by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    pub fn new(role: impl Into<String>) -> Self {
        Identity(role.into())
    }

    pub fn admin() -> Self {
        Identity(ADMIN_ROLE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.0 == ADMIN_ROLE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Validation(String),
    Forbidden,
    NotFound(String),
    /// Details are logged where the error is created, never returned.
    Internal,
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Forbidden => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Internal => 500,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Validation(msg) => f.write_str(msg),
            ApiError::Forbidden => f.write_str("admin role required"),
            ApiError::NotFound(msg) => f.write_str(msg),
            ApiError::Internal => f.write_str("internal server error"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(..) => ApiError::NotFound(e.to_string()),
            EngineError::AlreadyExists(..)
            | EngineError::Invalid { .. }
            | EngineError::LimitExceeded(_) => ApiError::Validation(e.to_string()),
            EngineError::WalError(ref detail) => {
                error!(detail = %detail, "journal write failed");
                ApiError::Internal
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShiftCount {
    pub booking_id: BookingId,
    pub assigned: u32,
    pub max: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeslotCount {
    pub timeslot_id: TimeslotId,
    pub assigned: u32,
    pub capacity: u32,
}

pub struct Api {
    engine: Arc<Engine>,
    mailer: Arc<dyn Mailer>,
}

fn require_admin(who: &Identity) -> Result<(), ApiError> {
    if who.is_admin() {
        Ok(())
    } else {
        warn!(role = who.as_str(), "admin operation refused");
        Err(ApiError::Forbidden)
    }
}

impl Api {
    pub fn new(engine: Arc<Engine>, mailer: Arc<dyn Mailer>) -> Self {
        Api { engine, mailer }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn dispatch(&self, mail: ConfirmationMail) {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&mail).await {
                metrics::counter!(MAIL_FAILURES_TOTAL).increment(1);
                error!(to = %mail.to, "confirmation mail not sent: {e}");
            }
        });
    }

    async fn deliver(&self, mail: ConfirmationMail) -> Result<String, ApiError> {
        match self.mailer.send(&mail).await {
            Ok(()) => {
                info!(to = %mail.to, "confirmation mail resent");
                Ok(mail.to)
            }
            Err(e) => {
                metrics::counter!(MAIL_FAILURES_TOTAL).increment(1);
                error!(to = %mail.to, "confirmation mail not resent: {e}");
                Err(ApiError::Internal)
            }
        }
    }

    // ── Public ──────────────────────────────────────────

    pub async fn form_content(&self) -> FormContent {
        self.engine.up_to_date_form_content().await
    }

    pub async fn artist_form_content(&self) -> ArtistFormContent {
        self.engine.up_to_date_artist_form_content().await
    }

    /// Open to every role so load balancers can poll it.
    pub async fn health(&self) -> HealthReport {
        let report = self.engine.health().await;
        match report.status {
            HealthStatus::Healthy => {
                tracing::debug!(response_time_ms = report.response_time_ms, "health check passed")
            }
            HealthStatus::Degraded => warn!(storage_ok = report.storage_ok, "health check degraded"),
            HealthStatus::Unhealthy => error!(journal_ok = report.journal_ok, "health check failed"),
        }
        report
    }

    /// Store a registration and queue its confirmation mail. Mail trouble
    /// never turns a stored booking into a failure.
    pub async fn submit_booking(
        &self,
        new: NewBooking,
    ) -> Result<InsertOutcome<BookingId>, ApiError> {
        let outcome = self.engine.insert_booking(new).await?;
        if let InsertOutcome::Inserted(id) = outcome {
            match self.engine.get_booking(id).await {
                Ok(record) => {
                    let content = self.engine.up_to_date_form_content().await;
                    self.dispatch(mail::render_booking_confirmation(&record, &content));
                }
                Err(e) => warn!(booking_id = id, "booking vanished before mail: {e}"),
            }
        }
        Ok(outcome)
    }

    pub async fn submit_artist_booking(
        &self,
        new: NewArtistBooking,
    ) -> Result<InsertOutcome<ArtistBookingId>, ApiError> {
        let outcome = self.engine.insert_artist_booking(new).await?;
        if let InsertOutcome::Inserted(id) = outcome {
            match self.engine.get_artist_booking(id).await {
                Ok(record) => {
                    let content = self.engine.up_to_date_artist_form_content().await;
                    self.dispatch(mail::render_artist_confirmation(&record, &content));
                }
                Err(e) => warn!(artist_booking_id = id, "artist booking vanished before mail: {e}"),
            }
        }
        Ok(outcome)
    }

    // ── Bookings (admin) ────────────────────────────────

    pub async fn list_bookings(&self, who: &Identity) -> Result<Vec<BookingRecord>, ApiError> {
        require_admin(who)?;
        Ok(self.engine.list_bookings().await)
    }

    pub async fn get_booking(&self, who: &Identity, id: BookingId) -> Result<BookingRecord, ApiError> {
        require_admin(who)?;
        Ok(self.engine.get_booking(id).await?)
    }

    pub async fn add_booking_for_attendee(
        &self,
        who: &Identity,
        attendee_id: AttendeeId,
        extra: ExtraBooking,
    ) -> Result<BookingId, ApiError> {
        require_admin(who)?;
        Ok(self.engine.add_booking_for_attendee(attendee_id, extra).await?)
    }

    pub async fn update_booking(
        &self,
        who: &Identity,
        id: BookingId,
        update: BookingUpdate,
    ) -> Result<BookingRecord, ApiError> {
        require_admin(who)?;
        Ok(self.engine.update_booking(id, update).await?)
    }

    pub async fn update_payment(
        &self,
        who: &Identity,
        id: BookingId,
        payment: Payment,
    ) -> Result<(), ApiError> {
        require_admin(who)?;
        Ok(self.engine.update_payment(id, payment).await?)
    }

    pub async fn delete_booking(&self, who: &Identity, id: BookingId) -> Result<(), ApiError> {
        require_admin(who)?;
        Ok(self.engine.delete_booking(id).await?)
    }

    /// Render the confirmation again against current form content and wait
    /// for delivery. Returns the recipient.
    pub async fn resend_confirmation(&self, who: &Identity, id: BookingId) -> Result<String, ApiError> {
        require_admin(who)?;
        let record = self.engine.get_booking(id).await?;
        let content = self.engine.up_to_date_form_content().await;
        self.deliver(mail::render_booking_confirmation(&record, &content))
            .await
    }

    // ── Artist bookings (admin) ─────────────────────────

    pub async fn list_artist_bookings(
        &self,
        who: &Identity,
    ) -> Result<Vec<ArtistBookingRecord>, ApiError> {
        require_admin(who)?;
        Ok(self.engine.list_artist_bookings().await)
    }

    pub async fn get_artist_booking(
        &self,
        who: &Identity,
        id: ArtistBookingId,
    ) -> Result<ArtistBookingRecord, ApiError> {
        require_admin(who)?;
        Ok(self.engine.get_artist_booking(id).await?)
    }

    pub async fn update_artist_booking(
        &self,
        who: &Identity,
        id: ArtistBookingId,
        update: ArtistBookingUpdate,
    ) -> Result<ArtistBookingRecord, ApiError> {
        require_admin(who)?;
        Ok(self.engine.update_artist_booking(id, update).await?)
    }

    pub async fn update_artist_payment(
        &self,
        who: &Identity,
        id: ArtistBookingId,
        payment: Payment,
    ) -> Result<(), ApiError> {
        require_admin(who)?;
        Ok(self.engine.update_artist_payment(id, payment).await?)
    }

    pub async fn delete_artist_booking(
        &self,
        who: &Identity,
        id: ArtistBookingId,
    ) -> Result<(), ApiError> {
        require_admin(who)?;
        Ok(self.engine.delete_artist_booking(id).await?)
    }

    pub async fn resend_artist_confirmation(
        &self,
        who: &Identity,
        id: ArtistBookingId,
    ) -> Result<String, ApiError> {
        require_admin(who)?;
        let record = self.engine.get_artist_booking(id).await?;
        let content = self.engine.up_to_date_artist_form_content().await;
        self.deliver(mail::render_artist_confirmation(&record, &content))
            .await
    }

    // ── Shift assignments (admin) ───────────────────────

    pub async fn create_assignment(
        &self,
        who: &Identity,
        booking_id: BookingId,
        timeslot_id: TimeslotId,
        is_confirmed: bool,
        admin_notes: String,
    ) -> Result<CreateAssignment, ApiError> {
        require_admin(who)?;
        Ok(self
            .engine
            .create_assignment(booking_id, timeslot_id, is_confirmed, admin_notes)
            .await?)
    }

    pub async fn update_assignment(
        &self,
        who: &Identity,
        id: AssignmentId,
        is_confirmed: bool,
        admin_notes: String,
    ) -> Result<AssignmentRow, ApiError> {
        require_admin(who)?;
        Ok(self.engine.update_assignment(id, is_confirmed, admin_notes).await?)
    }

    pub async fn delete_assignment(&self, who: &Identity, id: AssignmentId) -> Result<(), ApiError> {
        require_admin(who)?;
        Ok(self.engine.delete_assignment(id).await?)
    }

    pub async fn list_assignments(
        &self,
        who: &Identity,
        filter: AssignmentFilter,
    ) -> Result<Vec<AssignmentDetail>, ApiError> {
        require_admin(who)?;
        Ok(self.engine.list_assignments(filter).await)
    }

    pub async fn bulk_assign(
        &self,
        who: &Identity,
        booking_ids: &[BookingId],
        timeslot_ids: &[TimeslotId],
    ) -> Result<BulkAssignResult, ApiError> {
        require_admin(who)?;
        Ok(self.engine.bulk_assign(booking_ids, timeslot_ids).await?)
    }

    /// `strategy` is the name as sent by the client; an unknown name is a
    /// validation error and nothing is touched.
    pub async fn auto_assign(
        &self,
        who: &Identity,
        strategy: &str,
    ) -> Result<AutoAssignStats, ApiError> {
        require_admin(who)?;
        let strategy: Strategy = strategy.parse().map_err(ApiError::Validation)?;
        Ok(self.engine.auto_assign(strategy).await?)
    }

    pub async fn booking_shift_count(
        &self,
        who: &Identity,
        booking_id: BookingId,
    ) -> Result<ShiftCount, ApiError> {
        require_admin(who)?;
        let max = self.engine.get_booking_max_shifts(booking_id).await?;
        let assigned = self.engine.get_booking_shift_count(booking_id).await?;
        Ok(ShiftCount {
            booking_id,
            assigned,
            max,
        })
    }

    pub async fn timeslot_assignment_count(
        &self,
        who: &Identity,
        timeslot_id: TimeslotId,
    ) -> Result<TimeslotCount, ApiError> {
        require_admin(who)?;
        let capacity = self.engine.get_timeslot_capacity(timeslot_id)?;
        let assigned = self.engine.get_timeslot_assignment_count(timeslot_id).await?;
        Ok(TimeslotCount {
            timeslot_id,
            assigned,
            capacity,
        })
    }

    // ── Summaries (admin) ───────────────────────────────

    pub async fn booking_summary(&self, who: &Identity) -> Result<Vec<BookingShiftSummary>, ApiError> {
        require_admin(who)?;
        Ok(self.engine.booking_assignments_summary().await)
    }

    pub async fn timeslot_summary(&self, who: &Identity) -> Result<Vec<TimeslotSummary>, ApiError> {
        require_admin(who)?;
        Ok(self.engine.timeslot_summary().await)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::catalog::{Catalog, SAMPLE};
    use crate::engine::Entity;
    use crate::mail::testing::{FailingMailer, RecordingMailer};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("eventdesk_test_api").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn api_with(name: &str, mailer: Arc<dyn Mailer>) -> Api {
        let catalog = Arc::new(Catalog::from_json(SAMPLE).unwrap());
        let engine = Engine::new(&test_dir(name), catalog).unwrap();
        Api::new(Arc::new(engine), mailer)
    }

    fn booking(first: &str) -> NewBooking {
        NewBooking {
            person: Person {
                first_name: first.into(),
                last_name: "Api".into(),
                email: format!("{first}@example.org"),
                phone: String::new(),
            },
            choices: BookingChoices {
                ticket_id: Some(0),
                timeslot_priority_1: Some(1),
                amount_shifts: 1,
                total_price: 80.0,
                ..Default::default()
            },
            material_ids: vec![],
            profession_ids: vec![],
            signature: "aGVsbG8=".into(),
        }
    }

    async fn wait_for_mail(mailer: &RecordingMailer, n: usize) -> Vec<ConfirmationMail> {
        for _ in 0..100 {
            let sent = mailer.sent();
            if sent.len() >= n {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        mailer.sent()
    }

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::Validation("x".into()).status(), 400);
        assert_eq!(ApiError::Forbidden.status(), 403);
        assert_eq!(ApiError::NotFound("x".into()).status(), 404);
        assert_eq!(ApiError::Internal.status(), 500);
    }

    #[test]
    fn engine_errors_map_to_statuses() {
        let e: ApiError = EngineError::NotFound(Entity::Booking, 3).into();
        assert_eq!(e, ApiError::NotFound("booking not found: 3".into()));
        let e: ApiError = EngineError::invalid("email", "must not be empty").into();
        assert_eq!(e.status(), 400);
        let e: ApiError = EngineError::WalError("disk full".into()).into();
        assert_eq!(e, ApiError::Internal);
        assert!(!e.to_string().contains("disk"));
    }

    #[test]
    fn only_admin_string_is_admin() {
        assert!(Identity::admin().is_admin());
        assert!(Identity::new("admin").is_admin());
        assert!(!Identity::new("Admin").is_admin());
        assert!(!Identity::new("public").is_admin());
    }

    #[tokio::test]
    async fn submit_sends_confirmation() {
        let mailer = Arc::new(RecordingMailer::default());
        let api = api_with("submit_sends_confirmation", mailer.clone());

        let outcome = api.submit_booking(booking("ada")).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));
        let sent = wait_for_mail(&mailer, 1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.org");
        assert!(sent[0].body.contains("Priority 1: Bar, timeslot: Sat night"));

        let again = api.submit_booking(booking("ada")).await.unwrap();
        assert_eq!(again, InsertOutcome::Duplicate);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn mail_failure_keeps_booking() {
        let api = api_with("mail_failure_keeps_booking", Arc::new(FailingMailer));
        let outcome = api.submit_booking(booking("grace")).await.unwrap();
        let InsertOutcome::Inserted(id) = outcome else {
            panic!("expected insert");
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let record = api.get_booking(&Identity::admin(), id).await.unwrap();
        assert_eq!(record.person.first_name, "grace");
    }

    #[tokio::test]
    async fn resend_renders_current_booking() {
        let mailer = Arc::new(RecordingMailer::default());
        let api = api_with("resend_renders_current_booking", mailer.clone());
        let admin = Identity::admin();
        let InsertOutcome::Inserted(id) = api.submit_booking(booking("ada")).await.unwrap() else {
            panic!("expected insert");
        };
        wait_for_mail(&mailer, 1).await;

        let mut update = BookingUpdate {
            person: booking("ada").person,
            choices: booking("ada").choices,
            material_ids: None,
            profession_ids: None,
        };
        update.choices.timeslot_priority_1 = Some(4);
        api.update_booking(&admin, id, update).await.unwrap();

        let to = api.resend_confirmation(&admin, id).await.unwrap();
        assert_eq!(to, "ada@example.org");
        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].subject, mail::BOOKING_SUBJECT);
        assert!(sent[1].body.contains("Priority 1: Kitchen, timeslot: Sun dinner"));

        assert_eq!(
            api.resend_confirmation(&Identity::new("public"), id).await.unwrap_err(),
            ApiError::Forbidden
        );
        assert_eq!(api.resend_confirmation(&admin, 999).await.unwrap_err().status(), 404);
        assert_eq!(api.resend_artist_confirmation(&admin, 1).await.unwrap_err().status(), 404);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn resend_reports_delivery_failure() {
        let api = api_with("resend_reports_delivery_failure", Arc::new(FailingMailer));
        let InsertOutcome::Inserted(id) = api.submit_booking(booking("lin")).await.unwrap() else {
            panic!("expected insert");
        };
        let err = api.resend_confirmation(&Identity::admin(), id).await.unwrap_err();
        assert_eq!(err, ApiError::Internal);
        assert!(api.get_booking(&Identity::admin(), id).await.is_ok());
    }

    #[tokio::test]
    async fn health_is_open_to_every_role() {
        let api = api_with("health_is_open_to_every_role", Arc::new(RecordingMailer::default()));
        api.submit_booking(booking("ada")).await.unwrap();
        let report = api.health().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.bookings, 1);
    }

    #[tokio::test]
    async fn admin_operations_refuse_public_role() {
        let api = api_with("admin_operations_refuse_public_role", Arc::new(RecordingMailer::default()));
        let public = Identity::new("public");
        assert_eq!(api.list_bookings(&public).await.unwrap_err(), ApiError::Forbidden);
        assert_eq!(
            api.create_assignment(&public, 1, 1, false, String::new())
                .await
                .unwrap_err(),
            ApiError::Forbidden
        );
        assert_eq!(api.auto_assign(&public, "priority").await.unwrap_err(), ApiError::Forbidden);
        assert_eq!(api.timeslot_summary(&public).await.unwrap_err(), ApiError::Forbidden);

        // public reads stay open
        assert_eq!(api.form_content().await.ticket_options.len(), 2);
    }

    #[tokio::test]
    async fn unknown_strategy_is_validation_error() {
        let api = api_with("unknown_strategy_is_validation_error", Arc::new(RecordingMailer::default()));
        let admin = Identity::admin();
        api.submit_booking(booking("ada")).await.unwrap();
        let InsertOutcome::Inserted(id) = api.submit_booking(booking("bob")).await.unwrap() else {
            panic!("expected insert");
        };
        api.create_assignment(&admin, id, 1, true, "keep".into()).await.unwrap();

        let err = api.auto_assign(&admin, "random").await.unwrap_err();
        assert_eq!(err.status(), 400);
        // nothing was cleared
        let rows = api.list_assignments(&admin, AssignmentFilter::All).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].admin_notes, "keep");

        let stats = api.auto_assign(&admin, " Priority ").await.unwrap();
        assert_eq!(stats.strategy, Strategy::Priority);
        assert_eq!(stats.assignments_made, 2);
    }

    #[tokio::test]
    async fn counts_report_quota_and_capacity() {
        let api = api_with("counts_report_quota_and_capacity", Arc::new(RecordingMailer::default()));
        let admin = Identity::admin();
        let InsertOutcome::Inserted(id) = api.submit_booking(booking("ada")).await.unwrap() else {
            panic!("expected insert");
        };
        api.create_assignment(&admin, id, 1, false, String::new()).await.unwrap();

        let shifts = api.booking_shift_count(&admin, id).await.unwrap();
        assert_eq!(shifts, ShiftCount { booking_id: id, assigned: 1, max: 1 });
        let slot = api.timeslot_assignment_count(&admin, 1).await.unwrap();
        assert_eq!(slot, TimeslotCount { timeslot_id: 1, assigned: 1, capacity: 2 });

        assert_eq!(api.booking_shift_count(&admin, 999).await.unwrap_err().status(), 404);
        assert_eq!(api.timeslot_assignment_count(&admin, 99).await.unwrap_err().status(), 404);
    }
}
