use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::limits::{AUTO_ASSIGN_SLOW_SECS, MAX_BULK_PAIRS};
use crate::model::*;
use crate::observability::{
    ASSIGNMENTS_CREATED_TOTAL, ASSIGNMENTS_REJECTED_TOTAL, AUTO_ASSIGN_DURATION_SECONDS,
};

use super::auto_assign::{self, Demand, Supply};
use super::{now_ms, validate, Engine, EngineError, Entity, Tables};

fn reject(reason: &'static str) {
    metrics::counter!(ASSIGNMENTS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

impl Engine {
    fn capacity_of(&self, timeslot_id: TimeslotId) -> Result<u32, EngineError> {
        self.catalog
            .capacity(timeslot_id)
            .ok_or(EngineError::NotFound(Entity::Timeslot, u64::from(timeslot_id)))
    }

    /// Assign one booking to one timeslot.
    ///
    /// Checked in order under the write lock: the pair must be new, the booking
    /// must be below its `amount_shifts` quota, and the timeslot below capacity.
    /// A failed check is reported through the returned variant.
    pub async fn create_assignment(
        &self,
        booking_id: BookingId,
        timeslot_id: TimeslotId,
        is_confirmed: bool,
        admin_notes: String,
    ) -> Result<CreateAssignment, EngineError> {
        validate::admin_notes(&admin_notes)?;
        let capacity = self.capacity_of(timeslot_id)?;

        let mut tables = self.tables.write().await;
        let max = tables
            .bookings
            .get(&booking_id)
            .map(|b| b.choices.amount_shifts)
            .ok_or(EngineError::NotFound(Entity::Booking, booking_id))?;

        if tables.assignment_for(booking_id, timeslot_id).is_some() {
            info!(booking_id, timeslot_id, "assignment already exists");
            reject("duplicate");
            return Ok(CreateAssignment::Duplicate);
        }
        let current = tables.booking_shift_count(booking_id);
        if current >= u32::from(max) {
            info!(booking_id, current, max, "booking already has maximum shifts assigned");
            reject("booking_at_quota");
            return Ok(CreateAssignment::BookingAtQuota { current, max });
        }
        let assigned = tables.timeslot_assignment_count(timeslot_id);
        if assigned >= capacity {
            info!(timeslot_id, assigned, capacity, "timeslot at capacity");
            reject("timeslot_full");
            return Ok(CreateAssignment::TimeslotFull {
                current: assigned,
                capacity,
            });
        }

        let id = tables.sequences().assignment + 1;
        let row = AssignmentRow {
            id,
            booking_id,
            timeslot_id,
            is_confirmed,
            admin_notes,
            assigned_at: now_ms(),
        };
        self.commit(&mut tables, vec![Mutation::AssignmentInserted(row)])
            .await?;

        info!(assignment_id = id, booking_id, timeslot_id, "assignment created");
        metrics::counter!(ASSIGNMENTS_CREATED_TOTAL, "source" => "manual").increment(1);
        Ok(CreateAssignment::Created(id))
    }

    /// Only the confirmation flag and notes change; the pair is fixed.
    pub async fn update_assignment(
        &self,
        id: AssignmentId,
        is_confirmed: bool,
        admin_notes: String,
    ) -> Result<AssignmentRow, EngineError> {
        validate::admin_notes(&admin_notes)?;
        let mut tables = self.tables.write().await;
        if !tables.assignments.contains_key(&id) {
            return Err(EngineError::NotFound(Entity::Assignment, id));
        }
        self.commit(
            &mut tables,
            vec![Mutation::AssignmentUpdated {
                id,
                is_confirmed,
                admin_notes,
            }],
        )
        .await?;
        info!(assignment_id = id, is_confirmed, "assignment updated");
        tables
            .assignments
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Assignment, id))
    }

    pub async fn delete_assignment(&self, id: AssignmentId) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        if !tables.assignments.contains_key(&id) {
            return Err(EngineError::NotFound(Entity::Assignment, id));
        }
        self.commit(&mut tables, vec![Mutation::AssignmentDeleted { id }])
            .await?;
        info!(assignment_id = id, "assignment deleted");
        Ok(())
    }

    pub async fn get_booking_shift_count(&self, booking_id: BookingId) -> Result<u32, EngineError> {
        let tables = self.tables.read().await;
        if !tables.bookings.contains_key(&booking_id) {
            return Err(EngineError::NotFound(Entity::Booking, booking_id));
        }
        Ok(tables.booking_shift_count(booking_id))
    }

    pub async fn get_booking_max_shifts(&self, booking_id: BookingId) -> Result<u8, EngineError> {
        let tables = self.tables.read().await;
        tables
            .bookings
            .get(&booking_id)
            .map(|b| b.choices.amount_shifts)
            .ok_or(EngineError::NotFound(Entity::Booking, booking_id))
    }

    pub fn get_timeslot_capacity(&self, timeslot_id: TimeslotId) -> Result<u32, EngineError> {
        self.capacity_of(timeslot_id)
    }

    pub async fn get_timeslot_assignment_count(
        &self,
        timeslot_id: TimeslotId,
    ) -> Result<u32, EngineError> {
        self.capacity_of(timeslot_id)?;
        let tables = self.tables.read().await;
        Ok(tables.timeslot_assignment_count(timeslot_id))
    }

    /// Try every booking x timeslot pair. Failed pairs are reported, the rest
    /// are committed together as unconfirmed assignments.
    pub async fn bulk_assign(
        &self,
        booking_ids: &[BookingId],
        timeslot_ids: &[TimeslotId],
    ) -> Result<BulkAssignResult, EngineError> {
        if booking_ids.len().saturating_mul(timeslot_ids.len()) > MAX_BULK_PAIRS {
            return Err(EngineError::LimitExceeded("too many booking/timeslot pairs"));
        }

        let mut tables = self.tables.write().await;
        let mut next_id = tables.sequences().assignment;
        let mut added: HashSet<(BookingId, TimeslotId)> = HashSet::new();
        let mut per_booking: HashMap<BookingId, u32> = HashMap::new();
        let mut per_timeslot: HashMap<TimeslotId, u32> = HashMap::new();
        let mut mutations = Vec::new();
        let mut result = BulkAssignResult::default();
        let assigned_at = now_ms();

        for &booking_id in booking_ids {
            for &timeslot_id in timeslot_ids {
                let mut fail = |reason: BulkFailureReason| {
                    reject(reason.as_str());
                    result.failed_assignments.push(BulkAssignFailure {
                        booking_id,
                        timeslot_id,
                        reason,
                    });
                };
                let Some(max) = tables.bookings.get(&booking_id).map(|b| b.choices.amount_shifts)
                else {
                    fail(BulkFailureReason::UnknownBooking);
                    continue;
                };
                let Some(capacity) = self.catalog.capacity(timeslot_id) else {
                    fail(BulkFailureReason::UnknownTimeslot);
                    continue;
                };
                if tables.assignment_for(booking_id, timeslot_id).is_some()
                    || added.contains(&(booking_id, timeslot_id))
                {
                    fail(BulkFailureReason::AlreadyAssigned);
                    continue;
                }
                let shifts = tables.booking_shift_count(booking_id)
                    + per_booking.get(&booking_id).copied().unwrap_or(0);
                if shifts >= u32::from(max) {
                    fail(BulkFailureReason::BookingAtQuota);
                    continue;
                }
                let filled = tables.timeslot_assignment_count(timeslot_id)
                    + per_timeslot.get(&timeslot_id).copied().unwrap_or(0);
                if filled >= capacity {
                    fail(BulkFailureReason::TimeslotFull);
                    continue;
                }

                next_id += 1;
                added.insert((booking_id, timeslot_id));
                *per_booking.entry(booking_id).or_insert(0) += 1;
                *per_timeslot.entry(timeslot_id).or_insert(0) += 1;
                mutations.push(Mutation::AssignmentInserted(AssignmentRow {
                    id: next_id,
                    booking_id,
                    timeslot_id,
                    is_confirmed: false,
                    admin_notes: String::new(),
                    assigned_at,
                }));
            }
        }

        result.successful_assignments = mutations.len() as u32;
        self.commit(&mut tables, mutations).await?;
        info!(
            successful = result.successful_assignments,
            failed = result.failed_assignments.len(),
            "bulk assignment finished"
        );
        metrics::counter!(ASSIGNMENTS_CREATED_TOTAL, "source" => "bulk")
            .increment(u64::from(result.successful_assignments));
        Ok(result)
    }

    /// Drop every assignment and rebuild them with `strategy`.
    ///
    /// Runs under the write lock and commits the clear plus all new rows as one
    /// transaction: if the journal write fails, the previous assignments stay.
    pub async fn auto_assign(&self, strategy: Strategy) -> Result<AutoAssignStats, EngineError> {
        let started = Instant::now();
        let mut tables = self.tables.write().await;
        info!(
            strategy = strategy.as_str(),
            bookings = tables.bookings.len(),
            replaced = tables.assignments.len(),
            "auto-assignment started"
        );

        let plan = auto_assign::plan(strategy, &demands(&tables), &self.supply());

        let mut next_id = tables.sequences().assignment;
        let assigned_at = now_ms();
        let mut mutations = Vec::with_capacity(plan.pairs.len() + 1);
        mutations.push(Mutation::AssignmentsCleared);
        for &(booking_id, timeslot_id) in &plan.pairs {
            next_id += 1;
            mutations.push(Mutation::AssignmentInserted(AssignmentRow {
                id: next_id,
                booking_id,
                timeslot_id,
                is_confirmed: true,
                admin_notes: String::new(),
                assigned_at,
            }));
        }
        self.commit(&mut tables, mutations).await?;
        drop(tables);

        let elapsed = started.elapsed();
        metrics::histogram!(AUTO_ASSIGN_DURATION_SECONDS, "strategy" => strategy.as_str())
            .record(elapsed.as_secs_f64());
        metrics::counter!(ASSIGNMENTS_CREATED_TOTAL, "source" => "auto")
            .increment(u64::from(plan.stats.assignments_made));
        if elapsed > Duration::from_secs(AUTO_ASSIGN_SLOW_SECS) {
            warn!(
                strategy = strategy.as_str(),
                elapsed_secs = elapsed.as_secs_f64(),
                "auto-assignment was slow"
            );
        }
        info!(
            strategy = strategy.as_str(),
            assignments_made = plan.stats.assignments_made,
            bookings_satisfied = plan.stats.bookings_satisfied,
            timeslots_filled = plan.stats.timeslots_filled,
            "auto-assignment finished"
        );
        Ok(plan.stats)
    }

    fn supply(&self) -> Vec<Supply> {
        self.catalog
            .timeslots()
            .map(|r| Supply {
                timeslot_id: r.slot.id,
                capacity: r.slot.num_needed,
            })
            .collect()
    }
}

fn demands(tables: &Tables) -> Vec<Demand> {
    tables
        .bookings
        .values()
        .map(|b| Demand {
            booking_id: b.id,
            amount_shifts: b.choices.amount_shifts,
            preferences: [
                b.choices.timeslot_priority_1,
                b.choices.timeslot_priority_2,
                b.choices.timeslot_priority_3,
            ],
        })
        .collect()
}
