use crate::model::*;

use super::Engine;

impl Engine {
    /// Quota fulfilment for every booking, in booking order.
    pub async fn booking_assignments_summary(&self) -> Vec<BookingShiftSummary> {
        let tables = self.tables.read().await;
        tables
            .bookings
            .values()
            .map(|b| {
                let assigned = tables.booking_shift_count(b.id);
                let (first_name, last_name) = tables
                    .booking_person(b.id)
                    .map(|p| (p.first_name.clone(), p.last_name.clone()))
                    .unwrap_or_default();
                BookingShiftSummary {
                    booking_id: b.id,
                    first_name,
                    last_name,
                    max_shifts: b.choices.amount_shifts,
                    assigned_shifts: assigned,
                    is_fully_assigned: quota_met(assigned, b.choices.amount_shifts),
                }
            })
            .collect()
    }

    /// Fill state of every catalog timeslot, in timeslot id order.
    pub async fn timeslot_summary(&self) -> Vec<TimeslotSummary> {
        let tables = self.tables.read().await;
        self.catalog
            .timeslots()
            .map(|r| {
                let capacity = r.slot.num_needed;
                let assigned = tables.timeslot_assignment_count(r.slot.id);
                let fill_percentage = if capacity == 0 {
                    0.0
                } else {
                    f64::from(assigned) / f64::from(capacity) * 100.0
                };
                TimeslotSummary {
                    timeslot_id: r.slot.id,
                    workshift_title: r.shift.title.clone(),
                    timeslot_title: r.slot.title.clone(),
                    start_time: r.slot.start_time.clone(),
                    end_time: r.slot.end_time.clone(),
                    capacity,
                    assigned_count: assigned,
                    remaining: capacity.saturating_sub(assigned),
                    is_filled: timeslot_filled(assigned, capacity),
                    fill_percentage,
                }
            })
            .collect()
    }

    /// Assignments joined with attendee and timeslot details, in assignment order.
    pub async fn list_assignments(&self, filter: AssignmentFilter) -> Vec<AssignmentDetail> {
        let tables = self.tables.read().await;
        tables
            .assignments
            .values()
            .filter(|a| match filter {
                AssignmentFilter::All => true,
                AssignmentFilter::ByBooking(id) => a.booking_id == id,
                AssignmentFilter::ByTimeslot(id) => a.timeslot_id == id,
            })
            .map(|a| {
                let person = tables.booking_person(a.booking_id);
                let field = |f: fn(&Person) -> &String| person.map(f).cloned().unwrap_or_default();
                let slot = self.catalog.timeslot(a.timeslot_id);
                let priority = tables
                    .bookings
                    .get(&a.booking_id)
                    .map(|b| b.choices.rank_of(a.timeslot_id))
                    .unwrap_or(0);
                AssignmentDetail {
                    id: a.id,
                    booking_id: a.booking_id,
                    timeslot_id: a.timeslot_id,
                    is_confirmed: a.is_confirmed,
                    admin_notes: a.admin_notes.clone(),
                    assigned_at: a.assigned_at,
                    first_name: field(|p| &p.first_name),
                    last_name: field(|p| &p.last_name),
                    email: field(|p| &p.email),
                    phone: field(|p| &p.phone),
                    workshift_title: slot.map(|s| s.shift.title.clone()).unwrap_or_default(),
                    timeslot_title: slot.map(|s| s.slot.title.clone()).unwrap_or_default(),
                    timeslot_start: slot.map(|s| s.slot.start_time.clone()).unwrap_or_default(),
                    timeslot_end: slot.map(|s| s.slot.end_time.clone()).unwrap_or_default(),
                    priority,
                }
            })
            .collect()
    }
}
