//! Automatic shift assignment planning.
//!
//! Pure functions over a snapshot of demand (bookings with quotas and ranked
//! preferences) and supply (timeslots with capacity). Output is the ordered
//! list of pairs to create. Greedy, deterministic, no optimality guarantee.

use std::collections::{HashMap, HashSet};

use crate::model::{quota_met, timeslot_filled, AutoAssignStats, BookingId, Strategy, TimeslotId};

/// One booking as the planner sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demand {
    pub booking_id: BookingId,
    pub amount_shifts: u8,
    /// Preferences by rank: index 0 is priority 1.
    pub preferences: [Option<TimeslotId>; 3],
}

impl Demand {
    /// Best rank (1..=3) at which this booking listed `timeslot_id`.
    fn rank_of(&self, timeslot_id: TimeslotId) -> Option<u8> {
        self.preferences
            .iter()
            .position(|p| *p == Some(timeslot_id))
            .map(|i| i as u8 + 1)
    }
}

/// One timeslot as the planner sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Supply {
    pub timeslot_id: TimeslotId,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Pairs in creation order.
    pub pairs: Vec<(BookingId, TimeslotId)>,
    pub stats: AutoAssignStats,
}

/// Running state shared by both strategies. Starts empty: a run always
/// begins from a cleared assignment table.
#[derive(Default)]
struct Ledger {
    pairs: Vec<(BookingId, TimeslotId)>,
    taken: HashSet<(BookingId, TimeslotId)>,
    per_booking: HashMap<BookingId, u32>,
    per_timeslot: HashMap<TimeslotId, u32>,
}

impl Ledger {
    fn booking_count(&self, booking_id: BookingId) -> u32 {
        self.per_booking.get(&booking_id).copied().unwrap_or(0)
    }

    fn timeslot_count(&self, timeslot_id: TimeslotId) -> u32 {
        self.per_timeslot.get(&timeslot_id).copied().unwrap_or(0)
    }

    fn has_quota(&self, d: &Demand) -> bool {
        self.booking_count(d.booking_id) < u32::from(d.amount_shifts)
    }

    fn assign(&mut self, booking_id: BookingId, timeslot_id: TimeslotId) {
        self.pairs.push((booking_id, timeslot_id));
        self.taken.insert((booking_id, timeslot_id));
        *self.per_booking.entry(booking_id).or_insert(0) += 1;
        *self.per_timeslot.entry(timeslot_id).or_insert(0) += 1;
    }
}

pub fn plan(strategy: Strategy, demands: &[Demand], supply: &[Supply]) -> Plan {
    let ledger = match strategy {
        Strategy::Priority => plan_priority(demands, supply),
        Strategy::Fill => plan_fill(demands, supply),
    };

    let bookings_satisfied = demands
        .iter()
        .filter(|d| quota_met(ledger.booking_count(d.booking_id), d.amount_shifts))
        .count() as u32;
    let timeslots_filled = supply
        .iter()
        .filter(|s| timeslot_filled(ledger.timeslot_count(s.timeslot_id), s.capacity))
        .count() as u32;

    Plan {
        stats: AutoAssignStats {
            strategy,
            assignments_made: ledger.pairs.len() as u32,
            bookings_satisfied,
            timeslots_filled,
        },
        pairs: ledger.pairs,
    }
}

/// Rank by rank: every booking's 1st choice is tried before anyone's 2nd.
fn plan_priority(demands: &[Demand], supply: &[Supply]) -> Ledger {
    let capacity: HashMap<TimeslotId, u32> =
        supply.iter().map(|s| (s.timeslot_id, s.capacity)).collect();
    let mut ledger = Ledger::default();

    for rank in 0..3 {
        for d in demands {
            if !ledger.has_quota(d) {
                continue;
            }
            let Some(timeslot_id) = d.preferences[rank] else {
                continue;
            };
            let Some(&cap) = capacity.get(&timeslot_id) else {
                continue;
            };
            if ledger.taken.contains(&(d.booking_id, timeslot_id)) {
                continue;
            }
            if ledger.timeslot_count(timeslot_id) >= cap {
                continue;
            }
            ledger.assign(d.booking_id, timeslot_id);
        }
    }
    ledger
}

/// Scarcest timeslot first; within a timeslot, candidates by rank then by
/// booking order.
fn plan_fill(demands: &[Demand], supply: &[Supply]) -> Ledger {
    let mut ledger = Ledger::default();

    let fill_ratio = |s: &Supply, ledger: &Ledger| -> f64 {
        if s.capacity == 0 {
            1.0
        } else {
            f64::from(ledger.timeslot_count(s.timeslot_id)) / f64::from(s.capacity)
        }
    };
    let mut order: Vec<&Supply> = supply.iter().collect();
    order.sort_by(|a, b| fill_ratio(*a, &ledger).total_cmp(&fill_ratio(*b, &ledger)));

    for slot in order {
        if slot.capacity == 0 || ledger.timeslot_count(slot.timeslot_id) >= slot.capacity {
            continue;
        }
        let mut candidates: Vec<(u8, &Demand)> = demands
            .iter()
            .filter(|d| ledger.has_quota(d))
            .filter(|d| !ledger.taken.contains(&(d.booking_id, slot.timeslot_id)))
            .filter_map(|d| d.rank_of(slot.timeslot_id).map(|rank| (rank, d)))
            .collect();
        candidates.sort_by_key(|(rank, _)| *rank);

        for (_, d) in candidates {
            if ledger.timeslot_count(slot.timeslot_id) >= slot.capacity {
                break;
            }
            ledger.assign(d.booking_id, slot.timeslot_id);
        }
    }
    ledger
}
