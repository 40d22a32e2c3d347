use std::collections::{BTreeMap, HashMap};

use crate::model::*;

/// All relational state. Rows live in `BTreeMap`s keyed by id, so iteration
/// is insertion order. The key indexes and counters are derived from rows on
/// every `apply` and never persisted.
#[derive(Debug, Default)]
pub struct Tables {
    pub(super) attendees: BTreeMap<AttendeeId, Attendee>,
    attendee_keys: HashMap<PersonKey, AttendeeId>,
    pub(super) bookings: BTreeMap<BookingId, BookingRow>,
    booking_materials: HashMap<BookingId, Vec<OptionId>>,
    booking_professions: HashMap<BookingId, Vec<OptionId>>,

    pub(super) artists: BTreeMap<ArtistId, Artist>,
    artist_keys: HashMap<PersonKey, ArtistId>,
    pub(super) artist_bookings: BTreeMap<ArtistBookingId, ArtistBookingRow>,
    artist_materials: HashMap<ArtistBookingId, Vec<OptionId>>,
    artist_professions: HashMap<ArtistBookingId, Vec<OptionId>>,

    pub(super) assignments: BTreeMap<AssignmentId, AssignmentRow>,
    assignment_pairs: HashMap<(BookingId, TimeslotId), AssignmentId>,
    shifts_per_booking: HashMap<BookingId, u32>,
    assigned_per_timeslot: HashMap<TimeslotId, u32>,

    seq: Sequences,
}

fn bump<K: std::hash::Hash + Eq>(counter: &mut HashMap<K, u32>, key: K) {
    *counter.entry(key).or_insert(0) += 1;
}

fn drop_one<K: std::hash::Hash + Eq>(counter: &mut HashMap<K, u32>, key: K) {
    if let Some(n) = counter.get_mut(&key) {
        *n = n.saturating_sub(1);
        if *n == 0 {
            counter.remove(&key);
        }
    }
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one committed mutation. Infallible: every check happened before commit.
    pub fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::AttendeeInserted(attendee) | Mutation::AttendeeUpdated(attendee) => {
                if let Some(old) = self.attendees.get(&attendee.id) {
                    self.attendee_keys.remove(&old.person.key());
                }
                self.attendee_keys.insert(attendee.person.key(), attendee.id);
                self.attendees.insert(attendee.id, attendee.clone());
                self.seq.attendee = self.seq.attendee.max(attendee.id);
            }
            Mutation::AttendeeDeleted { id } => {
                if let Some(old) = self.attendees.remove(id) {
                    self.attendee_keys.remove(&old.person.key());
                }
            }
            Mutation::BookingInserted {
                row,
                material_ids,
                profession_ids,
            } => {
                self.seq.booking = self.seq.booking.max(row.id);
                self.booking_materials.insert(row.id, material_ids.clone());
                self.booking_professions.insert(row.id, profession_ids.clone());
                self.bookings.insert(row.id, row.clone());
            }
            Mutation::BookingUpdated(row) => {
                self.bookings.insert(row.id, row.clone());
            }
            Mutation::BookingMaterialsReplaced {
                booking_id,
                material_ids,
            } => {
                self.booking_materials.insert(*booking_id, material_ids.clone());
            }
            Mutation::BookingProfessionsReplaced {
                booking_id,
                profession_ids,
            } => {
                self.booking_professions
                    .insert(*booking_id, profession_ids.clone());
            }
            Mutation::BookingPaymentUpdated {
                booking_id,
                payment,
            } => {
                if let Some(row) = self.bookings.get_mut(booking_id) {
                    row.payment = payment.clone();
                }
            }
            Mutation::BookingDeleted { id } => {
                self.bookings.remove(id);
                self.booking_materials.remove(id);
                self.booking_professions.remove(id);
            }

            Mutation::ArtistInserted(artist) | Mutation::ArtistUpdated(artist) => {
                if let Some(old) = self.artists.get(&artist.id) {
                    self.artist_keys.remove(&old.person.key());
                }
                self.artist_keys.insert(artist.person.key(), artist.id);
                self.artists.insert(artist.id, artist.clone());
                self.seq.artist = self.seq.artist.max(artist.id);
            }
            Mutation::ArtistDeleted { id } => {
                if let Some(old) = self.artists.remove(id) {
                    self.artist_keys.remove(&old.person.key());
                }
            }
            Mutation::ArtistBookingInserted {
                row,
                artist_material_ids,
                profession_ids,
            } => {
                self.seq.artist_booking = self.seq.artist_booking.max(row.id);
                self.artist_materials
                    .insert(row.id, artist_material_ids.clone());
                self.artist_professions.insert(row.id, profession_ids.clone());
                self.artist_bookings.insert(row.id, row.clone());
            }
            Mutation::ArtistBookingUpdated(row) => {
                self.artist_bookings.insert(row.id, row.clone());
            }
            Mutation::ArtistMaterialsReplaced {
                booking_id,
                artist_material_ids,
            } => {
                self.artist_materials
                    .insert(*booking_id, artist_material_ids.clone());
            }
            Mutation::ArtistProfessionsReplaced {
                booking_id,
                profession_ids,
            } => {
                self.artist_professions
                    .insert(*booking_id, profession_ids.clone());
            }
            Mutation::ArtistPaymentUpdated {
                booking_id,
                payment,
            } => {
                if let Some(row) = self.artist_bookings.get_mut(booking_id) {
                    row.payment = payment.clone();
                }
            }
            Mutation::ArtistBookingDeleted { id } => {
                self.artist_bookings.remove(id);
                self.artist_materials.remove(id);
                self.artist_professions.remove(id);
            }

            Mutation::AssignmentInserted(row) => {
                self.seq.assignment = self.seq.assignment.max(row.id);
                self.assignment_pairs
                    .insert((row.booking_id, row.timeslot_id), row.id);
                bump(&mut self.shifts_per_booking, row.booking_id);
                bump(&mut self.assigned_per_timeslot, row.timeslot_id);
                self.assignments.insert(row.id, row.clone());
            }
            Mutation::AssignmentUpdated {
                id,
                is_confirmed,
                admin_notes,
            } => {
                if let Some(row) = self.assignments.get_mut(id) {
                    row.is_confirmed = *is_confirmed;
                    row.admin_notes = admin_notes.clone();
                }
            }
            Mutation::AssignmentDeleted { id } => {
                if let Some(row) = self.assignments.remove(id) {
                    self.assignment_pairs
                        .remove(&(row.booking_id, row.timeslot_id));
                    drop_one(&mut self.shifts_per_booking, row.booking_id);
                    drop_one(&mut self.assigned_per_timeslot, row.timeslot_id);
                }
            }
            Mutation::AssignmentsCleared => {
                self.assignments.clear();
                self.assignment_pairs.clear();
                self.shifts_per_booking.clear();
                self.assigned_per_timeslot.clear();
            }
            Mutation::SequencesRestored(seq) => {
                self.seq = Sequences {
                    attendee: self.seq.attendee.max(seq.attendee),
                    booking: self.seq.booking.max(seq.booking),
                    artist: self.seq.artist.max(seq.artist),
                    artist_booking: self.seq.artist_booking.max(seq.artist_booking),
                    assignment: self.seq.assignment.max(seq.assignment),
                };
            }
        }
    }

    /// Highest id handed out per table. Writers allocate `seq + 1, seq + 2, ...`
    /// on a copy and the counters advance only when the rows are applied.
    pub fn sequences(&self) -> Sequences {
        self.seq
    }

    /// Mutations that rebuild the current state from nothing.
    pub fn snapshot(&self) -> Vec<Mutation> {
        let mut out = Vec::with_capacity(
            1 + self.attendees.len()
                + self.bookings.len()
                + self.artists.len()
                + self.artist_bookings.len()
                + self.assignments.len(),
        );
        out.push(Mutation::SequencesRestored(self.seq));
        out.extend(self.attendees.values().cloned().map(Mutation::AttendeeInserted));
        for row in self.bookings.values() {
            out.push(Mutation::BookingInserted {
                row: row.clone(),
                material_ids: self.materials_of(row.id).to_vec(),
                profession_ids: self.professions_of(row.id).to_vec(),
            });
        }
        out.extend(self.artists.values().cloned().map(Mutation::ArtistInserted));
        for row in self.artist_bookings.values() {
            out.push(Mutation::ArtistBookingInserted {
                row: row.clone(),
                artist_material_ids: self.artist_materials_of(row.id).to_vec(),
                profession_ids: self.artist_professions_of(row.id).to_vec(),
            });
        }
        out.extend(self.assignments.values().cloned().map(Mutation::AssignmentInserted));
        out
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn attendee_by_key(&self, key: &PersonKey) -> Option<AttendeeId> {
        self.attendee_keys.get(key).copied()
    }

    pub fn artist_by_key(&self, key: &PersonKey) -> Option<ArtistId> {
        self.artist_keys.get(key).copied()
    }

    pub fn materials_of(&self, booking_id: BookingId) -> &[OptionId] {
        self.booking_materials
            .get(&booking_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn professions_of(&self, booking_id: BookingId) -> &[OptionId] {
        self.booking_professions
            .get(&booking_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn artist_materials_of(&self, booking_id: ArtistBookingId) -> &[OptionId] {
        self.artist_materials
            .get(&booking_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn artist_professions_of(&self, booking_id: ArtistBookingId) -> &[OptionId] {
        self.artist_professions
            .get(&booking_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn bookings_of_attendee(&self, attendee_id: AttendeeId) -> usize {
        self.bookings
            .values()
            .filter(|b| b.attendee_id == attendee_id)
            .count()
    }

    pub fn bookings_of_artist(&self, artist_id: ArtistId) -> usize {
        self.artist_bookings
            .values()
            .filter(|b| b.artist_id == artist_id)
            .count()
    }

    pub fn assignment_for(&self, booking_id: BookingId, timeslot_id: TimeslotId) -> Option<AssignmentId> {
        self.assignment_pairs.get(&(booking_id, timeslot_id)).copied()
    }

    pub fn assignments_of_booking(&self, booking_id: BookingId) -> Vec<AssignmentId> {
        self.assignments
            .values()
            .filter(|a| a.booking_id == booking_id)
            .map(|a| a.id)
            .collect()
    }

    pub fn booking_shift_count(&self, booking_id: BookingId) -> u32 {
        self.shifts_per_booking.get(&booking_id).copied().unwrap_or(0)
    }

    pub fn timeslot_assignment_count(&self, timeslot_id: TimeslotId) -> u32 {
        self.assigned_per_timeslot
            .get(&timeslot_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn booking_record(&self, id: BookingId) -> Option<BookingRecord> {
        let row = self.bookings.get(&id)?;
        let attendee = self.attendees.get(&row.attendee_id)?;
        Some(BookingRecord {
            id: row.id,
            attendee_id: row.attendee_id,
            person: attendee.person.clone(),
            choices: row.choices.clone(),
            material_ids: self.materials_of(id).to_vec(),
            profession_ids: self.professions_of(id).to_vec(),
            payment: row.payment.clone(),
            created_at: row.created_at,
        })
    }

    pub fn artist_booking_record(&self, id: ArtistBookingId) -> Option<ArtistBookingRecord> {
        let row = self.artist_bookings.get(&id)?;
        let artist = self.artists.get(&row.artist_id)?;
        Some(ArtistBookingRecord {
            id: row.id,
            artist_id: row.artist_id,
            person: artist.person.clone(),
            choices: row.choices.clone(),
            artist_material_ids: self.artist_materials_of(id).to_vec(),
            profession_ids: self.artist_professions_of(id).to_vec(),
            payment: row.payment.clone(),
            created_at: row.created_at,
        })
    }

    /// Person behind a booking.
    pub fn booking_person(&self, booking_id: BookingId) -> Option<&Person> {
        let row = self.bookings.get(&booking_id)?;
        self.attendees.get(&row.attendee_id).map(|a| &a.person)
    }
}
