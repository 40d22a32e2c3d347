use tracing::info;

use crate::model::*;
use crate::observability::{BOOKINGS_CREATED_TOTAL, BOOKINGS_DUPLICATE_TOTAL};
use crate::signature::SignatureKind;

use super::{now_ms, validate, Engine, EngineError, Entity};

impl Engine {
    /// Register an attendee with their first booking.
    ///
    /// A booking whose (first_name, last_name, email) matches an existing
    /// attendee is not an error: it returns `InsertOutcome::Duplicate` and
    /// nothing is written.
    pub async fn insert_booking(
        &self,
        new: NewBooking,
    ) -> Result<InsertOutcome<BookingId>, EngineError> {
        validate::person(&new.person)?;
        validate::booking_choices(&new.choices, &self.catalog)?;
        validate::booking_lists(&new.material_ids, &new.profession_ids, &self.catalog)?;
        let signature = validate::signature(&new.signature)?;

        let mut tables = self.tables.write().await;
        if tables.attendee_by_key(&new.person.key()).is_some() {
            info!(
                first_name = %new.person.first_name,
                last_name = %new.person.last_name,
                "duplicate booking rejected"
            );
            metrics::counter!(BOOKINGS_DUPLICATE_TOTAL, "kind" => "attendee").increment(1);
            return Ok(InsertOutcome::Duplicate);
        }

        let seq = tables.sequences();
        let attendee_id = seq.attendee + 1;
        let booking_id = seq.booking + 1;
        let mutations = vec![
            Mutation::AttendeeInserted(Attendee {
                id: attendee_id,
                person: new.person.clone(),
            }),
            Mutation::BookingInserted {
                row: BookingRow {
                    id: booking_id,
                    attendee_id,
                    choices: new.choices,
                    payment: Payment::default(),
                    created_at: now_ms(),
                },
                material_ids: new.material_ids,
                profession_ids: new.profession_ids,
            },
        ];
        self.commit(&mut tables, mutations).await?;
        drop(tables);

        info!(booking_id, attendee_id, "booking created");
        metrics::counter!(BOOKINGS_CREATED_TOTAL, "kind" => "attendee").increment(1);
        self.signatures
            .save(SignatureKind::Attendee, &new.person, &signature)
            .await;
        Ok(InsertOutcome::Inserted(booking_id))
    }

    /// Attach another booking to an attendee that already exists.
    pub async fn add_booking_for_attendee(
        &self,
        attendee_id: AttendeeId,
        extra: ExtraBooking,
    ) -> Result<BookingId, EngineError> {
        validate::booking_choices(&extra.choices, &self.catalog)?;
        validate::booking_lists(&extra.material_ids, &extra.profession_ids, &self.catalog)?;

        let mut tables = self.tables.write().await;
        if !tables.attendees.contains_key(&attendee_id) {
            return Err(EngineError::NotFound(Entity::Attendee, attendee_id));
        }
        let booking_id = tables.sequences().booking + 1;
        let mutation = Mutation::BookingInserted {
            row: BookingRow {
                id: booking_id,
                attendee_id,
                choices: extra.choices,
                payment: Payment::default(),
                created_at: now_ms(),
            },
            material_ids: extra.material_ids,
            profession_ids: extra.profession_ids,
        };
        self.commit(&mut tables, vec![mutation]).await?;

        info!(booking_id, attendee_id, "additional booking created");
        metrics::counter!(BOOKINGS_CREATED_TOTAL, "kind" => "attendee").increment(1);
        Ok(booking_id)
    }

    /// Every booking joined with its attendee, in insertion order.
    pub async fn list_bookings(&self) -> Vec<BookingRecord> {
        let tables = self.tables.read().await;
        tables
            .bookings
            .keys()
            .filter_map(|&id| tables.booking_record(id))
            .collect()
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<BookingRecord, EngineError> {
        let tables = self.tables.read().await;
        tables
            .booking_record(id)
            .ok_or(EngineError::NotFound(Entity::Booking, id))
    }

    /// Full-record update. Material and profession lists are replaced when given.
    pub async fn update_booking(
        &self,
        id: BookingId,
        update: BookingUpdate,
    ) -> Result<BookingRecord, EngineError> {
        validate::person(&update.person)?;
        validate::booking_choices(&update.choices, &self.catalog)?;
        validate::booking_lists(
            update.material_ids.as_deref().unwrap_or(&[]),
            update.profession_ids.as_deref().unwrap_or(&[]),
            &self.catalog,
        )?;

        let mut tables = self.tables.write().await;
        let row = tables
            .bookings
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Booking, id))?;
        let attendee = tables
            .attendees
            .get(&row.attendee_id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Attendee, row.attendee_id))?;

        let key = update.person.key();
        if let Some(other) = tables.attendee_by_key(&key)
            && other != attendee.id
        {
            return Err(EngineError::AlreadyExists(Entity::Attendee, key));
        }

        let mut mutations = Vec::with_capacity(4);
        if attendee.person != update.person {
            mutations.push(Mutation::AttendeeUpdated(Attendee {
                id: attendee.id,
                person: update.person,
            }));
        }
        mutations.push(Mutation::BookingUpdated(BookingRow {
            choices: update.choices,
            ..row
        }));
        if let Some(material_ids) = update.material_ids {
            mutations.push(Mutation::BookingMaterialsReplaced {
                booking_id: id,
                material_ids,
            });
        }
        if let Some(profession_ids) = update.profession_ids {
            mutations.push(Mutation::BookingProfessionsReplaced {
                booking_id: id,
                profession_ids,
            });
        }
        self.commit(&mut tables, mutations).await?;

        info!(booking_id = id, "booking updated");
        tables
            .booking_record(id)
            .ok_or(EngineError::NotFound(Entity::Booking, id))
    }

    /// Touches only the payment columns.
    pub async fn update_payment(&self, id: BookingId, payment: Payment) -> Result<(), EngineError> {
        validate::payment(&payment)?;
        let mut tables = self.tables.write().await;
        if !tables.bookings.contains_key(&id) {
            return Err(EngineError::NotFound(Entity::Booking, id));
        }
        let is_paid = payment.is_paid;
        self.commit(
            &mut tables,
            vec![Mutation::BookingPaymentUpdated {
                booking_id: id,
                payment,
            }],
        )
        .await?;
        info!(booking_id = id, is_paid, "booking payment updated");
        Ok(())
    }

    /// Delete a booking with its associations and assignments. The attendee
    /// goes too when this was their last booking. One transaction.
    pub async fn delete_booking(&self, id: BookingId) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .bookings
            .get(&id)
            .ok_or(EngineError::NotFound(Entity::Booking, id))?;
        let attendee_id = row.attendee_id;

        let assignments = tables.assignments_of_booking(id);
        let mut mutations: Vec<Mutation> = assignments
            .iter()
            .map(|&a| Mutation::AssignmentDeleted { id: a })
            .collect();
        mutations.push(Mutation::BookingDeleted { id });
        let orphaned = tables.bookings_of_attendee(attendee_id) == 1;
        if orphaned {
            mutations.push(Mutation::AttendeeDeleted { id: attendee_id });
        }
        self.commit(&mut tables, mutations).await?;

        info!(
            booking_id = id,
            assignments_removed = assignments.len(),
            attendee_removed = orphaned,
            "booking deleted"
        );
        Ok(())
    }
}
