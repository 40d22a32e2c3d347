use tracing::info;

use crate::model::*;
use crate::observability::{BOOKINGS_CREATED_TOTAL, BOOKINGS_DUPLICATE_TOTAL};
use crate::signature::SignatureKind;

use super::{now_ms, validate, Engine, EngineError, Entity};

impl Engine {
    /// Register a performer. Same duplicate rule as attendee bookings, keyed on
    /// the artist's own (first_name, last_name, email).
    pub async fn insert_artist_booking(
        &self,
        new: NewArtistBooking,
    ) -> Result<InsertOutcome<ArtistBookingId>, EngineError> {
        validate::person(&new.person)?;
        validate::artist_choices(&new.choices, &self.catalog)?;
        validate::artist_lists(&new.artist_material_ids, &new.profession_ids, &self.catalog)?;
        validate::payment(&new.payment)?;
        let signature = validate::signature(&new.signature)?;

        let mut tables = self.tables.write().await;
        if tables.artist_by_key(&new.person.key()).is_some() {
            info!(
                first_name = %new.person.first_name,
                last_name = %new.person.last_name,
                "duplicate artist booking rejected"
            );
            metrics::counter!(BOOKINGS_DUPLICATE_TOTAL, "kind" => "artist").increment(1);
            return Ok(InsertOutcome::Duplicate);
        }

        let seq = tables.sequences();
        let artist_id = seq.artist + 1;
        let booking_id = seq.artist_booking + 1;
        let mutations = vec![
            Mutation::ArtistInserted(Artist {
                id: artist_id,
                person: new.person.clone(),
            }),
            Mutation::ArtistBookingInserted {
                row: ArtistBookingRow {
                    id: booking_id,
                    artist_id,
                    choices: new.choices,
                    payment: new.payment,
                    created_at: now_ms(),
                },
                artist_material_ids: new.artist_material_ids,
                profession_ids: new.profession_ids,
            },
        ];
        self.commit(&mut tables, mutations).await?;
        drop(tables);

        info!(artist_booking_id = booking_id, artist_id, "artist booking created");
        metrics::counter!(BOOKINGS_CREATED_TOTAL, "kind" => "artist").increment(1);
        self.signatures
            .save(SignatureKind::Artist, &new.person, &signature)
            .await;
        Ok(InsertOutcome::Inserted(booking_id))
    }

    pub async fn list_artist_bookings(&self) -> Vec<ArtistBookingRecord> {
        let tables = self.tables.read().await;
        tables
            .artist_bookings
            .keys()
            .filter_map(|&id| tables.artist_booking_record(id))
            .collect()
    }

    pub async fn get_artist_booking(
        &self,
        id: ArtistBookingId,
    ) -> Result<ArtistBookingRecord, EngineError> {
        let tables = self.tables.read().await;
        tables
            .artist_booking_record(id)
            .ok_or(EngineError::NotFound(Entity::ArtistBooking, id))
    }

    /// Person, choices and payment in one transaction; association lists are
    /// replaced when given.
    pub async fn update_artist_booking(
        &self,
        id: ArtistBookingId,
        update: ArtistBookingUpdate,
    ) -> Result<ArtistBookingRecord, EngineError> {
        validate::person(&update.person)?;
        validate::artist_choices(&update.choices, &self.catalog)?;
        validate::artist_lists(
            update.artist_material_ids.as_deref().unwrap_or(&[]),
            update.profession_ids.as_deref().unwrap_or(&[]),
            &self.catalog,
        )?;
        validate::payment(&update.payment)?;

        let mut tables = self.tables.write().await;
        let row = tables
            .artist_bookings
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::ArtistBooking, id))?;
        let artist = tables
            .artists
            .get(&row.artist_id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Artist, row.artist_id))?;

        let key = update.person.key();
        if let Some(other) = tables.artist_by_key(&key)
            && other != artist.id
        {
            return Err(EngineError::AlreadyExists(Entity::Artist, key));
        }

        let mut mutations = Vec::with_capacity(4);
        if artist.person != update.person {
            mutations.push(Mutation::ArtistUpdated(Artist {
                id: artist.id,
                person: update.person,
            }));
        }
        mutations.push(Mutation::ArtistBookingUpdated(ArtistBookingRow {
            choices: update.choices,
            payment: update.payment,
            ..row
        }));
        if let Some(artist_material_ids) = update.artist_material_ids {
            mutations.push(Mutation::ArtistMaterialsReplaced {
                booking_id: id,
                artist_material_ids,
            });
        }
        if let Some(profession_ids) = update.profession_ids {
            mutations.push(Mutation::ArtistProfessionsReplaced {
                booking_id: id,
                profession_ids,
            });
        }
        self.commit(&mut tables, mutations).await?;

        info!(artist_booking_id = id, "artist booking updated");
        tables
            .artist_booking_record(id)
            .ok_or(EngineError::NotFound(Entity::ArtistBooking, id))
    }

    pub async fn update_artist_payment(
        &self,
        id: ArtistBookingId,
        payment: Payment,
    ) -> Result<(), EngineError> {
        validate::payment(&payment)?;
        let mut tables = self.tables.write().await;
        if !tables.artist_bookings.contains_key(&id) {
            return Err(EngineError::NotFound(Entity::ArtistBooking, id));
        }
        let is_paid = payment.is_paid;
        self.commit(
            &mut tables,
            vec![Mutation::ArtistPaymentUpdated {
                booking_id: id,
                payment,
            }],
        )
        .await?;
        info!(artist_booking_id = id, is_paid, "artist payment updated");
        Ok(())
    }

    pub async fn delete_artist_booking(&self, id: ArtistBookingId) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        let artist_id = tables
            .artist_bookings
            .get(&id)
            .map(|row| row.artist_id)
            .ok_or(EngineError::NotFound(Entity::ArtistBooking, id))?;

        let mut mutations = vec![Mutation::ArtistBookingDeleted { id }];
        let orphaned = tables.bookings_of_artist(artist_id) == 1;
        if orphaned {
            mutations.push(Mutation::ArtistDeleted { id: artist_id });
        }
        self.commit(&mut tables, mutations).await?;

        info!(artist_booking_id = id, artist_removed = orphaned, "artist booking deleted");
        Ok(())
    }
}
