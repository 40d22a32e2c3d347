use std::collections::HashMap;
use std::time::Duration;

use crate::catalog::{ArtistFormContent, Catalog, FormContent};
use crate::limits::FORM_CONTENT_READ_TIMEOUT_MS;
use crate::model::OptionId;

use super::{Engine, Tables};

fn tally<I: IntoIterator<Item = OptionId>>(ids: I) -> HashMap<OptionId, u32> {
    let mut counts = HashMap::new();
    for id in ids {
        *counts.entry(id).or_insert(0) += 1;
    }
    counts
}

fn get(counts: &HashMap<OptionId, u32>, id: OptionId) -> u32 {
    counts.get(&id).copied().unwrap_or(0)
}

/// Annotate the attendee catalog with counts from the current rows.
///
/// Timeslot `num_booked` is preference demand: a priority-1 pick always
/// counts, priority 2 only when `amount_shifts >= 2`, priority 3 only when
/// `amount_shifts >= 3`. `num_assigned` counts assignment rows.
/// Artist materials are counted from artist bookings.
pub fn count_demand(catalog: &Catalog, tables: &Tables) -> FormContent {
    let bookings = tables.bookings.values();
    let tickets = tally(bookings.clone().filter_map(|b| b.choices.ticket_id));
    let beverages = tally(bookings.clone().filter_map(|b| b.choices.beverage_id));
    let food = tally(bookings.clone().filter_map(|b| b.choices.food_id));
    let materials = tally(
        tables
            .bookings
            .keys()
            .flat_map(|&id| tables.materials_of(id).iter().copied()),
    );
    let professions = tally(
        tables
            .bookings
            .keys()
            .flat_map(|&id| tables.professions_of(id).iter().copied()),
    );
    let artist_materials = tally(
        tables
            .artist_bookings
            .keys()
            .flat_map(|&id| tables.artist_materials_of(id).iter().copied()),
    );
    let demand = tally(bookings.flat_map(|b| {
        (1..=3u8).filter_map(move |level| {
            if b.choices.amount_shifts >= level || level == 1 {
                b.choices.priority(level)
            } else {
                None
            }
        })
    }));

    let mut content = catalog.form_content().clone();
    for t in &mut content.ticket_options {
        t.num_booked = get(&tickets, t.id);
    }
    for b in &mut content.beverage_options {
        b.num_booked = get(&beverages, b.id);
    }
    for f in &mut content.food_options {
        f.num_booked = get(&food, f.id);
    }
    for m in &mut content.materials {
        m.num_booked = get(&materials, m.id);
    }
    for m in &mut content.artist_materials {
        m.num_booked = get(&artist_materials, m.id);
    }
    for p in &mut content.professions {
        p.num_booked = get(&professions, p.id);
    }
    for shift in &mut content.work_shifts {
        for slot in &mut shift.time_slots {
            slot.num_booked = get(&demand, slot.id);
            slot.num_assigned = tables.timeslot_assignment_count(slot.id);
        }
    }
    content
}

/// Annotate the artist catalog with counts from artist bookings.
pub fn count_artist_demand(catalog: &Catalog, tables: &Tables) -> ArtistFormContent {
    let bookings = tables.artist_bookings.values();
    let tickets = tally(bookings.clone().filter_map(|b| b.choices.ticket_id));
    let beverages = tally(bookings.clone().filter_map(|b| b.choices.beverage_id));
    let food = tally(bookings.filter_map(|b| b.choices.food_id));
    let artist_materials = tally(
        tables
            .artist_bookings
            .keys()
            .flat_map(|&id| tables.artist_materials_of(id).iter().copied()),
    );
    let professions = tally(
        tables
            .artist_bookings
            .keys()
            .flat_map(|&id| tables.artist_professions_of(id).iter().copied()),
    );

    let mut content = catalog.artist_form_content();
    for t in &mut content.ticket_options {
        t.num_booked = get(&tickets, t.id);
    }
    for b in &mut content.beverage_options {
        b.num_booked = get(&beverages, b.id);
    }
    for f in &mut content.food_options {
        f.num_booked = get(&food, f.id);
    }
    for m in &mut content.artist_materials {
        m.num_booked = get(&artist_materials, m.id);
    }
    for p in &mut content.professions {
        p.num_booked = get(&professions, p.id);
    }
    content
}

impl Engine {
    /// Catalog with live counts. Never fails: if the tables cannot be read in
    /// time the zero-count catalog is returned and a warning logged.
    pub async fn up_to_date_form_content(&self) -> FormContent {
        let timeout = Duration::from_millis(FORM_CONTENT_READ_TIMEOUT_MS);
        match tokio::time::timeout(timeout, self.tables.read()).await {
            Ok(tables) => count_demand(&self.catalog, &tables),
            Err(_) => {
                tracing::warn!("form content counts unavailable, serving zero counts");
                self.catalog.form_content().clone()
            }
        }
    }

    pub async fn up_to_date_artist_form_content(&self) -> ArtistFormContent {
        let timeout = Duration::from_millis(FORM_CONTENT_READ_TIMEOUT_MS);
        match tokio::time::timeout(timeout, self.tables.read()).await {
            Ok(tables) => count_artist_demand(&self.catalog, &tables),
            Err(_) => {
                tracing::warn!("artist form content counts unavailable, serving zero counts");
                self.catalog.artist_form_content()
            }
        }
    }
}
