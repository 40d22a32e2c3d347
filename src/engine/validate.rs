use crate::catalog::Catalog;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

fn text(field: &'static str, value: &str, max: usize, required: bool) -> Result<(), EngineError> {
    if required && value.trim().is_empty() {
        return Err(EngineError::invalid(field, "is required"));
    }
    if value.len() > max {
        return Err(EngineError::invalid(field, format!("longer than {max} bytes")));
    }
    Ok(())
}

fn amount(field: &'static str, value: f64) -> Result<(), EngineError> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::invalid(field, "must be a non-negative number"));
    }
    Ok(())
}

fn option(
    field: &'static str,
    id: Option<OptionId>,
    exists: impl Fn(OptionId) -> bool,
) -> Result<(), EngineError> {
    match id {
        Some(id) if !exists(id) => Err(EngineError::invalid(field, format!("unknown id {id}"))),
        _ => Ok(()),
    }
}

fn id_list(
    field: &'static str,
    ids: &[OptionId],
    exists: impl Fn(OptionId) -> bool,
) -> Result<(), EngineError> {
    if ids.len() > MAX_IDS_PER_LIST {
        return Err(EngineError::LimitExceeded("too many ids in list"));
    }
    if let Some(bad) = ids.iter().find(|&&id| !exists(id)) {
        return Err(EngineError::invalid(field, format!("unknown id {bad}")));
    }
    Ok(())
}

pub(super) fn person(p: &Person) -> Result<(), EngineError> {
    text("first_name", &p.first_name, MAX_NAME_LEN, true)?;
    text("last_name", &p.last_name, MAX_NAME_LEN, true)?;
    text("email", &p.email, MAX_EMAIL_LEN, true)?;
    if !p.email.contains('@') {
        return Err(EngineError::invalid("email", "must contain '@'"));
    }
    text("phone", &p.phone, MAX_NAME_LEN, false)
}

pub(super) fn booking_choices(c: &BookingChoices, catalog: &Catalog) -> Result<(), EngineError> {
    option("ticket_id", c.ticket_id, |id| catalog.ticket(id).is_some())?;
    option("beverage_id", c.beverage_id, |id| catalog.beverage(id).is_some())?;
    option("food_id", c.food_id, |id| catalog.food(id).is_some())?;
    for (field, level) in [
        ("timeslot_priority_1", 1),
        ("timeslot_priority_2", 2),
        ("timeslot_priority_3", 3),
    ] {
        option(field, c.priority(level), |id| catalog.timeslot(id).is_some())?;
    }
    if c.amount_shifts > MAX_SHIFTS_PER_BOOKING {
        return Err(EngineError::invalid(
            "amount_shifts",
            format!("must be between 0 and {MAX_SHIFTS_PER_BOOKING}"),
        ));
    }
    text("supporter_buddy", &c.supporter_buddy, MAX_NAME_LEN, false)?;
    amount("total_price", c.total_price)
}

pub(super) fn booking_lists(
    material_ids: &[OptionId],
    profession_ids: &[OptionId],
    catalog: &Catalog,
) -> Result<(), EngineError> {
    id_list("material_ids", material_ids, |id| catalog.material(id).is_some())?;
    id_list("profession_ids", profession_ids, |id| {
        (id as usize) < catalog.form_content().professions.len()
    })
}

pub(super) fn artist_choices(c: &ArtistChoices, catalog: &Catalog) -> Result<(), EngineError> {
    option("ticket_id", c.ticket_id, |id| catalog.ticket(id).is_some())?;
    option("beverage_id", c.beverage_id, |id| catalog.beverage(id).is_some())?;
    option("food_id", c.food_id, |id| catalog.food(id).is_some())?;
    amount("total_price", c.total_price)?;
    text("equipment", &c.equipment, MAX_TEXT_LEN, false)?;
    text("special_requests", &c.special_requests, MAX_TEXT_LEN, false)?;
    text("performance_details", &c.performance_details, MAX_TEXT_LEN, false)
}

pub(super) fn artist_lists(
    artist_material_ids: &[OptionId],
    profession_ids: &[OptionId],
    catalog: &Catalog,
) -> Result<(), EngineError> {
    id_list("artist_material_ids", artist_material_ids, |id| {
        catalog.artist_material(id).is_some()
    })?;
    id_list("profession_ids", profession_ids, |id| {
        (id as usize) < catalog.form_content().professions.len()
    })
}

pub(super) fn payment(p: &Payment) -> Result<(), EngineError> {
    amount("paid_amount", p.paid_amount)?;
    text("payment_notes", &p.payment_notes, MAX_NOTES_LEN, false)?;
    if let Some(date) = &p.payment_date {
        text("payment_date", date, MAX_NAME_LEN, false)?;
    }
    Ok(())
}

pub(super) fn admin_notes(notes: &str) -> Result<(), EngineError> {
    text("admin_notes", notes, MAX_NOTES_LEN, false)
}

pub(super) fn signature(encoded: &str) -> Result<Vec<u8>, EngineError> {
    crate::signature::decode(encoded).map_err(|e| EngineError::invalid("signature", e.to_string()))
}
