//! Static event catalog: what can be booked, and how many of each are needed.
//!
//! Loaded once from `form_content.json`. Ids are positional: every section is
//! numbered from 0 in file order, and timeslots are numbered globally across all
//! work shifts so a timeslot id alone identifies a slot.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{OptionId, TimeslotId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketOption {
    pub id: OptionId,
    pub title: String,
    pub price: f64,
    pub amount: u32,
    pub num_booked: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuOption {
    pub id: OptionId,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub num_booked: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    pub id: OptionId,
    pub title: String,
    pub num_needed: u32,
    pub num_booked: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profession {
    pub id: OptionId,
    pub title: String,
    pub description: String,
    pub num_booked: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSlot {
    pub id: TimeslotId,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    /// Capacity.
    pub num_needed: u32,
    /// Demand: preferences counted with the amount_shifts gate.
    pub num_booked: u32,
    /// Committed: assignment rows.
    pub num_assigned: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkShift {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub time_slots: Vec<TimeSlot>,
}

/// Attendee-facing catalog view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormContent {
    pub ticket_options: Vec<TicketOption>,
    pub beverage_options: Vec<MenuOption>,
    pub food_options: Vec<MenuOption>,
    pub work_shifts: Vec<WorkShift>,
    pub materials: Vec<Material>,
    pub artist_materials: Vec<Material>,
    pub professions: Vec<Profession>,
}

/// Artist-facing catalog view. Counts come from artist bookings only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistFormContent {
    pub ticket_options: Vec<TicketOption>,
    pub beverage_options: Vec<MenuOption>,
    pub food_options: Vec<MenuOption>,
    pub artist_materials: Vec<Material>,
    pub professions: Vec<Profession>,
}

/// Resolved location of a timeslot inside the work-shift tree.
#[derive(Debug, Clone, Copy)]
pub struct SlotRef<'a> {
    pub shift: &'a WorkShift,
    pub slot: &'a TimeSlot,
}

// ── File format ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawTicket {
    title: String,
    price: f64,
    amount: u32,
}

#[derive(Deserialize)]
struct RawMenuOption {
    title: String,
    #[serde(default)]
    description: String,
    price: f64,
}

#[derive(Deserialize)]
struct RawMaterial {
    title: String,
    #[serde(default)]
    num_needed: u32,
}

#[derive(Deserialize)]
struct RawProfession {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct RawTimeSlot {
    title: String,
    start_time: String,
    end_time: String,
    num_needed: u32,
}

#[derive(Deserialize)]
struct RawWorkShift {
    title: String,
    #[serde(default)]
    description: String,
    time_slots: Vec<RawTimeSlot>,
}

#[derive(Deserialize)]
struct RawCatalog {
    ticket_options: Vec<RawTicket>,
    beverage_options: Vec<RawMenuOption>,
    food_options: Vec<RawMenuOption>,
    work_shifts: Vec<RawWorkShift>,
    materials: Vec<RawMaterial>,
    #[serde(default)]
    artist_materials: Vec<RawMaterial>,
    #[serde(default)]
    professions: Vec<RawProfession>,
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "cannot read form content: {e}"),
            CatalogError::Parse(e) => write!(f, "invalid form content: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// The catalog with all counts at zero. Inventory counting annotates clones of it.
#[derive(Debug, Clone)]
pub struct Catalog {
    content: FormContent,
    /// timeslot id -> (work shift index, slot index)
    slot_index: Vec<(usize, usize)>,
}

fn ids<T, U>(raw: Vec<T>, f: impl Fn(OptionId, T) -> U) -> Vec<U> {
    raw.into_iter()
        .enumerate()
        .map(|(i, item)| f(i as OptionId, item))
        .collect()
}

fn materials(raw: Vec<RawMaterial>) -> Vec<Material> {
    ids(raw, |id, m| Material {
        id,
        title: m.title,
        num_needed: m.num_needed,
        num_booked: 0,
    })
}

fn menu(raw: Vec<RawMenuOption>) -> Vec<MenuOption> {
    ids(raw, |id, o| MenuOption {
        id,
        title: o.title,
        description: o.description,
        price: o.price,
        num_booked: 0,
    })
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(CatalogError::Io)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(text).map_err(CatalogError::Parse)?;

        let mut slot_index = Vec::new();
        let mut next_slot: TimeslotId = 0;
        let work_shifts = raw
            .work_shifts
            .into_iter()
            .enumerate()
            .map(|(shift_idx, ws)| {
                let time_slots = ws
                    .time_slots
                    .into_iter()
                    .enumerate()
                    .map(|(slot_idx, ts)| {
                        let id = next_slot;
                        next_slot += 1;
                        slot_index.push((shift_idx, slot_idx));
                        TimeSlot {
                            id,
                            title: ts.title,
                            start_time: ts.start_time,
                            end_time: ts.end_time,
                            num_needed: ts.num_needed,
                            num_booked: 0,
                            num_assigned: 0,
                        }
                    })
                    .collect();
                WorkShift {
                    id: shift_idx as u32,
                    title: ws.title,
                    description: ws.description,
                    time_slots,
                }
            })
            .collect();

        let content = FormContent {
            ticket_options: ids(raw.ticket_options, |id, t| TicketOption {
                id,
                title: t.title,
                price: t.price,
                amount: t.amount,
                num_booked: 0,
            }),
            beverage_options: menu(raw.beverage_options),
            food_options: menu(raw.food_options),
            work_shifts,
            materials: materials(raw.materials),
            artist_materials: materials(raw.artist_materials),
            professions: ids(raw.professions, |id, p| Profession {
                id,
                title: p.title,
                description: p.description,
                num_booked: 0,
            }),
        };

        Ok(Self {
            content,
            slot_index,
        })
    }

    /// Zero-count attendee view.
    pub fn form_content(&self) -> &FormContent {
        &self.content
    }

    /// Zero-count artist view.
    pub fn artist_form_content(&self) -> ArtistFormContent {
        ArtistFormContent {
            ticket_options: self.content.ticket_options.clone(),
            beverage_options: self.content.beverage_options.clone(),
            food_options: self.content.food_options.clone(),
            artist_materials: self.content.artist_materials.clone(),
            professions: self.content.professions.clone(),
        }
    }

    pub fn timeslot(&self, id: TimeslotId) -> Option<SlotRef<'_>> {
        let &(shift_idx, slot_idx) = self.slot_index.get(id as usize)?;
        let shift = &self.content.work_shifts[shift_idx];
        Some(SlotRef {
            shift,
            slot: &shift.time_slots[slot_idx],
        })
    }

    pub fn capacity(&self, id: TimeslotId) -> Option<u32> {
        self.timeslot(id).map(|r| r.slot.num_needed)
    }

    pub fn timeslot_count(&self) -> usize {
        self.slot_index.len()
    }

    /// All timeslots in id order.
    pub fn timeslots(&self) -> impl Iterator<Item = SlotRef<'_>> {
        self.content.work_shifts.iter().flat_map(|shift| {
            shift
                .time_slots
                .iter()
                .map(move |slot| SlotRef { shift, slot })
        })
    }

    pub fn ticket(&self, id: OptionId) -> Option<&TicketOption> {
        self.content.ticket_options.get(id as usize)
    }

    pub fn beverage(&self, id: OptionId) -> Option<&MenuOption> {
        self.content.beverage_options.get(id as usize)
    }

    pub fn food(&self, id: OptionId) -> Option<&MenuOption> {
        self.content.food_options.get(id as usize)
    }

    pub fn material(&self, id: OptionId) -> Option<&Material> {
        self.content.materials.get(id as usize)
    }

    pub fn artist_material(&self, id: OptionId) -> Option<&Material> {
        self.content.artist_materials.get(id as usize)
    }
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r#"{
    "ticket_options": [
        {"title": "Weekend", "price": 80.0, "amount": 500},
        {"title": "Day", "price": 45.0, "amount": 200}
    ],
    "beverage_options": [
        {"title": "Drinks flat", "description": "all weekend", "price": 30.0}
    ],
    "food_options": [
        {"title": "Vegan", "description": "", "price": 25.0},
        {"title": "Veggie", "price": 25.0}
    ],
    "work_shifts": [
        {"title": "Bar", "description": "serve drinks", "time_slots": [
            {"title": "Fri night", "start_time": "Fri 20:00", "end_time": "Sat 02:00", "num_needed": 1},
            {"title": "Sat night", "start_time": "Sat 20:00", "end_time": "Sun 02:00", "num_needed": 2}
        ]},
        {"title": "Kitchen", "description": "", "time_slots": [
            {"title": "Sat lunch", "start_time": "Sat 11:00", "end_time": "Sat 14:00", "num_needed": 2},
            {"title": "Sun lunch", "start_time": "Sun 11:00", "end_time": "Sun 14:00", "num_needed": 1},
            {"title": "Sun dinner", "start_time": "Sun 17:00", "end_time": "Sun 20:00", "num_needed": 3},
            {"title": "Closed", "start_time": "Mon 00:00", "end_time": "Mon 01:00", "num_needed": 0}
        ]}
    ],
    "materials": [
        {"title": "Tent", "num_needed": 4},
        {"title": "Hammer", "num_needed": 2}
    ],
    "artist_materials": [
        {"title": "DI box", "num_needed": 2}
    ],
    "professions": [
        {"title": "Electrician", "description": "licensed"},
        {"title": "Medic"}
    ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_ids() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let fc = catalog.form_content();
        assert_eq!(fc.ticket_options[1].id, 1);
        assert_eq!(fc.food_options[1].description, "");
        assert_eq!(fc.professions[1].id, 1);
        assert_eq!(fc.work_shifts[1].id, 1);
        assert_eq!(catalog.timeslot_count(), 6);
    }

    #[test]
    fn timeslot_ids_are_global() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let slot = catalog.timeslot(2).unwrap();
        assert_eq!(slot.shift.title, "Kitchen");
        assert_eq!(slot.slot.title, "Sat lunch");
        assert_eq!(slot.slot.id, 2);
        assert_eq!(catalog.capacity(5), Some(0));
        assert!(catalog.timeslot(6).is_none());

        let ids: Vec<_> = catalog.timeslots().map(|r| r.slot.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn artist_view_has_artist_sections() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let view = catalog.artist_form_content();
        assert_eq!(view.artist_materials.len(), 1);
        assert_eq!(view.ticket_options.len(), 2);
    }

    #[test]
    fn optional_sections_default_empty() {
        let json = r#"{"ticket_options": [], "beverage_options": [], "food_options": [],
                       "work_shifts": [], "materials": []}"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert!(catalog.form_content().professions.is_empty());
        assert!(catalog.form_content().artist_materials.is_empty());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            Catalog::from_json("{\"ticket_options\": 3}"),
            Err(CatalogError::Parse(_))
        ));
    }
}
