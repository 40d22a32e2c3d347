//! Confirmation mails for submitted registrations.
//!
//! Rendering is pure; delivery goes through [`Mailer`]. The only shipped
//! mailer writes the message to the log, which is what development and the
//! test suite need. A real transport plugs in behind the same trait.

use std::fmt::Write as _;

use async_trait::async_trait;
use tracing::info;

use crate::catalog::{ArtistFormContent, FormContent};
use crate::model::{ArtistBookingRecord, BookingRecord, OptionId, TimeslotId};

pub const BOOKING_SUBJECT: &str = "Your registration is confirmed";
pub const ARTIST_SUBJECT: &str = "Your artist registration is confirmed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug)]
pub struct MailError(pub String);

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mail delivery failed: {}", self.0)
    }
}

impl std::error::Error for MailError {}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &ConfirmationMail) -> Result<(), MailError>;
}

/// Logs every mail instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &ConfirmationMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "confirmation mail");
        for line in mail.body.lines() {
            tracing::debug!(to = %mail.to, "{line}");
        }
        Ok(())
    }
}

fn price_line<'a>(label: &str, found: Option<(&'a str, f64)>) -> String {
    match found {
        Some((title, price)) => format!("{label}: {title} - price: {price}€"),
        None => format!("{label}: not found"),
    }
}

fn title_or<'a>(found: Option<&'a str>, fallback: &'a str) -> &'a str {
    found.unwrap_or(fallback)
}

fn timeslot_line(content: &FormContent, id: Option<TimeslotId>) -> String {
    let found = id.and_then(|id| {
        content.work_shifts.iter().find_map(|ws| {
            ws.time_slots
                .iter()
                .find(|ts| ts.id == id)
                .map(|ts| (ws, ts))
        })
    });
    match found {
        Some((ws, ts)) => format!(
            "{}, timeslot: {}, from: {}, until: {}",
            ws.title, ts.title, ts.start_time, ts.end_time
        ),
        None => "timeslot: not found".to_string(),
    }
}

fn material_lines<'a>(out: &mut String, titles: impl Iterator<Item = &'a str>) {
    let mut any = false;
    for title in titles {
        if !any {
            out.push_str("You are bringing:\n");
            any = true;
        }
        let _ = writeln!(out, "- {title}");
    }
    if !any {
        out.push_str("You are not bringing any materials.\n");
    }
}

/// Human-readable booking summary, the body of the attendee confirmation.
pub fn booking_details(booking: &BookingRecord, content: &FormContent) -> String {
    let c = &booking.choices;
    let ticket = c
        .ticket_id
        .and_then(|id| content.ticket_options.iter().find(|t| t.id == id));
    let beverage = c
        .beverage_id
        .and_then(|id| content.beverage_options.iter().find(|b| b.id == id));
    let food = c
        .food_id
        .and_then(|id| content.food_options.iter().find(|f| f.id == id));

    let mut out = String::new();
    let _ = writeln!(out, "{}\n", price_line("Ticket", ticket.map(|t| (t.title.as_str(), t.price))));
    let _ = writeln!(
        out,
        "{}\n",
        price_line("Beverages", beverage.map(|b| (b.title.as_str(), b.price)))
    );
    let _ = writeln!(out, "{}\n", price_line("Food", food.map(|f| (f.title.as_str(), f.price))));

    out.push_str("You picked these priorities for your supporter shift:\n");
    for level in 1..=3u8 {
        let _ = writeln!(out, "Priority {level}: {}", timeslot_line(content, c.priority(level)));
    }
    let _ = writeln!(
        out,
        "You agreed to work at most {} shift(s).\n",
        c.amount_shifts
    );

    let wanted = |id: &OptionId| booking.material_ids.contains(id);
    material_lines(
        &mut out,
        content
            .materials
            .iter()
            .filter(|m| wanted(&m.id))
            .map(|m| m.title.as_str()),
    );
    let _ = write!(out, "\nTotal price: {}€", c.total_price);
    out
}

/// Transfer reference the attendee quotes with the payment.
pub fn payment_reference(booking: &BookingRecord, content: &FormContent) -> String {
    let c = &booking.choices;
    let ticket = c
        .ticket_id
        .and_then(|id| content.ticket_options.iter().find(|t| t.id == id))
        .map(|t| t.title.as_str());
    let beverage = c
        .beverage_id
        .and_then(|id| content.beverage_options.iter().find(|b| b.id == id))
        .map(|b| b.title.as_str());
    let food = c
        .food_id
        .and_then(|id| content.food_options.iter().find(|f| f.id == id))
        .map(|f| f.title.as_str());
    format!(
        "{}, {} - {} - {} - {}",
        booking.person.first_name,
        booking.person.last_name,
        title_or(ticket, "ticket not found"),
        title_or(beverage, "beverage option not found"),
        title_or(food, "food option not found"),
    )
}

pub fn render_booking_confirmation(
    booking: &BookingRecord,
    content: &FormContent,
) -> ConfirmationMail {
    let body = format!(
        "Hello {},\n\nthanks for registering. Here is what we stored:\n\n{}\n\n\
         Payment reference: {}\n",
        booking.person.first_name,
        booking_details(booking, content),
        payment_reference(booking, content),
    );
    ConfirmationMail {
        to: booking.person.email.clone(),
        subject: BOOKING_SUBJECT.to_string(),
        body,
    }
}

/// Performance details are free text, usually a JSON object from the form.
fn performance_lines(out: &mut String, details: &str) {
    out.push_str("Performance:\n");
    if details.trim().is_empty() {
        out.push_str("No performance details given.\n");
        return;
    }
    match serde_json::from_str::<serde_json::Value>(details) {
        Ok(serde_json::Value::Object(map)) => {
            let fields = [
                ("preferredDay", "Preferred day", ""),
                ("preferredTime", "Preferred time", ""),
                ("duration", "Duration", " minutes"),
                ("genre", "Genre", ""),
            ];
            for (key, label, suffix) in fields {
                let value = match map.get(key) {
                    Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
                    Some(serde_json::Value::Number(n)) => n.to_string(),
                    _ => continue,
                };
                let _ = writeln!(out, "{label}: {value}{suffix}");
            }
        }
        _ => {
            let _ = writeln!(out, "{details}");
        }
    }
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "none given"
    } else {
        text
    }
}

pub fn artist_booking_details(booking: &ArtistBookingRecord, content: &ArtistFormContent) -> String {
    let c = &booking.choices;
    let ticket = c
        .ticket_id
        .and_then(|id| content.ticket_options.iter().find(|t| t.id == id));
    let beverage = c
        .beverage_id
        .and_then(|id| content.beverage_options.iter().find(|b| b.id == id));
    let food = c
        .food_id
        .and_then(|id| content.food_options.iter().find(|f| f.id == id));

    let mut out = String::new();
    let _ = writeln!(out, "{}\n", price_line("Ticket", ticket.map(|t| (t.title.as_str(), t.price))));
    let _ = writeln!(
        out,
        "{}\n",
        price_line("Beverages", beverage.map(|b| (b.title.as_str(), b.price)))
    );
    let _ = writeln!(out, "{}\n", price_line("Food", food.map(|f| (f.title.as_str(), f.price))));
    performance_lines(&mut out, &c.performance_details);
    let _ = writeln!(out, "\nTechnical requirements: {}", or_none(&c.equipment));
    let _ = writeln!(out, "Special requests: {}\n", or_none(&c.special_requests));

    // Listed in the order the artist picked them.
    material_lines(
        &mut out,
        booking.artist_material_ids.iter().filter_map(|id| {
            content
                .artist_materials
                .iter()
                .find(|m| m.id == *id)
                .map(|m| m.title.as_str())
        }),
    );
    let _ = write!(out, "\nTotal price: {}€", c.total_price);
    out
}

pub fn render_artist_confirmation(
    booking: &ArtistBookingRecord,
    content: &ArtistFormContent,
) -> ConfirmationMail {
    let body = format!(
        "Hello {},\n\nthanks for registering as an artist. Here is what we stored:\n\n{}\n",
        booking.person.first_name,
        artist_booking_details(booking, content),
    );
    ConfirmationMail {
        to: booking.person.email.clone(),
        subject: ARTIST_SUBJECT.to_string(),
        body,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every mail it is handed.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<ConfirmationMail>>,
    }

    impl RecordingMailer {
        pub fn sent(&self) -> Vec<ConfirmationMail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: &ConfirmationMail) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _mail: &ConfirmationMail) -> Result<(), MailError> {
            Err(MailError("smtp unreachable".into()))
        }
    }
}
