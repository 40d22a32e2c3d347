use std::collections::HashMap;

use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Parsed command from SQL input.
///
/// Inserts and updates name their columns; list-valued columns
/// (`material_ids`, `booking_ids`, ...) take a JSON array as text.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectFormContent,
    SelectArtistFormContent,
    SelectBookings {
        id: Option<BookingId>,
    },
    SelectArtistBookings {
        id: Option<ArtistBookingId>,
    },
    SelectAssignments {
        filter: AssignmentFilter,
    },
    SelectBookingSummary,
    SelectTimeslotSummary,
    SelectShiftCount {
        booking_id: BookingId,
    },
    SelectTimeslotCount {
        timeslot_id: TimeslotId,
    },
    InsertBooking(NewBooking),
    InsertAttendeeBooking {
        attendee_id: AttendeeId,
        booking: ExtraBooking,
    },
    UpdateBooking {
        id: BookingId,
        update: BookingUpdate,
    },
    UpdatePayment {
        id: BookingId,
        payment: Payment,
    },
    DeleteBooking {
        id: BookingId,
    },
    InsertArtistBooking(NewArtistBooking),
    UpdateArtistBooking {
        id: ArtistBookingId,
        update: ArtistBookingUpdate,
    },
    UpdateArtistPayment {
        id: ArtistBookingId,
        payment: Payment,
    },
    DeleteArtistBooking {
        id: ArtistBookingId,
    },
    InsertAssignment {
        booking_id: BookingId,
        timeslot_id: TimeslotId,
        is_confirmed: bool,
        admin_notes: String,
    },
    UpdateAssignment {
        id: AssignmentId,
        is_confirmed: bool,
        admin_notes: String,
    },
    DeleteAssignment {
        id: AssignmentId,
    },
    BulkAssign {
        booking_ids: Vec<BookingId>,
        timeslot_ids: Vec<TimeslotId>,
    },
    /// Strategy name as sent; resolved by the API layer.
    AutoAssign {
        strategy: String,
    },
    ResendConfirmation {
        booking_id: BookingId,
    },
    ResendArtistConfirmation {
        artist_booking_id: ArtistBookingId,
    },
    SelectHealth,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── Column sets ───────────────────────────────────────────────

const PERSON_COLUMNS: &[&str] = &["first_name", "last_name", "email", "phone"];
const CHOICE_COLUMNS: &[&str] = &[
    "ticket_id",
    "beverage_id",
    "food_id",
    "timeslot_priority_1",
    "timeslot_priority_2",
    "timeslot_priority_3",
    "amount_shifts",
    "supporter_buddy",
    "total_price",
    "material_ids",
    "profession_ids",
];
const ARTIST_CHOICE_COLUMNS: &[&str] = &[
    "ticket_id",
    "beverage_id",
    "food_id",
    "total_price",
    "equipment",
    "special_requests",
    "performance_details",
    "artist_material_ids",
    "profession_ids",
];
const PAYMENT_COLUMNS: &[&str] = &["is_paid", "paid_amount", "payment_notes", "payment_date"];

/// Column name -> value expression, for one INSERT row or one UPDATE SET list.
struct Fields<'a> {
    table: &'static str,
    values: HashMap<String, &'a Expr>,
}

impl<'a> Fields<'a> {
    fn only(&self, allowed: &[&[&str]]) -> Result<(), SqlError> {
        for col in self.values.keys() {
            if !allowed.iter().any(|set| set.contains(&col.as_str())) {
                return Err(SqlError::UnknownColumn(self.table, col.clone()));
            }
        }
        Ok(())
    }

    fn has(&self, col: &str) -> bool {
        self.values.contains_key(col)
    }

    fn get(&self, col: &str) -> Option<&'a Expr> {
        self.values.get(col).copied().filter(|e| !is_null(e))
    }

    fn required(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(col).ok_or(SqlError::MissingColumn(self.table, col))
    }

    fn text(&self, col: &'static str) -> Result<String, SqlError> {
        parse_string(self.required(col)?)
    }

    fn text_or_empty(&self, col: &str) -> Result<String, SqlError> {
        self.get(col).map(parse_string).unwrap_or(Ok(String::new()))
    }

    fn opt_text(&self, col: &str) -> Result<Option<String>, SqlError> {
        self.get(col).map(parse_string).transpose()
    }

    fn id(&self, col: &'static str) -> Result<u64, SqlError> {
        parse_u64(self.required(col)?)
    }

    /// Catalog choice column. NULL or a negative id means nothing was picked.
    fn choice(&self, col: &str) -> Result<Option<u32>, SqlError> {
        let Some(expr) = self.get(col) else {
            return Ok(None);
        };
        let v = parse_i64_expr(expr)?;
        if v < 0 {
            return Ok(None);
        }
        u32::try_from(v)
            .map(Some)
            .map_err(|_| SqlError::Parse(format!("{col}: {v} out of u32 range")))
    }

    fn u8_or_zero(&self, col: &str) -> Result<u8, SqlError> {
        match self.get(col) {
            Some(e) => {
                let v = parse_i64_expr(e)?;
                u8::try_from(v).map_err(|_| SqlError::Parse(format!("{col}: {v} out of range")))
            }
            None => Ok(0),
        }
    }

    fn f64_or_zero(&self, col: &str) -> Result<f64, SqlError> {
        self.get(col).map(parse_f64).unwrap_or(Ok(0.0))
    }

    fn bool_or_false(&self, col: &str) -> Result<bool, SqlError> {
        self.get(col).map(parse_bool).unwrap_or(Ok(false))
    }

    fn ids<T: serde::de::DeserializeOwned>(&self, col: &str) -> Result<Vec<T>, SqlError> {
        Ok(self.opt_ids(col)?.unwrap_or_default())
    }

    /// `None` when the column is absent, so updates can leave a list alone.
    fn opt_ids<T: serde::de::DeserializeOwned>(&self, col: &str) -> Result<Option<Vec<T>>, SqlError> {
        if !self.has(col) {
            return Ok(None);
        }
        let Some(expr) = self.get(col) else {
            return Ok(Some(Vec::new()));
        };
        let text = parse_string(expr)?;
        if text.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| SqlError::Parse(format!("{col}: expected JSON array of ids: {e}")))
    }

    fn person(&self) -> Result<Person, SqlError> {
        Ok(Person {
            first_name: self.text("first_name")?,
            last_name: self.text("last_name")?,
            email: self.text("email")?,
            phone: self.text_or_empty("phone")?,
        })
    }

    fn booking_choices(&self) -> Result<BookingChoices, SqlError> {
        Ok(BookingChoices {
            ticket_id: self.choice("ticket_id")?,
            beverage_id: self.choice("beverage_id")?,
            food_id: self.choice("food_id")?,
            timeslot_priority_1: self.choice("timeslot_priority_1")?,
            timeslot_priority_2: self.choice("timeslot_priority_2")?,
            timeslot_priority_3: self.choice("timeslot_priority_3")?,
            amount_shifts: self.u8_or_zero("amount_shifts")?,
            supporter_buddy: self.text_or_empty("supporter_buddy")?,
            total_price: self.f64_or_zero("total_price")?,
        })
    }

    fn artist_choices(&self) -> Result<ArtistChoices, SqlError> {
        Ok(ArtistChoices {
            ticket_id: self.choice("ticket_id")?,
            beverage_id: self.choice("beverage_id")?,
            food_id: self.choice("food_id")?,
            total_price: self.f64_or_zero("total_price")?,
            equipment: self.text_or_empty("equipment")?,
            special_requests: self.text_or_empty("special_requests")?,
            performance_details: self.text_or_empty("performance_details")?,
        })
    }

    fn payment(&self) -> Result<Payment, SqlError> {
        Ok(Payment {
            is_paid: self.bool_or_false("is_paid")?,
            paid_amount: self.f64_or_zero("paid_amount")?,
            payment_notes: self.text_or_empty("payment_notes")?,
            payment_date: self.opt_text("payment_date")?,
        })
    }

    fn payment_only(&self) -> bool {
        !self.values.is_empty() && self.values.keys().all(|c| PAYMENT_COLUMNS.contains(&c.as_str()))
    }
}

/// Statement kind, used to describe result columns before parameters are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Select,
    Insert,
    Update,
    Delete,
}

/// Kind and target table of `sql` without interpreting any values.
pub fn target(sql: &str) -> Option<(Verb, &'static str)> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    let (verb, table) = match stmts.first()? {
        Statement::Insert(insert) => (Verb::Insert, insert_table_name(insert).ok()?),
        Statement::Update { table, .. } => (Verb::Update, table_factor_name(&table.relation).ok()?),
        Statement::Delete(delete) => (Verb::Delete, delete_table_name(delete).ok()?),
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(s) => (Verb::Select, table_factor_name(&s.from.first()?.relation).ok()?),
            _ => return None,
        },
        _ => return None,
    };
    known_table(&table).ok().map(|t| (verb, t))
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let table = known_table(&table)?;
    let row = extract_insert_row(insert)?;
    if insert.columns.len() != row.len() {
        return Err(SqlError::WrongArity(table, insert.columns.len(), row.len()));
    }
    let f = Fields {
        table,
        values: insert
            .columns
            .iter()
            .map(|c| c.value.to_lowercase())
            .zip(row.iter())
            .collect(),
    };

    match table {
        "bookings" => {
            f.only(&[PERSON_COLUMNS, CHOICE_COLUMNS, &["signature"]])?;
            Ok(Command::InsertBooking(NewBooking {
                person: f.person()?,
                choices: f.booking_choices()?,
                material_ids: f.ids("material_ids")?,
                profession_ids: f.ids("profession_ids")?,
                signature: f.text("signature")?,
            }))
        }
        "attendee_bookings" => {
            f.only(&[&["attendee_id"], CHOICE_COLUMNS])?;
            Ok(Command::InsertAttendeeBooking {
                attendee_id: f.id("attendee_id")?,
                booking: ExtraBooking {
                    choices: f.booking_choices()?,
                    material_ids: f.ids("material_ids")?,
                    profession_ids: f.ids("profession_ids")?,
                },
            })
        }
        "artist_bookings" => {
            f.only(&[PERSON_COLUMNS, ARTIST_CHOICE_COLUMNS, PAYMENT_COLUMNS, &["signature"]])?;
            Ok(Command::InsertArtistBooking(NewArtistBooking {
                person: f.person()?,
                choices: f.artist_choices()?,
                artist_material_ids: f.ids("artist_material_ids")?,
                profession_ids: f.ids("profession_ids")?,
                payment: f.payment()?,
                signature: f.text("signature")?,
            }))
        }
        "shift_assignments" => {
            f.only(&[&["booking_id", "timeslot_id", "is_confirmed", "admin_notes"]])?;
            Ok(Command::InsertAssignment {
                booking_id: f.id("booking_id")?,
                timeslot_id: parse_u32(f.required("timeslot_id")?)?,
                is_confirmed: f.bool_or_false("is_confirmed")?,
                admin_notes: f.text_or_empty("admin_notes")?,
            })
        }
        "bulk_assignments" => {
            f.only(&[&["booking_ids", "timeslot_ids"]])?;
            f.required("booking_ids")?;
            f.required("timeslot_ids")?;
            Ok(Command::BulkAssign {
                booking_ids: f.ids("booking_ids")?,
                timeslot_ids: f.ids("timeslot_ids")?,
            })
        }
        "auto_assign" => {
            f.only(&[&["strategy"]])?;
            Ok(Command::AutoAssign {
                strategy: f.text("strategy")?,
            })
        }
        "confirmation_mails" => {
            f.only(&[&["booking_id"]])?;
            Ok(Command::ResendConfirmation {
                booking_id: f.id("booking_id")?,
            })
        }
        "artist_confirmation_mails" => {
            f.only(&[&["artist_booking_id"]])?;
            Ok(Command::ResendArtistConfirmation {
                artist_booking_id: f.id("artist_booking_id")?,
            })
        }
        _ => Err(SqlError::Unsupported(format!("INSERT INTO {table}"))),
    }
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = known_table(&table_factor_name(&table.relation)?)?;
    let id = extract_where_id(selection)?;
    let mut values = HashMap::new();
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name)
                .ok_or_else(|| SqlError::Parse("empty column name".into()))?,
            AssignmentTarget::Tuple(_) => {
                return Err(SqlError::Unsupported("tuple assignment".into()));
            }
        };
        values.insert(col, &a.value);
    }
    let f = Fields { table, values };

    match table {
        "bookings" if f.payment_only() => Ok(Command::UpdatePayment {
            id,
            payment: f.payment()?,
        }),
        "bookings" => {
            f.only(&[PERSON_COLUMNS, CHOICE_COLUMNS])?;
            Ok(Command::UpdateBooking {
                id,
                update: BookingUpdate {
                    person: f.person()?,
                    choices: f.booking_choices()?,
                    material_ids: f.opt_ids("material_ids")?,
                    profession_ids: f.opt_ids("profession_ids")?,
                },
            })
        }
        "artist_bookings" if f.payment_only() => Ok(Command::UpdateArtistPayment {
            id,
            payment: f.payment()?,
        }),
        "artist_bookings" => {
            f.only(&[PERSON_COLUMNS, ARTIST_CHOICE_COLUMNS, PAYMENT_COLUMNS])?;
            Ok(Command::UpdateArtistBooking {
                id,
                update: ArtistBookingUpdate {
                    person: f.person()?,
                    choices: f.artist_choices()?,
                    payment: f.payment()?,
                    artist_material_ids: f.opt_ids("artist_material_ids")?,
                    profession_ids: f.opt_ids("profession_ids")?,
                },
            })
        }
        "shift_assignments" => {
            f.only(&[&["is_confirmed", "admin_notes"]])?;
            f.required("is_confirmed")?;
            Ok(Command::UpdateAssignment {
                id,
                is_confirmed: f.bool_or_false("is_confirmed")?,
                admin_notes: f.text_or_empty("admin_notes")?,
            })
        }
        _ => Err(SqlError::Unsupported(format!("UPDATE {table}"))),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = known_table(&delete_table_name(delete)?)?;
    let id = extract_where_id(&delete.selection)?;

    match table {
        "bookings" => Ok(Command::DeleteBooking { id }),
        "artist_bookings" => Ok(Command::DeleteArtistBooking { id }),
        "shift_assignments" => Ok(Command::DeleteAssignment { id }),
        _ => Err(SqlError::Unsupported(format!("DELETE FROM {table}"))),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = known_table(&table_factor_name(&from.relation)?)?;
    let filter = match &select.selection {
        Some(expr) => Some(extract_eq(expr)?),
        None => None,
    };

    let no_filter = |cmd: Command| match &filter {
        None => Ok(cmd),
        Some((col, _)) => Err(SqlError::UnknownColumn(table, col.clone())),
    };

    match table {
        "form_content" => no_filter(Command::SelectFormContent),
        "artist_form_content" => no_filter(Command::SelectArtistFormContent),
        "booking_summary" => no_filter(Command::SelectBookingSummary),
        "timeslot_summary" => no_filter(Command::SelectTimeslotSummary),
        "health" => no_filter(Command::SelectHealth),
        "bookings" | "artist_bookings" => {
            let id = match filter {
                None => None,
                Some((col, value)) if col == "id" => Some(parse_u64(value)?),
                Some((col, _)) => return Err(SqlError::UnknownColumn(table, col)),
            };
            Ok(if table == "bookings" {
                Command::SelectBookings { id }
            } else {
                Command::SelectArtistBookings { id }
            })
        }
        "shift_assignments" => {
            let filter = match filter {
                None => AssignmentFilter::All,
                Some((col, value)) => match col.as_str() {
                    "booking_id" => AssignmentFilter::ByBooking(parse_u64(value)?),
                    "timeslot_id" => AssignmentFilter::ByTimeslot(parse_u32(value)?),
                    _ => return Err(SqlError::UnknownColumn(table, col)),
                },
            };
            Ok(Command::SelectAssignments { filter })
        }
        "booking_shift_count" => match filter {
            Some((col, value)) if col == "booking_id" => Ok(Command::SelectShiftCount {
                booking_id: parse_u64(value)?,
            }),
            _ => Err(SqlError::MissingFilter("booking_id")),
        },
        "timeslot_assignment_count" => match filter {
            Some((col, value)) if col == "timeslot_id" => Ok(Command::SelectTimeslotCount {
                timeslot_id: parse_u32(value)?,
            }),
            _ => Err(SqlError::MissingFilter("timeslot_id")),
        },
        _ => Err(SqlError::Unsupported(format!("SELECT FROM {table}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

const TABLES: &[&str] = &[
    "form_content",
    "artist_form_content",
    "bookings",
    "attendee_bookings",
    "artist_bookings",
    "shift_assignments",
    "bulk_assignments",
    "auto_assign",
    "booking_summary",
    "timeslot_summary",
    "booking_shift_count",
    "timeslot_assignment_count",
    "confirmation_mails",
    "artist_confirmation_mails",
    "health",
];

fn known_table(name: &str) -> Result<&'static str, SqlError> {
    TABLES
        .iter()
        .copied()
        .find(|t| *t == name)
        .ok_or_else(|| SqlError::UnknownTable(name.to_string()))
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// The single VALUES row of an INSERT. Multi-row inserts are refused so a
/// registration is always one statement.
fn extract_insert_row(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

/// `column = value`, the only WHERE shape understood.
fn extract_eq(expr: &Expr) -> Result<(String, &Expr), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => expr_column_name(left)
            .map(|col| (col, right.as_ref()))
            .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}"))),
        Expr::Nested(inner) => extract_eq(inner),
        _ => Err(SqlError::Unsupported(format!("WHERE {expr}"))),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<u64, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match extract_eq(sel)? {
        (col, value) if col == "id" => parse_u64(value),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s))
        | Some(Value::DollarQuotedString(ast::DollarQuotedString { value: s, .. })) => {
            Ok(s.clone())
        }
        Some(Value::Number(n, _)) => Ok(n.clone()),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_u64(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64_expr(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("{v} is not a valid id")))
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad number {s}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_f64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(&'static str, String),
    MissingColumn(&'static str, &'static str),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(t, c) => write!(f, "{t}: unknown column {c}"),
            SqlError::MissingColumn(t, c) => write!(f, "{t}: missing column {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: {expected} columns but {got} values")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_insert_booking() {
        let sql = "INSERT INTO bookings (first_name, last_name, email, phone, ticket_id, \
                   beverage_id, food_id, timeslot_priority_1, timeslot_priority_2, \
                   timeslot_priority_3, amount_shifts, supporter_buddy, total_price, \
                   material_ids, profession_ids, signature) \
                   VALUES ('Ada', 'Lovelace', 'ada@example.org', '0123', 0, NULL, 1, \
                   4, 2, NULL, 2, 'Grace', 105.5, '[0, 1]', '[]', 'aGVsbG8=')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertBooking(b) => {
                assert_eq!(b.person.first_name, "Ada");
                assert_eq!(b.person.phone, "0123");
                assert_eq!(b.choices.ticket_id, Some(0));
                assert_eq!(b.choices.beverage_id, None);
                assert_eq!(b.choices.timeslot_priority_1, Some(4));
                assert_eq!(b.choices.timeslot_priority_3, None);
                assert_eq!(b.choices.amount_shifts, 2);
                assert_eq!(b.choices.supporter_buddy, "Grace");
                assert_eq!(b.choices.total_price, 105.5);
                assert_eq!(b.material_ids, vec![0, 1]);
                assert!(b.profession_ids.is_empty());
                assert_eq!(b.signature, "aGVsbG8=");
            }
            _ => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn insert_booking_needs_identity_and_signature() {
        let sql = "INSERT INTO bookings (first_name, email, signature) VALUES ('Ada', 'a@b.c', 'x')";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingColumn("bookings", "last_name"))
        ));
        let sql = "INSERT INTO bookings (first_name, last_name, email) VALUES ('Ada', 'L', 'a@b.c')";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingColumn("bookings", "signature"))
        ));
    }

    #[test]
    fn negative_choice_ids_mean_no_choice() {
        let sql = "INSERT INTO bookings (first_name, last_name, email, ticket_id, beverage_id, \
                   food_id, timeslot_priority_1, timeslot_priority_2, timeslot_priority_3, \
                   amount_shifts, signature) \
                   VALUES ('Ada', 'L', 'a@b.c', 0, -1, '-1', 4, -1, -1, 1, 'aGVsbG8=')";
        let Command::InsertBooking(b) = parse_sql(sql).unwrap() else {
            panic!("expected InsertBooking");
        };
        assert_eq!(b.choices.ticket_id, Some(0));
        assert_eq!(b.choices.beverage_id, None);
        assert_eq!(b.choices.food_id, None);
        assert_eq!(b.choices.timeslot_priority_1, Some(4));
        assert_eq!(b.choices.timeslot_priority_2, None);
        assert_eq!(b.choices.timeslot_priority_3, None);

        let sql = "INSERT INTO artist_bookings (first_name, last_name, email, ticket_id, food_id, signature) \
                   VALUES ('Nina', 'L', 'n@b.c', -1, 1, 'aGVsbG8=')";
        let Command::InsertArtistBooking(a) = parse_sql(sql).unwrap() else {
            panic!("expected InsertArtistBooking");
        };
        assert_eq!(a.choices.ticket_id, None);
        assert_eq!(a.choices.food_id, Some(1));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let sql = "INSERT INTO shift_assignments (booking_id, timeslot_id, colour) VALUES (1, 2, 'red')";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::UnknownColumn("shift_assignments", ref c)) if c == "colour"
        ));
    }

    #[test]
    fn column_value_count_must_match() {
        let sql = "INSERT INTO shift_assignments (booking_id, timeslot_id) VALUES (1)";
        assert!(matches!(parse_sql(sql), Err(SqlError::WrongArity(_, 2, 1))));
    }

    #[test]
    fn parse_insert_assignment_defaults() {
        let cmd = parse_sql("INSERT INTO shift_assignments (booking_id, timeslot_id) VALUES (5, 10)").unwrap();
        assert_eq!(
            cmd,
            Command::InsertAssignment {
                booking_id: 5,
                timeslot_id: 10,
                is_confirmed: false,
                admin_notes: String::new(),
            }
        );

        let cmd = parse_sql(
            "INSERT INTO shift_assignments (booking_id, timeslot_id, is_confirmed, admin_notes) \
             VALUES (5, 10, true, 'early')",
        )
        .unwrap();
        assert!(matches!(cmd, Command::InsertAssignment { is_confirmed: true, ref admin_notes, .. } if admin_notes == "early"));
    }

    #[test]
    fn parse_attendee_booking() {
        let sql = "INSERT INTO attendee_bookings (attendee_id, ticket_id, amount_shifts, material_ids) \
                   VALUES (3, 1, 1, '[1]')";
        match parse_sql(sql).unwrap() {
            Command::InsertAttendeeBooking { attendee_id, booking } => {
                assert_eq!(attendee_id, 3);
                assert_eq!(booking.choices.ticket_id, Some(1));
                assert_eq!(booking.material_ids, vec![1]);
                assert!(booking.profession_ids.is_empty());
            }
            other => panic!("expected InsertAttendeeBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_artist_booking_with_payment() {
        let sql = "INSERT INTO artist_bookings (first_name, last_name, email, ticket_id, \
                   equipment, performance_details, artist_material_ids, is_paid, paid_amount, signature) \
                   VALUES ('Nina', 'Simone', 'nina@example.org', 1, '2 mics', '{\"genre\":\"jazz\"}', \
                   '[0]', true, 20, 'aGVsbG8=')";
        match parse_sql(sql).unwrap() {
            Command::InsertArtistBooking(b) => {
                assert_eq!(b.choices.equipment, "2 mics");
                assert_eq!(b.choices.performance_details, r#"{"genre":"jazz"}"#);
                assert_eq!(b.artist_material_ids, vec![0]);
                assert!(b.payment.is_paid);
                assert_eq!(b.payment.paid_amount, 20.0);
                assert_eq!(b.payment.payment_date, None);
            }
            other => panic!("expected InsertArtistBooking, got {other:?}"),
        }
    }

    #[test]
    fn bad_id_list_is_a_parse_error() {
        let sql = "INSERT INTO bulk_assignments (booking_ids, timeslot_ids) VALUES ('[1,2', '[3]')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_bulk_and_auto() {
        let cmd = parse_sql("INSERT INTO bulk_assignments (booking_ids, timeslot_ids) VALUES ('[1,2]', '[3]')").unwrap();
        assert_eq!(
            cmd,
            Command::BulkAssign {
                booking_ids: vec![1, 2],
                timeslot_ids: vec![3],
            }
        );
        let cmd = parse_sql("INSERT INTO auto_assign (strategy) VALUES ('fill')").unwrap();
        assert_eq!(cmd, Command::AutoAssign { strategy: "fill".into() });
    }

    #[test]
    fn parse_confirmation_resends() {
        let cmd = parse_sql("INSERT INTO confirmation_mails (booking_id) VALUES (4)").unwrap();
        assert_eq!(cmd, Command::ResendConfirmation { booking_id: 4 });
        let cmd = parse_sql("INSERT INTO artist_confirmation_mails (artist_booking_id) VALUES (2)").unwrap();
        assert_eq!(cmd, Command::ResendArtistConfirmation { artist_booking_id: 2 });

        assert!(matches!(
            parse_sql("INSERT INTO confirmation_mails (email) VALUES ('a@b.c')"),
            Err(SqlError::UnknownColumn("confirmation_mails", _))
        ));
        assert!(matches!(
            parse_sql("INSERT INTO confirmation_mails (booking_id) VALUES (NULL)"),
            Err(SqlError::MissingColumn("confirmation_mails", "booking_id"))
        ));
    }

    #[test]
    fn parse_health() {
        assert_eq!(parse_sql("SELECT * FROM health").unwrap(), Command::SelectHealth);
        assert!(matches!(
            parse_sql("SELECT * FROM health WHERE status = 'healthy'"),
            Err(SqlError::UnknownColumn("health", _))
        ));
        assert_eq!(target("SELECT * FROM health"), Some((Verb::Select, "health")));
    }

    #[test]
    fn payment_only_update_is_payment_command() {
        let cmd = parse_sql(
            "UPDATE bookings SET is_paid = true, paid_amount = 80, payment_date = '2025-05-01' WHERE id = 7",
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::UpdatePayment {
                id: 7,
                payment: Payment {
                    is_paid: true,
                    paid_amount: 80.0,
                    payment_notes: String::new(),
                    payment_date: Some("2025-05-01".into()),
                },
            }
        );
        let cmd = parse_sql("UPDATE artist_bookings SET is_paid = false WHERE id = 2").unwrap();
        assert!(matches!(cmd, Command::UpdateArtistPayment { id: 2, .. }));
    }

    #[test]
    fn full_update_keeps_absent_lists() {
        let cmd = parse_sql(
            "UPDATE bookings SET first_name = 'Ada', last_name = 'L', email = 'a@b.c', \
             amount_shifts = 1, profession_ids = '[0]' WHERE id = 4",
        )
        .unwrap();
        match cmd {
            Command::UpdateBooking { id, update } => {
                assert_eq!(id, 4);
                assert_eq!(update.choices.amount_shifts, 1);
                assert_eq!(update.material_ids, None);
                assert_eq!(update.profession_ids, Some(vec![0]));
            }
            other => panic!("expected UpdateBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_assignment() {
        let cmd = parse_sql("UPDATE shift_assignments SET is_confirmed = 't', admin_notes = 'ok' WHERE id = 9").unwrap();
        assert_eq!(
            cmd,
            Command::UpdateAssignment {
                id: 9,
                is_confirmed: true,
                admin_notes: "ok".into(),
            }
        );
        assert!(parse_sql("UPDATE shift_assignments SET admin_notes = 'x' WHERE id = 9").is_err());
    }

    #[test]
    fn update_requires_id_filter() {
        assert!(matches!(
            parse_sql("UPDATE shift_assignments SET is_confirmed = true"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_deletes() {
        assert_eq!(parse_sql("DELETE FROM bookings WHERE id = 3").unwrap(), Command::DeleteBooking { id: 3 });
        assert_eq!(
            parse_sql("DELETE FROM artist_bookings WHERE id = '4'").unwrap(),
            Command::DeleteArtistBooking { id: 4 }
        );
        assert_eq!(
            parse_sql("DELETE FROM shift_assignments WHERE id = 5").unwrap(),
            Command::DeleteAssignment { id: 5 }
        );
        assert!(parse_sql("DELETE FROM bookings WHERE id = -1").is_err());
        assert!(matches!(parse_sql("DELETE FROM form_content WHERE id = 1"), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_selects() {
        assert_eq!(parse_sql("SELECT * FROM form_content").unwrap(), Command::SelectFormContent);
        assert_eq!(parse_sql("select * from ARTIST_FORM_CONTENT").unwrap(), Command::SelectArtistFormContent);
        assert_eq!(parse_sql("SELECT * FROM bookings").unwrap(), Command::SelectBookings { id: None });
        assert_eq!(
            parse_sql("SELECT * FROM bookings WHERE id = 2").unwrap(),
            Command::SelectBookings { id: Some(2) }
        );
        assert_eq!(
            parse_sql("SELECT * FROM shift_assignments WHERE timeslot_id = 4").unwrap(),
            Command::SelectAssignments { filter: AssignmentFilter::ByTimeslot(4) }
        );
        assert_eq!(
            parse_sql("SELECT * FROM shift_assignments WHERE booking_id = 1").unwrap(),
            Command::SelectAssignments { filter: AssignmentFilter::ByBooking(1) }
        );
        assert_eq!(
            parse_sql("SELECT * FROM booking_shift_count WHERE booking_id = 8").unwrap(),
            Command::SelectShiftCount { booking_id: 8 }
        );
        assert_eq!(
            parse_sql("SELECT * FROM timeslot_assignment_count WHERE timeslot_id = 0").unwrap(),
            Command::SelectTimeslotCount { timeslot_id: 0 }
        );
        assert_eq!(parse_sql("SELECT * FROM timeslot_summary").unwrap(), Command::SelectTimeslotSummary);
    }

    #[test]
    fn select_filters_are_checked() {
        assert!(matches!(
            parse_sql("SELECT * FROM booking_shift_count"),
            Err(SqlError::MissingFilter("booking_id"))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM form_content WHERE id = 1"),
            Err(SqlError::UnknownColumn("form_content", _))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM shift_assignments WHERE id = 1"),
            Err(SqlError::UnknownColumn(..))
        ));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("SELECT * FROM resources"),
            Err(SqlError::UnknownTable(t)) if t == "resources"
        ));
    }

    #[test]
    fn target_ignores_placeholders() {
        assert_eq!(
            target("INSERT INTO shift_assignments (booking_id, timeslot_id) VALUES ($1, $2)"),
            Some((Verb::Insert, "shift_assignments"))
        );
        assert_eq!(
            target("SELECT * FROM shift_assignments WHERE booking_id = $1"),
            Some((Verb::Select, "shift_assignments"))
        );
        assert_eq!(target("UPDATE bookings SET is_paid = $1 WHERE id = $2"), Some((Verb::Update, "bookings")));
        assert_eq!(target("SELECT * FROM nowhere"), None);
        assert_eq!(target("not sql"), None);
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
        assert!(matches!(
            parse_sql("SELECT * FROM bookings; SELECT * FROM bookings"),
            Err(SqlError::Unsupported(_))
        ));
    }
}
