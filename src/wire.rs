use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use serde::Serialize;
use serde_json::Value as Json;
use tokio::net::TcpStream;

use crate::api::{Api, ApiError, Identity};
use crate::auth::EventdeskAuthSource;
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError, Verb};

// ── Result schemas ───────────────────────────────────────────────

type Columns = &'static [(&'static str, Type)];

const FORM_CONTENT_COLUMNS: Columns = &[("form_content", Type::VARCHAR)];
const ARTIST_FORM_CONTENT_COLUMNS: Columns = &[("artist_form_content", Type::VARCHAR)];

const BOOKING_COLUMNS: Columns = &[
    ("id", Type::INT8),
    ("attendee_id", Type::INT8),
    ("first_name", Type::VARCHAR),
    ("last_name", Type::VARCHAR),
    ("email", Type::VARCHAR),
    ("phone", Type::VARCHAR),
    ("ticket_id", Type::INT8),
    ("beverage_id", Type::INT8),
    ("food_id", Type::INT8),
    ("timeslot_priority_1", Type::INT8),
    ("timeslot_priority_2", Type::INT8),
    ("timeslot_priority_3", Type::INT8),
    ("amount_shifts", Type::INT8),
    ("supporter_buddy", Type::VARCHAR),
    ("total_price", Type::FLOAT8),
    ("material_ids", Type::VARCHAR),
    ("profession_ids", Type::VARCHAR),
    ("is_paid", Type::BOOL),
    ("paid_amount", Type::FLOAT8),
    ("payment_notes", Type::VARCHAR),
    ("payment_date", Type::VARCHAR),
    ("created_at", Type::INT8),
];

const ARTIST_BOOKING_COLUMNS: Columns = &[
    ("id", Type::INT8),
    ("artist_id", Type::INT8),
    ("first_name", Type::VARCHAR),
    ("last_name", Type::VARCHAR),
    ("email", Type::VARCHAR),
    ("phone", Type::VARCHAR),
    ("ticket_id", Type::INT8),
    ("beverage_id", Type::INT8),
    ("food_id", Type::INT8),
    ("total_price", Type::FLOAT8),
    ("equipment", Type::VARCHAR),
    ("special_requests", Type::VARCHAR),
    ("performance_details", Type::VARCHAR),
    ("artist_material_ids", Type::VARCHAR),
    ("profession_ids", Type::VARCHAR),
    ("is_paid", Type::BOOL),
    ("paid_amount", Type::FLOAT8),
    ("payment_notes", Type::VARCHAR),
    ("payment_date", Type::VARCHAR),
    ("created_at", Type::INT8),
];

const ASSIGNMENT_COLUMNS: Columns = &[
    ("id", Type::INT8),
    ("booking_id", Type::INT8),
    ("timeslot_id", Type::INT8),
    ("is_confirmed", Type::BOOL),
    ("admin_notes", Type::VARCHAR),
    ("assigned_at", Type::INT8),
    ("first_name", Type::VARCHAR),
    ("last_name", Type::VARCHAR),
    ("email", Type::VARCHAR),
    ("phone", Type::VARCHAR),
    ("workshift_title", Type::VARCHAR),
    ("timeslot_title", Type::VARCHAR),
    ("timeslot_start", Type::VARCHAR),
    ("timeslot_end", Type::VARCHAR),
    ("priority", Type::INT8),
];

const BOOKING_SUMMARY_COLUMNS: Columns = &[
    ("booking_id", Type::INT8),
    ("first_name", Type::VARCHAR),
    ("last_name", Type::VARCHAR),
    ("max_shifts", Type::INT8),
    ("assigned_shifts", Type::INT8),
    ("is_fully_assigned", Type::BOOL),
];

const TIMESLOT_SUMMARY_COLUMNS: Columns = &[
    ("timeslot_id", Type::INT8),
    ("workshift_title", Type::VARCHAR),
    ("timeslot_title", Type::VARCHAR),
    ("start_time", Type::VARCHAR),
    ("end_time", Type::VARCHAR),
    ("capacity", Type::INT8),
    ("assigned_count", Type::INT8),
    ("remaining", Type::INT8),
    ("is_filled", Type::BOOL),
    ("fill_percentage", Type::FLOAT8),
];

const SHIFT_COUNT_COLUMNS: Columns = &[
    ("booking_id", Type::INT8),
    ("assigned", Type::INT8),
    ("max", Type::INT8),
];

const TIMESLOT_COUNT_COLUMNS: Columns = &[
    ("timeslot_id", Type::INT8),
    ("assigned", Type::INT8),
    ("capacity", Type::INT8),
];

const BOOKING_OUTCOME_COLUMNS: Columns = &[("booking_id", Type::INT8), ("status", Type::VARCHAR)];
const ARTIST_OUTCOME_COLUMNS: Columns =
    &[("artist_booking_id", Type::INT8), ("status", Type::VARCHAR)];
const ATTENDEE_BOOKING_COLUMNS: Columns = &[("booking_id", Type::INT8)];

const ASSIGNMENT_OUTCOME_COLUMNS: Columns = &[
    ("assignment_id", Type::INT8),
    ("status", Type::VARCHAR),
    ("message", Type::VARCHAR),
];

const BULK_COLUMNS: Columns = &[
    ("successful_assignments", Type::INT8),
    ("failed_assignments", Type::VARCHAR),
];

const AUTO_ASSIGN_COLUMNS: Columns = &[
    ("strategy", Type::VARCHAR),
    ("assignments_made", Type::INT8),
    ("bookings_satisfied", Type::INT8),
    ("timeslots_filled", Type::INT8),
];

const HEALTH_COLUMNS: Columns = &[
    ("status", Type::VARCHAR),
    ("journal_ok", Type::BOOL),
    ("storage_ok", Type::BOOL),
    ("bookings", Type::INT8),
    ("artist_bookings", Type::INT8),
    ("assignments", Type::INT8),
    ("appends_since_compact", Type::INT8),
    ("checked_at", Type::INT8),
    ("response_time_ms", Type::FLOAT8),
];

const RESEND_COLUMNS: Columns = &[("booking_id", Type::INT8), ("sent_to", Type::VARCHAR)];
const ARTIST_RESEND_COLUMNS: Columns =
    &[("artist_booking_id", Type::INT8), ("sent_to", Type::VARCHAR)];

/// Result columns of a statement, known before it runs. Updates and deletes
/// report a command tag only.
fn columns_for(verb: Verb, table: &str) -> Columns {
    match (verb, table) {
        (Verb::Select, "form_content") => FORM_CONTENT_COLUMNS,
        (Verb::Select, "artist_form_content") => ARTIST_FORM_CONTENT_COLUMNS,
        (Verb::Select, "bookings") => BOOKING_COLUMNS,
        (Verb::Select, "artist_bookings") => ARTIST_BOOKING_COLUMNS,
        (Verb::Select, "shift_assignments") => ASSIGNMENT_COLUMNS,
        (Verb::Select, "booking_summary") => BOOKING_SUMMARY_COLUMNS,
        (Verb::Select, "timeslot_summary") => TIMESLOT_SUMMARY_COLUMNS,
        (Verb::Select, "booking_shift_count") => SHIFT_COUNT_COLUMNS,
        (Verb::Select, "timeslot_assignment_count") => TIMESLOT_COUNT_COLUMNS,
        (Verb::Select, "health") => HEALTH_COLUMNS,
        (Verb::Insert, "bookings") => BOOKING_OUTCOME_COLUMNS,
        (Verb::Insert, "artist_bookings") => ARTIST_OUTCOME_COLUMNS,
        (Verb::Insert, "attendee_bookings") => ATTENDEE_BOOKING_COLUMNS,
        (Verb::Insert, "shift_assignments") => ASSIGNMENT_OUTCOME_COLUMNS,
        (Verb::Insert, "bulk_assignments") => BULK_COLUMNS,
        (Verb::Insert, "auto_assign") => AUTO_ASSIGN_COLUMNS,
        (Verb::Insert, "confirmation_mails") => RESEND_COLUMNS,
        (Verb::Insert, "artist_confirmation_mails") => ARTIST_RESEND_COLUMNS,
        _ => &[],
    }
}

fn columns_for_sql(sql: &str) -> Columns {
    sql::target(sql).map_or(&[], |(verb, table)| columns_for(verb, table))
}

fn schema(columns: Columns, format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

fn encode_value(encoder: &mut DataRowEncoder, ty: &Type, value: Option<&Json>) -> PgWireResult<()> {
    match value {
        None | Some(Json::Null) => encoder.encode_field(&None::<String>),
        Some(v) if *ty == Type::INT8 => encoder.encode_field(&v.as_i64()),
        Some(v) if *ty == Type::FLOAT8 => encoder.encode_field(&v.as_f64()),
        Some(v) if *ty == Type::BOOL => encoder.encode_field(&v.as_bool()),
        Some(Json::String(s)) => encoder.encode_field(s),
        // id lists and nested content travel as JSON text
        Some(other) => encoder.encode_field(&other.to_string()),
    }
}

/// One result row per item, columns picked by name from the item's JSON form.
fn rows_response<T: Serialize>(
    columns: Columns,
    format: &Format,
    items: &[T],
) -> PgWireResult<Response> {
    let fields = Arc::new(schema(columns, format));
    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let json = serde_json::to_value(item).map_err(|e| internal(e.to_string()))?;
        let mut encoder = DataRowEncoder::new(fields.clone());
        for (name, ty) in columns {
            encode_value(&mut encoder, ty, json.get(*name))?;
        }
        rows.push(Ok(encoder.take_row()));
    }
    Ok(Response::Query(QueryResponse::new(fields, stream::iter(rows))))
}

fn row_response<T: Serialize>(columns: Columns, format: &Format, item: &T) -> PgWireResult<Response> {
    rows_response(columns, format, std::slice::from_ref(item))
}

/// Whole document in a single text column.
fn document_response<T: Serialize>(
    columns: Columns,
    format: &Format,
    doc: &T,
) -> PgWireResult<Response> {
    let text = serde_json::to_string(doc).map_err(|e| internal(e.to_string()))?;
    let fields = Arc::new(schema(columns, format));
    let mut encoder = DataRowEncoder::new(fields.clone());
    encoder.encode_field(&text)?;
    let rows = vec![Ok(encoder.take_row())];
    Ok(Response::Query(QueryResponse::new(fields, stream::iter(rows))))
}

fn tag(name: &str) -> Response {
    Response::Execution(Tag::new(name).with_rows(1))
}

#[derive(Serialize)]
struct InsertedRow<'a> {
    booking_id: Option<u64>,
    artist_booking_id: Option<u64>,
    assignment_id: Option<u64>,
    status: &'a str,
    message: String,
}

impl<'a> InsertedRow<'a> {
    fn new(id: Option<u64>, status: &'a str) -> Self {
        InsertedRow {
            booking_id: id,
            artist_booking_id: id,
            assignment_id: id,
            status,
            message: String::new(),
        }
    }
}

#[derive(Serialize)]
struct ResentRow {
    booking_id: u64,
    artist_booking_id: u64,
    sent_to: String,
}

fn assignment_outcome(outcome: CreateAssignment) -> InsertedRow<'static> {
    match outcome {
        CreateAssignment::Created(id) => InsertedRow {
            message: "assignment created".into(),
            ..InsertedRow::new(Some(id), "created")
        },
        CreateAssignment::Duplicate => InsertedRow {
            message: "assignment already exists".into(),
            ..InsertedRow::new(None, "duplicate")
        },
        CreateAssignment::BookingAtQuota { current, max } => InsertedRow {
            message: format!("booking already has maximum shifts assigned ({current}/{max})"),
            ..InsertedRow::new(None, "booking_at_quota")
        },
        CreateAssignment::TimeslotFull { current, capacity } => InsertedRow {
            message: format!("timeslot at capacity ({current}/{capacity})"),
            ..InsertedRow::new(None, "timeslot_full")
        },
    }
}

fn insert_outcome(outcome: InsertOutcome<u64>) -> InsertedRow<'static> {
    match outcome {
        InsertOutcome::Inserted(id) => InsertedRow::new(Some(id), "created"),
        InsertOutcome::Duplicate => InsertedRow::new(None, "duplicate"),
    }
}

// ── Handler ──────────────────────────────────────────────────────

pub struct EventdeskHandler {
    api: Arc<Api>,
    query_parser: Arc<EventdeskQueryParser>,
}

fn identity<C: ClientInfo>(client: &C) -> Identity {
    Identity::new(client.metadata().get("user").cloned().unwrap_or_default())
}

impl EventdeskHandler {
    pub fn new(api: Arc<Api>) -> Self {
        Self {
            api,
            query_parser: Arc::new(EventdeskQueryParser),
        }
    }

    /// Parse, run and record metrics for one statement.
    async fn run(&self, who: &Identity, sql: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(who, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        who: &Identity,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Response> {
        let api = &self.api;
        match cmd {
            Command::SelectFormContent => {
                document_response(FORM_CONTENT_COLUMNS, format, &api.form_content().await)
            }
            Command::SelectArtistFormContent => document_response(
                ARTIST_FORM_CONTENT_COLUMNS,
                format,
                &api.artist_form_content().await,
            ),
            Command::SelectBookings { id: None } => {
                let bookings = api.list_bookings(who).await.map_err(api_err)?;
                rows_response(BOOKING_COLUMNS, format, &bookings)
            }
            Command::SelectBookings { id: Some(id) } => {
                let booking = api.get_booking(who, id).await.map_err(api_err)?;
                row_response(BOOKING_COLUMNS, format, &booking)
            }
            Command::SelectArtistBookings { id: None } => {
                let bookings = api.list_artist_bookings(who).await.map_err(api_err)?;
                rows_response(ARTIST_BOOKING_COLUMNS, format, &bookings)
            }
            Command::SelectArtistBookings { id: Some(id) } => {
                let booking = api.get_artist_booking(who, id).await.map_err(api_err)?;
                row_response(ARTIST_BOOKING_COLUMNS, format, &booking)
            }
            Command::SelectAssignments { filter } => {
                let rows = api.list_assignments(who, filter).await.map_err(api_err)?;
                rows_response(ASSIGNMENT_COLUMNS, format, &rows)
            }
            Command::SelectBookingSummary => {
                let rows = api.booking_summary(who).await.map_err(api_err)?;
                rows_response(BOOKING_SUMMARY_COLUMNS, format, &rows)
            }
            Command::SelectTimeslotSummary => {
                let rows = api.timeslot_summary(who).await.map_err(api_err)?;
                rows_response(TIMESLOT_SUMMARY_COLUMNS, format, &rows)
            }
            Command::SelectShiftCount { booking_id } => {
                let count = api.booking_shift_count(who, booking_id).await.map_err(api_err)?;
                row_response(SHIFT_COUNT_COLUMNS, format, &count)
            }
            Command::SelectTimeslotCount { timeslot_id } => {
                let count = api
                    .timeslot_assignment_count(who, timeslot_id)
                    .await
                    .map_err(api_err)?;
                row_response(TIMESLOT_COUNT_COLUMNS, format, &count)
            }
            Command::InsertBooking(new) => {
                let outcome = api.submit_booking(new).await.map_err(api_err)?;
                row_response(BOOKING_OUTCOME_COLUMNS, format, &insert_outcome(outcome))
            }
            Command::InsertAttendeeBooking {
                attendee_id,
                booking,
            } => {
                let id = api
                    .add_booking_for_attendee(who, attendee_id, booking)
                    .await
                    .map_err(api_err)?;
                row_response(
                    ATTENDEE_BOOKING_COLUMNS,
                    format,
                    &InsertedRow::new(Some(id), "created"),
                )
            }
            Command::UpdateBooking { id, update } => {
                api.update_booking(who, id, update).await.map_err(api_err)?;
                Ok(tag("UPDATE"))
            }
            Command::UpdatePayment { id, payment } => {
                api.update_payment(who, id, payment).await.map_err(api_err)?;
                Ok(tag("UPDATE"))
            }
            Command::DeleteBooking { id } => {
                api.delete_booking(who, id).await.map_err(api_err)?;
                Ok(tag("DELETE"))
            }
            Command::InsertArtistBooking(new) => {
                let outcome = api.submit_artist_booking(new).await.map_err(api_err)?;
                row_response(ARTIST_OUTCOME_COLUMNS, format, &insert_outcome(outcome))
            }
            Command::UpdateArtistBooking { id, update } => {
                api.update_artist_booking(who, id, update)
                    .await
                    .map_err(api_err)?;
                Ok(tag("UPDATE"))
            }
            Command::UpdateArtistPayment { id, payment } => {
                api.update_artist_payment(who, id, payment)
                    .await
                    .map_err(api_err)?;
                Ok(tag("UPDATE"))
            }
            Command::DeleteArtistBooking { id } => {
                api.delete_artist_booking(who, id).await.map_err(api_err)?;
                Ok(tag("DELETE"))
            }
            Command::InsertAssignment {
                booking_id,
                timeslot_id,
                is_confirmed,
                admin_notes,
            } => {
                let outcome = api
                    .create_assignment(who, booking_id, timeslot_id, is_confirmed, admin_notes)
                    .await
                    .map_err(api_err)?;
                row_response(ASSIGNMENT_OUTCOME_COLUMNS, format, &assignment_outcome(outcome))
            }
            Command::UpdateAssignment {
                id,
                is_confirmed,
                admin_notes,
            } => {
                api.update_assignment(who, id, is_confirmed, admin_notes)
                    .await
                    .map_err(api_err)?;
                Ok(tag("UPDATE"))
            }
            Command::DeleteAssignment { id } => {
                api.delete_assignment(who, id).await.map_err(api_err)?;
                Ok(tag("DELETE"))
            }
            Command::BulkAssign {
                booking_ids,
                timeslot_ids,
            } => {
                let result = api
                    .bulk_assign(who, &booking_ids, &timeslot_ids)
                    .await
                    .map_err(api_err)?;
                row_response(BULK_COLUMNS, format, &result)
            }
            Command::AutoAssign { strategy } => {
                let stats = api.auto_assign(who, &strategy).await.map_err(api_err)?;
                row_response(AUTO_ASSIGN_COLUMNS, format, &stats)
            }
            Command::ResendConfirmation { booking_id } => {
                let sent_to = api
                    .resend_confirmation(who, booking_id)
                    .await
                    .map_err(api_err)?;
                let row = ResentRow {
                    booking_id,
                    artist_booking_id: booking_id,
                    sent_to,
                };
                row_response(RESEND_COLUMNS, format, &row)
            }
            Command::ResendArtistConfirmation { artist_booking_id } => {
                let sent_to = api
                    .resend_artist_confirmation(who, artist_booking_id)
                    .await
                    .map_err(api_err)?;
                let row = ResentRow {
                    booking_id: artist_booking_id,
                    artist_booking_id,
                    sent_to,
                };
                row_response(ARTIST_RESEND_COLUMNS, format, &row)
            }
            Command::SelectHealth => row_response(HEALTH_COLUMNS, format, &api.health().await),
        }
    }
}

#[async_trait]
impl SimpleQueryHandler for EventdeskHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let who = identity(client);
        let response = self.run(&who, query, &Format::UnifiedText).await?;
        Ok(vec![response])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct EventdeskQueryParser;

#[async_trait]
impl QueryParser for EventdeskQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        let format = column_format.unwrap_or(&Format::UnifiedText);
        Ok(schema(columns_for_sql(stmt), format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for EventdeskHandler {
    type Statement = String;
    type QueryParser = EventdeskQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let who = identity(client);
        let sql = substitute_params(portal);
        self.run(&who, &sql, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        let fields = schema(columns_for_sql(&target.statement), &Format::UnifiedText);
        Ok(DescribeStatementResponse::new(param_types, fields))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let columns = columns_for_sql(&target.statement.statement);
        Ok(DescribePortalResponse::new(schema(
            columns,
            &target.result_column_format,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Inline bound parameters (text format) as quoted literals. Highest index
/// first so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.clone();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        sql = sql.replace(&placeholder, &value);
    }
    sql
}

// ── Factory ──────────────────────────────────────────────────────

pub struct EventdeskFactory {
    handler: Arc<EventdeskHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<EventdeskAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl EventdeskFactory {
    pub fn new(api: Arc<Api>, admin_password: String, public_password: String) -> Self {
        let auth_source = EventdeskAuthSource::new(admin_password, public_password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(EventdeskHandler::new(api)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for EventdeskFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<EventdeskFactory>,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn internal(detail: String) -> PgWireError {
    tracing::error!(detail = %detail, "result encoding failed");
    user_error("XX000", ApiError::Internal.to_string())
}

/// SQLSTATE for each request failure class.
fn sqlstate(e: &ApiError) -> &'static str {
    match e {
        ApiError::Validation(_) => "22023",
        ApiError::Forbidden => "42501",
        ApiError::NotFound(_) => "P0002",
        ApiError::Internal => "XX000",
    }
}

fn api_err(e: ApiError) -> PgWireError {
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_counted_by_highest_index() {
        assert_eq!(count_params("SELECT * FROM bookings"), 0);
        assert_eq!(count_params("UPDATE bookings SET is_paid = $2 WHERE id = $1"), 2);
        assert_eq!(count_params("SELECT $10, $3"), 10);
        assert_eq!(count_params("SELECT '$'"), 0);
    }

    #[test]
    fn schema_follows_statement_target() {
        let names = |sql: &str| -> Vec<&'static str> {
            columns_for_sql(sql).iter().map(|(n, _)| *n).collect()
        };
        assert_eq!(names("SELECT * FROM form_content"), vec!["form_content"]);
        assert_eq!(
            names("INSERT INTO shift_assignments (booking_id, timeslot_id) VALUES ($1, $2)"),
            vec!["assignment_id", "status", "message"]
        );
        assert_eq!(names("SELECT * FROM timeslot_summary")[9], "fill_percentage");
        assert_eq!(names("SELECT * FROM health")[0], "status");
        assert_eq!(
            names("INSERT INTO confirmation_mails (booking_id) VALUES ($1)"),
            vec!["booking_id", "sent_to"]
        );
        assert!(names("DELETE FROM bookings WHERE id = $1").is_empty());
        assert!(names("SELECT * FROM unknown").is_empty());
    }

    #[test]
    fn error_classes_have_distinct_sqlstates() {
        assert_eq!(sqlstate(&ApiError::Validation("x".into())), "22023");
        assert_eq!(sqlstate(&ApiError::Forbidden), "42501");
        assert_eq!(sqlstate(&ApiError::NotFound("x".into())), "P0002");
        assert_eq!(sqlstate(&ApiError::Internal), "XX000");
    }

    #[test]
    fn assignment_outcomes_carry_status() {
        let row = assignment_outcome(CreateAssignment::BookingAtQuota { current: 2, max: 2 });
        assert_eq!(row.status, "booking_at_quota");
        assert_eq!(row.assignment_id, None);
        assert!(row.message.contains("maximum shifts"));
        let row = assignment_outcome(CreateAssignment::Created(4));
        assert_eq!(row.assignment_id, Some(4));
        assert_eq!(row.status, "created");
    }
}
