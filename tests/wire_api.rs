use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use eventdesk::api::Api;
use eventdesk::catalog::Catalog;
use eventdesk::engine::Engine;
use eventdesk::mail::LogMailer;
use eventdesk::wire::{self, EventdeskFactory};

const ADMIN_PASSWORD: &str = "admin-pw";
const PUBLIC_PASSWORD: &str = "public-pw";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(name: &str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir()
        .join("eventdesk_int_test")
        .join(format!("{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let form_content = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/form_content.json");
    let catalog = Arc::new(Catalog::load(&form_content).unwrap());
    let engine = Arc::new(Engine::new(&dir, catalog).unwrap());
    let api = Arc::new(Api::new(engine, Arc::new(LogMailer)));
    let factory = Arc::new(EventdeskFactory::new(
        api,
        ADMIN_PASSWORD.to_string(),
        PUBLIC_PASSWORD.to_string(),
    ));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let factory = factory.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, factory, None).await;
            });
        }
    });

    addr
}

async fn try_connect(addr: SocketAddr, user: &str, password: &str) -> Result<Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("eventdesk")
        .user(user)
        .password(password);

    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn admin(addr: SocketAddr) -> Client {
    try_connect(addr, "admin", ADMIN_PASSWORD).await.unwrap()
}

async fn public(addr: SocketAddr) -> Client {
    try_connect(addr, "frontend", PUBLIC_PASSWORD).await.unwrap()
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &Client, sql: &str) -> String {
    let err = client.simple_query(sql).await.unwrap_err();
    err.code().map(|c| c.code().to_string()).unwrap_or_default()
}

fn booking_sql(first: &str, amount_shifts: u8, prefs: [&str; 3]) -> String {
    format!(
        "INSERT INTO bookings (first_name, last_name, email, phone, ticket_id, beverage_id, \
         food_id, timeslot_priority_1, timeslot_priority_2, timeslot_priority_3, amount_shifts, \
         total_price, material_ids, signature) \
         VALUES ('{first}', 'Tester', '{email}@example.org', '', 0, 0, NULL, {}, {}, {}, \
         {amount_shifts}, 120, '[0]', 'aGVsbG8=')",
        prefs[0],
        prefs[1],
        prefs[2],
        email = first.to_lowercase(),
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_password_is_rejected() {
    let addr = start_test_server("wrong_password").await;
    assert!(try_connect(addr, "admin", PUBLIC_PASSWORD).await.is_err());
    assert!(try_connect(addr, "frontend", "nope").await.is_err());
}

#[tokio::test]
async fn public_role_registers_but_cannot_read_bookings() {
    let addr = start_test_server("public_role").await;
    let client = public(addr).await;

    let form = rows(&client, "SELECT * FROM form_content").await;
    assert_eq!(form.len(), 1);
    let doc: serde_json::Value = serde_json::from_str(form[0].get("form_content").unwrap()).unwrap();
    assert_eq!(doc["ticket_options"][0]["title"], "Full festival");
    assert_eq!(doc["ticket_options"][0]["num_booked"], 0);

    let created = rows(&client, &booking_sql("Ada", 2, ["0", "1", "NULL"])).await;
    assert_eq!(created[0].get("status"), Some("created"));
    assert_eq!(created[0].get("booking_id"), Some("1"));

    let again = rows(&client, &booking_sql("Ada", 2, ["0", "1", "NULL"])).await;
    assert_eq!(again[0].get("status"), Some("duplicate"));
    assert_eq!(again[0].get("booking_id"), None);

    assert_eq!(sqlstate(&client, "SELECT * FROM bookings").await, "42501");
    assert_eq!(
        sqlstate(&client, "INSERT INTO auto_assign (strategy) VALUES ('fill')").await,
        "42501"
    );

    let form = rows(&client, "SELECT * FROM form_content").await;
    let doc: serde_json::Value = serde_json::from_str(form[0].get("form_content").unwrap()).unwrap();
    assert_eq!(doc["ticket_options"][0]["num_booked"], 1);
}

#[tokio::test]
async fn admin_manages_assignments() {
    let addr = start_test_server("admin_assignments").await;
    let web = public(addr).await;
    rows(&web, &booking_sql("Bea", 1, ["2", "NULL", "NULL"])).await;

    let client = admin(addr).await;
    let created = rows(
        &client,
        "INSERT INTO shift_assignments (booking_id, timeslot_id, admin_notes) VALUES (1, 2, 'bar lead')",
    )
    .await;
    assert_eq!(created[0].get("status"), Some("created"));
    let assignment_id = created[0].get("assignment_id").unwrap().to_string();

    let over = rows(
        &client,
        "INSERT INTO shift_assignments (booking_id, timeslot_id) VALUES (1, 3)",
    )
    .await;
    assert_eq!(over[0].get("status"), Some("booking_at_quota"));
    assert_eq!(over[0].get("assignment_id"), None);

    let count = rows(&client, "SELECT * FROM booking_shift_count WHERE booking_id = 1").await;
    assert_eq!(count[0].get("assigned"), Some("1"));
    assert_eq!(count[0].get("max"), Some("1"));

    let detail = rows(&client, "SELECT * FROM shift_assignments WHERE timeslot_id = 2").await;
    assert_eq!(detail.len(), 1);
    assert_eq!(detail[0].get("first_name"), Some("Bea"));
    assert_eq!(detail[0].get("priority"), Some("1"));
    assert_eq!(detail[0].get("is_confirmed"), Some("f"));

    client
        .simple_query(&format!(
            "UPDATE shift_assignments SET is_confirmed = true WHERE id = {assignment_id}"
        ))
        .await
        .unwrap();
    let detail = rows(&client, "SELECT * FROM shift_assignments WHERE booking_id = 1").await;
    assert_eq!(detail[0].get("is_confirmed"), Some("t"));

    client
        .simple_query(&format!("DELETE FROM shift_assignments WHERE id = {assignment_id}"))
        .await
        .unwrap();
    assert_eq!(
        sqlstate(&client, &format!("DELETE FROM shift_assignments WHERE id = {assignment_id}")).await,
        "P0002"
    );
}

#[tokio::test]
async fn admin_runs_auto_assign_and_reads_summaries() {
    let addr = start_test_server("auto_assign").await;
    let web = public(addr).await;
    rows(&web, &booking_sql("Cy", 2, ["6", "0", "NULL"])).await;
    rows(&web, &booking_sql("Di", 1, ["6", "NULL", "NULL"])).await;
    rows(&web, &booking_sql("Ed", 1, ["6", "NULL", "NULL"])).await;

    let client = admin(addr).await;
    assert_eq!(
        sqlstate(&client, "INSERT INTO auto_assign (strategy) VALUES ('random')").await,
        "22023"
    );

    let stats = rows(&client, "INSERT INTO auto_assign (strategy) VALUES ('priority')").await;
    assert_eq!(stats[0].get("strategy"), Some("priority"));
    assert_eq!(stats[0].get("assignments_made"), Some("3"));

    // Awareness/Saturday night (id 6) holds two people.
    let slots = rows(&client, "SELECT * FROM timeslot_summary").await;
    let awareness = slots
        .iter()
        .find(|r| r.get("timeslot_id") == Some("6"))
        .unwrap();
    assert_eq!(awareness.get("assigned_count"), Some("2"));
    assert_eq!(awareness.get("is_filled"), Some("t"));

    let summary = rows(&client, "SELECT * FROM booking_summary").await;
    assert_eq!(summary.len(), 3);
    let assigned: u32 = summary
        .iter()
        .map(|r| r.get("assigned_shifts").unwrap().parse::<u32>().unwrap())
        .sum();
    assert_eq!(assigned, 3);
}

#[tokio::test]
async fn health_and_confirmation_resend() {
    let addr = start_test_server("health_resend").await;
    let web = public(addr).await;
    rows(&web, &booking_sql("Gus", 1, ["1", "NULL", "NULL"])).await;

    let health = rows(&web, "SELECT * FROM health").await;
    assert_eq!(health[0].get("status"), Some("healthy"));
    assert_eq!(health[0].get("journal_ok"), Some("t"));
    assert_eq!(health[0].get("bookings"), Some("1"));

    assert_eq!(
        sqlstate(&web, "INSERT INTO confirmation_mails (booking_id) VALUES (1)").await,
        "42501"
    );
    let client = admin(addr).await;
    let resent = rows(&client, "INSERT INTO confirmation_mails (booking_id) VALUES (1)").await;
    assert_eq!(resent[0].get("booking_id"), Some("1"));
    assert_eq!(resent[0].get("sent_to"), Some("gus@example.org"));
    assert_eq!(
        sqlstate(&client, "INSERT INTO artist_confirmation_mails (artist_booking_id) VALUES (7)").await,
        "P0002"
    );
}

#[tokio::test]
async fn extended_protocol_binds_parameters() {
    let addr = start_test_server("extended").await;
    let web = public(addr).await;
    rows(&web, &booking_sql("Flo", 1, ["0", "NULL", "NULL"])).await;

    let client = admin(addr).await;
    let found = client
        .query("SELECT * FROM bookings WHERE id = $1", &[&"1"])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get::<_, i64>("id"), 1);
    assert_eq!(found[0].get::<_, String>("first_name"), "Flo");
    assert_eq!(found[0].get::<_, Option<i64>>("food_id"), None);
    assert!(!found[0].get::<_, bool>("is_paid"));

    client
        .execute(
            "UPDATE bookings SET is_paid = $1, paid_amount = $2 WHERE id = $3",
            &[&"true", &"120", &"1"],
        )
        .await
        .unwrap();
    let found = client
        .query("SELECT * FROM bookings WHERE id = $1", &[&"1"])
        .await
        .unwrap();
    assert!(found[0].get::<_, bool>("is_paid"));
    assert_eq!(found[0].get::<_, f64>("paid_amount"), 120.0);
}
