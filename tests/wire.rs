use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use rentcal::auth::StaffAuthSource;
use rentcal::team::TeamRegistry;
use rentcal::wire::{self, RentcalFactory};

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("rentcal_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let teams = Arc::new(TeamRegistry::new(dir, 1000));
    let auth = StaffAuthSource::new("rentcal".into()).with_staff_list("alice:wonderland");
    let factory = Arc::new(RentcalFactory::new(teams, auth));

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

async fn try_connect(
    addr: SocketAddr,
    team: &str,
    user: &str,
    password: &str,
) -> Result<Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(team)
        .user(user)
        .password(password);

    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn connect(addr: SocketAddr, team: &str) -> Client {
    try_connect(addr, team, "desk", "rentcal").await.unwrap()
}

async fn data_rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn sqlstate(err: &tokio_postgres::Error) -> Option<&str> {
    err.code().map(|c| c.code())
}

async fn insert_car(client: &Client, name: &str) -> Ulid {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO cars (id, name, number_plate, mileage) VALUES ('{id}', '{name}', 'RC-{name}', 1200)"
        ))
        .await
        .unwrap();
    id
}

async fn book(client: &Client, car: Ulid, from: &str, to: &str) -> Result<Ulid, tokio_postgres::Error> {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO reservations (id, car_id, start_date, end_date, customer_name, customer_phone, customer_email) \
             VALUES ('{id}', '{car}', '{from}', '{to}', 'Ada', '0612345678', 'ada@example.com')"
        ))
        .await?;
    Ok(id)
}

// ── Cars ─────────────────────────────────────────────────────

#[tokio::test]
async fn cars_insert_update_select() {
    let addr = start_test_server().await;
    let client = connect(addr, "fleet").await;

    let polo = insert_car(&client, "Polo").await;
    insert_car(&client, "Astra").await;
    client
        .batch_execute(&format!("UPDATE cars SET status = 'repair', mileage = 1500 WHERE id = '{polo}'"))
        .await
        .unwrap();

    let cars = data_rows(&client, "SELECT * FROM cars").await;
    assert_eq!(cars.len(), 2);
    assert_eq!(cars[0].get("name"), Some("Astra"));
    assert_eq!(cars[1].get("id"), Some(polo.to_string().as_str()));
    assert_eq!(cars[1].get("status"), Some("repair"));
    assert_eq!(cars[1].get("mileage"), Some("1500"));
    assert_eq!(cars[1].get("number_plate"), Some("RC-Polo"));

    let summary = data_rows(&client, "SELECT * FROM car_summary").await;
    assert_eq!(summary[0].get("total"), Some("2"));
    assert_eq!(summary[0].get("available"), Some("1"));
}

#[tokio::test]
async fn deleting_car_with_reservations_fails() {
    let addr = start_test_server().await;
    let client = connect(addr, "fleet").await;

    let car = insert_car(&client, "Fiesta").await;
    let res = book(&client, car, "2024-05-01", "2024-05-03").await.unwrap();

    let err = client
        .batch_execute(&format!("DELETE FROM cars WHERE id = '{car}'"))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("P0001"));

    client
        .batch_execute(&format!("DELETE FROM reservations WHERE id = '{res}'"))
        .await
        .unwrap();
    client
        .batch_execute(&format!("DELETE FROM cars WHERE id = '{car}'"))
        .await
        .unwrap();
    assert!(data_rows(&client, "SELECT * FROM cars").await.is_empty());
}

// ── Reservations ─────────────────────────────────────────────

#[tokio::test]
async fn overlapping_reservation_rejected() {
    let addr = start_test_server().await;
    let client = connect(addr, "bookings").await;
    let car = insert_car(&client, "Golf").await;

    book(&client, car, "2024-03-10", "2024-03-12").await.unwrap();
    let err = book(&client, car, "2024-03-12", "2024-03-14").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("23P01"));

    book(&client, car, "2024-03-13", "2024-03-14").await.unwrap();

    let rows = data_rows(
        &client,
        &format!(
            "SELECT * FROM reservations WHERE car_id = '{car}' AND start_date >= '2024-03-01' AND end_date <= '2024-03-31'"
        ),
    )
    .await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("start_date"), Some("2024-03-10"));
    assert_eq!(rows[1].get("end_date"), Some("2024-03-14"));
    assert_eq!(rows[0].get("booked_by"), Some("desk"));
}

#[tokio::test]
async fn invalid_reservations_rejected() {
    let addr = start_test_server().await;
    let client = connect(addr, "bookings").await;
    let car = insert_car(&client, "Clio").await;

    let err = book(&client, car, "2024-03-12", "2024-03-10").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("42601"));

    let err = book(&client, Ulid::new(), "2024-03-10", "2024-03-12").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("P0002"));

    let err = client
        .batch_execute(&format!("DELETE FROM reservations WHERE id = '{}'", Ulid::new()))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("P0002"));
}

#[tokio::test]
async fn staff_user_recorded_as_booker() {
    let addr = start_test_server().await;
    let client = try_connect(addr, "desk", "alice", "wonderland").await.unwrap();
    let car = insert_car(&client, "Ibiza").await;
    book(&client, car, "2024-06-01", "2024-06-02").await.unwrap();

    let rows = data_rows(
        &client,
        "SELECT * FROM reservations WHERE start_date >= '2024-06-01' AND end_date <= '2024-06-30'",
    )
    .await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("booked_by"), Some("alice"));

    assert!(try_connect(addr, "desk", "alice", "rentcal").await.is_err());
}

// ── Calendar views ───────────────────────────────────────────

#[tokio::test]
async fn month_grid_and_timeline() {
    let addr = start_test_server().await;
    let client = connect(addr, "calendar").await;
    let car = insert_car(&client, "Yaris").await;
    book(&client, car, "2023-01-30", "2023-02-02").await.unwrap();

    let cells = data_rows(&client, "SELECT * FROM month_grid WHERE month = '2023-02'").await;
    // February 2023 starts on a Wednesday: three padding cells, then 28 days.
    assert_eq!(cells.len(), 31);
    assert_eq!(cells[0].get("date"), None);
    assert_eq!(cells[3].get("date"), Some("2023-02-01"));
    assert_eq!(cells[3].get("reservation_count"), Some("1"));
    assert_eq!(cells[4].get("reservation_count"), Some("1"));
    assert_eq!(cells[5].get("reservation_count"), Some("0"));
    assert_eq!(cells[3].get("overflow"), Some("0"));
    let visible: serde_json::Value = serde_json::from_str(cells[3].get("visible").unwrap()).unwrap();
    assert_eq!(visible[0]["customer_name"], "Ada");

    let bars = data_rows(
        &client,
        "SELECT * FROM timeline WHERE month = '2023-02' AND today = '2023-02-10'",
    )
    .await;
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].get("car_name"), Some("Yaris"));
    assert_eq!(bars[0].get("start_offset"), Some("0"));
    assert_eq!(bars[0].get("duration"), Some("2"));
    assert_eq!(bars[0].get("days_in_month"), Some("28"));
    assert_eq!(bars[0].get("today_marker"), Some("9"));
}

#[tokio::test]
async fn disabled_days_and_daily_counts() {
    let addr = start_test_server().await;
    let client = connect(addr, "calendar").await;
    let a = insert_car(&client, "Up").await;
    let b = insert_car(&client, "Mii").await;
    book(&client, a, "2024-03-01", "2024-03-03").await.unwrap();
    book(&client, b, "2024-03-03", "2024-03-04").await.unwrap();

    let days = data_rows(&client, &format!("SELECT * FROM disabled_days WHERE car_id = '{a}'")).await;
    let days: Vec<_> = days.iter().filter_map(|r| r.get("day")).collect();
    assert_eq!(days, vec!["2024-03-01", "2024-03-02", "2024-03-03"]);

    let counts = data_rows(
        &client,
        "SELECT * FROM daily_reservations WHERE start_date >= '2024-03-01' AND end_date <= '2024-03-05'",
    )
    .await;
    let counts: Vec<_> = counts.iter().filter_map(|r| r.get("count")).collect();
    assert_eq!(counts, vec!["1", "1", "2", "1", "0"]);
}

// ── Extended query protocol ──────────────────────────────────

#[tokio::test]
async fn bound_parameters_keep_dollar_text() {
    let addr = start_test_server().await;
    let client = connect(addr, "extended").await;
    let car = insert_car(&client, "Corsa").await;

    let id = Ulid::new().to_string();
    let car_id = car.to_string();
    let inserted = client
        .execute(
            "INSERT INTO reservations (id, car_id, start_date, end_date, customer_name, customer_phone, customer_email) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &id,
                &car_id,
                &"2024-05-01",
                &"2024-05-03",
                &"Room $2 guest",
                &"0612345678",
                &"guest@example.com",
            ],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let rows = client
        .query("SELECT * FROM reservations WHERE car_id = $1", &[&car_id])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<_, String>("id"), id);
    assert_eq!(rows[0].get::<_, String>("car_id"), car_id);
    assert_eq!(rows[0].get::<_, String>("customer_name"), "Room $2 guest");
    assert_eq!(rows[0].get::<_, String>("start_date"), "2024-05-01");
}

#[tokio::test]
async fn bound_queries_decode_integer_columns() {
    let addr = start_test_server().await;
    let client = connect(addr, "extended_ints").await;
    let clio = insert_car(&client, "Clio").await;

    let cars = client.query("SELECT * FROM cars", &[]).await.unwrap();
    assert_eq!(cars.len(), 1);
    assert_eq!(cars[0].get::<_, String>("name"), "Clio");
    assert_eq!(cars[0].get::<_, Option<i64>>("mileage"), Some(1200));

    let updated = client
        .execute("UPDATE cars SET status = $1 WHERE id = $2", &[&"repair", &clio.to_string()])
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let summary = client.query("SELECT * FROM car_summary", &[]).await.unwrap();
    assert_eq!(summary[0].get::<_, i64>("total"), 1);
    assert_eq!(summary[0].get::<_, i64>("available"), 0);
}

// ── Teams and protocol errors ────────────────────────────────

#[tokio::test]
async fn teams_are_isolated_by_database() {
    let addr = start_test_server().await;
    let north = connect(addr, "north").await;
    let south = connect(addr, "south").await;

    insert_car(&north, "Panda").await;
    assert_eq!(data_rows(&north, "SELECT * FROM cars").await.len(), 1);
    assert!(data_rows(&south, "SELECT * FROM cars").await.is_empty());
}

#[tokio::test]
async fn syntax_errors_reported() {
    let addr = start_test_server().await;
    let client = connect(addr, "errors").await;

    let err = client.batch_execute("SELEKT * FROM cars").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("42601"));

    let err = client
        .batch_execute("SELECT * FROM reservations WHERE start_date >= '2024-01-01'")
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("42601"));

    let err = client
        .batch_execute("SELECT * FROM reservations WHERE customer_name = 'Ada'")
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("42601"));
}
