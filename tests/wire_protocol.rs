use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use hotdesk::tenant::TenantManager;
use hotdesk::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("hotdesk_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000, Duration::from_secs(3600)));

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "hotdesk".to_string(), None).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr, db: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(db)
        .user("hotdesk")
        .password("hotdesk");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
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

async fn error_code(client: &Client, sql: &str) -> SqlState {
    let err = client.simple_query(sql).await.err().expect("query should fail");
    err.code().cloned().expect("database error with SQLSTATE")
}

struct Seed {
    workspace: Ulid,
    user: Ulid,
}

/// A meeting room at 10.00/hour and one member.
async fn seed(client: &Client) -> Seed {
    let workspace = Ulid::new();
    let user = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO workspaces (id, name, workspace_type, capacity, hourly_rate, amenity_tier) \
             VALUES ('{workspace}', 'Board room', 'meeting_room', 8, '10.00', 'standard')"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO users (id, email, role) VALUES ('{user}', 'ada@example.com', 'member')"
        ))
        .await
        .unwrap();
    Seed { workspace, user }
}

fn booking_sql(seed: &Seed, id: Ulid, start: &str, end: &str) -> String {
    format!(
        "INSERT INTO bookings (id, workspace_id, user_id, date, start_time, end_time) \
         VALUES ('{id}', '{}', '{}', '2099-03-02', '{start}', '{end}')",
        seed.workspace, seed.user
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle_over_simple_protocol() {
    let addr = start_test_server().await;
    let client = connect(addr, "downtown").await;
    let seed = seed(&client).await;

    let a = Ulid::new();
    client.batch_execute(&booking_sql(&seed, a, "09:00", "11:00")).await.unwrap();

    let booked = rows(&client, &format!("SELECT * FROM bookings WHERE id = '{a}'")).await;
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].get("status"), Some("pending"));
    assert_eq!(booked[0].get("calculated_price"), Some("20.00"));
    assert_eq!(booked[0].get("start_time"), Some("09:00"));

    let confirmed = rows(&client, &format!("SELECT confirm_booking('{a}')")).await;
    assert_eq!(confirmed[0].get("status"), Some("confirmed"));

    // Overlap is rejected, the adjacent hour is not.
    let code = error_code(&client, &booking_sql(&seed, Ulid::new(), "09:30", "10:30")).await;
    assert_eq!(code, SqlState::EXCLUSION_VIOLATION);
    let b = Ulid::new();
    client.batch_execute(&booking_sql(&seed, b, "11:00", "12:00")).await.unwrap();

    let cancelled = rows(&client, &format!("SELECT cancel_booking('{b}')")).await;
    assert_eq!(cancelled[0].get("status"), Some("cancelled"));
    let code = error_code(&client, &format!("SELECT confirm_booking('{b}')")).await;
    assert_eq!(code, SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE);

    let on_day = rows(
        &client,
        &format!(
            "SELECT * FROM bookings WHERE workspace_id = '{}' AND date = '2099-03-02' AND status = 'confirmed'",
            seed.workspace
        ),
    )
    .await;
    assert_eq!(on_day.len(), 1);
    assert_eq!(on_day[0].get("id"), Some(a.to_string().as_str()));
}

#[tokio::test]
async fn inverted_slot_is_invalid() {
    let addr = start_test_server().await;
    let client = connect(addr, "downtown").await;
    let seed = seed(&client).await;

    let code = error_code(&client, &booking_sql(&seed, Ulid::new(), "11:00", "09:00")).await;
    assert_eq!(code, SqlState::INVALID_PARAMETER_VALUE);
}

#[tokio::test]
async fn availability_and_conflict_probe() {
    let addr = start_test_server().await;
    let client = connect(addr, "downtown").await;
    let seed = seed(&client).await;
    client
        .batch_execute(&booking_sql(&seed, Ulid::new(), "09:00", "10:00"))
        .await
        .unwrap();

    let free = rows(
        &client,
        &format!(
            "SELECT * FROM availability WHERE workspace_id = '{}' AND date = '2099-03-02'",
            seed.workspace
        ),
    )
    .await;
    let spans: Vec<_> = free
        .iter()
        .map(|r| (r.get("start_time").unwrap(), r.get("end_time").unwrap()))
        .collect();
    assert_eq!(spans, vec![("00:00", "09:00"), ("10:00", "24:00")]);

    let probe = rows(
        &client,
        &format!(
            "SELECT booking_conflicts('{}', '2099-03-02', '09:30', '10:30')",
            seed.workspace
        ),
    )
    .await;
    assert_eq!(probe[0].get("conflict"), Some("t"));
}

#[tokio::test]
async fn cantina_credits_over_extended_protocol() {
    let addr = start_test_server().await;
    let client = connect(addr, "canteen").await;
    let seed = seed(&client).await;

    let sub = Ulid::new().to_string();
    client
        .execute(
            "INSERT INTO cantina_subscriptions (id, user_id, plan_type) VALUES ($1, $2, $3)",
            &[&sub, &seed.user.to_string(), &"five"],
        )
        .await
        .unwrap();

    for expected in (0..5i64).rev() {
        let row = client
            .query_one("SELECT use_meal_credit($1)", &[&sub])
            .await
            .unwrap();
        let remaining: i64 = row.get("meals_remaining");
        assert_eq!(remaining, expected);
    }

    let err = client
        .query_one("SELECT use_meal_credit($1)", &[&sub])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::INSUFFICIENT_RESOURCES));

    let row = client
        .query_one(
            "SELECT * FROM cantina_subscriptions WHERE user_id = $1",
            &[&seed.user.to_string()],
        )
        .await
        .unwrap();
    let status: String = row.get("status");
    assert_eq!(status, "exhausted");

    // Not due until next month.
    let err = client
        .query_one("SELECT renew_cantina_subscription($1)", &[&sub])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE));
}

#[tokio::test]
async fn bookings_query_over_extended_protocol() {
    let addr = start_test_server().await;
    let client = connect(addr, "downtown").await;
    let seed = seed(&client).await;
    let id = Ulid::new();
    client.batch_execute(&booking_sql(&seed, id, "14:00", "15:30")).await.unwrap();

    let rows = client
        .query(
            "SELECT * FROM bookings WHERE user_id = $1",
            &[&seed.user.to_string()],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let price: String = rows[0].get("calculated_price");
    assert_eq!(price, "15.00");
    let booked: String = rows[0].get("id");
    assert_eq!(booked, id.to_string());
}

#[tokio::test]
async fn membership_expiry_listing() {
    let addr = start_test_server().await;
    let client = connect(addr, "downtown").await;
    let seed = seed(&client).await;

    let m = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO memberships (id, user_id, membership_type, amenity_tier, starts_at, ends_at) \
             VALUES ('{m}', '{}', 'monthly', 'premium', '2020-01-01', '2099-12-31')",
            seed.user
        ))
        .await
        .unwrap();

    let active = rows(
        &client,
        &format!("SELECT * FROM memberships WHERE user_id = '{}' AND status = 'active'", seed.user),
    )
    .await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].get("membership_type"), Some("monthly"));

    let expiring = rows(&client, "SELECT * FROM memberships WHERE expiring_within_days = 7").await;
    assert!(expiring.is_empty());

    let users = rows(&client, &format!("SELECT * FROM users WHERE id = '{}'", seed.user)).await;
    assert_eq!(users[0].get("active_membership"), Some("t"));
    assert_eq!(users[0].get("has_meal_credits"), Some("f"));
}

#[tokio::test]
async fn locations_are_isolated() {
    let addr = start_test_server().await;
    let downtown = connect(addr, "downtown").await;
    let harbour = connect(addr, "harbour").await;
    seed(&downtown).await;

    assert_eq!(rows(&downtown, "SELECT * FROM workspaces").await.len(), 1);
    assert!(rows(&harbour, "SELECT * FROM workspaces").await.is_empty());
}

#[tokio::test]
async fn price_list_and_syntax_errors() {
    let addr = start_test_server().await;
    let client = connect(addr, "downtown").await;

    let prices = rows(&client, "SELECT * FROM prices").await;
    assert!(prices.iter().any(|r| r.get("product") == Some("cantina_ten")));
    assert!(
        prices
            .iter()
            .any(|r| r.get("product") == Some("day_pass") && r.get("amenity_tier") == Some("basic"))
    );

    let code = error_code(&client, "SELEC nonsense").await;
    assert_eq!(code, SqlState::SYNTAX_ERROR);
    let code = error_code(&client, "SELECT * FROM rockets").await;
    assert_eq!(code, SqlState::SYNTAX_ERROR);
}
