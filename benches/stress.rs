use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls};
use ulid::Ulid;

/// Far enough ahead that no slot is in the past.
const BASE_YEAR: i32 = 2099;

async fn connect(host: &str, port: u16, db: &str) -> Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(db)
        .user("hotdesk")
        .password("hotdesk");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn fresh_location() -> String {
    format!("bench_{}", Ulid::new())
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    let ms = |d: Duration| d.as_secs_f64() * 1000.0;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        ms(avg),
        ms(percentile(latencies, 50.0)),
        ms(percentile(latencies, 95.0)),
        ms(percentile(latencies, 99.0)),
        ms(latencies[latencies.len() - 1]),
    );
}

/// Date string for the `n`-th day of the benchmark calendar.
fn day(n: usize) -> String {
    let month = 1 + (n / 28) % 12;
    let dom = 1 + n % 28;
    let year = BASE_YEAR - (n / (28 * 12)) as i32;
    format!("{year}-{month:02}-{dom:02}")
}

/// Hour-long slot `i` of a 9-to-17 day, spread across days.
fn hourly_slot(i: usize) -> (String, String, String) {
    let hour = 9 + i % 8;
    (day(i / 8), format!("{hour:02}:00"), format!("{:02}:00", hour + 1))
}

struct Location {
    workspace: Ulid,
    user: Ulid,
}

async fn setup(client: &Client) -> Location {
    let workspace = Ulid::new();
    let user = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO workspaces VALUES ('{workspace}', 'Bench room', 'meeting_room', 10, '25.00', 'standard')"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO users VALUES ('{user}', 'bench-{user}@example.com', 'member')"
        ))
        .await
        .unwrap();
    Location { workspace, user }
}

async fn book(client: &Client, loc: &Location, i: usize) -> Result<(), tokio_postgres::Error> {
    let (date, start, end) = hourly_slot(i);
    client
        .batch_execute(&format!(
            "INSERT INTO bookings VALUES ('{}', '{}', '{}', '{date}', '{start}', '{end}')",
            Ulid::new(),
            loc.workspace,
            loc.user
        ))
        .await
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port, &fresh_location()).await;
    let loc = setup(&client).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for i in 0..n {
        let t = Instant::now();
        book(&client, &loc, i).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(host: &str, port: u16) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &fresh_location()).await;
            let loc = setup(&client).await;
            for i in 0..n_per_task {
                book(&client, &loc, i).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Many clients race for the same slots of one workspace; each slot must be
/// won exactly once.
async fn phase3_contention(host: &str, port: u16) {
    let db = fresh_location();
    let setup_client = connect(host, port, &db).await;
    let loc = Arc::new(setup(&setup_client).await);

    let n_tasks = 20;
    let n_slots = 100;
    let won = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let (host, db) = (host.to_string(), db.clone());
        let (loc, won, conflicts) = (loc.clone(), won.clone(), conflicts.clone());
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &db).await;
            for i in 0..n_slots {
                match book(&client, &loc, i).await {
                    Ok(()) => won.fetch_add(1, Ordering::Relaxed),
                    Err(e) if e.code() == Some(&SqlState::EXCLUSION_VIOLATION) => {
                        conflicts.fetch_add(1, Ordering::Relaxed)
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let won = won.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} clients x {n_slots} slots in {:.2}s: {won} won, {} conflicts",
        start.elapsed().as_secs_f64(),
        conflicts.load(Ordering::Relaxed)
    );
    assert_eq!(won, n_slots, "every slot must be booked exactly once");
}

async fn phase4_read_under_load(host: &str, port: u16) {
    let db = fresh_location();
    let setup_client = connect(host, port, &db).await;
    let loc = Arc::new(setup(&setup_client).await);
    for i in 0..200 {
        book(&setup_client, &loc, i).await.unwrap();
    }

    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..5 {
        let (host, db, loc, stop) = (host.to_string(), db.clone(), loc.clone(), stop.clone());
        writers.push(tokio::spawn(async move {
            let client = connect(&host, port, &db).await;
            let mut i = 1_000 + w * 10_000;
            while !stop.load(Ordering::Relaxed) {
                let _ = book(&client, &loc, i).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut readers = Vec::new();
    for r in 0..n_readers {
        let (host, db, loc) = (host.to_string(), db.clone(), loc.clone());
        readers.push(tokio::spawn(async move {
            let client = connect(&host, port, &db).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let t = Instant::now();
                client
                    .simple_query(&format!(
                        "SELECT * FROM availability WHERE workspace_id = '{}' AND date = '{}'",
                        loc.workspace,
                        day((r + i) % 25)
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("availability query", &mut all);
}

#[tokio::main]
async fn main() {
    let host = std::env::var("HOTDESK_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("HOTDESK_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid HOTDESK_PORT");

    println!("=== hotdesk stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent(&host, port).await;

    println!("\n[phase 3] contention on shared slots");
    phase3_contention(&host, port).await;

    println!("\n[phase 4] availability latency under write load");
    phase4_read_under_load(&host, port).await;

    println!("\n=== benchmark complete ===");
}
