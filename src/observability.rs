use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "hotdesk_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "hotdesk_query_duration_seconds";

// ── Domain counters ─────────────────────────────────────────────

/// Counter: bookings accepted.
pub const BOOKINGS_CREATED_TOTAL: &str = "hotdesk_bookings_created_total";

/// Counter: booking requests rejected because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "hotdesk_booking_conflicts_total";

/// Counter: bookings moved to completed by the sweep.
pub const BOOKINGS_COMPLETED_TOTAL: &str = "hotdesk_bookings_completed_total";

/// Counter: bookings the sweep skipped after an error.
pub const SWEEP_FAILURES_TOTAL: &str = "hotdesk_sweep_failures_total";

/// Counter: cantina meal credits consumed.
pub const MEALS_USED_TOTAL: &str = "hotdesk_meals_used_total";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "hotdesk_connections_active";

pub const CONNECTIONS_TOTAL: &str = "hotdesk_connections_total";

/// Counter: connections refused at the connection limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "hotdesk_connections_rejected_total";

/// Gauge: locations with a loaded engine.
pub const TENANTS_ACTIVE: &str = "hotdesk_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hotdesk_wal_flush_duration_seconds";

/// Histogram: events per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "hotdesk_wal_flush_batch_size";

/// Install the Prometheus exporter when a port is configured.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://{addr}/metrics");
    Ok(())
}

/// Short metric label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertWorkspace(_) => "insert_workspace",
        Command::InsertEquipment(_) => "insert_equipment",
        Command::InsertUser(_) => "insert_user",
        Command::InsertBooking(_) => "insert_booking",
        Command::InsertMembership(_) => "insert_membership",
        Command::InsertSubscription { .. } => "insert_subscription",
        Command::SelectWorkspaces(_) => "select_workspaces",
        Command::SelectEquipment(_) => "select_equipment",
        Command::SelectBookings(_) => "select_bookings",
        Command::SelectMemberships(_) => "select_memberships",
        Command::SelectSubscriptions(_) => "select_subscriptions",
        Command::SelectUsers { .. } => "select_users",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectPrices => "select_prices",
        Command::ConfirmBooking { .. } => "confirm_booking",
        Command::CancelBooking { .. } => "cancel_booking",
        Command::ExtendMembership { .. } => "extend_membership",
        Command::RenewSubscription { .. } => "renew_subscription",
        Command::UseMeal { .. } => "use_meal",
        Command::BookingConflicts { .. } => "booking_conflicts",
        Command::SetEquipmentQuantity { .. } => "set_equipment_quantity",
        Command::CompletePastBookings => "complete_past_bookings",
    }
}
