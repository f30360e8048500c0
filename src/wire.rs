use std::fmt::Debug;
use std::io;
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
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;
use ulid::Ulid;

use crate::auth::HotdeskAuthSource;
use crate::calendar;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{self, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::pricing::{self, PriceEntry};
use crate::sql::{self, Command, ResultKind, SqlError};
use crate::tenant::TenantManager;

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(HotdeskFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

pub struct HotdeskHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<HotdeskQueryParser>,
}

impl HotdeskHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(HotdeskQueryParser),
        }
    }

    /// The database name picks the location.
    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("location error: {e}")))
    }

    /// Parse and run one statement, recording query metrics.
    async fn run(&self, engine: &Engine, query: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            debug!(command = label, error = ?e, "query failed");
        }
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Response> {
        let now = calendar::now_ms();
        let kind = cmd.result_kind();
        match cmd {
            Command::InsertWorkspace(ws) => {
                engine.create_workspace(ws).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertEquipment(eq) => {
                engine.add_equipment(eq).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertUser(user) => {
                engine.register_user(user).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertBooking(req) => {
                engine.create_booking(req, now).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertMembership(req) => {
                engine.create_membership(req).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertSubscription {
                id,
                user_id,
                plan,
                renews_at,
            } => {
                engine
                    .subscribe_cantina(id, user_id, plan, renews_at, now)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted())
            }
            Command::SelectWorkspaces(filter) => {
                let rows = engine.list_workspaces(&filter).await;
                rows_response(kind, format, rows.iter().map(workspace_row))
            }
            Command::SelectEquipment(filter) => {
                let rows = engine.list_equipment(&filter).await;
                rows_response(kind, format, rows.iter().map(equipment_row))
            }
            Command::SelectBookings(filter) => {
                let rows = engine.list_bookings(&filter).await;
                rows_response(kind, format, rows.iter().map(booking_row))
            }
            Command::SelectMemberships(filter) => {
                let rows = engine.list_memberships(&filter, now).await;
                rows_response(kind, format, rows.iter().map(|m| membership_row(m, now)))
            }
            Command::SelectSubscriptions(filter) => {
                let rows = engine.list_subscriptions(&filter, now).await;
                rows_response(kind, format, rows.iter().map(|s| subscription_row(s, now)))
            }
            Command::SelectUsers { id } => {
                let rows = engine.list_users(id, now).await;
                rows_response(kind, format, rows.iter().map(user_row))
            }
            Command::SelectAvailability { workspace_id, date } => {
                let spans = engine
                    .day_availability(workspace_id, date)
                    .await
                    .map_err(engine_err)?;
                rows_response(
                    kind,
                    format,
                    spans.iter().map(|s| availability_row(workspace_id, date, s)),
                )
            }
            Command::SelectPrices => {
                rows_response(kind, format, pricing::price_list().iter().map(price_row))
            }
            Command::ConfirmBooking { id } => {
                let b = engine.confirm_booking(id).await.map_err(engine_err)?;
                rows_response(kind, format, [booking_row(&b)])
            }
            Command::CancelBooking { id } => {
                let b = engine.cancel_booking(id, now).await.map_err(engine_err)?;
                rows_response(kind, format, [booking_row(&b)])
            }
            Command::ExtendMembership { id } => {
                let m = engine.extend_membership(id, now).await.map_err(engine_err)?;
                rows_response(kind, format, [membership_row(&m, now)])
            }
            Command::RenewSubscription { id } => {
                let s = engine.renew_cantina(id, now).await.map_err(engine_err)?;
                rows_response(kind, format, [subscription_row(&s, now)])
            }
            Command::UseMeal { id } => {
                let s = engine.use_meal(id).await.map_err(engine_err)?;
                rows_response(kind, format, [subscription_row(&s, now)])
            }
            Command::BookingConflicts {
                workspace_id,
                slot,
                exclude,
            } => {
                let conflict = engine
                    .has_conflict(workspace_id, &slot, exclude)
                    .await
                    .map_err(engine_err)?;
                rows_response(kind, format, [vec![Cell::Bool(conflict)]])
            }
            Command::SetEquipmentQuantity { id, quantity } => {
                let e = engine
                    .set_equipment_quantity(id, quantity)
                    .await
                    .map_err(engine_err)?;
                rows_response(kind, format, [equipment_row(&e)])
            }
            Command::CompletePastBookings => {
                let completed = engine.complete_past_bookings(now).await;
                rows_response(kind, format, [vec![Cell::Int(completed as i64)]])
            }
        }
    }
}

fn inserted() -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(1))
}

// ── Row encoding ─────────────────────────────────────────────────

/// One column value, encoded per the field's format.
enum Cell {
    Text(String),
    OptText(Option<String>),
    Int(i64),
    Bool(bool),
}

fn text(s: impl Into<String>) -> Cell {
    Cell::Text(s.into())
}

fn field(name: &str, ty: Type, format: FieldFormat) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, format)
}

/// Column layout for `kind`, in the result format the client asked for.
fn schema_for(kind: ResultKind, format: &Format) -> Vec<FieldInfo> {
    use Type as T;
    let cols: Vec<(&str, Type)> = match kind {
        ResultKind::Execution => vec![],
        ResultKind::Workspaces => vec![
            ("id", T::VARCHAR),
            ("name", T::VARCHAR),
            ("workspace_type", T::VARCHAR),
            ("capacity", T::INT8),
            ("hourly_rate", T::VARCHAR),
            ("amenity_tier", T::VARCHAR),
        ],
        ResultKind::Equipment => vec![
            ("id", T::VARCHAR),
            ("workspace_id", T::VARCHAR),
            ("name", T::VARCHAR),
            ("description", T::VARCHAR),
            ("quantity_available", T::INT8),
            ("available", T::BOOL),
        ],
        ResultKind::Users => vec![
            ("id", T::VARCHAR),
            ("email", T::VARCHAR),
            ("role", T::VARCHAR),
            ("active_membership", T::BOOL),
            ("has_meal_credits", T::BOOL),
        ],
        ResultKind::Bookings => vec![
            ("id", T::VARCHAR),
            ("workspace_id", T::VARCHAR),
            ("user_id", T::VARCHAR),
            ("date", T::VARCHAR),
            ("start_time", T::VARCHAR),
            ("end_time", T::VARCHAR),
            ("status", T::VARCHAR),
            ("equipment", T::VARCHAR),
            ("calculated_price", T::VARCHAR),
        ],
        ResultKind::Memberships => vec![
            ("id", T::VARCHAR),
            ("user_id", T::VARCHAR),
            ("membership_type", T::VARCHAR),
            ("amenity_tier", T::VARCHAR),
            ("starts_at", T::VARCHAR),
            ("ends_at", T::VARCHAR),
            ("status", T::VARCHAR),
            ("price", T::VARCHAR),
        ],
        ResultKind::Subscriptions => vec![
            ("id", T::VARCHAR),
            ("user_id", T::VARCHAR),
            ("plan_type", T::VARCHAR),
            ("meals_remaining", T::INT8),
            ("meal_limit", T::INT8),
            ("meals_remaining_percentage", T::INT8),
            ("renews_at", T::VARCHAR),
            ("status", T::VARCHAR),
            ("price", T::VARCHAR),
        ],
        ResultKind::Availability => vec![
            ("workspace_id", T::VARCHAR),
            ("date", T::VARCHAR),
            ("start_time", T::VARCHAR),
            ("end_time", T::VARCHAR),
            ("duration_minutes", T::INT8),
        ],
        ResultKind::Prices => vec![
            ("product", T::VARCHAR),
            ("amenity_tier", T::VARCHAR),
            ("price", T::VARCHAR),
        ],
        ResultKind::Conflict => vec![("conflict", T::BOOL)],
        ResultKind::Completed => vec![("completed", T::INT8)],
    };
    cols.into_iter()
        .enumerate()
        .map(|(i, (name, ty))| field(name, ty, format.format_for(i)))
        .collect()
}

fn rows_response<I>(kind: ResultKind, format: &Format, rows: I) -> PgWireResult<Response>
where
    I: IntoIterator<Item = Vec<Cell>>,
{
    let schema = Arc::new(schema_for(kind, format));
    let rows: Vec<PgWireResult<_>> = rows
        .into_iter()
        .map(|cells| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            for cell in &cells {
                match cell {
                    Cell::Text(s) => encoder.encode_field(s)?,
                    Cell::OptText(s) => encoder.encode_field(s)?,
                    Cell::Int(n) => encoder.encode_field(n)?,
                    Cell::Bool(b) => encoder.encode_field(b)?,
                }
            }
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn workspace_row(w: &Workspace) -> Vec<Cell> {
    vec![
        text(w.id.to_string()),
        text(w.name.as_str()),
        text(w.workspace_type.as_str()),
        Cell::Int(i64::from(w.capacity)),
        text(pricing::format_cents(w.hourly_rate)),
        text(w.amenity_tier.as_str()),
    ]
}

fn equipment_row(e: &Equipment) -> Vec<Cell> {
    vec![
        text(e.id.to_string()),
        text(e.workspace_id.to_string()),
        text(e.name.as_str()),
        Cell::OptText(e.description.clone()),
        Cell::Int(i64::from(e.quantity_available)),
        Cell::Bool(e.is_available()),
    ]
}

fn user_row(u: &UserInfo) -> Vec<Cell> {
    vec![
        text(u.user.id.to_string()),
        text(u.user.email.as_str()),
        text(u.user.role.as_str()),
        Cell::Bool(u.active_membership),
        Cell::Bool(u.has_meal_credits),
    ]
}

fn booking_row(b: &Booking) -> Vec<Cell> {
    let equipment: Vec<String> = b.equipment.iter().map(Ulid::to_string).collect();
    vec![
        text(b.id.to_string()),
        text(b.workspace_id.to_string()),
        text(b.user_id.to_string()),
        text(b.slot.date.to_string()),
        text(calendar::format_time(b.slot.start_time)),
        text(calendar::format_time(b.slot.end_time)),
        text(b.status.as_str()),
        text(equipment.join(",")),
        text(pricing::format_cents(b.price)),
    ]
}

fn membership_row(m: &Membership, now: Ms) -> Vec<Cell> {
    vec![
        text(m.id.to_string()),
        text(m.user_id.to_string()),
        text(m.membership_type.as_str()),
        text(m.amenity_tier.as_str()),
        text(calendar::format_timestamp(m.starts_at)),
        text(calendar::format_timestamp(m.ends_at)),
        text(m.status(now).as_str()),
        text(pricing::format_cents(pricing::membership_price(
            m.membership_type,
            m.amenity_tier,
        ))),
    ]
}

fn subscription_row(s: &CantinaSubscription, now: Ms) -> Vec<Cell> {
    vec![
        text(s.id.to_string()),
        text(s.user_id.to_string()),
        text(s.plan.as_str()),
        Cell::Int(i64::from(s.meals_remaining)),
        Cell::Int(i64::from(s.plan.meal_limit())),
        Cell::Int(i64::from(s.meals_remaining_percentage())),
        text(calendar::format_timestamp(s.renews_at)),
        text(s.status(now).as_str()),
        text(pricing::format_cents(pricing::cantina_price(s.plan))),
    ]
}

fn availability_row(workspace_id: Ulid, date: chrono::NaiveDate, span: &Span) -> Vec<Cell> {
    vec![
        text(workspace_id.to_string()),
        text(date.to_string()),
        text(calendar::format_clock(date, span.start)),
        text(calendar::format_clock(date, span.end)),
        Cell::Int(minutes_into_day(date, span.end) - minutes_into_day(date, span.start)),
    ]
}

fn price_row(p: &PriceEntry) -> Vec<Cell> {
    vec![
        text(p.product),
        Cell::OptText(p.tier.map(|t| t.as_str().to_string())),
        text(pricing::format_cents(p.price)),
    ]
}

// ── Simple Query Protocol ────────────────────────────────────────

#[async_trait]
impl SimpleQueryHandler for HotdeskHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        Ok(vec![self.run(&engine, query, &Format::UnifiedText).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct HotdeskQueryParser;

#[async_trait]
impl QueryParser for HotdeskQueryParser {
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
        let format = column_format.unwrap_or(&Format::UnifiedBinary);
        Ok(schema_for(sql::result_kind_of(stmt), format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for HotdeskHandler {
    type Statement = String;
    type QueryParser = HotdeskQueryParser;

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
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(&portal.statement.statement, &portal.parameters);
        self.run(&engine, &sql, &portal.result_column_format).await
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
        // Result formats are not known until Bind; describe as binary.
        let schema = schema_for(
            sql::result_kind_of(&target.statement),
            &Format::UnifiedBinary,
        );
        Ok(DescribeStatementResponse::new(param_types, schema))
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
        let schema = schema_for(
            sql::result_kind_of(&target.statement.statement),
            &target.result_column_format,
        );
        Ok(DescribePortalResponse::new(schema))
    }
}

/// Highest `$N` placeholder in the statement.
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

/// Replace `$1`, `$2`, ... with quoted text-format parameter values in one
/// left-to-right pass over the statement. Bound values are never rescanned,
/// and placeholders inside quoted literals or past the last parameter stay
/// as written.
fn substitute_params<P: AsRef<[u8]>>(sql: &str, params: &[Option<P>]) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                let mut end = i + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let param = sql[i + 1..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|n| params.get(n));
                if let Some(param) = param {
                    out.push_str(&sql[copied..i]);
                    out.push_str(&quote_param(param.as_ref()));
                    copied = end;
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);
    out
}

fn quote_param(param: Option<&impl AsRef<[u8]>>) -> String {
    match param {
        Some(bytes) => format!(
            "'{}'",
            String::from_utf8_lossy(bytes.as_ref()).replace('\'', "''")
        ),
        None => "NULL".to_string(),
    }
}

// ── Factory ──────────────────────────────────────────────────────

pub struct HotdeskFactory {
    handler: Arc<HotdeskHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<HotdeskAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl HotdeskFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        Self {
            handler: Arc::new(HotdeskHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                HotdeskAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for HotdeskFactory {
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

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) => "22023",
        EngineError::Conflict(_) => "23P01",
        EngineError::State(_) => "55000",
        EngineError::InsufficientCredits(_) => "53000",
        EngineError::NotFound(_) => "P0002",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
