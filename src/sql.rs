use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{
    self, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, ObjectNamePart, SelectItem,
    SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::calendar;
use crate::model::*;
use crate::pricing;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertWorkspace(Workspace),
    InsertEquipment(Equipment),
    InsertUser(User),
    InsertBooking(NewBooking),
    InsertMembership(NewMembership),
    InsertSubscription {
        id: Ulid,
        user_id: Ulid,
        plan: CantinaPlan,
        renews_at: Option<Ms>,
    },
    SelectWorkspaces(WorkspaceFilter),
    SelectEquipment(EquipmentFilter),
    SelectBookings(BookingFilter),
    SelectMemberships(MembershipFilter),
    SelectSubscriptions(SubscriptionFilter),
    SelectUsers {
        id: Option<Ulid>,
    },
    SelectAvailability {
        workspace_id: Ulid,
        date: NaiveDate,
    },
    SelectPrices,
    ConfirmBooking {
        id: Ulid,
    },
    CancelBooking {
        id: Ulid,
    },
    ExtendMembership {
        id: Ulid,
    },
    RenewSubscription {
        id: Ulid,
    },
    UseMeal {
        id: Ulid,
    },
    BookingConflicts {
        workspace_id: Ulid,
        slot: Slot,
        exclude: Option<Ulid>,
    },
    SetEquipmentQuantity {
        id: Ulid,
        quantity: u32,
    },
    CompletePastBookings,
}

/// Shape of the rows a statement produces, known before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Command tag only.
    Execution,
    Workspaces,
    Equipment,
    Users,
    Bookings,
    Memberships,
    Subscriptions,
    Availability,
    Prices,
    Conflict,
    Completed,
}

impl Command {
    pub fn result_kind(&self) -> ResultKind {
        match self {
            Command::InsertWorkspace(_)
            | Command::InsertEquipment(_)
            | Command::InsertUser(_)
            | Command::InsertBooking(_)
            | Command::InsertMembership(_)
            | Command::InsertSubscription { .. } => ResultKind::Execution,
            Command::SelectWorkspaces(_) => ResultKind::Workspaces,
            Command::SelectEquipment(_) | Command::SetEquipmentQuantity { .. } => {
                ResultKind::Equipment
            }
            Command::SelectBookings(_)
            | Command::ConfirmBooking { .. }
            | Command::CancelBooking { .. } => ResultKind::Bookings,
            Command::SelectMemberships(_) | Command::ExtendMembership { .. } => {
                ResultKind::Memberships
            }
            Command::SelectSubscriptions(_)
            | Command::RenewSubscription { .. }
            | Command::UseMeal { .. } => ResultKind::Subscriptions,
            Command::SelectUsers { .. } => ResultKind::Users,
            Command::SelectAvailability { .. } => ResultKind::Availability,
            Command::SelectPrices => ResultKind::Prices,
            Command::BookingConflicts { .. } => ResultKind::Conflict,
            Command::CompletePastBookings => ResultKind::Completed,
        }
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    match first_statement(sql)? {
        Statement::Insert(insert) => parse_insert(&insert),
        Statement::Query(query) => parse_query(&query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Result shape of `sql` without evaluating its values, so statements with
/// unbound `$n` placeholders can be described. Unparseable input describes as
/// `Execution`; the real error surfaces when it runs.
pub fn result_kind_of(sql: &str) -> ResultKind {
    let Ok(stmt) = first_statement(sql) else {
        return ResultKind::Execution;
    };
    let Statement::Query(query) = stmt else {
        return ResultKind::Execution;
    };
    let SetExpr::Select(select) = query.body.as_ref() else {
        return ResultKind::Execution;
    };
    if let Some(first) = select.from.first() {
        return table_factor_name(&first.relation)
            .ok()
            .and_then(|t| table_kind(&t))
            .unwrap_or(ResultKind::Execution);
    }
    match select.projection.as_slice() {
        [item] => projected_function(item)
            .and_then(|f| object_name_last(&f.name))
            .and_then(|name| function_kind(&name))
            .unwrap_or(ResultKind::Execution),
        _ => ResultKind::Execution,
    }
}

fn first_statement(sql: &str) -> Result<Statement, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut stmts =
        Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    Ok(stmts.swap_remove(0))
}

fn table_kind(table: &str) -> Option<ResultKind> {
    Some(match table {
        "workspaces" => ResultKind::Workspaces,
        "equipment" => ResultKind::Equipment,
        "users" => ResultKind::Users,
        "bookings" => ResultKind::Bookings,
        "memberships" => ResultKind::Memberships,
        "cantina_subscriptions" => ResultKind::Subscriptions,
        "availability" => ResultKind::Availability,
        "prices" => ResultKind::Prices,
        _ => return None,
    })
}

fn function_kind(name: &str) -> Option<ResultKind> {
    Some(match name {
        "confirm_booking" | "cancel_booking" => ResultKind::Bookings,
        "extend_membership" => ResultKind::Memberships,
        "renew_cantina_subscription" | "use_meal_credit" => ResultKind::Subscriptions,
        "booking_conflicts" => ResultKind::Conflict,
        "set_equipment_quantity" => ResultKind::Equipment,
        "complete_past_bookings" => ResultKind::Completed,
        _ => return None,
    })
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let v = Values {
        table: table_label(&table)?,
        exprs: &values,
    };

    match table.as_str() {
        "workspaces" => {
            v.arity(6, 6)?;
            Ok(Command::InsertWorkspace(Workspace {
                id: parse_ulid(&values[0])?,
                name: parse_text(&values[1])?,
                workspace_type: parse_label(&values[2])?,
                capacity: parse_u32(&values[3])?,
                hourly_rate: parse_money(&values[4])?,
                amenity_tier: parse_label(&values[5])?,
            }))
        }
        "equipment" => {
            v.arity(5, 5)?;
            Ok(Command::InsertEquipment(Equipment {
                id: parse_ulid(&values[0])?,
                workspace_id: parse_ulid(&values[1])?,
                name: parse_text(&values[2])?,
                description: parse_text_or_null(&values[3])?,
                quantity_available: parse_u32(&values[4])?,
            }))
        }
        "users" => {
            v.arity(2, 3)?;
            let role = match v.optional(2) {
                Some(expr) => parse_label_or_null(expr)?.unwrap_or(Role::Member),
                None => Role::Member,
            };
            Ok(Command::InsertUser(User {
                id: parse_ulid(&values[0])?,
                email: parse_text(&values[1])?,
                role,
            }))
        }
        "bookings" => {
            v.arity(6, 7)?;
            let equipment = match v.optional(6) {
                Some(expr) => parse_ulid_list(expr)?,
                None => Vec::new(),
            };
            Ok(Command::InsertBooking(NewBooking {
                id: parse_ulid(&values[0])?,
                workspace_id: parse_ulid(&values[1])?,
                user_id: parse_ulid(&values[2])?,
                slot: Slot::new(
                    parse_date(&values[3])?,
                    parse_time(&values[4])?,
                    parse_time(&values[5])?,
                ),
                equipment,
            }))
        }
        "memberships" => {
            v.arity(5, 6)?;
            let ends_at = match v.optional(5) {
                Some(expr) => parse_timestamp_or_null(expr)?,
                None => None,
            };
            Ok(Command::InsertMembership(NewMembership {
                id: parse_ulid(&values[0])?,
                user_id: parse_ulid(&values[1])?,
                membership_type: parse_label(&values[2])?,
                amenity_tier: parse_label(&values[3])?,
                starts_at: parse_timestamp(&values[4])?,
                ends_at,
            }))
        }
        "cantina_subscriptions" => {
            v.arity(3, 4)?;
            let renews_at = match v.optional(3) {
                Some(expr) => parse_timestamp_or_null(expr)?,
                None => None,
            };
            Ok(Command::InsertSubscription {
                id: parse_ulid(&values[0])?,
                user_id: parse_ulid(&values[1])?,
                plan: parse_label(&values[2])?,
                renews_at,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Positional VALUES with an arity check.
struct Values<'a> {
    table: &'static str,
    exprs: &'a [Expr],
}

impl<'a> Values<'a> {
    fn arity(&self, min: usize, max: usize) -> Result<(), SqlError> {
        let got = self.exprs.len();
        if got < min || got > max {
            return Err(SqlError::WrongArity(self.table, min, got));
        }
        Ok(())
    }

    fn optional(&self, i: usize) -> Option<&'a Expr> {
        self.exprs.get(i)
    }
}

fn table_label(table: &str) -> Result<&'static str, SqlError> {
    Ok(match table {
        "workspaces" => "workspaces",
        "equipment" => "equipment",
        "users" => "users",
        "bookings" => "bookings",
        "memberships" => "memberships",
        "cantina_subscriptions" => "cantina_subscriptions",
        other => return Err(SqlError::UnknownTable(other.to_string())),
    })
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_query(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return parse_function_call(select);
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_equalities(selection, &mut filters)?;
    }
    let unknown = |col: &str| SqlError::UnknownColumn(table.clone(), col.to_string());

    match table.as_str() {
        "workspaces" => {
            let mut f = WorkspaceFilter::default();
            for (col, expr) in &filters {
                match col.as_str() {
                    "workspace_type" => f.workspace_type = Some(parse_label(expr)?),
                    "amenity_tier" => f.amenity_tier = Some(parse_label(expr)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::SelectWorkspaces(f))
        }
        "equipment" => {
            let mut f = EquipmentFilter::default();
            for (col, expr) in &filters {
                match col.as_str() {
                    "workspace_id" => f.workspace_id = Some(parse_ulid(expr)?),
                    "available" => f.available = Some(parse_bool(expr)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::SelectEquipment(f))
        }
        "bookings" => {
            let mut f = BookingFilter::default();
            for (col, expr) in &filters {
                match col.as_str() {
                    "id" => f.id = Some(parse_ulid(expr)?),
                    "workspace_id" => f.workspace_id = Some(parse_ulid(expr)?),
                    "user_id" => f.user_id = Some(parse_ulid(expr)?),
                    "date" => f.date = Some(parse_date(expr)?),
                    "status" => f.status = Some(parse_label(expr)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::SelectBookings(f))
        }
        "memberships" => {
            let mut f = MembershipFilter::default();
            for (col, expr) in &filters {
                match col.as_str() {
                    "user_id" => f.user_id = Some(parse_ulid(expr)?),
                    "status" => f.status = Some(parse_label(expr)?),
                    "expiring_within_days" => f.expiring_within_days = Some(parse_u32(expr)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::SelectMemberships(f))
        }
        "cantina_subscriptions" => {
            let mut f = SubscriptionFilter::default();
            for (col, expr) in &filters {
                match col.as_str() {
                    "user_id" => f.user_id = Some(parse_ulid(expr)?),
                    "status" => f.status = Some(parse_label(expr)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::SelectSubscriptions(f))
        }
        "users" => {
            let mut id = None;
            for (col, expr) in &filters {
                match col.as_str() {
                    "id" => id = Some(parse_ulid(expr)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::SelectUsers { id })
        }
        "availability" => {
            let (mut workspace_id, mut date) = (None, None);
            for (col, expr) in &filters {
                match col.as_str() {
                    "workspace_id" => workspace_id = Some(parse_ulid(expr)?),
                    "date" => date = Some(parse_date(expr)?),
                    other => return Err(unknown(other)),
                }
            }
            Ok(Command::SelectAvailability {
                workspace_id: workspace_id.ok_or(SqlError::MissingFilter("workspace_id"))?,
                date: date.ok_or(SqlError::MissingFilter("date"))?,
            })
        }
        "prices" => match filters.first() {
            Some((col, _)) => Err(unknown(col)),
            None => Ok(Command::SelectPrices),
        },
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = x AND b = y AND ...` into `(column, value)` pairs.
fn collect_equalities(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_equalities(inner, out),
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_equalities(left, out)?;
            collect_equalities(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.push((col, right.as_ref().clone()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!(
            "WHERE supports only `column = value AND ...`, got {other}"
        ))),
    }
}

// ── Function calls ────────────────────────────────────────────

fn projected_function(item: &SelectItem) -> Option<&ast::Function> {
    match item {
        SelectItem::UnnamedExpr(Expr::Function(f))
        | SelectItem::ExprWithAlias {
            expr: Expr::Function(f),
            ..
        } => Some(f),
        _ => None,
    }
}

fn parse_function_call(select: &ast::Select) -> Result<Command, SqlError> {
    let func = match select.projection.as_slice() {
        [item] => projected_function(item),
        _ => None,
    }
    .ok_or_else(|| SqlError::Unsupported("SELECT without FROM must call one function".into()))?;
    let name =
        object_name_last(&func.name).ok_or_else(|| SqlError::Parse("empty function name".into()))?;
    let args = function_args(func)?;
    let arity = |min: usize, max: usize| -> Result<(), SqlError> {
        if args.len() < min || args.len() > max {
            return Err(SqlError::WrongArgs(name.clone(), min, args.len()));
        }
        Ok(())
    };

    match name.as_str() {
        "confirm_booking" | "cancel_booking" | "extend_membership"
        | "renew_cantina_subscription" | "use_meal_credit" => {
            arity(1, 1)?;
            let id = parse_ulid(args[0])?;
            Ok(match name.as_str() {
                "confirm_booking" => Command::ConfirmBooking { id },
                "cancel_booking" => Command::CancelBooking { id },
                "extend_membership" => Command::ExtendMembership { id },
                "renew_cantina_subscription" => Command::RenewSubscription { id },
                _ => Command::UseMeal { id },
            })
        }
        "booking_conflicts" => {
            arity(4, 5)?;
            let exclude = match args.get(4) {
                Some(expr) => parse_ulid_or_null(expr)?,
                None => None,
            };
            Ok(Command::BookingConflicts {
                workspace_id: parse_ulid(args[0])?,
                slot: Slot::new(parse_date(args[1])?, parse_time(args[2])?, parse_time(args[3])?),
                exclude,
            })
        }
        "set_equipment_quantity" => {
            arity(2, 2)?;
            Ok(Command::SetEquipmentQuantity {
                id: parse_ulid(args[0])?,
                quantity: parse_u32(args[1])?,
            })
        }
        "complete_past_bookings" => {
            arity(0, 0)?;
            Ok(Command::CompletePastBookings)
        }
        _ => Err(SqlError::UnknownFunction(name)),
    }
}

fn function_args(func: &ast::Function) -> Result<Vec<&Expr>, SqlError> {
    match &func.args {
        FunctionArguments::None => Ok(Vec::new()),
        FunctionArguments::Subquery(_) => Err(SqlError::Unsupported("subquery argument".into())),
        FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Ok(e),
                other => Err(SqlError::Unsupported(format!("argument {other}"))),
            })
            .collect(),
    }
}

// ── Helpers ───────────────────────────────────────────────────

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

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row VALUES".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
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

/// String or bare number literal as text.
fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_text_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_text(expr).map(Some)
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_text(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID {s:?}: {e}")))
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_ulid(expr).map(Some)
}

/// Comma-separated ULIDs; repeats are kept. NULL or `''` is an empty list.
fn parse_ulid_list(expr: &Expr) -> Result<Vec<Ulid>, SqlError> {
    let Some(s) = parse_text_or_null(expr)? else {
        return Ok(Vec::new());
    };
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Ulid::from_string(part).map_err(|e| SqlError::Parse(format!("bad ULID {part:?}: {e}")))
        })
        .collect()
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    let s = parse_text(expr)?;
    s.trim()
        .parse()
        .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of range")))
}

fn parse_money(expr: &Expr) -> Result<Cents, SqlError> {
    pricing::parse_cents(&parse_text(expr)?).map_err(SqlError::Parse)
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_label<T: FromStr<Err = UnknownLabel>>(expr: &Expr) -> Result<T, SqlError> {
    parse_text(expr)?
        .parse()
        .map_err(|e: UnknownLabel| SqlError::Parse(e.to_string()))
}

fn parse_label_or_null<T: FromStr<Err = UnknownLabel>>(expr: &Expr) -> Result<Option<T>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_label(expr).map(Some)
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    calendar::parse_date(&parse_text(expr)?).map_err(SqlError::Parse)
}

fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    calendar::parse_time(&parse_text(expr)?).map_err(SqlError::Parse)
}

fn parse_timestamp(expr: &Expr) -> Result<Ms, SqlError> {
    calendar::parse_timestamp(&parse_text(expr)?).map_err(SqlError::Parse)
}

fn parse_timestamp_or_null(expr: &Expr) -> Result<Option<Ms>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_timestamp(expr).map(Some)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String, String),
    UnknownFunction(String),
    WrongArity(&'static str, usize, usize),
    WrongArgs(String, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(t, c) => write!(f, "unknown filter column {c} on {t}"),
            SqlError::UnknownFunction(name) => write!(f, "unknown function: {name}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::WrongArgs(name, expected, got) => {
                write!(f, "{name}: expected at least {expected} arguments, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
