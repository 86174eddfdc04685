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

use crate::auth::StaffAuthSource;
use crate::calendar::{MonthGridCell, TimelineBar, DEFAULT_VISIBLE_PER_CELL};
use crate::engine::{self, Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};
use crate::team::TeamRegistry;

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<RentcalFactory>,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

pub struct RentcalHandler {
    teams: Arc<TeamRegistry>,
    query_parser: Arc<RentcalQueryParser>,
}

impl RentcalHandler {
    pub fn new(teams: Arc<TeamRegistry>) -> Self {
        Self {
            teams,
            query_parser: Arc::new(RentcalQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let team = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.teams.get_or_create(&team).map_err(|e| {
            user_error("08006", format!("team {team:?} unavailable: {e}"))
        })
    }

    async fn run<C: ClientInfo>(
        &self,
        client: &C,
        query: &str,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let engine = self.resolve_engine(client)?;
        let booked_by = client.metadata().get("user").cloned();
        let cmd = sql::parse_sql(query).map_err(sql_err)?;

        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = execute_command(&engine, cmd, booked_by, format).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = match &result {
            Ok(_) => "ok",
            Err(EngineError::Conflict { .. }) => "conflict",
            Err(_) => "error",
        };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);

        result.map_err(engine_err)
    }
}

fn execution(tag: &str, rows: usize) -> Vec<Response> {
    vec![Response::Execution(Tag::new(tag).with_rows(rows))]
}

async fn execute_command(
    engine: &Engine,
    cmd: Command,
    booked_by: Option<String>,
    format: &Format,
) -> Result<Vec<Response>, EngineError> {
    match cmd {
        Command::InsertCar {
            id,
            name,
            number_plate,
            mileage,
            status,
        } => {
            engine
                .create_car(id, name, number_plate, mileage, status)
                .await?;
            Ok(execution("INSERT", 1))
        }
        Command::UpdateCar { id, changes } => {
            engine.update_car(id, changes).await?;
            Ok(execution("UPDATE", 1))
        }
        Command::DeleteCar { id } => {
            engine.delete_car(id).await?;
            Ok(execution("DELETE", 1))
        }
        Command::InsertReservation {
            id,
            car_id,
            range,
            customer_name,
            customer_phone,
            customer_email,
        } => {
            let candidate = NewReservation {
                car_id,
                range,
                customer_name,
                customer_phone,
                customer_email,
                booked_by,
            };
            engine.create_reservation(id, candidate).await?;
            Ok(execution("INSERT", 1))
        }
        Command::DeleteReservation { id } => {
            engine.delete_reservation(id).await?;
            Ok(execution("DELETE", 1))
        }
        Command::SelectCars => {
            let cars = engine.list_cars().await;
            Ok(rows(cars_schema(), format, &cars, encode_car))
        }
        Command::SelectCarSummary => {
            let summary = engine.car_summary().await;
            Ok(rows(summary_schema(), format, [summary], encode_summary))
        }
        Command::SelectReservations { car_id, window } => {
            let scope = car_id.map_or(CarScope::All, CarScope::Car);
            let found = engine.get_reservations(scope, window).await?;
            Ok(rows(reservations_schema(), format, &found, encode_reservation))
        }
        Command::SelectMonthGrid { month } => {
            let grid = engine.month_grid(month).await?;
            Ok(rows(
                month_grid_schema(),
                format,
                grid.cells.iter().enumerate(),
                encode_grid_cell,
            ))
        }
        Command::SelectTimeline { month, today } => {
            let timeline = engine
                .timeline(month, today.unwrap_or_else(engine::today))
                .await?;
            let bars = timeline.groups.values().flatten();
            Ok(rows(timeline_schema(), format, bars, |e, bar| {
                encode_timeline_bar(e, bar, timeline.days_in_month, timeline.today_marker)
            }))
        }
        Command::SelectDisabledDays { car_id } => {
            let days = engine.disabled_days(car_id).await;
            Ok(rows(disabled_days_schema(), format, days, |e, day| {
                e.encode_field(&day.to_string())
            }))
        }
        Command::SelectDailyReservations { window } => {
            let counts = engine.daily_occupancy(window).await?;
            Ok(rows(daily_schema(), format, counts, |e, c| {
                e.encode_field(&c.day.to_string())?;
                e.encode_field(&i64::from(c.count))
            }))
        }
    }
}

// ── Result sets ──────────────────────────────────────────────────

/// Encode `items` into one query response, one data row per item.
fn rows<T>(
    schema: Vec<FieldInfo>,
    format: &Format,
    items: impl IntoIterator<Item = T>,
    encode: impl Fn(&mut DataRowEncoder, T) -> PgWireResult<()>,
) -> Vec<Response> {
    let schema = Arc::new(with_format(schema, format));
    let encoded: Vec<_> = items
        .into_iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            PgWireResult::Ok(encoder.take_row())
        })
        .collect();
    vec![Response::Query(QueryResponse::new(schema, stream::iter(encoded)))]
}

/// Re-tag each column with the result format the client bound. Columns
/// past the end of an individual code list stay text.
fn with_format(schema: Vec<FieldInfo>, format: &Format) -> Vec<FieldInfo> {
    schema
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let column = match format {
                Format::Individual(codes) => codes
                    .get(i)
                    .map_or(FieldFormat::Text, |&code| FieldFormat::from(code)),
                unified => unified.format_for(i),
            };
            FieldInfo::new(
                f.name().to_string(),
                f.table_id(),
                f.column_id(),
                f.datatype().clone(),
                column,
            )
        })
        .collect()
}

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn cars_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("name"),
        text("number_plate"),
        int("mileage"),
        text("status"),
    ]
}

fn summary_schema() -> Vec<FieldInfo> {
    vec![int("total"), int("available")]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("car_id"),
        text("start_date"),
        text("end_date"),
        text("customer_name"),
        text("customer_phone"),
        text("customer_email"),
        text("booked_by"),
    ]
}

fn month_grid_schema() -> Vec<FieldInfo> {
    vec![
        int("cell"),
        text("date"),
        int("reservation_count"),
        text("visible"),
        int("overflow"),
    ]
}

fn timeline_schema() -> Vec<FieldInfo> {
    vec![
        text("car_name"),
        text("reservation_id"),
        text("car_id"),
        text("customer_name"),
        int("start_offset"),
        int("duration"),
        int("days_in_month"),
        int("today_marker"),
    ]
}

fn disabled_days_schema() -> Vec<FieldInfo> {
    vec![text("day")]
}

fn daily_schema() -> Vec<FieldInfo> {
    vec![text("day"), int("count")]
}

/// Schema of a SELECT, looked up by its table name.
fn schema_for_table(table: &str) -> Vec<FieldInfo> {
    match table {
        "cars" => cars_schema(),
        "car_summary" => summary_schema(),
        "reservations" => reservations_schema(),
        "month_grid" => month_grid_schema(),
        "timeline" => timeline_schema(),
        "disabled_days" => disabled_days_schema(),
        "daily_reservations" => daily_schema(),
        _ => Vec::new(),
    }
}

/// The table after FROM in a SELECT, lowercased. `None` for writes.
fn select_table(sql: &str) -> Option<String> {
    let mut tokens = sql.split_whitespace();
    if !tokens.next()?.eq_ignore_ascii_case("select") {
        return None;
    }
    tokens
        .skip_while(|t| !t.eq_ignore_ascii_case("from"))
        .nth(1)
        .map(|t| t.trim_matches(|c| c == ';' || c == '"').to_lowercase())
}

fn result_schema(sql: &str) -> Vec<FieldInfo> {
    select_table(sql)
        .map(|t| schema_for_table(&t))
        .unwrap_or_default()
}

fn encode_car(e: &mut DataRowEncoder, car: &Car) -> PgWireResult<()> {
    e.encode_field(&car.id.to_string())?;
    e.encode_field(&car.name)?;
    e.encode_field(&car.number_plate)?;
    e.encode_field(&car.mileage.map(i64::from))?;
    e.encode_field(&car.status.as_str().to_string())
}

fn encode_summary(e: &mut DataRowEncoder, summary: CarSummary) -> PgWireResult<()> {
    e.encode_field(&(summary.total as i64))?;
    e.encode_field(&(summary.available as i64))
}

fn encode_reservation(e: &mut DataRowEncoder, r: &Reservation) -> PgWireResult<()> {
    e.encode_field(&r.id.to_string())?;
    e.encode_field(&r.car_id.to_string())?;
    e.encode_field(&r.range.from.to_string())?;
    e.encode_field(&r.range.to.to_string())?;
    e.encode_field(&r.customer_name)?;
    e.encode_field(&r.customer_phone)?;
    e.encode_field(&r.customer_email)?;
    e.encode_field(&r.booked_by)
}

/// Compact JSON for a cell's visible reservations.
fn visible_json(reservations: &[Reservation]) -> String {
    let items: Vec<_> = reservations
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id.to_string(),
                "car_id": r.car_id.to_string(),
                "customer_name": r.customer_name,
                "start_date": r.range.from.to_string(),
                "end_date": r.range.to.to_string(),
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

fn encode_grid_cell(
    e: &mut DataRowEncoder,
    (index, cell): (usize, &MonthGridCell),
) -> PgWireResult<()> {
    e.encode_field(&(index as i64))?;
    e.encode_field(&cell.date().map(|d| d.to_string()))?;
    e.encode_field(&(cell.reservations().len() as i64))?;
    e.encode_field(&visible_json(cell.visible(DEFAULT_VISIBLE_PER_CELL)))?;
    e.encode_field(&(cell.overflow(DEFAULT_VISIBLE_PER_CELL) as i64))
}

fn encode_timeline_bar(
    e: &mut DataRowEncoder,
    bar: &TimelineBar,
    days_in_month: i64,
    today_marker: Option<i64>,
) -> PgWireResult<()> {
    e.encode_field(&bar.car_name)?;
    e.encode_field(&bar.reservation.id.to_string())?;
    e.encode_field(&bar.reservation.car_id.to_string())?;
    e.encode_field(&bar.reservation.customer_name)?;
    e.encode_field(&bar.start_offset)?;
    e.encode_field(&bar.duration)?;
    e.encode_field(&days_in_month)?;
    e.encode_field(&today_marker)
}

#[async_trait]
impl SimpleQueryHandler for RentcalHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(client, query, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RentcalQueryParser;

#[async_trait]
impl QueryParser for RentcalQueryParser {
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
        let schema = result_schema(stmt);
        Ok(match column_format {
            Some(format) => with_format(schema, format),
            None => schema,
        })
    }
}

#[async_trait]
impl ExtendedQueryHandler for RentcalHandler {
    type Statement = String;
    type QueryParser = RentcalQueryParser;

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
        let sql = bind_params(&portal.statement.statement, &portal.parameters);
        self.run(client, &sql, &portal.result_column_format)
            .await?
            .pop()
            .ok_or_else(|| user_error("XX000", "statement produced no response".into()))
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
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
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
        Ok(DescribePortalResponse::new(with_format(
            result_schema(&target.statement.statement),
            &target.result_column_format,
        )))
    }
}

/// Highest `$N` placeholder in `sql`, ignoring quoted literals.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_literal = !in_literal,
            b'$' if !in_literal => {
                let end = digits_end(bytes, i + 1);
                if let Ok(n) = sql[i + 1..end].parse::<usize>() {
                    max = max.max(n);
                }
            }
            _ => {}
        }
        i += 1;
    }
    max
}

fn digits_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    end
}

/// Inline bound text parameters as quoted literals in a single left to
/// right pass. Inlined values are never rescanned, so a value that itself
/// contains `$2` stays as written.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_literal = !in_literal,
            b'$' if !in_literal => {
                let end = digits_end(bytes, i + 1);
                let param = sql[i + 1..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|n| params.get(n));
                if let Some(param) = param {
                    out.push_str(&sql[copied..i]);
                    out.push_str(&sql_literal(param.as_ref().map(AsRef::as_ref)));
                    copied = end;
                    i = end;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    out.push_str(&sql[copied..]);
    out
}

fn sql_literal(value: Option<&[u8]>) -> String {
    match value {
        Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
        None => "NULL".to_string(),
    }
}

// ── Factory ──────────────────────────────────────────────────────

type AuthHandler = CleartextPasswordAuthStartupHandler<StaffAuthSource, DefaultServerParameterProvider>;

/// Handlers shared by every connection.
pub struct RentcalFactory {
    handler: Arc<RentcalHandler>,
    auth_handler: Arc<AuthHandler>,
    noop: Arc<NoopHandler>,
}

impl RentcalFactory {
    pub fn new(teams: Arc<TeamRegistry>, auth: StaffAuthSource) -> Self {
        Self {
            handler: Arc::new(RentcalHandler::new(teams)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth,
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RentcalFactory {
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

/// SQLSTATE for a store error.
fn engine_sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Conflict { .. } => "23P01",
        EngineError::NotFound(_) => "P0002",
        _ => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(engine_sqlstate(&e), e.to_string())
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
