use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

const CAR_COLUMNS: &[&str] = &["id", "name", "number_plate", "mileage", "status"];
const RESERVATION_COLUMNS: &[&str] = &[
    "id",
    "car_id",
    "start_date",
    "end_date",
    "customer_name",
    "customer_phone",
    "customer_email",
];

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertCar {
        id: Ulid,
        name: String,
        number_plate: Option<String>,
        mileage: Option<u32>,
        status: CarStatus,
    },
    UpdateCar {
        id: Ulid,
        changes: CarChanges,
    },
    DeleteCar {
        id: Ulid,
    },
    InsertReservation {
        id: Ulid,
        car_id: Ulid,
        range: DateRange,
        customer_name: String,
        customer_phone: String,
        customer_email: String,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectCars,
    SelectCarSummary,
    SelectReservations {
        car_id: Option<Ulid>,
        window: Option<DateRange>,
    },
    SelectMonthGrid {
        month: Day,
    },
    SelectTimeline {
        month: Day,
        today: Option<Day>,
    },
    SelectDisabledDays {
        car_id: Ulid,
    },
    SelectDailyReservations {
        window: DateRange,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
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
        } => parse_update(&table.relation, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── Writes ────────────────────────────────────────────────────

/// One VALUES row keyed by column name. Without a column list the table's
/// canonical column order applies.
struct Row<'a> {
    table: &'static str,
    values: HashMap<String, &'a Expr>,
}

impl<'a> Row<'a> {
    fn new(
        table: &'static str,
        canonical: &[&str],
        columns: &[ast::Ident],
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let names: Vec<String> = if columns.is_empty() {
            canonical.iter().map(|c| c.to_string()).collect()
        } else {
            columns.iter().map(|c| c.value.to_lowercase()).collect()
        };
        if names.len() != values.len() {
            return Err(SqlError::WrongArity(table, names.len(), values.len()));
        }
        if let Some(unknown) = names.iter().find(|n| !canonical.contains(&n.as_str())) {
            return Err(SqlError::InvalidField(unknown.clone(), format!("no such column in {table}")));
        }
        Ok(Self {
            table,
            values: names.into_iter().zip(values.iter()).collect(),
        })
    }

    fn optional(&self, column: &'static str) -> Option<&'a Expr> {
        self.values.get(column).copied()
    }

    fn required(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.optional(column)
            .ok_or(SqlError::MissingColumn(self.table, column))
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "cars" => {
            let row = Row::new("cars", CAR_COLUMNS, &insert.columns, values)?;
            Ok(Command::InsertCar {
                id: parse_ulid("id", row.required("id")?)?,
                name: parse_string("name", row.required("name")?)?,
                number_plate: row
                    .optional("number_plate")
                    .map(|e| parse_string_or_null("number_plate", e))
                    .transpose()?
                    .flatten(),
                mileage: row
                    .optional("mileage")
                    .map(|e| parse_u32_or_null("mileage", e))
                    .transpose()?
                    .flatten(),
                status: row
                    .optional("status")
                    .map(parse_status)
                    .transpose()?
                    .unwrap_or(CarStatus::Available),
            })
        }
        "reservations" => {
            let row = Row::new("reservations", RESERVATION_COLUMNS, &insert.columns, values)?;
            let from = parse_day("start_date", row.required("start_date")?)?;
            let to = parse_day("end_date", row.required("end_date")?)?;
            Ok(Command::InsertReservation {
                id: parse_ulid("id", row.required("id")?)?,
                car_id: parse_ulid("car_id", row.required("car_id")?)?,
                range: DateRange::new(from, to)
                    .map_err(|e| SqlError::InvalidField("end_date".into(), e.0))?,
                customer_name: parse_string("customer_name", row.required("customer_name")?)?,
                customer_phone: parse_string("customer_phone", row.required("customer_phone")?)?,
                customer_email: parse_string("customer_email", row.required("customer_email")?)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    if table != "cars" {
        return Err(SqlError::UnknownTable(table));
    }
    let id = extract_where_id(selection)?;

    let mut changes = CarChanges::default();
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        let value = &assignment.value;
        match column.as_str() {
            "name" => changes.name = Some(parse_string("name", value)?),
            "number_plate" => {
                changes.number_plate = Some(parse_string_or_null("number_plate", value)?)
            }
            "mileage" => changes.mileage = Some(parse_u32_or_null("mileage", value)?),
            "status" => changes.status = Some(parse_status(value)?),
            "id" => {
                return Err(SqlError::InvalidField("id".into(), "cannot be changed".into()));
            }
            other => {
                return Err(SqlError::InvalidField(other.into(), "no such column in cars".into()));
            }
        }
    }
    if changes == CarChanges::default() {
        return Err(SqlError::Parse("UPDATE without assignments".into()));
    }
    Ok(Command::UpdateCar { id, changes })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "cars" => Ok(Command::DeleteCar { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Reads ─────────────────────────────────────────────────────

/// Filters gathered from an AND-chain of comparisons.
#[derive(Default)]
struct Filters {
    car_id: Option<Ulid>,
    start_date: Option<Day>,
    end_date: Option<Day>,
    month: Option<Day>,
    today: Option<Day>,
}

impl Filters {
    /// Both bounds or neither.
    fn window(&self) -> Result<Option<DateRange>, SqlError> {
        match (self.start_date, self.end_date) {
            (None, None) => Ok(None),
            (Some(from), Some(to)) => DateRange::new(from, to)
                .map(Some)
                .map_err(|e| SqlError::InvalidField("end_date".into(), e.0)),
            (None, Some(_)) => Err(SqlError::MissingFilter("start_date")),
            (Some(_), None) => Err(SqlError::MissingFilter("end_date")),
        }
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let allowed = readable_filters(&table).ok_or_else(|| SqlError::UnknownTable(table.clone()))?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        extract_filters(selection, allowed, &mut filters)?;
    }

    match table.as_str() {
        "cars" => Ok(Command::SelectCars),
        "car_summary" => Ok(Command::SelectCarSummary),
        "reservations" => Ok(Command::SelectReservations {
            car_id: filters.car_id,
            window: filters.window()?,
        }),
        "month_grid" => Ok(Command::SelectMonthGrid {
            month: filters.month.ok_or(SqlError::MissingFilter("month"))?,
        }),
        "timeline" => Ok(Command::SelectTimeline {
            month: filters.month.ok_or(SqlError::MissingFilter("month"))?,
            today: filters.today,
        }),
        "disabled_days" => Ok(Command::SelectDisabledDays {
            car_id: filters.car_id.ok_or(SqlError::MissingFilter("car_id"))?,
        }),
        "daily_reservations" => Ok(Command::SelectDailyReservations {
            window: filters
                .window()?
                .ok_or(SqlError::MissingFilter("start_date"))?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Filter columns accepted per readable table. `None` for unknown tables.
fn readable_filters(table: &str) -> Option<&'static [&'static str]> {
    let allowed: &[&str] = match table {
        "cars" | "car_summary" => &[],
        "reservations" => &["car_id", "start_date", "end_date"],
        "month_grid" => &["month"],
        "timeline" => &["month", "today"],
        "disabled_days" => &["car_id"],
        "daily_reservations" => &["start_date", "end_date"],
        _ => return None,
    };
    Some(allowed)
}

/// Walk an AND-chain of `column op literal` comparisons. Anything else,
/// including OR and columns the table does not filter on, is rejected.
fn extract_filters(expr: &Expr, allowed: &[&str], filters: &mut Filters) -> Result<(), SqlError> {
    let unsupported = || SqlError::Unsupported(format!("filter {expr}"));
    match expr {
        Expr::Nested(inner) => extract_filters(inner, allowed, filters),
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            extract_filters(left, allowed, filters)?;
            extract_filters(right, allowed, filters)
        }
        Expr::BinaryOp { left, op, right } => {
            let column = expr_column_name(left).ok_or_else(unsupported)?;
            if !allowed.contains(&column.as_str()) {
                return Err(unsupported());
            }
            match (column.as_str(), op) {
                ("car_id", ast::BinaryOperator::Eq) => {
                    filters.car_id = Some(parse_ulid("car_id", right)?)
                }
                ("month", ast::BinaryOperator::Eq) => filters.month = Some(parse_month(right)?),
                ("today", ast::BinaryOperator::Eq) => {
                    filters.today = Some(parse_day("today", right)?)
                }
                ("start_date", ast::BinaryOperator::GtEq) => {
                    filters.start_date = Some(parse_day("start_date", right)?)
                }
                ("end_date", ast::BinaryOperator::LtEq) => {
                    filters.end_date = Some(parse_day("end_date", right)?)
                }
                _ => return Err(unsupported()),
            }
            Ok(())
        }
        _ => Err(unsupported()),
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

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
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

/// The single VALUES row of an INSERT.
fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid("id", right),
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

fn invalid(field: &str, msg: impl Into<String>) -> SqlError {
    SqlError::InvalidField(field.to_string(), msg.into())
}

/// Text of a literal, or `None` for NULL.
fn literal_text<'e>(field: &str, expr: &'e Expr) -> Result<Option<&'e str>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(Some(s)),
        Some(other) => Err(invalid(field, format!("unexpected literal {other}"))),
        None => Err(invalid(field, format!("expected a literal, got {expr}"))),
    }
}

fn parse_ulid(field: &str, expr: &Expr) -> Result<Ulid, SqlError> {
    let s = literal_text(field, expr)?.ok_or_else(|| invalid(field, "must not be NULL"))?;
    Ulid::from_string(s).map_err(|e| invalid(field, format!("bad ULID: {e}")))
}

fn parse_string_or_null(field: &str, expr: &Expr) -> Result<Option<String>, SqlError> {
    Ok(literal_text(field, expr)?.map(str::to_string))
}

fn parse_string(field: &str, expr: &Expr) -> Result<String, SqlError> {
    parse_string_or_null(field, expr)?.ok_or_else(|| invalid(field, "must not be NULL"))
}

fn parse_u32_or_null(field: &str, expr: &Expr) -> Result<Option<u32>, SqlError> {
    literal_text(field, expr)?
        .map(|s| s.parse::<u32>().map_err(|e| invalid(field, e.to_string())))
        .transpose()
}

fn parse_status(expr: &Expr) -> Result<CarStatus, SqlError> {
    let s = literal_text("status", expr)?.ok_or_else(|| invalid("status", "must not be NULL"))?;
    CarStatus::parse(s).ok_or_else(|| invalid("status", format!("unknown status {s:?}")))
}

/// Accepts `YYYY-MM-DD` and ISO-8601 date-times; the time of day is dropped.
pub fn parse_day_str(s: &str) -> Option<Day> {
    let s = s.trim();
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(day);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

fn parse_day(field: &str, expr: &Expr) -> Result<Day, SqlError> {
    let s = literal_text(field, expr)?.ok_or_else(|| invalid(field, "must not be NULL"))?;
    parse_day_str(s).ok_or_else(|| invalid(field, format!("bad date {s:?}")))
}

/// A day or a bare `YYYY-MM`, normalised to the first of the month.
fn parse_month(expr: &Expr) -> Result<Day, SqlError> {
    let s = literal_text("month", expr)?.ok_or_else(|| invalid("month", "must not be NULL"))?;
    parse_day_str(s)
        .or_else(|| parse_day_str(&format!("{s}-01")))
        .and_then(|d| d.with_day0(0))
        .ok_or_else(|| invalid("month", format!("bad month {s:?}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingColumn(&'static str, &'static str),
    InvalidField(String, String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingColumn(t, col) => write!(f, "{t}: missing column {col}"),
            SqlError::InvalidField(col, msg) => write!(f, "invalid {col}: {msg}"),
        }
    }
}

impl std::error::Error for SqlError {}
