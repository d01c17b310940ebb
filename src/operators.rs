//! Operator semantics: arity, relative date arithmetic and the predicate
//! template for every (value kind, operator) pair.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use sea_query::{Alias, Cond, Expr, Func, LikeExpr, SimpleExpr};
use serde::{Serialize, Serializer};

use crate::model::ValueKind;
use crate::storage::Dialect;

/// Every operator a filter clause may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    Open,
    Closed,
    Absent,
    Any,
    GreaterOrEqual,
    LessOrEqual,
    Between,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Today,
    Yesterday,
    Tomorrow,
    ThisWeek,
    LastWeek,
    LastTwoWeeks,
    NextWeek,
    ThisMonth,
    LastMonth,
    NextMonth,
    ThisYear,
    /// `>t-`: within the last N days.
    LessThanDaysAgo,
    /// `<t-`: N or more days ago.
    MoreThanDaysAgo,
    /// `t-`: exactly N days ago.
    DaysAgo,
    /// `><t-`: from N days ago through today.
    PastDays,
    /// `>t+`: N or more days ahead.
    InMoreThanDays,
    /// `<t+`: from today through N days ahead.
    InLessThanDays,
    /// `t+`: exactly N days ahead.
    InDays,
    /// `><t+`: from today through N days ahead.
    NextDays,
    RelatedToProject,
    RelatedOutsideProject,
    NotRelatedToProject,
    AnyOpen,
    NoneOpen,
}

/// Number of values an operator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Zero,
    One,
    Two,
    Many,
}

const ALL: [Operator; 37] = [
    Operator::Equals,
    Operator::NotEquals,
    Operator::Open,
    Operator::Closed,
    Operator::Absent,
    Operator::Any,
    Operator::GreaterOrEqual,
    Operator::LessOrEqual,
    Operator::Between,
    Operator::Contains,
    Operator::NotContains,
    Operator::StartsWith,
    Operator::EndsWith,
    Operator::Today,
    Operator::Yesterday,
    Operator::Tomorrow,
    Operator::ThisWeek,
    Operator::LastWeek,
    Operator::LastTwoWeeks,
    Operator::NextWeek,
    Operator::ThisMonth,
    Operator::LastMonth,
    Operator::NextMonth,
    Operator::ThisYear,
    Operator::LessThanDaysAgo,
    Operator::MoreThanDaysAgo,
    Operator::DaysAgo,
    Operator::PastDays,
    Operator::InMoreThanDays,
    Operator::InLessThanDays,
    Operator::InDays,
    Operator::NextDays,
    Operator::RelatedToProject,
    Operator::RelatedOutsideProject,
    Operator::NotRelatedToProject,
    Operator::AnyOpen,
    Operator::NoneOpen,
];

impl Operator {
    pub fn all() -> &'static [Operator] {
        &ALL
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!",
            Operator::Open => "o",
            Operator::Closed => "c",
            Operator::Absent => "!*",
            Operator::Any => "*",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::Between => "><",
            Operator::Contains => "~",
            Operator::NotContains => "!~",
            Operator::StartsWith => "^",
            Operator::EndsWith => "$",
            Operator::Today => "t",
            Operator::Yesterday => "ld",
            Operator::Tomorrow => "nd",
            Operator::ThisWeek => "w",
            Operator::LastWeek => "lw",
            Operator::LastTwoWeeks => "l2w",
            Operator::NextWeek => "nw",
            Operator::ThisMonth => "m",
            Operator::LastMonth => "lm",
            Operator::NextMonth => "nm",
            Operator::ThisYear => "y",
            Operator::LessThanDaysAgo => ">t-",
            Operator::MoreThanDaysAgo => "<t-",
            Operator::DaysAgo => "t-",
            Operator::PastDays => "><t-",
            Operator::InMoreThanDays => ">t+",
            Operator::InLessThanDays => "<t+",
            Operator::InDays => "t+",
            Operator::NextDays => "><t+",
            Operator::RelatedToProject => "=p",
            Operator::RelatedOutsideProject => "=!p",
            Operator::NotRelatedToProject => "!p",
            Operator::AnyOpen => "*o",
            Operator::NoneOpen => "!o",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        ALL.iter().copied().find(|op| op.symbol() == symbol)
    }

    pub fn arity(self) -> Arity {
        match self {
            Operator::Equals | Operator::NotEquals => Arity::Many,
            Operator::Between => Arity::Two,
            Operator::GreaterOrEqual
            | Operator::LessOrEqual
            | Operator::Contains
            | Operator::NotContains
            | Operator::StartsWith
            | Operator::EndsWith
            | Operator::LessThanDaysAgo
            | Operator::MoreThanDaysAgo
            | Operator::DaysAgo
            | Operator::PastDays
            | Operator::InMoreThanDays
            | Operator::InLessThanDays
            | Operator::InDays
            | Operator::NextDays
            | Operator::RelatedToProject
            | Operator::RelatedOutsideProject
            | Operator::NotRelatedToProject => Arity::One,
            _ => Arity::Zero,
        }
    }

    /// Operators whose single value is a day count.
    pub fn takes_day_count(self) -> bool {
        matches!(
            self,
            Operator::LessThanDaysAgo
                | Operator::MoreThanDaysAgo
                | Operator::DaysAgo
                | Operator::PastDays
                | Operator::InMoreThanDays
                | Operator::InLessThanDays
                | Operator::InDays
                | Operator::NextDays
        )
    }

    /// Negative operators, used to combine both directions of symmetric relations.
    pub fn is_negative(self) -> bool {
        matches!(
            self,
            Operator::NotEquals | Operator::Absent | Operator::NotRelatedToProject | Operator::NoneOpen
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

/// Inclusive calendar day range; an open side is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn shift(day: NaiveDate, days: i64) -> Option<NaiveDate> {
    TimeDelta::try_days(days).and_then(|d| day.checked_add_signed(d))
}

fn offsets(today: NaiveDate, from: Option<i64>, to: Option<i64>) -> Option<DayRange> {
    let from = match from {
        Some(n) => Some(shift(today, n)?),
        None => None,
    };
    let to = match to {
        Some(n) => Some(shift(today, n)?),
        None => None,
    };
    Some(DayRange { from, to })
}

/// Day range of a relative operator. `None` when the operator is not
/// relative or the offset leaves the calendar.
pub fn relative_range(
    op: Operator,
    today: NaiveDate,
    first_day_of_week: u8,
    days: Option<i64>,
) -> Option<DayRange> {
    let cwday = i64::from(today.weekday().number_from_monday());
    let days_ago = (cwday + 7 - i64::from(first_day_of_week)) % 7;
    let month_start = today.with_day(1)?;
    match op {
        Operator::Today => offsets(today, Some(0), Some(0)),
        Operator::Yesterday => offsets(today, Some(-1), Some(-1)),
        Operator::Tomorrow => offsets(today, Some(1), Some(1)),
        Operator::ThisWeek => offsets(today, Some(-days_ago), Some(-days_ago + 6)),
        Operator::LastWeek => offsets(today, Some(-days_ago - 7), Some(-days_ago - 1)),
        Operator::LastTwoWeeks => offsets(today, Some(-days_ago - 14), Some(-days_ago - 1)),
        Operator::NextWeek => offsets(today, Some(-days_ago + 7), Some(-days_ago + 13)),
        Operator::ThisMonth => Some(DayRange {
            from: Some(month_start),
            to: month_start.checked_add_months(Months::new(1))?.pred_opt(),
        }),
        Operator::LastMonth => Some(DayRange {
            from: month_start.checked_sub_months(Months::new(1)),
            to: month_start.pred_opt(),
        }),
        Operator::NextMonth => Some(DayRange {
            from: month_start.checked_add_months(Months::new(1)),
            to: month_start.checked_add_months(Months::new(2))?.pred_opt(),
        }),
        Operator::ThisYear => Some(DayRange {
            from: NaiveDate::from_ymd_opt(today.year(), 1, 1),
            to: NaiveDate::from_ymd_opt(today.year(), 12, 31),
        }),
        Operator::LessThanDaysAgo | Operator::PastDays => {
            offsets(today, Some(days?.checked_neg()?), Some(0))
        }
        Operator::MoreThanDaysAgo => offsets(today, None, Some(days?.checked_neg()?)),
        Operator::DaysAgo => {
            let n = days?.checked_neg()?;
            offsets(today, Some(n), Some(n))
        }
        Operator::InMoreThanDays => offsets(today, Some(days?), None),
        Operator::InLessThanDays | Operator::NextDays => offsets(today, Some(0), Some(days?)),
        Operator::InDays => {
            let n = days?;
            offsets(today, Some(n), Some(n))
        }
        _ => None,
    }
}

/// Where an operand's values live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueStorage {
    /// A typed column on an entity table.
    Native,
    /// Text in the custom value store, cast on comparison.
    Text,
}

/// How filter values are bound against an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Integer,
    Text,
    Boolean,
}

/// A column a filter applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub table: String,
    pub column: String,
    pub kind: ValueKind,
    pub storage: ValueStorage,
    pub binding: Binding,
}

impl Operand {
    pub fn native(table: &str, column: &str, kind: ValueKind) -> Self {
        let binding = match kind {
            ValueKind::String | ValueKind::Text | ValueKind::Date | ValueKind::DateTime => {
                Binding::Text
            }
            ValueKind::Boolean => Binding::Boolean,
            _ => Binding::Integer,
        };
        Self {
            table: table.to_string(),
            column: column.to_string(),
            kind,
            storage: ValueStorage::Native,
            binding,
        }
    }

    /// The `value` column of a custom value row.
    pub fn custom_value(alias: &str, kind: ValueKind) -> Self {
        Self {
            table: alias.to_string(),
            column: "value".to_string(),
            kind,
            storage: ValueStorage::Text,
            binding: Binding::Text,
        }
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    pub fn col(&self) -> Expr {
        Expr::col((Alias::new(&self.table), Alias::new(&self.column)))
    }

    fn quoted(&self) -> String {
        format!(r#""{}"."{}""#, self.table, self.column)
    }

    fn is_text_storage(&self) -> bool {
        self.storage == ValueStorage::Text
    }

    pub fn bind(&self, value: &str) -> Option<SimpleExpr> {
        match self.binding {
            Binding::Integer => value.trim().parse::<i64>().ok().map(Into::into),
            Binding::Text => Some(value.into()),
            Binding::Boolean => match value.trim() {
                "1" | "true" => Some(true.into()),
                "0" | "false" => Some(false.into()),
                _ => None,
            },
        }
    }

    fn bind_all(&self, values: &[String]) -> Vec<SimpleExpr> {
        values.iter().filter_map(|v| self.bind(v)).collect()
    }

    /// Numeric view of the operand; text storage is cast and non-numeric
    /// text becomes NULL so comparisons never match it.
    pub fn numeric(&self, dialect: Dialect) -> Expr {
        if !self.is_text_storage() {
            return self.col();
        }
        let col = self.quoted();
        let sql = match dialect {
            Dialect::Postgres => format!(
                "CASE WHEN {col} ~ '^-?[0-9]+(\\.[0-9]+)?$' THEN CAST({col} AS decimal(30,3)) END"
            ),
            // GLOB has no optional groups: strip one leading '-', then
            // digits with at most one inner '.'
            Dialect::Sqlite => {
                let unsigned = format!("(CASE WHEN {col} GLOB '-*' THEN substr({col}, 2) ELSE {col} END)");
                format!(
                    "CASE WHEN {unsigned} GLOB '[0-9]*' AND {unsigned} NOT GLOB '*[^0-9.]*' \
                     AND {unsigned} NOT GLOB '*.*.*' AND {unsigned} NOT GLOB '*.' \
                     THEN CAST({col} AS REAL) END"
                )
            }
        };
        Expr::expr(Expr::cust(sql))
    }
}

/// Calendar inputs for date operators, fixed for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct DateEnv {
    pub today: NaiveDate,
    pub first_day_of_week: u8,
    pub actor_tz: Tz,
    pub storage_tz: Tz,
}

/// One side of a date range: a calendar day or an exact instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Day(NaiveDate),
    /// Already expressed in the storage time zone.
    Instant(NaiveDateTime),
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Parses `YYYY-MM-DDTHH:MM:SS` with an optional `Z` or offset.
pub fn parse_timestamp(value: &str, env: &DateEnv) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&env.storage_tz).naive_local());
    }
    let local = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()?;
    Some(to_storage(local, env))
}

fn to_storage(local: NaiveDateTime, env: &DateEnv) -> NaiveDateTime {
    match env.actor_tz.from_local_datetime(&local).earliest() {
        Some(dt) => dt.with_timezone(&env.storage_tz).naive_local(),
        None => local,
    }
}

fn parse_bound(value: &str, kind: ValueKind, env: &DateEnv) -> Option<Bound> {
    if let Some(day) = parse_date(value) {
        return Some(Bound::Day(day));
    }
    if kind == ValueKind::DateTime {
        return parse_timestamp(value, env).map(Bound::Instant);
    }
    None
}

fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}

fn always_false() -> SimpleExpr {
    Expr::val(1).eq(0)
}

fn always_true() -> SimpleExpr {
    Expr::val(1).eq(1)
}

/// Builds `col > from-1 23:59:59 AND col <= to 23:59:59`, with day
/// boundaries resolved in the actor's zone for timestamp columns.
fn date_clause(
    operand: &Operand,
    from: Option<Bound>,
    to: Option<Bound>,
    env: &DateEnv,
) -> SimpleExpr {
    let boundary = |day: NaiveDate| -> SimpleExpr {
        let end = end_of_day(day);
        let end = match (operand.kind, operand.storage) {
            (ValueKind::DateTime, ValueStorage::Native) => to_storage(end, env),
            _ => end,
        };
        if operand.is_text_storage() {
            end.format("%Y-%m-%d %H:%M:%S").to_string().into()
        } else {
            end.into()
        }
    };
    let instant = |at: NaiveDateTime| -> SimpleExpr {
        if operand.is_text_storage() {
            at.format("%Y-%m-%d %H:%M:%S").to_string().into()
        } else {
            at.into()
        }
    };

    let mut cond = Cond::all();
    match from {
        Some(Bound::Day(day)) => match day.pred_opt() {
            Some(prev) => cond = cond.add(operand.col().gt(boundary(prev))),
            None => cond = cond.add(operand.col().is_not_null()),
        },
        Some(Bound::Instant(at)) => cond = cond.add(operand.col().gte(instant(at))),
        None => {}
    }
    match to {
        Some(Bound::Day(day)) => cond = cond.add(operand.col().lte(boundary(day))),
        Some(Bound::Instant(at)) => cond = cond.add(operand.col().lte(instant(at))),
        None => {}
    }
    if cond.is_empty() {
        return always_false();
    }
    cond.into()
}

fn day_range_clause(operand: &Operand, range: Option<DayRange>, env: &DateEnv) -> SimpleExpr {
    match range {
        Some(r) => date_clause(operand, r.from.map(Bound::Day), r.to.map(Bound::Day), env),
        None => always_false(),
    }
}

/// Escapes `\`, `%` and `_` for a LIKE pattern using `\` as escape.
pub fn escape_like_wildcards(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// SQLite's `LOWER()` folds ASCII only, so the needle must be folded the same way.
fn like_pattern(op: Operator, needle: &str, dialect: Dialect) -> LikeExpr {
    let folded = match dialect {
        Dialect::Postgres => needle.to_lowercase(),
        Dialect::Sqlite => needle.to_ascii_lowercase(),
    };
    let needle = escape_like_wildcards(&folded);
    let pattern = match op {
        Operator::StartsWith => format!("{needle}%"),
        Operator::EndsWith => format!("%{needle}"),
        _ => format!("%{needle}%"),
    };
    LikeExpr::new(pattern).escape('\\')
}

fn is_blank_capable(operand: &Operand) -> bool {
    operand.is_text_storage() || matches!(operand.kind, ValueKind::String | ValueKind::Text)
}

fn first_f64(values: &[String], idx: usize) -> Option<f64> {
    values.get(idx)?.trim().parse::<f64>().ok()
}

fn numeric_value(operand: &Operand, value: f64) -> SimpleExpr {
    if operand.kind == ValueKind::Integer && value.fract() == 0.0 && !operand.is_text_storage() {
        (value as i64).into()
    } else {
        value.into()
    }
}

/// Predicate template for a plain column. `values` have already been
/// validated for the operator's arity and the operand's kind.
pub fn field_condition(
    op: Operator,
    values: &[String],
    operand: &Operand,
    env: &DateEnv,
    dialect: Dialect,
) -> SimpleExpr {
    let kind = operand.kind;
    match op {
        Operator::Equals => {
            if values.is_empty() {
                return always_false();
            }
            if kind.is_date() {
                let bound = parse_bound(&values[0], kind, env);
                return match bound {
                    Some(Bound::Instant(at)) => date_clause(
                        operand,
                        Some(Bound::Instant(at)),
                        Some(Bound::Instant(at)),
                        env,
                    ),
                    Some(day) => date_clause(operand, Some(day), Some(day), env),
                    None => always_false(),
                };
            }
            match kind {
                ValueKind::Float => match first_f64(values, 0) {
                    Some(v) => operand
                        .numeric(dialect)
                        .between(v - 1e-5, v + 1e-5),
                    None => always_false(),
                },
                ValueKind::Integer if operand.is_text_storage() => {
                    let numbers: Vec<f64> = values
                        .iter()
                        .filter_map(|v| v.trim().parse::<f64>().ok())
                        .collect();
                    if numbers.is_empty() {
                        always_false()
                    } else {
                        operand.numeric(dialect).is_in(numbers)
                    }
                }
                _ => {
                    let bound = operand.bind_all(values);
                    if bound.is_empty() {
                        always_false()
                    } else {
                        operand.col().is_in(bound)
                    }
                }
            }
        }
        Operator::NotEquals => {
            let bound = operand.bind_all(values);
            if bound.is_empty() {
                return always_true();
            }
            Cond::any()
                .add(operand.col().is_null())
                .add(operand.col().is_not_in(bound))
                .into()
        }
        Operator::Absent => {
            let mut cond = Cond::any().add(operand.col().is_null());
            if is_blank_capable(operand) {
                cond = cond.add(operand.col().eq(""));
            }
            cond.into()
        }
        Operator::Any => {
            let mut cond = Cond::all().add(operand.col().is_not_null());
            if is_blank_capable(operand) {
                cond = cond.add(operand.col().ne(""));
            }
            cond.into()
        }
        Operator::GreaterOrEqual | Operator::LessOrEqual | Operator::Between if kind.is_date() => {
            let first = values.first().and_then(|v| parse_bound(v, kind, env));
            let (from, to) = match op {
                Operator::GreaterOrEqual => (first, None),
                Operator::LessOrEqual => (None, first),
                _ => (
                    first,
                    values.get(1).and_then(|v| parse_bound(v, kind, env)),
                ),
            };
            if from.is_none() && to.is_none() {
                return always_false();
            }
            date_clause(operand, from, to, env)
        }
        Operator::GreaterOrEqual => match first_f64(values, 0) {
            Some(v) => operand.numeric(dialect).gte(numeric_value(operand, v)),
            None => always_false(),
        },
        Operator::LessOrEqual => match first_f64(values, 0) {
            Some(v) => operand.numeric(dialect).lte(numeric_value(operand, v)),
            None => always_false(),
        },
        Operator::Between => match (first_f64(values, 0), first_f64(values, 1)) {
            (Some(a), Some(b)) => operand
                .numeric(dialect)
                .between(numeric_value(operand, a), numeric_value(operand, b)),
            _ => always_false(),
        },
        Operator::Contains | Operator::StartsWith | Operator::EndsWith => match values.first() {
            Some(needle) => Expr::expr(Func::lower(operand.col())).like(like_pattern(op, needle, dialect)),
            None => always_false(),
        },
        Operator::NotContains => match values.first() {
            Some(needle) => Cond::any()
                .add(operand.col().is_null())
                .add(Expr::expr(Func::lower(operand.col())).not_like(like_pattern(op, needle, dialect)))
                .into(),
            None => always_true(),
        },
        op if op.takes_day_count() => {
            let days = values.first().and_then(|v| v.trim().parse::<i64>().ok());
            day_range_clause(
                operand,
                relative_range(op, env.today, env.first_day_of_week, days),
                env,
            )
        }
        Operator::Today
        | Operator::Yesterday
        | Operator::Tomorrow
        | Operator::ThisWeek
        | Operator::LastWeek
        | Operator::LastTwoWeeks
        | Operator::NextWeek
        | Operator::ThisMonth
        | Operator::LastMonth
        | Operator::NextMonth
        | Operator::ThisYear => day_range_clause(
            operand,
            relative_range(op, env.today, env.first_day_of_week, None),
            env,
        ),
        // status and relation operators are compiled by their own targets
        _ => always_false(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::storage::{Cell, SqliteStorage, Storage};
    use sea_query::{PostgresQueryBuilder, Query};

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn env(today: &str) -> DateEnv {
        DateEnv {
            today: day(today),
            first_day_of_week: 1,
            actor_tz: Tz::UTC,
            storage_tz: Tz::UTC,
        }
    }

    fn sql(expr: SimpleExpr) -> String {
        Query::select()
            .expr(Expr::val(1))
            .and_where(expr)
            .to_string(PostgresQueryBuilder)
    }

    /// Values of `rows` that `expr` keeps, run on SQLite.
    fn sqlite_matches(expr: SimpleExpr, rows: &[&str]) -> Vec<String> {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.execute_batch("CREATE TABLE t (value TEXT);").unwrap();
        for row in rows {
            storage
                .connection()
                .execute("INSERT INTO t (value) VALUES (?1)", [*row])
                .unwrap();
        }
        let mut select = Query::select();
        select
            .column((Alias::new("t"), Alias::new("value")))
            .from(Alias::new("t"))
            .and_where(expr);
        storage
            .fetch_rows(&select)
            .unwrap()
            .into_iter()
            .map(|row| match &row[0] {
                Cell::Text(s) => s.clone(),
                other => format!("{other:?}"),
            })
            .collect()
    }

    fn range(from: &str, to: &str) -> DayRange {
        DayRange {
            from: Some(day(from)),
            to: Some(day(to)),
        }
    }

    #[test]
    fn symbols_round_trip() {
        for op in Operator::all() {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(*op));
        }
        assert_eq!(Operator::from_symbol("=="), None);
    }

    #[test]
    fn arities() {
        assert_eq!(Operator::Between.arity(), Arity::Two);
        assert_eq!(Operator::Equals.arity(), Arity::Many);
        assert_eq!(Operator::InDays.arity(), Arity::One);
        assert_eq!(Operator::Today.arity(), Arity::Zero);
        assert_eq!(Operator::NoneOpen.arity(), Arity::Zero);
    }

    #[test]
    fn relative_days() {
        // 2011-07-10 is a Sunday
        let today = day("2011-07-10");
        assert_eq!(
            relative_range(Operator::LessThanDaysAgo, today, 1, Some(3)),
            Some(range("2011-07-07", "2011-07-10"))
        );
        assert_eq!(
            relative_range(Operator::MoreThanDaysAgo, today, 1, Some(3)),
            Some(DayRange {
                from: None,
                to: Some(day("2011-07-07"))
            })
        );
        assert_eq!(
            relative_range(Operator::DaysAgo, today, 1, Some(3)),
            Some(range("2011-07-07", "2011-07-07"))
        );
        assert_eq!(
            relative_range(Operator::InMoreThanDays, today, 1, Some(2)),
            Some(DayRange {
                from: Some(day("2011-07-12")),
                to: None
            })
        );
        assert_eq!(
            relative_range(Operator::NextDays, today, 1, Some(2)),
            Some(range("2011-07-10", "2011-07-12"))
        );
        assert_eq!(relative_range(Operator::InDays, today, 1, None), None);
    }

    #[test]
    fn in_zero_days_is_today() {
        let today = day("2012-02-29");
        assert_eq!(
            relative_range(Operator::InDays, today, 1, Some(0)),
            relative_range(Operator::Today, today, 1, None)
        );
    }

    #[test]
    fn weeks_follow_first_day_of_week() {
        let today = day("2011-07-10");
        assert_eq!(
            relative_range(Operator::ThisWeek, today, 1, None),
            Some(range("2011-07-04", "2011-07-10"))
        );
        assert_eq!(
            relative_range(Operator::ThisWeek, today, 7, None),
            Some(range("2011-07-10", "2011-07-16"))
        );
        assert_eq!(
            relative_range(Operator::LastWeek, today, 1, None),
            Some(range("2011-06-27", "2011-07-03"))
        );
        assert_eq!(
            relative_range(Operator::LastTwoWeeks, today, 1, None),
            Some(range("2011-06-20", "2011-07-03"))
        );
        assert_eq!(
            relative_range(Operator::NextWeek, today, 1, None),
            Some(range("2011-07-11", "2011-07-17"))
        );
    }

    #[test]
    fn months_and_years() {
        let today = day("2012-03-31");
        assert_eq!(
            relative_range(Operator::ThisMonth, today, 1, None),
            Some(range("2012-03-01", "2012-03-31"))
        );
        assert_eq!(
            relative_range(Operator::LastMonth, today, 1, None),
            Some(range("2012-02-01", "2012-02-29"))
        );
        assert_eq!(
            relative_range(Operator::NextMonth, today, 1, None),
            Some(range("2012-04-01", "2012-04-30"))
        );
        assert_eq!(
            relative_range(Operator::ThisYear, today, 1, None),
            Some(range("2012-01-01", "2012-12-31"))
        );
    }

    #[test]
    fn huge_offsets_fail_closed() {
        let today = day("2011-07-10");
        assert_eq!(
            relative_range(Operator::InDays, today, 1, Some(i64::MAX)),
            None
        );
        let due = Operand::native("issues", "due_date", ValueKind::Date);
        let expr = field_condition(
            Operator::InDays,
            &["99999999999999".to_string()],
            &due,
            &env("2011-07-10"),
            Dialect::Postgres,
        );
        assert_eq!(expr, Expr::val(1).eq(0));
    }

    #[test]
    fn date_equals_is_half_open_day() {
        let due = Operand::native("issues", "due_date", ValueKind::Date);
        let expr = field_condition(
            Operator::Equals,
            &["2011-07-10".to_string()],
            &due,
            &env("2011-07-10"),
            Dialect::Postgres,
        );
        let sql = sql(expr);
        assert!(sql.contains(r#""issues"."due_date" > '2011-07-09 23:59:59"#), "{sql}");
        assert!(sql.contains(r#""issues"."due_date" <= '2011-07-10 23:59:59"#), "{sql}");
    }

    #[test]
    fn timestamp_boundaries_use_actor_zone() {
        let updated = Operand::native("issues", "updated_on", ValueKind::DateTime);
        let env = DateEnv {
            actor_tz: chrono_tz::Asia::Tokyo,
            ..env("2011-07-10")
        };
        let sql = sql(field_condition(
            Operator::Equals,
            &["2011-07-10".to_string()],
            &updated,
            &env,
            Dialect::Postgres,
        ));
        // Tokyo is UTC+9
        assert!(sql.contains("> '2011-07-09 14:59:59"), "{sql}");
        assert!(sql.contains("<= '2011-07-10 14:59:59"), "{sql}");
    }

    #[test]
    fn timestamps_are_literal_instants() {
        let updated = Operand::native("issues", "updated_on", ValueKind::DateTime);
        let sql = sql(field_condition(
            Operator::GreaterOrEqual,
            &["2011-07-10T19:13:52Z".to_string()],
            &updated,
            &env("2011-07-10"),
            Dialect::Postgres,
        ));
        assert!(sql.contains(r#""issues"."updated_on" >= '2011-07-10 19:13:52"#), "{sql}");
    }

    #[test]
    fn custom_value_dates_compare_as_text() {
        let cv = Operand::custom_value("cv_1", ValueKind::Date);
        let expr = field_condition(
            Operator::LessOrEqual,
            &["2011-07-10".to_string()],
            &cv,
            &env("2011-07-10"),
            Dialect::Sqlite,
        );
        assert_eq!(
            expr,
            Cond::all()
                .add(cv.col().lte("2011-07-10 23:59:59"))
                .into()
        );
    }

    #[test]
    fn contains_is_lowercased_and_escaped() {
        let subject = Operand::native("issues", "subject", ValueKind::String);
        let expr = field_condition(
            Operator::Contains,
            &["100%_Done".to_string()],
            &subject,
            &env("2011-07-10"),
            Dialect::Postgres,
        );
        let stmt = Query::select().expr(Expr::val(1)).and_where(expr).to_owned();
        let (sql, values) = Dialect::Postgres.build(&stmt);
        assert!(sql.contains(r#"LOWER("issues"."subject") LIKE $"#), "{sql}");
        assert!(sql.contains("ESCAPE"), "{sql}");
        assert!(values
            .0
            .contains(&sea_query::Value::from(r"%100\%\_done%".to_string())));
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello"), "hello");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
    }

    #[test]
    fn list_membership() {
        let status = Operand::native("issues", "status_id", ValueKind::List);
        let e = env("2011-07-10");
        assert_eq!(
            field_condition(Operator::Equals, &[], &status, &e, Dialect::Postgres),
            Expr::val(1).eq(0)
        );
        assert_eq!(
            field_condition(Operator::NotEquals, &[], &status, &e, Dialect::Postgres),
            Expr::val(1).eq(1)
        );
        let sql = sql(field_condition(
            Operator::NotEquals,
            &["1".to_string(), "2".to_string()],
            &status,
            &e,
            Dialect::Postgres,
        ));
        assert!(
            sql.contains(r#""issues"."status_id" IS NULL OR "issues"."status_id" NOT IN (1, 2)"#),
            "{sql}"
        );
    }

    #[test]
    fn float_equality_has_tolerance() {
        let hours = Operand::native("issues", "estimated_hours", ValueKind::Float);
        let sql = sql(field_condition(
            Operator::Equals,
            &["5.5".to_string()],
            &hours,
            &env("2011-07-10"),
            Dialect::Postgres,
        ));
        assert!(sql.contains(r#""issues"."estimated_hours" BETWEEN 5.4999"#), "{sql}");
    }

    #[test]
    fn numeric_custom_values_are_guarded() {
        let cv = Operand::custom_value("cv_2", ValueKind::Integer);
        let sql = sql(field_condition(
            Operator::GreaterOrEqual,
            &["3".to_string()],
            &cv,
            &env("2011-07-10"),
            Dialect::Postgres,
        ));
        assert!(sql.contains(r#"CASE WHEN "cv_2"."value" ~"#), "{sql}");
        assert!(sql.contains("decimal(30,3)"), "{sql}");
    }

    #[test]
    fn blanks_count_as_absent_for_text() {
        let cv = Operand::custom_value("cv_3", ValueKind::List);
        let sql = sql(field_condition(
            Operator::Absent,
            &[],
            &cv,
            &env("2011-07-10"),
            Dialect::Postgres,
        ));
        assert!(sql.contains(r#""cv_3"."value" IS NULL OR "cv_3"."value" = ''"#), "{sql}");
    }

    #[test]
    fn sqlite_numeric_comparison_skips_malformed_text() {
        let operand = Operand::custom_value("t", ValueKind::Integer);
        let rows = ["5", "1.2.3", "7-", "--9", "abc", "-3.5", "2.", ".4", "1-2", ""];
        let expr = field_condition(
            Operator::GreaterOrEqual,
            &["1".to_string()],
            &operand,
            &env("2011-07-10"),
            Dialect::Sqlite,
        );
        assert_eq!(sqlite_matches(expr, &rows), vec!["5"]);

        let expr = field_condition(
            Operator::LessOrEqual,
            &["0".to_string()],
            &operand,
            &env("2011-07-10"),
            Dialect::Sqlite,
        );
        assert_eq!(sqlite_matches(expr, &rows), vec!["-3.5"]);
    }

    #[test]
    fn sqlite_contains_matches_non_ascii_text() {
        let subject = Operand::native("t", "value", ValueKind::String);
        let rows = ["Éclair recipe", "plain", "CRÈME brûlée"];
        let contains = |needle: &str| {
            field_condition(
                Operator::Contains,
                &[needle.to_string()],
                &subject,
                &env("2011-07-10"),
                Dialect::Sqlite,
            )
        };
        assert_eq!(sqlite_matches(contains("Éclair"), &rows), vec!["Éclair recipe"]);
        assert_eq!(sqlite_matches(contains("crÈme"), &rows), vec!["CRÈME brûlée"]);
        assert_eq!(sqlite_matches(contains("brûlée"), &rows), vec!["CRÈME brûlée"]);
    }
}
