//! Result paging engine (component L): turns a parsed [`Request`] into one
//! or more upstream [`StoreQuery`] calls, following `StorePage::continuation`
//! until each matched point's series is exhausted, and projects the
//! accumulated rows into the column-major shape [`ResultSet`] wants.
//!
//! `COUNT(*)` never materializes a row: it sums `page.rows.len()` across
//! pages directly, so a count query never hydrates rows it will only
//! discard.
//!
//! `BOT`/`EOT` are driver-level sentinels for "beginning/end of time" —
//! the epoch and a far-future date respectively — rather than a value the
//! upstream store defines; this mirrors how the grammar treats them as
//! plain zero-argument value keywords rather than store-side functions.

use chrono::{DateTime, TimeZone, Utc};
use regex::{escape, Regex};
use uuid::Uuid;

use crate::sql::column::{Column, Table};
use crate::sql::error::{Result, SqlError};
use crate::sql::pointcache::PointCache;
use crate::sql::request::{ParamValue, PointOp, PointSelector, Request, TimeOp, ValueToken};
use crate::sql::session::{PointValue, StoreQuery, StoreSession, TimeSelector};
use crate::sql::value::Value;

pub enum QueryOutcome {
    Rows(Vec<Vec<Value>>),
    Count(u64),
}

pub fn execute_select(
    request: &Request,
    cache: &PointCache,
    session: &mut dyn StoreSession,
) -> Result<QueryOutcome> {
    let query_extra = request
        .query
        .as_ref()
        .ok_or(SqlError::UnexpectedEnd)?;
    let counting = query_extra.columns == [Column::Count];

    match request.table {
        Table::Points => execute_points_select(request, cache, session, counting),
        Table::Archive => execute_archive_select(request, cache, session, counting),
    }
}

// ---- POINTS -------------------------------------------------------------

pub(crate) fn matching_points(
    request: &Request,
    cache: &PointCache,
    session: &mut dyn StoreSession,
) -> Result<Vec<(String, Uuid)>> {
    match &request.point_selector {
        None => session.get_point_bindings(&[]),
        Some(PointSelector::Uuid(token)) => {
            let uuid = resolve_uuid(request, token)?;
            Ok(cache
                .name_for(uuid)
                .map(|name| vec![(name, uuid)])
                .unwrap_or_default())
        }
        Some(PointSelector::Point(op, token)) | Some(PointSelector::Name(op, token)) => {
            match op {
                PointOp::Eq => {
                    let name = resolve_text(request, token)?;
                    match cache.resolve(session, &name)? {
                        Some(uuid) => Ok(vec![(name, uuid)]),
                        None => Ok(Vec::new()),
                    }
                }
                PointOp::Like | PointOp::Regexp => {
                    let pattern = resolve_text(request, token)?;
                    let regex = compile_pattern(*op, &pattern)?;
                    let all = session.get_point_bindings(&[])?;
                    for (name, uuid) in &all {
                        cache.register(name, *uuid);
                    }
                    Ok(all.into_iter().filter(|(n, _)| regex.is_match(n)).collect())
                }
            }
        }
    }
}

fn execute_points_select(
    request: &Request,
    cache: &PointCache,
    session: &mut dyn StoreSession,
    counting: bool,
) -> Result<QueryOutcome> {
    let matches = matching_points(request, cache, session)?;
    if counting {
        return Ok(QueryOutcome::Count(matches.len() as u64));
    }
    let columns = &request.query.as_ref().unwrap().columns;
    let mut rows = Vec::with_capacity(matches.len());
    for (name, uuid) in matches {
        let mut row = Vec::with_capacity(columns.len());
        for column in columns {
            row.push(match column {
                Column::PointName | Column::Point => Value::Text(name.clone()),
                Column::PointUuid => Value::Uuid(uuid),
                other => {
                    return Err(SqlError::UnknownColumn(other.meta().label.to_string()));
                }
            });
        }
        rows.push(row);
        if let Some(limit) = request.limit {
            if rows.len() as u64 >= limit {
                break;
            }
        }
    }
    Ok(QueryOutcome::Rows(rows))
}

// ---- ARCHIVE -------------------------------------------------------------

fn execute_archive_select(
    request: &Request,
    cache: &PointCache,
    session: &mut dyn StoreSession,
    counting: bool,
) -> Result<QueryOutcome> {
    let points = matching_points(request, cache, session)?;
    if points.is_empty() && request.point_selector.is_some() {
        return Err(SqlError::UnknownPoint(
            "no point matched the query's point predicate".to_string(),
        ));
    }

    let mut total_count: u64 = 0;
    let mut rows: Vec<Vec<Value>> = Vec::new();
    let columns = request.query.as_ref().unwrap().columns.clone();
    let row_budget = request.limit;

    'points: for (name, uuid) in points {
        let mut query = build_store_query(request, uuid)?;
        loop {
            let page = session.select(&query)?;
            if counting {
                total_count += page.rows.len() as u64;
            } else {
                for value in &page.rows {
                    rows.push(project_row(&columns, &name, value)?);
                    if let Some(limit) = row_budget {
                        if rows.len() as u64 >= limit {
                            break 'points;
                        }
                    }
                }
            }
            match page.continuation {
                Some(next) => query = next,
                None => break,
            }
        }
    }

    if counting {
        Ok(QueryOutcome::Count(total_count))
    } else {
        Ok(QueryOutcome::Rows(rows))
    }
}

fn project_row(columns: &[Column], name: &str, row: &PointValue) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(columns.len());
    for column in columns {
        out.push(match column {
            Column::PointName | Column::Point => Value::Text(name.to_string()),
            Column::PointUuid => Value::Uuid(row.point),
            Column::Stamp => Value::Timestamp(row.stamp),
            Column::Version => row.version.map(Value::Timestamp).unwrap_or(Value::Null),
            Column::State => row
                .state
                .map(Value::Integer)
                .unwrap_or(Value::Null),
            Column::Value | Column::Interpolated | Column::Extrapolated => row.value.clone(),
            other => return Err(SqlError::UnknownColumn(other.meta().label.to_string())),
        });
    }
    Ok(out)
}

fn build_store_query(request: &Request, point: Uuid) -> Result<StoreQuery> {
    let mut query = StoreQuery::new(point);
    let mut stamps = TimeSelector::default();

    if let Some(bound) = &request.stamp_bound {
        let when = resolve_time(request, &bound.value)?;
        set_bound(&mut stamps, bound.op, when);
    }
    if let Some(bound) = &request.version_bound {
        let when = resolve_time(request, &bound.value)?;
        set_bound(&mut stamps, bound.op, when);
    }

    query.stamps = stamps;
    query.pull = request.pull;
    query.synced = request.synced;
    query.sync = request.sync.clone();
    query.not_null = request.null_ignored;
    query.interpolated = request.interpolated;
    query.extrapolated = request.extrapolated;
    query.polator_time_limit = request.time_limit.clone();
    query.row_limit = request.limit;
    Ok(query)
}

fn set_bound(selector: &mut TimeSelector, op: TimeOp, when: DateTime<Utc>) {
    match op {
        TimeOp::At => selector.at = Some(when),
        TimeOp::NotBefore => selector.not_before = Some(when),
        TimeOp::After => selector.after = Some(when),
        TimeOp::NotAfter => selector.not_after = Some(when),
        TimeOp::Before => selector.before = Some(when),
    }
}

fn compile_pattern(op: PointOp, pattern: &str) -> Result<Regex> {
    let anchored = match op {
        PointOp::Like => {
            let mut out = String::from("^");
            for ch in pattern.chars() {
                match ch {
                    '%' => out.push_str(".*"),
                    '_' => out.push('.'),
                    other => out.push_str(&escape(&other.to_string())),
                }
            }
            out.push('$');
            out
        }
        PointOp::Regexp => format!("^{pattern}$"),
        PointOp::Eq => unreachable!("compile_pattern is only called for LIKE/REGEXP"),
    };
    Regex::new(&anchored).map_err(|e| SqlError::PatternSyntaxError(e.to_string()))
}

pub(crate) fn resolve_text(request: &Request, token: &ValueToken) -> Result<String> {
    match token {
        ValueToken::Quoted(s) => Ok(s.clone()),
        ValueToken::Integer(n) => Ok(n.to_string()),
        ValueToken::Float(f) => Ok(f.to_string()),
        ValueToken::Parameter(_) => match request.resolve(token) {
            Some(ParamValue::Text(s)) => Ok(s.clone()),
            Some(ParamValue::Uuid(u)) => Ok(u.to_string()),
            Some(ParamValue::Integer(n)) => Ok(n.to_string()),
            Some(ParamValue::Float(f)) => Ok(f.to_string()),
            _ => Err(SqlError::WrongDataType("point".to_string())),
        },
        other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
    }
}

pub(crate) fn resolve_uuid(request: &Request, token: &ValueToken) -> Result<Uuid> {
    match token {
        ValueToken::Quoted(s) => Uuid::parse_str(s).map_err(|_| SqlError::NotAUuid(s.clone())),
        ValueToken::Parameter(_) => match request.resolve(token) {
            Some(ParamValue::Uuid(u)) => Ok(*u),
            Some(ParamValue::Text(s)) => {
                Uuid::parse_str(s).map_err(|_| SqlError::NotAUuid(s.clone()))
            }
            _ => Err(SqlError::NotAUuid("<unbound parameter>".to_string())),
        },
        other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
    }
}

pub(crate) fn resolve_time(request: &Request, token: &ValueToken) -> Result<DateTime<Utc>> {
    match token {
        ValueToken::Now => Ok(Utc::now()),
        ValueToken::Today => Ok(Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()),
        ValueToken::Yesterday => Ok((Utc::now() - chrono::Duration::days(1))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()),
        ValueToken::Bot => Ok(Utc.timestamp_opt(0, 0).unwrap()),
        ValueToken::Eot => Ok(Utc
            .with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
            .unwrap()),
        ValueToken::Quoted(s) => s
            .parse::<DateTime<Utc>>()
            .map_err(|_| SqlError::NotAStamp(s.clone())),
        ValueToken::Parameter(_) => match request.resolve(token) {
            Some(ParamValue::Timestamp(t)) => Ok(*t),
            Some(ParamValue::Text(s)) => {
                s.parse::<DateTime<Utc>>().map_err(|_| SqlError::NotAStamp(s.clone()))
            }
            _ => Err(SqlError::StampNotSpecified),
        },
        other => Err(SqlError::UnexpectedToken(format!("{other:?}"))),
    }
}
