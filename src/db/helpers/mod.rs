use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::{
    db::models::{SellerId, VisitOutcome},
    geo::GeoPoint,
};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_outcome(value: &str) -> Result<VisitOutcome> {
    match value {
        "pending" => Ok(VisitOutcome::Pending),
        "sale" => Ok(VisitOutcome::Sale),
        "no_sale" => Ok(VisitOutcome::NoSale),
        "closed" => Ok(VisitOutcome::Closed),
        other => Err(anyhow!("unknown visit outcome {other}")),
    }
}

pub fn parse_seller_id(value: &str) -> Result<SellerId> {
    value
        .parse()
        .with_context(|| format!("invalid seller id '{value}'"))
}

pub fn parse_optional_point(value: Option<String>) -> Result<Option<GeoPoint>> {
    value
        .map(|raw| GeoPoint::parse(&raw).context("failed to parse check_out_location"))
        .transpose()
}
