//! Geospatial point in WGS 84 (SRID 4326), rendered longitude-first.

use std::fmt;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const WGS84_SRID: u32 = 4326;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// `POINT(<lon> <lat>)`
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.longitude, self.latitude)
    }

    /// `SRID=4326;POINT(<lon> <lat>)`, the form written to `check_out_location`.
    pub fn to_ewkt(&self) -> String {
        format!("SRID={WGS84_SRID};{}", self.to_wkt())
    }

    /// Accepts both WKT and EWKT. Any SRID other than 4326 is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let body = match text.split_once(';') {
            Some((srid, rest)) => {
                let srid = srid
                    .trim()
                    .strip_prefix("SRID=")
                    .ok_or_else(|| anyhow!("malformed SRID prefix in '{text}'"))?;
                let srid: u32 = srid
                    .parse()
                    .with_context(|| format!("invalid SRID in '{text}'"))?;
                if srid != WGS84_SRID {
                    return Err(anyhow!("unsupported SRID {srid}, expected {WGS84_SRID}"));
                }
                rest.trim()
            }
            None => text,
        };

        let coords = body
            .strip_prefix("POINT(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| anyhow!("not a POINT: '{text}'"))?;

        let mut parts = coords.split_whitespace();
        let (Some(lon), Some(lat), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(anyhow!("POINT must have exactly two coordinates: '{text}'"));
        };

        Ok(Self {
            longitude: lon
                .parse()
                .with_context(|| format!("invalid longitude '{lon}'"))?,
            latitude: lat
                .parse()
                .with_context(|| format!("invalid latitude '{lat}'"))?,
        })
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_longitude_first() {
        let point = GeoPoint::new(-58.3816, -34.6037);
        assert_eq!(point.to_wkt(), "POINT(-58.3816 -34.6037)");
        assert_eq!(point.to_ewkt(), "SRID=4326;POINT(-58.3816 -34.6037)");
    }

    #[test]
    fn parses_plain_and_extended_forms() {
        let plain = GeoPoint::parse("POINT(-70.5 -33.25)").unwrap();
        assert_eq!(plain, GeoPoint::new(-70.5, -33.25));

        let extended = GeoPoint::parse(" SRID=4326;POINT(12 41.9) ").unwrap();
        assert_eq!(extended, GeoPoint::new(12.0, 41.9));
    }

    #[test]
    fn rejects_foreign_srid_and_malformed_points() {
        assert!(GeoPoint::parse("SRID=3857;POINT(1 2)").is_err());
        assert!(GeoPoint::parse("POINT(1)").is_err());
        assert!(GeoPoint::parse("POINT(1 2 3)").is_err());
        assert!(GeoPoint::parse("LINESTRING(1 2, 3 4)").is_err());
    }
}
