use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use geojson::GeoJson;
use serde::Serialize;

use crate::collections::CollectionRegistry;
use crate::error::SceneError;
use crate::geom;

/// Provider record types searched by default.
pub const DEFAULT_TYPES: &[&str] = &["DigitalGlobeAcquisition"];

const PROVIDER_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// One generic search request, before translation into provider terms.
#[derive(Debug, Clone, Default)]
pub struct SceneQuery {
    /// AOI as a GeoJSON document (Feature, FeatureCollection, or geometry).
    pub geometry: Option<GeoJson>,
    pub time_range: Option<TimeRange>,
    pub collection_ids: Vec<String>,
    pub cloud_cover: Option<CloudCoverRange>,
    /// Minimum AOI overlap fraction in [0,1], applied after search.
    pub overlap_threshold: Option<f64>,
    /// Provider catalog ids; when present every other filter is ignored.
    pub explicit_ids: Vec<String>,
    pub types: Vec<String>,
}

/// Inclusive datetime range; an absent end leaves the range open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl FromStr for TimeRange {
    type Err = SceneError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.splitn(2, '/');
        let start = parse_datetime(parts.next().unwrap_or_default())?;
        let end = parts.next().map(parse_datetime).transpose()?;
        if let Some(end) = end {
            if end < start {
                return Err(SceneError::InvalidDateRange(format!(
                    "end precedes start in {value}"
                )));
            }
        }
        Ok(Self { start, end })
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, SceneError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| SceneError::InvalidDateRange(trimmed.to_string()))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| SceneError::InvalidDateRange(trimmed.to_string()))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

/// Cloud-cover bounds in percent. A single value means "at most"; two
/// values separated by `/` bound both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudCoverRange {
    pub lower: Option<f64>,
    pub upper: f64,
}

impl FromStr for CloudCoverRange {
    type Err = SceneError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| (0.0..=100.0).contains(v))
                .ok_or_else(|| SceneError::InvalidCloudCover(value.to_string()))
        };
        match value.split_once('/') {
            Some((lower, upper)) => Ok(Self {
                lower: Some(parse(lower)?),
                upper: parse(upper)?,
            }),
            None => Ok(Self {
                lower: None,
                upper: parse(value)?,
            }),
        }
    }
}

/// Provider-native search parameters produced by translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSearchRequest {
    pub filters: Vec<String>,
    pub types: Vec<String>,
    #[serde(rename = "searchAreaWkt", skip_serializing_if = "Option::is_none")]
    pub search_area_wkt: Option<String>,
    #[serde(rename = "startDate", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// What the catalog collaborator should do for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogDirective {
    Search(CatalogSearchRequest),
    /// Direct fetch of the named records; no other filter applies.
    FetchIds(Vec<String>),
}

/// Translate a generic query into the provider's filter syntax. Pure: the
/// same query always yields the same directive.
pub fn translate(
    query: &SceneQuery,
    registry: &CollectionRegistry,
) -> Result<CatalogDirective, SceneError> {
    if !query.explicit_ids.is_empty() {
        return Ok(CatalogDirective::FetchIds(query.explicit_ids.clone()));
    }

    let mut filters = Vec::new();

    if !query.collection_ids.is_empty() {
        let instruments = query
            .collection_ids
            .iter()
            .map(|id| {
                registry
                    .by_id(id)
                    .map(|collection| collection.instrument.as_str())
                    .ok_or_else(|| SceneError::UnknownCollection(id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        filters.push(format!(
            "sensorPlatformName = '{}'",
            instruments.join(",")
        ));
    }

    if let Some(range) = query.cloud_cover {
        if let Some(lower) = range.lower {
            filters.push(format!("cloudCover >= {}", format_number(lower)));
        }
        filters.push(format!("cloudCover <= {}", format_number(range.upper)));
    }

    let search_area_wkt = query
        .geometry
        .as_ref()
        .map(|doc| geom::polygon_from_geojson(doc).map(|polygon| geom::polygon_to_wkt(&polygon)))
        .transpose()?;

    let (start_date, end_date) = match query.time_range {
        Some(range) => (
            Some(range.start.format(PROVIDER_DATE_FORMAT).to_string()),
            range
                .end
                .map(|end| end.format(PROVIDER_DATE_FORMAT).to_string()),
        ),
        None => (None, None),
    };

    let types = if query.types.is_empty() {
        DEFAULT_TYPES.iter().map(|t| t.to_string()).collect()
    } else {
        query.types.clone()
    };

    Ok(CatalogDirective::Search(CatalogSearchRequest {
        filters,
        types,
        search_area_wkt,
        start_date,
        end_date,
    }))
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn registry() -> CollectionRegistry {
        CollectionRegistry::load().unwrap()
    }

    fn aoi() -> GeoJson {
        r#"{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#
            .parse()
            .unwrap()
    }

    #[test]
    fn collections_resolve_to_instruments() {
        let query = SceneQuery {
            collection_ids: vec!["wv02".to_string(), "ge01".to_string()],
            ..SceneQuery::default()
        };
        let directive = translate(&query, &registry()).unwrap();
        let CatalogDirective::Search(request) = directive else {
            panic!("expected search directive");
        };
        assert_eq!(
            request.filters,
            vec!["sensorPlatformName = 'WORLDVIEW02,GEOEYE01'"]
        );
        assert_eq!(request.types, vec!["DigitalGlobeAcquisition"]);
    }

    #[test]
    fn unknown_collection_fails() {
        let query = SceneQuery {
            collection_ids: vec!["spot-7".to_string()],
            ..SceneQuery::default()
        };
        let err = translate(&query, &registry()).unwrap_err();
        assert_matches!(err, SceneError::UnknownCollection(_));
    }

    #[test]
    fn explicit_ids_short_circuit() {
        let query = SceneQuery {
            explicit_ids: vec!["CAT123".to_string()],
            collection_ids: vec!["wv02".to_string()],
            geometry: Some(aoi()),
            ..SceneQuery::default()
        };
        let directive = translate(&query, &registry()).unwrap();
        assert_eq!(
            directive,
            CatalogDirective::FetchIds(vec!["CAT123".to_string()])
        );
    }

    #[test]
    fn cloud_cover_bounds() {
        let both: CloudCoverRange = "0/10".parse().unwrap();
        let query = SceneQuery {
            cloud_cover: Some(both),
            ..SceneQuery::default()
        };
        let CatalogDirective::Search(request) = translate(&query, &registry()).unwrap() else {
            panic!("expected search directive");
        };
        assert_eq!(
            request.filters,
            vec!["cloudCover >= 0", "cloudCover <= 10"]
        );

        let upper_only: CloudCoverRange = "12.5".parse().unwrap();
        let query = SceneQuery {
            cloud_cover: Some(upper_only),
            ..SceneQuery::default()
        };
        let CatalogDirective::Search(request) = translate(&query, &registry()).unwrap() else {
            panic!("expected search directive");
        };
        assert_eq!(request.filters, vec!["cloudCover <= 12.5"]);
    }

    #[test]
    fn datetime_range_formats_microseconds() {
        let range: TimeRange = "2017-01-01/2017-11-01".parse().unwrap();
        let query = SceneQuery {
            time_range: Some(range),
            ..SceneQuery::default()
        };
        let CatalogDirective::Search(request) = translate(&query, &registry()).unwrap() else {
            panic!("expected search directive");
        };
        assert_eq!(
            request.start_date.as_deref(),
            Some("2017-01-01T00:00:00.000000Z")
        );
        assert_eq!(
            request.end_date.as_deref(),
            Some("2017-11-01T00:00:00.000000Z")
        );
    }

    #[test]
    fn open_ended_range() {
        let range: TimeRange = "2017-06-15".parse().unwrap();
        assert!(range.end.is_none());
    }

    #[test]
    fn inverted_range_rejected() {
        let err = "2018-01-01/2017-01-01".parse::<TimeRange>().unwrap_err();
        assert_matches!(err, SceneError::InvalidDateRange(_));
    }

    #[test]
    fn geometry_becomes_wkt() {
        let query = SceneQuery {
            geometry: Some(aoi()),
            ..SceneQuery::default()
        };
        let CatalogDirective::Search(request) = translate(&query, &registry()).unwrap() else {
            panic!("expected search directive");
        };
        let wkt = request.search_area_wkt.unwrap();
        assert!(wkt.starts_with("POLYGON"));
    }

    #[test]
    fn translation_is_pure() {
        let query = SceneQuery {
            geometry: Some(aoi()),
            time_range: Some("2017-01-01/2017-11-01".parse().unwrap()),
            collection_ids: vec!["wv02".to_string()],
            cloud_cover: Some("0/10".parse().unwrap()),
            ..SceneQuery::default()
        };
        let first = translate(&query, &registry()).unwrap();
        let second = translate(&query, &registry()).unwrap();
        assert_eq!(first, second);
    }
}
