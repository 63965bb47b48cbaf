use geo::{Area, BoundingRect, Polygon, Rect};
use geojson::GeoJson;
use wkt::{ToWkt, TryFromWkt};

use crate::error::SceneError;

/// Normalize a GeoJSON document to a single polygon. Accepts a Feature, a
/// FeatureCollection (first feature), or a bare geometry object; a
/// MultiPolygon collapses to its first member.
pub fn polygon_from_geojson(doc: &GeoJson) -> Result<Polygon<f64>, SceneError> {
    let geometry = match doc {
        GeoJson::Geometry(geometry) => geometry.clone(),
        GeoJson::Feature(feature) => feature
            .geometry
            .clone()
            .ok_or_else(|| SceneError::InvalidGeometry("feature has no geometry".to_string()))?,
        GeoJson::FeatureCollection(collection) => collection
            .features
            .first()
            .and_then(|feature| feature.geometry.clone())
            .ok_or_else(|| {
                SceneError::InvalidGeometry("feature collection is empty".to_string())
            })?,
    };
    let geometry = geo::Geometry::<f64>::try_from(geometry.value)
        .map_err(|err| SceneError::InvalidGeometry(err.to_string()))?;
    polygon_from_geometry(geometry)
}

pub fn polygon_from_geojson_str(text: &str) -> Result<Polygon<f64>, SceneError> {
    let doc: GeoJson = text
        .parse()
        .map_err(|err: geojson::Error| SceneError::InvalidGeometry(err.to_string()))?;
    polygon_from_geojson(&doc)
}

/// Parse a provider well-known-text footprint into a polygon.
pub fn polygon_from_wkt(text: &str) -> Result<Polygon<f64>, SceneError> {
    let geometry = geo::Geometry::<f64>::try_from_wkt_str(text)
        .map_err(|err| SceneError::InvalidGeometry(err.to_string()))?;
    polygon_from_geometry(geometry)
}

pub fn polygon_to_wkt(polygon: &Polygon<f64>) -> String {
    polygon.wkt_string()
}

pub fn polygon_to_geojson(polygon: &Polygon<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(polygon))
}

pub fn bounding_rect(polygon: &Polygon<f64>) -> Result<Rect<f64>, SceneError> {
    polygon
        .bounding_rect()
        .ok_or_else(|| SceneError::InvalidGeometry("polygon has no extent".to_string()))
}

fn polygon_from_geometry(geometry: geo::Geometry<f64>) -> Result<Polygon<f64>, SceneError> {
    let polygon = match geometry {
        geo::Geometry::Polygon(polygon) => polygon,
        geo::Geometry::MultiPolygon(multi) => multi
            .0
            .into_iter()
            .next()
            .ok_or_else(|| SceneError::InvalidGeometry("empty multipolygon".to_string()))?,
        other => {
            return Err(SceneError::InvalidGeometry(format!(
                "expected polygon, got {}",
                geometry_kind(&other)
            )));
        }
    };
    if polygon.unsigned_area() == 0.0 {
        return Err(SceneError::InvalidGeometry(
            "polygon has zero area".to_string(),
        ));
    }
    Ok(polygon)
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "point",
        geo::Geometry::Line(_) => "line",
        geo::Geometry::LineString(_) => "linestring",
        geo::Geometry::Polygon(_) => "polygon",
        geo::Geometry::MultiPoint(_) => "multipoint",
        geo::Geometry::MultiLineString(_) => "multilinestring",
        geo::Geometry::MultiPolygon(_) => "multipolygon",
        geo::Geometry::GeometryCollection(_) => "geometrycollection",
        geo::Geometry::Rect(_) => "rect",
        geo::Geometry::Triangle(_) => "triangle",
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SQUARE_FEATURE: &str = r#"{
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
        }
    }"#;

    #[test]
    fn feature_to_polygon() {
        let polygon = polygon_from_geojson_str(SQUARE_FEATURE).unwrap();
        assert_eq!(polygon.exterior().0.len(), 5);
    }

    #[test]
    fn bare_geometry_and_feature_collection() {
        let geometry = r#"{"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#;
        assert!(polygon_from_geojson_str(geometry).is_ok());

        let collection = format!(
            r#"{{"type": "FeatureCollection", "features": [{SQUARE_FEATURE}]}}"#
        );
        assert!(polygon_from_geojson_str(&collection).is_ok());
    }

    #[test]
    fn point_rejected() {
        let err = polygon_from_geojson_str(r#"{"type": "Point", "coordinates": [0, 0]}"#)
            .unwrap_err();
        assert_matches!(err, SceneError::InvalidGeometry(_));
    }

    #[test]
    fn wkt_round_trip() {
        let polygon = polygon_from_wkt("POLYGON((0 0,1 0,1 1,0 1,0 0))").unwrap();
        let text = polygon_to_wkt(&polygon);
        let again = polygon_from_wkt(&text).unwrap();
        assert_eq!(polygon, again);
    }

    #[test]
    fn garbage_wkt_rejected() {
        let err = polygon_from_wkt("POLYGON((nope))").unwrap_err();
        assert_matches!(err, SceneError::InvalidGeometry(_));
    }
}
