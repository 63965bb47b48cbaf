use geo::{Area, BooleanOps, Polygon};

use crate::scene::Scene;

/// Fraction of the AOI covered by a footprint: intersection area over the
/// AOI's own area, in [0,1].
pub fn overlap_fraction(footprint: &Polygon<f64>, aoi: &Polygon<f64>) -> f64 {
    let aoi_area = aoi.unsigned_area();
    if aoi_area == 0.0 {
        return 0.0;
    }
    let intersection = footprint.intersection(aoi).unsigned_area();
    (intersection / aoi_area).clamp(0.0, 1.0)
}

/// Populate `overlap` on every scene. Scenes are independent; order of
/// evaluation does not matter.
pub fn evaluate(scenes: &mut [Scene], aoi: &Polygon<f64>) {
    for scene in scenes.iter_mut() {
        scene.overlap = Some(overlap_fraction(&scene.footprint, aoi));
    }
}

/// Keep scenes whose evaluated overlap is at least `threshold` (a fraction
/// in [0,1]). Scenes that were never evaluated are dropped.
pub fn filter_by_threshold(scenes: Vec<Scene>, threshold: f64) -> Vec<Scene> {
    scenes
        .into_iter()
        .filter(|scene| scene.overlap.is_some_and(|overlap| overlap >= threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::geom::polygon_from_wkt;

    use super::*;

    fn square(min: f64, max: f64) -> Polygon<f64> {
        polygon_from_wkt(&format!(
            "POLYGON(({min} {min},{max} {min},{max} {max},{min} {max},{min} {min}))"
        ))
        .unwrap()
    }

    #[test]
    fn aoi_inside_footprint_is_full_overlap() {
        let footprint = square(0.0, 10.0);
        let aoi = square(2.0, 4.0);
        assert!((overlap_fraction(&footprint, &aoi) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_is_zero() {
        let footprint = square(0.0, 1.0);
        let aoi = square(5.0, 6.0);
        assert_eq!(overlap_fraction(&footprint, &aoi), 0.0);
    }

    #[test]
    fn partial_overlap_fraction() {
        // footprint covers the left half of the AOI
        let footprint = polygon_from_wkt("POLYGON((0 0,1 0,1 2,0 2,0 0))").unwrap();
        let aoi = polygon_from_wkt("POLYGON((0 0,2 0,2 2,0 2,0 0))").unwrap();
        let fraction = overlap_fraction(&footprint, &aoi);
        assert!((fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fraction_always_in_unit_interval() {
        let aoi = square(0.0, 1.0);
        let candidates = [
            square(0.0, 1.0),
            square(-5.0, 5.0),
            square(0.5, 0.75),
            square(3.0, 4.0),
        ];
        for footprint in &candidates {
            let fraction = overlap_fraction(footprint, &aoi);
            assert!((0.0..=1.0).contains(&fraction));
        }
    }

    #[test]
    fn threshold_filter_is_monotonic() {
        let registry = crate::collections::CollectionRegistry::load().unwrap();
        let record: crate::catalog::RawRecord = serde_json::from_value(serde_json::json!({
            "catalogID": "A",
            "timestamp": "2017-10-01T15:23:11.000Z",
            "footprintWkt": "POLYGON((0 0,1 0,1 1,0 1,0 0))",
            "platformName": "WORLDVIEW02"
        }))
        .unwrap();

        let mut scenes = Vec::new();
        for (id, overlap) in [("A", 0.1), ("B", 0.4), ("C", 0.8), ("D", 1.0)] {
            let mut scene = Scene::from_record(&record, &registry).unwrap();
            scene.id = id.to_string();
            scene.overlap = Some(overlap);
            scenes.push(scene);
        }

        let loose = filter_by_threshold(scenes.clone(), 0.3);
        let strict = filter_by_threshold(scenes, 0.8);
        assert_eq!(loose.len(), 3);
        assert_eq!(strict.len(), 2);
        for scene in &strict {
            assert!(loose.iter().any(|kept| kept.id == scene.id));
        }
    }

    #[test]
    fn unevaluated_scenes_are_dropped_by_filter() {
        let registry = crate::collections::CollectionRegistry::load().unwrap();
        let record: crate::catalog::RawRecord = serde_json::from_value(serde_json::json!({
            "catalogID": "A",
            "timestamp": "2017-10-01T15:23:11.000Z",
            "footprintWkt": "POLYGON((0 0,1 0,1 1,0 1,0 0))",
            "platformName": "WORLDVIEW02"
        }))
        .unwrap();
        let scene = Scene::from_record(&record, &registry).unwrap();
        assert!(scene.overlap.is_none());
        assert!(filter_by_threshold(vec![scene], 0.0).is_empty());
    }
}
