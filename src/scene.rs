use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use geo::Polygon;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::RawRecord;
use crate::collections::CollectionRegistry;
use crate::domain::{NOT_DELIVERED, OrderState};
use crate::error::SceneError;
use crate::geom;

const ORDER_ID_KEY: &str = "dg:order_id";
const FULL_ASSET: &str = "full";

/// One file reference attached to a scene under an asset key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub href: String,
}

impl Asset {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// Canonical, provider-independent representation of one catalog record.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub datetime: DateTime<Utc>,
    /// Ground footprint in geographic WGS84.
    pub footprint: Polygon<f64>,
    /// Normalized EO attributes plus collection extension fields.
    pub properties: BTreeMap<String, Value>,
    /// Asset key -> reference, populated progressively as fulfillment and
    /// downloads happen.
    pub assets: BTreeMap<String, Asset>,
    /// Fraction of the AOI covered by this footprint; `None` until the
    /// overlap evaluator has run.
    pub overlap: Option<f64>,
    pub order_state: OrderState,
}

impl Scene {
    /// Normalize a raw catalog record, merging in the registry collection
    /// matched by the record's platform name. Scene-derived fields win over
    /// collection defaults.
    pub fn from_record(
        record: &RawRecord,
        registry: &CollectionRegistry,
    ) -> Result<Self, SceneError> {
        let collection = registry
            .by_instrument(&record.platform_name)
            .ok_or_else(|| SceneError::UnknownPlatform(record.platform_name.clone()))?;

        let datetime = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|_| SceneError::InvalidDateRange(record.timestamp.clone()))?
            .with_timezone(&Utc);
        let footprint = geom::polygon_from_wkt(&record.footprint_wkt)?;

        let mut properties = BTreeMap::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                properties.insert(key.to_string(), value);
            }
        };
        put("eo:cloud_cover", record.cloud_cover.map(Value::from));
        put("eo:gsd", record.multi_resolution.map(Value::from));
        put("eo:sun_azimuth", record.sun_azimuth.map(Value::from));
        put("eo:sun_elevation", record.sun_elevation.map(Value::from));
        put("eo:off_nadir", record.off_nadir_angle.map(Value::from));
        put("eo:azimuth", record.target_azimuth.map(Value::from));
        put(
            "dg:image_bands",
            record.image_bands.clone().map(Value::from),
        );

        for (key, value) in collection.scene_properties() {
            properties.entry(key).or_insert(value);
        }

        let mut assets = BTreeMap::new();
        if let Some(url) = &record.browse_url {
            assets.insert("thumbnail".to_string(), Asset::new(url.clone()));
        }

        Ok(Self {
            id: record.catalog_id.clone(),
            datetime,
            footprint,
            properties,
            assets,
            overlap: None,
            order_state: OrderState::Unordered,
        })
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn collection_id(&self) -> Option<&str> {
        self.property_str("c:id")
    }

    pub fn instrument(&self) -> Option<&str> {
        self.property_str("eo:instrument")
    }

    /// Substitution values for output filename templates: `date`, `id`,
    /// and every scalar scene property under its own key.
    pub fn template_vars(&self) -> BTreeMap<&str, String> {
        let mut vars = BTreeMap::new();
        vars.insert("date", self.datetime.date_naive().to_string());
        vars.insert("id", self.id.clone());
        for (key, value) in &self.properties {
            let rendered = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                _ => continue,
            };
            vars.insert(key.as_str(), rendered);
        }
        vars
    }

    fn to_feature(&self) -> SceneFeature {
        let mut properties = self.properties.clone();
        properties.insert("id".to_string(), self.id.clone().into());
        properties.insert(
            "datetime".to_string(),
            self.datetime
                .to_rfc3339_opts(SecondsFormat::Micros, true)
                .into(),
        );
        if let Some(overlap) = self.overlap {
            properties.insert("overlap".to_string(), overlap.into());
        }
        if let Some(order_id) = self.order_state.order_id() {
            properties.insert(ORDER_ID_KEY.to_string(), order_id.into());
        }

        let mut assets = self.assets.clone();
        if let Some(location) = self.order_state.location() {
            assets.insert(FULL_ASSET.to_string(), Asset::new(location));
        }

        SceneFeature {
            type_: "Feature".to_string(),
            id: self.id.clone(),
            geometry: geom::polygon_to_geojson(&self.footprint),
            properties,
            assets,
        }
    }

    fn from_feature(feature: SceneFeature) -> Result<Self, SceneError> {
        let SceneFeature {
            id,
            geometry,
            mut properties,
            mut assets,
            ..
        } = feature;

        properties.remove("id");
        let datetime = properties
            .remove("datetime")
            .and_then(|value| value.as_str().map(str::to_string))
            .ok_or_else(|| SceneError::SceneFileParse(format!("scene {id} has no datetime")))?;
        let datetime = DateTime::parse_from_rfc3339(&datetime)
            .map_err(|err| SceneError::SceneFileParse(format!("scene {id}: {err}")))?
            .with_timezone(&Utc);

        let overlap = properties.remove("overlap").and_then(|value| value.as_f64());
        let order_id = properties
            .remove(ORDER_ID_KEY)
            .and_then(|value| value.as_str().map(str::to_string));

        let location = assets
            .get(FULL_ASSET)
            .map(|asset| asset.href.clone())
            .filter(|href| href != NOT_DELIVERED);
        let order_state = match (order_id, location) {
            (Some(order_id), Some(location)) => {
                assets.remove(FULL_ASSET);
                OrderState::Fulfilled { order_id, location }
            }
            (Some(order_id), None) => OrderState::Pending { order_id },
            (None, _) => OrderState::Unordered,
        };

        let footprint = geo::Geometry::<f64>::try_from(geometry.value)
            .ok()
            .and_then(|geometry| match geometry {
                geo::Geometry::Polygon(polygon) => Some(polygon),
                _ => None,
            })
            .ok_or_else(|| {
                SceneError::SceneFileParse(format!("scene {id} has a non-polygon footprint"))
            })?;

        Ok(Self {
            id,
            datetime,
            footprint,
            properties,
            assets,
            overlap,
            order_state,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SceneFeature {
    #[serde(rename = "type")]
    type_: String,
    id: String,
    geometry: geojson::Geometry,
    properties: BTreeMap<String, Value>,
    #[serde(default)]
    assets: BTreeMap<String, Asset>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SceneDocument {
    #[serde(rename = "type")]
    type_: String,
    features: Vec<SceneFeature>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

/// Ordered scene set sharing request-level context. Insertion order is the
/// search result order and survives persistence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneCollection {
    pub scenes: Vec<Scene>,
    /// Shared query context; holds the AOI under `intersects`.
    pub properties: BTreeMap<String, Value>,
}

impl SceneCollection {
    pub fn new(scenes: Vec<Scene>, properties: BTreeMap<String, Value>) -> Self {
        Self { scenes, properties }
    }

    pub fn with_aoi(scenes: Vec<Scene>, aoi: &Polygon<f64>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            "intersects".to_string(),
            serde_json::to_value(geom::polygon_to_geojson(aoi)).unwrap_or(Value::Null),
        );
        Self { scenes, properties }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// The AOI this collection was searched with. Required before any
    /// fetch or crop operation.
    pub fn aoi(&self) -> Result<Polygon<f64>, SceneError> {
        let value = self.properties.get("intersects").ok_or(SceneError::MissingAoi)?;
        let text =
            serde_json::to_string(value).map_err(|err| SceneError::SceneFileParse(err.to_string()))?;
        geom::polygon_from_geojson_str(&text)
    }

    pub fn retain(&mut self, predicate: impl FnMut(&Scene) -> bool) {
        self.scenes.retain(predicate);
    }

    pub fn retain_ids(&mut self, ids: &[String]) {
        self.scenes.retain(|scene| ids.contains(&scene.id));
    }

    pub fn retain_collections(&mut self, collection_ids: &[String]) {
        self.scenes.retain(|scene| {
            scene
                .collection_id()
                .map(|id| collection_ids.iter().any(|wanted| wanted == id))
                .unwrap_or(false)
        });
    }

    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let content =
            fs::read_to_string(path).map_err(|_| SceneError::SceneFileRead(path.to_path_buf()))?;
        let document: SceneDocument = serde_json::from_str(&content)
            .map_err(|err| SceneError::SceneFileParse(err.to_string()))?;
        let scenes = document
            .features
            .into_iter()
            .map(Scene::from_feature)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            scenes,
            properties: document.properties,
        })
    }

    /// Persist as a GeoJSON FeatureCollection. With `append`, merge into any
    /// existing document by scene id; incoming scenes win.
    pub fn save(&self, path: &Path, append: bool) -> Result<(), SceneError> {
        let merged;
        let collection = if append && path.exists() {
            let mut existing = Self::load(path)?;
            for scene in &self.scenes {
                match existing
                    .scenes
                    .iter_mut()
                    .find(|candidate| candidate.id == scene.id)
                {
                    Some(slot) => *slot = scene.clone(),
                    None => existing.scenes.push(scene.clone()),
                }
            }
            existing.properties.extend(self.properties.clone());
            merged = existing;
            &merged
        } else {
            self
        };

        let document = SceneDocument {
            type_: "FeatureCollection".to_string(),
            features: collection.scenes.iter().map(Scene::to_feature).collect(),
            properties: collection.properties.clone(),
        };
        let content = serde_json::to_vec_pretty(&document)
            .map_err(|err| SceneError::Filesystem(err.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| SceneError::Filesystem(err.to_string()))?;
            }
        }
        let tmp_path = path.with_extension("geojson.tmp");
        fs::write(&tmp_path, &content).map_err(|err| SceneError::Filesystem(err.to_string()))?;
        fs::rename(&tmp_path, path).map_err(|err| SceneError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn registry() -> CollectionRegistry {
        CollectionRegistry::load().unwrap()
    }

    fn record(platform: &str) -> RawRecord {
        serde_json::from_value(serde_json::json!({
            "catalogID": "103001006B5A0E00",
            "timestamp": "2017-10-01T15:23:11.000Z",
            "footprintWkt": "POLYGON((0 0,1 0,1 1,0 1,0 0))",
            "platformName": platform,
            "cloudCover": 7.0,
            "multiResolution": 1.85,
            "sunAzimuth": 155.1,
            "sunElevation": 44.9,
            "offNadirAngle": 18.2,
            "targetAzimuth": 84.0,
            "imageBands": "WORLDVIEW_8_BAND",
            "browseURL": "https://browse.example.com/103001006B5A0E00.jpg"
        }))
        .unwrap()
    }

    #[test]
    fn normalize_maps_canonical_properties() {
        let scene = Scene::from_record(&record("WORLDVIEW02"), &registry()).unwrap();
        assert_eq!(scene.id, "103001006B5A0E00");
        assert_eq!(scene.properties["eo:cloud_cover"], 7.0);
        assert_eq!(scene.properties["eo:off_nadir"], 18.2);
        assert_eq!(scene.properties["c:id"], "wv02");
        assert_eq!(scene.properties["eo:platform"], "worldview-2");
        assert_eq!(
            scene.assets["thumbnail"].href,
            "https://browse.example.com/103001006B5A0E00.jpg"
        );
        assert!(scene.overlap.is_none());
        assert_eq!(scene.order_state, OrderState::Unordered);
    }

    #[test]
    fn scene_fields_win_over_collection_defaults() {
        // record carries its own gsd; the registry's eo:gsd must not clobber it
        let scene = Scene::from_record(&record("WORLDVIEW02"), &registry()).unwrap();
        assert_eq!(scene.properties["eo:gsd"], 1.85);
    }

    #[test]
    fn unknown_platform_is_a_lookup_error() {
        let err = Scene::from_record(&record("SENTINEL2A"), &registry()).unwrap_err();
        assert_matches!(err, SceneError::UnknownPlatform(_));
    }

    #[test]
    fn template_vars_include_date_and_properties() {
        let scene = Scene::from_record(&record("WORLDVIEW02"), &registry()).unwrap();
        let vars = scene.template_vars();
        assert_eq!(vars["date"], "2017-10-01");
        assert_eq!(vars["id"], "103001006B5A0E00");
        assert_eq!(vars["c:id"], "wv02");
    }

    #[test]
    fn round_trip_preserves_scenes_and_aoi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenes.geojson");

        let mut scene = Scene::from_record(&record("WORLDVIEW02"), &registry()).unwrap();
        scene.overlap = Some(0.42);
        scene.order_state = OrderState::Fulfilled {
            order_id: "o-123".to_string(),
            location: "s3://delivery/103001006B5A0E00".to_string(),
        };
        let aoi = geom::polygon_from_wkt("POLYGON((0 0,0.5 0,0.5 0.5,0 0.5,0 0))").unwrap();
        let collection = SceneCollection::with_aoi(vec![scene], &aoi);

        collection.save(&path, false).unwrap();
        let loaded = SceneCollection::load(&path).unwrap();

        assert_eq!(loaded, collection);
        assert_eq!(loaded.aoi().unwrap(), aoi);
    }

    #[test]
    fn pending_order_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenes.geojson");

        let mut scene = Scene::from_record(&record("GEOEYE01"), &registry()).unwrap();
        scene.order_state = OrderState::Pending {
            order_id: "o-9".to_string(),
        };
        let aoi = geom::polygon_from_wkt("POLYGON((0 0,1 0,1 1,0 1,0 0))").unwrap();
        SceneCollection::with_aoi(vec![scene.clone()], &aoi)
            .save(&path, false)
            .unwrap();

        let loaded = SceneCollection::load(&path).unwrap();
        assert_eq!(loaded.scenes[0].order_state, scene.order_state);
    }

    #[test]
    fn append_merges_by_scene_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenes.geojson");
        let aoi = geom::polygon_from_wkt("POLYGON((0 0,1 0,1 1,0 1,0 0))").unwrap();

        let first = Scene::from_record(&record("WORLDVIEW02"), &registry()).unwrap();
        SceneCollection::with_aoi(vec![first.clone()], &aoi)
            .save(&path, false)
            .unwrap();

        let mut updated = first;
        updated.overlap = Some(0.9);
        let mut other = Scene::from_record(&record("GEOEYE01"), &registry()).unwrap();
        other.id = "1050010001234500".to_string();
        SceneCollection::with_aoi(vec![updated.clone(), other], &aoi)
            .save(&path, true)
            .unwrap();

        let loaded = SceneCollection::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.scenes[0].overlap, Some(0.9));
        assert_eq!(loaded.scenes[1].id, "1050010001234500");
    }

    #[test]
    fn missing_aoi_is_a_hard_precondition() {
        let collection = SceneCollection::default();
        assert_matches!(collection.aoi().unwrap_err(), SceneError::MissingAoi);
    }

    #[test]
    fn retain_filters() {
        let registry = registry();
        let wv = Scene::from_record(&record("WORLDVIEW02"), &registry).unwrap();
        let mut ge = Scene::from_record(&record("GEOEYE01"), &registry).unwrap();
        ge.id = "GE1".to_string();
        let mut collection = SceneCollection::new(vec![wv, ge], BTreeMap::new());

        collection.retain_collections(&["ge01".to_string()]);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.scenes[0].id, "GE1");

        collection.retain_ids(&[]);
        assert!(collection.is_empty());
    }
}
