use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SceneError;

const BUNDLED_COLLECTIONS: &str = include_str!("../data/collections.json");

/// Reference metadata for one instrument/platform combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: String,
    pub instrument: String,
    pub platform: String,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Collection {
    /// Canonical property entries this collection contributes to a scene.
    pub fn scene_properties(&self) -> BTreeMap<String, serde_json::Value> {
        let mut props = self.properties.clone();
        props.insert("c:id".to_string(), self.id.clone().into());
        props.insert("eo:instrument".to_string(), self.instrument.clone().into());
        props.insert("eo:platform".to_string(), self.platform.clone().into());
        props
    }
}

#[derive(Debug, Deserialize)]
struct CollectionFile {
    collections: Vec<Collection>,
}

/// Immutable lookup table over the bundled collection reference file.
/// Loaded once at startup; safe to share across lookups.
#[derive(Debug, Clone)]
pub struct CollectionRegistry {
    by_id: BTreeMap<String, Collection>,
    by_instrument: BTreeMap<String, Collection>,
}

impl CollectionRegistry {
    pub fn load() -> Result<Self, SceneError> {
        Self::from_json(BUNDLED_COLLECTIONS)
    }

    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let file: CollectionFile =
            serde_json::from_str(json).map_err(|err| SceneError::RegistryLoad(err.to_string()))?;
        if file.collections.is_empty() {
            return Err(SceneError::RegistryLoad(
                "registry contains no collections".to_string(),
            ));
        }

        let mut by_id = BTreeMap::new();
        let mut by_instrument = BTreeMap::new();
        for collection in file.collections {
            if by_id
                .insert(collection.id.clone(), collection.clone())
                .is_some()
            {
                return Err(SceneError::RegistryLoad(format!(
                    "duplicate collection id {}",
                    collection.id
                )));
            }
            if by_instrument
                .insert(collection.instrument.clone(), collection)
                .is_some()
            {
                return Err(SceneError::RegistryLoad(
                    "duplicate instrument in registry".to_string(),
                ));
            }
        }

        Ok(Self {
            by_id,
            by_instrument,
        })
    }

    pub fn by_id(&self, id: &str) -> Option<&Collection> {
        self.by_id.get(id)
    }

    pub fn by_instrument(&self, instrument: &str) -> Option<&Collection> {
        self.by_instrument.get(instrument)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn load_bundled_registry() {
        let registry = CollectionRegistry::load().unwrap();
        let wv02 = registry.by_id("wv02").unwrap();
        assert_eq!(wv02.instrument, "WORLDVIEW02");
        assert_eq!(registry.by_instrument("GEOEYE01").unwrap().id, "ge01");
    }

    #[test]
    fn scene_properties_carry_canonical_keys() {
        let registry = CollectionRegistry::load().unwrap();
        let props = registry.by_id("wv02").unwrap().scene_properties();
        assert_eq!(props["c:id"], "wv02");
        assert_eq!(props["eo:platform"], "worldview-2");
        assert!(props.contains_key("eo:gsd"));
    }

    #[test]
    fn malformed_registry_is_fatal() {
        let err = CollectionRegistry::from_json("{").unwrap_err();
        assert_matches!(err, SceneError::RegistryLoad(_));

        let err = CollectionRegistry::from_json(r#"{"collections": []}"#).unwrap_err();
        assert_matches!(err, SceneError::RegistryLoad(_));
    }

    #[test]
    fn duplicate_instrument_rejected() {
        let json = r#"{"collections": [
            {"id": "a", "title": "A", "instrument": "X", "platform": "a"},
            {"id": "b", "title": "B", "instrument": "X", "platform": "b"}
        ]}"#;
        let err = CollectionRegistry::from_json(json).unwrap_err();
        assert_matches!(err, SceneError::RegistryLoad(_));
    }
}
