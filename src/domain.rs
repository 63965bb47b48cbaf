use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SceneError;

/// Named image product variants the provider can deliver for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AssetKey {
    Thumbnail,
    Rgb,
    Visual,
    Analytic,
    Default,
}

impl AssetKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKey::Thumbnail => "thumbnail",
            AssetKey::Rgb => "rgb",
            AssetKey::Visual => "visual",
            AssetKey::Analytic => "analytic",
            AssetKey::Default => "default",
        }
    }

    /// Processing recipe implied by this product variant. The flags are
    /// passed opaquely to the imaging collaborator.
    pub fn recipe(&self) -> Recipe {
        match self {
            AssetKey::Thumbnail | AssetKey::Default => Recipe {
                pansharpen: false,
                acomp: false,
                dra: false,
            },
            AssetKey::Rgb => Recipe {
                pansharpen: true,
                acomp: true,
                dra: true,
            },
            AssetKey::Visual => Recipe {
                pansharpen: true,
                acomp: false,
                dra: true,
            },
            AssetKey::Analytic => Recipe {
                pansharpen: false,
                acomp: true,
                dra: false,
            },
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetKey {
    type Err = SceneError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "thumbnail" => Ok(AssetKey::Thumbnail),
            "rgb" => Ok(AssetKey::Rgb),
            "visual" => Ok(AssetKey::Visual),
            "analytic" => Ok(AssetKey::Analytic),
            "default" => Ok(AssetKey::Default),
            other => Err(SceneError::InvalidAssetKey(other.to_string())),
        }
    }
}

/// Provider-side processing flags. Opaque to this tool; the imaging
/// collaborator interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub pansharpen: bool,
    pub acomp: bool,
    pub dra: bool,
}

/// Per-scene fulfillment state. Progression is strictly
/// Unordered -> Pending -> Fulfilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderState {
    Unordered,
    Pending { order_id: String },
    Fulfilled { order_id: String, location: String },
}

impl OrderState {
    pub fn order_id(&self) -> Option<&str> {
        match self {
            OrderState::Unordered => None,
            OrderState::Pending { order_id } => Some(order_id),
            OrderState::Fulfilled { order_id, .. } => Some(order_id),
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            OrderState::Fulfilled { location, .. } => Some(location),
            _ => None,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, OrderState::Fulfilled { .. })
    }
}

/// Provider sentinel for an order that has been placed but not delivered.
pub const NOT_DELIVERED: &str = "not_delivered";

/// Nodata value written into fetched imagery, by sensor. The legacy sensors
/// deliver unsigned bytes where 0 is outside the footprint.
pub fn nodata_for_instrument(instrument: &str) -> f64 {
    match instrument {
        "GEOEYE01" | "QUICKBIRD02" => 0.0,
        _ => -1e10,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_asset_key() {
        let key: AssetKey = "RGB".parse().unwrap();
        assert_eq!(key, AssetKey::Rgb);
        assert_eq!(key.to_string(), "rgb");
    }

    #[test]
    fn parse_asset_key_invalid() {
        let err = "pancake".parse::<AssetKey>().unwrap_err();
        assert_matches!(err, SceneError::InvalidAssetKey(_));
    }

    #[test]
    fn recipes_per_key() {
        assert!(AssetKey::Rgb.recipe().pansharpen);
        assert!(AssetKey::Analytic.recipe().acomp);
        assert!(!AssetKey::Analytic.recipe().pansharpen);
        assert!(!AssetKey::Default.recipe().dra);
    }

    #[test]
    fn nodata_rules() {
        assert_eq!(nodata_for_instrument("GEOEYE01"), 0.0);
        assert_eq!(nodata_for_instrument("QUICKBIRD02"), 0.0);
        assert_eq!(nodata_for_instrument("WORLDVIEW02"), -1e10);
    }

    #[test]
    fn order_state_accessors() {
        let state = OrderState::Pending {
            order_id: "o-1".to_string(),
        };
        assert_eq!(state.order_id(), Some("o-1"));
        assert!(state.location().is_none());
        assert!(!state.is_fulfilled());

        let state = OrderState::Fulfilled {
            order_id: "o-1".to_string(),
            location: "s3://bucket/scene".to_string(),
        };
        assert_eq!(state.location(), Some("s3://bucket/scene"));
        assert!(state.is_fulfilled());
    }
}
