use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::collections::CollectionRegistry;
use crate::config::RuntimeConfig;
use crate::domain::{AssetKey, NOT_DELIVERED, OrderState, nodata_for_instrument};
use crate::error::SceneError;
use crate::geom;
use crate::imaging::ImagingClient;
use crate::ordering::OrderingClient;
use crate::overlap;
use crate::query::{CatalogDirective, SceneQuery, translate};
use crate::scene::{Asset, Scene, SceneCollection};

/// Outcome of one order/poll step for one scene.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub scene_id: String,
    pub order_id: String,
    pub state: String,
    pub location: String,
    pub delivered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderReport {
    pub items: Vec<OrderItem>,
}

/// Per-item outcome of a batch fetch. Failures are recorded, never raised,
/// so one scene cannot abort the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Fetched { path: String },
    AlreadyPresent { path: String },
    NotDelivered,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItem {
    pub scene_id: String,
    pub asset: String,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct FetchReport {
    pub items: Vec<FetchItem>,
}

impl FetchReport {
    pub fn fetched(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, FetchOutcome::Fetched { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, FetchOutcome::Failed { .. }))
            .count()
    }
}

#[derive(Clone)]
pub struct App<C: CatalogClient, O: OrderingClient, I: ImagingClient> {
    registry: CollectionRegistry,
    catalog: C,
    ordering: O,
    imaging: I,
}

impl<C: CatalogClient, O: OrderingClient, I: ImagingClient> App<C, O, I> {
    pub fn new(registry: CollectionRegistry, catalog: C, ordering: O, imaging: I) -> Self {
        Self {
            registry,
            catalog,
            ordering,
            imaging,
        }
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    /// Run one search end to end: translate, search, normalize, evaluate
    /// overlap against the AOI, apply the threshold filter.
    pub fn search(&self, query: &SceneQuery) -> Result<SceneCollection, SceneError> {
        let directive = translate(query, &self.registry)?;
        let records = match &directive {
            CatalogDirective::Search(request) => {
                info!(filters = ?request.filters, "searching catalog");
                self.catalog.search(request)?
            }
            CatalogDirective::FetchIds(ids) => {
                info!(count = ids.len(), "fetching records by id");
                self.catalog.fetch_records(ids)?
            }
        };

        let mut scenes = records
            .iter()
            .map(|record| Scene::from_record(record, &self.registry))
            .collect::<Result<Vec<_>, _>>()?;

        let mut collection = match &query.geometry {
            Some(doc) => {
                let aoi = geom::polygon_from_geojson(doc)?;
                overlap::evaluate(&mut scenes, &aoi);
                if let Some(threshold) = query.overlap_threshold {
                    scenes = overlap::filter_by_threshold(scenes, threshold);
                }
                SceneCollection::with_aoi(scenes, &aoi)
            }
            None => SceneCollection::new(scenes, Default::default()),
        };

        if let Some(range) = &query.time_range {
            collection.properties.insert(
                "datetime".to_string(),
                format!(
                    "{}{}",
                    range.start.to_rfc3339(),
                    range
                        .end
                        .map(|end| format!("/{}", end.to_rfc3339()))
                        .unwrap_or_default()
                )
                .into(),
            );
        }

        Ok(collection)
    }

    /// Advance every scene's fulfillment state machine by one step: place
    /// the order if none exists, then poll status exactly once.
    pub fn order(&self, collection: &mut SceneCollection) -> Result<OrderReport, SceneError> {
        let mut items = Vec::with_capacity(collection.len());
        for scene in &mut collection.scenes {
            items.push(self.order_scene(scene)?);
        }
        Ok(OrderReport { items })
    }

    fn order_scene(&self, scene: &mut Scene) -> Result<OrderItem, SceneError> {
        let order_id = match scene.order_state.order_id() {
            Some(order_id) => order_id.to_string(),
            None => {
                let order_id = self.ordering.order(&scene.id)?;
                info!(scene = %scene.id, order = %order_id, "order placed");
                scene.order_state = OrderState::Pending {
                    order_id: order_id.clone(),
                };
                order_id
            }
        };

        if scene.order_state.is_fulfilled() {
            let location = scene.order_state.location().unwrap_or_default().to_string();
            return Ok(OrderItem {
                scene_id: scene.id.clone(),
                order_id,
                state: "delivered".to_string(),
                location,
                delivered: true,
            });
        }

        let status = self.ordering.status(&order_id)?;
        let delivered = status.location != NOT_DELIVERED;
        if delivered {
            scene.order_state = OrderState::Fulfilled {
                order_id: order_id.clone(),
                location: status.location.clone(),
            };
            info!(scene = %scene.id, location = %status.location, "order delivered");
        } else {
            info!(scene = %scene.id, state = %status.state, "order pending");
        }

        Ok(OrderItem {
            scene_id: scene.id.clone(),
            order_id,
            state: status.state,
            location: status.location,
            delivered,
        })
    }

    /// Best-effort batch fetch of the given asset products for every scene.
    /// A per-scene failure is logged and recorded; the batch continues.
    pub fn fetch(
        &self,
        collection: &mut SceneCollection,
        keys: &[AssetKey],
        config: &RuntimeConfig,
    ) -> Result<FetchReport, SceneError> {
        let aoi = collection.aoi()?;
        let bbox = geom::bounding_rect(&aoi)?;

        fs::create_dir_all(config.data_dir.as_std_path())
            .map_err(|err| SceneError::Filesystem(err.to_string()))?;

        // one AOI file and one working directory per batch, removed on all
        // exit paths by the tempfile guards
        let mut aoi_file = tempfile::Builder::new()
            .prefix("gbdx-sm-aoi")
            .suffix(".geojson")
            .tempfile()
            .map_err(|err| SceneError::Filesystem(err.to_string()))?;
        let aoi_geojson = serde_json::to_string(&geom::polygon_to_geojson(&aoi))
            .map_err(|err| SceneError::Filesystem(err.to_string()))?;
        aoi_file
            .write_all(aoi_geojson.as_bytes())
            .map_err(|err| SceneError::Filesystem(err.to_string()))?;
        let work_dir = tempfile::Builder::new()
            .prefix("gbdx-sm-fetch")
            .tempdir_in(config.data_dir.as_std_path())
            .map_err(|err| SceneError::Filesystem(err.to_string()))?;

        let mut report = FetchReport::default();
        for key in keys {
            for scene in &mut collection.scenes {
                let outcome = match *key {
                    AssetKey::Thumbnail => self.fetch_thumbnail(scene, config),
                    key => self.fetch_one(scene, key, &bbox, aoi_file.path(), work_dir.path(), config),
                };
                let outcome = match outcome {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(scene = %scene.id, asset = %key, error = %err, "fetch failed");
                        FetchOutcome::Failed {
                            reason: err.to_string(),
                        }
                    }
                };
                report.items.push(FetchItem {
                    scene_id: scene.id.clone(),
                    asset: key.to_string(),
                    outcome,
                });
            }
        }
        Ok(report)
    }

    fn fetch_thumbnail(
        &self,
        scene: &mut Scene,
        config: &RuntimeConfig,
    ) -> Result<FetchOutcome, SceneError> {
        let Some(asset) = scene.assets.get("thumbnail").cloned() else {
            return Ok(FetchOutcome::Failed {
                reason: "scene has no browse image".to_string(),
            });
        };
        let extension = asset
            .href
            .rsplit('.')
            .next()
            .filter(|ext| ext.len() <= 4)
            .unwrap_or("jpg")
            .to_string();
        let path = config.output_path(&scene.template_vars(), "_thumbnail", &extension)?;
        if path.as_std_path().exists() {
            return Ok(FetchOutcome::AlreadyPresent {
                path: path.to_string(),
            });
        }
        self.imaging.download_url(&asset.href, path.as_std_path())?;
        Ok(FetchOutcome::Fetched {
            path: path.to_string(),
        })
    }

    fn fetch_one(
        &self,
        scene: &mut Scene,
        key: AssetKey,
        bbox: &geo::Rect<f64>,
        aoi_file: &Path,
        work_dir: &Path,
        config: &RuntimeConfig,
    ) -> Result<FetchOutcome, SceneError> {
        if !scene.order_state.is_fulfilled() {
            return Ok(FetchOutcome::NotDelivered);
        }

        let suffix = match key {
            AssetKey::Default => String::new(),
            key => format!("_{key}"),
        };
        let path = config.output_path(&scene.template_vars(), &suffix, "tif")?;
        if path.as_std_path().exists() {
            scene
                .assets
                .insert(key.to_string(), Asset::new(path.to_string()));
            return Ok(FetchOutcome::AlreadyPresent {
                path: path.to_string(),
            });
        }

        let nodata = nodata_for_instrument(scene.instrument().unwrap_or_default());
        let raster = self.imaging.fetch_image(&scene.id, &key.recipe(), bbox)?;
        let cropped = self.imaging.crop(&raster, aoi_file, nodata)?;

        let staged = work_dir.join(format!("{}_{key}.tif", scene.id));
        self.imaging.write(&cropped, &staged)?;
        move_file(&staged, path.as_std_path())?;

        scene
            .assets
            .insert(key.to_string(), Asset::new(path.to_string()));
        Ok(FetchOutcome::Fetched {
            path: path.to_string(),
        })
    }
}

fn move_file(source: &Path, destination: &Path) -> Result<(), SceneError> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    fs::copy(source, destination).map_err(|err| SceneError::Filesystem(err.to_string()))?;
    fs::remove_file(source).map_err(|err| SceneError::Filesystem(err.to_string()))?;
    Ok(())
}
