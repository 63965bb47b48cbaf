use std::fs::File;
use std::path::Path;
use std::time::Duration;

use geo::Rect;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};

use crate::catalog::TOKEN_ENV;
use crate::domain::Recipe;
use crate::error::SceneError;
use crate::geom;

/// Lazy reference to a provider-side raster. Nothing is transferred until
/// [`ImagingClient::write`]; cropping just narrows the reference.
#[derive(Debug, Clone)]
pub struct RasterHandle {
    pub scene_id: String,
    pub recipe: Recipe,
    pub bbox: Rect<f64>,
    pub cutline_wkt: Option<String>,
    pub nodata: Option<f64>,
}

/// External imaging collaborator. Pixel work (recipes, cropping, nodata
/// rewriting) happens on the provider side; this boundary only narrows and
/// materializes raster references.
pub trait ImagingClient: Send + Sync {
    /// Open a full-resolution image reference for a scene, processed per
    /// the recipe, restricted to the given bounding box.
    fn fetch_image(
        &self,
        scene_id: &str,
        recipe: &Recipe,
        bbox: &Rect<f64>,
    ) -> Result<RasterHandle, SceneError>;

    /// Narrow a reference to the cutline polygon (a GeoJSON file) at native
    /// resolution, with the given nodata value outside the cutline.
    fn crop(
        &self,
        raster: &RasterHandle,
        cutline: &Path,
        nodata: f64,
    ) -> Result<RasterHandle, SceneError>;

    /// Materialize the referenced raster into a local file.
    fn write(&self, raster: &RasterHandle, destination: &Path) -> Result<(), SceneError>;

    /// Plain download of a provider URL (browse images).
    fn download_url(&self, url: &str, destination: &Path) -> Result<(), SceneError>;
}

#[derive(Clone)]
pub struct GbdxImagingClient {
    client: Client,
    base_url: String,
}

impl GbdxImagingClient {
    pub fn new() -> Result<Self, SceneError> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(SceneError::MissingEnv(TOKEN_ENV))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gbdx-sm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SceneError::ImagingHttp(err.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|err| SceneError::ImagingHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| SceneError::ImagingHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://idaho.geobigdata.io".to_string(),
        })
    }

    fn write_response_to_file(
        mut response: reqwest::blocking::Response,
        destination: &Path,
    ) -> Result<(), SceneError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "imaging request failed".to_string());
            return Err(SceneError::ImagingStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| SceneError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| SceneError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl ImagingClient for GbdxImagingClient {
    fn fetch_image(
        &self,
        scene_id: &str,
        recipe: &Recipe,
        bbox: &Rect<f64>,
    ) -> Result<RasterHandle, SceneError> {
        Ok(RasterHandle {
            scene_id: scene_id.to_string(),
            recipe: *recipe,
            bbox: *bbox,
            cutline_wkt: None,
            nodata: None,
        })
    }

    fn crop(
        &self,
        raster: &RasterHandle,
        cutline: &Path,
        nodata: f64,
    ) -> Result<RasterHandle, SceneError> {
        let text = std::fs::read_to_string(cutline)
            .map_err(|err| SceneError::Filesystem(err.to_string()))?;
        let polygon = geom::polygon_from_geojson_str(&text)?;
        Ok(RasterHandle {
            cutline_wkt: Some(geom::polygon_to_wkt(&polygon)),
            nodata: Some(nodata),
            ..raster.clone()
        })
    }

    fn write(&self, raster: &RasterHandle, destination: &Path) -> Result<(), SceneError> {
        let url = format!("{}/v1/geotiff/{}", self.base_url, raster.scene_id);
        let bbox = format!(
            "{},{},{},{}",
            raster.bbox.min().x,
            raster.bbox.min().y,
            raster.bbox.max().x,
            raster.bbox.max().y
        );

        let mut query: Vec<(&str, String)> = vec![
            ("bbox", bbox),
            ("pansharpen", raster.recipe.pansharpen.to_string()),
            ("acomp", raster.recipe.acomp.to_string()),
            ("dra", raster.recipe.dra.to_string()),
        ];
        if let Some(cutline) = &raster.cutline_wkt {
            query.push(("cutline", cutline.clone()));
        }
        if let Some(nodata) = raster.nodata {
            query.push(("nodata", nodata.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .map_err(|err| SceneError::ImagingHttp(err.to_string()))?;
        Self::write_response_to_file(response, destination)
    }

    fn download_url(&self, url: &str, destination: &Path) -> Result<(), SceneError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SceneError::ImagingHttp(err.to_string()))?;
        Self::write_response_to_file(response, destination)
    }
}
