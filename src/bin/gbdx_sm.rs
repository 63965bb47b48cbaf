use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use gbdx_scene_manager::app::App;
use gbdx_scene_manager::catalog::{CatalogClient, GbdxCatalogClient, RawRecord};
use gbdx_scene_manager::collections::CollectionRegistry;
use gbdx_scene_manager::config::RuntimeConfig;
use gbdx_scene_manager::domain::{AssetKey, Recipe};
use gbdx_scene_manager::error::SceneError;
use gbdx_scene_manager::imaging::{GbdxImagingClient, ImagingClient, RasterHandle};
use gbdx_scene_manager::ordering::{GbdxOrderingClient, OrderStatus, OrderingClient};
use gbdx_scene_manager::output::{self, JsonOutput};
use gbdx_scene_manager::query::{CatalogSearchRequest, SceneQuery};
use gbdx_scene_manager::scene::SceneCollection;

#[derive(Parser)]
#[command(name = "gbdx-sm")]
#[command(about = "Search, order, and clip GBDX satellite scenes against an AOI")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON reports instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search the catalog for scenes matching the filters")]
    Search(SearchArgs),
    #[command(about = "Load a previously saved scene collection")]
    Load(LoadArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// GeoJSON file with the area of interest
    #[arg(long)]
    intersects: Option<PathBuf>,

    /// Datetime or datetime range, e.g. 2017-01-01/2017-11-01
    #[arg(long)]
    datetime: Option<String>,

    /// Cloud cover bounds in percent, e.g. 0/10 or just 10
    #[arg(long)]
    clouds: Option<String>,

    /// Collection ids to search, e.g. wv02 ge01
    #[arg(long, num_args = 1..)]
    collections: Vec<String>,

    /// Fetch these catalog ids directly, ignoring all other filters
    #[arg(long, num_args = 1..)]
    ids: Vec<String>,

    /// Minimum percent of the AOI a footprint must cover (0-100)
    #[arg(long)]
    overlap: Option<u8>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct LoadArgs {
    /// Scene collection file written by a previous run
    path: PathBuf,

    /// Keep only these scene ids
    #[arg(long, num_args = 1..)]
    ids: Vec<String>,

    /// Keep only scenes from these collections
    #[arg(long, num_args = 1..)]
    collections: Vec<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    /// Place orders (and poll status once) for all scenes
    #[arg(long)]
    order: bool,

    /// Download these asset keys (thumbnail, rgb, visual, analytic, default)
    #[arg(long, num_args = 1..)]
    download: Vec<String>,

    /// Print these metadata columns per scene
    #[arg(long, num_args = 1..)]
    print_md: Vec<String>,

    /// Save the scene collection to this file
    #[arg(long)]
    save: Option<PathBuf>,

    /// Merge into an existing file instead of overwriting
    #[arg(long)]
    append: bool,

    /// Directory for downloaded imagery
    #[arg(long)]
    datadir: Option<String>,

    /// Output filename pattern
    #[arg(long)]
    filename: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(scene) = report.downcast_ref::<SceneError>() {
            return ExitCode::from(map_exit_code(scene));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SceneError) -> u8 {
    match error {
        SceneError::MissingEnv(_)
        | SceneError::RegistryLoad(_)
        | SceneError::InvalidGeometry(_)
        | SceneError::InvalidDateRange(_)
        | SceneError::InvalidCloudCover(_)
        | SceneError::UnknownCollection(_)
        | SceneError::UnknownPlatform(_)
        | SceneError::MissingAoi
        | SceneError::InvalidAssetKey(_)
        | SceneError::FilenameTemplate(_)
        | SceneError::SceneFileRead(_)
        | SceneError::SceneFileParse(_) => 2,
        SceneError::CatalogHttp(_)
        | SceneError::CatalogStatus { .. }
        | SceneError::OrderingHttp(_)
        | SceneError::OrderingStatus { .. }
        | SceneError::ImagingHttp(_)
        | SceneError::ImagingStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = CollectionRegistry::load().into_diagnostic()?;

    match cli.command {
        Commands::Search(args) => run_search(args, registry, cli.json),
        Commands::Load(args) => run_load(args, registry, cli.json),
    }
}

fn run_search(args: SearchArgs, registry: CollectionRegistry, json: bool) -> miette::Result<()> {
    let SearchArgs {
        intersects,
        datetime,
        clouds,
        collections,
        ids,
        overlap,
        common,
    } = args;

    let geometry = intersects
        .map(|path| {
            let text = std::fs::read_to_string(&path)
                .map_err(|_| SceneError::SceneFileRead(path.clone()))?;
            text.parse::<geojson::GeoJson>()
                .map_err(|err| SceneError::InvalidGeometry(err.to_string()))
        })
        .transpose()
        .into_diagnostic()?;

    let query = SceneQuery {
        geometry,
        time_range: datetime
            .as_deref()
            .map(str::parse)
            .transpose()
            .into_diagnostic()?,
        collection_ids: collections,
        cloud_cover: clouds
            .as_deref()
            .map(str::parse)
            .transpose()
            .into_diagnostic()?,
        overlap_threshold: overlap.map(|pct| f64::from(pct.min(100)) / 100.0),
        explicit_ids: ids,
        types: Vec::new(),
    };

    let catalog = GbdxCatalogClient::new().into_diagnostic()?;
    let ordering = GbdxOrderingClient::new().into_diagnostic()?;
    let imaging = GbdxImagingClient::new().into_diagnostic()?;
    let app = App::new(registry, catalog, ordering, imaging);

    let mut collection = app.search(&query).into_diagnostic()?;
    finish(&app, &mut collection, &common, json)?;

    if let Some(path) = &common.save {
        collection
            .save(path, common.append)
            .into_diagnostic()?;
    }
    Ok(())
}

fn run_load(args: LoadArgs, registry: CollectionRegistry, json: bool) -> miette::Result<()> {
    let LoadArgs {
        path,
        ids,
        collections,
        common,
    } = args;
    let mut collection = SceneCollection::load(&path).into_diagnostic()?;
    if !ids.is_empty() {
        collection.retain_ids(&ids);
    }
    if !collections.is_empty() {
        collection.retain_collections(&collections);
    }

    let needs_network = common.order || !common.download.is_empty();
    if needs_network {
        let catalog = GbdxCatalogClient::new().into_diagnostic()?;
        let ordering = GbdxOrderingClient::new().into_diagnostic()?;
        let imaging = GbdxImagingClient::new().into_diagnostic()?;
        let app = App::new(registry, catalog, ordering, imaging);
        finish(&app, &mut collection, &common, json)?;
    } else {
        let app = App::new(registry, NopCatalog, NopOrdering, NopImaging);
        finish(&app, &mut collection, &common, json)?;
    }

    // re-save so ordering information accumulated this run is not lost
    let save_path = common.save.as_deref().unwrap_or(&path);
    collection.save(save_path, common.append).into_diagnostic()?;
    Ok(())
}

fn finish<C: CatalogClient, O: OrderingClient, I: ImagingClient>(
    app: &App<C, O, I>,
    collection: &mut SceneCollection,
    common: &CommonArgs,
    json: bool,
) -> miette::Result<()> {
    if !common.print_md.is_empty() {
        output::print_scenes(collection, &common.print_md);
    }

    if common.order {
        let report = app.order(collection).into_diagnostic()?;
        if json {
            JsonOutput::print_order(&report).into_diagnostic()?;
        } else {
            for item in &report.items {
                println!(
                    "{}\t{}\t{}\t{}",
                    item.order_id, item.scene_id, item.state, item.location
                );
            }
        }
    }

    println!("{} scenes found", collection.len());

    if !common.download.is_empty() {
        let config = RuntimeConfig::resolve(common.datadir.as_deref(), common.filename.as_deref());
        let mut keys = Vec::new();
        for raw in &common.download {
            match raw.parse::<AssetKey>() {
                Ok(key) => keys.push(key),
                Err(_) => warn!(key = %raw, "download key not recognized"),
            }
        }
        if !keys.is_empty() {
            let report = app.fetch(collection, &keys, &config).into_diagnostic()?;
            if json {
                JsonOutput::print_fetch(&report).into_diagnostic()?;
            } else {
                println!(
                    "downloaded {} of {} ({} failed)",
                    report.fetched(),
                    report.items.len(),
                    report.failed()
                );
            }
        }
    }

    Ok(())
}

#[derive(Clone, Copy)]
struct NopCatalog;
struct NopOrdering;
struct NopImaging;

impl CatalogClient for NopCatalog {
    fn search(&self, _request: &CatalogSearchRequest) -> Result<Vec<RawRecord>, SceneError> {
        Err(SceneError::CatalogHttp(
            "catalog client not configured".to_string(),
        ))
    }

    fn fetch_records(&self, _ids: &[String]) -> Result<Vec<RawRecord>, SceneError> {
        Err(SceneError::CatalogHttp(
            "catalog client not configured".to_string(),
        ))
    }
}

impl OrderingClient for NopOrdering {
    fn order(&self, _scene_id: &str) -> Result<String, SceneError> {
        Err(SceneError::OrderingHttp(
            "ordering client not configured".to_string(),
        ))
    }

    fn status(&self, _order_id: &str) -> Result<OrderStatus, SceneError> {
        Err(SceneError::OrderingHttp(
            "ordering client not configured".to_string(),
        ))
    }
}

impl ImagingClient for NopImaging {
    fn fetch_image(
        &self,
        _scene_id: &str,
        _recipe: &Recipe,
        _bbox: &geo::Rect<f64>,
    ) -> Result<RasterHandle, SceneError> {
        Err(SceneError::ImagingHttp(
            "imaging client not configured".to_string(),
        ))
    }

    fn crop(
        &self,
        _raster: &RasterHandle,
        _cutline: &std::path::Path,
        _nodata: f64,
    ) -> Result<RasterHandle, SceneError> {
        Err(SceneError::ImagingHttp(
            "imaging client not configured".to_string(),
        ))
    }

    fn write(&self, _raster: &RasterHandle, _destination: &std::path::Path) -> Result<(), SceneError> {
        Err(SceneError::ImagingHttp(
            "imaging client not configured".to_string(),
        ))
    }

    fn download_url(&self, _url: &str, _destination: &std::path::Path) -> Result<(), SceneError> {
        Err(SceneError::ImagingHttp(
            "imaging client not configured".to_string(),
        ))
    }
}
