use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SceneError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("bundled collection registry is unusable: {0}")]
    RegistryLoad(String),

    #[error("invalid AOI geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid datetime range: {0}")]
    InvalidDateRange(String),

    #[error("invalid cloud cover range: {0}")]
    InvalidCloudCover(String),

    #[error("unknown collection id: {0}")]
    UnknownCollection(String),

    #[error("platform {0} matches no collection in the registry")]
    UnknownPlatform(String),

    #[error("scene collection has no AOI; search before ordering or fetching")]
    MissingAoi,

    #[error("scene {0} has not been delivered yet")]
    NotDelivered(String),

    #[error("unrecognized asset key: {0}")]
    InvalidAssetKey(String),

    #[error("filename template error: {0}")]
    FilenameTemplate(String),

    #[error("failed to read scene file at {0}")]
    SceneFileRead(PathBuf),

    #[error("failed to parse scene file: {0}")]
    SceneFileParse(String),

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("ordering request failed: {0}")]
    OrderingHttp(String),

    #[error("ordering returned status {status}: {message}")]
    OrderingStatus { status: u16, message: String },

    #[error("imaging request failed: {0}")]
    ImagingHttp(String),

    #[error("imaging returned status {status}: {message}")]
    ImagingStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
