use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn an icon reference into a bitmap.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("icon resource not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported resource type: {0}")]
    UnsupportedType(PathBuf),

    #[error("cannot decode icon {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("no icon at index {index} in {path}")]
    NoIconAtIndex { path: PathBuf, index: u32 },

    #[error("{call} failed for {path}")]
    Platform { call: &'static str, path: PathBuf },

    #[error("embedded icon resources can only be read on Windows: {0}")]
    UnsupportedPlatform(PathBuf),
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("no suitable color found")]
    NoColor,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("template missing: {0}")]
    TemplateMissing(PathBuf),

    #[error("cannot decode template {path}: {source}")]
    TemplateDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("encode failure: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("cannot read shortcut {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("cannot update shortcut {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("cannot determine icon for {0}")]
    NoIcon(PathBuf),
}

/// Conditions that abort a whole run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("template icon not found: {0}")]
    TemplateMissing(PathBuf),

    #[error(transparent)]
    Template(#[from] ComposeError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("shortcut shell unavailable: {0}")]
    ShellUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Step of the per-shortcut pipeline, used as logging context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadOriginal,
    Extract,
    Analyze,
    Composite,
    Apply,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ReadOriginal => "read-original-ref",
            Stage::Extract => "extract-bitmap",
            Stage::Analyze => "analyze-color",
            Stage::Composite => "composite-icon",
            Stage::Apply => "apply-to-shortcut",
        };
        f.write_str(name)
    }
}

/// A per-shortcut failure tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl StageError {
    pub fn new<E>(stage: Stage, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            stage,
            source: Box::new(source),
        }
    }
}
