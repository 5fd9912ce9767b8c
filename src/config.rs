use crate::error::AppError;
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "oxide-shelf.json";

/// Color of the book cover painted into the template.
pub const TEMPLATE_COVER_COLOR: [u8; 3] = [106, 156, 66];
pub const COLOR_MATCH_TOLERANCE: f64 = 30.0;
pub const ICO_SIZES: [u32; 6] = [256, 128, 64, 48, 32, 16];

/// Settings shared by every stage of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub cover_color: [u8; 3],

    /// Maximum RGB distance for a pixel to count as cover
    pub tolerance: f64,

    pub sizes: Vec<u32>,

    pub template_path: PathBuf,
    pub desktop_dir: PathBuf,
    pub backup_file: PathBuf,
    pub generated_dir: PathBuf,

    /// Longest side of the bitmap handed to color clustering
    pub max_analysis_dim: u32,

    /// Number of color clusters considered
    pub max_colors: usize,
}

impl Default for Config {
    fn default() -> Self {
        let base = base_dir();
        Self {
            cover_color: TEMPLATE_COVER_COLOR,
            tolerance: COLOR_MATCH_TOLERANCE,
            sizes: ICO_SIZES.to_vec(),
            template_path: base.join("book_template.png"),
            desktop_dir: dirs::desktop_dir().unwrap_or_else(|| base.join("Desktop")),
            backup_file: base.join("icon_backups").join("icon_backup.json"),
            generated_dir: base.join("generated_icons"),
            max_analysis_dim: 128,
            max_colors: 10,
        }
    }
}

impl Config {
    pub fn cover_rgb(&self) -> Rgb<u8> {
        Rgb(self.cover_color)
    }

    /// Copy with every path made absolute against the working directory.
    /// Shortcuts store icon paths verbatim, so relative ones would be
    /// resolved against the desktop by the shell.
    pub fn absolutized(&self) -> Result<Config, AppError> {
        Ok(Config {
            template_path: std::path::absolute(&self.template_path)?,
            desktop_dir: std::path::absolute(&self.desktop_dir)?,
            backup_file: std::path::absolute(&self.backup_file)?,
            generated_dir: std::path::absolute(&self.generated_dir)?,
            ..self.clone()
        })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.sizes.is_empty() {
            return Err(AppError::Config("size ladder is empty".into()));
        }
        if let Some(bad) = self.sizes.iter().find(|s| **s == 0 || **s > 256) {
            return Err(AppError::Config(format!(
                "icon size {} outside 1..=256",
                bad
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(AppError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.max_analysis_dim == 0 || self.max_colors == 0 {
            return Err(AppError::Config(
                "max_analysis_dim and max_colors must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Directory holding the executable, falling back to the working directory.
pub fn base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, AppError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

pub fn find_config() -> Option<PathBuf> {
    let candidates = [
        base_dir().join(CONFIG_FILE_NAME),
        PathBuf::from(CONFIG_FILE_NAME),
    ];

    for candidate in candidates {
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "found config");
            return Some(candidate);
        }
    }
    None
}
