use crate::color::rgb_distance;
use crate::config::Config;
use crate::error::ComposeError;
use image::codecs::ico::{IcoEncoder, IcoFrame};
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, Rgb, Rgba, RgbaImage};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub struct Compositor {
    template: RgbaImage,
    cover_color: Rgb<u8>,
    tolerance: f64,
    sizes: Vec<u32>,
}

impl Compositor {
    /// Load the template named in `config`. Called once per run.
    pub fn from_config(config: &Config) -> Result<Self, ComposeError> {
        let path = &config.template_path;
        if !path.exists() {
            return Err(ComposeError::TemplateMissing(path.clone()));
        }
        let template = image::open(path)
            .map_err(|source| ComposeError::TemplateDecode {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        Ok(Self::new(template, config))
    }

    pub fn new(template: RgbaImage, config: &Config) -> Self {
        Self {
            template,
            cover_color: config.cover_rgb(),
            tolerance: config.tolerance,
            sizes: config.sizes.clone(),
        }
    }

    pub fn template(&self) -> &RgbaImage {
        &self.template
    }

    /// Template with every cover-colored pixel replaced by `target`. Alpha is
    /// kept from the template; all other pixels are copied unchanged.
    pub fn recolor(&self, target: Rgb<u8>) -> RgbaImage {
        let mut out = self.template.clone();
        for px in out.pixels_mut() {
            let [r, g, b, a] = px.0;
            if rgb_distance(Rgb([r, g, b]), self.cover_color) < self.tolerance {
                *px = Rgba([target[0], target[1], target[2], a]);
            }
        }
        out
    }

    /// Recolor and write a multi-resolution icon to `dest`, replacing any
    /// existing file.
    pub fn write_icon(&self, target: Rgb<u8>, dest: &Path) -> Result<(), ComposeError> {
        let img = self.recolor(target);
        write_ico(&img, &self.sizes, dest)?;
        tracing::info!(path = %dest.display(), "saved new icon");
        Ok(())
    }
}

/// Fit `img` into an NxN square, centered on a transparent canvas.
pub fn fit_square(img: &RgbaImage, size: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w == h {
        return imageops::resize(img, size, size, FilterType::Lanczos3);
    }

    let scale = size as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(img, new_w, new_h, FilterType::Lanczos3);

    let mut canvas = RgbaImage::new(size, size);
    let x = ((size - new_w) / 2) as i64;
    let y = ((size - new_h) / 2) as i64;
    imageops::overlay(&mut canvas, &resized, x, y);
    canvas
}

/// Encode one frame per entry of `sizes` into a single `.ico` at `dest`.
///
/// The file is written beside `dest` first and renamed into place.
pub fn write_ico(img: &RgbaImage, sizes: &[u32], dest: &Path) -> Result<(), ComposeError> {
    let frames = sizes
        .iter()
        .map(|&size| {
            let frame = fit_square(img, size);
            IcoFrame::as_png(frame.as_raw(), size, size, ExtendedColorType::Rgba8)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = sibling_tmp(dest);
    let written = File::create(&tmp)
        .map_err(ComposeError::from)
        .and_then(|file| {
            IcoEncoder::new(BufWriter::new(file))
                .encode_images(&frames)
                .map_err(ComposeError::from)
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, dest).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })?;
    Ok(())
}

pub(crate) fn sibling_tmp(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}
