//! Picks the color an icon is "about".
//!
//! The bitmap is shrunk, its opaque pixels are bucketed by luma, hue and
//! lightness, and the biggest buckets become candidate swatches. Candidates
//! that are gray, near black, near white or washed out are dropped before
//! the largest survivor is chosen.

use crate::color::Swatch;
use crate::config::Config;
use crate::error::AnalyzeError;
use image::{Rgb, RgbaImage, imageops};
use std::fmt;

const GRAY_SPREAD: i32 = 15;
const MIN_CHANNEL_SUM: u32 = 50;
const MAX_CHANNEL_SUM: u32 = 700;
const MIN_SATURATION_SPREAD: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Grayscale,
    TooDark,
    TooLight,
    LowSaturation,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::Grayscale => "grayscale",
            Rejection::TooDark => "too dark",
            Rejection::TooLight => "too light",
            Rejection::LowSaturation => "low saturation",
        })
    }
}

pub fn rejection(rgb: Rgb<u8>) -> Option<Rejection> {
    let [r, g, b] = rgb.0.map(i32::from);
    let sum = (r + g + b) as u32;

    let spread = (r - g).abs().max((g - b).abs()).max((r - b).abs());
    if spread < GRAY_SPREAD {
        return Some(Rejection::Grayscale);
    }
    if sum < MIN_CHANNEL_SUM {
        return Some(Rejection::TooDark);
    }
    if sum > MAX_CHANNEL_SUM {
        return Some(Rejection::TooLight);
    }
    if r.max(g).max(b) - r.min(g).min(b) <= MIN_SATURATION_SPREAD {
        return Some(Rejection::LowSaturation);
    }
    None
}

/// Shrink so the longer side is at most `max_dim`. Smaller images are
/// returned as-is.
pub fn downscale(image: &RgbaImage, max_dim: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    if w <= max_dim && h <= max_dim {
        return image.clone();
    }
    let scale = max_dim as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    imageops::thumbnail(image, new_w, new_h)
}

#[derive(Default, Clone, Copy)]
struct Bucket {
    r: u64,
    g: u64,
    b: u64,
    count: u64,
}

/// Group pixels into at most `max_colors` swatches, largest first.
///
/// Fully transparent pixels carry no color and are ignored. Buckets of equal
/// size keep their bucket order, so the result is deterministic.
pub fn cluster_colors(image: &RgbaImage, max_colors: usize) -> Vec<Swatch> {
    let mut buckets = vec![Bucket::default(); 256];
    let mut total = 0u64;

    for p in image.pixels() {
        let [r, g, b, a] = p.0;
        if a == 0 {
            continue;
        }
        let bucket = &mut buckets[bucket_key(r, g, b)];
        bucket.r += r as u64;
        bucket.g += g as u64;
        bucket.b += b as u64;
        bucket.count += 1;
        total += 1;
    }

    if total == 0 {
        return Vec::new();
    }

    let mut filled: Vec<Bucket> = buckets.into_iter().filter(|b| b.count > 0).collect();
    filled.sort_by(|a, b| b.count.cmp(&a.count));

    filled
        .into_iter()
        .take(max_colors)
        .map(|b| Swatch {
            rgb: Rgb([
                (b.r / b.count) as u8,
                (b.g / b.count) as u8,
                (b.b / b.count) as u8,
            ]),
            proportion: (b.count as f64 / total as f64) as f32,
        })
        .collect()
}

// 3 bits of luma, 3 bits of hue, 2 bits of lightness.
fn bucket_key(r: u8, g: u8, b: u8) -> usize {
    let luma = (0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64) as usize;
    let (hue, lightness) = hue_lightness(r, g, b);
    ((luma.min(255) >> 5) << 5) | ((hue >> 5) << 2) | (lightness >> 6)
}

fn hue_lightness(r: u8, g: u8, b: u8) -> (usize, usize) {
    let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;

    let delta = max - min;
    let sector = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    let hue = sector / 6.0;

    let scale = |v: f64| ((v * 255.0).round() as usize).min(255);
    (scale(hue), scale(lightness))
}

/// First swatch with the largest proportion.
fn most_prominent<'a>(swatches: impl Iterator<Item = &'a Swatch>) -> Option<&'a Swatch> {
    swatches.reduce(|best, s| if s.proportion > best.proportion { s } else { best })
}

pub fn dominant_color(image: &RgbaImage, config: &Config) -> Result<Rgb<u8>, AnalyzeError> {
    let small = downscale(image, config.max_analysis_dim);
    let swatches = cluster_colors(&small, config.max_colors);
    if swatches.is_empty() {
        tracing::warn!("could not extract any colors");
        return Err(AnalyzeError::NoColor);
    }

    for s in &swatches {
        if let Some(why) = rejection(s.rgb) {
            tracing::debug!(rgb = ?s.rgb.0, proportion = s.proportion, "rejected: {}", why);
        }
    }

    let suitable = most_prominent(swatches.iter().filter(|s| rejection(s.rgb).is_none()));
    if let Some(best) = suitable {
        tracing::debug!(rgb = ?best.rgb.0, "dominant suitable color");
        return Ok(best.rgb);
    }

    let fallback = most_prominent(swatches.iter()).ok_or(AnalyzeError::NoColor)?;
    tracing::warn!(
        rgb = ?fallback.rgb.0,
        "no ideal color found, using most prominent"
    );
    Ok(fallback.rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Image whose first `split` pixels (row-major) are `a` and the rest `b`.
    fn two_tone(w: u32, h: u32, split: u32, a: Rgba<u8>, b: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| if y * w + x < split { a } else { b })
    }

    #[test]
    fn test_rejection_rules() {
        assert_eq!(rejection(Rgb([128, 128, 128])), Some(Rejection::Grayscale));
        assert_eq!(rejection(Rgb([120, 130, 125])), Some(Rejection::Grayscale));
        assert_eq!(rejection(Rgb([30, 0, 15])), Some(Rejection::TooDark));
        assert_eq!(rejection(Rgb([255, 255, 200])), Some(Rejection::TooLight));
        assert_eq!(rejection(Rgb([200, 50, 50])), None);
        assert_eq!(rejection(Rgb([106, 156, 66])), None);
    }

    #[test]
    fn test_downscale_preserves_aspect() {
        let img = RgbaImage::new(300, 150);
        let small = downscale(&img, 128);
        assert_eq!(small.dimensions(), (128, 64));

        let tiny = RgbaImage::new(32, 16);
        assert_eq!(downscale(&tiny, 128).dimensions(), (32, 16));
    }

    #[test]
    fn test_cluster_proportions() {
        let img = two_tone(10, 10, 25, Rgba([200, 50, 50, 255]), Rgba([40, 60, 200, 255]));
        let swatches = cluster_colors(&img, 10);
        assert_eq!(swatches.len(), 2);
        assert_eq!(swatches[0].rgb, Rgb([40, 60, 200]));
        assert!((swatches[0].proportion - 0.75).abs() < 1e-6);
        assert_eq!(swatches[1].rgb, Rgb([200, 50, 50]));
        assert!((swatches[1].proportion - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_cluster_ignores_transparent_pixels() {
        let img = two_tone(10, 10, 90, Rgba([0, 0, 0, 0]), Rgba([200, 50, 50, 255]));
        let swatches = cluster_colors(&img, 10);
        assert_eq!(swatches.len(), 1);
        assert_eq!(swatches[0].rgb, Rgb([200, 50, 50]));
        assert_eq!(swatches[0].proportion, 1.0);
    }

    #[test]
    fn test_dominant_skips_gray_majority() {
        let img = two_tone(10, 10, 60, Rgba([128, 128, 128, 255]), Rgba([200, 50, 50, 255]));
        let color = dominant_color(&img, &Config::default()).unwrap();
        assert_eq!(color, Rgb([200, 50, 50]));
    }

    #[test]
    fn test_dominant_falls_back_to_most_prominent() {
        let img = two_tone(10, 10, 70, Rgba([255, 255, 255, 255]), Rgba([128, 128, 128, 255]));
        let color = dominant_color(&img, &Config::default()).unwrap();
        assert_eq!(color, Rgb([255, 255, 255]));
    }

    #[test]
    fn test_dominant_fails_on_blank_image() {
        let img = RgbaImage::new(16, 16);
        assert!(matches!(
            dominant_color(&img, &Config::default()),
            Err(AnalyzeError::NoColor)
        ));
    }

    #[test]
    fn test_equal_proportions_pick_first_listed() {
        let swatches = [
            Swatch {
                rgb: Rgb([200, 50, 50]),
                proportion: 0.5,
            },
            Swatch {
                rgb: Rgb([40, 60, 200]),
                proportion: 0.5,
            },
        ];
        assert_eq!(most_prominent(swatches.iter()).unwrap().rgb, Rgb([200, 50, 50]));

        let img = two_tone(10, 10, 50, Rgba([200, 50, 50, 255]), Rgba([40, 60, 200, 255]));
        let listed = cluster_colors(&img, 10);
        let color = dominant_color(&img, &Config::default()).unwrap();
        assert_eq!(color, listed[0].rgb);
    }

    #[test]
    fn test_dominant_works_on_large_image() {
        let img = two_tone(512, 512, 512 * 400, Rgba([40, 60, 200, 255]), Rgba([20, 20, 20, 255]));
        let color = dominant_color(&img, &Config::default()).unwrap();
        let [r, g, b] = color.0;
        assert!(b > 150 && r < 80 && g < 100, "got {:?}", color.0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn candidate() -> impl Strategy<Value = [u8; 3]> {
            prop_oneof![
                any::<u8>().prop_map(|v| [v, v, v]),
                (0u8..16, 0u8..16, 0u8..16).prop_map(|(r, g, b)| [r, g, b]),
                (235u8..=255, 235u8..=255, 235u8..=255).prop_map(|(r, g, b)| [r, g, b]),
                any::<[u8; 3]>(),
            ]
        }

        proptest! {
            #[test]
            fn dominant_is_acceptable_when_any_cluster_is(
                mix in prop::collection::vec((candidate(), 1u32..20), 1..7)
            ) {
                let pixels: Vec<Rgba<u8>> = mix
                    .iter()
                    .flat_map(|&([r, g, b], n)| std::iter::repeat_n(Rgba([r, g, b, 255]), n as usize))
                    .collect();
                let img = RgbaImage::from_fn(pixels.len() as u32, 1, |x, _| pixels[x as usize]);
                let config = Config::default();

                let swatches = cluster_colors(&downscale(&img, config.max_analysis_dim), config.max_colors);
                let best = most_prominent(swatches.iter().filter(|s| rejection(s.rgb).is_none()));
                let color = dominant_color(&img, &config).unwrap();

                if let Some(best) = best {
                    prop_assert_eq!(rejection(color), None);
                    prop_assert_eq!(color, best.rgb);
                } else {
                    prop_assert_eq!(color, swatches[0].rgb);
                }
            }
        }
    }
}
