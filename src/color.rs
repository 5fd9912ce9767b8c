use image::Rgb;

/// Euclidean distance between two colors in RGB space.
pub fn rgb_distance(a: Rgb<u8>, b: Rgb<u8>) -> f64 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swatch {
    pub rgb: Rgb<u8>,
    pub proportion: f32,
}
