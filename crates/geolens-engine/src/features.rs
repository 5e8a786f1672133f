//! Pixel-level color and texture statistics for heuristic classification
//!
//! The sampler downsamples an image to a fixed 128×128 grid and makes one
//! pass over it, counting pixels that fall into five color buckets while
//! tracking mean color and the brightness range.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Edge length of the sampling grid
pub const SAMPLE_SIZE: u32 = 128;

/// Dominant color family of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DominantHue {
    Brown,
    Gray,
    Green,
    Blue,
    Neutral,
}

/// Share of sampled pixels in each color bucket
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorProfile {
    pub brown: f32,
    pub gray: f32,
    pub green: f32,
    pub blue: f32,
}

/// Compact color/texture summary of one image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub dominant_hue: DominantHue,
    /// Mean channel intensity, 0-1
    pub brightness: f32,
    /// Saturation of the mean color, 0-1
    pub saturation: f32,
    /// Brightness range across pixels, 0-1
    pub contrast: f32,
    /// `contrast * saturation`
    pub texture_complexity: f32,
    pub has_rock: bool,
    pub has_green: bool,
    pub has_building: bool,
    pub has_sky: bool,
    pub color_profile: ColorProfile,
}

/// Running totals for one scan
#[derive(Default)]
struct Accumulator {
    sum: [u64; 3],
    min_brightness: f32,
    max_brightness: f32,
    browns: u32,
    grays: u32,
    greens: u32,
    blues: u32,
    whites: u32,
    pixels: u32,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            min_brightness: 255.0,
            max_brightness: 0.0,
            ..Default::default()
        }
    }

    fn push(&mut self, [r, g, b]: [u8; 3]) {
        self.sum[0] += r as u64;
        self.sum[1] += g as u64;
        self.sum[2] += b as u64;
        self.pixels += 1;

        let (red, green, blue) = (r as f32, g as f32, b as f32);

        let pixel_brightness = (red + green + blue) / 3.0;
        self.min_brightness = self.min_brightness.min(pixel_brightness);
        self.max_brightness = self.max_brightness.max(pixel_brightness);

        // volcanic rock, earth
        if red > 100.0
            && red > green
            && green > 60.0
            && green < red * 0.8
            && blue < green * 0.9
        {
            self.browns += 1;
        }

        // stone, concrete, basalt
        if (red - green).abs() < 30.0
            && (green - blue).abs() < 30.0
            && red > 70.0
            && red < 200.0
        {
            self.grays += 1;
        }

        // vegetation
        if green > red * 1.2 && green > blue && green > 70.0 {
            self.greens += 1;
        }

        // sky, water
        if blue > red * 1.2 && blue > green && blue > 100.0 {
            self.blues += 1;
        }

        // clouds, bright facades
        if red > 200.0 && green > 200.0 && blue > 200.0 {
            self.whites += 1;
        }
    }

    fn finish(self) -> FeatureVector {
        if self.pixels == 0 {
            return FeatureVector::empty();
        }

        let pixels = self.pixels as f32;
        let r = self.sum[0] as f32 / pixels;
        let g = self.sum[1] as f32 / pixels;
        let b = self.sum[2] as f32 / pixels;

        let brightness = (r + g + b) / (3.0 * 255.0);
        let contrast = ((self.max_brightness - self.min_brightness) / 255.0).max(0.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let saturation = if max == 0.0 { 0.0 } else { (max - min) / max };

        let profile = ColorProfile {
            brown: self.browns as f32 / pixels,
            gray: self.grays as f32 / pixels,
            green: self.greens as f32 / pixels,
            blue: self.blues as f32 / pixels,
        };
        let white_ratio = self.whites as f32 / pixels;

        let dominant_hue = if profile.brown > 0.15 {
            DominantHue::Brown
        } else if profile.gray > 0.2 {
            DominantHue::Gray
        } else if profile.green > 0.15 {
            DominantHue::Green
        } else if profile.blue > 0.25 {
            DominantHue::Blue
        } else {
            DominantHue::Neutral
        };

        FeatureVector {
            dominant_hue,
            brightness,
            saturation,
            contrast,
            texture_complexity: contrast * saturation,
            has_rock: profile.brown > 0.12 || (profile.gray > 0.15 && saturation < 0.3),
            has_green: profile.green > 0.1,
            has_building: profile.gray > 0.25 && brightness > 0.3 && contrast > 0.3,
            has_sky: profile.blue > 0.2 || white_ratio > 0.15,
            color_profile: profile,
        }
    }
}

impl FeatureVector {
    /// Features of an image with no pixels
    fn empty() -> Self {
        Self {
            dominant_hue: DominantHue::Neutral,
            brightness: 0.0,
            saturation: 0.0,
            contrast: 0.0,
            texture_complexity: 0.0,
            has_rock: false,
            has_green: false,
            has_building: false,
            has_sky: false,
            color_profile: ColorProfile::default(),
        }
    }
}

/// Downsample `image` to the sampling grid and analyze it
pub fn analyze(image: &DynamicImage) -> FeatureVector {
    let sampled = image
        .resize_exact(SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle)
        .to_rgb8();
    analyze_rgb(&sampled)
}

/// Analyze an RGB buffer as-is, without resampling
pub fn analyze_rgb(pixels: &RgbImage) -> FeatureVector {
    let mut acc = Accumulator::new();
    for pixel in pixels.pixels() {
        acc.push(pixel.0);
    }
    let features = acc.finish();
    tracing::debug!(
        hue = ?features.dominant_hue,
        brightness = features.brightness,
        contrast = features.contrast,
        texture = features.texture_complexity,
        rock = features.has_rock,
        building = features.has_building,
        "sampled image features"
    );
    features
}
