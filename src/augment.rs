//! HSV colour jitter for training images
//!
//! Replaces (or blends towards) a random hue, then scales saturation and
//! brightness. Hues close to the background's red/brown family are never
//! drawn, so the model cannot lean on colour to find the object. Labels are
//! never touched: only pixel colours change, geometry stays the same.

use std::fs;
use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};

/// Hue is measured in degrees on `[0, 360)`.
pub const HUE_MAX: f32 = 360.0;

/// Red/orange at the bottom of the wheel and deep red wrapping back to it.
pub const DEFAULT_FORBIDDEN_HUES: [(f32, f32); 2] = [(0.0, 30.0), (320.0, 360.0)];

/// Colour jitter settings, loadable from YAML. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// 0.0 leaves hue alone, 1.0 replaces it outright.
    pub hue_strength: f32,
    /// Saturation multiplier range.
    pub saturation: (f32, f32),
    /// Brightness (value) multiplier range.
    pub value: (f32, f32),
    /// Inclusive hue ranges, in degrees, that are never sampled.
    pub forbidden_hues: Vec<(f32, f32)>,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            hue_strength: 1.0,
            saturation: (0.7, 1.4),
            value: (0.7, 1.3),
            forbidden_hues: DEFAULT_FORBIDDEN_HUES.to_vec(),
        }
    }
}

impl JitterConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| PrepError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| PrepError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn build(&self) -> Result<ColourJitter> {
        if !self.hue_strength.is_finite() {
            return Err(PrepError::InvalidJitter(format!(
                "hue_strength must be finite, got {}",
                self.hue_strength
            )));
        }
        check_range("saturation", self.saturation)?;
        check_range("value", self.value)?;

        Ok(ColourJitter {
            hue_strength: self.hue_strength,
            saturation: self.saturation,
            value: self.value,
            hues: HueSampler::new(&self.forbidden_hues)?,
        })
    }
}

fn check_range(name: &str, (lo, hi): (f32, f32)) -> Result<()> {
    if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
        return Err(PrepError::InvalidJitter(format!(
            "{} range must satisfy 0 <= min <= max, got ({}, {})",
            name, lo, hi
        )));
    }
    Ok(())
}

/// Uniform hue sampler over the wheel minus a set of forbidden ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct HueSampler {
    forbidden: Vec<(f32, f32)>,
    /// Complement of `forbidden` within `[0, HUE_MAX)`, sorted.
    allowed: Vec<(f32, f32)>,
    allowed_total: f32,
}

impl HueSampler {
    pub fn new(forbidden: &[(f32, f32)]) -> Result<Self> {
        let mut ranges = Vec::with_capacity(forbidden.len());
        for &(lo, hi) in forbidden {
            if !(0.0..=HUE_MAX).contains(&lo) || !(0.0..=HUE_MAX).contains(&hi) || lo > hi {
                return Err(PrepError::InvalidJitter(format!(
                    "forbidden hue range ({}, {}) must lie within [0, {}] with min <= max",
                    lo, hi, HUE_MAX
                )));
            }
            ranges.push((lo, hi));
        }
        ranges.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut allowed = Vec::new();
        let mut cursor = 0.0_f32;
        for &(lo, hi) in &ranges {
            if lo > cursor {
                allowed.push((cursor, lo));
            }
            cursor = cursor.max(hi);
        }
        if cursor < HUE_MAX {
            allowed.push((cursor, HUE_MAX));
        }

        let allowed_total: f32 = allowed.iter().map(|(lo, hi)| hi - lo).sum();
        if allowed_total <= 0.0 {
            return Err(PrepError::InvalidJitter(
                "forbidden hue ranges cover the whole hue wheel".to_string(),
            ));
        }

        Ok(Self {
            forbidden: ranges,
            allowed,
            allowed_total,
        })
    }

    pub fn is_forbidden(&self, hue: f32) -> bool {
        self.forbidden.iter().any(|&(lo, hi)| lo <= hue && hue <= hi)
    }

    /// Draw directly over the allowed intervals. Forbidden bounds are
    /// inclusive, so a draw landing exactly on one is retried.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        loop {
            let mut offset = rng.gen_range(0.0..self.allowed_total);
            let mut hue = None;
            for &(lo, hi) in &self.allowed {
                let width = hi - lo;
                if offset < width {
                    hue = Some(lo + offset);
                    break;
                }
                offset -= width;
            }
            let hue = hue.unwrap_or(self.allowed[self.allowed.len() - 1].0);
            if hue < HUE_MAX && !self.is_forbidden(hue) {
                return hue;
            }
        }
    }
}

/// The random values drawn for one augmentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterDraw {
    /// `None` when hue strength is zero and the hue step is skipped.
    pub hue: Option<f32>,
    pub saturation: f32,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColourJitter {
    hue_strength: f32,
    saturation: (f32, f32),
    value: (f32, f32),
    hues: HueSampler,
}

impl ColourJitter {
    pub fn hue_sampler(&self) -> &HueSampler {
        &self.hues
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> JitterDraw {
        let hue = (self.hue_strength != 0.0).then(|| self.hues.sample(rng));
        JitterDraw {
            hue,
            saturation: multiplier(self.saturation, rng),
            value: multiplier(self.value, rng),
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> RgbImage {
        self.apply_with_draw(image, rng).0
    }

    pub fn apply_with_draw<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> (RgbImage, JitterDraw) {
        let draw = self.draw(rng);
        (apply_draw(image, self.hue_strength, &draw), draw)
    }

    /// Jitter a decoded image. Only 8-bit RGB is accepted; anything else is a
    /// programming error and panics.
    pub fn apply_dynamic<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> DynamicImage {
        match image {
            DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(self.apply(rgb, rng)),
            other => panic!(
                "colour jitter needs an 8-bit RGB image, got {:?}",
                other.color()
            ),
        }
    }
}

/// One-shot jitter with the default forbidden hues and a thread-local
/// generator. Panics on a NaN or infinite multiplier range.
pub fn augment(
    image: &RgbImage,
    hue_strength: f32,
    sat_range: (f32, f32),
    val_range: (f32, f32),
) -> RgbImage {
    for (name, (lo, hi)) in [("saturation", sat_range), ("value", val_range)] {
        assert!(
            lo.is_finite() && hi.is_finite(),
            "{} range must be finite, got ({}, {})",
            name,
            lo,
            hi
        );
    }

    let mut rng = rand::thread_rng();
    let draw = JitterDraw {
        hue: (hue_strength != 0.0).then(|| default_sampler().sample(&mut rng)),
        saturation: multiplier(sat_range, &mut rng),
        value: multiplier(val_range, &mut rng),
    };
    apply_draw(image, hue_strength, &draw)
}

fn default_sampler() -> HueSampler {
    HueSampler {
        forbidden: DEFAULT_FORBIDDEN_HUES.to_vec(),
        allowed: vec![(30.0, 320.0)],
        allowed_total: 290.0,
    }
}

fn multiplier<R: Rng + ?Sized>((a, b): (f32, f32), rng: &mut R) -> f32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi {
        lo
    } else {
        rng.gen_range(lo..hi)
    }
}

fn apply_draw(image: &RgbImage, hue_strength: f32, draw: &JitterDraw) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let [mut h, s, v] = rgb_to_hsv(pixel.0);
        if let Some(new_hue) = draw.hue {
            h = (1.0 - hue_strength) * h + hue_strength * new_hue;
        }
        let hsv = [
            h.clamp(0.0, HUE_MAX),
            (s * draw.saturation).clamp(0.0, 1.0),
            (v * draw.value).clamp(0.0, 1.0),
        ];
        *pixel = Rgb(hsv_to_rgb(hsv));
    }
    out
}

/// `[h, s, v]` with hue in degrees and saturation/value in `[0, 1]`.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [f32; 3] {
    let r = f32::from(r) / 255.0;
    let g = f32::from(g) / 255.0;
    let b = f32::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    [h, s, max]
}

pub fn hsv_to_rgb([h, s, v]: [f32; 3]) -> [u8; 3] {
    let sector = h.rem_euclid(HUE_MAX) / 60.0;
    let c = v * s;
    let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let to_u8 = |channel: f32| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn solid(width: u32, height: u32, colour: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(colour))
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 37 % 256) as u8, (y * 53 % 256) as u8, ((x + y) * 11 % 256) as u8])
        })
    }

    /// Hue of the most frequent pixel colour.
    fn dominant_hue(image: &RgbImage) -> f32 {
        let mut counts = std::collections::HashMap::new();
        for p in image.pixels() {
            *counts.entry(p.0).or_insert(0usize) += 1;
        }
        let (colour, _) = counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .expect("non-empty image");
        rgb_to_hsv(colour)[0]
    }

    fn fixed_sv(hue_strength: f32) -> ColourJitter {
        JitterConfig {
            hue_strength,
            saturation: (1.0, 1.0),
            value: (1.0, 1.0),
            ..JitterConfig::default()
        }
        .build()
        .expect("valid config")
    }

    #[test]
    fn hsv_conversion_matches_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0.0, 1.0, 1.0]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [120.0, 1.0, 1.0]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [240.0, 1.0, 1.0]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0.0, 0.0, 0.0]);
        assert_eq!(hsv_to_rgb([60.0, 1.0, 1.0]), [255, 255, 0]);
        assert_eq!(hsv_to_rgb([360.0, 1.0, 1.0]), [255, 0, 0]);
    }

    #[test]
    fn hsv_round_trip_is_lossless_for_u8() {
        for r in (0..=255).step_by(15) {
            for g in (0..=255).step_by(17) {
                for b in (0..=255).step_by(51) {
                    let rgb = [r as u8, g as u8, b as u8];
                    let back = hsv_to_rgb(rgb_to_hsv(rgb));
                    for c in 0..3 {
                        assert!((i16::from(back[c]) - i16::from(rgb[c])).abs() <= 1, "{rgb:?} -> {back:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn default_sampler_matches_built_sampler() {
        let built = HueSampler::new(&DEFAULT_FORBIDDEN_HUES).expect("valid ranges");
        assert_eq!(built, default_sampler());
    }

    #[test]
    fn sampler_rejects_full_coverage_and_bad_ranges() {
        assert!(HueSampler::new(&[(0.0, 200.0), (150.0, 360.0)]).is_err());
        assert!(HueSampler::new(&[(40.0, 10.0)]).is_err());
        assert!(HueSampler::new(&[(0.0, 400.0)]).is_err());
        assert!(HueSampler::new(&[]).is_ok());
    }

    #[test]
    fn sampled_hues_avoid_forbidden_ranges() {
        let sampler = HueSampler::new(&[(0.0, 15.0), (100.0, 140.0), (300.0, 360.0)]).expect("valid");
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10_000 {
            let h = sampler.sample(&mut rng);
            assert!((0.0..HUE_MAX).contains(&h));
            assert!(!sampler.is_forbidden(h), "sampled forbidden hue {h}");
        }
    }

    #[test]
    fn full_strength_hue_never_lands_in_forbidden_range() {
        let jitter = fixed_sv(1.0);
        let image = solid(4, 4, [200, 60, 40]);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..10_000 {
            let (out, draw) = jitter.apply_with_draw(&image, &mut rng);
            let drawn = draw.hue.expect("hue drawn at full strength");
            assert!(!jitter.hue_sampler().is_forbidden(drawn));

            // Re-quantizing to u8 moves the hue by well under a degree.
            let hue = dominant_hue(&out);
            assert!((hue - drawn).abs() < 1.0, "drawn {drawn}, got {hue}");
            assert!(hue > 29.0 && hue < 321.0, "dominant hue {hue} in forbidden band");
        }
    }

    #[test]
    fn zero_strength_with_unit_multipliers_is_identity() {
        let jitter = fixed_sv(0.0);
        let image = gradient(16, 9);
        let (out, draw) = jitter.apply_with_draw(&image, &mut StdRng::seed_from_u64(0));

        assert_eq!(draw.hue, None);
        for (a, b) in image.pixels().zip(out.pixels()) {
            for c in 0..3 {
                assert!((i16::from(a[c]) - i16::from(b[c])).abs() <= 1);
            }
        }
    }

    #[test]
    fn output_keeps_shape_and_encoding() {
        let jitter = JitterConfig::default().build().expect("default config");
        let mut rng = StdRng::seed_from_u64(11);
        for (w, h) in [(1, 1), (7, 3), (64, 48)] {
            let image = gradient(w, h);
            let out = jitter.apply(&image, &mut rng);
            assert_eq!(out.dimensions(), (w, h));
            assert_eq!(out.as_raw().len(), image.as_raw().len());

            let dynamic = jitter.apply_dynamic(&DynamicImage::ImageRgb8(image), &mut rng);
            assert_eq!(dynamic.color(), image::ColorType::Rgb8);
            assert_eq!((dynamic.width(), dynamic.height()), (w, h));
        }

        let out = augment(&gradient(5, 5), 0.5, (0.7, 1.4), (0.7, 1.3));
        assert_eq!(out.dimensions(), (5, 5));
    }

    #[test]
    fn brightness_multiplier_scales_value() {
        let jitter = JitterConfig {
            hue_strength: 0.0,
            saturation: (1.0, 1.0),
            value: (0.5, 0.5),
            ..JitterConfig::default()
        }
        .build()
        .expect("valid config");

        let out = jitter.apply(&solid(2, 2, [200, 100, 50]), &mut StdRng::seed_from_u64(5));
        assert_eq!(out.get_pixel(0, 0).0, [100, 50, 25]);
    }

    #[test]
    fn extrapolated_strength_is_clamped_not_rejected() {
        let jitter = fixed_sv(2.5);
        let out = jitter.apply(&gradient(8, 8), &mut StdRng::seed_from_u64(9));
        assert_eq!(out.dimensions(), (8, 8));
    }

    #[test]
    #[should_panic(expected = "8-bit RGB")]
    fn non_rgb_input_panics() {
        let jitter = JitterConfig::default().build().expect("default config");
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([128])));
        jitter.apply_dynamic(&gray, &mut StdRng::seed_from_u64(0));
    }

    #[test]
    fn config_reads_partial_yaml() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("jitter.yaml");
        fs::write(
            &path,
            "hue_strength: 0.4\nforbidden_hues:\n  - [0.0, 20.0]\n  - [340.0, 360.0]\n",
        )
        .expect("write config");

        let config = JitterConfig::from_yaml_file(&path).expect("parse config");
        assert_eq!(config.hue_strength, 0.4);
        assert_eq!(config.saturation, (0.7, 1.4));
        assert_eq!(config.forbidden_hues, vec![(0.0, 20.0), (340.0, 360.0)]);
        assert!(config.build().is_ok());

        let bad = JitterConfig {
            saturation: (1.5, 0.5),
            ..JitterConfig::default()
        };
        assert!(matches!(bad.build(), Err(PrepError::InvalidJitter(_))));
    }

    #[test]
    #[should_panic(expected = "saturation range must be finite")]
    fn non_finite_saturation_range_panics_up_front() {
        augment(&gradient(2, 2), 0.5, (f32::NAN, 1.2), (0.7, 1.3));
    }

    #[test]
    #[should_panic(expected = "value range must be finite")]
    fn infinite_value_range_panics_up_front() {
        augment(&gradient(2, 2), 0.5, (0.7, 1.4), (0.7, f32::INFINITY));
    }
}
