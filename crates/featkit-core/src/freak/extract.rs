use super::pattern::{
    Pattern, DESCRIPTION_PAIRS, DESCRIPTOR_BYTES, NB_POINTS, ORIENTATION_PAIRS,
};
use crate::error::{Error, Result};
use crate::image::ImageView;
use crate::integral::IntegralImage;
use crate::keypoint::{Descriptor, Keypoint};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Number of precomputed pattern scales.
pub const FREAK_OCTAVES: usize = 4;

/// Tunable parameters for FREAK extraction.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FreakParams {
    /// Estimate a dominant orientation and rotate the pattern by it.
    pub orientation_normalized: bool,
    /// Sample at `octave` instead of the base scale.
    pub scale_normalized: bool,
    /// Pixels per pattern unit at octave 0.
    pub pattern_scale: f32,
    /// Octave used when `scale_normalized` is set, `0..FREAK_OCTAVES`.
    /// Octave `o` doubles the pattern `o` times.
    pub octave: usize,
}

impl Default for FreakParams {
    fn default() -> Self {
        Self {
            orientation_normalized: true,
            scale_normalized: false,
            pattern_scale: 22.0,
            octave: 0,
        }
    }
}

impl FreakParams {
    pub fn with_orientation_normalized(mut self, on: bool) -> Self {
        self.orientation_normalized = on;
        self
    }

    pub fn with_scale_normalized(mut self, on: bool) -> Self {
        self.scale_normalized = on;
        self
    }

    pub fn with_pattern_scale(mut self, scale: f32) -> Self {
        self.pattern_scale = scale;
        self
    }

    pub fn with_octave(mut self, octave: usize) -> Self {
        self.octave = octave;
        self
    }
}

/// Descriptor extractor holding the pattern at every octave.
#[derive(Clone, Debug)]
pub struct FreakExtractor {
    params: FreakParams,
    octaves: Vec<Pattern>,
}

impl FreakExtractor {
    pub fn new(params: FreakParams) -> Result<Self> {
        if !(params.pattern_scale.is_finite() && params.pattern_scale > 0.0) {
            return Err(Error::invalid(format!(
                "pattern scale {} must be finite and positive",
                params.pattern_scale
            )));
        }
        if params.octave >= FREAK_OCTAVES {
            return Err(Error::invalid(format!(
                "octave {} outside 0..{FREAK_OCTAVES}",
                params.octave
            )));
        }
        let octaves = (0..FREAK_OCTAVES)
            .map(|o| Pattern::new(params.pattern_scale * (1u32 << o) as f32))
            .collect();
        Ok(Self { params, octaves })
    }

    #[inline]
    pub fn params(&self) -> &FreakParams {
        &self.params
    }

    /// Pattern used for extraction under the current parameters.
    pub fn pattern(&self) -> &Pattern {
        let level = if self.params.scale_normalized {
            self.params.octave
        } else {
            0
        };
        &self.octaves[level]
    }

    /// Fills `descriptor` (and `angle`, with orientation normalisation) of
    /// every keypoint whose pattern fits inside `img`; the others get
    /// `descriptor = None`. Returns how many keypoints were described.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, img, keypoints),
            fields(w = img.width(), h = img.height(), n = keypoints.len())
        )
    )]
    pub fn describe(&self, img: ImageView<'_>, keypoints: &mut [Keypoint]) -> Result<usize> {
        let ii = IntegralImage::new(img)?;
        let pattern = self.pattern();
        let extent = pattern.extent as usize;
        let (w, h) = (img.width(), img.height());

        let mut described = 0;
        for kp in keypoints.iter_mut() {
            let (x, y) = (kp.x as usize, kp.y as usize);
            if x < extent || y < extent || x + extent >= w || y + extent >= h {
                kp.descriptor = None;
                continue;
            }

            let mut values = sample_pattern(&ii, pattern, x, y, 1.0, 0.0);
            let mut angle = 0.0f32;
            if self.params.orientation_normalized {
                angle = dominant_angle(pattern, &values);
                if angle != 0.0 {
                    values = sample_pattern(&ii, pattern, x, y, angle.cos(), angle.sin());
                }
            }

            kp.angle = angle;
            kp.descriptor = Some(pack_bits(&values));
            described += 1;
        }
        Ok(described)
    }
}

/// Describes `keypoints` in place with a one-off extractor.
pub fn describe_keypoints(
    img: ImageView<'_>,
    keypoints: &mut [Keypoint],
    params: &FreakParams,
) -> Result<usize> {
    FreakExtractor::new(params.clone())?.describe(img, keypoints)
}

/// Box-smoothed intensity at every pattern point, pattern rotated by the
/// angle with the given cosine/sine. The caller guarantees the pattern fits.
fn sample_pattern(
    ii: &IntegralImage,
    pattern: &Pattern,
    cx: usize,
    cy: usize,
    cos: f32,
    sin: f32,
) -> [u8; NB_POINTS] {
    let mut values = [0u8; NB_POINTS];
    for (i, v) in values.iter_mut().enumerate() {
        let (px, py) = pattern.rotated(i, cos, sin);
        let sx = (cx as i64 + px.round() as i64) as usize;
        let sy = (cy as i64 + py.round() as i64) as usize;
        let r = pattern.points[i].sigma as usize;
        let side = 2 * r + 1;
        let sum = ii.rect_sum_unclamped(sx - r, sy - r, side, side);
        *v = (sum / (side * side) as u32) as u8;
    }
    values
}

/// Gradient direction from the orientation pairs, in radians. A pattern with
/// no intensity differences has angle 0.
fn dominant_angle(pattern: &Pattern, values: &[u8; NB_POINTS]) -> f32 {
    let (mut dir_x, mut dir_y) = (0.0f32, 0.0f32);
    for (&(i, j), &(wx, wy)) in ORIENTATION_PAIRS
        .iter()
        .zip(pattern.orientation_weights.iter())
    {
        let delta = values[i as usize] as f32 - values[j as usize] as f32;
        dir_x += delta * wx;
        dir_y += delta * wy;
    }
    if dir_x == 0.0 && dir_y == 0.0 {
        0.0
    } else {
        dir_y.atan2(dir_x)
    }
}

/// One bit per description pair, MSB-first.
fn pack_bits(values: &[u8; NB_POINTS]) -> Descriptor {
    let mut bytes = vec![0u8; DESCRIPTOR_BYTES];
    for (k, &(a, b)) in DESCRIPTION_PAIRS.iter().enumerate() {
        if values[a as usize] > values[b as usize] {
            bytes[k / 8] |= 0x80 >> (k % 8);
        }
    }
    Descriptor(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use core::f32::consts::FRAC_PI_2;

    fn ramp(w: usize, h: usize, along_x: bool) -> Image {
        let mut img = Image::filled(w, h, 0).unwrap();
        for y in 0..h {
            for x in 0..w {
                let t = if along_x { x } else { y };
                img.set_gray(x, y, (2 * t) as u8);
            }
        }
        img
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(FreakExtractor::new(FreakParams::default().with_octave(FREAK_OCTAVES)).is_err());
        assert!(FreakExtractor::new(FreakParams::default().with_pattern_scale(0.0)).is_err());
    }

    #[test]
    fn octaves_double_the_extent() {
        let ex = FreakExtractor::new(FreakParams::default()).unwrap();
        assert_eq!(ex.octaves[0].extent, 23);
        assert_eq!(ex.octaves[1].extent, 45);
        let scaled = FreakExtractor::new(
            FreakParams::default()
                .with_scale_normalized(true)
                .with_octave(1),
        )
        .unwrap();
        assert_eq!(scaled.pattern().extent, 45);
    }

    #[test]
    fn keypoints_near_the_border_are_skipped() {
        let img = ramp(64, 64, true);
        let mut kps = vec![
            Keypoint::new(22, 32),
            Keypoint::new(23, 32),
            Keypoint::new(40, 32),
            Keypoint::new(41, 32),
        ];
        let n = describe_keypoints(img.view(), &mut kps, &FreakParams::default()).unwrap();
        assert_eq!(n, 2);
        let has: Vec<bool> = kps.iter().map(Keypoint::has_descriptor).collect();
        assert_eq!(has, vec![false, true, true, false]);
        assert_eq!(kps[1].descriptor.as_ref().map(Descriptor::len), Some(DESCRIPTOR_BYTES));
    }

    #[test]
    fn flat_image_has_zero_angle_and_empty_descriptor() {
        let img = Image::filled(64, 64, 77).unwrap();
        let mut kps = vec![Keypoint::new(32, 32)];
        describe_keypoints(img.view(), &mut kps, &FreakParams::default()).unwrap();
        assert_eq!(kps[0].angle, 0.0);
        assert_eq!(kps[0].descriptor, Some(Descriptor(vec![0; DESCRIPTOR_BYTES])));
    }

    #[test]
    fn orientation_follows_the_gradient() {
        let params = FreakParams::default();
        let mut kx = vec![Keypoint::new(48, 48)];
        describe_keypoints(ramp(96, 96, true).view(), &mut kx, &params).unwrap();
        assert!(kx[0].angle.abs() < 0.1, "angle {}", kx[0].angle);

        let mut ky = vec![Keypoint::new(48, 48)];
        describe_keypoints(ramp(96, 96, false).view(), &mut ky, &params).unwrap();
        assert!((ky[0].angle - FRAC_PI_2).abs() < 0.1, "angle {}", ky[0].angle);
    }

    #[test]
    fn angle_stays_zero_without_orientation() {
        let params = FreakParams::default().with_orientation_normalized(false);
        let mut ky = vec![Keypoint::new(48, 48)];
        describe_keypoints(ramp(96, 96, false).view(), &mut ky, &params).unwrap();
        assert_eq!(ky[0].angle, 0.0);
        assert!(ky[0].has_descriptor());
    }
}
