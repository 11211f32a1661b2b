//! Haar-feature rejection cascades (Viola–Jones).
//!
//! A [`Cascade`] is an immutable handle: stages of weak classifiers, each
//! weak classifier a weighted sum of up to three rectangles inside the
//! canonical detection window. Load one with [`Cascade::load`] or
//! [`Cascade::from_bytes`] (format in [`format`]) and run it with
//! [`detect_objects`].

mod detect;
pub mod format;

pub use detect::{detect_objects, detect_objects_with_stats, CascadeResult, DetectionStats};

use crate::error::{Error, Result};
use crate::integral::IntegralImage;
use crate::{MAX_CLASSIFIERS_PER_STAGE, MAX_STAGES};

/// Maximum rectangles per weak classifier.
pub const MAX_RECTS_PER_CLASSIFIER: usize = 3;

/// One weighted rectangle of a Haar feature, relative to the window origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightedRect {
    pub x: u8,
    pub y: u8,
    pub w: u8,
    pub h: u8,
    pub weight: i8,
}

impl WeightedRect {
    pub const fn new(x: u8, y: u8, w: u8, h: u8, weight: i8) -> Self {
        Self { x, y, w, h, weight }
    }

    fn fits(&self, win_w: usize, win_h: usize) -> bool {
        self.w > 0
            && self.h > 0
            && self.x as usize + self.w as usize <= win_w
            && self.y as usize + self.h as usize <= win_h
    }
}

/// Thresholded Haar feature. Contributes `pass_value` to its stage when the
/// normalised feature response reaches `threshold`, `fail_value` otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeakClassifier {
    /// Q12 threshold on the variance-normalised response.
    pub threshold: i16,
    pub fail_value: i16,
    pub pass_value: i16,
    pub rects: Vec<WeightedRect>,
}

impl WeakClassifier {
    /// Weighted rectangle sum at window origin `(x, y)`.
    #[inline]
    fn feature_sum(&self, sum: &IntegralImage, x: usize, y: usize) -> i64 {
        self.rects
            .iter()
            .map(|r| {
                let s = sum.rect_sum_unclamped(
                    x + r.x as usize,
                    y + r.y as usize,
                    r.w as usize,
                    r.h as usize,
                );
                r.weight as i64 * s as i64
            })
            .sum()
    }

    /// Stage contribution of this classifier for a window with area `area`
    /// and normaliser `norm` (the window σ, or 1 without normalisation).
    #[inline]
    fn vote(&self, sum: &IntegralImage, x: usize, y: usize, area: i64, norm: i64) -> i32 {
        let feature = self.feature_sum(sum, x, y);
        if feature * 4096 >= self.threshold as i64 * norm * area {
            self.pass_value as i32
        } else {
            self.fail_value as i32
        }
    }
}

/// One stage of the cascade; a window survives it when the summed votes reach
/// `threshold` scaled by the cascade's global threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub threshold: i16,
    pub classifiers: Vec<WeakClassifier>,
}

impl Stage {
    #[inline]
    fn votes(&self, sum: &IntegralImage, x: usize, y: usize, area: i64, norm: i64) -> i32 {
        self.classifiers
            .iter()
            .map(|c| c.vote(sum, x, y, area, norm))
            .sum()
    }
}

/// Immutable cascade handle.
#[derive(Clone, Debug, PartialEq)]
pub struct Cascade {
    step: usize,
    window_width: usize,
    window_height: usize,
    std_normalize: bool,
    threshold: f32,
    scale_factor: f32,
    stages: Vec<Stage>,
}

impl Cascade {
    /// Builds a cascade for a `window_width x window_height` window with
    /// step 2, σ normalisation, threshold 0.5 and scale factor 1.5.
    ///
    /// Every stage must hold 1..=[`MAX_CLASSIFIERS_PER_STAGE`] classifiers
    /// and every rectangle must be non-empty and inside the window.
    pub fn new(window_width: u8, window_height: u8, stages: Vec<Stage>) -> Result<Self> {
        let cascade = Self {
            step: 2,
            window_width: window_width as usize,
            window_height: window_height as usize,
            std_normalize: true,
            threshold: 0.5,
            scale_factor: 1.5,
            stages,
        };
        cascade.validate().map_err(Error::invalid)?;
        Ok(cascade)
    }

    /// Checks structural invariants; the message names the first violation.
    pub(crate) fn validate(&self) -> core::result::Result<(), String> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(format!(
                "window {}x{} must be non-empty",
                self.window_width, self.window_height
            ));
        }
        if self.step == 0 || self.step > u8::MAX as usize {
            return Err(format!("step {} outside 1..=255", self.step));
        }
        if !self.threshold.is_finite() {
            return Err(format!("threshold {} is not finite", self.threshold));
        }
        if !(self.scale_factor.is_finite() && self.scale_factor > 1.0) {
            return Err(format!(
                "scale factor {} must be finite and greater than 1",
                self.scale_factor
            ));
        }
        if self.stages.is_empty() || self.stages.len() > MAX_STAGES {
            return Err(format!(
                "stage count {} outside 1..={MAX_STAGES}",
                self.stages.len()
            ));
        }
        for (si, stage) in self.stages.iter().enumerate() {
            let n = stage.classifiers.len();
            if n == 0 || n > MAX_CLASSIFIERS_PER_STAGE {
                return Err(format!(
                    "stage {si}: classifier count {n} outside 1..={MAX_CLASSIFIERS_PER_STAGE}"
                ));
            }
            for (ci, c) in stage.classifiers.iter().enumerate() {
                if c.rects.is_empty() || c.rects.len() > MAX_RECTS_PER_CLASSIFIER {
                    return Err(format!(
                        "stage {si} classifier {ci}: rect count {} outside 1..={MAX_RECTS_PER_CLASSIFIER}",
                        c.rects.len()
                    ));
                }
                if let Some(r) = c
                    .rects
                    .iter()
                    .find(|r| !r.fits(self.window_width, self.window_height))
                {
                    return Err(format!(
                        "stage {si} classifier {ci}: rect {r:?} is empty or leaves the {}x{} window",
                        self.window_width, self.window_height
                    ));
                }
            }
        }
        Ok(())
    }

    /// Replaces the global stage-threshold multiplier.
    pub fn with_threshold(mut self, threshold: f32) -> Result<Self> {
        if !threshold.is_finite() {
            return Err(Error::invalid(format!("threshold {threshold} is not finite")));
        }
        self.threshold = threshold;
        Ok(self)
    }

    /// Replaces the pyramid scale step (must be finite and > 1).
    pub fn with_scale_factor(mut self, scale_factor: f32) -> Result<Self> {
        if !(scale_factor.is_finite() && scale_factor > 1.0) {
            return Err(Error::invalid(format!(
                "scale factor {scale_factor} must be finite and greater than 1"
            )));
        }
        self.scale_factor = scale_factor;
        Ok(self)
    }

    /// Replaces the window step, in pixels of the current pyramid level
    /// (1..=255).
    pub fn with_step(mut self, step: usize) -> Result<Self> {
        if step == 0 || step > u8::MAX as usize {
            return Err(Error::invalid(format!("step {step} outside 1..=255")));
        }
        self.step = step;
        Ok(self)
    }

    pub fn with_std_normalize(mut self, on: bool) -> Self {
        self.std_normalize = on;
        self
    }

    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Canonical window size `(width, height)`.
    #[inline]
    pub fn window(&self) -> (usize, usize) {
        (self.window_width, self.window_height)
    }

    #[inline]
    pub fn std_normalize(&self) -> bool {
        self.std_normalize
    }

    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[inline]
    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    #[inline]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Total weak classifiers over all stages.
    pub fn classifier_count(&self) -> usize {
        self.stages.iter().map(|s| s.classifiers.len()).sum()
    }

    /// Total rectangles over all classifiers.
    pub fn rect_count(&self) -> usize {
        self.stages
            .iter()
            .flat_map(|s| &s.classifiers)
            .map(|c| c.rects.len())
            .sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Vertical two-rectangle edge feature: bright left half, dark right half.
    pub(crate) fn edge_cascade() -> Cascade {
        let classifier = WeakClassifier {
            threshold: 4096,
            fail_value: -1,
            pass_value: 1,
            rects: vec![
                WeightedRect::new(0, 0, 4, 8, 1),
                WeightedRect::new(4, 0, 4, 8, -1),
            ],
        };
        Cascade::new(
            8,
            8,
            vec![Stage {
                threshold: 0,
                classifiers: vec![classifier],
            }],
        )
        .and_then(|c| c.with_step(1))
        .and_then(|c| c.with_threshold(1.0))
        .and_then(|c| c.with_scale_factor(1.25))
        .unwrap()
    }

    #[test]
    fn counts_walk_the_nested_structure() {
        let c = edge_cascade();
        assert_eq!(c.stages().len(), 1);
        assert_eq!(c.classifier_count(), 1);
        assert_eq!(c.rect_count(), 2);
        assert_eq!(c.window(), (8, 8));
    }

    #[test]
    fn rejects_rect_outside_window() {
        let stage = Stage {
            threshold: 0,
            classifiers: vec![WeakClassifier {
                threshold: 0,
                fail_value: 0,
                pass_value: 1,
                rects: vec![WeightedRect::new(6, 0, 4, 8, 1)],
            }],
        };
        assert!(matches!(
            Cascade::new(8, 8, vec![stage]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_empty_stage_list() {
        assert!(Cascade::new(8, 8, Vec::new()).is_err());
    }

    #[test]
    fn builders_validate_their_argument() {
        let c = edge_cascade();
        assert!(c.clone().with_scale_factor(1.0).is_err());
        assert!(c.clone().with_scale_factor(f32::NAN).is_err());
        assert!(c.clone().with_step(0).is_err());
        assert!(c.clone().with_threshold(f32::INFINITY).is_err());
        let tuned = c.with_threshold(0.25).unwrap();
        assert_eq!(tuned.threshold(), 0.25);
    }
}
