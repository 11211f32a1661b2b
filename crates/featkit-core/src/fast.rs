//! FAST segment-test corner detection.
//!
//! A pixel is a corner when at least `arc_length` contiguous samples of the
//! radius-3 ring ([`RING3`](crate::ring::RING3)) are all brighter than
//! `center + threshold` or all darker than `center - threshold`.
//! Candidates are ranked by their segment
//! score (the largest threshold at which they would still pass), then by a
//! 3x3 Harris response, and thinned by 8-neighbour non-maximum suppression.
//!
//! Because the segment score never depends on the threshold, raising the
//! threshold only removes corners: the set found at a higher threshold is a
//! subset of the set found at any lower one.
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::image::ImageView;
use crate::keypoint::Keypoint;
use crate::ring::{ring_offsets, CARDINALS, RING_RADIUS};
use crate::MAX_KEYPOINTS;
use std::collections::HashMap;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tunable parameters for FAST detection.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FastParams {
    /// Intensity difference a ring sample must exceed. `<= 0` disables
    /// detection (empty result).
    pub threshold: i32,
    /// Minimum contiguous arc, 9..=16.
    pub arc_length: usize,
    /// Output cap; the strongest corners are kept when exceeded. Clamped to
    /// [`MAX_KEYPOINTS`].
    pub max_keypoints: usize,
}

impl Default for FastParams {
    fn default() -> Self {
        Self {
            threshold: 20,
            arc_length: 9,
            max_keypoints: 4096,
        }
    }
}

impl FastParams {
    pub fn with_threshold(mut self, threshold: i32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_arc_length(mut self, arc_length: usize) -> Self {
        self.arc_length = arc_length;
        self
    }

    pub fn with_max_keypoints(mut self, max_keypoints: usize) -> Self {
        self.max_keypoints = max_keypoints;
        self
    }
}

/// A FAST corner with its ranking scores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Corner {
    pub x: u16,
    pub y: u16,
    /// Largest threshold at which the segment test still passes.
    pub score: i32,
    /// Harris response; orders corners with equal `score`.
    pub response: i64,
}

impl Corner {
    /// Ranking used by suppression and the output cap.
    #[inline]
    fn strength(&self) -> (i32, i64) {
        (self.score, self.response)
    }
}

/// Detects corners and returns them as keypoints (no descriptor, angle 0),
/// in raster order.
pub fn detect_keypoints(
    img: ImageView<'_>,
    params: &FastParams,
    roi: Option<Rect>,
) -> Result<Vec<Keypoint>> {
    Ok(detect_corners(img, params, roi)?
        .into_iter()
        .map(|c| Keypoint::new(c.x, c.y))
        .collect())
}

/// Core detector: segment test, scoring, NMS and the output cap.
///
/// `roi` restricts the candidate pixels (default: the whole image); a ring
/// radius border is kept inside it. A non-positive threshold or an empty ROI
/// yields an empty list.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip(img, params),
        fields(w = img.width(), h = img.height(), threshold = params.threshold)
    )
)]
pub fn detect_corners(
    img: ImageView<'_>,
    params: &FastParams,
    roi: Option<Rect>,
) -> Result<Vec<Corner>> {
    let luma = img.luma()?;
    if !(9..=16).contains(&params.arc_length) {
        return Err(Error::invalid(format!(
            "arc length {} outside 9..=16",
            params.arc_length
        )));
    }
    if img.width() > u16::MAX as usize + 1 || img.height() > u16::MAX as usize + 1 {
        return Err(Error::invalid(format!(
            "image {}x{} exceeds 16-bit keypoint coordinates",
            img.width(),
            img.height()
        )));
    }

    let w = img.width();
    let h = img.height();
    if params.threshold <= 0 || params.max_keypoints == 0 {
        return Ok(Vec::new());
    }
    let frame = Rect::new(0, 0, w as i32, h as i32);
    let roi = match roi {
        Some(r) if r.is_empty() => return Ok(Vec::new()),
        Some(r) => r.clamp_to(w, h),
        None => frame,
    };

    let x0 = roi.x.max(RING_RADIUS);
    let y0 = roi.y.max(RING_RADIUS);
    let x1 = roi.right().min(w as i32 - RING_RADIUS);
    let y1 = roi.bottom().min(h as i32 - RING_RADIUS);
    if x1 <= x0 || y1 <= y0 {
        return Ok(Vec::new());
    }

    let offsets = ring_offsets(w);
    let t = params.threshold;
    let min_cardinals = (params.arc_length / 4) as u32;

    let mut candidates = Vec::new();
    for y in y0 as usize..y1 as usize {
        for x in x0 as usize..x1 as usize {
            let idx = y * w + x;
            let c = luma[idx] as i32;
            let sample = |k: usize| luma[(idx as isize + offsets[k]) as usize] as i32;

            let bright = CARDINALS.iter().filter(|&&k| sample(k) > c + t).count() as u32;
            let dark = CARDINALS.iter().filter(|&&k| sample(k) < c - t).count() as u32;
            if bright < min_cardinals && dark < min_cardinals {
                continue;
            }

            let mut diffs = [0i32; 16];
            for (k, d) in diffs.iter_mut().enumerate() {
                *d = sample(k) - c;
            }
            let score = segment_score(&diffs, params.arc_length);
            if score >= t {
                candidates.push(Corner {
                    x: x as u16,
                    y: y as u16,
                    score,
                    response: harris_score(luma, w, h, x, y),
                });
            }
        }
    }

    let mut corners = suppress_non_maxima(&candidates);
    let cap = params.max_keypoints.min(MAX_KEYPOINTS);
    if corners.len() > cap {
        corners.sort_by(|a, b| {
            b.strength()
                .cmp(&a.strength())
                .then((a.y, a.x).cmp(&(b.y, b.x)))
        });
        corners.truncate(cap);
        corners.sort_by_key(|c| (c.y, c.x));
    }
    Ok(corners)
}

/// Largest `t` such that some `n` contiguous ring samples (wrapping from
/// sample 15 to sample 0) all differ from the centre by more than `t` in the
/// same direction. Negative when no such arc exists at `t = 0`.
#[inline]
fn segment_score(diffs: &[i32; 16], n: usize) -> i32 {
    let mut best = 0;
    for start in 0..diffs.len() {
        let (mut bright, mut dark) = (i32::MAX, i32::MAX);
        for k in start..start + n {
            let d = diffs[k % 16];
            bright = bright.min(d);
            dark = dark.min(-d);
        }
        best = best.max(bright).max(dark);
    }
    best - 1
}

/// Harris response `det(M) - trace(M)^2 / 25` of the structure tensor summed
/// over the 3x3 neighbourhood, with central-difference gradients and
/// edge-clamped sampling.
fn harris_score(luma: &[u8], w: usize, h: usize, x: usize, y: usize) -> i64 {
    let px = |xx: i64, yy: i64| -> i64 {
        let cx = xx.clamp(0, w as i64 - 1) as usize;
        let cy = yy.clamp(0, h as i64 - 1) as usize;
        luma[cy * w + cx] as i64
    };

    let (mut sxx, mut sxy, mut syy) = (0i64, 0i64, 0i64);
    for dy in -1..=1i64 {
        for dx in -1..=1i64 {
            let xx = x as i64 + dx;
            let yy = y as i64 + dy;
            let ix = px(xx + 1, yy) - px(xx - 1, yy);
            let iy = px(xx, yy + 1) - px(xx, yy - 1);
            sxx += ix * ix;
            sxy += ix * iy;
            syy += iy * iy;
        }
    }
    let det = sxx * syy - sxy * sxy;
    let trace = sxx + syy;
    det - trace * trace / 25
}

/// Keeps a corner unless one of its 8 neighbours is also a corner that ranks
/// higher, or ranks the same at an earlier raster position.
/// `candidates` must be in raster order; so is the output.
fn suppress_non_maxima(candidates: &[Corner]) -> Vec<Corner> {
    let strengths: HashMap<(u16, u16), (i32, i64)> = candidates
        .iter()
        .map(|c| ((c.x, c.y), c.strength()))
        .collect();

    candidates
        .iter()
        .filter(|c| {
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = c.x as i32 + dx;
                    let ny = c.y as i32 + dy;
                    if nx < 0 || ny < 0 {
                        continue;
                    }
                    let Some(&other) = strengths.get(&(nx as u16, ny as u16)) else {
                        continue;
                    };
                    let own = c.strength();
                    if other > own || (other == own && (ny, nx) < (c.y as i32, c.x as i32)) {
                        return false;
                    }
                }
            }
            true
        })
        .copied()
        .collect()
}
