//! Retinal sampling pattern and the fixed pair tables.
//!
//! 43 points: seven rings of six plus the centre, ring radii shrinking
//! towards the middle and odd rings offset by 30 degrees. Point `6 * r + k`
//! is the `k`-th point of ring `r`; point 42 is the centre.

use core::f32::consts::PI;

pub const NB_POINTS: usize = 43;
pub const NB_RINGS: usize = 8;
pub const POINTS_PER_RING: [usize; NB_RINGS] = [6, 6, 6, 6, 6, 6, 6, 1];

/// Number of comparison bits in a descriptor.
pub const DESCRIPTOR_BITS: usize = 512;
/// Descriptor length in bytes.
pub const DESCRIPTOR_BYTES: usize = DESCRIPTOR_BITS / 8;
/// Number of distinct unordered point pairs (43 choose 2).
pub const NB_PAIRS: usize = NB_POINTS * (NB_POINTS - 1) / 2;

pub const NB_ORIENTATION_PAIRS: usize = 45;

/// Long-baseline pairs used for the orientation estimate.
pub const ORIENTATION_PAIRS: [(u8, u8); NB_ORIENTATION_PAIRS] = [
    (0, 3), (1, 4), (2, 5), (0, 2), (1, 3), (2, 4), (3, 5), (4, 0), (5, 1),
    (6, 9), (7, 10), (8, 11), (6, 8), (7, 9), (8, 10), (9, 11), (10, 6), (11, 7),
    (12, 15), (13, 16), (14, 17), (12, 14), (13, 15), (14, 16), (15, 17), (16, 12), (17, 13),
    (18, 21), (19, 22), (20, 23), (18, 20), (19, 21), (20, 22), (21, 23), (22, 18), (23, 19),
    (24, 27), (25, 28), (26, 29), (30, 33), (31, 34), (32, 35), (36, 39), (37, 40), (38, 41),
];

/// Comparison pairs. Bit `k` of a descriptor is `I[a] > I[b]` for
/// `DESCRIPTION_PAIRS[k] = (a, b)`.
pub const DESCRIPTION_PAIRS: [(u8, u8); DESCRIPTOR_BITS] = build_description_pairs();

/// Takes every `NB_PAIRS / DESCRIPTOR_BITS`-th pair from the list of all
/// pairs `(i, j)`, `j < i`, ordered by `i` then `j`.
const fn build_description_pairs() -> [(u8, u8); DESCRIPTOR_BITS] {
    let mut out = [(0u8, 0u8); DESCRIPTOR_BITS];
    let mut k = 0;
    while k < DESCRIPTOR_BITS {
        let idx = k * NB_PAIRS / DESCRIPTOR_BITS;
        // Row i of the triangle starts at i * (i - 1) / 2.
        let mut i = 1;
        while (i + 1) * i / 2 <= idx {
            i += 1;
        }
        let j = idx - i * (i - 1) / 2;
        out[k] = (i as u8, j as u8);
        k += 1;
    }
    out
}

/// Ring radii in units of the pattern scale.
fn ring_radii() -> [f32; NB_RINGS] {
    let big_r = 2.0 / 3.0f32;
    let small_r = 2.0 / 24.0f32;
    let unit = (big_r - small_r) / 21.0;
    [
        big_r,
        big_r - 6.0 * unit,
        big_r - 11.0 * unit,
        big_r - 15.0 * unit,
        big_r - 18.0 * unit,
        big_r - 20.0 * unit,
        small_r,
        0.0,
    ]
}

/// One sampling point, in pixels relative to the keypoint.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PatternPoint {
    pub x: f32,
    pub y: f32,
    /// Smoothing radius; the sample is the mean of a `(2r+1)^2` box with
    /// `r = floor(sigma)`.
    pub sigma: f32,
}

/// The pattern at one concrete scale.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub points: [PatternPoint; NB_POINTS],
    /// Keypoints closer than this to any image edge cannot be described.
    pub extent: u32,
    /// `(dx, dy) / |d|^2` of each orientation pair.
    pub orientation_weights: [(f32, f32); NB_ORIENTATION_PAIRS],
}

impl Pattern {
    /// Unrotated pattern scaled by `scale` pixels per unit.
    pub fn new(scale: f32) -> Self {
        let radii = ring_radii();
        let mut points = [PatternPoint::default(); NB_POINTS];
        let mut idx = 0;
        let mut reach = 0u32;
        for (ring, &n) in POINTS_PER_RING.iter().enumerate() {
            // The centre point smooths like the innermost ring.
            let sigma = radii[ring.min(6)] / 2.0 * scale;
            let beta = PI / n as f32 * (ring % 2) as f32;
            for k in 0..n {
                let alpha = k as f32 * 2.0 * PI / n as f32 + beta;
                let r = radii[ring] * scale;
                points[idx] = PatternPoint {
                    x: r * alpha.cos(),
                    y: r * alpha.sin(),
                    sigma,
                };
                reach = reach.max(r.ceil() as u32 + sigma as u32);
                idx += 1;
            }
        }

        let mut orientation_weights = [(0.0, 0.0); NB_ORIENTATION_PAIRS];
        for (w, &(i, j)) in orientation_weights.iter_mut().zip(ORIENTATION_PAIRS.iter()) {
            let dx = points[i as usize].x - points[j as usize].x;
            let dy = points[i as usize].y - points[j as usize].y;
            let norm_sq = dx * dx + dy * dy;
            *w = (dx / norm_sq, dy / norm_sq);
        }

        Self {
            points,
            extent: reach + 1,
            orientation_weights,
        }
    }

    /// Position of point `i` rotated by the angle with the given cosine/sine.
    #[inline]
    pub fn rotated(&self, i: usize, cos: f32, sin: f32) -> (f32, f32) {
        let p = self.points[i];
        (p.x * cos - p.y * sin, p.x * sin + p.y * cos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_pairs_are_distinct_and_ordered() {
        let mut seen = std::collections::HashSet::new();
        for &(a, b) in DESCRIPTION_PAIRS.iter() {
            assert!((a as usize) < NB_POINTS && b < a, "({a}, {b})");
            assert!(seen.insert((a, b)));
        }
        assert_eq!(DESCRIPTION_PAIRS[0], (1, 0));
        assert_eq!(DESCRIPTION_PAIRS[DESCRIPTOR_BITS - 1], (42, 40));
    }

    #[test]
    fn orientation_pairs_stay_on_one_ring() {
        for &(a, b) in ORIENTATION_PAIRS.iter() {
            assert_eq!(a / 6, b / 6);
        }
    }

    #[test]
    fn geometry_at_canonical_scale() {
        let p = Pattern::new(22.0);
        // Outer ring: radius 14.67 px rounds out to 15, box radius 7.
        assert_eq!(p.extent, 23);
        let outer = p.points[0];
        assert!((outer.x - 22.0 * 2.0 / 3.0).abs() < 1e-4);
        assert!(outer.y.abs() < 1e-4);
        assert_eq!(p.points[42].x, 0.0);
        assert_eq!(p.points[42].y, 0.0);
        assert_eq!(p.points[42].sigma, p.points[36].sigma);
        // Odd rings are rotated by 30 degrees.
        let first_odd = p.points[6];
        assert!((first_odd.y.atan2(first_odd.x) - PI / 6.0).abs() < 1e-5);
    }

    #[test]
    fn rotation_by_zero_is_identity() {
        let p = Pattern::new(22.0);
        for i in 0..NB_POINTS {
            let (x, y) = p.rotated(i, 1.0, 0.0);
            assert_eq!((x, y), (p.points[i].x, p.points[i].y));
        }
    }
}
