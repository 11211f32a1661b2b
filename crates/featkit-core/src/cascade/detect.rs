//! Sliding-window cascade evaluation over an image pyramid.
use super::Cascade;
use crate::error::Result;
use crate::geometry::{merge_rects, Rect};
use crate::image::ImageView;
use crate::integral::IntegralImage;
use std::time::Instant;
#[cfg(feature = "tracing")]
use tracing::{debug, debug_span, instrument};

/// Counters collected while scanning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionStats {
    /// Pyramid levels scanned.
    pub scales: usize,
    /// Windows visited across all levels.
    pub windows: u64,
    /// Windows rejected for zero variance before any stage ran.
    pub degenerate: u64,
    /// `stage_rejections[i]` counts windows that stage `i` rejected.
    pub stage_rejections: Vec<u64>,
    /// Windows that survived every stage, before merging.
    pub raw_detections: usize,
}

/// Detection outcome with counters and timing.
#[derive(Clone, Debug)]
pub struct CascadeResult {
    /// Merged detections in source-image coordinates.
    pub objects: Vec<Rect>,
    pub stats: DetectionStats,
    /// Wall time of the whole scan (milliseconds).
    pub detect_ms: f64,
}

/// Runs `cascade` over every window position and pyramid scale of `img` and
/// returns the merged detections. An empty list is a normal outcome.
pub fn detect_objects(img: ImageView<'_>, cascade: &Cascade) -> Result<Vec<Rect>> {
    detect_objects_with_stats(img, cascade).map(|r| r.objects)
}

/// Same as [`detect_objects`] but also reports scan counters.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip(img, cascade),
        fields(w = img.width(), h = img.height(), stages = cascade.stages().len())
    )
)]
pub fn detect_objects_with_stats(img: ImageView<'_>, cascade: &Cascade) -> Result<CascadeResult> {
    let started = Instant::now();
    img.luma()?;

    let (win_w, win_h) = cascade.window();
    let area = (win_w * win_h) as i64;
    let step = cascade.step();
    let mut stats = DetectionStats {
        stage_rejections: vec![0; cascade.stages().len()],
        ..DetectionStats::default()
    };
    let mut raw = Vec::new();

    let mut factor = 1.0f32;
    loop {
        let sw = (img.width() as f32 / factor) as usize;
        let sh = (img.height() as f32 / factor) as usize;
        if sw < win_w || sh < win_h {
            break;
        }

        #[cfg(feature = "tracing")]
        let _level = debug_span!("scale", factor, sw, sh).entered();

        let sum = IntegralImage::scaled(img, sw, sh)?;
        let sq = IntegralImage::scaled_squared(img, sw, sh)?;
        stats.scales += 1;

        for y in (0..=sh - win_h).step_by(step) {
            for x in (0..=sw - win_w).step_by(step) {
                stats.windows += 1;

                let s = sum.rect_sum_unclamped(x, y, win_w, win_h) as i64;
                let s2 = sq.rect_sum_unclamped(x, y, win_w, win_h) as i64;
                let var = area * s2 - s * s;
                let sigma = if var > 0 { isqrt(var as u64) as i64 / area } else { 0 };
                if sigma == 0 {
                    stats.degenerate += 1;
                    continue;
                }
                let norm = if cascade.std_normalize() { sigma } else { 1 };

                let rejected_at = cascade.stages().iter().position(|stage| {
                    let votes = stage.votes(&sum, x, y, area, norm);
                    (votes as f32) < cascade.threshold() * stage.threshold as f32
                });
                match rejected_at {
                    Some(i) => stats.stage_rejections[i] += 1,
                    None => raw.push(Rect::new(
                        (x as f32 * factor).round() as i32,
                        (y as f32 * factor).round() as i32,
                        (win_w as f32 * factor) as i32,
                        (win_h as f32 * factor) as i32,
                    )),
                }
            }
        }

        factor *= cascade.scale_factor();
    }

    stats.raw_detections = raw.len();
    let objects = merge_rects(raw);

    #[cfg(feature = "tracing")]
    debug!(
        scales = stats.scales,
        windows = stats.windows,
        raw = stats.raw_detections,
        merged = objects.len(),
        "cascade scan done"
    );

    Ok(CascadeResult {
        objects,
        stats,
        detect_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

/// Floor of the square root.
fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u64;
    while x * x > n {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= n {
        x += 1;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::edge_cascade;
    use crate::image::Image;

    /// Left half bright, right half dark.
    fn step_edge(w: usize, h: usize) -> Image {
        let mut img = Image::filled(w, h, 20).unwrap();
        for y in 0..h {
            for x in 0..w / 2 {
                img.set_gray(x, y, 200);
            }
        }
        img
    }

    #[test]
    fn isqrt_is_exact_floor() {
        for n in [0u64, 1, 2, 3, 4, 15, 16, 17, 33_177_600, u32::MAX as u64, 1 << 50] {
            let r = isqrt(n);
            assert!(r * r <= n && (r + 1) * (r + 1) > n, "n = {n}");
        }
    }

    #[test]
    fn solid_image_has_only_degenerate_windows() {
        let img = Image::filled(20, 20, 128).unwrap();
        let res = detect_objects_with_stats(img.view(), &edge_cascade()).unwrap();
        assert!(res.objects.is_empty());
        assert!(res.stats.windows > 0);
        assert_eq!(res.stats.degenerate, res.stats.windows);
        assert_eq!(res.stats.stage_rejections, vec![0]);
    }

    #[test]
    fn edge_is_found_and_merged() {
        let img = step_edge(32, 32);
        let res = detect_objects_with_stats(img.view(), &edge_cascade()).unwrap();

        // 32, 25, 20, 16, 13, 10 and 8 pixel levels.
        assert_eq!(res.stats.scales, 7);
        assert_eq!(res.stats.raw_detections, 75);
        assert_eq!(res.objects, vec![Rect::new(0, 0, 30, 32)]);

        let rejected: u64 = res.stats.stage_rejections.iter().sum();
        assert_eq!(
            res.stats.windows,
            res.stats.degenerate + rejected + res.stats.raw_detections as u64
        );
    }

    #[test]
    fn reversed_edge_is_rejected_by_the_stage() {
        let mut img = step_edge(32, 32);
        for v in img.data_mut() {
            *v = 220 - *v;
        }
        let res = detect_objects_with_stats(img.view(), &edge_cascade()).unwrap();
        assert!(res.objects.is_empty());
        assert!(res.stats.stage_rejections[0] > 0);
    }

    #[test]
    fn window_larger_than_image_scans_nothing() {
        let img = Image::filled(6, 6, 50).unwrap();
        let res = detect_objects_with_stats(img.view(), &edge_cascade()).unwrap();
        assert_eq!(res.stats.scales, 0);
        assert!(res.objects.is_empty());
    }

    #[test]
    fn colour_input_is_rejected() {
        let img =
            Image::from_vec(16, 16, crate::image::PixelFormat::Rgb565, vec![0; 16 * 16 * 2]).unwrap();
        assert!(detect_objects(img.view(), &edge_cascade()).is_err());
    }
}
