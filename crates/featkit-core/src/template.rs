//! Template matching by normalised cross-correlation (NCC).
//!
//! Window sums and squared sums come from integral images, so only the
//! cross term `sum(I * T)` is accumulated per position. Scores lie in
//! `[-1, 1]`; 1 means the window is an exact positive affine copy of the
//! template.

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::image::ImageView;
use crate::integral::{IntegralImage, MAX_EXACT_SQUARED_AREA};
#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

/// Search settings for [`match_template`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TemplateParams {
    /// Smallest score reported as a match.
    pub threshold: f32,
    /// Distance in pixels between tested positions, in both axes.
    pub step: usize,
}

impl Default for TemplateParams {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            step: 1,
        }
    }
}

impl TemplateParams {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }
}

/// Best-scoring template position.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemplateMatch {
    /// Window covered by the template.
    pub rect: Rect,
    pub score: f32,
}

/// Slides `template` over `roi` (the whole image when `None`) and returns the
/// highest-scoring window if its score reaches `params.threshold`.
///
/// Equal scores keep the first window in raster order. Windows with no
/// contrast are skipped, and a template that does not fit inside the ROI
/// gives `None`. Fails when either image is not grayscale, the template has
/// no contrast or more than [`MAX_EXACT_SQUARED_AREA`] pixels, `step == 0`,
/// or the threshold is not finite.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip(img, template, params),
        fields(tw = template.width(), th = template.height())
    )
)]
pub fn match_template(
    img: ImageView<'_>,
    template: ImageView<'_>,
    params: &TemplateParams,
    roi: Option<Rect>,
) -> Result<Option<TemplateMatch>> {
    if params.step == 0 {
        return Err(Error::invalid("template step must be at least 1"));
    }
    if !params.threshold.is_finite() {
        return Err(Error::invalid(format!(
            "template threshold {} is not finite",
            params.threshold
        )));
    }
    let (tw, th) = (template.width(), template.height());
    let n = tw * th;
    if n > MAX_EXACT_SQUARED_AREA {
        return Err(Error::invalid(format!(
            "template of {tw}x{th} exceeds {MAX_EXACT_SQUARED_AREA} pixels"
        )));
    }
    let tpl = template.luma()?;
    let luma = img.luma()?;

    let n = n as i64;
    let (t_sum, t_sq) = tpl.iter().fold((0i64, 0i64), |(s, q), &v| {
        let v = v as i64;
        (s + v, q + v * v)
    });
    let t_var = n * t_sq - t_sum * t_sum;
    if t_var == 0 {
        return Err(Error::invalid("template has no contrast"));
    }

    let (w, h) = (img.width(), img.height());
    let area = roi
        .unwrap_or(Rect::new(0, 0, i32::MAX, i32::MAX))
        .clamp_to(w, h);
    if (area.w as usize) < tw || (area.h as usize) < th {
        return Ok(None);
    }
    let sums = IntegralImage::new(img)?;
    let squares = IntegralImage::squared(img)?;
    let t_norm = (t_var as f64).sqrt();

    let (x0, y0) = (area.x as usize, area.y as usize);
    let x_last = x0 + area.w as usize - tw;
    let y_last = y0 + area.h as usize - th;
    let mut best: Option<TemplateMatch> = None;
    let mut windows = 0usize;
    for y in (y0..=y_last).step_by(params.step) {
        for x in (x0..=x_last).step_by(params.step) {
            let i_sum = sums.rect_sum_unclamped(x, y, tw, th) as i64;
            let i_sq = squares.rect_sum_unclamped(x, y, tw, th) as i64;
            let i_var = n * i_sq - i_sum * i_sum;
            if i_var <= 0 {
                continue;
            }
            windows += 1;
            let mut cross = 0i64;
            for ty in 0..th {
                let row = &luma[(y + ty) * w + x..][..tw];
                let trow = &tpl[ty * tw..][..tw];
                cross += row
                    .iter()
                    .zip(trow)
                    .map(|(&a, &b)| a as i64 * b as i64)
                    .sum::<i64>();
            }
            let num = n * cross - i_sum * t_sum;
            let score = (num as f64 / ((i_var as f64).sqrt() * t_norm)).clamp(-1.0, 1.0) as f32;
            if best.map_or(true, |b| score > b.score) {
                best = Some(TemplateMatch {
                    rect: Rect::new(x as i32, y as i32, tw as i32, th as i32),
                    score,
                });
            }
        }
    }

    #[cfg(feature = "tracing")]
    debug!(windows, best = ?best.map(|b| b.score), "template scan finished");
    #[cfg(not(feature = "tracing"))]
    let _ = windows;

    Ok(best.filter(|b| b.score >= params.threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Image, PixelFormat};

    fn noise(w: usize, h: usize, seed: u32) -> Image {
        let mut state = seed;
        let data = (0..w * h)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                ((state >> 16) % 100) as u8
            })
            .collect();
        Image::from_vec(w, h, PixelFormat::Grayscale, data).unwrap()
    }

    fn crop(img: &Image, x: usize, y: usize, w: usize, h: usize) -> Image {
        let mut data = Vec::with_capacity(w * h);
        for yy in y..y + h {
            for xx in x..x + w {
                data.push(img.view().gray_at(xx, yy));
            }
        }
        Image::from_vec(w, h, PixelFormat::Grayscale, data).unwrap()
    }

    #[test]
    fn finds_a_patch_cut_from_the_image() {
        let img = noise(40, 30, 7);
        let tpl = crop(&img, 17, 9, 8, 6);
        let m = match_template(img.view(), tpl.view(), &TemplateParams::default(), None)
            .unwrap()
            .unwrap();
        assert_eq!(m.rect, Rect::new(17, 9, 8, 6));
        assert!(m.score > 0.999, "score {}", m.score);
    }

    #[test]
    fn gain_and_offset_do_not_change_the_match() {
        let img = noise(40, 30, 11);
        let mut brighter = img.clone();
        for v in brighter.data_mut() {
            *v = *v * 2 + 30;
        }
        let tpl = crop(&brighter, 5, 20, 7, 7);
        let m = match_template(img.view(), tpl.view(), &TemplateParams::default(), None)
            .unwrap()
            .unwrap();
        assert_eq!(m.rect, Rect::new(5, 20, 7, 7));
        assert!(m.score > 0.999, "score {}", m.score);
    }

    #[test]
    fn roi_limits_the_search() {
        let img = noise(40, 30, 3);
        let tpl = crop(&img, 17, 9, 8, 6);
        let params = TemplateParams::default().with_threshold(-1.0);
        let m = match_template(img.view(), tpl.view(), &params, Some(Rect::new(0, 0, 16, 30)))
            .unwrap()
            .unwrap();
        assert!(m.rect.right() <= 16);
        assert!(m.score < 0.99);

        let strict = TemplateParams::default().with_threshold(0.99);
        let none = match_template(img.view(), tpl.view(), &strict, Some(Rect::new(0, 0, 16, 30)));
        assert_eq!(none.unwrap(), None);
    }

    #[test]
    fn step_skips_positions() {
        let img = noise(40, 30, 5);
        let tpl = crop(&img, 18, 10, 6, 6);
        let on_grid = TemplateParams::default().with_step(2);
        let m = match_template(img.view(), tpl.view(), &on_grid, None).unwrap().unwrap();
        assert_eq!(m.rect, Rect::new(18, 10, 6, 6));

        let off_grid = crop(&img, 19, 10, 6, 6);
        let params = on_grid.with_threshold(0.99);
        assert_eq!(
            match_template(img.view(), off_grid.view(), &params, None).unwrap(),
            None
        );
    }

    #[test]
    fn degenerate_inputs_give_no_match() {
        let tpl = crop(&noise(10, 10, 1), 0, 0, 4, 4);
        let flat = Image::filled(20, 20, 50).unwrap();
        let params = TemplateParams::default().with_threshold(-1.0);
        assert_eq!(match_template(flat.view(), tpl.view(), &params, None).unwrap(), None);

        let small = noise(3, 3, 2);
        assert_eq!(match_template(small.view(), tpl.view(), &params, None).unwrap(), None);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        let img = noise(20, 20, 9);
        let tpl = crop(&img, 2, 2, 4, 4);
        let flat_tpl = Image::filled(4, 4, 10).unwrap();
        let invalid = |r: Result<Option<TemplateMatch>>| matches!(r, Err(Error::InvalidArgument(_)));

        let d = TemplateParams::default();
        assert!(invalid(match_template(img.view(), flat_tpl.view(), &d, None)));
        assert!(invalid(match_template(img.view(), tpl.view(), &d.clone().with_step(0), None)));
        assert!(invalid(match_template(
            img.view(),
            tpl.view(),
            &d.clone().with_threshold(f32::NAN),
            None
        )));

        let big = Image::filled(260, 260, 0).unwrap();
        assert!(invalid(match_template(big.view(), big.view(), &d, None)));
    }
}
