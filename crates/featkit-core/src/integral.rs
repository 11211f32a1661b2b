//! Summed-area tables.
//!
//! `at(x, y)` holds the sum of all source pixels with column `<= x` and row
//! `<= y`. Accumulation is 32-bit and wrapping: inclusion–exclusion over
//! wrapped sums is still exact whenever the true rectangle sum fits in
//! 32 bits. For plain sums that holds for every rectangle as long as
//! `width * height * 255 < 2^32`, which the builders enforce. Squared tables
//! share the same layout and are exact for rectangles of up to
//! [`MAX_EXACT_SQUARED_AREA`] pixels, which covers every cascade window.

use crate::error::{Error, Result};
use crate::image::ImageView;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Largest rectangle area whose squared-intensity sum is guaranteed to fit in
/// 32 bits (`255^2 * area < 2^32`).
pub const MAX_EXACT_SQUARED_AREA: usize = 66_051;

/// Immutable integral image with the same dimensions as its source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    data: Vec<u32>,
}

fn check_capacity(width: usize, height: usize) -> Result<()> {
    let fits = (width as u64)
        .checked_mul(height as u64)
        .and_then(|n| n.checked_mul(255))
        .is_some_and(|n| n < 1u64 << 32);
    if fits {
        Ok(())
    } else {
        Err(Error::Overflow { width, height })
    }
}

impl IntegralImage {
    /// Plain-sum table of a grayscale image.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(img), fields(w = img.width(), h = img.height()))
    )]
    pub fn new(img: ImageView<'_>) -> Result<Self> {
        let luma = img.luma()?;
        Self::build(img.width(), img.height(), |x, y| {
            luma[y * img.width() + x] as u32
        })
    }

    /// Squared-sum table of a grayscale image, used for window variance.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(img), fields(w = img.width(), h = img.height()))
    )]
    pub fn squared(img: ImageView<'_>) -> Result<Self> {
        let luma = img.luma()?;
        Self::build(img.width(), img.height(), |x, y| {
            let v = luma[y * img.width() + x] as u32;
            v * v
        })
    }

    /// Plain-sum table of `img` resampled (nearest neighbour) to
    /// `width x height`.
    pub fn scaled(img: ImageView<'_>, width: usize, height: usize) -> Result<Self> {
        Self::resampled(img, width, height, |v| v)
    }

    /// Squared-sum table of `img` resampled (nearest neighbour) to
    /// `width x height`.
    pub fn scaled_squared(img: ImageView<'_>, width: usize, height: usize) -> Result<Self> {
        Self::resampled(img, width, height, |v| v * v)
    }

    fn resampled(
        img: ImageView<'_>,
        width: usize,
        height: usize,
        map: impl Fn(u32) -> u32,
    ) -> Result<Self> {
        let luma = img.luma()?;
        if width == 0 || height == 0 || width > img.width() || height > img.height() {
            return Err(Error::invalid(format!(
                "scaled size {width}x{height} must be non-empty and no larger than {}x{}",
                img.width(),
                img.height()
            )));
        }
        let src_w = img.width();
        let src_h = img.height();
        Self::build(width, height, |x, y| {
            let sx = x * src_w / width;
            let sy = y * src_h / height;
            map(luma[sy * src_w + sx] as u32)
        })
    }

    fn build(width: usize, height: usize, pixel: impl Fn(usize, usize) -> u32) -> Result<Self> {
        check_capacity(width, height)?;
        let mut data = vec![0u32; width * height];

        for y in 0..height {
            let mut row_sum = 0u32;
            for x in 0..width {
                row_sum = row_sum.wrapping_add(pixel(x, y));
                let above = if y > 0 { data[(y - 1) * width + x] } else { 0 };
                data[y * width + x] = row_sum.wrapping_add(above);
            }
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Cumulative sum over `[0, x] x [0, y]`.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u32 {
        self.data[y * self.width + x]
    }

    /// Sum over the rectangle `(x, y, w, h)` in O(1).
    ///
    /// The rectangle is clamped to the table; an empty intersection sums to 0.
    pub fn rect_sum(&self, x: i32, y: i32, w: i32, h: i32) -> u32 {
        let x0 = x.max(0) as i64;
        let y0 = y.max(0) as i64;
        let x1 = (x as i64 + w as i64).min(self.width as i64);
        let y1 = (y as i64 + h as i64).min(self.height as i64);
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }
        // Inclusive corners of the clamped rectangle.
        let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize - 1, y1 as usize - 1);

        let d = self.at(x1, y1);
        let b = if y0 > 0 { self.at(x1, y0 - 1) } else { 0 };
        let c = if x0 > 0 { self.at(x0 - 1, y1) } else { 0 };
        let a = if x0 > 0 && y0 > 0 {
            self.at(x0 - 1, y0 - 1)
        } else {
            0
        };
        d.wrapping_sub(b).wrapping_sub(c).wrapping_add(a)
    }

    /// Sum over a rectangle that the caller has already bounds-checked.
    #[inline]
    pub(crate) fn rect_sum_unclamped(&self, x: usize, y: usize, w: usize, h: usize) -> u32 {
        debug_assert!(w > 0 && h > 0 && x + w <= self.width && y + h <= self.height);
        let (x1, y1) = (x + w - 1, y + h - 1);
        let d = self.at(x1, y1);
        let b = if y > 0 { self.at(x1, y - 1) } else { 0 };
        let c = if x > 0 { self.at(x - 1, y1) } else { 0 };
        let a = if x > 0 && y > 0 { self.at(x - 1, y - 1) } else { 0 };
        d.wrapping_sub(b).wrapping_sub(c).wrapping_add(a)
    }
}
