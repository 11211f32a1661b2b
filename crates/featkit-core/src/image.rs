//! Length-checked raster buffers.
//!
//! Dimensions and buffer length are validated once, at construction. Every
//! algorithm in this crate borrows an [`ImageView`] and relies on that check
//! instead of re-validating per access.

use crate::error::{Error, Result};

/// Pixel layout of an image buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PixelFormat {
    /// One byte per pixel, 8-bit intensity.
    Grayscale,
    /// Two bytes per pixel, packed 5-6-5 colour.
    Rgb565,
    /// Three bytes per pixel, packed 8-8-8 colour.
    Rgb888,
}

impl PixelFormat {
    /// Bytes occupied by one pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Grayscale => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 => 3,
        }
    }

    /// Maps a bytes-per-pixel tag (1, 2 or 3) to a format.
    pub const fn from_bpp(bpp: u8) -> Option<Self> {
        match bpp {
            1 => Some(PixelFormat::Grayscale),
            2 => Some(PixelFormat::Rgb565),
            3 => Some(PixelFormat::Rgb888),
            _ => None,
        }
    }
}

fn check_layout(width: usize, height: usize, format: PixelFormat, len: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::invalid(format!(
            "image dimensions must be positive (got {width}x{height})"
        )));
    }
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(format.bytes_per_pixel()))
        .ok_or_else(|| Error::invalid(format!("image {width}x{height} is too large")))?;
    if expected != len {
        return Err(Error::SizeMismatch {
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Borrowed, row-major image.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: &'a [u8],
}

impl<'a> ImageView<'a> {
    /// Wraps `data` as a `width x height` image in `format`.
    ///
    /// Fails with [`Error::InvalidArgument`] for zero dimensions and
    /// [`Error::SizeMismatch`] when `data.len() != width * height * bpp`.
    pub fn new(width: usize, height: usize, format: PixelFormat, data: &'a [u8]) -> Result<Self> {
        check_layout(width, height, format, data.len())?;
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Shorthand for a grayscale view.
    pub fn gray(width: usize, height: usize, data: &'a [u8]) -> Result<Self> {
        Self::new(width, height, PixelFormat::Grayscale, data)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw bytes, row-major.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Intensity buffer of a grayscale view.
    ///
    /// The detectors only operate on intensity; colour images must be
    /// converted by the caller first.
    pub fn luma(&self) -> Result<&'a [u8]> {
        match self.format {
            PixelFormat::Grayscale => Ok(self.data),
            other => Err(Error::invalid(format!(
                "expected a grayscale image, got {other:?}"
            ))),
        }
    }

    /// Intensity at `(x, y)` of a grayscale view.
    ///
    /// # Panics
    /// Panics if the coordinate is outside the image.
    #[inline]
    pub fn gray_at(&self, x: usize, y: usize) -> u8 {
        debug_assert_eq!(self.format, PixelFormat::Grayscale);
        self.data[y * self.width + x]
    }
}

/// Owned, row-major image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Image {
    /// Takes ownership of `data` as a `width x height` image in `format`.
    pub fn from_vec(width: usize, height: usize, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        check_layout(width, height, format, data.len())?;
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Grayscale image filled with `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Result<Self> {
        let len = width
            .checked_mul(height)
            .ok_or_else(|| Error::invalid(format!("image {width}x{height} is too large")))?;
        Self::from_vec(width, height, PixelFormat::Grayscale, vec![value; len])
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel bytes. The length cannot change, so the layout
    /// invariant holds.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Sets a grayscale pixel.
    ///
    /// # Panics
    /// Panics if the coordinate is outside the image.
    #[inline]
    pub fn set_gray(&mut self, x: usize, y: usize, value: u8) {
        debug_assert_eq!(self.format, PixelFormat::Grayscale);
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        self.data[y * self.width + x] = value;
    }

    /// Borrows the image.
    #[inline]
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            width: self.width,
            height: self.height,
            format: self.format,
            data: &self.data,
        }
    }

    /// Releases the pixel buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}
