//! Local binary pattern (LBP) texture descriptors.
//!
//! Every pixel with a full 8-neighbourhood gets an 8-bit code: bit `k` is set
//! when neighbour `k` (clockwise from the top-left) is at least as bright as
//! the centre. Codes with at most two circular 0/1 transitions are "uniform"
//! and get their own histogram bin; all other codes share one bin, giving
//! [`LBP_BINS`] bins. The ROI is split into `divisions x divisions` regions
//! and the descriptor is the concatenation of their histograms.
//!
//! File layout (little-endian): `"LBPD" u16 divisions`, then
//! `divisions^2 * LBP_BINS` histogram bytes. Nothing may follow them.

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::image::ImageView;
use std::path::Path;
#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

pub const MAGIC: [u8; 4] = *b"LBPD";

/// Histogram bins per region: 58 uniform patterns plus one catch-all.
pub const LBP_BINS: usize = 59;
/// Bin shared by every non-uniform code.
pub const NON_UNIFORM_BIN: usize = LBP_BINS - 1;
/// Largest grid side accepted by [`lbp_descriptor`] and the file reader.
pub const MAX_DIVISIONS: usize = 32;

const HEADER_LEN: usize = 6;
const WHAT: &str = "lbp descriptor";

/// Clockwise from the top-left neighbour.
const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

/// Histogram bin of every 8-bit code. Uniform codes are numbered in
/// increasing code order.
const UNIFORM_BIN: [u8; 256] = {
    let mut table = [NON_UNIFORM_BIN as u8; 256];
    let mut next = 0u8;
    let mut code = 0usize;
    while code < 256 {
        let c = code as u8;
        if (c ^ c.rotate_right(1)).count_ones() <= 2 {
            table[code] = next;
            next += 1;
        }
        code += 1;
    }
    table
};

/// Per-region LBP histograms, row-major over the region grid.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LbpDescriptor {
    divisions: usize,
    histograms: Vec<u8>,
}

impl LbpDescriptor {
    /// Side of the region grid.
    #[inline]
    pub fn divisions(&self) -> usize {
        self.divisions
    }

    /// All histograms, `divisions^2 * LBP_BINS` bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.histograms
    }

    /// Histogram of region `(rx, ry)`.
    pub fn histogram(&self, rx: usize, ry: usize) -> Option<&[u8]> {
        if rx >= self.divisions || ry >= self.divisions {
            return None;
        }
        let start = (ry * self.divisions + rx) * LBP_BINS;
        self.histograms.get(start..start + LBP_BINS)
    }

    /// Encodes the descriptor in the `LBPD` layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.histograms.len());
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&(self.divisions as u16).to_le_bytes());
        buf.extend_from_slice(&self.histograms);
        buf
    }

    /// Decodes an `LBPD` buffer. The buffer must end after the last histogram.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = bytes
            .get(..HEADER_LEN)
            .ok_or_else(|| Error::load(WHAT, format!("truncated header ({} bytes)", bytes.len())))?;
        if header[..4] != MAGIC {
            return Err(Error::load(WHAT, format!("bad magic {:02x?}", &header[..4])));
        }
        let divisions = u16::from_le_bytes([header[4], header[5]]) as usize;
        if divisions == 0 || divisions > MAX_DIVISIONS {
            return Err(Error::load(
                WHAT,
                format!("divisions {divisions} outside 1..={MAX_DIVISIONS}"),
            ));
        }
        let expected = divisions * divisions * LBP_BINS;
        let body = &bytes[HEADER_LEN..];
        if body.len() != expected {
            return Err(Error::load(
                WHAT,
                format!("expected {expected} histogram bytes, found {}", body.len()),
            ));
        }
        Ok(Self {
            divisions,
            histograms: body.to_vec(),
        })
    }

    /// Writes the descriptor to a file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_bytes())?;
        Ok(())
    }

    /// Reads a descriptor from a file at `path`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path.as_ref())?)
    }
}

/// LBP descriptor of `roi` (the whole image when `None`) split into a
/// `divisions x divisions` grid.
///
/// Pixels on the image border have no full neighbourhood and are not counted.
/// Counts saturate at 255. An ROI outside the image yields all-zero
/// histograms. Fails when `divisions` is outside `1..=MAX_DIVISIONS` or the
/// image is not grayscale.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img), fields(w = img.width(), h = img.height()))
)]
pub fn lbp_descriptor(
    img: ImageView<'_>,
    divisions: usize,
    roi: Option<Rect>,
) -> Result<LbpDescriptor> {
    if divisions == 0 || divisions > MAX_DIVISIONS {
        return Err(Error::invalid(format!(
            "divisions {divisions} outside 1..={MAX_DIVISIONS}"
        )));
    }
    let luma = img.luma()?;
    let (w, h) = (img.width(), img.height());
    let area = roi
        .unwrap_or(Rect::new(0, 0, i32::MAX, i32::MAX))
        .clamp_to(w, h);
    let mut histograms = vec![0u8; divisions * divisions * LBP_BINS];

    let (x0, y0) = (area.x as usize, area.y as usize);
    let (rw, rh) = (area.w as usize, area.h as usize);
    for y in y0.max(1)..(y0 + rh).min(h.saturating_sub(1)) {
        let ry = (y - y0) * divisions / rh;
        for x in x0.max(1)..(x0 + rw).min(w.saturating_sub(1)) {
            let rx = (x - x0) * divisions / rw;
            let centre = luma[y * w + x];
            let mut code = 0u8;
            for (k, &(dx, dy)) in NEIGHBOURS.iter().enumerate() {
                let nx = (x as isize + dx) as usize;
                let ny = (y as isize + dy) as usize;
                if luma[ny * w + nx] >= centre {
                    code |= 1 << k;
                }
            }
            let bin = (ry * divisions + rx) * LBP_BINS + UNIFORM_BIN[code as usize] as usize;
            histograms[bin] = histograms[bin].saturating_add(1);
        }
    }

    #[cfg(feature = "tracing")]
    debug!(divisions, roi = ?area, "lbp descriptor built");

    Ok(LbpDescriptor {
        divisions,
        histograms,
    })
}

/// Chi-square distance `sum((a - b)^2 / (a + b))` over all bins, each term
/// truncated to an integer. Bins empty in both descriptors contribute 0.
///
/// Fails when the descriptors use different grids.
pub fn lbp_distance(a: &LbpDescriptor, b: &LbpDescriptor) -> Result<u32> {
    if a.divisions != b.divisions {
        return Err(Error::invalid(format!(
            "descriptor grids differ ({0}x{0} vs {1}x{1})",
            a.divisions, b.divisions
        )));
    }
    Ok(a
        .histograms
        .iter()
        .zip(&b.histograms)
        .map(|(&p, &q)| {
            let sum = p as u32 + q as u32;
            if sum == 0 {
                0
            } else {
                let d = p.abs_diff(q) as u32;
                d * d / sum
            }
        })
        .sum())
}
