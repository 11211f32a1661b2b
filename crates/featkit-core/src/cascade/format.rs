//! Binary cascade file format (little-endian, version 1).
//!
//! ```text
//! header  "HAAR" u8 version u8 step u8 win_w u8 win_h u8 std f32 threshold
//!         f32 scale_factor u16 n_stages
//! stage   i16 threshold u16 n_classifiers
//! weak    i16 threshold i16 fail_value i16 pass_value u8 n_rects
//! rect    u8 x u8 y u8 w u8 h i8 weight
//! ```
//!
//! Every declared count is checked against the bytes that remain before
//! anything is allocated, and a file must end exactly after its last rect.

use super::{Cascade, Stage, WeakClassifier, WeightedRect, MAX_RECTS_PER_CLASSIFIER};
use crate::error::{Error, Result};
use crate::{MAX_CASCADE_BYTES, MAX_CLASSIFIERS_PER_STAGE, MAX_STAGES};
use std::io::{Read, Write};
use std::path::Path;
#[cfg(feature = "tracing")]
use tracing::instrument;

pub const MAGIC: [u8; 4] = *b"HAAR";
pub const VERSION: u8 = 1;

const HEADER_LEN: usize = 19;
const STAGE_HEADER_LEN: usize = 4;
const CLASSIFIER_HEADER_LEN: usize = 7;
const RECT_LEN: usize = 5;
/// Smallest possible encoded classifier (one rect).
const MIN_CLASSIFIER_LEN: usize = CLASSIFIER_HEADER_LEN + RECT_LEN;
/// Smallest possible encoded stage (one minimal classifier).
const MIN_STAGE_LEN: usize = STAGE_HEADER_LEN + MIN_CLASSIFIER_LEN;

const WHAT: &str = "cascade";

fn bad(reason: impl Into<String>) -> Error {
    Error::load(WHAT, reason)
}

/// Bounds-checked little-endian cursor.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| bad(format!("truncated at byte {}", self.pos)))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn i8(&mut self) -> Result<i8> {
        Ok(self.take::<1>()?[0] as i8)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    /// Fails unless `count` items of at least `min_len` bytes each can still
    /// be present.
    fn ensure_room(&self, count: usize, min_len: usize, what: &str) -> Result<()> {
        if count.saturating_mul(min_len) > self.remaining() {
            return Err(bad(format!(
                "{count} {what} declared but only {} bytes remain",
                self.remaining()
            )));
        }
        Ok(())
    }
}

impl Cascade {
    /// Parses a cascade from an in-memory file image.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(bytes), fields(len = bytes.len()))
    )]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_CASCADE_BYTES {
            return Err(bad(format!(
                "{} bytes exceeds the {MAX_CASCADE_BYTES}-byte limit",
                bytes.len()
            )));
        }
        let mut r = ByteReader::new(bytes);
        if r.remaining() < HEADER_LEN {
            return Err(bad(format!("header needs {HEADER_LEN} bytes, got {}", r.remaining())));
        }

        let magic = r.take::<4>()?;
        if magic != MAGIC {
            return Err(bad(format!("bad magic {magic:02x?}")));
        }
        let version = r.u8()?;
        if version != VERSION {
            return Err(bad(format!("unsupported version {version}")));
        }
        let step = r.u8()?;
        let window_width = r.u8()?;
        let window_height = r.u8()?;
        let std_flag = r.u8()?;
        let threshold = r.f32()?;
        let scale_factor = r.f32()?;
        let n_stages = r.u16()? as usize;

        if std_flag > 1 {
            return Err(bad(format!("std flag must be 0 or 1, got {std_flag}")));
        }
        if n_stages == 0 || n_stages > MAX_STAGES {
            return Err(bad(format!("stage count {n_stages} outside 1..={MAX_STAGES}")));
        }
        r.ensure_room(n_stages, MIN_STAGE_LEN, "stages")?;

        let mut stages = Vec::with_capacity(n_stages);
        for _ in 0..n_stages {
            stages.push(read_stage(&mut r)?);
        }

        if r.remaining() != 0 {
            return Err(bad(format!("{} trailing bytes", r.remaining())));
        }

        let cascade = Cascade {
            step: step as usize,
            window_width: window_width as usize,
            window_height: window_height as usize,
            std_normalize: std_flag == 1,
            threshold,
            scale_factor,
            stages,
        };
        cascade.validate().map_err(bad)?;
        Ok(cascade)
    }

    /// Reads a whole cascade file from `reader` (at most
    /// [`MAX_CASCADE_BYTES`]).
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .take(MAX_CASCADE_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| Error::from_read(WHAT, e))?;
        Self::from_bytes(&bytes)
    }

    /// Loads a cascade file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Encodes the cascade; [`Cascade::from_bytes`] reverses it exactly.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_LEN
                + self.stages.len() * STAGE_HEADER_LEN
                + self.classifier_count() * CLASSIFIER_HEADER_LEN
                + self.rect_count() * RECT_LEN,
        );
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.step as u8);
        out.push(self.window_width as u8);
        out.push(self.window_height as u8);
        out.push(self.std_normalize as u8);
        out.extend_from_slice(&self.threshold.to_le_bytes());
        out.extend_from_slice(&self.scale_factor.to_le_bytes());
        out.extend_from_slice(&(self.stages.len() as u16).to_le_bytes());

        for stage in &self.stages {
            out.extend_from_slice(&stage.threshold.to_le_bytes());
            out.extend_from_slice(&(stage.classifiers.len() as u16).to_le_bytes());
            for c in &stage.classifiers {
                out.extend_from_slice(&c.threshold.to_le_bytes());
                out.extend_from_slice(&c.fail_value.to_le_bytes());
                out.extend_from_slice(&c.pass_value.to_le_bytes());
                out.push(c.rects.len() as u8);
                for rect in &c.rects {
                    out.extend_from_slice(&[rect.x, rect.y, rect.w, rect.h, rect.weight as u8]);
                }
            }
        }
        out
    }

    /// Writes [`Cascade::to_bytes`] to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Writes the cascade to a file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_to(std::io::BufWriter::new(file))
    }
}

fn read_stage(r: &mut ByteReader<'_>) -> Result<Stage> {
    let threshold = r.i16()?;
    let n = r.u16()? as usize;
    if n == 0 || n > MAX_CLASSIFIERS_PER_STAGE {
        return Err(bad(format!(
            "classifier count {n} outside 1..={MAX_CLASSIFIERS_PER_STAGE}"
        )));
    }
    r.ensure_room(n, MIN_CLASSIFIER_LEN, "classifiers")?;

    let mut classifiers = Vec::with_capacity(n);
    for _ in 0..n {
        let threshold = r.i16()?;
        let fail_value = r.i16()?;
        let pass_value = r.i16()?;
        let n_rects = r.u8()? as usize;
        if n_rects == 0 || n_rects > MAX_RECTS_PER_CLASSIFIER {
            return Err(bad(format!(
                "rect count {n_rects} outside 1..={MAX_RECTS_PER_CLASSIFIER}"
            )));
        }
        r.ensure_room(n_rects, RECT_LEN, "rects")?;
        let mut rects = Vec::with_capacity(n_rects);
        for _ in 0..n_rects {
            rects.push(WeightedRect {
                x: r.u8()?,
                y: r.u8()?,
                w: r.u8()?,
                h: r.u8()?,
                weight: r.i8()?,
            });
        }
        classifiers.push(WeakClassifier {
            threshold,
            fail_value,
            pass_value,
            rects,
        });
    }
    Ok(Stage {
        threshold,
        classifiers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::edge_cascade;

    #[test]
    fn bytes_round_trip() {
        let c = edge_cascade();
        let bytes = c.to_bytes();
        assert_eq!(&bytes[..4], b"HAAR");
        assert_eq!(bytes.len(), HEADER_LEN + STAGE_HEADER_LEN + CLASSIFIER_HEADER_LEN + 2 * RECT_LEN);
        let back = Cascade::from_bytes(&bytes).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn reader_round_trip() {
        let c = edge_cascade();
        let mut buf = Vec::new();
        c.write_to(&mut buf).unwrap();
        let back = Cascade::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn every_truncation_is_a_load_error() {
        let bytes = edge_cascade().to_bytes();
        for len in 0..bytes.len() {
            let err = Cascade::from_bytes(&bytes[..len]).unwrap_err();
            assert!(matches!(err, Error::Load { what: "cascade", .. }), "len {len}: {err}");
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = edge_cascade().to_bytes();
        bytes.push(0);
        assert!(matches!(Cascade::from_bytes(&bytes), Err(Error::Load { .. })));
    }

    #[test]
    fn bad_magic_and_version_are_rejected() {
        let good = edge_cascade().to_bytes();
        let mut bytes = good.clone();
        bytes[0] = b'X';
        assert!(matches!(Cascade::from_bytes(&bytes), Err(Error::Load { .. })));
        let mut bytes = good;
        bytes[4] = 2;
        assert!(matches!(Cascade::from_bytes(&bytes), Err(Error::Load { .. })));
    }

    #[test]
    fn huge_stage_count_fails_before_allocating() {
        let mut bytes = edge_cascade().to_bytes();
        bytes[17..19].copy_from_slice(&200u16.to_le_bytes());
        let err = Cascade::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("200 stages"), "{err}");
    }

    #[test]
    fn stage_count_above_limit_is_rejected() {
        let mut bytes = edge_cascade().to_bytes();
        bytes[17..19].copy_from_slice(&((MAX_STAGES + 1) as u16).to_le_bytes());
        assert!(matches!(Cascade::from_bytes(&bytes), Err(Error::Load { .. })));
    }

    #[test]
    fn rect_leaving_window_is_a_load_error() {
        let mut bytes = edge_cascade().to_bytes();
        // First rect's width byte.
        let rect0 = HEADER_LEN + STAGE_HEADER_LEN + CLASSIFIER_HEADER_LEN;
        bytes[rect0 + 2] = 9;
        assert!(matches!(Cascade::from_bytes(&bytes), Err(Error::Load { .. })));
    }

    #[test]
    fn invalid_scale_factor_is_a_load_error() {
        let mut bytes = edge_cascade().to_bytes();
        bytes[13..17].copy_from_slice(&0.5f32.to_le_bytes());
        assert!(matches!(Cascade::from_bytes(&bytes), Err(Error::Load { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Cascade::load("/nonexistent/featkit/cascade.bin").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
