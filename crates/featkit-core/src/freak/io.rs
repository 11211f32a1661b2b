//! Keypoint/descriptor persistence.
//!
//! Little-endian layout: `"FRKD" u32 count u32 descriptor_len`, then per
//! keypoint `u16 x u16 y u32 angle_bits descriptor[descriptor_len]`. A stream
//! is accepted only whole: bad headers, truncation and trailing bytes are all
//! rejected.

use super::pattern::DESCRIPTOR_BYTES;
use crate::error::{Error, Result};
use crate::keypoint::{Descriptor, Keypoint};
use crate::{MAX_DESCRIPTOR_BYTES, MAX_KEYPOINTS};
use std::io::{Read, Write};
use std::path::Path;
#[cfg(feature = "tracing")]
use tracing::instrument;

pub const MAGIC: [u8; 4] = *b"FRKD";

const WHAT: &str = "descriptors";

/// Serialises `keypoints`. Every keypoint must carry a descriptor and all
/// descriptors must have the same length.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(writer, keypoints), fields(n = keypoints.len()))
)]
pub fn write_descriptors<W: Write>(mut writer: W, keypoints: &[Keypoint]) -> Result<()> {
    if keypoints.len() > MAX_KEYPOINTS {
        return Err(Error::invalid(format!(
            "{} keypoints exceeds the limit of {MAX_KEYPOINTS}",
            keypoints.len()
        )));
    }
    let mut desc_len = None;
    for (i, kp) in keypoints.iter().enumerate() {
        let d = kp
            .descriptor
            .as_ref()
            .ok_or_else(|| Error::invalid(format!("keypoint {i} has no descriptor")))?;
        match desc_len {
            None => desc_len = Some(d.len()),
            Some(l) if l != d.len() => {
                return Err(Error::invalid(format!(
                    "keypoint {i}: descriptor is {} bytes, expected {l}",
                    d.len()
                )))
            }
            Some(_) => {}
        }
    }
    let desc_len = desc_len.unwrap_or(DESCRIPTOR_BYTES);
    if desc_len == 0 || desc_len > MAX_DESCRIPTOR_BYTES {
        return Err(Error::invalid(format!(
            "descriptor length {desc_len} outside 1..={MAX_DESCRIPTOR_BYTES}"
        )));
    }

    let mut buf = Vec::with_capacity(12 + keypoints.len() * (8 + desc_len));
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&(keypoints.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(desc_len as u32).to_le_bytes());
    for kp in keypoints {
        buf.extend_from_slice(&kp.x.to_le_bytes());
        buf.extend_from_slice(&kp.y.to_le_bytes());
        buf.extend_from_slice(&kp.angle.to_bits().to_le_bytes());
        if let Some(d) = &kp.descriptor {
            buf.extend_from_slice(d.as_bytes());
        }
    }
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    reader
        .read_exact(&mut out)
        .map_err(|e| Error::from_read(WHAT, e))?;
    Ok(out)
}

/// Reads a stream written by [`write_descriptors`]. The reader must end
/// right after the last record.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(reader)))]
pub fn read_descriptors<R: Read>(mut reader: R) -> Result<Vec<Keypoint>> {
    let magic: [u8; 4] = read_array(&mut reader)?;
    if magic != MAGIC {
        return Err(Error::load(WHAT, format!("bad magic {magic:02x?}")));
    }
    let count = u32::from_le_bytes(read_array(&mut reader)?) as usize;
    let desc_len = u32::from_le_bytes(read_array(&mut reader)?) as usize;
    if count > MAX_KEYPOINTS {
        return Err(Error::load(
            WHAT,
            format!("keypoint count {count} exceeds {MAX_KEYPOINTS}"),
        ));
    }
    if desc_len == 0 || desc_len > MAX_DESCRIPTOR_BYTES {
        return Err(Error::load(
            WHAT,
            format!("descriptor length {desc_len} outside 1..={MAX_DESCRIPTOR_BYTES}"),
        ));
    }

    let mut keypoints = Vec::with_capacity(count);
    for _ in 0..count {
        let x = u16::from_le_bytes(read_array(&mut reader)?);
        let y = u16::from_le_bytes(read_array(&mut reader)?);
        let angle = f32::from_bits(u32::from_le_bytes(read_array(&mut reader)?));
        let mut bytes = vec![0u8; desc_len];
        reader
            .read_exact(&mut bytes)
            .map_err(|e| Error::from_read(WHAT, e))?;
        keypoints.push(Keypoint {
            x,
            y,
            angle,
            descriptor: Some(Descriptor(bytes)),
        });
    }

    let mut extra = [0u8; 1];
    loop {
        match reader.read(&mut extra) {
            Ok(0) => break,
            Ok(_) => return Err(Error::load(WHAT, "trailing bytes after last record")),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(keypoints)
}

/// Writes `keypoints` to a file at `path`.
pub fn save_descriptors(path: impl AsRef<Path>, keypoints: &[Keypoint]) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_descriptors(std::io::BufWriter::new(file), keypoints)
}

/// Reads keypoints from a file at `path`.
pub fn load_descriptors(path: impl AsRef<Path>) -> Result<Vec<Keypoint>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_descriptors(std::io::BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Keypoint> {
        vec![
            Keypoint {
                x: 10,
                y: 20,
                angle: 0.75,
                descriptor: Some(Descriptor(vec![1, 2, 3, 4])),
            },
            Keypoint {
                x: 65_535,
                y: 0,
                angle: -3.0,
                descriptor: Some(Descriptor(vec![0xFF, 0, 0x80, 7])),
            },
        ]
    }

    fn encode(kps: &[Keypoint]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_descriptors(&mut buf, kps).unwrap();
        buf
    }

    #[test]
    fn layout_is_header_then_records() {
        let buf = encode(&sample());
        assert_eq!(&buf[..4], b"FRKD");
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 4);
        assert_eq!(buf.len(), 12 + 2 * (8 + 4));
        assert_eq!(&buf[12..14], &10u16.to_le_bytes());
        assert_eq!(&buf[16..20], &0.75f32.to_bits().to_le_bytes());
    }

    #[test]
    fn round_trip_is_exact() {
        let kps = sample();
        let back = read_descriptors(encode(&kps).as_slice()).unwrap();
        assert_eq!(back, kps);
    }

    #[test]
    fn empty_set_round_trips() {
        let back = read_descriptors(encode(&[]).as_slice()).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn every_truncation_is_a_load_error() {
        let buf = encode(&sample());
        for len in 0..buf.len() {
            let err = read_descriptors(&buf[..len]).unwrap_err();
            assert!(matches!(err, Error::Load { what: "descriptors", .. }), "len {len}");
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = encode(&sample());
        buf.push(0);
        assert!(matches!(read_descriptors(buf.as_slice()), Err(Error::Load { .. })));
    }

    #[test]
    fn oversized_header_counts_are_rejected() {
        let mut buf = encode(&sample());
        buf[4..8].copy_from_slice(&(MAX_KEYPOINTS as u32 + 1).to_le_bytes());
        assert!(matches!(read_descriptors(buf.as_slice()), Err(Error::Load { .. })));

        let mut buf = encode(&sample());
        buf[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(read_descriptors(buf.as_slice()), Err(Error::Load { .. })));
    }

    #[test]
    fn saving_requires_uniform_descriptors() {
        let mut kps = sample();
        kps[1].descriptor = None;
        assert!(matches!(
            write_descriptors(Vec::new(), &kps),
            Err(Error::InvalidArgument(_))
        ));

        let mut kps = sample();
        kps[1].descriptor = Some(Descriptor(vec![1, 2]));
        assert!(matches!(
            write_descriptors(Vec::new(), &kps),
            Err(Error::InvalidArgument(_))
        ));
    }
}
