use crate::error::{Error, Result};
use crate::keypoint::{hamming_distance, Keypoint};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Descriptor length shared by every described keypoint of both sets, or
/// `None` when neither set has a descriptor.
fn common_descriptor_len(a: &[Keypoint], b: &[Keypoint]) -> Result<Option<usize>> {
    let mut len = None;
    for d in a.iter().chain(b).filter_map(|k| k.descriptor.as_ref()) {
        match len {
            None => len = Some(d.len()),
            Some(l) if l != d.len() => {
                return Err(Error::invalid(format!(
                    "descriptor lengths differ ({l} vs {} bytes)",
                    d.len()
                )))
            }
            Some(_) => {}
        }
    }
    Ok(len)
}

/// For every keypoint of `set1`, the index of the nearest `set2` keypoint by
/// Hamming distance, if that distance is at most `threshold`.
///
/// Ties go to the lowest index; keypoints without a descriptor never match.
/// Matching a set against itself maps each keypoint to its own index only
/// when the descriptors are distinct: identical descriptors all map to the
/// first of them.
pub fn match_keypoints(
    set1: &[Keypoint],
    set2: &[Keypoint],
    threshold: u32,
) -> Result<Vec<Option<usize>>> {
    Ok(match_keypoints_with_distance(set1, set2, threshold)?
        .into_iter()
        .map(|m| m.map(|(idx, _)| idx))
        .collect())
}

/// Like [`match_keypoints`], also returning the winning distance.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(set1, set2), fields(n1 = set1.len(), n2 = set2.len()))
)]
pub fn match_keypoints_with_distance(
    set1: &[Keypoint],
    set2: &[Keypoint],
    threshold: u32,
) -> Result<Vec<Option<(usize, u32)>>> {
    common_descriptor_len(set1, set2)?;

    Ok(set1
        .iter()
        .map(|kp| {
            let d1 = kp.descriptor.as_ref()?;
            let mut best: Option<(usize, u32)> = None;
            for (j, other) in set2.iter().enumerate() {
                let Some(d2) = other.descriptor.as_ref() else {
                    continue;
                };
                let dist = hamming_distance(d1.as_bytes(), d2.as_bytes());
                if best.map_or(true, |(_, b)| dist < b) {
                    best = Some((j, dist));
                }
            }
            best.filter(|&(_, dist)| dist <= threshold)
        })
        .collect())
}
