//! FREAK binary descriptors: extraction over a retinal sampling pattern,
//! Hamming matching and persistence.
//!
//! Typical flow:
//!
//! ```no_run
//! # use featkit_core::{fast, freak, ImageView};
//! # fn run(a: ImageView<'_>, b: ImageView<'_>) -> featkit_core::Result<()> {
//! let params = fast::FastParams::default();
//! let mut kps1 = fast::detect_keypoints(a, &params, None)?;
//! let mut kps2 = fast::detect_keypoints(b, &params, None)?;
//! let extractor = freak::FreakExtractor::new(freak::FreakParams::default())?;
//! extractor.describe(a, &mut kps1)?;
//! extractor.describe(b, &mut kps2)?;
//! let matches = freak::match_keypoints(&kps1, &kps2, 60)?;
//! # let _ = matches;
//! # Ok(())
//! # }
//! ```

mod extract;
pub mod io;
mod matching;
pub mod pattern;

pub use extract::{describe_keypoints, FreakExtractor, FreakParams, FREAK_OCTAVES};
pub use io::{load_descriptors, read_descriptors, save_descriptors, write_descriptors};
pub use matching::{match_keypoints, match_keypoints_with_distance};
pub use pattern::{DESCRIPTOR_BITS, DESCRIPTOR_BYTES};
