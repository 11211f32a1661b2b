//! Feature and object detection over small 8-bit raster images.
//!
//! # Overview
//!
//! Every component borrows a length-checked [`ImageView`] and never mutates
//! it:
//!
//! - [`integral`] – plain, squared and resampled summed-area tables with O(1)
//!   rectangle sums.
//! - [`cascade`] – Haar-feature rejection cascades evaluated over an image
//!   pyramid, with overlap merging of the detections.
//! - [`fast`] – FAST segment-test corners with Harris scoring and
//!   non-maximum suppression.
//! - [`freak`] – FREAK binary descriptors: extraction, Hamming matching and
//!   a compact on-disk format.
//! - [`blob`] – deterministic k-means clustering of point sets into blobs.
//! - [`lbp`] – uniform local-binary-pattern histograms over a region grid,
//!   their chi-square distance and an on-disk format.
//! - [`template`] – normalised cross-correlation template search.
//!
//! Degenerate inputs (flat windows, an empty ROI, a disabled threshold, an
//! empty cluster) give empty results; malformed inputs give an [`Error`].
//!
//! # Features
//!
//! - `tracing` – instruments the public entry points with `tracing` spans.
//!   Off by default; without it there is no logging overhead.
//! - `serde` – derives `Serialize`/`Deserialize` for the parameter structs
//!   and the result types.
//!
//! The whole crate is single-threaded and allocation is bounded by the
//! `MAX_*` limits below.

pub mod blob;
pub mod cascade;
pub mod error;
pub mod fast;
pub mod freak;
pub mod geometry;
pub mod image;
pub mod integral;
pub mod keypoint;
pub mod lbp;
pub mod ring;
pub mod template;

pub use blob::{collect_points, find_blobs, kmeans, Blob, Cluster, KmeansParams};
pub use cascade::{detect_objects, detect_objects_with_stats, Cascade};
pub use error::{Error, Result};
pub use fast::{detect_keypoints, FastParams};
pub use freak::{match_keypoints, FreakExtractor, FreakParams};
pub use geometry::{merge_rects, Point, Rect};
pub use image::{Image, ImageView, PixelFormat};
pub use integral::IntegralImage;
pub use keypoint::{Descriptor, Keypoint};
pub use lbp::{lbp_descriptor, lbp_distance, LbpDescriptor};
pub use template::{match_template, TemplateMatch, TemplateParams};

/// Largest stage count a cascade may declare.
pub const MAX_STAGES: usize = 256;
/// Largest weak-classifier count per cascade stage.
pub const MAX_CLASSIFIERS_PER_STAGE: usize = 1024;
/// Largest cascade file accepted, in bytes.
pub const MAX_CASCADE_BYTES: usize = 4 << 20;
/// Largest keypoint list produced by FAST or stored in a descriptor file.
pub const MAX_KEYPOINTS: usize = 65_536;
/// Largest descriptor length accepted from a descriptor file, in bytes.
pub const MAX_DESCRIPTOR_BYTES: usize = 1024;
/// Largest point set accepted by the clusterer.
pub const MAX_CLUSTER_POINTS: usize = 1 << 20;
