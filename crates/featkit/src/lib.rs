//! `image`-crate front end for `featkit-core`.
//!
//! Re-exports the whole core API and adds [`image`] helpers that accept
//! [`::image::GrayImage`] directly, plus the JSON-configured [`app`] runner
//! shared by the examples.
pub use featkit_core::*;

pub mod app;
pub mod image;
