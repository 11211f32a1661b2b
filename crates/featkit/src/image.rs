//! Helpers running the core detectors on an `image::GrayImage`.
//!
//! Each wrapper borrows the buffer as an [`ImageView`] and forwards to the
//! matching core function; results are identical to calling the core with
//! `img.as_raw()`.

use featkit_core::{
    blob, cascade, fast, freak, lbp, template, Blob, Cascade, FastParams, FreakParams, ImageView,
    Keypoint, KmeansParams, LbpDescriptor, Rect, Result, TemplateMatch, TemplateParams,
};
use image::GrayImage;

/// Borrow a `GrayImage` as a core image view.
#[inline]
pub fn view_gray(img: &GrayImage) -> Result<ImageView<'_>> {
    ImageView::gray(img.width() as usize, img.height() as usize, img.as_raw())
}

/// Run a Haar cascade over an `image::GrayImage`.
#[inline]
pub fn detect_objects_image(img: &GrayImage, cascade: &Cascade) -> Result<Vec<Rect>> {
    cascade::detect_objects(view_gray(img)?, cascade)
}

/// Detect FAST keypoints in an `image::GrayImage`, optionally inside `roi`.
#[inline]
pub fn find_keypoints_image(
    img: &GrayImage,
    params: &FastParams,
    roi: Option<Rect>,
) -> Result<Vec<Keypoint>> {
    fast::detect_keypoints(view_gray(img)?, params, roi)
}

/// Attach FREAK descriptors to `keypoints`; returns how many were described.
#[inline]
pub fn describe_keypoints_image(
    img: &GrayImage,
    keypoints: &mut [Keypoint],
    params: &FreakParams,
) -> Result<usize> {
    freak::describe_keypoints(view_gray(img)?, keypoints, params)
}

/// Cluster the pixels at or above `min_intensity` into `k` blobs.
pub fn find_blobs_image(
    img: &GrayImage,
    min_intensity: u8,
    k: usize,
    params: &KmeansParams,
) -> Result<Vec<Blob>> {
    let points = blob::collect_points(view_gray(img)?, min_intensity)?;
    blob::find_blobs(&points, k, params)
}

/// LBP descriptor of an `image::GrayImage` over a `divisions x divisions` grid.
#[inline]
pub fn lbp_descriptor_image(
    img: &GrayImage,
    divisions: usize,
    roi: Option<Rect>,
) -> Result<LbpDescriptor> {
    lbp::lbp_descriptor(view_gray(img)?, divisions, roi)
}

/// Search `img` for the best normalised cross-correlation match of `tpl`.
#[inline]
pub fn match_template_image(
    img: &GrayImage,
    tpl: &GrayImage,
    params: &TemplateParams,
    roi: Option<Rect>,
) -> Result<Option<TemplateMatch>> {
    template::match_template(view_gray(img)?, view_gray(tpl)?, params, roi)
}
