//! Shared application-level helpers for the examples.
//!
//! These functions wire up I/O (image decoding, cascade and descriptor files,
//! JSON output) around the core detectors so every front end runs the same
//! pipeline from one [`DetectionConfig`].

use crate::image::{
    describe_keypoints_image, detect_objects_image, find_keypoints_image, lbp_descriptor_image,
    match_template_image,
};
use anyhow::{Context, Result};
use featkit_core::freak::save_descriptors;
use featkit_core::{
    collect_points, find_blobs, Blob, Cascade, FastParams, FreakParams, KmeansParams, Rect,
    TemplateMatch, TemplateParams,
};
use image::ImageReader;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use std::{fs::File, io::Write, path::Path, path::PathBuf};
#[cfg(feature = "tracing")]
use tracing::{debug, info_span, warn};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    pub image: PathBuf,
    /// Haar cascade file; object detection is skipped without one.
    pub cascade: Option<PathBuf>,
    pub cascade_threshold: Option<f32>,
    pub cascade_scale_factor: Option<f32>,
    pub cascade_step: Option<usize>,
    /// Restricts FAST to this rectangle.
    pub roi: Option<Rect>,
    /// FAST settings; keypoint detection is skipped when absent.
    pub fast: Option<FastParams>,
    /// FREAK settings; keypoints stay undescribed when absent.
    pub freak: Option<FreakParams>,
    /// Cluster count for blob detection; blobs are skipped when absent.
    pub blob_k: Option<usize>,
    pub blob_min_intensity: Option<u8>,
    pub kmeans: Option<KmeansParams>,
    /// Grayscale image searched for in the input; skipped when absent.
    pub template: Option<PathBuf>,
    pub template_params: Option<TemplateParams>,
    /// Grid side of the LBP descriptor written to `output_lbp`.
    pub lbp_divisions: Option<usize>,
    pub output_json: Option<PathBuf>,
    pub output_descriptors: Option<PathBuf>,
    pub output_lbp: Option<PathBuf>,
}

impl DetectionConfig {
    /// Config running FAST and FREAK with default settings on `image`.
    pub fn for_image(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            cascade: None,
            cascade_threshold: None,
            cascade_scale_factor: None,
            cascade_step: None,
            roi: None,
            fast: Some(FastParams::default()),
            freak: Some(FreakParams::default()),
            blob_k: None,
            blob_min_intensity: None,
            kmeans: None,
            template: None,
            template_params: None,
            lbp_divisions: None,
            output_json: None,
            output_descriptors: None,
            output_lbp: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeypointOut {
    pub x: u16,
    pub y: u16,
    pub angle: f32,
    pub described: bool,
}

#[derive(Debug, Serialize)]
pub struct DetectionDump {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub objects: Vec<Rect>,
    pub keypoints: Vec<KeypointOut>,
    pub described: usize,
    pub blobs: Vec<Blob>,
    pub template_match: Option<TemplateMatch>,
    /// Stages that ran but were skipped or degraded, in pipeline order.
    pub warnings: Vec<String>,
    pub cascade_ms: f64,
    pub fast_ms: f64,
    pub freak_ms: f64,
    pub blob_ms: f64,
    pub template_ms: f64,
}

/// Run every configured component on `cfg.image`, write the JSON dump and,
/// if requested, the descriptor and LBP files. Returns the dump that was
/// written.
pub fn run_detection(cfg: DetectionConfig) -> Result<DetectionDump> {
    #[cfg(feature = "tracing")]
    let _run = info_span!("run_detection", image = %cfg.image.display()).entered();

    let img = load_gray(&cfg.image)?;
    let mut warnings = Vec::new();

    let started = Instant::now();
    let objects = match &cfg.cascade {
        Some(path) => {
            let cascade = load_cascade(path, &cfg)?;
            detect_objects_image(&img, &cascade).context("running the cascade")?
        }
        None => Vec::new(),
    };
    let cascade_ms = elapsed_ms(started);

    let started = Instant::now();
    let mut keypoints = match &cfg.fast {
        Some(params) => {
            find_keypoints_image(&img, params, cfg.roi).context("detecting FAST keypoints")?
        }
        None => Vec::new(),
    };
    let fast_ms = elapsed_ms(started);

    let started = Instant::now();
    let described = match &cfg.freak {
        Some(params) => describe_keypoints_image(&img, &mut keypoints, params)
            .context("extracting FREAK descriptors")?,
        None => 0,
    };
    let freak_ms = elapsed_ms(started);

    let started = Instant::now();
    let blobs = match cfg.blob_k {
        Some(k) => {
            let view = crate::image::view_gray(&img)?;
            let min_intensity = cfg.blob_min_intensity.unwrap_or(128);
            let points = collect_points(view, min_intensity)?;
            if points.len() < k {
                let msg = format!(
                    "blob_k = {k} exceeds the {} pixels at or above {min_intensity}; blobs skipped",
                    points.len()
                );
                #[cfg(feature = "tracing")]
                warn!("{msg}");
                warnings.push(msg);
                Vec::new()
            } else {
                let params = cfg.kmeans.clone().unwrap_or_default();
                find_blobs(&points, k, &params).context("clustering blobs")?
            }
        }
        None => Vec::new(),
    };
    let blob_ms = elapsed_ms(started);

    let started = Instant::now();
    let template_match = match &cfg.template {
        Some(path) => {
            let tpl = load_gray(path)?;
            let params = cfg.template_params.clone().unwrap_or_default();
            let found = match_template_image(&img, &tpl, &params, None)
                .with_context(|| format!("matching template {}", path.display()))?;
            if found.is_none() {
                let msg = format!(
                    "template {} scored below {} everywhere",
                    path.display(),
                    params.threshold
                );
                #[cfg(feature = "tracing")]
                warn!("{msg}");
                warnings.push(msg);
            }
            found
        }
        None => None,
    };
    let template_ms = elapsed_ms(started);

    if let Some(path) = &cfg.output_lbp {
        lbp_descriptor_image(&img, cfg.lbp_divisions.unwrap_or(4), None)
            .context("building the LBP descriptor")?
            .save(path)
            .with_context(|| format!("writing LBP descriptor {}", path.display()))?;
    }

    #[cfg(feature = "tracing")]
    debug!(
        objects = objects.len(),
        keypoints = keypoints.len(),
        described,
        blobs = blobs.len(),
        template = template_match.is_some(),
        warnings = warnings.len(),
        "detection finished"
    );

    if let Some(path) = &cfg.output_descriptors {
        let kept: Vec<_> = keypoints
            .iter()
            .filter(|k| k.has_descriptor())
            .cloned()
            .collect();
        save_descriptors(path, &kept)
            .with_context(|| format!("writing descriptors {}", path.display()))?;
    }

    let dump = DetectionDump {
        image: cfg.image.to_string_lossy().into_owned(),
        width: img.width(),
        height: img.height(),
        objects,
        keypoints: keypoints
            .iter()
            .map(|k| KeypointOut {
                x: k.x,
                y: k.y,
                angle: k.angle,
                described: k.has_descriptor(),
            })
            .collect(),
        described,
        blobs,
        template_match,
        warnings,
        cascade_ms,
        fast_ms,
        freak_ms,
        blob_ms,
        template_ms,
    };

    let json_out = cfg
        .output_json
        .clone()
        .unwrap_or_else(|| cfg.image.with_extension("features.json"));
    write_json(&json_out, &dump)?;

    Ok(dump)
}

fn load_gray(path: &Path) -> Result<image::GrayImage> {
    Ok(ImageReader::open(path)
        .with_context(|| format!("opening image {}", path.display()))?
        .decode()
        .with_context(|| format!("decoding image {}", path.display()))?
        .to_luma8())
}

fn load_cascade(path: &Path, cfg: &DetectionConfig) -> Result<Cascade> {
    let mut cascade =
        Cascade::load(path).with_context(|| format!("loading cascade {}", path.display()))?;
    if let Some(t) = cfg.cascade_threshold {
        cascade = cascade.with_threshold(t)?;
    }
    if let Some(s) = cfg.cascade_scale_factor {
        cascade = cascade.with_scale_factor(s)?;
    }
    if let Some(s) = cfg.cascade_step {
        cascade = cascade.with_step(s)?;
    }
    Ok(cascade)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut json_file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(&mut json_file, value)?;
    json_file.write_all(b"\n")?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<DetectionConfig> {
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    let cfg: DetectionConfig = serde_json::from_reader(file)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}
