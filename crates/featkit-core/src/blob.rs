//! k-means clustering of pixel coordinates into blobs.
//!
//! Seeding is deterministic (evenly spaced input points), so the same point
//! list always yields the same clusters.
use crate::error::{Error, Result};
use crate::geometry::{Point, Rect};
use crate::image::ImageView;
use crate::MAX_CLUSTER_POINTS;
#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

/// Parameters for [`kmeans`] and [`find_blobs`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KmeansParams {
    /// Upper bound on assign/update rounds.
    pub max_iterations: usize,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
        }
    }
}

impl KmeansParams {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// One k-means cluster. `points` may be empty, in which case `centroid` is
/// the last centroid the cluster had.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub centroid: [f32; 2],
    pub points: Vec<Point>,
}

/// Bounding box of a non-empty cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Blob {
    pub rect: Rect,
    /// Index of the cluster the blob came from.
    pub id: usize,
    /// Member count.
    pub count: usize,
}

/// Result of [`kmeans_with_trace`].
#[derive(Clone, Debug)]
pub struct KmeansResult {
    pub clusters: Vec<Cluster>,
    /// Assign/update rounds executed.
    pub iterations: usize,
    /// True if the last round changed no assignment.
    pub converged: bool,
}

/// Partitions `points` into `k` clusters.
///
/// Seed `i` is input point `i * n / k`. Distance ties go to the lowest
/// cluster index, so duplicate points collapse onto one cluster: with
/// `k == n`, every cluster is a singleton only when the points are distinct.
///
/// Fails with [`Error::InvalidArgument`] when `k == 0`, `k > points.len()`,
/// there are more than [`MAX_CLUSTER_POINTS`] points, or
/// `max_iterations == 0`.
pub fn kmeans(points: &[Point], k: usize, params: &KmeansParams) -> Result<Vec<Cluster>> {
    kmeans_with_trace(points, k, params).map(|r| r.clusters)
}

/// Same as [`kmeans`], also reporting iteration count and convergence.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(points, params), fields(n = points.len()))
)]
pub fn kmeans_with_trace(points: &[Point], k: usize, params: &KmeansParams) -> Result<KmeansResult> {
    let n = points.len();
    if k == 0 {
        return Err(Error::invalid("k must be at least 1"));
    }
    if k > n {
        return Err(Error::invalid(format!("k = {k} exceeds the {n} input points")));
    }
    if n > MAX_CLUSTER_POINTS {
        return Err(Error::invalid(format!(
            "{n} points exceeds the limit of {MAX_CLUSTER_POINTS}"
        )));
    }
    if params.max_iterations == 0 {
        return Err(Error::invalid("max_iterations must be at least 1"));
    }

    let mut centroids: Vec<[f32; 2]> = (0..k)
        .map(|i| {
            let p = points[i * n / k];
            [p.x as f32, p.y as f32]
        })
        .collect();
    let mut assignment = vec![usize::MAX; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iterations {
        iterations += 1;

        let mut changed = false;
        for (slot, p) in assignment.iter_mut().zip(points) {
            let nearest = nearest_centroid(p, &centroids);
            if *slot != nearest {
                *slot = nearest;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }

        let mut sums = vec![(0u64, 0u64, 0usize); k];
        for (&c, p) in assignment.iter().zip(points) {
            let s = &mut sums[c];
            s.0 += p.x as u64;
            s.1 += p.y as u64;
            s.2 += 1;
        }
        for (centroid, &(sx, sy, count)) in centroids.iter_mut().zip(&sums) {
            // Empty clusters keep their previous centroid.
            if count > 0 {
                *centroid = [
                    (sx as f64 / count as f64) as f32,
                    (sy as f64 / count as f64) as f32,
                ];
            }
        }
    }

    let mut clusters: Vec<Cluster> = centroids
        .into_iter()
        .map(|centroid| Cluster {
            centroid,
            points: Vec::new(),
        })
        .collect();
    for (&c, &p) in assignment.iter().zip(points) {
        clusters[c].points.push(p);
    }

    #[cfg(feature = "tracing")]
    debug!(k, iterations, converged, "kmeans finished");

    Ok(KmeansResult {
        clusters,
        iterations,
        converged,
    })
}

/// Index of the closest centroid; ties go to the lowest index.
#[inline]
fn nearest_centroid(p: &Point, centroids: &[[f32; 2]]) -> usize {
    let mut best = 0;
    let mut best_d = f32::INFINITY;
    for (i, &c) in centroids.iter().enumerate() {
        let d = p.distance_sq_to(c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Clusters `points` and returns one blob per non-empty cluster, in cluster
/// order.
pub fn find_blobs(points: &[Point], k: usize, params: &KmeansParams) -> Result<Vec<Blob>> {
    Ok(kmeans(points, k, params)?
        .iter()
        .enumerate()
        .filter_map(|(id, c)| blob_of(id, &c.points))
        .collect())
}

fn blob_of(id: usize, members: &[Point]) -> Option<Blob> {
    let first = members.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &members[1..] {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(Blob {
        rect: Rect::new(
            x0 as i32,
            y0 as i32,
            (x1 - x0) as i32 + 1,
            (y1 - y0) as i32 + 1,
        ),
        id,
        count: members.len(),
    })
}

/// Coordinates of every pixel with intensity `>= min_intensity`, in raster
/// order.
pub fn collect_points(img: ImageView<'_>, min_intensity: u8) -> Result<Vec<Point>> {
    let luma = img.luma()?;
    if img.width() > u16::MAX as usize + 1 || img.height() > u16::MAX as usize + 1 {
        return Err(Error::invalid(format!(
            "image {}x{} exceeds 16-bit point coordinates",
            img.width(),
            img.height()
        )));
    }
    Ok(luma
        .chunks_exact(img.width())
        .enumerate()
        .flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .filter(move |&(_, &v)| v >= min_intensity)
                .map(move |(x, _)| Point::new(x as u16, y as u16))
        })
        .collect())
}
