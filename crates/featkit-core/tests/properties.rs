//! Property-based checks of the core invariants.

use featkit_core::blob::kmeans_with_trace;
use featkit_core::fast::detect_corners;
use featkit_core::freak::{read_descriptors, write_descriptors};
use featkit_core::keypoint::hamming_distance;
use featkit_core::{
    merge_rects, Descriptor, FastParams, ImageView, IntegralImage, Keypoint, KmeansParams, Point,
    Rect,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// A small gray image as `(width, height, pixels)`.
fn arb_gray() -> impl Strategy<Value = (usize, usize, Vec<u8>)> {
    (1usize..=16, 1usize..=16).prop_flat_map(|(w, h)| {
        prop::collection::vec(any::<u8>(), w * h).prop_map(move |data| (w, h, data))
    })
}

/// Noise image large enough to hold many neighbouring FAST candidates.
fn arb_noise() -> impl Strategy<Value = (usize, usize, Vec<u8>)> {
    (12usize..=32, 12usize..=32).prop_flat_map(|(w, h)| {
        prop::collection::vec(any::<u8>(), w * h).prop_map(move |data| (w, h, data))
    })
}

fn corner_set(view: ImageView<'_>, threshold: i32) -> BTreeSet<(u16, u16)> {
    let params = FastParams::default().with_threshold(threshold);
    detect_corners(view, &params, None)
        .unwrap()
        .iter()
        .map(|c| (c.x, c.y))
        .collect()
}

fn arb_rect() -> impl Strategy<Value = Rect> {
    (0i32..60, 0i32..60, 1i32..20, 1i32..20).prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn arb_keypoints() -> impl Strategy<Value = Vec<Keypoint>> {
    (1usize..=16).prop_flat_map(|len| {
        prop::collection::vec(
            (
                any::<u16>(),
                any::<u16>(),
                -4.0f32..4.0,
                prop::collection::vec(any::<u8>(), len),
            )
                .prop_map(|(x, y, angle, bytes)| Keypoint {
                    x,
                    y,
                    angle,
                    descriptor: Some(Descriptor(bytes)),
                }),
            0..12,
        )
    })
}

proptest! {
    #[test]
    fn rect_sums_match_brute_force(
        (w, h, data) in arb_gray(),
        x in -4i32..20,
        y in -4i32..20,
        rw in 0i32..20,
        rh in 0i32..20,
    ) {
        let view = ImageView::gray(w, h, &data).unwrap();
        let table = IntegralImage::new(view).unwrap();

        let mut expected = 0u32;
        for py in y.max(0)..(y + rh).min(h as i32) {
            for px in x.max(0)..(x + rw).min(w as i32) {
                expected += data[py as usize * w + px as usize] as u32;
            }
        }
        prop_assert_eq!(table.rect_sum(x, y, rw, rh), expected);
        prop_assert_eq!(
            table.rect_sum(0, 0, w as i32, h as i32),
            data.iter().map(|&v| v as u32).sum::<u32>()
        );
    }

    #[test]
    fn raising_the_fast_threshold_only_removes_corners(
        (w, h, data) in arb_noise(),
        low in 1i32..60,
        step in 1i32..60,
    ) {
        let view = ImageView::gray(w, h, &data).unwrap();
        let lower = corner_set(view, low);
        let higher = corner_set(view, low + step);
        prop_assert!(
            higher.is_subset(&lower),
            "threshold {} kept {:?} missing at {}",
            low + step,
            higher.difference(&lower).collect::<Vec<_>>(),
            low
        );
    }

    #[test]
    fn merged_rects_are_disjoint_and_cover_the_input(
        rects in prop::collection::vec(arb_rect(), 0..24)
    ) {
        let merged = merge_rects(rects.clone());
        for (i, a) in merged.iter().enumerate() {
            for b in &merged[i + 1..] {
                prop_assert!(!a.intersects(b));
            }
        }
        for r in &rects {
            prop_assert!(merged.iter().any(|m| m.union(r) == *m));
        }
        prop_assert_eq!(merge_rects(merged.clone()), merged);
    }

    #[test]
    fn descriptor_streams_round_trip(kps in arb_keypoints()) {
        let mut buf = Vec::new();
        write_descriptors(&mut buf, &kps).unwrap();
        let back = read_descriptors(buf.as_slice()).unwrap();
        prop_assert_eq!(back, kps);
    }

    #[test]
    fn hamming_is_a_metric_on_equal_lengths(
        (a, b) in (1usize..=64).prop_flat_map(|n| (
            prop::collection::vec(any::<u8>(), n),
            prop::collection::vec(any::<u8>(), n),
        ))
    ) {
        prop_assert_eq!(hamming_distance(&a, &a), 0);
        prop_assert_eq!(hamming_distance(&a, &b), hamming_distance(&b, &a));
        prop_assert!(hamming_distance(&a, &b) <= 8 * a.len() as u32);
    }

    #[test]
    fn kmeans_partitions_every_point(
        coords in prop::collection::vec((0u16..200, 0u16..200), 1..64),
        k in 1usize..6,
    ) {
        let points: Vec<Point> = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
        prop_assume!(k <= points.len());
        let res = kmeans_with_trace(&points, k, &KmeansParams::default()).unwrap();
        prop_assert_eq!(res.clusters.len(), k);
        prop_assert_eq!(
            res.clusters.iter().map(|c| c.points.len()).sum::<usize>(),
            points.len()
        );

        if k == 1 {
            let n = points.len() as f64;
            let mx = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
            let my = points.iter().map(|p| p.y as f64).sum::<f64>() / n;
            prop_assert!((res.clusters[0].centroid[0] as f64 - mx).abs() < 1e-3);
            prop_assert!((res.clusters[0].centroid[1] as f64 - my).abs() < 1e-3);
        }
    }
}
