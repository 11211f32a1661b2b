//! Integer points and rectangles, plus the overlap merge applied to cascade
//! detections.

/// Pixel coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: u16,
    pub y: u16,
}

impl Point {
    #[inline]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to `(cx, cy)`.
    #[inline]
    pub fn distance_sq_to(&self, c: [f32; 2]) -> f32 {
        let dx = self.x as f32 - c[0];
        let dy = self.y as f32 - c[1];
        dx * dx + dy * dy
    }
}

/// Axis-aligned rectangle in pixel units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    #[inline]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Exclusive right edge, saturating at `i32::MAX`/`i32::MIN`.
    #[inline]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }

    /// Exclusive bottom edge, saturating like [`Rect::right`].
    #[inline]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Area in pixels; 0 for empty rectangles.
    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.w as i64 * self.h as i64
        }
    }

    /// True if the interiors overlap. Rectangles that only share an edge do
    /// not intersect.
    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && self.y < other.bottom()
            && self.right() > other.x
            && self.bottom() > other.y
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Rect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    /// Intersection with the `[0, width) x [0, height)` frame. The result may
    /// be empty.
    pub fn clamp_to(&self, width: usize, height: usize) -> Rect {
        let w = width.min(i32::MAX as usize) as i32;
        let h = height.min(i32::MAX as usize) as i32;
        let x0 = self.x.clamp(0, w);
        let y0 = self.y.clamp(0, h);
        let x1 = self.right().clamp(0, w);
        let y1 = self.bottom().clamp(0, h);
        Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    /// True if `(x, y)` lies inside the rectangle.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }
}

/// Merge overlapping rectangles into their bounding rectangles.
///
/// Any two intersecting rectangles are replaced by their union, and the pass
/// repeats until no pair intersects. The first member of each merge group keeps
/// its position in the list, so the output order is deterministic. Merging an
/// already-merged list returns it unchanged.
pub fn merge_rects(rects: Vec<Rect>) -> Vec<Rect> {
    let mut out: Vec<Rect> = rects.into_iter().filter(|r| !r.is_empty()).collect();

    loop {
        let mut merged_any = false;
        let mut i = 0;
        while i < out.len() {
            let mut j = i + 1;
            while j < out.len() {
                if out[i].intersects(&out[j]) {
                    let other = out.remove(j);
                    out[i] = out[i].union(&other);
                    merged_any = true;
                    // The grown rectangle may now reach entries already passed.
                    j = i + 1;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
        if !merged_any {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = Rect::new(0, 0, 4, 4);
        let b = Rect::new(4, 0, 4, 4);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&Rect::new(3, 3, 2, 2)));
    }

    #[test]
    fn merge_unions_chains() {
        // a overlaps b, b overlaps c, a does not overlap c directly.
        let rects = vec![
            Rect::new(0, 0, 4, 4),
            Rect::new(20, 20, 2, 2),
            Rect::new(3, 3, 4, 4),
            Rect::new(6, 6, 4, 4),
        ];
        let merged = merge_rects(rects);
        assert_eq!(merged, vec![Rect::new(0, 0, 10, 10), Rect::new(20, 20, 2, 2)]);
    }

    #[test]
    fn merge_reaches_fixed_point_after_growth() {
        // The first and last merge; the grown box then reaches the second.
        let rects = vec![
            Rect::new(0, 0, 2, 2),
            Rect::new(5, 0, 3, 3),
            Rect::new(1, 1, 6, 1),
        ];
        let merged = merge_rects(rects);
        assert_eq!(merged, vec![Rect::new(0, 0, 8, 3)]);
    }

    #[test]
    fn merge_is_idempotent() {
        let rects = vec![
            Rect::new(0, 0, 5, 5),
            Rect::new(2, 2, 5, 5),
            Rect::new(30, 0, 5, 5),
        ];
        let once = merge_rects(rects);
        let twice = merge_rects(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_drops_empty_rects() {
        let merged = merge_rects(vec![Rect::new(0, 0, 0, 3), Rect::new(1, 1, 2, 2)]);
        assert_eq!(merged, vec![Rect::new(1, 1, 2, 2)]);
    }

    #[test]
    fn clamp_keeps_inside_part() {
        let r = Rect::new(-2, 3, 10, 10).clamp_to(6, 8);
        assert_eq!(r, Rect::new(0, 3, 6, 5));
        assert!(Rect::new(10, 10, 2, 2).clamp_to(6, 8).is_empty());
    }

    #[test]
    fn edges_saturate_far_from_the_origin() {
        let r = Rect::new(i32::MAX - 2, i32::MIN + 1, 10, -10);
        assert_eq!(r.right(), i32::MAX);
        assert_eq!(r.bottom(), i32::MIN);
        assert!(Rect::new(i32::MAX - 2, 0, 10, 10).clamp_to(20, 20).is_empty());
        assert_eq!(
            Rect::new(i32::MIN, -5, i32::MAX, 10).clamp_to(20, 20),
            Rect::new(0, 0, 0, 5)
        );
        let u = Rect::new(i32::MIN, 0, 1, 1).union(&Rect::new(i32::MAX - 1, 0, 1, 1));
        assert_eq!((u.x, u.w), (i32::MIN, i32::MAX));
    }
}
