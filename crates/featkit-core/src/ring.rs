/// 16-point Bresenham circle of radius 3, clockwise starting at the top.
/// Index `k` and `k + 8` are diametrically opposite.
pub const RING3: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Radius of [`RING3`]; also the border a candidate pixel must keep.
pub const RING_RADIUS: i32 = 3;

/// Indices of the four compass points (N, E, S, W) on the ring, used for the
/// early rejection test.
pub const CARDINALS: [usize; 4] = [0, 4, 8, 12];

/// Byte offsets of the ring samples in a row-major buffer of width `stride`.
#[inline]
pub fn ring_offsets(stride: usize) -> [isize; 16] {
    let mut out = [0isize; 16];
    for (o, &(dx, dy)) in out.iter_mut().zip(RING3.iter()) {
        *o = dy as isize * stride as isize + dx as isize;
    }
    out
}
