//! Keypoints and their binary descriptors.

/// Packed binary descriptor. Bit `k` lives in byte `k / 8` under mask
/// `0x80 >> (k % 8)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Descriptor(pub Vec<u8>);

impl Descriptor {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of bit `k`.
    #[inline]
    pub fn bit(&self, k: usize) -> bool {
        self.0[k / 8] & (0x80 >> (k % 8)) != 0
    }

    /// Number of differing bits, or `None` when the lengths differ.
    pub fn hamming(&self, other: &Descriptor) -> Option<u32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        Some(hamming_distance(&self.0, &other.0))
    }
}

impl From<Vec<u8>> for Descriptor {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Popcount of `a XOR b` over the common prefix of the two slices.
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// A detected feature point.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Keypoint {
    /// Column in the source image.
    pub x: u16,
    /// Row in the source image.
    pub y: u16,
    /// Pattern orientation in radians. Only meaningful after extraction with
    /// orientation normalisation; 0 otherwise.
    pub angle: f32,
    /// Set by descriptor extraction; `None` before extraction or when the
    /// sampling pattern did not fit inside the image.
    pub descriptor: Option<Descriptor>,
}

impl Keypoint {
    pub const fn new(x: u16, y: u16) -> Self {
        Self {
            x,
            y,
            angle: 0.0,
            descriptor: None,
        }
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn has_descriptor(&self) -> bool {
        self.descriptor.is_some()
    }
}
