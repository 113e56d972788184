//! Axis-aligned bounding boxes.

/// Axis-aligned box `[min, max]` in 3D.
///
/// The empty box has `min = +inf` and `max = -inf`, so merging into it
/// yields the other operand unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// The empty box.
    pub const fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    /// Smallest box containing every point.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f64; 3]>) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.expand_point(p);
        }
        b
    }

    /// `true` if no point was ever added.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.min[d] > self.max[d])
    }

    /// Grows the box to contain `p`.
    pub fn expand_point(&mut self, p: &[f64; 3]) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(p[d]);
            self.max[d] = self.max[d].max(p[d]);
        }
    }

    /// Grows the box to contain `other`.
    pub fn merge(&mut self, other: &BoundingBox) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(other.min[d]);
            self.max[d] = self.max[d].max(other.max[d]);
        }
    }

    /// Membership test with absolute tolerance `tol` on every side.
    #[inline]
    pub fn contains_point(&self, p: &[f64; 3], tol: f64) -> bool {
        (0..3).all(|d| p[d] >= self.min[d] - tol && p[d] <= self.max[d] + tol)
    }

    /// `true` if the boxes overlap once `self` is grown by `tol`.
    pub fn intersects(&self, other: &BoundingBox, tol: f64) -> bool {
        (0..3).all(|d| self.min[d] - tol <= other.max[d] && other.min[d] <= self.max[d] + tol)
    }

    /// Length of the main diagonal; 0 for an empty box.
    pub fn diagonal_length(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (0..3)
            .map(|d| {
                let e = self.max[d] - self.min[d];
                e * e
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Squared distance from `p` to the box; 0 inside.
    pub fn distance_squared(&self, p: &[f64; 3]) -> f64 {
        (0..3)
            .map(|d| {
                let e = if p[d] < self.min[d] {
                    self.min[d] - p[d]
                } else if p[d] > self.max[d] {
                    p[d] - self.max[d]
                } else {
                    0.0
                };
                e * e
            })
            .sum()
    }

    /// Center of the box.
    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// Index of the longest axis.
    pub fn longest_axis(&self) -> usize {
        let ext = |d: usize| self.max[d] - self.min[d];
        (1..3).fold(0, |best, d| if ext(d) > ext(best) { d } else { best })
    }
}
