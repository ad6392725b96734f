use super::Index;

/// A rectangular region `offsets[d] .. offsets[d] + extents[d]` of an index space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewSpec<const N: usize> {
    offsets: [Index; N],
    extents: [usize; N],
}

impl<const N: usize> ViewSpec<N> {
    pub fn new(offsets: [Index; N], extents: [usize; N]) -> ViewSpec<N> {
        ViewSpec { offsets, extents }
    }

    /// The region `[0, extents)`.
    pub fn from_extents(extents: [usize; N]) -> ViewSpec<N> {
        ViewSpec {
            offsets: [0; N],
            extents,
        }
    }

    pub fn offsets(&self) -> [Index; N] {
        self.offsets
    }

    pub fn extents(&self) -> [usize; N] {
        self.extents
    }

    pub fn offset(&self, d: usize) -> Index {
        self.offsets[d]
    }

    pub fn extent(&self, d: usize) -> usize {
        self.extents[d]
    }

    pub fn rank(&self) -> usize {
        N
    }

    pub fn size(&self) -> usize {
        self.extents.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, coords: &[Index; N]) -> bool {
        (0..N).all(|d| {
            coords[d] >= self.offsets[d] && coords[d] < self.offsets[d] + self.extents[d] as Index
        })
    }

    /// The common region of both views, empty extents where they do not overlap.
    pub fn intersect(&self, other: &ViewSpec<N>) -> ViewSpec<N> {
        let mut res = *self;
        for d in 0..N {
            let lo = self.offsets[d].max(other.offsets[d]);
            let hi = (self.offsets[d] + self.extents[d] as Index)
                .min(other.offsets[d] + other.extents[d] as Index);
            res.offsets[d] = lo;
            res.extents[d] = (hi - lo).max(0) as usize;
        }
        res
    }

    pub fn resize_dim(&mut self, d: usize, offset: Index, extent: usize) {
        self.offsets[d] = offset;
        self.extents[d] = extent;
    }

    /// Moves the region by `delta` in every dimension.
    pub fn translate(&mut self, delta: [Index; N]) {
        for d in 0..N {
            self.offsets[d] += delta[d];
        }
    }

    /// Coordinates relative to the region origin.
    pub fn relative(&self, coords: [Index; N]) -> [Index; N] {
        let mut rel = coords;
        for d in 0..N {
            rel[d] -= self.offsets[d];
        }
        rel
    }
}
