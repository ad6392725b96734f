use super::distribution::DistSpec;
use super::Index;

use std::marker::PhantomData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemOrder {
    RowMajor,
    ColMajor,
}

/// Linearisation of N-dimensional coordinates.
pub trait MemArrange:
    Copy + Clone + std::fmt::Debug + Default + PartialEq + Eq + Send + Sync + 'static
{
    const ORDER: MemOrder;

    /// Dimensions from the fastest varying to the slowest varying one.
    fn inner_to_outer(n: usize) -> Vec<usize> {
        match Self::ORDER {
            MemOrder::RowMajor => (0..n).rev().collect(),
            MemOrder::ColMajor => (0..n).collect(),
        }
    }

    fn offset<const N: usize>(extents: &[usize; N], coords: &[Index; N]) -> Index {
        let mut offset: Index = 0;
        for d in Self::inner_to_outer(N).into_iter().rev() {
            offset = offset * extents[d] as Index + coords[d];
        }
        offset
    }

    fn coords<const N: usize>(extents: &[usize; N], offset: Index) -> [Index; N] {
        let mut coords = [0; N];
        let mut rest = offset;
        for d in Self::inner_to_outer(N) {
            let ext = extents[d].max(1) as Index;
            coords[d] = rest % ext;
            rest /= ext;
        }
        coords
    }
}

/// Last index varies fastest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RowMajor;

impl MemArrange for RowMajor {
    const ORDER: MemOrder = MemOrder::RowMajor;
}

/// First index varies fastest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColMajor;

impl MemArrange for ColMajor {
    const ORDER: MemOrder = MemOrder::ColMajor;
}

/// A dense N-dimensional index space linearised in memory order `M`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CartesianIndexSpace<const N: usize, M: MemArrange = RowMajor> {
    extents: [usize; N],
    _order: PhantomData<M>,
}

impl<const N: usize, M: MemArrange> CartesianIndexSpace<N, M> {
    pub fn new(extents: [usize; N]) -> Self {
        CartesianIndexSpace {
            extents,
            _order: PhantomData,
        }
    }

    pub fn rank(&self) -> usize {
        N
    }

    pub fn size(&self) -> usize {
        self.extents.iter().product()
    }

    pub fn extent(&self, d: usize) -> usize {
        self.extents[d]
    }

    pub fn extents(&self) -> [usize; N] {
        self.extents
    }

    pub fn at(&self, coords: [Index; N]) -> Index {
        M::offset(&self.extents, &coords)
    }

    pub fn coords(&self, offset: Index) -> [Index; N] {
        M::coords(&self.extents, offset)
    }

    pub fn contains(&self, coords: &[Index; N]) -> bool {
        coords
            .iter()
            .zip(self.extents.iter())
            .all(|(c, e)| *c >= 0 && (*c as usize) < *e)
    }
}

/// Global extents of a pattern.
pub type SizeSpec<const N: usize> = CartesianIndexSpace<N, RowMajor>;

/// Cartesian arrangement of the units of a team. Units are numbered row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TeamSpec<const N: usize> {
    extents: [usize; N],
}

fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = vec![];
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

impl<const N: usize> TeamSpec<N> {
    pub fn new(extents: [usize; N]) -> TeamSpec<N> {
        TeamSpec { extents }
    }

    /// Every unit along the first distributed dimension.
    pub fn from_distspec(dist: &DistSpec<N>, nunits: usize) -> TeamSpec<N> {
        let mut extents = [1; N];
        if N > 0 {
            let d = dist.distributed_dims().next().unwrap_or(0);
            extents[d] = nunits;
        }
        TeamSpec { extents }
    }

    /// Factorises `nunits` over the distributed dimensions, largest factors first, always
    /// growing the dimension with the fewest units.
    pub fn balanced(dist: &DistSpec<N>, nunits: usize) -> TeamSpec<N> {
        let dims: Vec<usize> = dist.distributed_dims().collect();
        if dims.len() < 2 {
            return TeamSpec::from_distspec(dist, nunits);
        }
        let mut extents = [1; N];
        let mut factors = prime_factors(nunits);
        factors.sort_unstable_by(|a, b| b.cmp(a));
        for f in factors {
            // ties go to the lower dimension
            let mut target = dims[0];
            for d in dims.iter() {
                if extents[*d] < extents[target] {
                    target = *d;
                }
            }
            extents[target] *= f;
        }
        TeamSpec { extents }
    }

    pub fn size(&self) -> usize {
        self.extents.iter().product()
    }

    pub fn num_units(&self) -> usize {
        self.size()
    }

    pub fn rank(&self) -> usize {
        N
    }

    pub fn extent(&self, d: usize) -> usize {
        self.extents[d]
    }

    pub fn extents(&self) -> [usize; N] {
        self.extents
    }

    /// Team-relative unit at `coords`.
    pub fn at(&self, coords: [usize; N]) -> usize {
        let mut unit = 0;
        for d in 0..N {
            unit = unit * self.extents[d] + coords[d];
        }
        unit
    }

    /// Coordinates of the team-relative `unit`.
    pub fn coords(&self, unit: usize) -> [usize; N] {
        let mut coords = [0; N];
        let mut rest = unit;
        for d in (0..N).rev() {
            let ext = self.extents[d].max(1);
            coords[d] = rest % ext;
            rest /= ext;
        }
        coords
    }
}
