//! Lazily composed index views over a pattern.
//!
//! A view designates a subset of the index space of a pattern without touching any data.
//! Views compose: [`sub`] crops one dimension, [`local`] restricts to the elements of the
//! active unit, [`blocks`] splits into the blocks of the pattern. Every derived view remembers
//! the view it was derived from, reachable through [`domain`]. [`index`] yields the global
//! linear indices the view designates in ascending memory order.

mod blocks;
mod index_set;

pub use blocks::{Blocks, BlocksIter};
pub use index_set::{IndexSet, Iter as IndexSetIter};

use crate::pattern::{Index, Pattern, ViewSpec};

use std::sync::OnceLock;

/// A view over the index space of a pattern.
///
/// `region` is kept in global coordinates. A local view designates the elements of `region`
/// owned by the active unit of the pattern; they are gathered from the local blocks on first
/// use and kept with the view.
#[derive(Clone, Debug)]
pub struct IndexView<'p, P, const N: usize>
where
    P: Pattern<N>,
{
    pattern: &'p P,
    region: ViewSpec<N>,
    local: bool,
    origin: Option<Box<IndexView<'p, P, N>>>,
    local_index: OnceLock<IndexSet<N, P::Order>>,
}

impl<'p, P, const N: usize> IndexView<'p, P, N>
where
    P: Pattern<N>,
{
    /// The view of the whole index space of `pattern`.
    pub fn new(pattern: &'p P) -> Self {
        IndexView {
            pattern,
            region: ViewSpec::from_extents(pattern.extents()),
            local: false,
            origin: None,
            local_index: OnceLock::new(),
        }
    }

    pub(crate) fn derived(&self, region: ViewSpec<N>, local: bool) -> Self {
        IndexView {
            pattern: self.pattern,
            region,
            local,
            origin: Some(Box::new(self.clone())),
            local_index: OnceLock::new(),
        }
    }

    pub fn pattern(&self) -> &'p P {
        self.pattern
    }

    /// The bounding region of the view in global coordinates.
    pub fn region(&self) -> &ViewSpec<N> {
        &self.region
    }

    pub fn offsets(&self) -> [Index; N] {
        self.region.offsets()
    }

    pub fn offset(&self, d: usize) -> Index {
        self.region.offset(d)
    }

    pub fn extents(&self) -> [usize; N] {
        self.region.extents()
    }

    pub fn extent(&self, d: usize) -> usize {
        self.region.extent(d)
    }

    pub fn rank(&self) -> usize {
        N
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Number of elements the view designates.
    pub fn size(&self) -> usize {
        if self.local {
            self.local_index().size()
        } else {
            self.region.size()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Crops dimension `D` to `[lo, hi)` relative to this view. Bounds are clamped to the
    /// extent of the view.
    pub fn sub<const D: usize>(&self, lo: usize, hi: usize) -> Self {
        assert!(D < N, "dimension {} out of range for a {}-d view", D, N);
        let hi = hi.min(self.region.extent(D));
        let lo = lo.min(hi);
        let mut region = self.region;
        region.resize_dim(D, self.region.offset(D) + lo as Index, hi - lo);
        self.derived(region, self.local)
    }

    /// The elements of this view owned by the active unit.
    pub fn local(&self) -> Self {
        self.derived(self.region, true)
    }

    /// The blocks of the pattern this view intersects.
    pub fn blocks(&self) -> Blocks<'p, P, N> {
        Blocks::new(self.clone())
    }

    /// The view this one was derived from, the view itself for a view of a whole pattern.
    pub fn domain(&self) -> &Self {
        match &self.origin {
            Some(origin) => origin,
            None => self,
        }
    }

    /// Global linear indices of the view in ascending memory order.
    pub fn index(&self) -> IndexSet<N, P::Order> {
        if self.local {
            return self.local_index().clone();
        }
        IndexSet::region(self.pattern.extents(), self.region)
    }

    // every element of a block belongs to the owner of the block, so the local part of the
    // region is the union of the local blocks cropped to it
    fn local_index(&self) -> &IndexSet<N, P::Order> {
        self.local_index.get_or_init(|| {
            let extents = self.pattern.extents();
            let blocks = Blocks::new(self.clone());
            let mut mine: Vec<Index> = blocks
                .ids()
                .iter()
                .flat_map(|b| {
                    let cropped = self.pattern.block(*b).intersect(&self.region);
                    IndexSet::<N, P::Order>::region(extents, cropped).to_vec()
                })
                .collect();
            mine.sort_unstable();
            IndexSet::list(extents, mine, true)
        })
    }

    /// `true` if the view covers every element of its pattern.
    pub fn is_full(&self) -> bool {
        !self.local && self.region == ViewSpec::from_extents(self.pattern.extents())
    }
}

/// Crops dimension `D` of `view` to `[lo, hi)`.
pub fn sub<'p, const D: usize, P, const N: usize>(
    lo: usize,
    hi: usize,
    view: &IndexView<'p, P, N>,
) -> IndexView<'p, P, N>
where
    P: Pattern<N>,
{
    view.sub::<D>(lo, hi)
}

pub fn local<'p, P, const N: usize>(view: &IndexView<'p, P, N>) -> IndexView<'p, P, N>
where
    P: Pattern<N>,
{
    view.local()
}

pub fn blocks<'p, P, const N: usize>(view: &IndexView<'p, P, N>) -> Blocks<'p, P, N>
where
    P: Pattern<N>,
{
    view.blocks()
}

pub fn domain<'a, 'p, P, const N: usize>(view: &'a IndexView<'p, P, N>) -> &'a IndexView<'p, P, N>
where
    P: Pattern<N>,
{
    view.domain()
}

pub fn index<P, const N: usize>(view: &IndexView<'_, P, N>) -> IndexSet<N, P::Order>
where
    P: Pattern<N>,
{
    view.index()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::TEAM_ALL;
    use crate::pattern::{BlockPattern, DistSpec, Distribution, ShiftTilePattern, TilePattern};

    fn blocked(n: usize, units: usize) -> BlockPattern<1> {
        BlockPattern::<1>::with_units([n], DistSpec::blocked(), units).unwrap()
    }

    #[test]
    fn sub_of_full_extent_is_the_view() {
        let pattern = blocked(10, 3);
        let v = IndexView::new(&pattern);
        let s = sub::<0, _, 1>(0, 10, &v);
        assert_eq!(s.index(), v.index());
        assert_eq!(domain(&s).region(), v.region());
        assert!(v.is_full());
        assert!(std::ptr::eq(domain(&v), &v));
    }

    #[test]
    fn nested_subs_stay_relative() {
        let pattern = blocked(20, 4);
        let v = IndexView::new(&pattern);
        let s = v.sub::<0>(5, 15).sub::<0>(2, 100);
        assert_eq!(s.offsets(), [7]);
        assert_eq!(s.extents(), [8]);
        assert_eq!(s.domain().offsets(), [5]);
        assert_eq!(s.domain().domain().region(), v.region());
        let set = s.index();
        assert_eq!(set.to_vec(), (7..15).collect::<Vec<Index>>());
        assert!(set.is_shifted());
        assert!(set.is_sub());
        assert!(!set.is_strided());
    }

    #[test]
    fn local_views_match_local_size() {
        let pattern =
            BlockPattern::<1>::with_units([11], DistSpec::new([Distribution::Cyclic]), 3).unwrap();
        for u in 0..3 {
            let bound = pattern.clone().bind(TEAM_ALL, u);
            let v = IndexView::new(&bound);
            let l = local(&v);
            assert_eq!(l.size(), bound.local_size(u));
            assert!(l.index().iter().all(|g| bound.is_local(g)));
            assert_eq!(
                l.index().to_vec(),
                (0..11).filter(|g| g % 3 == u as Index).collect::<Vec<Index>>()
            );
        }
    }

    #[test]
    fn local_index_follows_ownership() {
        let pattern = ShiftTilePattern::<2>::with_units([8, 12], DistSpec::tiled(2), 3).unwrap();
        for u in 0..3 {
            let bound = pattern.clone().bind(TEAM_ALL, u);
            let v = IndexView::new(&bound);
            let l = v.sub::<0>(1, 7).sub::<1>(3, 10).local();
            let owned: Vec<Index> = v
                .sub::<0>(1, 7)
                .sub::<1>(3, 10)
                .index()
                .iter()
                .filter(|g| bound.unit_at(bound.coords(*g)) == u)
                .collect();
            assert_eq!(l.size(), owned.len());
            assert_eq!(l.index().to_vec(), owned);
            // answered from the indices kept with the view
            assert_eq!(l.index(), l.index());
        }
    }

    #[test]
    fn local_of_sub() {
        let pattern = blocked(12, 3).bind(TEAM_ALL, 1);
        let v = IndexView::new(&pattern);
        let l = v.sub::<0>(2, 6).local();
        assert_eq!(l.index().to_vec(), vec![4, 5]);
        assert_eq!(l.domain().extents(), [4]);
    }

    #[test]
    fn two_dimensional_sub_index() {
        let pattern = TilePattern::<2>::with_units([4, 4], DistSpec::tiled(2), 4).unwrap();
        let v = IndexView::new(&pattern);
        let s = v.sub::<0>(1, 3).sub::<1>(1, 3);
        assert_eq!(s.size(), 4);
        assert_eq!(index(&s).to_vec(), vec![5, 6, 9, 10]);
        assert_eq!(index(&s).contiguous_runs(), vec![(5, 2), (9, 2)]);
    }

    #[test]
    fn empty_sub() {
        let pattern = blocked(8, 2);
        let v = IndexView::new(&pattern);
        let s = v.sub::<0>(6, 3);
        assert!(s.is_empty());
        assert_eq!(s.blocks().len(), 0);
    }
}
