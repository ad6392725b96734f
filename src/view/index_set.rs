use crate::pattern::{Index, MemArrange, MemOrder, RowMajor, ViewSpec};

use itertools::Itertools;
use std::marker::PhantomData;

#[derive(Clone, Debug)]
enum Repr<const N: usize> {
    /// Every index of a rectangular region, in memory order.
    Region(ViewSpec<N>),
    /// An explicit ascending list.
    List(Vec<Index>),
}

/// The ordered global linear indices a view designates.
#[derive(Clone, Debug)]
pub struct IndexSet<const N: usize, M: MemArrange = RowMajor> {
    repr: Repr<N>,
    extents: [usize; N],
    sub: bool,
    _order: PhantomData<M>,
}

impl<const N: usize, M: MemArrange> IndexSet<N, M> {
    pub(crate) fn region(extents: [usize; N], region: ViewSpec<N>) -> Self {
        IndexSet {
            sub: region != ViewSpec::from_extents(extents),
            repr: Repr::Region(region),
            extents,
            _order: PhantomData,
        }
    }

    pub(crate) fn list(extents: [usize; N], indices: Vec<Index>, sub: bool) -> Self {
        IndexSet {
            repr: Repr::List(indices),
            extents,
            sub,
            _order: PhantomData,
        }
    }

    pub fn size(&self) -> usize {
        match &self.repr {
            Repr::Region(region) => region.size(),
            Repr::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The `i`-th global index of the set.
    pub fn get(&self, i: usize) -> Option<Index> {
        if i >= self.size() {
            return None;
        }
        match &self.repr {
            Repr::Region(region) => {
                let rel = M::coords(&region.extents(), i as Index);
                let mut coords = region.offsets();
                for d in 0..N {
                    coords[d] += rel[d];
                }
                Some(M::offset(&self.extents, &coords))
            }
            Repr::List(list) => list.get(i).copied(),
        }
    }

    pub fn first(&self) -> Option<Index> {
        self.get(0)
    }

    pub fn last(&self) -> Option<Index> {
        self.size().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn iter(&self) -> Iter<'_, N, M> {
        Iter {
            set: self,
            front: 0,
            back: self.size(),
        }
    }

    /// `true` unless the indices form one run of consecutive values.
    pub fn is_strided(&self) -> bool {
        match &self.repr {
            Repr::Region(region) => {
                if region.is_empty() {
                    return false;
                }
                let mut full = true;
                for d in M::inner_to_outer(N) {
                    if !full && region.extent(d) > 1 {
                        return true;
                    }
                    if region.extent(d) < self.extents[d] {
                        full = false;
                    }
                }
                false
            }
            Repr::List(list) => list.windows(2).any(|w| w[1] != w[0] + 1),
        }
    }

    /// `true` if the set does not start at global index 0.
    pub fn is_shifted(&self) -> bool {
        self.first().map_or(false, |first| first != 0)
    }

    /// `true` if the set is a proper restriction of the index space.
    pub fn is_sub(&self) -> bool {
        self.sub
    }

    /// Maximal runs of consecutive indices as `(first index, length)`.
    pub fn contiguous_runs(&self) -> Vec<(Index, usize)> {
        self.iter()
            .map(|i| (i, 1usize))
            .coalesce(|a, b| {
                if a.0 + a.1 as Index == b.0 {
                    Ok((a.0, a.1 + 1))
                } else {
                    Err((a, b))
                }
            })
            .collect()
    }

    pub fn to_vec(&self) -> Vec<Index> {
        self.iter().collect()
    }

    /// Memory order the linear indices of the set follow.
    pub fn order(&self) -> MemOrder {
        M::ORDER
    }
}

impl<const N: usize, M: MemArrange> PartialEq for IndexSet<N, M> {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size() && self.iter().eq(other.iter())
    }
}

impl<'a, const N: usize, M: MemArrange> IntoIterator for &'a IndexSet<N, M> {
    type Item = Index;
    type IntoIter = Iter<'a, N, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Cursor over an [`IndexSet`].
#[derive(Clone, Debug)]
pub struct Iter<'a, const N: usize, M: MemArrange> {
    set: &'a IndexSet<N, M>,
    front: usize,
    back: usize,
}

impl<'a, const N: usize, M: MemArrange> Iterator for Iter<'a, N, M> {
    type Item = Index;

    fn next(&mut self) -> Option<Index> {
        if self.front >= self.back {
            return None;
        }
        let res = self.set.get(self.front);
        self.front += 1;
        res
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl<'a, const N: usize, M: MemArrange> DoubleEndedIterator for Iter<'a, N, M> {
    fn next_back(&mut self) -> Option<Index> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.set.get(self.back)
    }
}

impl<'a, const N: usize, M: MemArrange> ExactSizeIterator for Iter<'a, N, M> {}
