use super::IndexView;
use crate::pattern::{Index, MemArrange, Pattern};

/// The blocks of a pattern a view intersects, in memory order of their block coordinates.
///
/// Every element is the view of one block cropped to the region of the parent view, whose
/// domain is the parent view. Blocks of a local view are restricted to the blocks of the
/// active unit.
#[derive(Clone, Debug)]
pub struct Blocks<'p, P, const N: usize>
where
    P: Pattern<N>,
{
    view: IndexView<'p, P, N>,
    ids: Vec<usize>,
}

impl<'p, P, const N: usize> Blocks<'p, P, N>
where
    P: Pattern<N>,
{
    pub(crate) fn new(view: IndexView<'p, P, N>) -> Self {
        let pattern = view.pattern();
        let mut ids: Vec<usize> = if view.region().is_empty() {
            vec![]
        } else if view.is_full() {
            (0..pattern.num_blocks()).collect()
        } else {
            Self::intersecting(&view)
        };
        if view.is_local() {
            let me = pattern.myid();
            ids.retain(|b| pattern.block_owner(*b) == me);
        }
        Blocks { view, ids }
    }

    /// Blocks whose region overlaps the view, found through the box of block coordinates
    /// spanned by the first and last corner of the view.
    fn intersecting(view: &IndexView<'p, P, N>) -> Vec<usize> {
        let pattern = view.pattern();
        let region = view.region();
        let spec = pattern.blockspec();
        let first = region.offsets();
        let mut last = first;
        for d in 0..N {
            last[d] += region.extent(d) as Index - 1;
        }
        let lo = P::Order::coords(&spec, pattern.block_at(first) as Index);
        let hi = P::Order::coords(&spec, pattern.block_at(last) as Index);
        let mut span = [0; N];
        for d in 0..N {
            span[d] = (hi[d] - lo[d] + 1) as usize;
        }
        let count: usize = span.iter().product();
        let mut ids = Vec::with_capacity(count);
        for k in 0..count {
            let rel = P::Order::coords(&span, k as Index);
            let mut bc = lo;
            for d in 0..N {
                bc[d] += rel[d];
            }
            let id = P::Order::offset(&spec, &bc) as usize;
            if !pattern.block(id).intersect(region).is_empty() {
                ids.push(id);
            }
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Global block indices of the blocks.
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// The view of the `i`-th block.
    pub fn get(&self, i: usize) -> Option<IndexView<'p, P, N>> {
        let id = *self.ids.get(i)?;
        let region = self.view.pattern().block(id).intersect(self.view.region());
        Some(self.view.derived(region, self.view.is_local()))
    }

    /// The blocks owned by the active unit.
    pub fn local(&self) -> Self {
        let pattern = self.view.pattern();
        let me = pattern.myid();
        Blocks {
            view: self.view.clone(),
            ids: self
                .ids
                .iter()
                .copied()
                .filter(|b| pattern.block_owner(*b) == me)
                .collect(),
        }
    }

    /// The view the blocks were taken from.
    pub fn domain(&self) -> &IndexView<'p, P, N> {
        &self.view
    }

    pub fn iter(&self) -> BlocksIter<'_, 'p, P, N> {
        BlocksIter {
            blocks: self,
            pos: 0,
        }
    }
}

impl<'a, 'p, P, const N: usize> IntoIterator for &'a Blocks<'p, P, N>
where
    P: Pattern<N>,
{
    type Item = IndexView<'p, P, N>;
    type IntoIter = BlocksIter<'a, 'p, P, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Cursor over the views of [`Blocks`].
#[derive(Clone, Debug)]
pub struct BlocksIter<'a, 'p, P, const N: usize>
where
    P: Pattern<N>,
{
    blocks: &'a Blocks<'p, P, N>,
    pos: usize,
}

impl<'a, 'p, P, const N: usize> Iterator for BlocksIter<'a, 'p, P, N>
where
    P: Pattern<N>,
{
    type Item = IndexView<'p, P, N>;

    fn next(&mut self) -> Option<Self::Item> {
        let res = self.blocks.get(self.pos)?;
        self.pos += 1;
        Some(res)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.blocks.len() - self.pos;
        (n, Some(n))
    }
}

impl<'a, 'p, P, const N: usize> ExactSizeIterator for BlocksIter<'a, 'p, P, N> where P: Pattern<N> {}
