use super::glob_ref::GlobRef;
use super::storage::Storage;
use super::Dist;
use crate::pattern::Pattern;
use crate::view::IndexSet;

/// References to the elements of an index set, in index order.
pub struct GlobalIter<'a, T: Dist, P: Pattern<N>, const N: usize> {
    storage: &'a Storage<T>,
    pattern: &'a P,
    index: IndexSet<N, P::Order>,
    pos: usize,
}

impl<'a, T: Dist, P: Pattern<N>, const N: usize> GlobalIter<'a, T, P, N> {
    pub(crate) fn new(storage: &'a Storage<T>, pattern: &'a P, index: IndexSet<N, P::Order>) -> Self {
        GlobalIter {
            storage,
            pattern,
            index,
            pos: 0,
        }
    }
}

impl<'a, T: Dist, P: Pattern<N>, const N: usize> Iterator for GlobalIter<'a, T, P, N> {
    type Item = GlobRef<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let g = self.index.get(self.pos)?;
        self.pos += 1;
        let l = self.pattern.local(g);
        Some(GlobRef::new(self.storage, l.unit, l.index as usize))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.index.size() - self.pos;
        (n, Some(n))
    }
}

impl<'a, T: Dist, P: Pattern<N>, const N: usize> ExactSizeIterator for GlobalIter<'a, T, P, N> {}

/// References to the local elements of the calling unit, in local memory order.
pub struct LocalIter<'a, T: Dist> {
    storage: &'a Storage<T>,
    pos: usize,
    len: usize,
}

impl<'a, T: Dist> LocalIter<'a, T> {
    pub(crate) fn new(storage: &'a Storage<T>, len: usize) -> Self {
        LocalIter {
            storage,
            pos: 0,
            len,
        }
    }
}

impl<'a, T: Dist> Iterator for LocalIter<'a, T> {
    type Item = GlobRef<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.len {
            return None;
        }
        let res = GlobRef::new(self.storage, self.storage.myid(), self.pos);
        self.pos += 1;
        Some(res)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.len - self.pos;
        (n, Some(n))
    }
}

impl<'a, T: Dist> ExactSizeIterator for LocalIter<'a, T> {}
