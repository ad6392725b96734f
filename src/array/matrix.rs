use super::glob_ref::GlobRef;
use super::iter::GlobalIter;
use super::storage::{plan, Storage};
use super::{read_view, Dist};
use crate::dart::{Dart, DartError, DartResult, GlobalPtr, TeamId};
use crate::pattern::{DistSpec, Index, Pattern, TilePattern};
use crate::view::IndexView;

use std::sync::Arc;

/// An N-dimensional distributed array with coordinate access.
pub struct Matrix<T: Dist, const N: usize, P: Pattern<N> = TilePattern<N>> {
    storage: Storage<T>,
    pattern: P,
}

impl<T: Dist, const N: usize> Matrix<T, N> {
    /// Collective over `team`: a tiled matrix of `extents`, units arranged by
    /// [`TeamSpec::balanced`](crate::pattern::TeamSpec::balanced).
    pub fn new(
        dart: Arc<Dart>,
        team: TeamId,
        extents: [usize; N],
        dist: DistSpec<N>,
    ) -> DartResult<Self> {
        let nunits = dart.team_size(team)?;
        let pattern = TilePattern::with_units(extents, dist, nunits)?;
        Matrix::with_pattern(dart, team, pattern)
    }
}

impl<T: Dist, const N: usize, P: Pattern<N>> Matrix<T, N, P> {
    /// Collective over `team`: a matrix laid out by `pattern`, which must span the team.
    pub fn with_pattern(dart: Arc<Dart>, team: TeamId, pattern: P) -> DartResult<Self> {
        let nunits = dart.team_size(team)?;
        if pattern.num_units() != nunits {
            return Err(DartError::InvalidArgument(format!(
                "pattern over {} units for a team of {} units",
                pattern.num_units(),
                nunits
            )));
        }
        let pattern = pattern.bind(team, dart.team_myid(team)?);
        let storage = Storage::new(dart, team, pattern.local_capacity())?;
        Ok(Matrix { storage, pattern })
    }

    pub fn pattern(&self) -> &P {
        &self.pattern
    }

    pub fn team(&self) -> TeamId {
        self.storage.team()
    }

    pub fn extents(&self) -> [usize; N] {
        self.pattern.extents()
    }

    pub fn extent(&self, d: usize) -> usize {
        self.pattern.extent(d)
    }

    pub fn size(&self) -> usize {
        self.pattern.size()
    }

    fn coords(&self, coords: [usize; N]) -> DartResult<[Index; N]> {
        let extents = self.pattern.extents();
        let mut res = [0; N];
        for d in 0..N {
            if coords[d] >= extents[d] {
                return Err(DartError::InvalidArgument(format!(
                    "coordinates {:?} out of bounds for extents {:?}",
                    coords, extents
                )));
            }
            res[d] = coords[d] as Index;
        }
        Ok(res)
    }

    pub fn at(&self, coords: [usize; N]) -> DartResult<GlobRef<'_, T>> {
        let l = self.pattern.local_index(self.coords(coords)?);
        Ok(GlobRef::new(&self.storage, l.unit, l.index as usize))
    }

    pub fn gptr_at(&self, coords: [usize; N]) -> DartResult<GlobalPtr> {
        self.at(coords)?.gptr()
    }

    pub fn get(&self, coords: [usize; N]) -> DartResult<T> {
        self.at(coords)?.get()
    }

    /// Write one element; locally complete on return.
    pub fn put(&self, coords: [usize; N], value: T) -> DartResult<()> {
        self.at(coords)?.put(value)
    }

    /// View of the whole matrix.
    pub fn view(&self) -> IndexView<'_, P, N> {
        IndexView::new(&self.pattern)
    }

    /// Rows (for `D == 0`) or columns (`D == 1`) `lo..hi` of the matrix.
    pub fn sub<const D: usize>(&self, lo: usize, hi: usize) -> IndexView<'_, P, N> {
        self.view().sub::<D>(lo, hi)
    }

    /// View of global block `i`.
    pub fn block(&self, i: usize) -> Option<IndexView<'_, P, N>> {
        self.view().blocks().get(i)
    }

    /// Elements of the calling unit.
    pub fn local_view(&self) -> IndexView<'_, P, N> {
        self.view().local()
    }

    /// Values of the elements `view` designates, in index order.
    pub fn read_view(&self, view: &IndexView<'_, P, N>) -> DartResult<Vec<T>> {
        read_view(&self.storage, &self.pattern, view)
    }

    /// Write `values` to the elements `view` designates, in index order.
    pub fn write_view(&self, view: &IndexView<'_, P, N>, values: &[T]) -> DartResult<()> {
        let index = view.index();
        if values.len() != index.size() {
            return Err(DartError::InvalidArgument(format!(
                "{} values for a view of {} elements",
                values.len(),
                index.size()
            )));
        }
        let runs = plan(&self.pattern, index.iter());
        self.storage.write_runs(&runs, values)
    }

    /// References to the elements of `view` in index order.
    pub fn iter_view(&self, view: &IndexView<'_, P, N>) -> GlobalIter<'_, T, P, N> {
        GlobalIter::new(&self.storage, &self.pattern, view.index())
    }

    /// Elements of the calling unit in local memory order.
    ///
    /// # Safety
    /// No transfer may write the local elements while the slice is alive.
    pub unsafe fn local_slice(&self) -> &[T] {
        self.storage
            .local_slice(self.pattern.local_size(self.pattern.myid()))
    }

    /// Mutable elements of the calling unit in local memory order.
    ///
    /// # Safety
    /// The caller must be the only reader and writer of the local elements while the slice is
    /// alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn local_slice_mut(&self) -> &mut [T] {
        self.storage
            .local_slice_mut(self.pattern.local_size(self.pattern.myid()))
    }

    pub fn barrier(&self) -> DartResult<()> {
        self.storage.barrier()
    }
}

impl<T: Dist, const N: usize, P: Pattern<N>> std::fmt::Debug for Matrix<T, N, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Matrix")
            .field("team", &self.team())
            .field("extents", &self.extents())
            .field("pattern", &self.pattern)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::TEAM_ALL;
    use crate::env_var::Config;
    use crate::pattern::{BlockPattern, Distribution, ShiftTilePattern};
    use crate::transport::local::launch;

    #[test]
    fn tiled_matrix_coordinates() {
        let res = launch(4, Config::default(), |dart| {
            let matrix =
                Matrix::<u32, 2>::new(dart.clone(), TEAM_ALL, [12, 12], DistSpec::tiled(3))
                    .unwrap();
            if dart.my_id() == 0 {
                for r in 0..12 {
                    for c in 0..12 {
                        matrix.put([r, c], (r * 100 + c) as u32).unwrap();
                    }
                }
            }
            matrix.barrier().unwrap();
            let sample = matrix.get([7, 5]).unwrap();
            let owner = matrix.at([7, 5]).unwrap().unit();
            let rows = matrix.read_view(&matrix.sub::<0>(2, 4)).unwrap();
            let local = unsafe { matrix.local_slice().to_vec() };
            matrix.barrier().unwrap();
            (sample, owner, rows, local)
        });
        for (unit, (sample, owner, rows, local)) in res.into_iter().enumerate() {
            assert_eq!(sample, 705);
            assert_eq!(owner, 1);
            let expected: Vec<u32> = (2..4)
                .flat_map(|r| (0..12).map(move |c| r * 100 + c))
                .collect();
            assert_eq!(rows, expected);
            assert_eq!(local.len(), 36);
            // first tile of every unit starts at its team coordinates times the tile size
            let (tr, tc) = (unit / 2, unit % 2);
            assert_eq!(local[0], (tr * 300 + tc * 3) as u32);
        }
    }

    #[test]
    fn blocks_and_local_views() {
        launch(4, Config::default(), |dart| {
            let pattern =
                ShiftTilePattern::<2>::with_units([8, 8], DistSpec::tiled(2), 4).unwrap();
            let matrix = Matrix::<i32, 2, _>::with_pattern(dart.clone(), TEAM_ALL, pattern)
                .unwrap();
            let me = dart.my_id();
            let local = matrix.local_view();
            let values = vec![me as i32; local.size()];
            matrix.write_view(&local, &values).unwrap();
            matrix.barrier().unwrap();
            for i in 0..16 {
                let block = matrix.block(i).unwrap();
                let owner = matrix.pattern().block_owner(i) as i32;
                assert!(matrix.read_view(&block).unwrap().iter().all(|v| *v == owner));
            }
            assert!(matrix.block(16).is_none());
            let refs: Vec<_> = matrix.iter_view(&matrix.sub::<1>(0, 2)).collect();
            assert_eq!(refs.len(), 16);
            matrix.barrier().unwrap();
        });
    }

    #[test]
    fn coordinates_are_checked() {
        launch(2, Config::default(), |dart| {
            let pattern = BlockPattern::<2>::with_units(
                [4, 6],
                DistSpec::new([Distribution::Blocked, Distribution::None]),
                2,
            )
            .unwrap();
            let matrix = Matrix::<f32, 2, _>::with_pattern(dart.clone(), TEAM_ALL, pattern)
                .unwrap();
            assert!(matrix.get([4, 0]).is_err());
            assert!(matrix.put([0, 6], 1.0).is_err());
            assert!(matrix.gptr_at([3, 5]).is_ok());
            matrix.barrier().unwrap();
        });
    }
}
