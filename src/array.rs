//! Distributed containers.
//!
//! A container binds a [`Pattern`] to a collective allocation on a team: every unit of the
//! team reserves `pattern.local_capacity()` elements, and element `g` lives at local offset
//! `pattern.local(g).index` of unit `pattern.local(g).unit`. Element access resolves through
//! the pattern and is served from local memory or by one-sided transfers.
//!
//! Construction and drop are collective: every unit of the team must create and drop its
//! containers in the same order.

mod glob_ref;
mod iter;
mod matrix;
mod storage;
mod unordered_map;

pub use glob_ref::{ElementHandle, GlobRef};
pub use iter::{GlobalIter, LocalIter};
pub use matrix::Matrix;
pub use unordered_map::UnorderedMap;

use storage::{plan, Storage};

use crate::dart::{Dart, DartError, DartResult, GlobalPtr, TeamId};
use crate::pattern::{BlockPattern, DistSpec, Distribution, Index, Pattern};
use crate::view::IndexView;

use std::sync::Arc;

/// Element types of distributed containers.
///
/// # Safety
/// Values are moved between units as raw bytes: the type must be plain old data, valid for
/// any byte pattern produced by another value of the type and for all zero bytes, and free of
/// pointers and drop glue. Use `#[derive(Dist)]` for `#[repr(C)]` structs of `Dist` fields.
pub unsafe trait Dist: Copy + Send + Sync + 'static {}

macro_rules! impl_dist {
    ($($t:ty),* $(,)?) => {
        $(unsafe impl Dist for $t {})*
    };
}

impl_dist!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char);

unsafe impl<T: Dist, const N: usize> Dist for [T; N] {}

macro_rules! impl_dist_tuple {
    ($($name:ident),+) => {
        unsafe impl<$($name: Dist),+> Dist for ($($name,)+) {}
    };
}

impl_dist_tuple!(A);
impl_dist_tuple!(A, B);
impl_dist_tuple!(A, B, C);
impl_dist_tuple!(A, B, C, D);
impl_dist_tuple!(A, B, C, D, E);
impl_dist_tuple!(A, B, C, D, E, F);

/// A one-dimensional distributed array.
///
/// ```
/// use dash::{Array, Distribution, TEAM_ALL};
///
/// dash::transport::local::launch(2, Default::default(), |dart| {
///     let array = Array::<f64>::new(dart.clone(), TEAM_ALL, 10, Distribution::Cyclic).unwrap();
///     if dart.my_id() == 0 {
///         array.put_range(0, &[1.0; 10]).unwrap();
///     }
///     array.barrier().unwrap();
///     assert_eq!(array.get(9).unwrap(), 1.0);
/// });
/// ```
pub struct Array<T: Dist, P: Pattern<1> = BlockPattern<1>> {
    storage: Storage<T>,
    pattern: P,
}

impl<T: Dist> Array<T> {
    /// Collective over `team`: an array of `n` elements distributed by `dist`.
    pub fn new(dart: Arc<Dart>, team: TeamId, n: usize, dist: Distribution) -> DartResult<Self> {
        let nunits = dart.team_size(team)?;
        let pattern = BlockPattern::with_units([n], DistSpec::new([dist]), nunits)?;
        Array::with_pattern(dart, team, pattern)
    }
}

impl<T: Dist, P: Pattern<1>> Array<T, P> {
    /// Collective over `team`: an array laid out by `pattern`, which must span the team.
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
        Ok(Array { storage, pattern })
    }

    pub fn len(&self) -> usize {
        self.pattern.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pattern(&self) -> &P {
        &self.pattern
    }

    pub fn team(&self) -> TeamId {
        self.storage.team()
    }

    pub fn dart(&self) -> &Arc<Dart> {
        self.storage.dart()
    }

    fn check(&self, start: usize, n: usize) -> DartResult<()> {
        if start.checked_add(n).map_or(true, |end| end > self.len()) {
            return Err(DartError::InvalidArgument(format!(
                "elements {}..{} out of bounds for an array of length {}",
                start,
                start.saturating_add(n),
                self.len()
            )));
        }
        Ok(())
    }

    /// Global pointer to element `g`.
    pub fn gptr_at(&self, g: usize) -> DartResult<GlobalPtr> {
        self.check(g, 1)?;
        let l = self.pattern.local(g as Index);
        self.storage.gptr(l.unit, l.index as usize)
    }

    /// Reference to element `g`.
    pub fn at(&self, g: usize) -> DartResult<GlobRef<'_, T>> {
        self.check(g, 1)?;
        let l = self.pattern.local(g as Index);
        Ok(GlobRef::new(&self.storage, l.unit, l.index as usize))
    }

    /// Read element `g`, waiting for the value to arrive.
    pub fn get(&self, g: usize) -> DartResult<T> {
        self.at(g)?.get()
    }

    /// Write element `g`. The value is locally complete on return, remote units observe it
    /// after the next barrier.
    pub fn put(&self, g: usize, value: T) -> DartResult<()> {
        self.at(g)?.put(value)
    }

    /// Start reading element `g`.
    pub fn async_get(&self, g: usize) -> DartResult<ElementHandle<T>> {
        self.at(g)?.async_get()
    }

    /// Read `dest.len()` elements starting at `start`, one transfer per contiguous run.
    pub fn get_range(&self, start: usize, dest: &mut [T]) -> DartResult<()> {
        self.check(start, dest.len())?;
        let runs = plan(&self.pattern, (start..start + dest.len()).map(|g| g as Index));
        self.storage.read_runs(&runs, dest)
    }

    /// Write `src` to the elements starting at `start`, one transfer per contiguous run.
    pub fn put_range(&self, start: usize, src: &[T]) -> DartResult<()> {
        self.check(start, src.len())?;
        let runs = plan(&self.pattern, (start..start + src.len()).map(|g| g as Index));
        self.storage.write_runs(&runs, src)
    }

    /// Complete every outstanding fire-and-forget transfer of the calling unit.
    pub fn flush(&self) -> DartResult<()> {
        self.storage.dart().flush_local_all()
    }

    /// Elements of the calling unit in local memory order.
    ///
    /// # Safety
    /// No transfer may write the local elements while the slice is alive, which in practice
    /// means the slice must not outlive the current barrier epoch.
    pub unsafe fn local_slice(&self) -> &[T] {
        self.storage.local_slice(self.pattern.local_size(self.pattern.myid()))
    }

    /// Mutable elements of the calling unit in local memory order.
    ///
    /// # Safety
    /// The caller must be the only reader and writer of the local elements while the slice is
    /// alive, locally and through transfers from other units.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn local_slice_mut(&self) -> &mut [T] {
        self.storage
            .local_slice_mut(self.pattern.local_size(self.pattern.myid()))
    }

    /// Global indices of the local elements, in local memory order.
    pub fn local_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.pattern.local_size(self.pattern.myid()))
            .map(move |l| self.pattern.global(l as Index) as usize)
    }

    /// Global index of the first local element.
    pub fn lbegin(&self) -> usize {
        self.pattern.lbegin() as usize
    }

    /// One past the global index of the last local element.
    pub fn lend(&self) -> usize {
        self.pattern.lend() as usize
    }

    /// References to every element in global order.
    pub fn iter(&self) -> GlobalIter<'_, T, P, 1> {
        GlobalIter::new(&self.storage, &self.pattern, IndexView::new(&self.pattern).index())
    }

    /// References to the local elements in local memory order.
    pub fn local_iter(&self) -> LocalIter<'_, T> {
        LocalIter::new(&self.storage, self.pattern.local_size(self.pattern.myid()))
    }

    /// View of the whole index space.
    pub fn view(&self) -> IndexView<'_, P, 1> {
        IndexView::new(&self.pattern)
    }

    /// Values of the elements `view` designates, in index order.
    pub fn read_view(&self, view: &IndexView<'_, P, 1>) -> DartResult<Vec<T>> {
        read_view(&self.storage, &self.pattern, view)
    }

    /// Barrier on the team of the array.
    pub fn barrier(&self) -> DartResult<()> {
        self.storage.barrier()
    }
}

pub(crate) fn read_view<T: Dist, P: Pattern<N>, const N: usize>(
    storage: &Storage<T>,
    pattern: &P,
    view: &IndexView<'_, P, N>,
) -> DartResult<Vec<T>> {
    if !std::ptr::eq(view.pattern(), pattern) && view.pattern() != pattern {
        return Err(DartError::InvalidArgument(
            "view belongs to a different pattern".to_owned(),
        ));
    }
    let index = view.index();
    let runs = plan(pattern, index.iter());
    storage.read_all(&runs, index.size())
}

impl<T: Dist, P: Pattern<1>> std::fmt::Debug for Array<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("team", &self.team())
            .field("len", &self.len())
            .field("pattern", &self.pattern)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::TEAM_ALL;
    use crate::env_var::Config;
    use crate::pattern::CsrPattern;
    use crate::transport::local::launch;

    fn test_config() -> Config {
        Config {
            transfer_pool_size: 4096,
            ..Default::default()
        }
    }

    #[test]
    fn blocked_array_round_trip() {
        let res = launch(4, test_config(), |dart| {
            let array = Array::<u32>::new(dart.clone(), TEAM_ALL, 41, Distribution::Blocked)
                .unwrap();
            assert_eq!(array.len(), 41);
            for g in array.local_indices() {
                array.put(g, g as u32 * 2).unwrap();
            }
            array.barrier().unwrap();
            let mut all = vec![0u32; 41];
            array.get_range(0, &mut all).unwrap();
            let local = unsafe { array.local_slice().to_vec() };
            array.barrier().unwrap();
            (all, local, array.lbegin(), array.lend())
        });
        let expected: Vec<u32> = (0..41).map(|g| g * 2).collect();
        for (unit, (all, local, lbegin, lend)) in res.into_iter().enumerate() {
            assert_eq!(all, expected);
            assert_eq!(lbegin, unit * 11);
            assert_eq!(lend, (unit * 11 + 11).min(41));
            assert_eq!(local, expected[lbegin..lend].to_vec());
        }
    }

    #[test]
    fn cyclic_put_range_from_one_unit() {
        let res = launch(3, test_config(), |dart| {
            let array =
                Array::<i64>::new(dart.clone(), TEAM_ALL, 20, Distribution::Cyclic).unwrap();
            if dart.my_id() == 1 {
                let values: Vec<i64> = (0..20).map(|v| -v).collect();
                array.put_range(0, &values).unwrap();
            }
            array.barrier().unwrap();
            let local: Vec<i64> = array.local_iter().map(|r| r.get().unwrap()).collect();
            let mut tail = [0i64; 5];
            array.get_range(15, &mut tail).unwrap();
            array.barrier().unwrap();
            (local, tail)
        });
        for (unit, (local, tail)) in res.into_iter().enumerate() {
            let expected: Vec<i64> = (0..20).filter(|g| g % 3 == unit as i64).map(|g| -g).collect();
            assert_eq!(local, expected);
            assert_eq!(tail, [-15, -16, -17, -18, -19]);
        }
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        launch(2, test_config(), |dart| {
            let array = Array::<u8>::new(dart.clone(), TEAM_ALL, 4, Distribution::Blocked)
                .unwrap();
            assert!(array.get(4).is_err());
            assert!(array.put(7, 1).is_err());
            let mut buf = [0u8; 3];
            assert!(array.get_range(2, &mut buf).is_err());
            assert!(array.gptr_at(3).is_ok());
            array.barrier().unwrap();
        });
    }

    #[test]
    fn pattern_must_span_the_team() {
        launch(2, test_config(), |dart| {
            let pattern = CsrPattern::new(vec![1, 2, 3]).unwrap();
            let res = Array::<u8, _>::with_pattern(dart.clone(), TEAM_ALL, pattern);
            assert!(matches!(res, Err(DartError::InvalidArgument(_))));
            let pattern = CsrPattern::new(vec![3, 5]).unwrap();
            let array = Array::<u16, _>::with_pattern(dart.clone(), TEAM_ALL, pattern).unwrap();
            assert_eq!(array.len(), 8);
            assert_eq!(array.local_indices().count(), [3, 5][dart.my_id()]);
            array.barrier().unwrap();
        });
    }

    #[test]
    fn async_gets_complete_on_wait() {
        let res = launch(2, test_config(), |dart| {
            let array =
                Array::<u64>::new(dart.clone(), TEAM_ALL, 8, Distribution::Blocked).unwrap();
            for g in array.local_indices() {
                array.put(g, 100 + g as u64).unwrap();
            }
            array.barrier().unwrap();
            let handles: Vec<_> = (0..8).map(|g| array.async_get(g).unwrap()).collect();
            let values: Vec<u64> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
            array.barrier().unwrap();
            values
        });
        for values in res {
            assert_eq!(values, (100..108).collect::<Vec<u64>>());
        }
    }
}
