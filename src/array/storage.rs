use super::Dist;
use crate::dart::{Dart, DartError, DartResult, GlobalPtr, Handle, TeamId};
use crate::pattern::{Index, Pattern};

use itertools::Itertools;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{error, trace};

/// A run of elements that are consecutive both in the caller's buffer and in the local
/// memory of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Run {
    /// Position of the first element in the caller's buffer.
    pub(crate) pos: usize,
    pub(crate) unit: usize,
    /// Local offset of the first element at `unit`.
    pub(crate) index: usize,
    pub(crate) len: usize,
}

/// Group the elements at the global indices `indices` into runs.
pub(crate) fn plan<P, const N: usize, I>(pattern: &P, indices: I) -> Vec<Run>
where
    P: Pattern<N>,
    I: Iterator<Item = Index>,
{
    indices
        .enumerate()
        .map(|(pos, g)| {
            let l = pattern.local(g);
            Run {
                pos,
                unit: l.unit,
                index: l.index as usize,
                len: 1,
            }
        })
        .coalesce(|a, b| {
            if a.unit == b.unit && a.index + a.len == b.index && a.pos + a.len == b.pos {
                Ok(Run {
                    len: a.len + b.len,
                    ..a
                })
            } else {
                Err((a, b))
            }
        })
        .collect()
}

pub(crate) fn as_bytes<T: Dist>(values: &[T]) -> &[u8] {
    // Dist types are plain old data
    unsafe {
        std::slice::from_raw_parts(values.as_ptr() as *const u8, std::mem::size_of_val(values))
    }
}

pub(crate) fn as_bytes_mut<T: Dist>(values: &mut [T]) -> &mut [u8] {
    unsafe {
        std::slice::from_raw_parts_mut(
            values.as_mut_ptr() as *mut u8,
            std::mem::size_of_val(values),
        )
    }
}

/// `len` values of all zero bytes, a valid value of every `Dist` type.
pub(crate) fn zeroed<T: Dist>(len: usize) -> Vec<T> {
    let mut values: Vec<MaybeUninit<T>> = Vec::with_capacity(len);
    values.resize_with(len, MaybeUninit::zeroed);
    values
        .into_iter()
        .map(|v| unsafe { v.assume_init() })
        .collect()
}

/// The collective allocation backing a container: `capacity` elements of `T` on every unit
/// of `team`.
pub(crate) struct Storage<T: Dist> {
    dart: Arc<Dart>,
    team: TeamId,
    myid: usize,
    /// Absolute ids of the team units.
    units: Vec<usize>,
    base: GlobalPtr,
    local: NonNull<T>,
    capacity: usize,
}

// the local pointer refers to the segment of the collective allocation, which lives until
// the storage is dropped
unsafe impl<T: Dist> Send for Storage<T> {}
unsafe impl<T: Dist> Sync for Storage<T> {}

impl<T: Dist> Storage<T> {
    pub(crate) fn new(dart: Arc<Dart>, team: TeamId, capacity: usize) -> DartResult<Self> {
        let nbytes = (capacity * std::mem::size_of::<T>()).max(1);
        let nunits = dart.team_size(team)?;
        let units = (0..nunits)
            .map(|u| dart.team_unit_l2g(team, u))
            .collect::<DartResult<Vec<_>>>()?;
        let myid = dart.team_myid(team)?;
        let base = dart.team_memalloc_aligned(team, nbytes)?;
        let mut mine = base;
        mine.set_unit(units[myid]);
        let addr = dart.gptr_getaddr(mine)?;
        let local = NonNull::new(addr as *mut T).ok_or_else(|| {
            error!("collective allocation of team {} has no local memory", team);
            DartError::Other(format!("segment of {} has no local address", base))
        })?;
        if local.as_ptr() as usize % std::mem::align_of::<T>() != 0 {
            return Err(DartError::InvalidArgument(format!(
                "segment of {} is not aligned for elements of {} bytes",
                base,
                std::mem::align_of::<T>()
            )));
        }
        trace!(
            "storage of {} elements per unit at {} on team {}",
            capacity,
            base,
            team
        );
        Ok(Storage {
            dart,
            team,
            myid,
            units,
            base,
            local,
            capacity,
        })
    }

    pub(crate) fn dart(&self) -> &Arc<Dart> {
        &self.dart
    }

    pub(crate) fn team(&self) -> TeamId {
        self.team
    }

    pub(crate) fn myid(&self) -> usize {
        self.myid
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn barrier(&self) -> DartResult<()> {
        self.dart.barrier(self.team)
    }

    /// Global pointer to local offset `index` of team unit `unit`.
    pub(crate) fn gptr(&self, unit: usize, index: usize) -> DartResult<GlobalPtr> {
        let abs = *self.units.get(unit).ok_or_else(|| {
            DartError::InvalidArgument(format!("unit {} is not a member of team {}", unit, self.team))
        })?;
        let mut gptr = self.base;
        gptr.set_unit(abs);
        gptr.set_offset((index * std::mem::size_of::<T>()) as u64);
        Ok(gptr)
    }

    fn check_local(&self, index: usize, len: usize) -> DartResult<()> {
        if index + len > self.capacity {
            return Err(DartError::InvalidArgument(format!(
                "local elements {}..{} exceed the capacity {}",
                index,
                index + len,
                self.capacity
            )));
        }
        Ok(())
    }

    fn local_ptr(&self, index: usize) -> *mut T {
        unsafe { self.local.as_ptr().add(index) }
    }

    pub(crate) unsafe fn local_slice(&self, len: usize) -> &[T] {
        std::slice::from_raw_parts(self.local.as_ptr(), len.min(self.capacity))
    }

    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn local_slice_mut(&self, len: usize) -> &mut [T] {
        std::slice::from_raw_parts_mut(self.local.as_ptr(), len.min(self.capacity))
    }

    /// Copy `dest.len()` elements from local offset `index` of `unit`, blocking.
    pub(crate) fn read(&self, unit: usize, index: usize, dest: &mut [T]) -> DartResult<()> {
        if unit == self.myid {
            self.check_local(index, dest.len())?;
            unsafe {
                std::ptr::copy(self.local_ptr(index) as *const T, dest.as_mut_ptr(), dest.len())
            };
            return Ok(());
        }
        self.dart
            .get_blocking(as_bytes_mut(dest), self.gptr(unit, index)?)
    }

    /// Copy `src` to local offset `index` of `unit`; `src` is locally complete on return.
    pub(crate) fn write(&self, unit: usize, index: usize, src: &[T]) -> DartResult<()> {
        if unit == self.myid {
            self.check_local(index, src.len())?;
            unsafe { std::ptr::copy(src.as_ptr(), self.local_ptr(index), src.len()) };
            return Ok(());
        }
        let gptr = self.gptr(unit, index)?;
        self.dart.put(gptr, as_bytes(src))?;
        self.dart.flush_local(gptr)
    }

    /// Start reading the element at local offset `index` of `unit` into `dest`.
    ///
    /// # Safety
    /// `dest` must stay valid and untouched until the handle is complete.
    pub(crate) unsafe fn read_handle(
        &self,
        unit: usize,
        index: usize,
        dest: &mut [T],
    ) -> DartResult<Handle> {
        if unit == self.myid {
            self.read(unit, index, dest)?;
            return Ok(Handle::null());
        }
        self.dart.get_handle(as_bytes_mut(dest), self.gptr(unit, index)?)
    }

    /// Read every run into `dest`, one transfer per remote run.
    ///
    /// Runs whose staging does not fit into the transfer pool are read after the transfers
    /// issued so far have completed, and bypass the pool if they are larger than it.
    pub(crate) fn read_runs(&self, runs: &[Run], dest: &mut [T]) -> DartResult<()> {
        let mut handles: Vec<Handle> = Vec::new();
        for run in runs {
            let buf = &mut dest[run.pos..run.pos + run.len];
            if run.unit == self.myid {
                if let Err(e) = self.read(run.unit, run.index, buf) {
                    self.dart.waitall_local(&mut handles)?;
                    return Err(e);
                }
                continue;
            }
            let gptr = self.gptr(run.unit, run.index)?;
            match unsafe { self.dart.get_handle(as_bytes_mut(buf), gptr) } {
                Ok(handle) => handles.push(handle),
                Err(DartError::ResourceExhausted(_)) => {
                    self.dart.waitall_local(&mut handles)?;
                    handles.clear();
                    self.dart.get_blocking(as_bytes_mut(buf), gptr)?;
                }
                Err(e) => {
                    self.dart.waitall_local(&mut handles)?;
                    return Err(e);
                }
            }
        }
        self.dart.waitall_local(&mut handles)
    }

    /// Read every run into a new buffer of `len` elements.
    pub(crate) fn read_all(&self, runs: &[Run], len: usize) -> DartResult<Vec<T>> {
        let mut values = zeroed(len);
        self.read_runs(runs, &mut values)?;
        Ok(values)
    }

    /// Write every run from `src`, one transfer per remote run. Complete locally on return.
    pub(crate) fn write_runs(&self, runs: &[Run], src: &[T]) -> DartResult<()> {
        let mut handles: Vec<Handle> = Vec::new();
        for run in runs {
            let buf = &src[run.pos..run.pos + run.len];
            if run.unit == self.myid {
                if let Err(e) = self.write(run.unit, run.index, buf) {
                    self.dart.waitall_local(&mut handles)?;
                    return Err(e);
                }
                continue;
            }
            let gptr = self.gptr(run.unit, run.index)?;
            match self.dart.put_handle(gptr, as_bytes(buf)) {
                Ok(handle) => handles.push(handle),
                Err(DartError::ResourceExhausted(_)) => {
                    self.dart.waitall_local(&mut handles)?;
                    handles.clear();
                    self.put_chunked(gptr, as_bytes(buf))?;
                }
                Err(e) => {
                    self.dart.waitall_local(&mut handles)?;
                    return Err(e);
                }
            }
        }
        self.dart.waitall_local(&mut handles)
    }

    // the reserved null byte of the pool leaves at most half of it for a single block
    fn put_chunked(&self, gptr: GlobalPtr, src: &[u8]) -> DartResult<()> {
        let chunk = (self.dart.config().transfer_pool_size / 2).max(1);
        for (i, part) in src.chunks(chunk).enumerate() {
            let handle = self.dart.put_handle(gptr.add((i * chunk) as i64), part)?;
            self.dart.wait_local(handle)?;
        }
        Ok(())
    }
}

impl<T: Dist> Drop for Storage<T> {
    fn drop(&mut self) {
        if let Err(e) = self.dart.team_memfree(self.team, self.base) {
            error!("failed to free the storage at {}: {}", self.base, e);
        }
    }
}
