use super::storage::{zeroed, Storage};
use super::Dist;
use crate::dart::{Dart, DartResult, GlobalPtr, Handle};

use std::sync::Arc;
use tracing::warn;

/// Reference to one element of a container, resolved to its owner and local offset.
pub struct GlobRef<'a, T: Dist> {
    storage: &'a Storage<T>,
    unit: usize,
    index: usize,
}

impl<'a, T: Dist> GlobRef<'a, T> {
    pub(crate) fn new(storage: &'a Storage<T>, unit: usize, index: usize) -> Self {
        GlobRef {
            storage,
            unit,
            index,
        }
    }

    /// Team-relative unit owning the element.
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Offset of the element in the local memory of its owner.
    pub fn local_index(&self) -> usize {
        self.index
    }

    pub fn is_local(&self) -> bool {
        self.unit == self.storage.myid()
    }

    pub fn gptr(&self) -> DartResult<GlobalPtr> {
        self.storage.gptr(self.unit, self.index)
    }

    pub fn get(&self) -> DartResult<T> {
        let mut value = zeroed::<T>(1);
        self.storage.read(self.unit, self.index, &mut value)?;
        Ok(value[0])
    }

    /// Write the element; locally complete on return.
    pub fn put(&self, value: T) -> DartResult<()> {
        self.storage.write(self.unit, self.index, &[value])
    }

    pub fn async_get(&self) -> DartResult<ElementHandle<T>> {
        let mut buf = zeroed::<T>(1).into_boxed_slice();
        let handle = unsafe { self.storage.read_handle(self.unit, self.index, &mut buf)? };
        Ok(ElementHandle {
            dart: self.storage.dart().clone(),
            buf,
            handle,
        })
    }
}

impl<'a, T: Dist> Clone for GlobRef<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T: Dist> Copy for GlobRef<'a, T> {}

impl<'a, T: Dist> std::fmt::Debug for GlobRef<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "GlobRef(unit {}, index {})", self.unit, self.index)
    }
}

/// An element read in flight. The destination lives on the heap, so the handle can be moved
/// freely while the transfer is outstanding.
///
/// Dropping an incomplete handle waits for the transfer.
#[must_use = "an element handle does nothing unless waited on"]
pub struct ElementHandle<T: Dist> {
    dart: Arc<Dart>,
    buf: Box<[T]>,
    handle: Handle,
}

impl<T: Dist> ElementHandle<T> {
    /// Block until the value has arrived.
    pub fn wait(mut self) -> DartResult<T> {
        let handle = std::mem::take(&mut self.handle);
        self.dart.wait_local(handle)?;
        Ok(self.buf[0])
    }

    /// `Some(value)` once the value has arrived, without blocking.
    pub fn test(&mut self) -> DartResult<Option<T>> {
        if self.dart.test_local(&mut self.handle)? {
            Ok(Some(self.buf[0]))
        } else {
            Ok(None)
        }
    }
}

impl<T: Dist> Drop for ElementHandle<T> {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            let handle = std::mem::take(&mut self.handle);
            if let Err(e) = self.dart.wait_local(handle) {
                warn!("failed to complete a dropped element read: {}", e);
            }
        }
    }
}
