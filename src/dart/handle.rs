use crate::transport::SegmentId;

use std::collections::VecDeque;
use std::ptr::NonNull;
use tracing::warn;

/// User destination of a pending get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DestPtr(pub(crate) NonNull<u8>);

// only dereferenced by the unit that issued the get, under the contract of `Dart::get`
unsafe impl Send for DestPtr {}
unsafe impl Sync for DestPtr {}

/// State of one outstanding transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HandleInfo {
    /// Local staging segment and the offset of the staging block inside it.
    pub(crate) segment: SegmentId,
    pub(crate) offset: usize,
    pub(crate) queue: usize,
    pub(crate) nbytes: usize,
    /// `None` for puts.
    pub(crate) dest: Option<DestPtr>,
}

impl HandleInfo {
    #[cfg(test)]
    pub(crate) fn is_get(&self) -> bool {
        self.dest.is_some()
    }
}

/// A transfer returned by [`Dart::get_handle`](crate::dart::Dart::get_handle) or
/// [`Dart::put_handle`](crate::dart::Dart::put_handle).
///
/// The handle must be completed with `wait_local`/`test_local` before it is dropped, otherwise
/// its staging block is never returned to the transfer pool and a get never reaches its
/// destination.
#[must_use = "a transfer handle must be completed with wait_local or test_local"]
#[derive(Debug, Default)]
pub struct Handle {
    pub(crate) info: Option<HandleInfo>,
}

impl Handle {
    /// A handle representing an already complete transfer.
    pub fn null() -> Handle {
        Handle { info: None }
    }

    pub(crate) fn pending(info: HandleInfo) -> Handle {
        Handle { info: Some(info) }
    }

    /// `true` once the transfer has completed locally (or there never was one).
    pub fn is_null(&self) -> bool {
        self.info.is_none()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(info) = self.info {
            warn!(
                "dropping an incomplete transfer handle ({} bytes on queue {}), its staging block is leaked",
                info.nbytes, info.queue
            );
        }
    }
}

/// FIFO of outstanding transfers of one channel.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandleQueue {
    handles: VecDeque<HandleInfo>,
}

impl HandleQueue {
    pub(crate) fn new() -> HandleQueue {
        HandleQueue {
            handles: VecDeque::new(),
        }
    }

    pub(crate) fn enqueue(&mut self, info: HandleInfo) {
        self.handles.push_back(info);
    }

    pub(crate) fn front(&self) -> Option<HandleInfo> {
        self.handles.front().copied()
    }

    pub(crate) fn dequeue(&mut self) -> Option<HandleInfo> {
        self.handles.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
