//! The interface the RMA runtime expects from a transport, and the transports shipped with the
//! crate.
//!
//! A transport exposes per-unit registered segments, a fixed number of bounded request queues
//! that only provide *local* completion, and group collectives (barrier and allgather).

use enum_dispatch::enum_dispatch;
use std::sync::Arc;

pub mod local;
use local::LocalTransport;

/// Transport level segment identifier. Id `0` is the private transfer segment of every unit.
pub type SegmentId = u16;

/// The list of available transports.
#[derive(
    serde::Serialize, serde::Deserialize, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Clone, Copy,
)]
pub enum Backend {
    /// In-process fabric, every unit is a thread of the calling process
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// `(unit, segment)` is not registered.
    UnknownSegment(usize, SegmentId),
    OutOfBounds {
        segment: SegmentId,
        offset: usize,
        len: usize,
        size: usize,
    },
    SegmentExists(SegmentId),
    /// The backing memory of a segment could not be obtained.
    AllocFailed(usize),
    /// Every slot of the queue holds an outstanding request.
    QueueFull(usize),
    InvalidQueue(usize),
    InvalidUnit(usize),
    GroupMismatch(String),
    /// A participating unit terminated abnormally.
    Shutdown,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::UnknownSegment(unit, seg) => {
                write!(f, "segment {} is not registered on unit {}", seg, unit)
            }
            TransportError::OutOfBounds {
                segment,
                offset,
                len,
                size,
            } => write!(
                f,
                "access [{}, {}) exceeds segment {} of {} bytes",
                offset,
                offset + len,
                segment,
                size
            ),
            TransportError::SegmentExists(seg) => write!(f, "segment {} already exists", seg),
            TransportError::AllocFailed(size) => {
                write!(f, "unable to allocate a segment of {} bytes", size)
            }
            TransportError::QueueFull(q) => write!(f, "queue {} is full", q),
            TransportError::InvalidQueue(q) => write!(f, "queue {} does not exist", q),
            TransportError::InvalidUnit(unit) => write!(f, "unit {} does not exist", unit),
            TransportError::GroupMismatch(msg) => write!(f, "group mismatch: {}", msg),
            TransportError::Shutdown => write!(f, "transport has been shut down"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult<T> = Result<T, TransportError>;

/// One-sided transfer between a local segment and a segment on `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmaRequest {
    pub local_segment: SegmentId,
    pub local_offset: usize,
    pub unit: usize,
    pub remote_segment: SegmentId,
    pub remote_offset: usize,
    pub len: usize,
}

/// Counters describing the traffic of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub bytes_read: usize,
    pub bytes_written: usize,
    /// Number of `wait` calls on a queue.
    pub blocking_waits: usize,
}

/// A set of units able to run collectives together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupHandle {
    pub(crate) members: Arc<Vec<usize>>,
    pub(crate) my_index: usize,
}

impl GroupHandle {
    /// Absolute unit ids of the group, ascending.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Position of the calling unit within the group.
    pub fn my_index(&self) -> usize {
        self.my_index
    }
}

#[enum_dispatch]
pub trait TransportInfo {
    fn my_unit(&self) -> usize;
    fn num_units(&self) -> usize;
    fn backend(&self) -> Backend;
    fn stats(&self) -> TransportStats;
}

#[enum_dispatch]
pub trait TransportSegment {
    /// Collective over `group`: every member registers `id` with `size` bytes.
    fn segment_create(
        &self,
        id: SegmentId,
        size: usize,
        group: &GroupHandle,
    ) -> TransportResult<()>;
    /// Registers `id` on the calling unit only.
    fn segment_alloc(&self, id: SegmentId, size: usize) -> TransportResult<()>;
    fn segment_delete(&self, id: SegmentId) -> TransportResult<()>;
    fn segment_ptr(&self, id: SegmentId) -> TransportResult<*mut u8>;
    fn segment_size(&self, id: SegmentId) -> TransportResult<usize>;
}

#[enum_dispatch]
pub trait TransportQueue {
    fn queue_num(&self) -> usize;
    fn queue_size_max(&self) -> usize;
    /// Number of outstanding requests in `queue`.
    fn queue_size(&self, queue: usize) -> TransportResult<usize>;
    /// Post a read of `req.len` bytes from the remote segment into the local one.
    fn read(&self, queue: usize, req: RmaRequest) -> TransportResult<()>;
    /// Post a write of `req.len` bytes from the local segment into the remote one.
    fn write(&self, queue: usize, req: RmaRequest) -> TransportResult<()>;
    /// Block until every request of `queue` is locally complete.
    fn wait(&self, queue: usize) -> TransportResult<()>;
    /// Make progress on `queue` without blocking, `true` once it is empty.
    fn test(&self, queue: usize) -> TransportResult<bool>;
}

#[enum_dispatch]
pub trait TransportGroup {
    fn group_create(&self, units: &[usize]) -> TransportResult<GroupHandle>;
    fn group_delete(&self, group: GroupHandle) -> TransportResult<()>;
    fn barrier(&self, group: &GroupHandle) -> TransportResult<()>;
    /// Every member contributes `data`, the result is ordered by group index.
    fn allgather(&self, group: &GroupHandle, data: &[u8]) -> TransportResult<Vec<Vec<u8>>>;
}

#[enum_dispatch(TransportInfo, TransportSegment, TransportQueue, TransportGroup)]
#[derive(Debug)]
pub enum Transport {
    Local(LocalTransport),
}
