//! In-process fabric: every unit is a thread of the calling process and segments live on the
//! shared heap.
//!
//! Requests posted to a queue are staged and executed only when the queue is waited on or
//! tested, so queue depth and backpressure behave as on a hardware queue that reports local
//! completion only.

use super::{
    Backend, GroupHandle, RmaRequest, SegmentId, Transport, TransportError, TransportGroup,
    TransportInfo, TransportQueue, TransportResult, TransportSegment, TransportStats,
};
use crate::dart::{Dart, DartBuilder};
use crate::env_var::Config;

use parking_lot::{Condvar, Mutex, RwLock};
use std::alloc::Layout;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

const SEGMENT_ALIGN: usize = 64;

struct SegmentMem {
    ptr: *mut u8,
    layout: Layout,
    size: usize,
}

// the memory is only reached through raw pointers handed out by the fabric
unsafe impl Send for SegmentMem {}
unsafe impl Sync for SegmentMem {}

impl SegmentMem {
    fn new(size: usize) -> TransportResult<SegmentMem> {
        let layout = Layout::from_size_align(size.max(1), SEGMENT_ALIGN)
            .map_err(|_| TransportError::AllocFailed(size))?;
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(TransportError::AllocFailed(size));
        }
        Ok(SegmentMem { ptr, layout, size })
    }
}

impl Drop for SegmentMem {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr, self.layout) };
    }
}

struct Rendezvous {
    generation: u64,
    arrived: usize,
    contributions: Vec<Option<Vec<u8>>>,
    published: Option<(u64, Arc<Vec<Vec<u8>>>)>,
}

impl Rendezvous {
    fn new(size: usize) -> Rendezvous {
        Rendezvous {
            generation: 0,
            arrived: 0,
            contributions: vec![None; size],
            published: None,
        }
    }
}

/// The memory and collective state shared by all units of one process.
pub struct LocalFabric {
    num_units: usize,
    config: Config,
    segments: Vec<RwLock<HashMap<SegmentId, SegmentMem>>>,
    rendezvous: Mutex<HashMap<Vec<usize>, Rendezvous>>,
    arrivals: Condvar,
    aborted: AtomicBool,
}

impl std::fmt::Debug for LocalFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFabric")
            .field("num_units", &self.num_units)
            .field("aborted", &self.aborted.load(Ordering::Relaxed))
            .finish()
    }
}

impl LocalFabric {
    pub fn new(num_units: usize, config: Config) -> Arc<LocalFabric> {
        assert!(num_units > 0, "a fabric needs at least one unit");
        Arc::new(LocalFabric {
            num_units,
            config,
            segments: (0..num_units).map(|_| RwLock::new(HashMap::new())).collect(),
            rendezvous: Mutex::new(HashMap::new()),
            arrivals: Condvar::new(),
            aborted: AtomicBool::new(false),
        })
    }

    pub fn num_units(&self) -> usize {
        self.num_units
    }

    /// The transport endpoint of `unit`.
    pub fn transport(self: &Arc<Self>, unit: usize) -> Transport {
        assert!(unit < self.num_units, "unit {} out of range", unit);
        Transport::Local(LocalTransport {
            fabric: self.clone(),
            my_unit: unit,
            queues: (0..self.config.num_queues.max(1))
                .map(|_| Mutex::new(VecDeque::new()))
                .collect(),
            queue_depth: self.config.queue_depth.max(1),
            bytes_read: AtomicUsize::new(0),
            bytes_written: AtomicUsize::new(0),
            blocking_waits: AtomicUsize::new(0),
        })
    }

    /// Release every unit blocked in a collective, used when a unit terminates abnormally.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        let _guard = self.rendezvous.lock();
        self.arrivals.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn check_unit(&self, unit: usize) -> TransportResult<()> {
        if unit < self.num_units {
            Ok(())
        } else {
            Err(TransportError::InvalidUnit(unit))
        }
    }

    fn segment_span(
        &self,
        unit: usize,
        id: SegmentId,
        offset: usize,
        len: usize,
    ) -> TransportResult<*mut u8> {
        self.check_unit(unit)?;
        let segments = self.segments[unit].read();
        let seg = segments
            .get(&id)
            .ok_or(TransportError::UnknownSegment(unit, id))?;
        if offset.checked_add(len).map_or(true, |end| end > seg.size) {
            return Err(TransportError::OutOfBounds {
                segment: id,
                offset,
                len,
                size: seg.size,
            });
        }
        Ok(unsafe { seg.ptr.add(offset) })
    }

    fn exchange(&self, group: &GroupHandle, data: &[u8]) -> TransportResult<Vec<Vec<u8>>> {
        if self.is_aborted() {
            return Err(TransportError::Shutdown);
        }
        let key: &[usize] = &group.members;
        let mut map = self.rendezvous.lock();
        let rv = map
            .entry(key.to_vec())
            .or_insert_with(|| Rendezvous::new(key.len()));
        let my_gen = rv.generation;
        rv.contributions[group.my_index] = Some(data.to_vec());
        rv.arrived += 1;
        if rv.arrived == key.len() {
            let result: Arc<Vec<Vec<u8>>> = Arc::new(
                rv.contributions
                    .iter_mut()
                    .map(|c| c.take().unwrap_or_default())
                    .collect(),
            );
            rv.published = Some((my_gen, result.clone()));
            rv.generation += 1;
            rv.arrived = 0;
            self.arrivals.notify_all();
            return Ok(result.to_vec());
        }
        let timeout = Duration::from_secs_f64(self.config.deadlock_timeout.max(0.001));
        let mut start = Instant::now();
        loop {
            if self.is_aborted() {
                return Err(TransportError::Shutdown);
            }
            if let Some((gen, result)) = map.get(key).and_then(|rv| rv.published.as_ref()) {
                if *gen == my_gen {
                    return Ok(result.to_vec());
                }
            }
            self.arrivals.wait_for(&mut map, timeout);
            if start.elapsed() >= timeout {
                warn!(
                    "potential deadlock detected: collective over units {:?} has not completed \
                     after {} seconds; every member must enter the same collectives in the same \
                     order (timeout set via DART_DEADLOCK_TIMEOUT)",
                    key, self.config.deadlock_timeout
                );
                start = Instant::now();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Read,
    Write,
}

/// The transport endpoint of a single unit of a [`LocalFabric`].
pub struct LocalTransport {
    fabric: Arc<LocalFabric>,
    my_unit: usize,
    queues: Vec<Mutex<VecDeque<(RequestKind, RmaRequest)>>>,
    queue_depth: usize,
    bytes_read: AtomicUsize,
    bytes_written: AtomicUsize,
    blocking_waits: AtomicUsize,
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("my_unit", &self.my_unit)
            .field("num_units", &self.fabric.num_units)
            .field("queues", &self.queues.len())
            .field("queue_depth", &self.queue_depth)
            .finish()
    }
}

impl LocalTransport {
    fn queue(
        &self,
        queue: usize,
    ) -> TransportResult<&Mutex<VecDeque<(RequestKind, RmaRequest)>>> {
        self.queues
            .get(queue)
            .ok_or(TransportError::InvalidQueue(queue))
    }

    fn post(&self, queue: usize, kind: RequestKind, req: RmaRequest) -> TransportResult<()> {
        let q = self.queue(queue)?;
        self.fabric
            .segment_span(self.my_unit, req.local_segment, req.local_offset, req.len)?;
        self.fabric
            .segment_span(req.unit, req.remote_segment, req.remote_offset, req.len)?;
        let mut pending = q.lock();
        if pending.len() >= self.queue_depth {
            return Err(TransportError::QueueFull(queue));
        }
        trace!("queue {} post {:?} {:?}", queue, kind, req);
        pending.push_back((kind, req));
        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug")]
    fn execute(&self, kind: RequestKind, req: &RmaRequest) -> TransportResult<()> {
        let local =
            self.fabric
                .segment_span(self.my_unit, req.local_segment, req.local_offset, req.len)?;
        let remote =
            self.fabric
                .segment_span(req.unit, req.remote_segment, req.remote_offset, req.len)?;
        trace!(
            "{:?} {} bytes local {:?} remote unit {} {:?}",
            kind,
            req.len,
            local,
            req.unit,
            remote
        );
        // a unit may target its own segments, the ranges can then overlap
        match kind {
            RequestKind::Read => {
                unsafe { std::ptr::copy(remote as *const u8, local, req.len) };
                self.bytes_read.fetch_add(req.len, Ordering::Relaxed);
            }
            RequestKind::Write => {
                unsafe { std::ptr::copy(local as *const u8, remote, req.len) };
                self.bytes_written.fetch_add(req.len, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn drain(&self, queue: usize) -> TransportResult<()> {
        let mut pending = self.queue(queue)?.lock();
        while let Some((kind, req)) = pending.pop_front() {
            self.execute(kind, &req)?;
        }
        Ok(())
    }
}

impl TransportInfo for LocalTransport {
    fn my_unit(&self) -> usize {
        self.my_unit
    }
    fn num_units(&self) -> usize {
        self.fabric.num_units
    }
    fn backend(&self) -> Backend {
        Backend::Local
    }
    fn stats(&self) -> TransportStats {
        TransportStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            blocking_waits: self.blocking_waits.load(Ordering::Relaxed),
        }
    }
}

impl TransportSegment for LocalTransport {
    fn segment_create(
        &self,
        id: SegmentId,
        size: usize,
        group: &GroupHandle,
    ) -> TransportResult<()> {
        let res = self.segment_alloc(id, size);
        // remote members may only touch the segment once everybody registered it
        self.barrier(group)?;
        res
    }

    fn segment_alloc(&self, id: SegmentId, size: usize) -> TransportResult<()> {
        let mut segments = self.fabric.segments[self.my_unit].write();
        if segments.contains_key(&id) {
            return Err(TransportError::SegmentExists(id));
        }
        segments.insert(id, SegmentMem::new(size)?);
        debug!("unit {} registered segment {} ({} bytes)", self.my_unit, id, size);
        Ok(())
    }

    fn segment_delete(&self, id: SegmentId) -> TransportResult<()> {
        match self.fabric.segments[self.my_unit].write().remove(&id) {
            Some(_) => {
                debug!("unit {} deleted segment {}", self.my_unit, id);
                Ok(())
            }
            None => Err(TransportError::UnknownSegment(self.my_unit, id)),
        }
    }

    fn segment_ptr(&self, id: SegmentId) -> TransportResult<*mut u8> {
        self.fabric.segment_span(self.my_unit, id, 0, 0)
    }

    fn segment_size(&self, id: SegmentId) -> TransportResult<usize> {
        self.fabric.segments[self.my_unit]
            .read()
            .get(&id)
            .map(|seg| seg.size)
            .ok_or(TransportError::UnknownSegment(self.my_unit, id))
    }
}

impl TransportQueue for LocalTransport {
    fn queue_num(&self) -> usize {
        self.queues.len()
    }

    fn queue_size_max(&self) -> usize {
        self.queue_depth
    }

    fn queue_size(&self, queue: usize) -> TransportResult<usize> {
        Ok(self.queue(queue)?.lock().len())
    }

    fn read(&self, queue: usize, req: RmaRequest) -> TransportResult<()> {
        self.post(queue, RequestKind::Read, req)
    }

    fn write(&self, queue: usize, req: RmaRequest) -> TransportResult<()> {
        self.post(queue, RequestKind::Write, req)
    }

    fn wait(&self, queue: usize) -> TransportResult<()> {
        self.blocking_waits.fetch_add(1, Ordering::Relaxed);
        self.drain(queue)
    }

    fn test(&self, queue: usize) -> TransportResult<bool> {
        let mut pending = self.queue(queue)?.lock();
        if let Some((kind, req)) = pending.pop_front() {
            self.execute(kind, &req)?;
        }
        Ok(pending.is_empty())
    }
}

impl TransportGroup for LocalTransport {
    fn group_create(&self, units: &[usize]) -> TransportResult<GroupHandle> {
        let mut members = units.to_vec();
        members.sort_unstable();
        members.dedup();
        for unit in members.iter() {
            self.fabric.check_unit(*unit)?;
        }
        let my_index = members
            .iter()
            .position(|u| *u == self.my_unit)
            .ok_or_else(|| {
                TransportError::GroupMismatch(format!(
                    "unit {} is not a member of {:?}",
                    self.my_unit, members
                ))
            })?;
        Ok(GroupHandle {
            members: Arc::new(members),
            my_index,
        })
    }

    fn group_delete(&self, group: GroupHandle) -> TransportResult<()> {
        trace!("unit {} released group {:?}", self.my_unit, group.members);
        Ok(())
    }

    fn barrier(&self, group: &GroupHandle) -> TransportResult<()> {
        // progress outstanding requests so that a barrier orders them for remote observers
        for queue in 0..self.queues.len() {
            self.drain(queue)?;
        }
        self.fabric.exchange(group, &[]).map(|_| ())
    }

    fn allgather(&self, group: &GroupHandle, data: &[u8]) -> TransportResult<Vec<Vec<u8>>> {
        if group.members.get(group.my_index) != Some(&self.my_unit) {
            return Err(TransportError::GroupMismatch(format!(
                "unit {} used a group handle of another unit",
                self.my_unit
            )));
        }
        self.fabric.exchange(group, data)
    }
}

struct AbortOnPanic(Arc<LocalFabric>);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

/// Run `f` on `num_units` units, each a thread with its own runtime, and return the results in
/// unit order.
///
/// A panic on one unit releases the others from pending collectives and is propagated to the
/// caller once every unit has finished.
pub fn launch<F, R>(num_units: usize, config: Config, f: F) -> Vec<R>
where
    F: Fn(Arc<Dart>) -> R + Sync,
    R: Send,
{
    let fabric = LocalFabric::new(num_units, config.clone());
    let f = &f;
    std::thread::scope(|s| {
        let threads: Vec<_> = (0..num_units)
            .map(|unit| {
                let fabric = fabric.clone();
                let config = config.clone();
                s.spawn(move || {
                    let _abort = AbortOnPanic(fabric.clone());
                    let dart = match DartBuilder::new()
                        .with_config(config)
                        .with_transport(fabric.transport(unit))
                        .build()
                    {
                        Ok(dart) => Arc::new(dart),
                        Err(e) => panic!("unit {} failed to initialize: {}", unit, e),
                    };
                    let result = f(dart.clone());
                    if let Err(e) = dart.exit() {
                        error!("unit {} failed to shut down: {}", unit, e);
                    }
                    result
                })
            })
            .collect();
        let mut results = Vec::with_capacity(num_units);
        let mut panic = None;
        for thread in threads {
            match thread.join() {
                Ok(result) => results.push(result),
                Err(payload) => {
                    if panic.is_none() {
                        panic = Some(payload);
                    }
                }
            }
        }
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
        results
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        Config {
            num_queues: 2,
            queue_depth: 2,
            deadlock_timeout: 5.0,
            ..Config::default()
        }
    }

    fn endpoint(fabric: &Arc<LocalFabric>, unit: usize) -> LocalTransport {
        match fabric.transport(unit) {
            Transport::Local(t) => t,
        }
    }

    #[test]
    fn requests_execute_on_wait() {
        let fabric = LocalFabric::new(2, small_config());
        let t0 = endpoint(&fabric, 0);
        let t1 = endpoint(&fabric, 1);
        t0.segment_alloc(1, 16).unwrap();
        t1.segment_alloc(1, 16).unwrap();
        unsafe {
            let src = t1.segment_ptr(1).unwrap();
            for i in 0..16 {
                *src.add(i) = i as u8;
            }
        }
        let req = RmaRequest {
            local_segment: 1,
            local_offset: 0,
            unit: 1,
            remote_segment: 1,
            remote_offset: 4,
            len: 8,
        };
        t0.read(0, req).unwrap();
        assert_eq!(t0.queue_size(0).unwrap(), 1);
        let dst = t0.segment_ptr(1).unwrap();
        assert_eq!(unsafe { *dst }, 0);
        t0.wait(0).unwrap();
        assert_eq!(t0.queue_size(0).unwrap(), 0);
        let got = unsafe { std::slice::from_raw_parts(dst, 8) };
        assert_eq!(got, &[4, 5, 6, 7, 8, 9, 10, 11]);
        let stats = t0.stats();
        assert_eq!(stats.bytes_read, 8);
        assert_eq!(stats.blocking_waits, 1);
    }

    #[test]
    fn full_queue_rejects_posts() {
        let fabric = LocalFabric::new(1, small_config());
        let t = endpoint(&fabric, 0);
        t.segment_alloc(0, 8).unwrap();
        let req = RmaRequest {
            local_segment: 0,
            local_offset: 0,
            unit: 0,
            remote_segment: 0,
            remote_offset: 4,
            len: 4,
        };
        t.write(1, req).unwrap();
        t.write(1, req).unwrap();
        assert_eq!(t.write(1, req), Err(TransportError::QueueFull(1)));
        assert_eq!(t.test(1), Ok(false));
        assert_eq!(t.test(1), Ok(true));
        assert_eq!(t.stats().bytes_written, 8);
        assert_eq!(t.write(7, req), Err(TransportError::InvalidQueue(7)));
    }

    #[test]
    fn posts_are_bounds_checked() {
        let fabric = LocalFabric::new(2, small_config());
        let t = endpoint(&fabric, 0);
        t.segment_alloc(0, 8).unwrap();
        let mut req = RmaRequest {
            local_segment: 0,
            local_offset: 0,
            unit: 1,
            remote_segment: 0,
            remote_offset: 0,
            len: 4,
        };
        assert_eq!(t.read(0, req), Err(TransportError::UnknownSegment(1, 0)));
        req.unit = 0;
        req.local_offset = 6;
        assert!(matches!(
            t.read(0, req),
            Err(TransportError::OutOfBounds { segment: 0, .. })
        ));
        req.unit = 5;
        req.local_offset = 0;
        assert_eq!(t.read(0, req), Err(TransportError::InvalidUnit(5)));
        assert_eq!(t.segment_alloc(0, 8), Err(TransportError::SegmentExists(0)));
    }

    #[test]
    fn allgather_orders_by_group_index() {
        let fabric = LocalFabric::new(3, small_config());
        let results: Vec<Vec<Vec<u8>>> = std::thread::scope(|s| {
            let threads: Vec<_> = (0..3)
                .map(|unit| {
                    let t = endpoint(&fabric, unit);
                    s.spawn(move || {
                        let group = t.group_create(&[2, 0, 1]).unwrap();
                        let mut last = Vec::new();
                        for round in 0..10u8 {
                            last = t.allgather(&group, &[unit as u8, round]).unwrap();
                        }
                        last
                    })
                })
                .collect();
            threads.into_iter().map(|t| t.join().unwrap()).collect()
        });
        for result in results {
            assert_eq!(result, vec![vec![0, 9], vec![1, 9], vec![2, 9]]);
        }
    }

    #[test]
    fn group_requires_membership() {
        let fabric = LocalFabric::new(3, small_config());
        let t = endpoint(&fabric, 0);
        assert!(matches!(
            t.group_create(&[1, 2]),
            Err(TransportError::GroupMismatch(_))
        ));
        assert_eq!(t.group_create(&[0, 4]), Err(TransportError::InvalidUnit(4)));
        let group = t.group_create(&[0, 2]).unwrap();
        assert_eq!(group.members(), &[0, 2]);
        assert_eq!(group.my_index(), 0);
    }

    #[test]
    fn abort_releases_waiters() {
        let fabric = LocalFabric::new(2, small_config());
        let t0 = endpoint(&fabric, 0);
        let res = std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                let group = t0.group_create(&[0, 1]).unwrap();
                t0.barrier(&group)
            });
            std::thread::sleep(Duration::from_millis(50));
            fabric.abort();
            waiter.join().unwrap()
        });
        assert_eq!(res, Err(TransportError::Shutdown));
    }
}
