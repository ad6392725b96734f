//! One-sided get/put and their completion.
//!
//! The transport only reports *local* completion: a completed get has landed in the staging
//! block of the transfer pool and still has to be copied to the user destination, a completed
//! put has left the staging block. Fire-and-forget transfers are filed on the FIFO of their
//! channel (per `(segment, peer)` for collective segments, per peer for private segments) and
//! completed by `flush_local`; handle-returning transfers are owned by the caller.

use super::buddy::BuddyAlloc;
use super::error::{DartError, DartResult};
use super::gptr::GlobalPtr;
use super::handle::{DestPtr, Handle, HandleInfo, HandleQueue};
use super::runtime::{Dart, DartState, TRANSFER_SEGMENT};
use super::team::TeamRegistry;
use super::translation::LogicalSegId;
use crate::transport::{RmaRequest, SegmentId, TransportQueue, TransportSegment};

use std::ptr::NonNull;
use tracing::{debug, trace, warn};

/// The FIFO a transfer towards a global pointer is filed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Peer(usize),
    Segment {
        team_index: usize,
        segid: LogicalSegId,
        rel_unit: usize,
    },
}

/// A global pointer resolved to transport coordinates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target {
    pub(crate) unit: usize,
    pub(crate) segment: SegmentId,
    pub(crate) offset: usize,
    pub(crate) channel: Channel,
}

fn fifo<'a>(
    teams: &'a mut TeamRegistry,
    peer_queues: &'a mut [HandleQueue],
    channel: Channel,
) -> DartResult<&'a mut HandleQueue> {
    match channel {
        Channel::Peer(unit) => peer_queues
            .get_mut(unit)
            .ok_or_else(|| DartError::InvalidArgument(format!("unit {} does not exist", unit))),
        Channel::Segment {
            team_index,
            segid,
            rel_unit,
        } => teams
            .slot_mut(team_index)?
            .table
            .handle_queue(segid, rel_unit),
    }
}

fn release_staging(pool: &mut BuddyAlloc, offset: usize) {
    if let Err(e) = pool.free(offset) {
        warn!("failed to release staging block: {}", e);
    }
}

fn exhausted(nbytes: usize) -> DartError {
    DartError::ResourceExhausted(format!(
        "transfer pool cannot stage {} bytes, complete outstanding transfers and retry",
        nbytes
    ))
}

impl Dart {
    /// Resolve `gptr` and check that `nbytes` starting there stay inside its segment.
    pub(crate) fn resolve(
        &self,
        state: &DartState,
        gptr: GlobalPtr,
        nbytes: usize,
    ) -> DartResult<Target> {
        let unit = gptr.unit();
        if unit >= self.num_units {
            return Err(DartError::InvalidArgument(format!(
                "{} targets a unit that does not exist",
                gptr
            )));
        }
        let (segment, size, channel) = if gptr.is_private() {
            (
                TRANSFER_SEGMENT,
                self.config.transfer_pool_size,
                Channel::Peer(unit),
            )
        } else {
            let team_index = gptr.team_index();
            let slot = state.teams.slot(team_index)?;
            let rel_unit = slot.g2l(unit)?;
            (
                slot.table.transport_segment(gptr.segid, rel_unit)?,
                slot.table.size(gptr.segid)?,
                Channel::Segment {
                    team_index,
                    segid: gptr.segid,
                    rel_unit,
                },
            )
        };
        let offset = gptr.offset as usize;
        if offset.checked_add(nbytes).map_or(true, |end| end > size) {
            return Err(DartError::InvalidArgument(format!(
                "{} bytes at {} exceed the segment size {}",
                nbytes, gptr, size
            )));
        }
        Ok(Target {
            unit,
            segment,
            offset,
            channel,
        })
    }

    /// Queue selection: an empty queue if there is one, else the least loaded queue, waiting
    /// for it to drain when every queue is full.
    pub(crate) fn select_queue(&self) -> DartResult<usize> {
        let max = self.transport.queue_size_max();
        let mut min_queue = 0;
        let mut min_size = usize::MAX;
        for queue in 0..self.transport.queue_num() {
            let size = self.transport.queue_size(queue)?;
            if size == 0 {
                return Ok(queue);
            }
            if size < min_size {
                min_size = size;
                min_queue = queue;
            }
        }
        if min_size >= max {
            debug!("every queue is full, draining queue {}", min_queue);
            self.transport.wait(min_queue)?;
        }
        Ok(min_queue)
    }

    fn local_ptr(&self, target: &Target) -> DartResult<*mut u8> {
        Ok(unsafe { self.transport.segment_ptr(target.segment)?.add(target.offset) })
    }

    /// Post a read into a fresh staging block, `None` if the transfer completed immediately.
    ///
    /// # Safety
    /// `dest` must stay valid until the returned transfer completes.
    unsafe fn start_get(
        &self,
        state: &mut DartState,
        dest: &mut [u8],
        gptr: GlobalPtr,
    ) -> DartResult<Option<(HandleInfo, Channel)>> {
        let nbytes = dest.len();
        let target = self.resolve(state, gptr, nbytes)?;
        if nbytes == 0 {
            return Ok(None);
        }
        if target.unit == self.my_unit {
            let src = self.local_ptr(&target)?;
            std::ptr::copy(src as *const u8, dest.as_mut_ptr(), nbytes);
            trace!("local get of {} bytes from {}", nbytes, gptr);
            return Ok(None);
        }
        let staging = state.pool.alloc(nbytes).ok_or_else(|| exhausted(nbytes))?;
        let posted = self.select_queue().and_then(|queue| {
            self.transport
                .read(
                    queue,
                    RmaRequest {
                        local_segment: TRANSFER_SEGMENT,
                        local_offset: staging,
                        unit: target.unit,
                        remote_segment: target.segment,
                        remote_offset: target.offset,
                        len: nbytes,
                    },
                )
                .map(|_| queue)
                .map_err(DartError::from)
        });
        let queue = match posted {
            Ok(queue) => queue,
            Err(e) => {
                release_staging(&mut state.pool, staging);
                return Err(e);
            }
        };
        trace!(
            "get {} bytes from {} via queue {} staging {}",
            nbytes,
            gptr,
            queue,
            staging
        );
        let info = HandleInfo {
            segment: TRANSFER_SEGMENT,
            offset: staging,
            queue,
            nbytes,
            dest: NonNull::new(dest.as_mut_ptr()).map(DestPtr),
        };
        Ok(Some((info, target.channel)))
    }

    /// Copy `src` into a fresh staging block and post a write, `None` if the transfer completed
    /// immediately.
    fn start_put(
        &self,
        state: &mut DartState,
        gptr: GlobalPtr,
        src: &[u8],
    ) -> DartResult<Option<(HandleInfo, Channel)>> {
        let nbytes = src.len();
        let target = self.resolve(state, gptr, nbytes)?;
        if nbytes == 0 {
            return Ok(None);
        }
        if target.unit == self.my_unit {
            let dst = self.local_ptr(&target)?;
            unsafe { std::ptr::copy(src.as_ptr(), dst, nbytes) };
            trace!("local put of {} bytes to {}", nbytes, gptr);
            return Ok(None);
        }
        let staging = state.pool.alloc(nbytes).ok_or_else(|| exhausted(nbytes))?;
        let posted = self
            .transport
            .segment_ptr(TRANSFER_SEGMENT)
            .map_err(DartError::from)
            .and_then(|base| {
                unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(staging), nbytes) };
                self.select_queue()
            })
            .and_then(|queue| {
                self.transport
                    .write(
                        queue,
                        RmaRequest {
                            local_segment: TRANSFER_SEGMENT,
                            local_offset: staging,
                            unit: target.unit,
                            remote_segment: target.segment,
                            remote_offset: target.offset,
                            len: nbytes,
                        },
                    )
                    .map(|_| queue)
                    .map_err(DartError::from)
            });
        let queue = match posted {
            Ok(queue) => queue,
            Err(e) => {
                release_staging(&mut state.pool, staging);
                return Err(e);
            }
        };
        trace!(
            "put {} bytes to {} via queue {} staging {}",
            nbytes,
            gptr,
            queue,
            staging
        );
        let info = HandleInfo {
            segment: TRANSFER_SEGMENT,
            offset: staging,
            queue,
            nbytes,
            dest: None,
        };
        Ok(Some((info, target.channel)))
    }

    /// Copy a landed get to its destination and release the staging block.
    fn finish(&self, pool: &mut BuddyAlloc, info: HandleInfo) -> DartResult<()> {
        if let Some(dest) = info.dest {
            let staging = self.transport.segment_ptr(info.segment)?;
            unsafe {
                std::ptr::copy_nonoverlapping(
                    staging.add(info.offset) as *const u8,
                    dest.0.as_ptr(),
                    info.nbytes,
                )
            };
            trace!("copied {} staged bytes to {:?}", info.nbytes, dest.0);
        }
        release_staging(pool, info.offset);
        Ok(())
    }

    fn complete(&self, pool: &mut BuddyAlloc, info: HandleInfo) -> DartResult<()> {
        self.transport.wait(info.queue)?;
        self.finish(pool, info)
    }

    /// Complete the transfers outstanding in `queue` at entry, in order.
    pub(crate) fn drain(&self, pool: &mut BuddyAlloc, queue: &mut HandleQueue) -> DartResult<()> {
        let outstanding = queue.len();
        for _ in 0..outstanding {
            let Some(info) = queue.front() else {
                break;
            };
            self.complete(pool, info)?;
            queue.dequeue();
        }
        Ok(())
    }

    pub(crate) fn drain_all(&self, state: &mut DartState) -> DartResult<()> {
        let DartState {
            pool,
            teams,
            peer_queues,
            ..
        } = state;
        for queue in peer_queues.iter_mut().filter(|q| !q.is_empty()) {
            self.drain(pool, queue)?;
        }
        for slot in teams.slots_mut() {
            for entry in slot.table.entries_mut() {
                for queue in entry.queues.iter_mut().filter(|q| !q.is_empty()) {
                    self.drain(pool, queue)?;
                }
            }
        }
        Ok(())
    }

    /// Start copying `dest.len()` bytes at `gptr` into `dest`.
    ///
    /// The transfer completes with the next `flush_local` on the channel of `gptr`.
    ///
    /// # Safety
    /// `dest` must stay valid, and must not be read or written, until the transfer has been
    /// completed by `flush_local`, `flush_local_all` or `exit`.
    #[tracing::instrument(skip_all, level = "debug")]
    pub unsafe fn get(&self, dest: &mut [u8], gptr: GlobalPtr) -> DartResult<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if let Some((info, channel)) = self.start_get(state, dest, gptr)? {
            fifo(&mut state.teams, &mut state.peer_queues, channel)?.enqueue(info);
        }
        Ok(())
    }

    /// Start copying `src` to `gptr`. `src` may be reused as soon as this returns.
    ///
    /// The transfer completes locally with the next `flush_local` on the channel of `gptr`;
    /// remote visibility requires a subsequent barrier.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn put(&self, gptr: GlobalPtr, src: &[u8]) -> DartResult<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if let Some((info, channel)) = self.start_put(state, gptr, src)? {
            fifo(&mut state.teams, &mut state.peer_queues, channel)?.enqueue(info);
        }
        Ok(())
    }

    /// Like [`get`](Dart::get), completion is driven through the returned handle.
    ///
    /// # Safety
    /// `dest` must stay valid, and must not be read or written, until the handle has been
    /// completed by `wait_local` or a successful `test_local`.
    #[tracing::instrument(skip_all, level = "debug")]
    pub unsafe fn get_handle(&self, dest: &mut [u8], gptr: GlobalPtr) -> DartResult<Handle> {
        let mut state = self.lock()?;
        Ok(match self.start_get(&mut state, dest, gptr)? {
            Some((info, _)) => Handle::pending(info),
            None => Handle::null(),
        })
    }

    /// Like [`put`](Dart::put), completion is driven through the returned handle.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn put_handle(&self, gptr: GlobalPtr, src: &[u8]) -> DartResult<Handle> {
        let mut state = self.lock()?;
        Ok(match self.start_put(&mut state, gptr, src)? {
            Some((info, _)) => Handle::pending(info),
            None => Handle::null(),
        })
    }

    /// Copy `dest.len()` bytes at `gptr` into `dest` and return once they have arrived.
    ///
    /// Transfers larger than the transfer pool are staged in a temporary segment.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn get_blocking(&self, dest: &mut [u8], gptr: GlobalPtr) -> DartResult<()> {
        let nbytes = dest.len();
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let target = self.resolve(state, gptr, nbytes)?;
        if nbytes == 0 {
            return Ok(());
        }
        if target.unit == self.my_unit {
            let src = self.local_ptr(&target)?;
            unsafe { std::ptr::copy(src as *const u8, dest.as_mut_ptr(), nbytes) };
            return Ok(());
        }
        if nbytes > state.pool.capacity() {
            let segment = state.seg_ids.pop().ok_or_else(|| {
                DartError::ResourceExhausted("no segment id left for staging".to_owned())
            })?;
            let res = self
                .transport
                .segment_alloc(segment, nbytes)
                .map_err(DartError::from)
                .and_then(|_| {
                    let res = self.read_now(segment, 0, &target, dest);
                    self.transport.segment_delete(segment)?;
                    res
                });
            if !state.seg_ids.push(segment) {
                warn!("staging segment id {} returned to a full id pool", segment);
            }
            res
        } else {
            let staging = state.pool.alloc(nbytes).ok_or_else(|| exhausted(nbytes))?;
            let res = self.read_now(TRANSFER_SEGMENT, staging, &target, dest);
            release_staging(&mut state.pool, staging);
            res
        }
    }

    fn read_now(
        &self,
        segment: SegmentId,
        offset: usize,
        target: &Target,
        dest: &mut [u8],
    ) -> DartResult<()> {
        let queue = self.select_queue()?;
        self.transport.read(
            queue,
            RmaRequest {
                local_segment: segment,
                local_offset: offset,
                unit: target.unit,
                remote_segment: target.segment,
                remote_offset: target.offset,
                len: dest.len(),
            },
        )?;
        self.transport.wait(queue)?;
        let staging = self.transport.segment_ptr(segment)?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                staging.add(offset) as *const u8,
                dest.as_mut_ptr(),
                dest.len(),
            )
        };
        trace!("blocking get of {} bytes via queue {}", dest.len(), queue);
        Ok(())
    }

    /// A blocking put would need remote completion, which the transport does not provide.
    pub fn put_blocking(&self, _gptr: GlobalPtr, _src: &[u8]) -> DartResult<()> {
        Err(DartError::NotSupported("put_blocking"))
    }

    /// Block until the transfer of `handle` is locally complete. A null handle is complete.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn wait_local(&self, mut handle: Handle) -> DartResult<()> {
        let Some(info) = handle.info.take() else {
            return Ok(());
        };
        let mut state = self.lock()?;
        self.complete(&mut state.pool, info)
    }

    /// Complete every handle, leaving them null.
    pub fn waitall_local(&self, handles: &mut [Handle]) -> DartResult<()> {
        let mut state = self.lock()?;
        for handle in handles.iter_mut() {
            if let Some(info) = handle.info.take() {
                self.complete(&mut state.pool, info)?;
            }
        }
        Ok(())
    }

    /// Make progress on the transfer of `handle` without blocking.
    ///
    /// Returns `true` (and nulls the handle) once the transfer is locally complete; a null
    /// handle is complete.
    pub fn test_local(&self, handle: &mut Handle) -> DartResult<bool> {
        let Some(info) = handle.info else {
            return Ok(true);
        };
        let mut state = self.lock()?;
        if !self.transport.test(info.queue)? {
            return Ok(false);
        }
        handle.info = None;
        self.finish(&mut state.pool, info)?;
        Ok(true)
    }

    /// `true` once every handle is complete.
    pub fn testall_local(&self, handles: &mut [Handle]) -> DartResult<bool> {
        let mut done = true;
        for handle in handles.iter_mut() {
            done &= self.test_local(handle)?;
        }
        Ok(done)
    }

    /// Complete the transfers outstanding towards the channel of `gptr` when called.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn flush_local(&self, gptr: GlobalPtr) -> DartResult<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let target = self.resolve(state, gptr, 0)?;
        let DartState {
            pool,
            teams,
            peer_queues,
            ..
        } = state;
        let queue = fifo(teams, peer_queues, target.channel)?;
        self.drain(pool, queue)
    }

    /// [`flush_local`](Dart::flush_local) on every channel.
    pub fn flush_local_all(&self) -> DartResult<()> {
        let mut state = self.lock()?;
        self.drain_all(&mut state)
    }

    /// Number of fire-and-forget transfers outstanding towards the channel of `gptr`.
    pub fn outstanding(&self, gptr: GlobalPtr) -> DartResult<usize> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let target = self.resolve(state, gptr, 0)?;
        Ok(fifo(&mut state.teams, &mut state.peer_queues, target.channel)?.len())
    }

    /// Remote completion is not provided by the transport.
    pub fn wait(&self, _handle: &mut Handle) -> DartResult<()> {
        Err(DartError::NotSupported("wait"))
    }

    /// Remote completion is not provided by the transport.
    pub fn waitall(&self, _handles: &mut [Handle]) -> DartResult<()> {
        Err(DartError::NotSupported("waitall"))
    }

    /// Remote completion is not provided by the transport.
    pub fn flush(&self, _gptr: GlobalPtr) -> DartResult<()> {
        Err(DartError::NotSupported("flush"))
    }

    /// Remote completion is not provided by the transport.
    pub fn flush_all(&self) -> DartResult<()> {
        Err(DartError::NotSupported("flush_all"))
    }
}

#[cfg(test)]
mod tests {
    use crate::dart::{DartErrorCode, TEAM_ALL};
    use crate::env_var::Config;
    use crate::transport::local::launch;

    fn test_config() -> Config {
        Config {
            transfer_pool_size: 1 << 12,
            num_queues: 2,
            queue_depth: 2,
            deadlock_timeout: 10.0,
            ..Config::default()
        }
    }

    #[test]
    fn private_put_then_get() {
        let results = launch(2, test_config(), |dart| {
            let me = dart.my_id();
            let mine = dart.memalloc(8).unwrap();
            let addr = dart.gptr_getaddr(mine).unwrap();
            unsafe { std::ptr::write_bytes(addr, me as u8 + 1, 8) };
            let mut gptrs = [0u8; 32];
            // publish the pointers through a collective segment
            let table = dart.team_memalloc_aligned(TEAM_ALL, 32).unwrap();
            let mut slot = table;
            slot.set_unit(0);
            slot.set_offset(16 * me as u64);
            let mut h = dart.put_handle(slot, &mine.to_bits().to_le_bytes()).unwrap();
            while !dart.test_local(&mut h).unwrap() {}
            dart.barrier(TEAM_ALL).unwrap();
            let mut root = table;
            root.set_unit(0);
            dart.get_blocking(&mut gptrs, root).unwrap();
            let other = 1 - me;
            let bits = u128::from_le_bytes(gptrs[16 * other..16 * other + 16].try_into().unwrap());
            let remote = crate::dart::GlobalPtr::from_bits(bits);
            let mut buf = [0u8; 8];
            let h = unsafe { dart.get_handle(&mut buf, remote).unwrap() };
            dart.wait_local(h).unwrap();
            dart.barrier(TEAM_ALL).unwrap();
            dart.team_memfree(TEAM_ALL, table).unwrap();
            dart.memfree(mine).unwrap();
            buf
        });
        assert_eq!(results[0], [2u8; 8]);
        assert_eq!(results[1], [1u8; 8]);
    }

    #[test]
    fn unsupported_operations() {
        launch(1, test_config(), |dart| {
            let gptr = dart.memalloc(4).unwrap();
            assert_eq!(
                dart.put_blocking(gptr, &[1]).unwrap_err().code(),
                DartErrorCode::NotSupported
            );
            assert_eq!(
                dart.flush(gptr).unwrap_err().code(),
                DartErrorCode::NotSupported
            );
            assert_eq!(
                dart.flush_all().unwrap_err().code(),
                DartErrorCode::NotSupported
            );
            let mut h = crate::dart::Handle::null();
            assert_eq!(dart.wait(&mut h).unwrap_err().code(), DartErrorCode::NotSupported);
            assert_eq!(
                dart.waitall(&mut []).unwrap_err().code(),
                DartErrorCode::NotSupported
            );
            assert!(dart.test_local(&mut h).unwrap());
            dart.wait_local(h).unwrap();
        });
    }

    #[test]
    fn out_of_range_access_is_rejected() {
        launch(2, test_config(), |dart| {
            let seg = dart.team_memalloc_aligned(TEAM_ALL, 16).unwrap();
            let mut buf = [0u8; 8];
            let past_end = seg.add(12);
            assert_eq!(
                dart.get_blocking(&mut buf, past_end).unwrap_err().code(),
                DartErrorCode::InvalidArgument
            );
            let mut bad_unit = seg;
            bad_unit.set_unit(9);
            assert_eq!(
                dart.put(bad_unit, &buf).unwrap_err().code(),
                DartErrorCode::InvalidArgument
            );
            let mut bad_seg = seg;
            bad_seg.segid += 40;
            assert!(dart.flush_local(bad_seg).is_err());
            assert_eq!(dart.transfer_pool_used(), 0);
            dart.team_memfree(TEAM_ALL, seg).unwrap();
        });
    }

    #[test]
    fn pool_exhaustion_is_recoverable() {
        launch(2, test_config(), |dart| {
            let seg = dart.team_memalloc_aligned(TEAM_ALL, 4096).unwrap();
            let mut remote = seg;
            remote.set_unit(1 - dart.my_id());
            let src = vec![7u8; 2048];
            dart.put(remote, &src).unwrap();
            let err = dart.put(remote.add(2048), &src).unwrap_err();
            assert_eq!(err.code(), DartErrorCode::ResourceExhausted);
            dart.flush_local(remote).unwrap();
            dart.put(remote.add(2048), &src).unwrap();
            dart.flush_local(remote).unwrap();
            dart.barrier(TEAM_ALL).unwrap();
            let mut check = vec![0u8; 4096];
            let mut mine = seg;
            mine.set_unit(dart.my_id());
            dart.get_blocking(&mut check, mine).unwrap();
            assert!(check.iter().all(|b| *b == 7));
            dart.team_memfree(TEAM_ALL, seg).unwrap();
        });
    }

    #[test]
    fn repeated_flush_is_a_no_op() {
        let results = launch(2, test_config(), |dart| {
            let seg = dart.team_memalloc_aligned(TEAM_ALL, 32).unwrap();
            let mut mine = seg;
            mine.set_unit(dart.my_id());
            let data: Vec<u8> = (0..32).map(|i| (dart.my_id() * 32 + i) as u8).collect();
            dart.put(mine, &data).unwrap();
            dart.flush_local(mine).unwrap();
            dart.barrier(TEAM_ALL).unwrap();

            let mut remote = seg;
            remote.set_unit(1 - dart.my_id());
            let mut buf = [0u8; 32];
            for (i, chunk) in buf.chunks_mut(8).enumerate() {
                unsafe { dart.get(chunk, remote.add(8 * i as i64)).unwrap() };
            }
            assert_eq!(dart.outstanding(remote).unwrap(), 4);
            dart.flush_local(remote).unwrap();
            assert_eq!(dart.outstanding(remote).unwrap(), 0);
            let used = dart.transfer_pool_used();
            let stats = dart.transport_stats();
            dart.flush_local(remote).unwrap();
            assert_eq!(dart.outstanding(remote).unwrap(), 0);
            assert_eq!(dart.transfer_pool_used(), used);
            assert_eq!(used, 0);
            assert_eq!(dart.transport_stats(), stats);
            dart.barrier(TEAM_ALL).unwrap();
            dart.team_memfree(TEAM_ALL, seg).unwrap();
            buf
        });
        for (unit, buf) in results.iter().enumerate() {
            let other = 1 - unit;
            let expected: Vec<u8> = (0..32).map(|i| (other * 32 + i) as u8).collect();
            assert_eq!(buf.to_vec(), expected);
        }
    }

    #[test]
    fn large_blocking_get_uses_a_temporary_segment() {
        launch(2, test_config(), |dart| {
            let seg = dart.team_memalloc_aligned(TEAM_ALL, 3 * 4096).unwrap();
            let mut mine = seg;
            mine.set_unit(dart.my_id());
            let data: Vec<u8> = (0..3 * 4096).map(|i| (i % 251) as u8).collect();
            dart.put(mine, &data).unwrap();
            dart.barrier(TEAM_ALL).unwrap();
            let mut remote = seg;
            remote.set_unit(1 - dart.my_id());
            let mut out = vec![0u8; 3 * 4096];
            dart.get_blocking(&mut out, remote).unwrap();
            assert_eq!(out, data);
            assert_eq!(dart.transfer_pool_used(), 0);
            dart.barrier(TEAM_ALL).unwrap();
            dart.team_memfree(TEAM_ALL, seg).unwrap();
        });
    }
}
