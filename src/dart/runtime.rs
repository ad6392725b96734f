use super::buddy::BuddyAlloc;
use super::error::{DartError, DartResult};
use super::gptr::GlobalPtr;
use super::group::{Group, UnitArch};
use super::handle::HandleQueue;
use super::locality::UnitLocality;
use super::seg_stack::SegmentIdStack;
use super::team::{TeamId, TeamRegistry, TeamSlot, TEAM_ALL};
use super::translation::SegmentEntry;
use crate::env_var::{config, Config};
use crate::transport::local::LocalFabric;
use crate::transport::{
    Backend, SegmentId, Transport, TransportGroup, TransportInfo, TransportSegment,
    TransportStats,
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

/// Transport id of the private transfer segment of every unit.
pub(crate) const TRANSFER_SEGMENT: SegmentId = 0;

/// Builder for the runtime of the calling unit.
///
/// Without an explicit transport the runtime runs as the only unit of a fresh local fabric.
#[derive(Debug, Default)]
pub struct DartBuilder {
    config: Option<Config>,
    transport: Option<Transport>,
    locality: Option<UnitLocality>,
}

impl DartBuilder {
    pub fn new() -> DartBuilder {
        DartBuilder::default()
    }

    /// Use `config` instead of the environment configuration.
    pub fn with_config(mut self, config: Config) -> DartBuilder {
        self.config = Some(config);
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> DartBuilder {
        self.transport = Some(transport);
        self
    }

    /// Capacity description published by [`Dart::team_locality`].
    pub fn with_locality(mut self, locality: UnitLocality) -> DartBuilder {
        self.locality = Some(locality);
        self
    }

    /// Bring up the runtime, collective over every unit of the transport.
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> DartResult<Dart> {
        let mut config = self.config.unwrap_or_else(|| config().clone());
        if !config.transfer_pool_size.is_power_of_two() {
            let rounded = config
                .transfer_pool_size
                .max(1)
                .checked_next_power_of_two()
                .ok_or_else(|| {
                    DartError::InvalidArgument(format!(
                        "transfer pool size {} is too large",
                        config.transfer_pool_size
                    ))
                })?;
            warn!(
                "transfer pool size {} is not a power of two, using {}",
                config.transfer_pool_size, rounded
            );
            config.transfer_pool_size = rounded;
        }
        if config.transfer_pool_size < 2 {
            return Err(DartError::InvalidArgument(format!(
                "transfer pool of {} bytes leaves no room next to the reserved null byte",
                config.transfer_pool_size
            )));
        }
        if config.max_segments < 2 || config.max_segments > i16::MAX as usize + 1 {
            return Err(DartError::InvalidArgument(format!(
                "max_segments must be within [2, {}], got {}",
                i16::MAX as usize + 1,
                config.max_segments
            )));
        }
        let transport = match self.transport {
            Some(transport) => transport,
            None => LocalFabric::new(1, config.clone()).transport(0),
        };
        let my_unit = transport.my_unit();
        let num_units = transport.num_units();

        let all_units: Vec<usize> = (0..num_units).collect();
        let handle = transport.group_create(&all_units)?;
        transport.segment_alloc(TRANSFER_SEGMENT, config.transfer_pool_size)?;
        let mut pool = BuddyAlloc::new(
            format!("unit {} transfer pool", my_unit),
            config.transfer_pool_size,
        );
        // offset 0 of the private segment stays reserved so that no allocation aliases NULL
        if pool.alloc(1) != Some(0) {
            error!("unit {} could not reserve the null byte of its transfer pool", my_unit);
            return Err(DartError::Other(
                "the null byte of the transfer pool is not available".to_owned(),
            ));
        }

        let all = TeamSlot::new(
            TEAM_ALL,
            Group::from_units(all_units),
            handle.clone(),
            num_units,
        );
        let state = DartState {
            pool,
            seg_ids: SegmentIdStack::new(1, config.max_segments as SegmentId),
            teams: TeamRegistry::new(config.max_teams, all),
            peer_queues: vec![HandleQueue::new(); num_units],
            exited: false,
        };
        transport.barrier(&handle)?;
        debug!(
            "unit {} of {} initialized ({} byte transfer pool, {} queues of depth {})",
            my_unit, num_units, config.transfer_pool_size, config.num_queues, config.queue_depth
        );
        Ok(Dart {
            transport,
            my_unit,
            num_units,
            locality: self.locality.unwrap_or_else(UnitLocality::host),
            config,
            state: Mutex::new(state),
        })
    }
}

/// Mutable runtime state, only touched by the unit owning the runtime.
pub(crate) struct DartState {
    pub(crate) pool: BuddyAlloc,
    pub(crate) seg_ids: SegmentIdStack,
    pub(crate) teams: TeamRegistry,
    /// Outstanding transfers towards the private segment of every unit.
    pub(crate) peer_queues: Vec<HandleQueue>,
    pub(crate) exited: bool,
}

/// The RMA runtime of one unit.
///
/// Owns the transport endpoint, the transfer pool, the segment-id stack, the team registry
/// (with the translation table of every team) and the per-peer transfer queues. All state
/// lives here; every operation of the runtime is a method.
pub struct Dart {
    pub(crate) transport: Transport,
    pub(crate) config: Config,
    pub(crate) my_unit: usize,
    pub(crate) num_units: usize,
    pub(crate) locality: UnitLocality,
    pub(crate) state: Mutex<DartState>,
}

impl std::fmt::Debug for Dart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dart")
            .field("my_unit", &self.my_unit)
            .field("num_units", &self.num_units)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Dart {
    pub(crate) fn lock(&self) -> DartResult<MutexGuard<'_, DartState>> {
        let state = self.state.lock();
        if state.exited {
            error!("unit {} used the runtime after exit", self.my_unit);
            return Err(DartError::Other("the runtime has exited".to_owned()));
        }
        Ok(state)
    }

    /// Absolute id of the calling unit.
    pub fn my_id(&self) -> usize {
        self.my_unit
    }

    /// Number of units in the all-team.
    pub fn size(&self) -> usize {
        self.num_units
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.transport.backend()
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    pub fn locality(&self) -> UnitLocality {
        self.locality
    }

    pub fn is_exited(&self) -> bool {
        self.state.lock().exited
    }

    /// Bytes currently reserved in the transfer pool.
    pub fn transfer_pool_used(&self) -> usize {
        // minus the reserved null byte
        self.state.lock().pool.allocated().saturating_sub(1)
    }

    pub fn team_myid(&self, team: TeamId) -> DartResult<usize> {
        Ok(self.lock()?.teams.team(team)?.myid)
    }

    pub fn team_size(&self, team: TeamId) -> DartResult<usize> {
        Ok(self.lock()?.teams.team(team)?.size())
    }

    pub fn team_get_group(&self, team: TeamId) -> DartResult<Group> {
        Ok(self.lock()?.teams.team(team)?.group.clone())
    }

    /// Absolute id of the team-relative unit `rel_unit`.
    pub fn team_unit_l2g(&self, team: TeamId, rel_unit: usize) -> DartResult<usize> {
        self.lock()?.teams.team(team)?.l2g(rel_unit)
    }

    /// Team-relative id of the absolute unit `abs_unit`.
    pub fn team_unit_g2l(&self, team: TeamId, abs_unit: usize) -> DartResult<usize> {
        self.lock()?.teams.team(team)?.g2l(abs_unit)
    }

    /// Team-list index of `team`, the value carried in the flags of its global pointers.
    pub fn team_index(&self, team: TeamId) -> DartResult<usize> {
        self.lock()?.teams.convert(team)
    }

    /// Create a team out of `group`, collective over `parent`.
    ///
    /// Every unit of `parent` must call this with the same group. Members receive the id of
    /// the new team, the other units `None`.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn team_create(&self, parent: TeamId, group: &Group) -> DartResult<Option<TeamId>> {
        let mut state = self.lock()?;
        let (handle, parent_group) = {
            let slot = state.teams.team(parent)?;
            (slot.handle.clone(), slot.group.clone())
        };
        if !group.is_subset(&parent_group) {
            return Err(DartError::InvalidArgument(format!(
                "group {:?} is not contained in team {}",
                group.members(),
                parent
            )));
        }
        let proposal = state.teams.next_team_id();
        let mut team_id = proposal;
        for bytes in self
            .transport
            .allgather(&handle, &crate::serialize(&proposal)?)?
        {
            team_id = team_id.max(crate::deserialize::<TeamId>(&bytes)?);
        }
        let next = team_id.checked_add(1).ok_or_else(|| {
            DartError::ResourceExhausted("team ids are exhausted".to_owned())
        })?;
        state.teams.set_next_team_id(next);
        if !group.is_member(self.my_unit) {
            return Ok(None);
        }
        let handle = self.transport.group_create(&group.members())?;
        let slot = TeamSlot::new(team_id, group.clone(), handle, self.num_units);
        let index = state.teams.insert(slot)?;
        debug!(
            "unit {} joined team {} (slot {}) with units {:?}",
            self.my_unit,
            team_id,
            index,
            group.members()
        );
        Ok(Some(team_id))
    }

    /// Create a team of the units of `parent` selected by `arch`, collective over `parent`.
    pub fn team_create_from_arch<A: UnitArch>(
        &self,
        parent: TeamId,
        arch: &A,
    ) -> DartResult<Option<TeamId>> {
        let parent_group = self.team_get_group(parent)?;
        let group = Group::from_arch(&parent_group, arch)
            .map_err(|e| DartError::InvalidArgument(e.to_string()))?;
        self.team_create(parent, &group)
    }

    /// Split `parent` into `n` teams of contiguous units, collective over `parent`.
    ///
    /// Returns the team of the calling unit.
    pub fn team_split(&self, parent: TeamId, n: usize) -> DartResult<Option<TeamId>> {
        if n == 0 {
            return Err(DartError::InvalidArgument(
                "cannot split a team into 0 parts".to_owned(),
            ));
        }
        let parts = self.team_get_group(parent)?.split(n);
        let mut mine = None;
        for part in parts.iter() {
            if let Some(team) = self.team_create(parent, part)? {
                mine = Some(team);
            }
        }
        Ok(mine)
    }

    /// Destroy `team`, collective over its members. Remaining collective segments of the team
    /// are released.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn team_destroy(&self, team: TeamId) -> DartResult<()> {
        if team == TEAM_ALL {
            return Err(DartError::InvalidArgument(
                "the all-team cannot be destroyed".to_owned(),
            ));
        }
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let index = state.teams.convert(team)?;
        {
            let DartState { pool, teams, .. } = &mut *state;
            for entry in teams.slot_mut(index)?.table.entries_mut() {
                for queue in entry.queues.iter_mut() {
                    self.drain(pool, queue)?;
                }
            }
        }
        let handle = state.teams.slot(index)?.handle.clone();
        self.transport.barrier(&handle)?;
        let mut slot = state.teams.remove(index)?;
        for segid in slot.table.segids() {
            let entry = slot.table.remove(segid)?;
            self.release_segment(&mut state.seg_ids, entry)?;
        }
        self.transport.group_delete(slot.handle)?;
        debug!("unit {} left team {}", self.my_unit, team);
        Ok(())
    }

    pub(crate) fn release_segment(
        &self,
        seg_ids: &mut SegmentIdStack,
        entry: SegmentEntry,
    ) -> DartResult<()> {
        self.transport.segment_delete(entry.own_segment)?;
        if !seg_ids.push(entry.own_segment) {
            warn!(
                "segment id {} returned to a full id pool",
                entry.own_segment
            );
        }
        debug!(
            "unit {} released segment {} ({} bytes)",
            self.my_unit, entry.segid, entry.size
        );
        Ok(())
    }

    /// Allocate `nbytes` in the private segment of the calling unit.
    pub fn memalloc(&self, nbytes: usize) -> DartResult<GlobalPtr> {
        let mut state = self.lock()?;
        let offset = state.pool.alloc(nbytes).ok_or_else(|| {
            DartError::ResourceExhausted(format!(
                "private segment cannot serve {} bytes",
                nbytes
            ))
        })?;
        Ok(GlobalPtr::new(self.my_unit, 0, 0, offset as u64))
    }

    pub fn memfree(&self, gptr: GlobalPtr) -> DartResult<()> {
        if !gptr.is_private() || gptr.unit() != self.my_unit {
            return Err(DartError::InvalidArgument(format!(
                "{} was not allocated by memalloc on unit {}",
                gptr, self.my_unit
            )));
        }
        let mut state = self.lock()?;
        state
            .pool
            .free(gptr.offset as usize)
            .map_err(|e| DartError::InvalidArgument(e.to_string()))
    }

    fn local_segment_of(&self, state: &DartState, gptr: GlobalPtr) -> DartResult<SegmentId> {
        if gptr.unit() != self.my_unit {
            return Err(DartError::InvalidArgument(format!(
                "{} does not point into unit {}",
                gptr, self.my_unit
            )));
        }
        if gptr.is_private() {
            return Ok(TRANSFER_SEGMENT);
        }
        state
            .teams
            .slot(gptr.team_index())?
            .table
            .own_segment(gptr.segid)
    }

    /// Local address of `gptr`, which must designate memory of the calling unit.
    pub fn gptr_getaddr(&self, gptr: GlobalPtr) -> DartResult<*mut u8> {
        let state = self.lock()?;
        let segment = self.local_segment_of(&state, gptr)?;
        let size = self.transport.segment_size(segment)?;
        let offset = gptr.offset as usize;
        if offset > size {
            return Err(DartError::InvalidArgument(format!(
                "{} is past the end of its segment",
                gptr
            )));
        }
        Ok(unsafe { self.transport.segment_ptr(segment)?.add(offset) })
    }

    /// Point `gptr` at the local address `addr` inside its segment.
    pub fn gptr_setaddr(&self, gptr: &mut GlobalPtr, addr: *const u8) -> DartResult<()> {
        let state = self.lock()?;
        let segment = self.local_segment_of(&state, *gptr)?;
        let base = self.transport.segment_ptr(segment)? as usize;
        let size = self.transport.segment_size(segment)?;
        let addr = addr as usize;
        if addr < base || addr > base + size {
            return Err(DartError::InvalidArgument(format!(
                "address {:#x} is outside the segment of {}",
                addr, gptr
            )));
        }
        gptr.set_offset((addr - base) as u64);
        Ok(())
    }

    /// Tear down the runtime, collective over every unit.
    ///
    /// Outstanding local transfers are completed, the remaining collective segments are freed
    /// in id order and the transport is closed behind a final barrier. Calling `exit` again is
    /// a no-op.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn exit(&self) -> DartResult<()> {
        let mut state = self.state.lock();
        if state.exited {
            return Ok(());
        }
        let res = self.teardown(&mut state);
        state.exited = true;
        res
    }

    fn teardown(&self, state: &mut DartState) -> DartResult<()> {
        self.drain_all(state)?;
        let all = state.teams.slot(0)?.handle.clone();
        self.transport.barrier(&all)?;
        for index in state.teams.live() {
            let mut slot = state.teams.remove(index)?;
            let mut segids = slot.table.segids();
            segids.sort_unstable();
            for segid in segids {
                let entry = slot.table.remove(segid)?;
                self.release_segment(&mut state.seg_ids, entry)?;
            }
            if index != 0 {
                self.transport.group_delete(slot.handle)?;
            }
        }
        self.transport.segment_delete(TRANSFER_SEGMENT)?;
        self.transport.barrier(&all)?;
        self.transport.group_delete(all)?;
        debug!("unit {} shut down", self.my_unit);
        Ok(())
    }
}

impl Drop for Dart {
    fn drop(&mut self) {
        if self.state.get_mut().exited {
            return;
        }
        if std::thread::panicking() {
            // the other units cannot be relied upon to join a collective teardown
            warn!(
                "unit {} dropped its runtime while panicking, skipping teardown",
                self.my_unit
            );
            self.state.get_mut().exited = true;
            return;
        }
        if let Err(e) = self.exit() {
            error!("unit {} failed to shut down: {}", self.my_unit, e);
        }
    }
}
