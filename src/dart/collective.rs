use super::error::{DartError, DartResult};
use super::gptr::GlobalPtr;
use super::runtime::{Dart, DartState};
use super::team::TeamId;
use super::translation::{LogicalSegId, SegmentEntry};
use crate::transport::{GroupHandle, SegmentId, TransportGroup, TransportSegment};

use tracing::{debug, warn};

impl Dart {
    /// Block until every member of `team` has entered the barrier.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn barrier(&self, team: TeamId) -> DartResult<()> {
        let state = self.lock()?;
        let handle = &state.teams.team(team)?.handle;
        self.transport.barrier(handle)?;
        Ok(())
    }

    /// Not provided by this backend.
    pub fn bcast(&self, _team: TeamId, _buf: &mut [u8], _root: usize) -> DartResult<()> {
        Err(DartError::NotSupported("bcast"))
    }

    /// Not provided by this backend.
    pub fn scatter(
        &self,
        _team: TeamId,
        _send: &[u8],
        _recv: &mut [u8],
        _root: usize,
    ) -> DartResult<()> {
        Err(DartError::NotSupported("scatter"))
    }

    /// Not provided by this backend.
    pub fn gather(
        &self,
        _team: TeamId,
        _send: &[u8],
        _recv: &mut [u8],
        _root: usize,
    ) -> DartResult<()> {
        Err(DartError::NotSupported("gather"))
    }

    /// Not provided by this backend.
    pub fn allgather(&self, _team: TeamId, _send: &[u8], _recv: &mut [u8]) -> DartResult<()> {
        Err(DartError::NotSupported("allgather"))
    }

    /// Runtime-internal allgather of one serialisable value per team member.
    pub(crate) fn team_allgather<T>(&self, team: TeamId, value: &T) -> DartResult<Vec<T>>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let handle = {
            let state = self.lock()?;
            state.teams.team(team)?.handle.clone()
        };
        let gathered = self
            .transport
            .allgather(&handle, &crate::serialize(value)?)?;
        gathered
            .iter()
            .map(|bytes| crate::deserialize::<T>(bytes).map_err(DartError::from))
            .collect()
    }

    /// Allocate `nbytes` on every member of `team`, collective over the team.
    ///
    /// The returned pointer designates offset 0 of the segment on team unit 0.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn team_memalloc_aligned(&self, team: TeamId, nbytes: usize) -> DartResult<GlobalPtr> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let index = state.teams.convert(team)?;
        let handle = state.teams.slot(index)?.handle.clone();
        let id = state.seg_ids.pop().ok_or_else(|| {
            DartError::ResourceExhausted("no segment id left for a collective allocation".into())
        })?;
        if let Err(e) = self.transport.segment_create(id, nbytes, &handle) {
            state.seg_ids.push(id);
            return Err(e.into());
        }
        match self.register_segment(state, index, &handle, id, nbytes) {
            Ok(gptr) => {
                debug!(
                    "unit {} allocated segment {} ({} bytes, transport id {}) on team {}, {} left",
                    self.my_unit,
                    gptr.segid,
                    nbytes,
                    id,
                    team,
                    state.seg_ids.available()
                );
                Ok(gptr)
            }
            Err(e) => {
                if let Err(del) = self.transport.segment_delete(id) {
                    warn!("failed to delete segment {} after a failed allocation: {}", id, del);
                }
                if !state.seg_ids.push(id) {
                    warn!("segment id {} returned to a full id pool", id);
                }
                Err(e)
            }
        }
    }

    /// Agree on the transport ids of a freshly created segment and enter it in the
    /// translation table of team slot `index`.
    fn register_segment(
        &self,
        state: &mut DartState,
        index: usize,
        handle: &GroupHandle,
        id: SegmentId,
        nbytes: usize,
    ) -> DartResult<GlobalPtr> {
        let gathered = self.transport.allgather(handle, &crate::serialize(&id)?)?;
        let segments = gathered
            .iter()
            .map(|bytes| crate::deserialize::<SegmentId>(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        // the logical id is the one popped by team unit 0
        let segid = segments.first().copied().ok_or_else(|| {
            DartError::Other(format!("team slot {} returned no segment ids", index))
        })? as LogicalSegId;
        let slot = state.teams.slot_mut(index)?;
        slot.table
            .add(SegmentEntry::new(segid, nbytes, id, segments))?;
        let owner = slot.l2g(0)?;
        Ok(GlobalPtr::new(owner, segid, index as u16, 0))
    }

    /// Free a collective allocation of `team`, collective over the team.
    ///
    /// Outstanding local transfers towards the segment are completed first.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn team_memfree(&self, team: TeamId, gptr: GlobalPtr) -> DartResult<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let index = state.teams.convert(team)?;
        if gptr.is_private() || gptr.team_index() != index {
            return Err(DartError::InvalidArgument(format!(
                "{} is not a collective allocation of team {}",
                gptr, team
            )));
        }
        {
            let DartState { pool, teams, .. } = &mut *state;
            let entry = teams.slot_mut(index)?.table.get_mut(gptr.segid)?;
            for queue in entry.queues.iter_mut() {
                self.drain(pool, queue)?;
            }
        }
        let handle = state.teams.slot(index)?.handle.clone();
        self.transport.barrier(&handle)?;
        let entry = state.teams.slot_mut(index)?.table.remove(gptr.segid)?;
        self.release_segment(&mut state.seg_ids, entry)
    }
}
