use super::error::{DartError, DartResult};
use super::group::Group;
use super::translation::TranslationTable;
use crate::transport::GroupHandle;

/// Numeric team identifier, stable for the lifetime of the team and identical on all members.
pub type TeamId = u16;

/// The team containing every unit.
pub const TEAM_ALL: TeamId = 0;

#[derive(Debug)]
pub(crate) struct TeamSlot {
    pub(crate) team_id: TeamId,
    pub(crate) group: Group,
    pub(crate) handle: GroupHandle,
    /// team-relative -> absolute unit id
    l2g: Vec<usize>,
    /// absolute -> team-relative unit id
    g2l: Vec<Option<usize>>,
    pub(crate) myid: usize,
    pub(crate) table: TranslationTable,
}

impl TeamSlot {
    pub(crate) fn new(
        team_id: TeamId,
        group: Group,
        handle: GroupHandle,
        num_units: usize,
    ) -> TeamSlot {
        let l2g = group.members();
        let mut g2l = vec![None; num_units];
        for (rel, abs) in l2g.iter().enumerate() {
            g2l[*abs] = Some(rel);
        }
        TeamSlot {
            team_id,
            myid: handle.my_index(),
            group,
            handle,
            l2g,
            g2l,
            table: TranslationTable::new(),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.l2g.len()
    }

    pub(crate) fn l2g(&self, rel_unit: usize) -> DartResult<usize> {
        if self.team_id == TEAM_ALL {
            return if rel_unit < self.l2g.len() {
                Ok(rel_unit)
            } else {
                Err(DartError::InvalidArgument(format!(
                    "unit {} is not part of team {}",
                    rel_unit, self.team_id
                )))
            };
        }
        self.l2g.get(rel_unit).copied().ok_or_else(|| {
            DartError::InvalidArgument(format!(
                "unit {} is not part of team {}",
                rel_unit, self.team_id
            ))
        })
    }

    pub(crate) fn g2l(&self, abs_unit: usize) -> DartResult<usize> {
        if self.team_id == TEAM_ALL && abs_unit < self.l2g.len() {
            return Ok(abs_unit);
        }
        self.g2l.get(abs_unit).copied().flatten().ok_or_else(|| {
            DartError::InvalidArgument(format!(
                "unit {} is not a member of team {}",
                abs_unit, self.team_id
            ))
        })
    }

    #[cfg(test)]
    pub(crate) fn units(&self) -> &[usize] {
        &self.l2g
    }
}

/// Team slots indexed by a dense team-list index, slot 0 holds the all-team.
#[derive(Debug)]
pub(crate) struct TeamRegistry {
    slots: Vec<Option<TeamSlot>>,
    next_team_id: TeamId,
}

impl TeamRegistry {
    pub(crate) fn new(max_teams: usize, all: TeamSlot) -> TeamRegistry {
        let mut slots: Vec<Option<TeamSlot>> = (0..max_teams.max(1)).map(|_| None).collect();
        slots[0] = Some(all);
        TeamRegistry {
            slots,
            next_team_id: TEAM_ALL + 1,
        }
    }

    pub(crate) fn next_team_id(&self) -> TeamId {
        self.next_team_id
    }

    pub(crate) fn set_next_team_id(&mut self, id: TeamId) {
        self.next_team_id = self.next_team_id.max(id);
    }

    /// Team-list index of `team_id`.
    pub(crate) fn convert(&self, team_id: TeamId) -> DartResult<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(s) if s.team_id == team_id))
            .ok_or_else(|| DartError::InvalidArgument(format!("unknown team {}", team_id)))
    }

    pub(crate) fn slot(&self, index: usize) -> DartResult<&TeamSlot> {
        self.slots
            .get(index)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| DartError::InvalidArgument(format!("team slot {} is not in use", index)))
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> DartResult<&mut TeamSlot> {
        self.slots
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| DartError::InvalidArgument(format!("team slot {} is not in use", index)))
    }

    pub(crate) fn team(&self, team_id: TeamId) -> DartResult<&TeamSlot> {
        self.slot(self.convert(team_id)?)
    }

    /// Installs `slot` in the first free position and returns its index.
    pub(crate) fn insert(&mut self, slot: TeamSlot) -> DartResult<usize> {
        let index = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| {
                DartError::ResourceExhausted(format!(
                    "all {} team slots are in use",
                    self.slots.len()
                ))
            })?;
        self.slots[index] = Some(slot);
        Ok(index)
    }

    pub(crate) fn remove(&mut self, index: usize) -> DartResult<TeamSlot> {
        self.slots
            .get_mut(index)
            .and_then(|s| s.take())
            .ok_or_else(|| DartError::InvalidArgument(format!("team slot {} is not in use", index)))
    }

    /// Indices of the live slots, ascending.
    pub(crate) fn live(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut TeamSlot> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn handle(members: &[usize], me: usize) -> GroupHandle {
        GroupHandle {
            members: Arc::new(members.to_vec()),
            my_index: members.iter().position(|u| *u == me).unwrap(),
        }
    }

    fn registry() -> TeamRegistry {
        let all = TeamSlot::new(TEAM_ALL, Group::from_units(0..4), handle(&[0, 1, 2, 3], 2), 4);
        TeamRegistry::new(3, all)
    }

    #[test]
    fn all_team_is_identity() {
        let reg = registry();
        let all = reg.team(TEAM_ALL).unwrap();
        assert_eq!(all.size(), 4);
        assert_eq!(all.myid, 2);
        assert_eq!(all.l2g(3), Ok(3));
        assert_eq!(all.g2l(1), Ok(1));
        assert!(all.l2g(4).is_err());
        assert!(all.g2l(4).is_err());
    }

    #[test]
    fn sub_team_translation() {
        let mut reg = registry();
        let slot = TeamSlot::new(5, Group::from_units([1, 2]), handle(&[1, 2], 2), 4);
        let index = reg.insert(slot).unwrap();
        assert_eq!(index, 1);
        assert_eq!(reg.convert(5), Ok(1));
        let team = reg.team(5).unwrap();
        assert_eq!(team.myid, 1);
        assert_eq!(team.l2g(0), Ok(1));
        assert_eq!(team.g2l(2), Ok(1));
        assert!(team.g2l(0).is_err());
        assert_eq!(team.units(), &[1, 2]);
        assert_eq!(reg.live(), vec![0, 1]);
        reg.remove(1).unwrap();
        assert!(reg.convert(5).is_err());
        assert!(reg.slot(1).is_err());
    }

    #[test]
    fn slots_are_bounded() {
        let mut reg = registry();
        for id in 1..3 {
            let slot = TeamSlot::new(id, Group::from_units([2]), handle(&[2], 2), 4);
            reg.insert(slot).unwrap();
        }
        let slot = TeamSlot::new(9, Group::from_units([2]), handle(&[2], 2), 4);
        assert_eq!(
            reg.insert(slot).unwrap_err().code(),
            crate::dart::DartErrorCode::ResourceExhausted
        );
        reg.set_next_team_id(7);
        reg.set_next_team_id(3);
        assert_eq!(reg.next_team_id(), 7);
    }
}
