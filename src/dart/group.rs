//! Unit groups and the arches used to carve teams out of a parent team.

use std::collections::BTreeSet;

/// An ordered set of absolute unit ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Group {
    members: BTreeSet<usize>,
}

impl Group {
    pub fn new() -> Group {
        Group {
            members: BTreeSet::new(),
        }
    }

    pub fn from_units(units: impl IntoIterator<Item = usize>) -> Group {
        Group {
            members: units.into_iter().collect(),
        }
    }

    /// The units of `parent` selected by `arch`, whose ids are relative to `parent`.
    pub fn from_arch<A: UnitArch>(parent: &Group, arch: &A) -> ArchResult<Group> {
        let parent_units = parent.members();
        let mut group = Group::new();
        for team_unit in 0..arch.num_units() {
            let parent_unit = arch.parent_unit_id(team_unit)?;
            let unit = parent_units.get(parent_unit).ok_or(IdError {
                parent_unit,
                team_unit,
            })?;
            group.add_member(*unit);
        }
        Ok(group)
    }

    pub fn add_member(&mut self, unit: usize) {
        self.members.insert(unit);
    }

    pub fn del_member(&mut self, unit: usize) {
        self.members.remove(&unit);
    }

    pub fn is_member(&self, unit: usize) -> bool {
        self.members.contains(&unit)
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in ascending order.
    pub fn members(&self) -> Vec<usize> {
        self.members.iter().copied().collect()
    }

    pub fn union(&self, other: &Group) -> Group {
        Group {
            members: self.members.union(&other.members).copied().collect(),
        }
    }

    pub fn intersect(&self, other: &Group) -> Group {
        Group {
            members: self.members.intersection(&other.members).copied().collect(),
        }
    }

    pub fn is_subset(&self, other: &Group) -> bool {
        self.members.is_subset(&other.members)
    }

    /// Split into `n` groups of contiguous members, the first `size % n` get one extra unit.
    /// Trailing groups are empty when `n > size`.
    pub fn split(&self, n: usize) -> Vec<Group> {
        let n = n.max(1);
        let members = self.members();
        let base = members.len() / n;
        let extra = members.len() % n;
        let mut start = 0;
        (0..n)
            .map(|i| {
                let len = base + usize::from(i < extra);
                let group = Group::from_units(members[start..start + len].iter().copied());
                start += len;
                group
            })
            .collect()
    }
}

/// An error that occurs when a unit id does not exist in a team or its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdError {
    pub parent_unit: usize,
    pub team_unit: usize,
}

pub type ArchResult<T> = Result<T, IdError>;

impl std::fmt::Display for IdError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Invalid Id => parent_unit: {} team_unit: {}",
            self.parent_unit, self.team_unit
        )
    }
}

impl std::error::Error for IdError {}

/// A rule selecting the units of a team out of its parent.
pub trait UnitArch {
    /// The number of units in the team
    fn num_units(&self) -> usize;
    /// Converts a team unit id into the id space of the parent team
    fn parent_unit_id(&self, team_unit: usize) -> ArchResult<usize>;
    /// Converts a parent unit id into the id space of the team
    fn team_unit_id(&self, parent_unit: usize) -> ArchResult<usize>;
}

/// Every unit of the parent.
#[derive(Copy, Clone, Hash, Debug, PartialEq, Eq)]
pub struct GlobalArch {
    num_units: usize,
}

impl GlobalArch {
    pub fn new(num_units: usize) -> GlobalArch {
        GlobalArch { num_units }
    }
}

impl UnitArch for GlobalArch {
    fn num_units(&self) -> usize {
        self.num_units
    }
    fn parent_unit_id(&self, team_unit: usize) -> ArchResult<usize> {
        if team_unit < self.num_units {
            Ok(team_unit)
        } else {
            Err(IdError {
                parent_unit: team_unit,
                team_unit,
            })
        }
    }
    fn team_unit_id(&self, parent_unit: usize) -> ArchResult<usize> {
        if parent_unit < self.num_units {
            Ok(parent_unit)
        } else {
            Err(IdError {
                parent_unit,
                team_unit: parent_unit,
            })
        }
    }
}

/// `num_units` units of the parent, `stride` apart, starting at `start_unit`.
///
/// `StridedArch::new(0, 4, 5)` selects the parent units 0,4,8,12,16.
#[derive(Copy, Clone, Hash, Debug, PartialEq, Eq)]
pub struct StridedArch {
    num_units: usize,
    start_unit: usize,
    stride: usize,
}

impl StridedArch {
    pub fn new(start_unit: usize, stride: usize, num_units: usize) -> StridedArch {
        StridedArch {
            num_units,
            start_unit,
            stride: stride.max(1),
        }
    }
}

impl UnitArch for StridedArch {
    fn num_units(&self) -> usize {
        self.num_units
    }
    fn parent_unit_id(&self, team_unit: usize) -> ArchResult<usize> {
        let parent_unit = self.start_unit + team_unit * self.stride;
        if team_unit < self.num_units {
            Ok(parent_unit)
        } else {
            Err(IdError {
                parent_unit,
                team_unit,
            })
        }
    }
    fn team_unit_id(&self, parent_unit: usize) -> ArchResult<usize> {
        if parent_unit >= self.start_unit && (parent_unit - self.start_unit) % self.stride == 0 {
            let team_unit = (parent_unit - self.start_unit) / self.stride;
            if team_unit < self.num_units {
                return Ok(team_unit);
            }
            return Err(IdError {
                parent_unit,
                team_unit,
            });
        }
        Err(IdError {
            parent_unit,
            team_unit: 0,
        })
    }
}

/// `num_units` contiguous units of the parent starting at `start_unit`.
#[derive(Copy, Clone, Hash, Debug, PartialEq, Eq)]
pub struct BlockedArch {
    num_units: usize,
    start_unit: usize,
}

impl BlockedArch {
    pub fn new(start_unit: usize, num_units: usize) -> BlockedArch {
        BlockedArch {
            num_units,
            start_unit,
        }
    }
}

impl UnitArch for BlockedArch {
    fn num_units(&self) -> usize {
        self.num_units
    }
    fn parent_unit_id(&self, team_unit: usize) -> ArchResult<usize> {
        if team_unit < self.num_units {
            Ok(self.start_unit + team_unit)
        } else {
            Err(IdError {
                parent_unit: self.start_unit + team_unit,
                team_unit,
            })
        }
    }
    fn team_unit_id(&self, parent_unit: usize) -> ArchResult<usize> {
        if parent_unit >= self.start_unit && parent_unit - self.start_unit < self.num_units {
            Ok(parent_unit - self.start_unit)
        } else {
            Err(IdError {
                parent_unit,
                team_unit: 0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algebra() {
        let mut a = Group::from_units([0, 2, 4, 6]);
        let b = Group::from_units([4, 5, 6, 7]);
        assert_eq!(a.union(&b).members(), vec![0, 2, 4, 5, 6, 7]);
        assert_eq!(a.intersect(&b).members(), vec![4, 6]);
        a.add_member(1);
        a.del_member(6);
        assert_eq!(a.members(), vec![0, 1, 2, 4]);
        assert!(a.is_member(1));
        assert!(!a.is_member(6));
        assert_eq!(a.size(), 4);
        assert!(Group::from_units([1, 2]).is_subset(&a));
        assert!(Group::new().is_empty());
    }

    #[test]
    fn split_contiguous() {
        let g = Group::from_units(0..7);
        let parts: Vec<Vec<usize>> = g.split(3).iter().map(|p| p.members()).collect();
        assert_eq!(parts, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
        let parts = Group::from_units([3, 9]).split(3);
        assert_eq!(parts[0].members(), vec![3]);
        assert_eq!(parts[1].members(), vec![9]);
        assert!(parts[2].is_empty());
    }

    #[test]
    fn strided_arch() {
        let arch = StridedArch::new(1, 3, 3);
        assert_eq!(arch.parent_unit_id(2), Ok(7));
        assert!(arch.parent_unit_id(3).is_err());
        assert_eq!(arch.team_unit_id(4), Ok(1));
        assert!(arch.team_unit_id(5).is_err());
        assert!(arch.team_unit_id(10).is_err());
        assert!(arch.team_unit_id(0).is_err());
    }

    #[test]
    fn blocked_and_global_arch() {
        let arch = BlockedArch::new(2, 3);
        assert_eq!(arch.parent_unit_id(0), Ok(2));
        assert_eq!(arch.team_unit_id(4), Ok(2));
        assert!(arch.team_unit_id(5).is_err());
        assert!(arch.team_unit_id(1).is_err());
        let arch = GlobalArch::new(4);
        assert_eq!(arch.parent_unit_id(3), Ok(3));
        assert!(arch.team_unit_id(4).is_err());
    }

    #[test]
    fn groups_from_arches_map_through_the_parent() {
        let parent = Group::from_units([1, 3, 5, 7, 9, 11]);
        let evens = Group::from_arch(&parent, &StridedArch::new(0, 2, 3)).unwrap();
        assert_eq!(evens.members(), vec![1, 5, 9]);
        let tail = Group::from_arch(&parent, &BlockedArch::new(4, 2)).unwrap();
        assert_eq!(tail.members(), vec![9, 11]);
        assert!(Group::from_arch(&parent, &BlockedArch::new(4, 3)).is_err());
        let all = Group::from_arch(&parent, &GlobalArch::new(6)).unwrap();
        assert_eq!(all, parent);
    }
}
