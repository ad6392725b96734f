use super::cartesian::RowMajor;
use super::viewspec::ViewSpec;
use super::{invalid, Index, LocalCoords, LocalIndex, Pattern, PatternResult};
use crate::dart::{TeamId, TEAM_ALL};

/// Irregular 1-D distribution: unit `u` holds the `local_sizes[u]` consecutive elements
/// starting at the prefix sum of the sizes of the units before it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CsrPattern {
    local_sizes: Vec<usize>,
    block_offsets: Vec<usize>,
    size: usize,
    team: TeamId,
    myid: usize,
}

impl CsrPattern {
    pub fn new(local_sizes: Vec<usize>) -> PatternResult<CsrPattern> {
        if local_sizes.is_empty() {
            return invalid("a pattern needs at least one unit");
        }
        let mut block_offsets = Vec::with_capacity(local_sizes.len());
        let mut size = 0;
        for s in local_sizes.iter() {
            block_offsets.push(size);
            size += s;
        }
        Ok(CsrPattern {
            local_sizes,
            block_offsets,
            size,
            team: TEAM_ALL,
            myid: 0,
        })
    }

    /// Like [`new`](CsrPattern::new), checking that there is one size per unit of the team.
    pub fn with_units(local_sizes: Vec<usize>, nunits: usize) -> PatternResult<CsrPattern> {
        if local_sizes.len() != nunits {
            return invalid(format!(
                "{} local sizes for {} units",
                local_sizes.len(),
                nunits
            ));
        }
        CsrPattern::new(local_sizes)
    }

    pub fn local_sizes(&self) -> &[usize] {
        &self.local_sizes
    }

    /// Global index of the first element of every unit.
    pub fn block_offsets(&self) -> &[usize] {
        &self.block_offsets
    }

    fn unit_of(&self, g: Index) -> usize {
        let g = g as usize;
        // at most nunits steps; empty units are skipped
        self.block_offsets
            .iter()
            .zip(self.local_sizes.iter())
            .position(|(off, size)| g >= *off && g < off + size)
            .unwrap_or(self.local_sizes.len() - 1)
    }
}

impl Pattern<1> for CsrPattern {
    type Order = RowMajor;

    const RECTANGULAR: bool = true;
    const BALANCED: bool = false;
    const DIAGONAL: bool = false;
    const BLOCKED_LAYOUT: bool = true;
    const LINEAR: bool = true;

    fn team(&self) -> TeamId {
        self.team
    }

    fn myid(&self) -> usize {
        self.myid
    }

    fn bind(mut self, team: TeamId, myid: usize) -> Self {
        self.team = team;
        self.myid = myid;
        self
    }

    fn num_units(&self) -> usize {
        self.local_sizes.len()
    }

    fn extents(&self) -> [usize; 1] {
        [self.size]
    }

    fn local_extents(&self, unit: usize) -> [usize; 1] {
        [self.local_sizes[unit]]
    }

    /// The largest local size.
    fn blocksize(&self, _d: usize) -> usize {
        self.local_sizes.iter().copied().max().unwrap_or(0).max(1)
    }

    fn blockspec(&self) -> [usize; 1] {
        [self.local_sizes.len()]
    }

    fn local_blockspec(&self) -> [usize; 1] {
        [1]
    }

    fn unit_at(&self, coords: [Index; 1]) -> usize {
        self.unit_of(coords[0])
    }

    fn local_coords(&self, coords: [Index; 1]) -> LocalCoords<1> {
        let l = self.local_index(coords);
        LocalCoords {
            unit: l.unit,
            coords: [l.index],
        }
    }

    fn local_index(&self, coords: [Index; 1]) -> LocalIndex {
        let unit = self.unit_of(coords[0]);
        LocalIndex {
            unit,
            index: coords[0] - self.block_offsets[unit] as Index,
        }
    }

    fn global_coords(&self, unit: usize, l_coords: [Index; 1]) -> [Index; 1] {
        [self.block_offsets[unit] as Index + l_coords[0]]
    }

    fn global_index(&self, unit: usize, l_index: Index) -> Index {
        self.block_offsets[unit] as Index + l_index
    }

    fn block(&self, g_block: usize) -> ViewSpec<1> {
        ViewSpec::new(
            [self.block_offsets[g_block] as Index],
            [self.local_sizes[g_block]],
        )
    }

    fn block_at(&self, coords: [Index; 1]) -> usize {
        self.unit_of(coords[0])
    }

    fn block_owner(&self, g_block: usize) -> usize {
        g_block
    }

    fn local_block(&self, _l_block: usize) -> ViewSpec<1> {
        self.block(self.myid)
    }

    fn local_block_local(&self, _l_block: usize) -> ViewSpec<1> {
        ViewSpec::from_extents([self.local_sizes[self.myid]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_sizes() {
        let pattern = CsrPattern::new(vec![5, 2, 8, 1]).unwrap();
        assert_eq!(pattern.size(), 16);
        assert_eq!(pattern.unit_at([6]), 1);
        assert_eq!(pattern.block_offsets(), &[0, 5, 7, 15]);
        assert_eq!(pattern.local(6), LocalIndex { unit: 1, index: 1 });
        assert_eq!(pattern.global_index(2, 7), 14);
        assert_eq!(pattern.local_capacity(), 8);
        assert_eq!(pattern.block(2), ViewSpec::new([7], [8]));
        let unit2 = pattern.clone().bind(TEAM_ALL, 2);
        assert_eq!((unit2.lbegin(), unit2.lend()), (7, 15));
        assert_eq!(unit2.local_block(0), ViewSpec::new([7], [8]));
    }

    #[test]
    fn empty_units_are_skipped() {
        let pattern = CsrPattern::new(vec![0, 3, 0, 2]).unwrap();
        assert_eq!(pattern.unit_at([0]), 1);
        assert_eq!(pattern.unit_at([3]), 3);
        assert_eq!(pattern.local_size(2), 0);
        let unit2 = pattern.bind(TEAM_ALL, 2);
        assert_eq!((unit2.lbegin(), unit2.lend()), (0, 0));
    }

    #[test]
    fn size_count_must_match() {
        assert!(CsrPattern::with_units(vec![1, 2], 3).is_err());
        assert!(CsrPattern::new(vec![]).is_err());
        assert!(CsrPattern::with_units(vec![1, 2, 3], 3).is_ok());
    }
}
