use super::block::BlockGrid;
use super::cartesian::{MemArrange, RowMajor, SizeSpec, TeamSpec};
use super::distribution::DistSpec;
use super::viewspec::ViewSpec;
use super::{invalid, Index, LocalCoords, LocalIndex, Pattern, PatternResult};
use crate::dart::{TeamId, TEAM_ALL};

use std::marker::PhantomData;

/// Tiles of declared size dealt round-robin over a Cartesian team, every tile stored
/// contiguously in the local memory of its unit.
///
/// Local memory holds the unit's tiles one after the other, in memory order of their local
/// tile coordinates; the elements of a tile are in memory order as well. Extents must be
/// divisible by the tile size in every dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TilePattern<const N: usize, M: MemArrange = RowMajor> {
    grid: BlockGrid<N>,
    team: TeamId,
    myid: usize,
    _order: PhantomData<M>,
}

impl<const N: usize, M: MemArrange> TilePattern<N, M> {
    pub fn new(
        sizespec: SizeSpec<N>,
        dist: DistSpec<N>,
        teamspec: TeamSpec<N>,
    ) -> PatternResult<Self> {
        let grid = BlockGrid::new(sizespec.extents(), dist, teamspec)?;
        for d in 0..N {
            if grid.extents[d] % grid.blocksize[d] != 0 {
                return invalid(format!(
                    "extent {} of dimension {} is not a multiple of the tile size {}",
                    grid.extents[d], d, grid.blocksize[d]
                ));
            }
        }
        Ok(TilePattern {
            grid,
            team: TEAM_ALL,
            myid: 0,
            _order: PhantomData,
        })
    }

    /// Pattern over `nunits` units, arranged by [`TeamSpec::balanced`].
    pub fn with_units(
        extents: [usize; N],
        dist: DistSpec<N>,
        nunits: usize,
    ) -> PatternResult<Self> {
        let teamspec = TeamSpec::balanced(&dist, nunits);
        Self::new(SizeSpec::new(extents), dist, teamspec)
    }

    pub fn teamspec(&self) -> &TeamSpec<N> {
        &self.grid.teamspec
    }

    /// Elements per tile.
    pub fn tile_size(&self) -> usize {
        self.grid.blocksize.iter().product()
    }

    fn tile_phase(&self, l_coords: &[Index; N]) -> ([Index; N], [Index; N]) {
        let mut lbc = [0; N];
        let mut phase = [0; N];
        for d in 0..N {
            let bs = self.grid.blocksize[d] as Index;
            lbc[d] = l_coords[d] / bs;
            phase[d] = l_coords[d] % bs;
        }
        (lbc, phase)
    }
}

impl<const N: usize, M: MemArrange> Pattern<N> for TilePattern<N, M> {
    type Order = M;

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
        self.grid.teamspec.size()
    }

    fn extents(&self) -> [usize; N] {
        self.grid.extents
    }

    fn local_extents(&self, unit: usize) -> [usize; N] {
        self.grid.local_extents(unit)
    }

    fn blocksize(&self, d: usize) -> usize {
        self.grid.blocksize[d]
    }

    fn blockspec(&self) -> [usize; N] {
        self.grid.nblocks
    }

    fn local_blockspec(&self) -> [usize; N] {
        self.grid.local_blockspec(self.myid)
    }

    fn unit_at(&self, coords: [Index; N]) -> usize {
        self.grid.unit_at(&coords)
    }

    fn local_coords(&self, coords: [Index; N]) -> LocalCoords<N> {
        let mut l_coords = [0; N];
        for d in 0..N {
            l_coords[d] = self.grid.local_coord(d, coords[d]);
        }
        LocalCoords {
            unit: self.grid.unit_at(&coords),
            coords: l_coords,
        }
    }

    fn local_index(&self, coords: [Index; N]) -> LocalIndex {
        let local = self.local_coords(coords);
        let (lbc, phase) = self.tile_phase(&local.coords);
        let tile = M::offset(&self.grid.local_blockspec(local.unit), &lbc);
        LocalIndex {
            unit: local.unit,
            index: tile * self.tile_size() as Index + M::offset(&self.grid.blocksize, &phase),
        }
    }

    fn global_coords(&self, unit: usize, l_coords: [Index; N]) -> [Index; N] {
        let uc = self.grid.teamspec.coords(unit);
        let mut coords = [0; N];
        for d in 0..N {
            coords[d] = self.grid.global_coord(d, uc[d], l_coords[d]);
        }
        coords
    }

    fn global_index(&self, unit: usize, l_index: Index) -> Index {
        let volume = self.tile_size() as Index;
        let lbc = M::coords(&self.grid.local_blockspec(unit), l_index / volume);
        let phase = M::coords(&self.grid.blocksize, l_index % volume);
        let mut l_coords = [0; N];
        for d in 0..N {
            l_coords[d] = lbc[d] * self.grid.blocksize[d] as Index + phase[d];
        }
        self.global_at(self.global_coords(unit, l_coords))
    }

    fn block(&self, g_block: usize) -> ViewSpec<N> {
        let bc = M::coords(&self.grid.nblocks, g_block as Index);
        self.grid.block_region(&bc)
    }

    fn block_at(&self, coords: [Index; N]) -> usize {
        M::offset(&self.grid.nblocks, &self.grid.block_coords_of(&coords)) as usize
    }

    fn block_owner(&self, g_block: usize) -> usize {
        self.unit_at(self.block(g_block).offsets())
    }

    fn local_block(&self, l_block: usize) -> ViewSpec<N> {
        let lbc = M::coords(&self.local_blockspec(), l_block as Index);
        self.grid
            .block_region(&self.grid.global_block_coords(self.myid, &lbc))
    }

    fn local_block_local(&self, l_block: usize) -> ViewSpec<N> {
        let lbc = M::coords(&self.local_blockspec(), l_block as Index);
        let mut offsets = [0; N];
        for d in 0..N {
            offsets[d] = lbc[d] * self.grid.blocksize[d] as Index;
        }
        ViewSpec::new(offsets, self.grid.blocksize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Distribution;

    fn tiles_12x12() -> TilePattern<2> {
        TilePattern::new(
            SizeSpec::new([12, 12]),
            DistSpec::tiled(3),
            TeamSpec::new([2, 2]),
        )
        .unwrap()
    }

    #[test]
    fn tile_round_trip() {
        let pattern = tiles_12x12();
        let teamspec = TeamSpec::new([2, 2]);
        assert_eq!(
            pattern.unit_at([7, 5]),
            teamspec.at([(7 / 3) % 2, (5 / 3) % 2])
        );
        let local = pattern.local_coords([7, 5]);
        assert_eq!(local.unit, 1);
        assert_eq!(local.coords, [4, 2]);
        assert_eq!(pattern.global_coords(local.unit, local.coords), [7, 5]);
        // third local tile of unit 1, row 1 column 2 inside it
        assert_eq!(pattern.at([7, 5]), 2 * 9 + 5);
        assert_eq!(pattern.global_index(1, 23), pattern.global_at([7, 5]));
    }

    #[test]
    fn tiles_are_contiguous_locally() {
        let pattern = tiles_12x12();
        let block = pattern.block(pattern.block_at([7, 5]));
        assert_eq!(block, ViewSpec::new([6, 3], [3, 3]));
        let first = pattern.at(block.offsets());
        for r in 0..3 {
            for c in 0..3 {
                let index = pattern.at([6 + r, 3 + c]);
                assert_eq!(index, first + r * 3 + c);
            }
        }
        assert_eq!(pattern.local_size(0), 36);
        assert_eq!(pattern.tile_size(), 9);
    }

    #[test]
    fn local_blocks() {
        let pattern = tiles_12x12().bind(TEAM_ALL, 2);
        assert_eq!(pattern.local_blockspec(), [2, 2]);
        assert_eq!(pattern.local_block(1), ViewSpec::new([3, 6], [3, 3]));
        assert_eq!(pattern.local_block_local(1), ViewSpec::new([0, 3], [3, 3]));
        assert_eq!(pattern.block_owner(pattern.block_at([3, 6])), 2);
    }

    #[test]
    fn rejects_partial_tiles() {
        assert!(TilePattern::<2>::new(
            SizeSpec::new([10, 12]),
            DistSpec::tiled(3),
            TeamSpec::new([2, 2]),
        )
        .is_err());
        assert!(TilePattern::<1>::with_units([12], DistSpec::new([Distribution::Tile(0)]), 2)
            .is_err());
    }
}
