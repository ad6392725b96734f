use super::cartesian::{MemArrange, RowMajor, SizeSpec, TeamSpec};
use super::distribution::{DistSpec, Distribution};
use super::viewspec::ViewSpec;
use super::{invalid, Index, LocalCoords, LocalIndex, Pattern, PatternResult};
use crate::dart::{TeamId, TEAM_ALL};

use std::marker::PhantomData;

/// Block arithmetic of a rectangular grid of blocks dealt to a Cartesian team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BlockGrid<const N: usize> {
    pub(crate) extents: [usize; N],
    pub(crate) dist: DistSpec<N>,
    pub(crate) teamspec: TeamSpec<N>,
    pub(crate) blocksize: [usize; N],
    pub(crate) nblocks: [usize; N],
}

impl<const N: usize> BlockGrid<N> {
    pub(crate) fn new(
        extents: [usize; N],
        dist: DistSpec<N>,
        teamspec: TeamSpec<N>,
    ) -> PatternResult<BlockGrid<N>> {
        if teamspec.size() == 0 {
            return invalid("a pattern needs at least one unit");
        }
        let mut blocksize = [1; N];
        let mut nblocks = [0; N];
        for d in 0..N {
            let dist_d = dist.dim(d);
            if dist_d.declared_blocksize() == Some(0) {
                return invalid(format!("block size 0 in dimension {}", d));
            }
            if dist_d == Distribution::None && teamspec.extent(d) != 1 {
                return invalid(format!(
                    "dimension {} is not distributed but spans {} units",
                    d,
                    teamspec.extent(d)
                ));
            }
            blocksize[d] = dist_d.max_blocksize_in_range(extents[d], teamspec.extent(d));
            nblocks[d] = (extents[d] + blocksize[d] - 1) / blocksize[d];
        }
        Ok(BlockGrid {
            extents,
            dist,
            teamspec,
            blocksize,
            nblocks,
        })
    }

    pub(crate) fn units(&self, d: usize) -> usize {
        self.teamspec.extent(d).max(1)
    }

    pub(crate) fn unit_coord(&self, d: usize, c: Index) -> usize {
        let block = c as usize / self.blocksize[d];
        self.dist
            .dim(d)
            .block_coord_to_unit_offset(block, self.units(d))
    }

    pub(crate) fn unit_at(&self, coords: &[Index; N]) -> usize {
        let mut uc = [0; N];
        for d in 0..N {
            uc[d] = self.unit_coord(d, coords[d]);
        }
        self.teamspec.at(uc)
    }

    /// Blocks of dimension `d` held by unit coordinate `uc`.
    pub(crate) fn unit_blocks(&self, d: usize, uc: usize) -> usize {
        let t = self.units(d);
        self.nblocks[d] / t + usize::from(uc < self.nblocks[d] % t)
    }

    pub(crate) fn local_extent(&self, d: usize, uc: usize) -> usize {
        let t = self.units(d);
        let nb = self.nblocks[d];
        let bs = self.blocksize[d];
        let full = self.unit_blocks(d, uc) * bs;
        if nb > 0 && (nb - 1) % t == uc {
            // the unit holding the last block misses its underfill
            full - (nb * bs - self.extents[d])
        } else {
            full
        }
    }

    pub(crate) fn local_extents(&self, unit: usize) -> [usize; N] {
        let uc = self.teamspec.coords(unit);
        let mut extents = [0; N];
        for d in 0..N {
            extents[d] = self.local_extent(d, uc[d]);
        }
        extents
    }

    pub(crate) fn local_blockspec(&self, unit: usize) -> [usize; N] {
        let uc = self.teamspec.coords(unit);
        let mut spec = [0; N];
        for d in 0..N {
            spec[d] = self.unit_blocks(d, uc[d]);
        }
        spec
    }

    pub(crate) fn local_coord(&self, d: usize, c: Index) -> Index {
        let bs = self.blocksize[d] as Index;
        let t = self.units(d) as Index;
        (c / bs) / t * bs + c % bs
    }

    pub(crate) fn global_coord(&self, d: usize, uc: usize, l: Index) -> Index {
        let bs = self.blocksize[d] as Index;
        let t = self.units(d) as Index;
        ((l / bs) * t + uc as Index) * bs + l % bs
    }

    pub(crate) fn block_region(&self, bc: &[Index; N]) -> ViewSpec<N> {
        let mut offsets = [0; N];
        let mut extents = [0; N];
        for d in 0..N {
            let bs = self.blocksize[d];
            offsets[d] = bc[d] * bs as Index;
            extents[d] = bs.min(self.extents[d].saturating_sub(offsets[d] as usize));
        }
        ViewSpec::new(offsets, extents)
    }

    /// Global block coordinates of local block coordinates `lbc` of `unit`.
    pub(crate) fn global_block_coords(&self, unit: usize, lbc: &[Index; N]) -> [Index; N] {
        let uc = self.teamspec.coords(unit);
        let mut bc = [0; N];
        for d in 0..N {
            bc[d] = lbc[d] * self.units(d) as Index + uc[d] as Index;
        }
        bc
    }

    pub(crate) fn block_coords_of(&self, coords: &[Index; N]) -> [Index; N] {
        let mut bc = [0; N];
        for d in 0..N {
            bc[d] = coords[d] / self.blocksize[d] as Index;
        }
        bc
    }
}

/// Rectangular blocks dealt to a Cartesian arrangement of units.
///
/// Every dimension is `None`, `Blocked`, `Cyclic` or `BlockCyclic(b)`. Local memory of a unit
/// holds its elements as a dense array of its local extents in memory order `M`, so a
/// `Blocked` 1-D pattern keeps every unit's range contiguous.
///
/// ```
/// use dash::pattern::{BlockPattern, DistSpec, Distribution, LocalIndex, Pattern};
///
/// let pattern = BlockPattern::<1>::with_units([41], DistSpec::new([Distribution::Blocked]), 4).unwrap();
/// assert_eq!(pattern.blocksize(0), 11);
/// assert_eq!(pattern.local(23), LocalIndex { unit: 2, index: 1 });
/// assert_eq!(pattern.local_size(3), 8);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockPattern<const N: usize, M: MemArrange = RowMajor> {
    grid: BlockGrid<N>,
    team: TeamId,
    myid: usize,
    _order: PhantomData<M>,
}

impl<const N: usize, M: MemArrange> BlockPattern<N, M> {
    pub fn new(
        sizespec: SizeSpec<N>,
        dist: DistSpec<N>,
        teamspec: TeamSpec<N>,
    ) -> PatternResult<Self> {
        if dist.is_tiled() {
            return invalid("tiled distributions need a TilePattern");
        }
        Ok(BlockPattern {
            grid: BlockGrid::new(sizespec.extents(), dist, teamspec)?,
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

    pub fn distspec(&self) -> &DistSpec<N> {
        &self.grid.dist
    }

    pub fn teamspec(&self) -> &TeamSpec<N> {
        &self.grid.teamspec
    }
}

impl<const N: usize, M: MemArrange> Pattern<N> for BlockPattern<N, M> {
    type Order = M;

    const RECTANGULAR: bool = true;
    const BALANCED: bool = false;
    const DIAGONAL: bool = false;
    const BLOCKED_LAYOUT: bool = false;
    const LINEAR: bool = false;

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
        LocalIndex {
            unit: local.unit,
            index: M::offset(&self.grid.local_extents(local.unit), &local.coords),
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
        let l_coords = M::coords(&self.grid.local_extents(unit), l_index);
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
        let global = self
            .grid
            .block_region(&self.grid.global_block_coords(self.myid, &lbc));
        let mut offsets = [0; N];
        for d in 0..N {
            offsets[d] = lbc[d] * self.grid.blocksize[d] as Index;
        }
        ViewSpec::new(offsets, global.extents())
    }
}
