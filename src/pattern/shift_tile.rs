use super::cartesian::{MemArrange, RowMajor, SizeSpec, TeamSpec};
use super::distribution::DistSpec;
use super::viewspec::ViewSpec;
use super::{invalid, Index, LocalCoords, LocalIndex, Pattern, PatternResult};
use crate::dart::{TeamId, TEAM_ALL};

use std::marker::PhantomData;

/// Tiles dealt along the diagonals of the block grid: block `bc` belongs to unit
/// `(bc[0] + ... + bc[N-1]) mod nunits`.
///
/// Every run of `nunits` consecutive blocks along any axis therefore holds each unit exactly
/// once. The number of blocks along the last dimension must be a multiple of the unit count,
/// which makes the pattern balanced. Tiles are contiguous in local memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShiftTilePattern<const N: usize, M: MemArrange = RowMajor> {
    extents: [usize; N],
    blocksize: [usize; N],
    nblocks: [usize; N],
    nunits: usize,
    team: TeamId,
    myid: usize,
    _order: PhantomData<M>,
}

impl<const N: usize, M: MemArrange> ShiftTilePattern<N, M> {
    /// Only the size of `teamspec` matters, units are arranged along the diagonals.
    pub fn new(
        sizespec: SizeSpec<N>,
        dist: DistSpec<N>,
        teamspec: TeamSpec<N>,
    ) -> PatternResult<Self> {
        Self::with_units(sizespec.extents(), dist, teamspec.size())
    }

    pub fn with_units(
        extents: [usize; N],
        dist: DistSpec<N>,
        nunits: usize,
    ) -> PatternResult<Self> {
        if N == 0 {
            return invalid("a shift-tile pattern needs at least one dimension");
        }
        if nunits == 0 {
            return invalid("a pattern needs at least one unit");
        }
        let mut blocksize = [1; N];
        let mut nblocks = [0; N];
        for d in 0..N {
            if dist.dim(d).declared_blocksize() == Some(0) {
                return invalid(format!("block size 0 in dimension {}", d));
            }
            blocksize[d] = dist.dim(d).max_blocksize_in_range(extents[d], nunits);
            if extents[d] % blocksize[d] != 0 {
                return invalid(format!(
                    "extent {} of dimension {} is not a multiple of the tile size {}",
                    extents[d], d, blocksize[d]
                ));
            }
            nblocks[d] = extents[d] / blocksize[d];
        }
        if nblocks[N - 1] % nunits != 0 {
            return invalid(format!(
                "{} blocks in the last dimension cannot be shifted over {} units",
                nblocks[N - 1],
                nunits
            ));
        }
        Ok(ShiftTilePattern {
            extents,
            blocksize,
            nblocks,
            nunits,
            team: TEAM_ALL,
            myid: 0,
            _order: PhantomData,
        })
    }

    pub fn tile_size(&self) -> usize {
        self.blocksize.iter().product()
    }

    fn unit_of_block(&self, bc: &[Index; N]) -> usize {
        (bc.iter().sum::<Index>() as usize) % self.nunits
    }

    fn block_coords_of(&self, coords: &[Index; N]) -> [Index; N] {
        let mut bc = [0; N];
        for d in 0..N {
            bc[d] = coords[d] / self.blocksize[d] as Index;
        }
        bc
    }

    /// Global block coordinates of local block coordinates `lbc` of `unit`.
    fn global_block_coords(&self, unit: usize, lbc: &[Index; N]) -> [Index; N] {
        let n = self.nunits as Index;
        let mut bc = *lbc;
        let prefix: Index = lbc[..N - 1].iter().sum();
        bc[N - 1] = lbc[N - 1] * n + (unit as Index - prefix).rem_euclid(n);
        bc
    }

    fn block_region(&self, bc: &[Index; N]) -> ViewSpec<N> {
        let mut offsets = [0; N];
        for d in 0..N {
            offsets[d] = bc[d] * self.blocksize[d] as Index;
        }
        ViewSpec::new(offsets, self.blocksize)
    }

    fn blocks_per_unit_row(&self) -> usize {
        self.nblocks[N - 1] / self.nunits
    }
}

impl<const N: usize, M: MemArrange> Pattern<N> for ShiftTilePattern<N, M> {
    type Order = M;

    const RECTANGULAR: bool = true;
    const BALANCED: bool = true;
    const DIAGONAL: bool = true;
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
        self.nunits
    }

    fn extents(&self) -> [usize; N] {
        self.extents
    }

    fn local_extents(&self, _unit: usize) -> [usize; N] {
        let mut extents = self.extents;
        extents[N - 1] = self.blocks_per_unit_row() * self.blocksize[N - 1];
        extents
    }

    fn blocksize(&self, d: usize) -> usize {
        self.blocksize[d]
    }

    fn blockspec(&self) -> [usize; N] {
        self.nblocks
    }

    fn local_blockspec(&self) -> [usize; N] {
        let mut spec = self.nblocks;
        spec[N - 1] = self.blocks_per_unit_row();
        spec
    }

    fn unit_at(&self, coords: [Index; N]) -> usize {
        self.unit_of_block(&self.block_coords_of(&coords))
    }

    fn local_coords(&self, coords: [Index; N]) -> LocalCoords<N> {
        let bc = self.block_coords_of(&coords);
        let mut l_coords = coords;
        let bs = self.blocksize[N - 1] as Index;
        l_coords[N - 1] = bc[N - 1] / self.nunits as Index * bs + coords[N - 1] % bs;
        LocalCoords {
            unit: self.unit_of_block(&bc),
            coords: l_coords,
        }
    }

    fn local_index(&self, coords: [Index; N]) -> LocalIndex {
        let local = self.local_coords(coords);
        let mut lbc = [0; N];
        let mut phase = [0; N];
        for d in 0..N {
            let bs = self.blocksize[d] as Index;
            lbc[d] = local.coords[d] / bs;
            phase[d] = local.coords[d] % bs;
        }
        let tile = M::offset(&self.local_blockspec(), &lbc);
        LocalIndex {
            unit: local.unit,
            index: tile * self.tile_size() as Index + M::offset(&self.blocksize, &phase),
        }
    }

    fn global_coords(&self, unit: usize, l_coords: [Index; N]) -> [Index; N] {
        let mut lbc = [0; N];
        for d in 0..N {
            lbc[d] = l_coords[d] / self.blocksize[d] as Index;
        }
        let bc = self.global_block_coords(unit, &lbc);
        let mut coords = l_coords;
        let bs = self.blocksize[N - 1] as Index;
        coords[N - 1] = bc[N - 1] * bs + l_coords[N - 1] % bs;
        coords
    }

    fn global_index(&self, unit: usize, l_index: Index) -> Index {
        let volume = self.tile_size() as Index;
        let lbc = M::coords(&self.local_blockspec(), l_index / volume);
        let phase = M::coords(&self.blocksize, l_index % volume);
        let mut l_coords = [0; N];
        for d in 0..N {
            l_coords[d] = lbc[d] * self.blocksize[d] as Index + phase[d];
        }
        self.global_at(self.global_coords(unit, l_coords))
    }

    fn block(&self, g_block: usize) -> ViewSpec<N> {
        self.block_region(&M::coords(&self.nblocks, g_block as Index))
    }

    fn block_at(&self, coords: [Index; N]) -> usize {
        M::offset(&self.nblocks, &self.block_coords_of(&coords)) as usize
    }

    fn block_owner(&self, g_block: usize) -> usize {
        self.unit_of_block(&M::coords(&self.nblocks, g_block as Index))
    }

    fn local_block(&self, l_block: usize) -> ViewSpec<N> {
        let lbc = M::coords(&self.local_blockspec(), l_block as Index);
        self.block_region(&self.global_block_coords(self.myid, &lbc))
    }

    fn local_block_local(&self, l_block: usize) -> ViewSpec<N> {
        let lbc = M::coords(&self.local_blockspec(), l_block as Index);
        self.block_region(&lbc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Distribution;

    fn diagonal() -> ShiftTilePattern<2> {
        ShiftTilePattern::with_units([16, 16], DistSpec::tiled(2), 4).unwrap()
    }

    #[test]
    fn owner_follows_diagonals() {
        let pattern = diagonal();
        for tr in 0..8 {
            for tc in 0..8 {
                assert_eq!(pattern.unit_at([tr * 2, tc * 2 + 1]), ((tr + tc) % 4) as usize);
            }
        }
    }

    #[test]
    fn every_band_holds_every_unit_once() {
        let pattern = diagonal();
        for tr in 0..8 {
            for band in 0..2 {
                let mut units: Vec<usize> = (0..4)
                    .map(|j| pattern.unit_at([tr * 2, (band * 4 + j) * 2]))
                    .collect();
                units.sort_unstable();
                assert_eq!(units, vec![0, 1, 2, 3]);
            }
        }
    }

    #[test]
    fn balanced_and_contiguous_tiles() {
        let pattern = diagonal();
        for u in 0..4 {
            assert_eq!(pattern.local_size(u), 64);
        }
        assert_eq!(pattern.local_extents(1), [16, 4]);
        let l = pattern.local_index([5, 9]);
        assert_eq!(l.unit, (2 + 4) % 4);
        let tile_start = pattern.at([4, 8]);
        assert_eq!(tile_start % 4, 0);
        assert_eq!(l.index, tile_start + 3);
        assert_eq!(pattern.global_index(l.unit, l.index), pattern.global_at([5, 9]));
        let unit3 = pattern.bind(TEAM_ALL, 3);
        assert_eq!(unit3.local_blockspec(), [8, 2]);
        assert_eq!(unit3.local_block(0), ViewSpec::new([0, 6], [2, 2]));
        assert_eq!(unit3.local_block(3), ViewSpec::new([2, 12], [2, 2]));
        assert_eq!(unit3.local_block_local(3), ViewSpec::new([2, 2], [2, 2]));
    }

    #[test]
    fn rejects_uneven_bands() {
        assert!(ShiftTilePattern::<2>::with_units([16, 12], DistSpec::tiled(2), 4).is_err());
        assert!(ShiftTilePattern::<1>::with_units(
            [16],
            DistSpec::new([Distribution::Tile(3)]),
            2
        )
        .is_err());
        assert!(ShiftTilePattern::<1>::with_units([16], DistSpec::tiled(2), 0).is_err());
    }
}
