//! Distribution patterns: mappings from an N-dimensional global index space to
//! `(unit, local offset)` pairs.
//!
//! Every pattern implements [`Pattern`]. Units are team-relative. Global linear indices and
//! local offsets follow the memory order of the pattern (`RowMajor` unless chosen otherwise).
//!
//! Queries are pure arithmetic and never fail; only the constructors validate their input.
//! Passing coordinates outside the index space to a query is a programming error.

mod block;
mod cartesian;
mod csr;
mod distribution;
mod load_balance;
mod shift_tile;
mod tile;
mod viewspec;

pub use block::BlockPattern;
pub use cartesian::{
    CartesianIndexSpace, ColMajor, MemArrange, MemOrder, RowMajor, SizeSpec, TeamSpec,
};
pub use csr::CsrPattern;
pub use distribution::{DistSpec, Distribution};
pub use load_balance::{LoadBalancePattern, LocalityOracle};
pub use shift_tile::ShiftTilePattern;
pub use tile::TilePattern;
pub use viewspec::ViewSpec;

use crate::dart::{DartError, TeamId};

/// Signed index type of global and local index arithmetic.
pub type Index = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    InvalidArgument(String),
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PatternError::InvalidArgument(msg) => write!(f, "invalid pattern: {}", msg),
        }
    }
}

impl std::error::Error for PatternError {}

impl From<PatternError> for DartError {
    fn from(e: PatternError) -> Self {
        DartError::InvalidArgument(e.to_string())
    }
}

pub type PatternResult<T> = Result<T, PatternError>;

pub(crate) fn invalid<T>(msg: impl Into<String>) -> PatternResult<T> {
    Err(PatternError::InvalidArgument(msg.into()))
}

/// A global element resolved to its owner and its offset in the owner's local memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalIndex {
    pub unit: usize,
    pub index: Index,
}

/// A global element resolved to its owner and its coordinates in the owner's local block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalCoords<const N: usize> {
    pub unit: usize,
    pub coords: [Index; N],
}

pub(crate) fn add_coords<const N: usize>(a: [Index; N], b: [Index; N]) -> [Index; N] {
    let mut res = a;
    for d in 0..N {
        res[d] += b[d];
    }
    res
}

/// The capability set shared by every distribution pattern.
///
/// The property constants describe the layout and let containers pick specialised paths:
/// `RECTANGULAR` (local blocks are rectangular in global coordinates), `BALANCED` (every unit
/// holds the same number of elements), `DIAGONAL` (every unit appears once in every
/// team-wide slice of blocks), `BLOCKED_LAYOUT` (blocks are contiguous in local memory) and
/// `LINEAR` (local memory is filled block after block).
pub trait Pattern<const N: usize>: Clone + std::fmt::Debug + PartialEq + Send + Sync {
    type Order: MemArrange;

    const RECTANGULAR: bool;
    const BALANCED: bool;
    const DIAGONAL: bool;
    const BLOCKED_LAYOUT: bool;
    const LINEAR: bool;

    /// Team the pattern distributes over.
    fn team(&self) -> TeamId;

    /// Team-relative id of the active unit.
    fn myid(&self) -> usize;

    /// The same pattern seen from unit `myid` of `team`.
    fn bind(self, team: TeamId, myid: usize) -> Self;

    fn num_units(&self) -> usize;

    fn extents(&self) -> [usize; N];

    fn local_extents(&self, unit: usize) -> [usize; N];

    fn blocksize(&self, d: usize) -> usize;

    /// Number of blocks in every dimension.
    fn blockspec(&self) -> [usize; N];

    /// Number of blocks of the active unit in every dimension.
    fn local_blockspec(&self) -> [usize; N];

    fn unit_at(&self, coords: [Index; N]) -> usize;

    fn local_coords(&self, coords: [Index; N]) -> LocalCoords<N>;

    fn local_index(&self, coords: [Index; N]) -> LocalIndex;

    fn global_coords(&self, unit: usize, l_coords: [Index; N]) -> [Index; N];

    /// Global linear index of local offset `l_index` of `unit`.
    fn global_index(&self, unit: usize, l_index: Index) -> Index;

    /// Region of global block `g_block`.
    fn block(&self, g_block: usize) -> ViewSpec<N>;

    /// Global block index of the block containing `coords`.
    fn block_at(&self, coords: [Index; N]) -> usize;

    /// Unit owning global block `g_block`.
    fn block_owner(&self, g_block: usize) -> usize;

    /// Region, in global coordinates, of local block `l_block` of the active unit.
    fn local_block(&self, l_block: usize) -> ViewSpec<N>;

    /// Region, in local coordinates, of local block `l_block` of the active unit.
    fn local_block_local(&self, l_block: usize) -> ViewSpec<N>;

    fn rank(&self) -> usize {
        N
    }

    fn extent(&self, d: usize) -> usize {
        self.extents()[d]
    }

    fn size(&self) -> usize {
        self.extents().iter().product()
    }

    fn local_extent(&self, d: usize) -> usize {
        self.local_extents(self.myid())[d]
    }

    fn local_size(&self, unit: usize) -> usize {
        self.local_extents(unit).iter().product()
    }

    /// Number of local elements the largest unit holds; every unit reserves this many.
    fn local_capacity(&self) -> usize {
        (0..self.num_units())
            .map(|u| self.local_size(u))
            .max()
            .unwrap_or(0)
    }

    /// Number of elements missing from the last block of dimension `d`.
    fn underfilled_blocksize(&self, d: usize) -> usize {
        let bs = self.blocksize(d);
        (bs - self.extent(d) % bs) % bs
    }

    fn num_blocks(&self) -> usize {
        self.blockspec().iter().product()
    }

    fn num_local_blocks(&self) -> usize {
        self.local_blockspec().iter().product()
    }

    /// Coordinates of global linear index `g_index`.
    fn coords(&self, g_index: Index) -> [Index; N] {
        Self::Order::coords(&self.extents(), g_index)
    }

    /// Global linear index of `coords`.
    fn global_at(&self, coords: [Index; N]) -> Index {
        Self::Order::offset(&self.extents(), &coords)
    }

    fn local(&self, g_index: Index) -> LocalIndex {
        debug_assert!(
            g_index >= 0 && (g_index as usize) < self.size(),
            "global index {} out of range",
            g_index
        );
        self.local_index(self.coords(g_index))
    }

    /// Global linear index of local offset `l_index` of the active unit.
    fn global(&self, l_index: Index) -> Index {
        self.global_index(self.myid(), l_index)
    }

    /// Local offset of `coords` at its owner.
    fn at(&self, coords: [Index; N]) -> Index {
        self.local_index(coords).index
    }

    /// [`at`](Pattern::at) for coordinates relative to `view`.
    fn at_view(&self, coords: [Index; N], view: &ViewSpec<N>) -> Index {
        self.at(add_coords(coords, view.offsets()))
    }

    fn unit_at_view(&self, coords: [Index; N], view: &ViewSpec<N>) -> usize {
        self.unit_at(add_coords(coords, view.offsets()))
    }

    fn is_local(&self, g_index: Index) -> bool {
        self.is_local_at(g_index, self.myid())
    }

    fn is_local_at(&self, g_index: Index, unit: usize) -> bool {
        self.unit_at(self.coords(g_index)) == unit
    }

    /// Global index of the first local element of the active unit, 0 if it holds none.
    fn lbegin(&self) -> Index {
        if self.local_size(self.myid()) == 0 {
            return 0;
        }
        self.global(0)
    }

    /// One past the global index of the last local element of the active unit, 0 if it holds
    /// none.
    fn lend(&self) -> Index {
        let n = self.local_size(self.myid());
        if n == 0 {
            return 0;
        }
        self.global(n as Index - 1) + 1
    }
}
