/// How the blocks of one dimension are dealt to the units along that dimension.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Distribution {
    /// The dimension is not distributed, one block spans the whole extent.
    None,
    /// One block of `ceil(extent / nunits)` elements per unit.
    Blocked,
    /// Single elements dealt round-robin, the same as `BlockCyclic(1)`.
    Cyclic,
    /// Blocks of the given size dealt round-robin.
    BlockCyclic(usize),
    /// Tiles of the given size dealt round-robin; tiles are contiguous in local memory.
    Tile(usize),
}

impl Default for Distribution {
    fn default() -> Self {
        Distribution::Blocked
    }
}

impl Distribution {
    /// Block size used for a dimension of `extent` elements over `nunits` units.
    ///
    /// Never 0, so that block arithmetic stays defined for empty dimensions.
    pub fn max_blocksize_in_range(&self, extent: usize, nunits: usize) -> usize {
        let bs = match self {
            Distribution::None => extent,
            Distribution::Blocked => {
                let nunits = nunits.max(1);
                (extent + nunits - 1) / nunits
            }
            Distribution::Cyclic => 1,
            Distribution::BlockCyclic(b) | Distribution::Tile(b) => *b,
        };
        bs.max(1)
    }

    /// Unit coordinate, along this dimension, of the owner of block coordinate `block`.
    pub fn block_coord_to_unit_offset(&self, block: usize, nunits: usize) -> usize {
        match self {
            Distribution::None => 0,
            _ => block % nunits.max(1),
        }
    }

    pub fn is_distributed(&self) -> bool {
        !matches!(self, Distribution::None)
    }

    pub fn is_tiled(&self) -> bool {
        matches!(self, Distribution::Tile(_))
    }

    /// Explicit block size, if this distribution declares one.
    pub fn declared_blocksize(&self) -> Option<usize> {
        match self {
            Distribution::Cyclic => Some(1),
            Distribution::BlockCyclic(b) | Distribution::Tile(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Distribution::None => write!(f, "NONE"),
            Distribution::Blocked => write!(f, "BLOCKED"),
            Distribution::Cyclic => write!(f, "CYCLIC"),
            Distribution::BlockCyclic(b) => write!(f, "BLOCKCYCLIC({})", b),
            Distribution::Tile(b) => write!(f, "TILE({})", b),
        }
    }
}

/// Distribution of every dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DistSpec<const N: usize> {
    dists: [Distribution; N],
}

impl<const N: usize> DistSpec<N> {
    pub fn new(dists: [Distribution; N]) -> DistSpec<N> {
        DistSpec { dists }
    }

    /// `Blocked` in the first dimension, `None` in the others.
    pub fn blocked() -> DistSpec<N> {
        let mut dists = [Distribution::None; N];
        if N > 0 {
            dists[0] = Distribution::Blocked;
        }
        DistSpec { dists }
    }

    /// `Tile(b)` in every dimension.
    pub fn tiled(b: usize) -> DistSpec<N> {
        DistSpec {
            dists: [Distribution::Tile(b); N],
        }
    }

    pub fn dim(&self, d: usize) -> Distribution {
        self.dists[d]
    }

    pub fn dists(&self) -> &[Distribution; N] {
        &self.dists
    }

    pub fn is_tiled(&self) -> bool {
        self.dists.iter().any(|d| d.is_tiled())
    }

    /// Dimensions that are distributed over units.
    pub fn distributed_dims(&self) -> impl Iterator<Item = usize> + '_ {
        (0..N).filter(move |d| self.dists[*d].is_distributed())
    }
}

impl<const N: usize> From<[Distribution; N]> for DistSpec<N> {
    fn from(dists: [Distribution; N]) -> Self {
        DistSpec::new(dists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes() {
        assert_eq!(Distribution::Blocked.max_blocksize_in_range(41, 4), 11);
        assert_eq!(Distribution::Blocked.max_blocksize_in_range(40, 4), 10);
        assert_eq!(Distribution::Blocked.max_blocksize_in_range(0, 4), 1);
        assert_eq!(Distribution::Cyclic.max_blocksize_in_range(41, 4), 1);
        assert_eq!(Distribution::BlockCyclic(3).max_blocksize_in_range(41, 4), 3);
        assert_eq!(Distribution::Tile(5).max_blocksize_in_range(40, 2), 5);
        assert_eq!(Distribution::None.max_blocksize_in_range(12, 4), 12);
    }

    #[test]
    fn unit_offsets() {
        assert_eq!(Distribution::Cyclic.block_coord_to_unit_offset(6, 4), 2);
        assert_eq!(Distribution::None.block_coord_to_unit_offset(6, 4), 0);
        assert_eq!(Distribution::Tile(2).block_coord_to_unit_offset(3, 1), 0);
    }

    #[test]
    fn specs() {
        let spec = DistSpec::<3>::blocked();
        assert_eq!(spec.dim(0), Distribution::Blocked);
        assert_eq!(spec.distributed_dims().collect::<Vec<_>>(), vec![0]);
        assert!(DistSpec::<2>::tiled(4).is_tiled());
        assert_eq!(format!("{}", Distribution::BlockCyclic(2)), "BLOCKCYCLIC(2)");
    }
}
