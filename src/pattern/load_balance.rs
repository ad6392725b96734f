use super::cartesian::RowMajor;
use super::csr::CsrPattern;
use super::viewspec::ViewSpec;
use super::{invalid, Index, LocalCoords, LocalIndex, Pattern, PatternResult};
use crate::dart::{TeamId, TeamLocality};

use itertools::Itertools;
use tracing::debug;

/// Relative capacities of the units of a team.
pub trait LocalityOracle {
    fn num_units(&self) -> usize;
    /// Compute capacity of every unit, relative to the team mean.
    fn cpu_weights(&self) -> Vec<f64>;
    /// Memory bandwidth of every unit, relative to the team mean.
    fn membw_weights(&self) -> Vec<f64>;
}

impl LocalityOracle for TeamLocality {
    fn num_units(&self) -> usize {
        TeamLocality::num_units(self)
    }

    fn cpu_weights(&self) -> Vec<f64> {
        TeamLocality::cpu_weights(self)
    }

    fn membw_weights(&self) -> Vec<f64> {
        TeamLocality::membw_weights(self)
    }
}

/// 1-D distribution whose local sizes follow the capacity of the units.
///
/// Unit `u` gets `weight[u] * total / nunits` elements, rounded to the nearest integer, where
/// `weight` is the product of the cpu and bandwidth weights normalised to mean 1. The
/// difference between `total` and the rounded sizes is added to (or taken from) the unit with
/// the largest weight.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadBalancePattern {
    csr: CsrPattern,
    weights: Vec<f64>,
}

fn balanced_sizes(total: usize, weights: &[f64]) -> Vec<usize> {
    let nunits = weights.len();
    let mean = weights.iter().sum::<f64>() / nunits as f64;
    let share = total as f64 / nunits as f64;
    let mut sizes: Vec<usize> = weights
        .iter()
        .map(|w| ((w / mean) * share).round() as usize)
        .collect();
    let mut residual = total as i64 - sizes.iter().sum::<usize>() as i64;
    if let Some(max) = weights.iter().position_max_by(|a, b| a.total_cmp(b)) {
        let adjusted = (sizes[max] as i64 + residual).max(0);
        residual -= adjusted - sizes[max] as i64;
        sizes[max] = adjusted as usize;
    }
    // many shares rounded up can exceed what the strongest unit holds
    while residual < 0 {
        match sizes.iter().position_max() {
            Some(u) if sizes[u] > 0 => {
                sizes[u] -= 1;
                residual += 1;
            }
            _ => break,
        }
    }
    sizes
}

impl LoadBalancePattern {
    pub fn new<L: LocalityOracle>(total: usize, locality: &L) -> PatternResult<Self> {
        let nunits = locality.num_units();
        if nunits == 0 {
            return invalid("a pattern needs at least one unit");
        }
        let cpu = locality.cpu_weights();
        let membw = locality.membw_weights();
        if cpu.len() != nunits || membw.len() != nunits {
            return invalid(format!(
                "locality describes {} units but provides {} cpu and {} bandwidth weights",
                nunits,
                cpu.len(),
                membw.len()
            ));
        }
        let weights: Vec<f64> = cpu
            .iter()
            .zip(membw.iter())
            .map(|(c, m)| c * m)
            .collect();
        if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return invalid(format!("unit weights must be positive, got {:?}", weights));
        }
        let sizes = balanced_sizes(total, &weights);
        debug!("load balanced {} elements as {:?}", total, sizes);
        Ok(LoadBalancePattern {
            csr: CsrPattern::new(sizes)?,
            weights,
        })
    }

    pub fn local_sizes(&self) -> &[usize] {
        self.csr.local_sizes()
    }

    pub fn block_offsets(&self) -> &[usize] {
        self.csr.block_offsets()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl Pattern<1> for LoadBalancePattern {
    type Order = RowMajor;

    const RECTANGULAR: bool = true;
    const BALANCED: bool = false;
    const DIAGONAL: bool = false;
    const BLOCKED_LAYOUT: bool = true;
    const LINEAR: bool = true;

    fn team(&self) -> TeamId {
        self.csr.team()
    }

    fn myid(&self) -> usize {
        self.csr.myid()
    }

    fn bind(mut self, team: TeamId, myid: usize) -> Self {
        self.csr = self.csr.bind(team, myid);
        self
    }

    fn num_units(&self) -> usize {
        self.csr.num_units()
    }

    fn extents(&self) -> [usize; 1] {
        self.csr.extents()
    }

    fn local_extents(&self, unit: usize) -> [usize; 1] {
        self.csr.local_extents(unit)
    }

    fn blocksize(&self, d: usize) -> usize {
        self.csr.blocksize(d)
    }

    fn blockspec(&self) -> [usize; 1] {
        self.csr.blockspec()
    }

    fn local_blockspec(&self) -> [usize; 1] {
        self.csr.local_blockspec()
    }

    fn unit_at(&self, coords: [Index; 1]) -> usize {
        self.csr.unit_at(coords)
    }

    fn local_coords(&self, coords: [Index; 1]) -> LocalCoords<1> {
        self.csr.local_coords(coords)
    }

    fn local_index(&self, coords: [Index; 1]) -> LocalIndex {
        self.csr.local_index(coords)
    }

    fn global_coords(&self, unit: usize, l_coords: [Index; 1]) -> [Index; 1] {
        self.csr.global_coords(unit, l_coords)
    }

    fn global_index(&self, unit: usize, l_index: Index) -> Index {
        self.csr.global_index(unit, l_index)
    }

    fn block(&self, g_block: usize) -> ViewSpec<1> {
        self.csr.block(g_block)
    }

    fn block_at(&self, coords: [Index; 1]) -> usize {
        self.csr.block_at(coords)
    }

    fn block_owner(&self, g_block: usize) -> usize {
        self.csr.block_owner(g_block)
    }

    fn local_block(&self, l_block: usize) -> ViewSpec<1> {
        self.csr.local_block(l_block)
    }

    fn local_block_local(&self, l_block: usize) -> ViewSpec<1> {
        self.csr.local_block_local(l_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::UnitLocality;

    struct Fixed(Vec<f64>, Vec<f64>);

    impl LocalityOracle for Fixed {
        fn num_units(&self) -> usize {
            self.0.len()
        }
        fn cpu_weights(&self) -> Vec<f64> {
            self.0.clone()
        }
        fn membw_weights(&self) -> Vec<f64> {
            self.1.clone()
        }
    }

    #[test]
    fn sizes_follow_weights() {
        let oracle = Fixed(vec![1.0, 1.0, 2.0, 0.5], vec![1.0, 1.0, 1.0, 2.0]);
        // weights 1 1 2 1, mean 1.25
        let pattern = LoadBalancePattern::new(100, &oracle).unwrap();
        assert_eq!(pattern.local_sizes(), &[20, 20, 40, 20]);
        assert_eq!(pattern.size(), 100);
        assert_eq!(pattern.unit_at([45]), 2);
    }

    #[test]
    fn residual_goes_to_the_strongest_unit() {
        let oracle = Fixed(vec![1.0, 1.0, 1.0], vec![1.0, 1.0, 1.5]);
        let pattern = LoadBalancePattern::new(10, &oracle).unwrap();
        let sizes = pattern.local_sizes();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        // shares 2.86 2.86 4.29
        assert_eq!(sizes, &[3, 3, 4]);
    }

    #[test]
    fn rounded_up_shares_give_back_elements() {
        let pattern = LoadBalancePattern::new(50, &Fixed(vec![1.0; 100], vec![1.0; 100])).unwrap();
        let sizes = pattern.local_sizes();
        assert_eq!(sizes.iter().sum::<usize>(), 50);
        assert!(sizes.iter().all(|s| *s <= 1));
        let pattern = LoadBalancePattern::new(7, &Fixed(vec![1.0; 4], vec![1.0; 4])).unwrap();
        // shares of 1.75 round to 2, the last unit gives one back
        assert_eq!(pattern.local_sizes(), &[2, 2, 2, 1]);
    }

    #[test]
    fn uniform_team_locality() {
        let locality = TeamLocality::new(0, vec![UnitLocality::new(4, 2000, 1000); 3]);
        let pattern = LoadBalancePattern::new(11, &locality).unwrap();
        // shares of 3.67 round to 4, the last unit of equal weight absorbs the excess
        assert_eq!(pattern.local_sizes(), &[4, 4, 3]);
        assert!(LoadBalancePattern::new(11, &Fixed(vec![], vec![])).is_err());
        assert!(LoadBalancePattern::new(11, &Fixed(vec![1.0, 0.0], vec![1.0, 1.0])).is_err());
        assert!(LoadBalancePattern::new(11, &Fixed(vec![1.0, 1.0], vec![1.0])).is_err());
    }
}
