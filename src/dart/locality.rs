use super::error::DartResult;
use super::runtime::Dart;
use super::team::TeamId;

/// Capacity of the hardware a unit runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UnitLocality {
    pub cores: usize,
    pub cpu_mhz: u32,
    pub membw_mbps: u32,
}

impl UnitLocality {
    pub fn new(cores: usize, cpu_mhz: u32, membw_mbps: u32) -> UnitLocality {
        UnitLocality {
            cores,
            cpu_mhz,
            membw_mbps,
        }
    }

    /// The calling host with nominal clock and bandwidth figures.
    pub fn host() -> UnitLocality {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        UnitLocality::new(cores, 1000, 1000)
    }

    /// Compute capacity, cores times clock.
    pub fn cpu_capacity(&self) -> f64 {
        self.cores.max(1) as f64 * self.cpu_mhz.max(1) as f64
    }

    pub fn membw_capacity(&self) -> f64 {
        self.membw_mbps.max(1) as f64
    }
}

impl Default for UnitLocality {
    fn default() -> Self {
        UnitLocality::new(1, 1000, 1000)
    }
}

/// Locality of every unit of a team, in team-relative order.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamLocality {
    team: TeamId,
    units: Vec<UnitLocality>,
}

fn normalize(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return values;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.into_iter().map(|v| v / mean).collect()
}

impl TeamLocality {
    pub fn new(team: TeamId, units: Vec<UnitLocality>) -> TeamLocality {
        TeamLocality { team, units }
    }

    pub fn team(&self) -> TeamId {
        self.team
    }

    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, rel_unit: usize) -> Option<&UnitLocality> {
        self.units.get(rel_unit)
    }

    /// Compute capacity of every unit relative to the team mean.
    pub fn cpu_weights(&self) -> Vec<f64> {
        normalize(self.units.iter().map(|u| u.cpu_capacity()))
    }

    /// Memory bandwidth of every unit relative to the team mean.
    pub fn membw_weights(&self) -> Vec<f64> {
        normalize(self.units.iter().map(|u| u.membw_capacity()))
    }
}

impl Dart {
    /// Gather the locality of every member of `team`, collective over the team.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn team_locality(&self, team: TeamId) -> DartResult<TeamLocality> {
        let units = self.team_allgather(team, &self.locality)?;
        Ok(TeamLocality::new(team, units))
    }
}
