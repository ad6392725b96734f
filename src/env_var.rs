use std::sync::OnceLock;

use serde::Deserialize;

fn default_transfer_pool_size() -> usize {
    16 * 1024 * 1024
}

fn default_num_queues() -> usize {
    8
}

fn default_queue_depth() -> usize {
    1024
}

fn default_max_segments() -> usize {
    128
}

fn default_max_teams() -> usize {
    256
}

fn default_deadlock_timeout() -> f64 {
    600.0
}

/// Runtime configuration, read from `DART_` prefixed environment variables.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Size in bytes of the private transfer segment of every unit, default: 16 MiB.
    /// Rounded up to the next power of two.
    #[serde(default = "default_transfer_pool_size")]
    pub transfer_pool_size: usize,

    /// Number of transport queues per unit, default: 8
    #[serde(default = "default_num_queues")]
    pub num_queues: usize,

    /// Maximum number of outstanding requests per queue, default: 1024
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Number of transport segment ids; id 0 is the transfer pool, default: 128
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,

    /// Number of team registry slots, default: 256
    #[serde(default = "default_max_teams")]
    pub max_teams: usize,

    /// A timeout in seconds after which a collective that has not completed is reported as a
    /// potential deadlock, default: 600.0 seconds
    #[serde(default = "default_deadlock_timeout")]
    pub deadlock_timeout: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            transfer_pool_size: default_transfer_pool_size(),
            num_queues: default_num_queues(),
            queue_depth: default_queue_depth(),
            max_segments: default_max_segments(),
            max_teams: default_max_teams(),
            deadlock_timeout: default_deadlock_timeout(),
        }
    }
}

/// Get the current Environment Variable configuration
pub fn config() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(|| match envy::prefixed("DART_").from_env::<Config>() {
        Ok(config) => config,
        Err(error) => panic!("{}", error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_environment() {
        let vars: Vec<(String, String)> = Vec::new();
        let config = envy::prefixed("DART_")
            .from_iter::<_, Config>(vars)
            .unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.transfer_pool_size, 1 << 24);
        assert_eq!(config.num_queues, 8);
    }

    #[test]
    fn overrides() {
        let vars = vec![
            ("DART_NUM_QUEUES".to_string(), "2".to_string()),
            ("DART_QUEUE_DEPTH".to_string(), "4".to_string()),
            ("DART_DEADLOCK_TIMEOUT".to_string(), "1.5".to_string()),
        ];
        let config = envy::prefixed("DART_")
            .from_iter::<_, Config>(vars)
            .unwrap();
        assert_eq!(config.num_queues, 2);
        assert_eq!(config.queue_depth, 4);
        assert_eq!(config.deadlock_timeout, 1.5);
        assert_eq!(config.max_teams, 256);
    }

    #[test]
    fn malformed_value_is_rejected() {
        let vars = vec![("DART_NUM_QUEUES".to_string(), "many".to_string())];
        assert!(envy::prefixed("DART_")
            .from_iter::<_, Config>(vars)
            .is_err());
    }
}
