use std::time::Duration;

use crate::game::constants::{room, timing};
use crate::game::systems::capture::ThreatCounting;

/// Client and simulator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Local simulation frames per second
    pub tick_rate: u32,
    /// Room capacity enforced on join
    pub max_players: usize,
    /// How the host accrues threat from noise
    pub threat_counting: ThreatCounting,
    /// Clients the simulator spawns
    pub sim_players: usize,
    /// Name of the room the simulator creates
    pub sim_room_name: String,
    /// Simulator gives up on a match after this long
    pub match_timeout_secs: u64,
    /// Serve metrics over HTTP when set
    pub metrics_port: Option<u16>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_rate: timing::DEFAULT_TICK_RATE,
            max_players: room::MAX_PLAYERS,
            threat_counting: ThreatCounting::Strict,
            sim_players: 3,
            sim_room_name: "Hush".to_string(),
            match_timeout_secs: 120,
            metrics_port: None,
        }
    }
}

impl SyncConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; invalid values are logged and ignored
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(rate) = lookup("TICK_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) if (1..=240).contains(&parsed) => config.tick_rate = parsed,
                Ok(_) => tracing::warn!("TICK_RATE must be 1-240, using default"),
                Err(_) => tracing::warn!("Invalid TICK_RATE '{}', using default", rate),
            }
        }

        if let Some(max) = lookup("MAX_PLAYERS") {
            match max.parse::<usize>() {
                Ok(parsed) if (1..=room::MAX_PLAYERS).contains(&parsed) => {
                    config.max_players = parsed
                }
                Ok(_) => tracing::warn!(
                    "MAX_PLAYERS must be 1-{}, using default",
                    room::MAX_PLAYERS
                ),
                Err(_) => tracing::warn!("Invalid MAX_PLAYERS '{}', using default", max),
            }
        }

        if let Some(counting) = lookup("THREAT_COUNTING") {
            match counting.parse::<ThreatCounting>() {
                Ok(parsed) => config.threat_counting = parsed,
                Err(e) => tracing::warn!("{}, using strict", e),
            }
        }

        if let Some(players) = lookup("SIM_PLAYERS") {
            match players.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.sim_players = parsed,
                Ok(_) => tracing::warn!("SIM_PLAYERS must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid SIM_PLAYERS '{}', using default", players),
            }
        }

        if let Some(name) = lookup("SIM_ROOM_NAME") {
            if name.trim().is_empty() {
                tracing::warn!("SIM_ROOM_NAME is empty, using default");
            } else {
                config.sim_room_name = name;
            }
        }

        if let Some(secs) = lookup("MATCH_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(parsed) if parsed > 0 => config.match_timeout_secs = parsed,
                Ok(_) => tracing::warn!("MATCH_TIMEOUT_SECS must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid MATCH_TIMEOUT_SECS '{}', using default", secs),
            }
        }

        if let Some(port) = lookup("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.metrics_port = Some(parsed),
                Ok(_) => tracing::warn!("METRICS_PORT must be > 0, metrics disabled"),
                Err(_) => tracing::warn!("Invalid METRICS_PORT '{}', metrics disabled", port),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate == 0 || self.tick_rate > 240 {
            return Err("tick_rate must be 1-240".to_string());
        }
        if self.max_players == 0 || self.max_players > room::MAX_PLAYERS {
            return Err(format!("max_players must be 1-{}", room::MAX_PLAYERS));
        }
        if self.sim_players == 0 {
            return Err("sim_players must be at least 1".to_string());
        }
        if self.sim_players > self.max_players {
            return Err("sim_players cannot exceed max_players".to_string());
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::from_secs(self.match_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> SyncConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_players, 5);
        assert_eq!(config.threat_counting, ThreatCounting::Strict);
        assert!(config.metrics_port.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("TICK_RATE", "30"),
            ("MAX_PLAYERS", "4"),
            ("THREAT_COUNTING", "soft"),
            ("SIM_PLAYERS", "4"),
            ("SIM_ROOM_NAME", "Crypt"),
            ("METRICS_PORT", "9191"),
        ]);
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_players, 4);
        assert_eq!(config.threat_counting, ThreatCounting::Soft);
        assert_eq!(config.sim_room_name, "Crypt");
        assert_eq!(config.metrics_port, Some(9191));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("TICK_RATE", "0"),
            ("MAX_PLAYERS", "9"),
            ("THREAT_COUNTING", "lossy"),
            ("MATCH_TIMEOUT_SECS", "soon"),
        ]);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_players, 5);
        assert_eq!(config.threat_counting, ThreatCounting::Strict);
        assert_eq!(config.match_timeout_secs, 120);
    }

    #[test]
    fn test_validate_rejects_oversized_sim() {
        let config = SyncConfig {
            sim_players: 5,
            max_players: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_interval() {
        let config = from_pairs(&[("TICK_RATE", "50")]);
        assert_eq!(config.frame_interval().as_millis(), 20);
    }
}
