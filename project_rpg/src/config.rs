use std::path::{Path, PathBuf};

use serde::Deserialize;

use engine_core::TickConfig;
use net::{RateLimitConfig, WebServerConfig};
use world::{CombatConfig, WorldConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub ws_addr: String,
    pub web_static_dir: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            ws_addr: "0.0.0.0:4001".to_string(),
            web_static_dir: "web_dist".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickSection {
    pub tps: u32,
}

impl Default for TickSection {
    fn default() -> Self {
        Self { tps: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldSection {
    pub maps_dir: String,
    /// Holds `entities.json` and `items.json`.
    pub content_dir: String,
    pub start_area: String,
    pub seed: u64,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            maps_dir: "maps".to_string(),
            content_dir: "content".to_string(),
            start_area: "town".to_string(),
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CombatSection {
    pub attack_interval_secs: f64,
    pub aggro_prune_secs: f64,
}

impl Default for CombatSection {
    fn default() -> Self {
        let combat = CombatConfig::default();
        Self {
            attack_interval_secs: combat.attack_interval_secs,
            aggro_prune_secs: combat.aggro_prune_secs,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathfindingSection {
    /// 0 = the area's cell count.
    pub max_expansions: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
    pub max_commands_per_second: u32,
    pub max_input_length: usize,
}

impl Default for SecuritySection {
    fn default() -> Self {
        let limits = RateLimitConfig::default();
        Self {
            max_connections_total: limits.max_connections_total,
            max_connections_per_ip: limits.max_connections_per_ip,
            max_commands_per_second: limits.max_commands_per_second,
            max_input_length: limits.max_input_length,
        }
    }
}

/// Top-level RPG server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetConfig,
    pub tick: TickSection,
    pub world: WorldSection,
    pub combat: CombatSection,
    pub pathfinding: PathfindingSection,
    pub security: SecuritySection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path. A missing file means defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    pub fn to_tick_config(&self) -> TickConfig {
        TickConfig {
            tps: self.tick.tps,
            max_ticks: 0,
        }
    }

    pub fn to_world_config(&self) -> WorldConfig {
        WorldConfig {
            start_area: self.world.start_area.clone(),
            seed: self.world.seed,
            combat: CombatConfig {
                attack_interval_secs: self.combat.attack_interval_secs,
                aggro_prune_secs: self.combat.aggro_prune_secs,
            },
            max_expansions: self.pathfinding.max_expansions,
        }
    }

    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_connections_total: self.security.max_connections_total,
            max_connections_per_ip: self.security.max_connections_per_ip,
            max_commands_per_second: self.security.max_commands_per_second,
            max_input_length: self.security.max_input_length,
        }
    }

    /// The static directory is only served when it exists.
    pub fn to_web_server_config(&self) -> WebServerConfig {
        let dir = PathBuf::from(&self.net.web_static_dir);
        WebServerConfig {
            addr: self.net.ws_addr.clone(),
            static_dir: dir.is_dir().then_some(dir),
            limits: self.to_rate_limit_config(),
        }
    }
}

/// Parse CLI arguments and load config.
/// Supports: --config <path>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.net.ws_addr, "0.0.0.0:4001");
        assert_eq!(config.tick.tps, 10);
        assert_eq!(config.world.start_area, "town");
        assert_eq!(config.world.maps_dir, "maps");
        assert_eq!(config.combat.attack_interval_secs, 1.0);
        assert_eq!(config.combat.aggro_prune_secs, 5.0);
        assert_eq!(config.pathfinding.max_expansions, 0);
        assert_eq!(config.security.max_connections_per_ip, 5);
    }

    #[test]
    fn converts_to_engine_types() {
        let config = ServerConfig::default();
        let tc = config.to_tick_config();
        assert_eq!(tc.tps, 10);
        assert_eq!(tc.max_ticks, 0);

        let wc = config.to_world_config();
        assert_eq!(wc.seed, 0x5eed);
        assert_eq!(wc.combat, CombatConfig::default());

        let rl = config.to_rate_limit_config();
        assert_eq!(rl.max_commands_per_second, 20);
        assert_eq!(rl.max_input_length, 4096);
    }

    #[test]
    fn missing_file_returns_defaults() {
        let config = ServerConfig::load(Some("/tmp/nonexistent_rpg_config_12345.toml")).unwrap();
        assert_eq!(config.tick.tps, 10);
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.world.content_dir, "content");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[tick]
tps = 20

[world]
start_area = "dungeon"

[combat]
attack_interval_secs = 0.5
"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(f.path().to_str().unwrap())).unwrap();
        assert_eq!(config.tick.tps, 20);
        assert_eq!(config.world.start_area, "dungeon");
        assert_eq!(config.world.maps_dir, "maps");
        assert_eq!(config.combat.attack_interval_secs, 0.5);
        assert_eq!(config.combat.aggro_prune_secs, 5.0);
        assert_eq!(config.net.ws_addr, "0.0.0.0:4001");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[tick]\ntps = \"fast\"\n").unwrap();
        assert!(ServerConfig::load(Some(f.path().to_str().unwrap())).is_err());
    }
}
