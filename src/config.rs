//! Server configuration, read from `server.toml` with serde. Every key is
//! optional and defaulted; unknown keys abort startup so typos surface
//! immediately instead of silently running with defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use server_core::RateLimiter;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct Config {
    pub max_players: usize,
    /// Chunk radius cap, clamped to 2..=32 when applied per player.
    pub view_distance: i32,
    pub listen_address: String,
    pub motd: String,
    pub network_compression_threshold: i32,
    pub online_mode: bool,
    pub level_name: String,
    pub enforce_secure_profile: bool,
    pub chunk_loading_limiter: LimiterConfig,
    pub player_chunk_loading_limiter: LimiterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_players: 20,
            view_distance: 10,
            listen_address: "0.0.0.0:25565".to_owned(),
            motd: "A Stonereach server".to_owned(),
            network_compression_threshold: 256,
            online_mode: false,
            level_name: "world".to_owned(),
            enforce_secure_profile: false,
            chunk_loading_limiter: LimiterConfig {
                every: Duration::from_millis(25),
                n: 160,
            },
            player_chunk_loading_limiter: LimiterConfig {
                every: Duration::from_millis(50),
                n: 40,
            },
        }
    }
}

/// Token-bucket settings: `n` actions per `every`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub every: Duration,
    pub n: u32,
}

impl LimiterConfig {
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.every, self.n)
    }
}

/// Load the configuration, falling back to defaults when the file does not
/// exist.
pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.is_file() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: Config =
        toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(config)
}

/// Durations in config read as humane strings: `"250ms"`, `"5s"`, `"2m"`.
fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| format!("missing unit in duration {text:?}"))?;
    let (value, unit) = text.split_at(split);
    let value: f64 = value
        .parse()
        .map_err(|_| format!("bad duration value {text:?}"))?;
    let seconds = match unit {
        "us" | "µs" => value / 1_000_000.0,
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(format!("unknown duration unit {unit:?}")),
    };
    Ok(Duration::from_secs_f64(seconds))
}

fn deserialize_duration<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(de)?;
    parse_duration(&text).map_err(serde::de::Error::custom)
}
