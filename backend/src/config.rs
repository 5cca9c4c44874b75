use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: u64,
    pub operator_secret: String,
    /// How long a fresh lobby stays joinable before it expires.
    pub lobby_ttl_minutes: i64,
    /// Added to `expires_at` when the host starts the race.
    pub race_duration_minutes: i64,
    /// A player with no heartbeat inside this window counts as gone.
    pub idle_timeout_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub default_max_players: i32,
    pub port: u16,
    pub cors_allow_origins: Vec<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/shelterrun".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "your-secret-key-change-this-in-production".to_string());

        let jwt_expiration_hours = parse_env("JWT_EXPIRATION_HOURS", 3);

        let operator_secret = env::var("OPERATOR_SECRET")
            .unwrap_or_else(|_| "operator-secret-change-this-in-production".to_string());

        let lobby_ttl_minutes = parse_env("LOBBY_TTL_MINUTES", 30);
        let race_duration_minutes = parse_env("RACE_DURATION_MINUTES", 60);
        let idle_timeout_seconds = parse_env("IDLE_TIMEOUT_SECONDS", 180);
        let sweep_interval_seconds = parse_env("SWEEP_INTERVAL_SECONDS", 60);
        let default_max_players = parse_env("DEFAULT_MAX_PLAYERS", 8);
        let port = parse_env("PORT", 3000);

        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Config {
            database_url,
            jwt_secret,
            jwt_expiration_hours,
            operator_secret,
            lobby_ttl_minutes,
            race_duration_minutes,
            idle_timeout_seconds,
            sweep_interval_seconds,
            default_max_players,
            port,
            cors_allow_origins,
        })
    }

    pub fn idle_cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        now - chrono::Duration::seconds(self.idle_timeout_seconds)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn load_falls_back_to_defaults() {
        let config = Config::load().expect("load config");
        assert_eq!(config.jwt_expiration_hours, 3);
        assert_eq!(config.idle_timeout_seconds, 180);
        assert!(config.default_max_players >= 2);
    }

    #[test]
    fn idle_cutoff_subtracts_idle_window() {
        let config = Config::load().expect("load config");
        let now = Utc::now();
        assert_eq!(
            config.idle_cutoff(now),
            now - Duration::seconds(config.idle_timeout_seconds)
        );
    }
}
