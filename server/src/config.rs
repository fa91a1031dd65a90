//! Server configuration from CLI flags and environment variables.
//!
//! - `ENGINE_PATH`: engine executable used by the pool (required)
//! - `ENGINE_POOL_SIZE`: number of pre-spawned engines (default 4)
//! - `FRONTEND_PATH`: expected Origin header on websocket upgrade
//! - `API_KEYS`: comma-separated set of accepted `X-Api-Key` values

use std::path::PathBuf;

const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ENGINE_PATH is not set")]
    MissingEnginePath,
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid ENGINE_POOL_SIZE: {0}")]
    InvalidPoolSize(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,
    pub port: u16,
    pub engine_path: PathBuf,
    pub pool_size: usize,
    pub frontend_origin: Option<String>,
    pub api_keys: Vec<String>,
}

impl Config {
    pub fn load(debug: bool, port: &str) -> Result<Self, ConfigError> {
        let port = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;

        let engine_path = std::env::var("ENGINE_PATH")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::MissingEnginePath)?;

        let pool_size = match std::env::var("ENGINE_POOL_SIZE") {
            Ok(raw) => parse_pool_size(&raw).ok_or(ConfigError::InvalidPoolSize(raw))?,
            Err(_) => DEFAULT_POOL_SIZE,
        };

        let frontend_origin = std::env::var("FRONTEND_PATH").ok().filter(|s| !s.is_empty());

        let api_keys = std::env::var("API_KEYS")
            .map(|raw| parse_api_keys(&raw))
            .unwrap_or_default();

        Ok(Self {
            debug,
            port,
            engine_path,
            pool_size,
            frontend_origin,
            api_keys,
        })
    }
}

fn parse_pool_size(raw: &str) -> Option<usize> {
    raw.trim().parse().ok().filter(|n| *n > 0)
}

fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable behavior is exercised manually; mutating the
    // process environment from parallel tests pollutes other cases.

    #[test]
    fn test_parse_api_keys() {
        assert_eq!(parse_api_keys("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_api_keys(" key-1 , ,key-2,"), vec!["key-1", "key-2"]);
        assert!(parse_api_keys("").is_empty());
    }

    #[test]
    fn test_parse_pool_size() {
        assert_eq!(parse_pool_size("8"), Some(8));
        assert_eq!(parse_pool_size(" 2 "), Some(2));
        assert_eq!(parse_pool_size("0"), None);
        assert_eq!(parse_pool_size("lots"), None);
    }
}
