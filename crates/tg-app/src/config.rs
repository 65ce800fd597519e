use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::ConfigError;

pub const DEFAULT_GATEWAY_URL: &str = "https://gateway-us-west.404.xyz";

/// How to reach the generation service
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub api_key: String,
    /// Age after which a job is abandoned whatever the service reports
    pub task_timeout: Duration,
    /// Bound on a single HTTP call
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub poll_interval: Duration,
    pub output_dir: PathBuf,
    /// SPZ decompression library, or the directory holding it
    pub spz_library: Option<PathBuf>,
}

/// Values given on the command line; they win over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub spz_library: Option<PathBuf>,
}

impl AppConfig {
    /// Reads `.env` if present, then the process environment
    pub fn load(overrides: Overrides) -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        Self::from_lookup(|key| env::var(key).ok(), overrides)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, overrides: Overrides) -> Result<Self, ConfigError> {
        let url = overrides
            .url
            .or_else(|| lookup("THREEGEN_GATEWAY_URL"))
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        let api_key = overrides
            .api_key
            .or_else(|| lookup("THREEGEN_API_KEY"))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("THREEGEN_API_KEY".into()))?;

        let poll_interval = secs(&lookup, "THREEGEN_POLL_INTERVAL_SECS", 5)?;
        let task_timeout = secs(&lookup, "THREEGEN_TASK_TIMEOUT_SECS", 10 * 60)?;
        let request_timeout = secs(&lookup, "THREEGEN_REQUEST_TIMEOUT_SECS", 30)?;

        let output_dir = overrides
            .output_dir
            .or_else(|| lookup("THREEGEN_OUTPUT_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("outputs"));
        let spz_library = overrides
            .spz_library
            .or_else(|| lookup("THREEGEN_SPZ_LIBRARY").map(PathBuf::from));

        Ok(Self {
            gateway: GatewayConfig {
                url,
                api_key,
                task_timeout,
                request_timeout,
            },
            poll_interval,
            output_dir,
            spz_library,
        })
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let value = match lookup(key) {
        Some(raw) => parse(key, &raw)?,
        None => default,
    };

    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".into(),
        });
    }

    Ok(Duration::from_secs(value))
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("THREEGEN_API_KEY", "secret")]), Overrides::default()).unwrap();

        assert_eq!(config.gateway.url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.gateway.task_timeout, Duration::from_secs(600));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.output_dir, PathBuf::from("outputs"));
    }

    #[test]
    fn test_missing_api_key() {
        let err = AppConfig::from_lookup(lookup(&[]), Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "THREEGEN_API_KEY"));
    }

    #[test]
    fn test_invalid_interval() {
        let err = AppConfig::from_lookup(lookup(&[
            ("THREEGEN_API_KEY", "secret"),
            ("THREEGEN_POLL_INTERVAL_SECS", "soon"),
        ]), Overrides::default())
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = AppConfig::from_lookup(lookup(&[
            ("THREEGEN_API_KEY", "secret"),
            ("THREEGEN_TASK_TIMEOUT_SECS", "0"),
        ]), Overrides::default())
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_environment_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("THREEGEN_API_KEY", "secret"),
            ("THREEGEN_GATEWAY_URL", "http://localhost:4443"),
            ("THREEGEN_OUTPUT_DIR", "/tmp/splats"),
            ("THREEGEN_POLL_INTERVAL_SECS", "2"),
            ("THREEGEN_SPZ_LIBRARY", "/opt/spz"),
        ]), Overrides::default())
        .unwrap();

        assert_eq!(config.gateway.url, "http://localhost:4443");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/splats"));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.spz_library, Some(PathBuf::from("/opt/spz")));
    }

    #[test]
    fn test_command_line_wins() {
        let overrides = Overrides {
            api_key: Some("from-cli".into()),
            output_dir: Some(PathBuf::from("/tmp/cli")),
            ..Overrides::default()
        };
        let config = AppConfig::from_lookup(lookup(&[]), overrides).unwrap();
        assert_eq!(config.gateway.api_key, "from-cli");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/cli"));
        assert_eq!(config.spz_library, None);

        let overrides = Overrides {
            url: Some("http://localhost:9000".into()),
            api_key: Some("from-cli".into()),
            ..Overrides::default()
        };
        let config = AppConfig::from_lookup(
            lookup(&[("THREEGEN_API_KEY", "from-env"), ("THREEGEN_GATEWAY_URL", "http://env")]),
            overrides,
        )
        .unwrap();
        assert_eq!(config.gateway.api_key, "from-cli");
        assert_eq!(config.gateway.url, "http://localhost:9000");
    }
}
