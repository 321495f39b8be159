use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use once_cell::sync::OnceCell;

pub static CONFIG: OnceCell<Configuration> = OnceCell::new();

/// File looked up in the working directory when no path is given
pub const CONFIG_FILE: &str = "tsdbq.toml";

/// Prefix of environment overrides, e.g. `TSDBQ__TSDB__HOST`
pub const ENV_PREFIX: &str = "TSDBQ__";

/// Connection settings for the OpenTSDB server
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TsdbConfig {
    /// Server address as `hostname:port` or a base URL
    pub host: String,
    /// Deadline for a single query round trip
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TsdbConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost:4242"),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Auto-downsample every request to about this many points. 0 disables it.
    pub target_points: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub tsdb: TsdbConfig,
    pub query: QueryConfig,
}

impl Configuration {
    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load defaults, then `tsdbq.toml`, then `TSDBQ__` environment variables
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from_path(Path::new(CONFIG_FILE))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert_eq!(config.tsdb.host, "localhost:4242");
        assert_eq!(config.tsdb.timeout, Duration::from_secs(30));
        assert_eq!(config.query.target_points, 0);
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().expect("defaults load without a file");
            assert_eq!(config.tsdb.host, "localhost:4242");
            Ok(())
        });
    }

    #[test]
    fn test_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [tsdb]
                host = "tsdb.internal:4242"
                timeout = "5s"

                [query]
                target_points = 500
                "#,
            )?;

            let config = Configuration::load().expect("file is valid");
            assert_eq!(config.tsdb.host, "tsdb.internal:4242");
            assert_eq!(config.tsdb.timeout, Duration::from_secs(5));
            assert_eq!(config.query.target_points, 500);
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[tsdb]\nhost = \"from-file:4242\"\n")?;
            jail.set_env("TSDBQ__TSDB__HOST", "from-env:4242");
            jail.set_env("TSDBQ__TSDB__TIMEOUT", "2m");

            let config = Configuration::load_from_path(Path::new("custom.toml"))
                .expect("env overrides are valid");
            assert_eq!(config.tsdb.host, "from-env:4242");
            assert_eq!(config.tsdb.timeout, Duration::from_secs(120));
            Ok(())
        });
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("TSDBQ__TSDB__TIMEOUT", "eventually");
            assert!(Configuration::load().is_err());
            Ok(())
        });
    }
}
