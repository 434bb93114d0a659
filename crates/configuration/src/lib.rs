use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{Backend, CodecSettings, LogSettings, Settings, StoreConfig};

/// Prefix for environment overrides, e.g. `CLUSTERSTORE__STORE__HOST`.
pub const ENV_PREFIX: &str = "CLUSTERSTORE";

/// Loads the application configuration.
///
/// Values come from the TOML file at `path` (if it exists), overridden by
/// `CLUSTERSTORE__*` environment variables. A `.env` file is loaded first so
/// credentials can be kept out of the TOML file. The store section is
/// normalised and validated before it is returned.
pub fn load_config(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    // A missing .env is fine; the variables may already be in the environment.
    let _ = dotenvy::dotenv();

    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let mut settings = builder.try_deserialize::<Settings>()?;
    settings.store = settings.store.normalize();
    settings.store.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_normalizes_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[store]
backend = "sqlite"
path = "/var/lib/clusterstore/store.db"
max_open_conns = 4

[log]
level = "debug"
"#
        )
        .unwrap();

        let settings = load_config(&path).unwrap();
        assert_eq!(settings.store.backend, Backend::Sqlite);
        assert_eq!(settings.store.max_open_conns, 4);
        assert_eq!(settings.store.max_idle_conns, 4);
        assert_eq!(settings.log.level, "debug");
        assert!(settings.codec.secret.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.store.backend, Backend::Postgres);
        assert_eq!(settings.store.port, 5432);
        assert_eq!(settings.log.level, "info");
    }
}
