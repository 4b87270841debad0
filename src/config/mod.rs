mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BroadcasterSettings, LogSettings, ServerSettings, Settings, SimulatorSettings};

/// Prefix for environment overrides, e.g. `SECDASH_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "SECDASH";

/// Loads the configuration from `config/default` (if present), a `.env` file
/// and environment variables, merged over the built-in defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();
    load_config_from(Path::new("config/default"))
}

/// Same as [`load_config`] but reads the file source from `path`.
/// The file is optional; its extension selects the format.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("broadcaster.channels"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
