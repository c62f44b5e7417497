use config::{Config, Environment};

use crate::error::ConfigError;
use crate::settings::Settings;

/// Loads `Settings` from the process environment. Variable names are flat
/// (no prefix) because they are an external contract shared with the
/// deployment tooling, unlike the workspace's usual `AUTH__`-prefixed
/// convention.
pub fn load() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let raw = Config::builder()
        .add_source(Environment::default().try_parsing(true))
        .build()?;

    let settings: Settings = raw.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
