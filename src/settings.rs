//! Runtime settings for the server binary.
//!
//! Settings are layered: a `lifespan` config file in the working directory
//! (TOML, JSON, or any other format the `config` crate recognises) is read
//! first if present, and `LIFESPAN_`-prefixed environment variables
//! override it, so `LIFESPAN_SERVER_BIND=0.0.0.0:9000` takes effect
//! without touching the file. Everything has a sensible default.

use serde::Deserialize;

use crate::error::{LifespanError, Result};
use crate::persist::PersistenceMode;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the HTTP listener binds to.
    pub bind: String,
}
impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: String::from("127.0.0.1:8080"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseMode {
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub mode: DatabaseMode,
    /// Database file, ignored in memory mode.
    pub path: String,
}
impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            mode: DatabaseMode::File,
            path: String::from("lifespan.db"),
        }
    }
}

impl Settings {
    /// Reads the optional config file and the environment overrides.
    pub fn load() -> Result<Settings> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("lifespan").required(false))
            .add_source(config::Environment::with_prefix("LIFESPAN").separator("_"))
            .build()
            .map_err(|e| LifespanError::Config(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| LifespanError::Config(e.to_string()))
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        match self.database.mode {
            DatabaseMode::Memory => PersistenceMode::InMemory,
            DatabaseMode::File => PersistenceMode::File(self.database.path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_a_local_file_database() {
        let settings = Settings::default();
        assert_eq!(settings.server.bind, "127.0.0.1:8080");
        assert_eq!(settings.database.mode, DatabaseMode::File);
        assert_eq!(
            settings.persistence_mode(),
            PersistenceMode::File(String::from("lifespan.db"))
        );
    }

    #[test]
    fn memory_mode_maps_to_in_memory_persistence() {
        let mut settings = Settings::default();
        settings.database.mode = DatabaseMode::Memory;
        assert_eq!(settings.persistence_mode(), PersistenceMode::InMemory);
    }
}
