// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fs;
use std::path::Path;

use ::config::{Config, File};
use tracing::info;

use crate::pattern::Pattern;

mod engine;
mod error;

pub use engine::EngineConfig;
pub use error::ConfigError;

/// Loads the engine configuration from a YAML file.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = Config::builder()
        .add_source(File::from(path))
        .build()?
        .try_deserialize()?;
    info!(path = %path.display(), device = config.device(), "Loaded engine config");
    Ok(config)
}

/// Reads a pattern from a YAML file. The result is normalized, so every voice
/// row has the pattern's step count.
pub fn load_pattern(path: &Path) -> Result<Pattern, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let pattern: Pattern =
        serde_yml::from_str(&contents).map_err(|source| ConfigError::Pattern {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(pattern.normalized())
}

/// Writes a pattern to a YAML file.
pub fn save_pattern(pattern: &Pattern, path: &Path) -> Result<(), ConfigError> {
    let contents = serde_yml::to_string(pattern).map_err(|source| ConfigError::Pattern {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, contents).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
