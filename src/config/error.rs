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
use std::path::PathBuf;

use crate::pattern::UnknownGenre;

/// Typed error for config and pattern file failures so callers can tell a
/// missing file from a bad value without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("unable to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid pattern file {}: {source}", path.display())]
    Pattern {
        path: PathBuf,
        source: serde_yml::Error,
    },

    #[error("invalid duration for {field}: {source}")]
    Duration {
        field: &'static str,
        source: duration_string::Error,
    },

    #[error(transparent)]
    Genre(#[from] UnknownGenre),
}
