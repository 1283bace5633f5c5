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

//! Sound source loading and caching.
//!
//! Sources are read and decoded entirely into memory and resampled to the host
//! rate, so triggering a voice never touches the disk.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::resample::resample;
use crate::audio::{Host, HostError, SampleBuffer};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: HostError,
    },
    #[error("unable to resample {}: {source}", path.display())]
    Resample {
        path: PathBuf,
        #[source]
        source: HostError,
    },
}

/// Loads sound sources through a host and caches them by path.
pub struct SampleLoader {
    host: Arc<dyn Host>,
    /// Relative sources resolve against this directory.
    base_path: PathBuf,
    cache: HashMap<PathBuf, SampleBuffer>,
}

impl SampleLoader {
    pub fn new(host: Arc<dyn Host>, base_path: &Path) -> SampleLoader {
        SampleLoader {
            host,
            base_path: base_path.to_path_buf(),
            cache: HashMap::new(),
        }
    }

    /// The path a sound source refers to.
    pub fn resolve(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    /// Loads a sound source, returning the cached buffer if it was loaded before.
    pub fn load(&mut self, source: &str) -> Result<SampleBuffer, LoadError> {
        let path = self.resolve(source);
        if let Some(buffer) = self.cache.get(&path) {
            debug!(path = ?path, "Using cached sample");
            return Ok(buffer.clone());
        }

        let bytes = std::fs::read(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let decoded = self.host.decode(bytes).map_err(|source| LoadError::Decode {
            path: path.clone(),
            source,
        })?;

        let target_rate = self.host.sample_rate();
        if decoded.sample_rate() != target_rate {
            debug!(
                source_rate = decoded.sample_rate(),
                target_rate, "Resampling sample"
            );
        }
        let buffer = resample(&decoded, target_rate).map_err(|source| LoadError::Resample {
            path: path.clone(),
            source,
        })?;

        info!(
            path = ?path,
            channels = buffer.channel_count(),
            sample_rate = buffer.sample_rate(),
            duration_ms = buffer.duration().as_millis(),
            memory_kb = buffer.memory_size() / 1024,
            "Sample loaded"
        );

        self.cache.insert(path, buffer.clone());
        Ok(buffer)
    }

    /// Number of cached buffers.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Returns the total memory used by cached buffers.
    pub fn total_memory_usage(&self) -> usize {
        self.cache.values().map(|buffer| buffer.memory_size()).sum()
    }
}
