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
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;
use crate::kit::DEFAULT_KIT;
use crate::mixer::DEFAULT_MASTER_VOLUME;
use crate::pattern::Genre;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_SAMPLES_PATH: &str = "samples";
const DEFAULT_GENRE: Genre = Genre::Metal;
const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(25);
const DEFAULT_SCHEDULE_AHEAD: Duration = Duration::from_millis(100);

/// Genre value that turns genre overrides off.
const NO_GENRE: &str = "none";

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct EngineConfig {
    /// The audio device. Names starting with `mock` or `offline` select the
    /// test and offline hosts.
    device: String,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Directory that kit sample references resolve against.
    samples_path: Option<PathBuf>,

    /// The kit to load at startup (default: pearl).
    kit: Option<String>,

    /// The genre whose overrides apply (default: metal, `none` for no overrides).
    genre: Option<String>,

    /// How often the scheduling timer wakes up (default: 25ms).
    lookahead: Option<String>,

    /// How far ahead of the audio clock steps are scheduled (default: 100ms).
    schedule_ahead: Option<String>,

    /// Master volume, 0-1 (default: 0.7).
    master_volume: Option<f32>,

    /// Cancel already submitted hits that haven't started on stop and pause.
    cancel_pending_on_stop: Option<bool>,
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|source| ConfigError::Duration { field, source })?
            .into()),
        None => Ok(default),
    }
}

impl EngineConfig {
    /// Creates a configuration for the given device with every other setting
    /// at its default.
    pub fn new(device: &str) -> EngineConfig {
        EngineConfig {
            device: device.to_string(),
            sample_rate: None,
            samples_path: None,
            kit: None,
            genre: None,
            lookahead: None,
            schedule_ahead: None,
            master_volume: None,
            cancel_pending_on_stop: None,
        }
    }

    pub fn with_samples_path(mut self, path: &Path) -> EngineConfig {
        self.samples_path = Some(path.to_path_buf());
        self
    }

    pub fn with_kit(mut self, kit: &str) -> EngineConfig {
        self.kit = Some(kit.to_string());
        self
    }

    pub fn with_genre(mut self, genre: Option<Genre>) -> EngineConfig {
        self.genre = Some(genre.map_or(NO_GENRE.to_string(), |genre| genre.name().to_string()));
        self
    }

    pub fn with_cancel_pending_on_stop(mut self, cancel: bool) -> EngineConfig {
        self.cancel_pending_on_stop = Some(cancel);
        self
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn samples_path(&self) -> PathBuf {
        self.samples_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAMPLES_PATH))
    }

    pub fn kit(&self) -> &str {
        self.kit.as_deref().unwrap_or(DEFAULT_KIT)
    }

    /// The configured genre, or `None` if overrides are turned off.
    pub fn genre(&self) -> Result<Option<Genre>, ConfigError> {
        match self.genre.as_deref() {
            None => Ok(Some(DEFAULT_GENRE)),
            Some(genre) if genre.eq_ignore_ascii_case(NO_GENRE) => Ok(None),
            Some(genre) => Ok(Some(Genre::from_str(genre)?)),
        }
    }

    pub fn lookahead(&self) -> Result<Duration, ConfigError> {
        parse_duration("lookahead", &self.lookahead, DEFAULT_LOOKAHEAD)
    }

    pub fn schedule_ahead(&self) -> Result<Duration, ConfigError> {
        parse_duration("schedule_ahead", &self.schedule_ahead, DEFAULT_SCHEDULE_AHEAD)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.unwrap_or(DEFAULT_MASTER_VOLUME)
    }

    pub fn cancel_pending_on_stop(&self) -> bool {
        self.cancel_pending_on_stop.unwrap_or(false)
    }
}
