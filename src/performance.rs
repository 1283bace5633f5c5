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

//! Live performance controls: master probability, scatter and fills.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::pattern::{DrumVoice, Pattern, Step};

pub const MIN_SCATTER_DEPTH: u8 = 1;
pub const MAX_SCATTER_DEPTH: u8 = 10;
const DEFAULT_SCATTER_DEPTH: u8 = 5;

/// Timed scatter lasts one bar of four beats.
const SCATTER_BEATS: f64 = 4.0;

/// Velocity of the crash that lands on the downbeat after a fill.
const FILL_CRASH_VELOCITY: u8 = 110;

/// The voices of the tom cascade, one per quarter of the fill.
const CASCADE: [DrumVoice; 4] = [
    DrumVoice::Snare,
    DrumVoice::TomHigh,
    DrumVoice::TomMid,
    DrumVoice::TomLow,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillKind {
    /// A cascade from the snare down through the toms.
    A,
    /// A snare roll that builds in velocity.
    B,
}

impl fmt::Display for FillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillKind::A => write!(f, "A"),
            FillKind::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown fill: {0}")]
pub struct UnknownFill(String);

impl FromStr for FillKind {
    type Err = UnknownFill;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" | "1" => Ok(FillKind::A),
            "b" | "2" => Ok(FillKind::B),
            _ => Err(UnknownFill(s.to_string())),
        }
    }
}

impl FillKind {
    /// The hits of this fill over a region of `len` steps, as (voice, velocity)
    /// for each position of the region.
    pub fn hits(self, len: usize) -> Vec<(DrumVoice, u8)> {
        let ramp = |position: usize, from: f64, to: f64| -> u8 {
            if len <= 1 {
                return to as u8;
            }
            let t = position as f64 / (len - 1) as f64;
            (from + (to - from) * t).round() as u8
        };
        (0..len)
            .map(|position| match self {
                FillKind::A => (
                    CASCADE[(position * CASCADE.len() / len).min(CASCADE.len() - 1)],
                    ramp(position, 90.0, 120.0),
                ),
                FillKind::B => (DrumVoice::Snare, ramp(position, 60.0, 127.0)),
            })
            .collect()
    }
}

/// The steps a fill replaces: the pattern's marked fill steps, or the last
/// quarter of the loop when none are marked.
pub fn fill_region(pattern: &Pattern) -> Vec<usize> {
    if pattern.has_fill_region() {
        return (0..pattern.step_count)
            .filter(|step| pattern.is_fill_step(*step))
            .collect();
    }
    let len = (pattern.step_count / 4).max(1).min(pattern.step_count);
    (pattern.step_count - len..pattern.step_count).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    master_probability: f64,
    scatter_enabled: bool,
    scatter_depth: u8,
    /// Audio-clock time at which a timed scatter ends.
    scatter_until: Option<f64>,
    auto_fill_interval: u32,
    armed_fill: Option<FillKind>,
    active_fill: Option<FillKind>,
    crash_next_loop: bool,
    crash_this_loop: bool,
    loops: u64,
}

impl Default for Performance {
    fn default() -> Self {
        Performance {
            master_probability: 100.0,
            scatter_enabled: false,
            scatter_depth: DEFAULT_SCATTER_DEPTH,
            scatter_until: None,
            auto_fill_interval: 0,
            armed_fill: None,
            active_fill: None,
            crash_next_loop: false,
            crash_this_loop: false,
            loops: 0,
        }
    }
}

impl Performance {
    pub fn master_probability(&self) -> f64 {
        self.master_probability
    }

    /// Sets the master probability, clamped to 0-100.
    pub fn set_master_probability(&mut self, probability: f64) -> f64 {
        self.master_probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 100.0)
        };
        self.master_probability
    }

    /// Turns scatter on or off. The depth is clamped to 1-10. Any timed scatter
    /// is replaced.
    pub fn set_scatter(&mut self, enabled: bool, depth: u8) {
        self.scatter_enabled = enabled;
        self.scatter_depth = depth.clamp(MIN_SCATTER_DEPTH, MAX_SCATTER_DEPTH);
        self.scatter_until = None;
    }

    /// Enables scatter at the given depth for one bar starting at `now`.
    pub fn trigger_scatter(&mut self, intensity: u8, now: f64, bpm: f64) {
        self.set_scatter(true, intensity);
        let until = now + 60.0 / bpm * SCATTER_BEATS;
        self.scatter_until = Some(until);
        info!(depth = self.scatter_depth, until, "Scatter triggered");
    }

    pub fn scatter_enabled(&self) -> bool {
        self.scatter_enabled
    }

    pub fn scatter_depth(&self) -> u8 {
        self.scatter_depth
    }

    /// The scatter depth in effect for a hit scheduled at `time`.
    pub fn scatter_at(&self, time: f64) -> Option<u8> {
        if !self.scatter_enabled {
            return None;
        }
        match self.scatter_until {
            Some(until) if time >= until => None,
            _ => Some(self.scatter_depth),
        }
    }

    /// Ends a timed scatter once the audio clock passes its end.
    pub fn expire(&mut self, now: f64) {
        if let Some(until) = self.scatter_until {
            if now >= until {
                debug!("Scatter expired");
                self.scatter_enabled = false;
                self.scatter_until = None;
            }
        }
    }

    pub fn auto_fill_interval(&self) -> u32 {
        self.auto_fill_interval
    }

    /// Plays Fill A on the last loop of every group of `bars` loops. Zero
    /// turns auto-fill off.
    pub fn set_auto_fill_interval(&mut self, bars: u32) {
        self.auto_fill_interval = bars;
    }

    /// Arms a fill for the next loop.
    pub fn trigger_fill(&mut self, kind: FillKind) {
        info!(fill = %kind, "Fill armed");
        self.armed_fill = Some(kind);
    }

    pub fn armed_fill(&self) -> Option<FillKind> {
        self.armed_fill
    }

    /// The fill playing in the current loop.
    pub fn active_fill(&self) -> Option<FillKind> {
        self.active_fill
    }

    /// Starts a new pass through the pattern and decides whether it is a fill.
    pub fn begin_loop(&mut self) {
        self.crash_this_loop = self.crash_next_loop;
        let auto = self.auto_fill_interval > 0
            && (self.loops + 1) % u64::from(self.auto_fill_interval) == 0;
        self.active_fill = self
            .armed_fill
            .take()
            .or(if auto { Some(FillKind::A) } else { None });
        self.crash_next_loop = self.active_fill.is_some();
        if let Some(fill) = self.active_fill {
            debug!(fill = %fill, loop_number = self.loops, "Playing fill");
        }
        self.loops += 1;
    }

    /// Forgets loop history. Armed fills stay armed.
    pub fn reset_loops(&mut self) {
        self.loops = 0;
        self.active_fill = None;
        self.crash_this_loop = false;
        self.crash_next_loop = false;
    }

    /// The step a voice plays at an index, with the current fill and the
    /// downbeat crash applied. `None` means the pattern's own step is used.
    pub fn override_step(&self, pattern: &Pattern, voice: DrumVoice, index: usize) -> Option<Step> {
        if self.crash_this_loop && index == 0 && voice == DrumVoice::Crash {
            let playing = pattern.step(voice, index).is_some_and(|step| step.active);
            if !playing {
                return Some(Step::hit(FILL_CRASH_VELOCITY));
            }
        }

        let fill = self.active_fill?;
        if !voice.is_fill_voice() {
            return None;
        }
        let region = fill_region(pattern);
        let position = region.iter().position(|step| *step == index)?;
        let (fill_voice, velocity) = fill.hits(region.len())[position];
        if fill_voice == voice {
            Some(Step::hit(velocity))
        } else {
            Some(Step::off())
        }
    }
}
