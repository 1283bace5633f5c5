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

//! The pattern data model: drum voices, steps and patterns.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod store;

/// The lowest tempo a pattern or the transport will accept.
pub const MIN_BPM: f64 = 60.0;

/// The highest tempo a pattern or the transport will accept.
pub const MAX_BPM: f64 = 300.0;

/// The tempo used when a pattern doesn't carry a usable one.
pub const DEFAULT_BPM: f64 = 120.0;

const MAX_ROLL: u8 = 16;
const MAX_PAN: i8 = 50;
const MAX_PITCH: i8 = 24;

/// One of the nine drum voices. The declaration order is the order voices are
/// evaluated and triggered on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrumVoice {
    Kick,
    Snare,
    #[serde(alias = "hihat")]
    ClosedHat,
    #[serde(alias = "openhat")]
    OpenHat,
    Crash,
    Ride,
    #[serde(alias = "tom1")]
    TomHigh,
    #[serde(alias = "tom2")]
    TomMid,
    #[serde(alias = "tom3")]
    TomLow,
}

impl DrumVoice {
    /// All voices in declaration order.
    pub const ALL: [DrumVoice; 9] = [
        DrumVoice::Kick,
        DrumVoice::Snare,
        DrumVoice::ClosedHat,
        DrumVoice::OpenHat,
        DrumVoice::Crash,
        DrumVoice::Ride,
        DrumVoice::TomHigh,
        DrumVoice::TomMid,
        DrumVoice::TomLow,
    ];

    /// The number of voices.
    pub const COUNT: usize = 9;

    /// A dense index suitable for per-voice arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The canonical name of the voice.
    pub fn name(self) -> &'static str {
        match self {
            DrumVoice::Kick => "kick",
            DrumVoice::Snare => "snare",
            DrumVoice::ClosedHat => "closed-hat",
            DrumVoice::OpenHat => "open-hat",
            DrumVoice::Crash => "crash",
            DrumVoice::Ride => "ride",
            DrumVoice::TomHigh => "tom-high",
            DrumVoice::TomMid => "tom-mid",
            DrumVoice::TomLow => "tom-low",
        }
    }

    /// The gain applied to a full-velocity hit before the mixer.
    pub fn base_gain(self) -> f32 {
        match self {
            DrumVoice::Kick => 1.0,
            DrumVoice::Snare => 0.9,
            DrumVoice::ClosedHat => 0.6,
            DrumVoice::OpenHat => 0.7,
            DrumVoice::Crash => 0.8,
            DrumVoice::Ride => 0.7,
            DrumVoice::TomHigh | DrumVoice::TomMid | DrumVoice::TomLow => 0.8,
        }
    }

    /// The General MIDI percussion note number for this voice.
    pub fn note(self) -> u8 {
        match self {
            DrumVoice::Kick => 36,
            DrumVoice::Snare => 38,
            DrumVoice::ClosedHat => 42,
            DrumVoice::OpenHat => 46,
            DrumVoice::Crash => 49,
            DrumVoice::Ride => 51,
            DrumVoice::TomHigh => 50,
            DrumVoice::TomMid => 47,
            DrumVoice::TomLow => 43,
        }
    }

    /// Looks up the voice for a percussion note number.
    pub fn from_note(note: u8) -> Option<DrumVoice> {
        DrumVoice::ALL.into_iter().find(|voice| voice.note() == note)
    }

    /// True for the voices that fills may replace.
    pub fn is_fill_voice(self) -> bool {
        matches!(
            self,
            DrumVoice::Snare | DrumVoice::TomHigh | DrumVoice::TomMid | DrumVoice::TomLow
        )
    }
}

impl fmt::Display for DrumVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown drum voice: {0}")]
pub struct UnknownVoice(String);

impl FromStr for DrumVoice {
    type Err = UnknownVoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let voice = match s.to_ascii_lowercase().as_str() {
            "kick" => DrumVoice::Kick,
            "snare" => DrumVoice::Snare,
            "closed-hat" | "hihat" => DrumVoice::ClosedHat,
            "open-hat" | "openhat" => DrumVoice::OpenHat,
            "crash" => DrumVoice::Crash,
            "ride" => DrumVoice::Ride,
            "tom-high" | "tom1" => DrumVoice::TomHigh,
            "tom-mid" | "tom2" => DrumVoice::TomMid,
            "tom-low" | "tom3" => DrumVoice::TomLow,
            _ => return Err(UnknownVoice(s.to_string())),
        };
        Ok(voice)
    }
}

/// Genre tags. A genre may override the sample used for individual voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Genre {
    #[default]
    Metal,
    PostHardcore,
    Metalcore,
    Jazz,
}

impl Genre {
    pub const ALL: [Genre; 4] = [
        Genre::Metal,
        Genre::PostHardcore,
        Genre::Metalcore,
        Genre::Jazz,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Genre::Metal => "metal",
            Genre::PostHardcore => "post-hardcore",
            Genre::Metalcore => "metalcore",
            Genre::Jazz => "jazz",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown genre: {0}")]
pub struct UnknownGenre(String);

impl FromStr for Genre {
    type Err = UnknownGenre;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Genre::ALL
            .into_iter()
            .find(|genre| genre.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownGenre(s.to_string()))
    }
}

fn default_velocity() -> u8 {
    100
}

fn default_probability() -> u8 {
    100
}

/// One cell in a voice's step row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Whether the step sounds at all.
    #[serde(default)]
    pub active: bool,
    /// Hit velocity, 0-127.
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    /// Accent marker. Carried as data and written to notation.
    #[serde(default)]
    pub accent: bool,
    /// Chance of the step sounding, 0-100.
    #[serde(default = "default_probability")]
    pub probability: u8,
    /// Adds a grace note just before the hit.
    #[serde(default)]
    pub flam: bool,
    /// Number of evenly spaced sub-hits replacing the hit, up to 16. Zero disables.
    #[serde(default)]
    pub roll: u8,
    /// Stereo position, -50 (left) to 50 (right).
    #[serde(default)]
    pub pan: i8,
    /// Pitch offset in semitones, -24 to 24.
    #[serde(default)]
    pub pitch: i8,
}

impl Default for Step {
    fn default() -> Self {
        Step {
            active: false,
            velocity: default_velocity(),
            accent: false,
            probability: default_probability(),
            flam: false,
            roll: 0,
            pan: 0,
            pitch: 0,
        }
    }
}

impl Step {
    /// An inactive step.
    pub fn off() -> Step {
        Step::default()
    }

    /// An active step at the given velocity.
    pub fn hit(velocity: u8) -> Step {
        Step {
            active: true,
            velocity,
            ..Step::default()
        }
    }

    /// Returns a copy with every field clamped into its legal range.
    pub fn clamped(&self) -> Step {
        Step {
            active: self.active,
            velocity: self.velocity.min(127),
            accent: self.accent,
            probability: self.probability.min(100),
            flam: self.flam,
            roll: self.roll.min(MAX_ROLL),
            pan: self.pan.clamp(-MAX_PAN, MAX_PAN),
            pitch: self.pitch.clamp(-MAX_PITCH, MAX_PITCH),
        }
    }

    /// Pan mapped onto -1.0..=1.0.
    pub fn pan_position(&self) -> f32 {
        f32::from(self.pan) / f32::from(MAX_PAN)
    }

    /// Playback rate multiplier for the pitch offset.
    pub fn playback_rate(&self) -> f64 {
        2f64.powf(f64::from(self.pitch) / 12.0)
    }
}

fn default_variations() -> u32 {
    1
}

/// A named, tempo-tagged grid of steps for each voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genre: Genre,
    pub bpm: f64,
    /// Loop length in sixteenth-note steps.
    #[serde(rename = "steps")]
    pub step_count: usize,
    /// Swing amount. Stored as written; see [`Pattern::swing_percent`].
    #[serde(default)]
    pub swing: f64,
    /// Step rows keyed by voice. A voice that is absent never sounds.
    #[serde(rename = "beats", default)]
    pub voices: BTreeMap<DrumVoice, Vec<Step>>,
    #[serde(default = "default_variations")]
    pub variations: u32,
    /// Steps that belong to the fill region.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fills: Vec<bool>,
}

impl Pattern {
    /// Creates an empty pattern.
    pub fn new(id: &str, name: &str, genre: Genre, bpm: f64, step_count: usize) -> Pattern {
        Pattern {
            id: id.to_string(),
            name: name.to_string(),
            genre,
            bpm,
            step_count,
            swing: 0.0,
            voices: BTreeMap::new(),
            variations: 1,
            fills: Vec::new(),
        }
    }

    /// Sets a voice row from a list of active step indices, all at one velocity.
    pub fn with_hits(mut self, voice: DrumVoice, steps: &[usize], velocity: u8) -> Pattern {
        let mut row = vec![Step::off(); self.step_count];
        for &index in steps {
            if let Some(step) = row.get_mut(index) {
                *step = Step::hit(velocity);
            }
        }
        self.voices.insert(voice, row);
        self
    }

    /// Returns the step for a voice, if the voice is present and the index is in range.
    pub fn step(&self, voice: DrumVoice, index: usize) -> Option<&Step> {
        self.voices.get(&voice).and_then(|row| row.get(index))
    }

    /// Swing expressed as a percentage in 0..=100. Values at or below 1.0 are
    /// read as fractions.
    pub fn swing_percent(&self) -> f64 {
        let swing = if self.swing <= 1.0 {
            self.swing * 100.0
        } else {
            self.swing
        };
        if swing.is_nan() {
            0.0
        } else {
            swing.clamp(0.0, 100.0)
        }
    }

    /// True if the step belongs to an explicit fill region.
    pub fn is_fill_step(&self, index: usize) -> bool {
        self.fills.get(index).copied().unwrap_or(false)
    }

    /// True if the pattern marks any fill steps.
    pub fn has_fill_region(&self) -> bool {
        self.fills.iter().any(|f| *f)
    }

    /// Returns a copy that satisfies every pattern invariant: each present voice
    /// has exactly `step_count` steps, every step is in range, and the tempo is
    /// within bounds.
    pub fn normalized(&self) -> Pattern {
        let step_count = self.step_count.max(1);
        let voices = self
            .voices
            .iter()
            .map(|(voice, row)| {
                let mut row: Vec<Step> = row.iter().take(step_count).map(Step::clamped).collect();
                row.resize(step_count, Step::off());
                (*voice, row)
            })
            .collect();
        let mut fills = self.fills.clone();
        if !fills.is_empty() {
            fills.resize(step_count, false);
        }

        Pattern {
            id: self.id.clone(),
            name: self.name.clone(),
            genre: self.genre,
            bpm: if self.bpm.is_nan() {
                DEFAULT_BPM
            } else {
                self.bpm.clamp(MIN_BPM, MAX_BPM)
            },
            step_count,
            swing: self.swing,
            voices,
            variations: self.variations.max(1),
            fills,
        }
    }

    /// Number of active steps across all voices.
    pub fn active_count(&self) -> usize {
        self.voices
            .values()
            .map(|row| row.iter().filter(|s| s.active).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_order_and_index() {
        for (i, voice) in DrumVoice::ALL.iter().enumerate() {
            assert_eq!(voice.index(), i);
        }
        assert!(DrumVoice::Kick < DrumVoice::TomLow);
    }

    #[test]
    fn test_voice_notes_round_trip() {
        for voice in DrumVoice::ALL {
            assert_eq!(DrumVoice::from_note(voice.note()), Some(voice));
        }
        assert_eq!(DrumVoice::from_note(60), None);
    }

    #[test]
    fn test_voice_parse_aliases() {
        assert_eq!("hihat".parse::<DrumVoice>().unwrap(), DrumVoice::ClosedHat);
        assert_eq!("tom3".parse::<DrumVoice>().unwrap(), DrumVoice::TomLow);
        assert_eq!("Open-Hat".parse::<DrumVoice>().unwrap(), DrumVoice::OpenHat);
        assert!("cowbell".parse::<DrumVoice>().is_err());
    }

    #[test]
    fn test_step_defaults() {
        let step = Step::default();
        assert!(!step.active);
        assert_eq!(step.velocity, 100);
        assert_eq!(step.probability, 100);
        assert_eq!(step.roll, 0);
    }

    #[test]
    fn test_step_clamped() {
        let step = Step {
            active: true,
            velocity: 200,
            probability: 150,
            roll: 40,
            pan: -120,
            pitch: 30,
            ..Step::default()
        }
        .clamped();
        assert_eq!(step.velocity, 127);
        assert_eq!(step.probability, 100);
        assert_eq!(step.roll, 16);
        assert_eq!(step.pan, -50);
        assert_eq!(step.pitch, 24);
        assert_eq!(step.pan_position(), -1.0);
    }

    #[test]
    fn test_playback_rate() {
        let step = Step {
            pitch: 12,
            ..Step::default()
        };
        assert!((step.playback_rate() - 2.0).abs() < 1e-9);
        assert!((Step::default().playback_rate() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_swing_percent() {
        let mut pattern = Pattern::new("p", "p", Genre::Metal, 120.0, 16);
        pattern.swing = 0.67;
        assert!((pattern.swing_percent() - 67.0).abs() < 1e-9);
        pattern.swing = 67.0;
        assert!((pattern.swing_percent() - 67.0).abs() < 1e-9);
        pattern.swing = 250.0;
        assert_eq!(pattern.swing_percent(), 100.0);
        pattern.swing = f64::NAN;
        assert_eq!(pattern.swing_percent(), 0.0);
    }

    #[test]
    fn test_normalized_tempo_is_always_in_range() {
        let mut pattern = Pattern::new("p", "p", Genre::Metal, f64::NAN, 4);
        assert_eq!(pattern.normalized().bpm, DEFAULT_BPM);
        pattern.bpm = f64::INFINITY;
        assert_eq!(pattern.normalized().bpm, MAX_BPM);
        pattern.bpm = f64::NEG_INFINITY;
        assert_eq!(pattern.normalized().bpm, MIN_BPM);
    }

    #[test]
    fn test_normalized_pads_and_truncates() {
        let mut pattern = Pattern::new("p", "p", Genre::Metal, 400.0, 4);
        pattern.voices.insert(DrumVoice::Kick, vec![Step::hit(100)]);
        pattern
            .voices
            .insert(DrumVoice::Snare, vec![Step::hit(100); 8]);
        pattern.fills = vec![true];

        let pattern = pattern.normalized();
        assert_eq!(pattern.voices[&DrumVoice::Kick].len(), 4);
        assert_eq!(pattern.voices[&DrumVoice::Snare].len(), 4);
        assert_eq!(pattern.fills, vec![true, false, false, false]);
        assert_eq!(pattern.bpm, MAX_BPM);
    }

    #[test]
    fn test_pattern_yaml() {
        let yaml = r#"
id: basic
name: Basic Rock
genre: metal
bpm: 120
steps: 4
swing: 0.5
beats:
  kick:
    - active: true
      velocity: 110
    - {}
  hihat:
    - active: true
"#;
        let pattern: Pattern = serde_yml::from_str(yaml).unwrap();
        let pattern = pattern.normalized();
        assert_eq!(pattern.step_count, 4);
        assert_eq!(pattern.step(DrumVoice::Kick, 0).unwrap().velocity, 110);
        assert!(!pattern.step(DrumVoice::Kick, 1).unwrap().active);
        assert_eq!(pattern.step(DrumVoice::ClosedHat, 0).unwrap().velocity, 100);
        assert_eq!(pattern.step(DrumVoice::ClosedHat, 3).map(|s| s.active), Some(false));
        assert!(pattern.step(DrumVoice::Snare, 0).is_none());
        assert_eq!(pattern.variations, 1);
        assert_eq!(pattern.active_count(), 2);
    }
}
