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
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::audio::{FilterKind, NodeSpec};
use crate::pattern::DrumVoice;

/// Effects available on a voice, in signal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    Filter,
    Distortion,
    Compressor,
    Delay,
    Reverb,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::Filter,
        EffectKind::Distortion,
        EffectKind::Compressor,
        EffectKind::Delay,
        EffectKind::Reverb,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Filter => "filter",
            EffectKind::Distortion => "distortion",
            EffectKind::Compressor => "compressor",
            EffectKind::Delay => "delay",
            EffectKind::Reverb => "reverb",
        }
    }
}

/// Stages of the master bus, in signal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MasterEffect {
    Reverb,
    Delay,
    Eq,
    Limiter,
}

impl MasterEffect {
    pub const ALL: [MasterEffect; 4] = [
        MasterEffect::Reverb,
        MasterEffect::Delay,
        MasterEffect::Eq,
        MasterEffect::Limiter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MasterEffect::Reverb => "reverb",
            MasterEffect::Delay => "delay",
            MasterEffect::Eq => "eq",
            MasterEffect::Limiter => "limiter",
        }
    }
}

macro_rules! display_and_parse {
    ($kind:ty, $err:literal) => {
        impl fmt::Display for $kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl FromStr for $kind {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|kind| kind.name().eq_ignore_ascii_case(s))
                    .ok_or_else(|| format!("{}: {}", $err, s))
            }
        }
    };
}

display_and_parse!(EffectKind, "unknown effect");
display_and_parse!(MasterEffect, "unknown master effect");

/// A named effect parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectParam {
    Number(f64),
    Text(String),
}

impl From<f64> for EffectParam {
    fn from(value: f64) -> Self {
        EffectParam::Number(value)
    }
}

impl From<&str> for EffectParam {
    fn from(value: &str) -> Self {
        EffectParam::Text(value.to_string())
    }
}

/// The stored state of one effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Wet mix, 0-100.
    #[serde(default = "full_wet")]
    pub wet: f64,
    #[serde(default)]
    pub params: BTreeMap<String, EffectParam>,
}

fn full_wet() -> f64 {
    100.0
}

impl EffectConfig {
    fn new(enabled: bool, wet: f64, params: &[(&str, f64)]) -> EffectConfig {
        EffectConfig {
            enabled,
            wet,
            params: params
                .iter()
                .map(|(name, value)| (name.to_string(), EffectParam::Number(*value)))
                .collect(),
        }
    }

    /// A numeric parameter, or the default if it is missing or not a number.
    pub fn number(&self, name: &str, default: f64) -> f64 {
        match self.params.get(name) {
            Some(EffectParam::Number(value)) if value.is_finite() => *value,
            _ => default,
        }
    }

    /// A text parameter.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.params.get(name) {
            Some(EffectParam::Text(value)) => Some(value),
            _ => None,
        }
    }

    fn wet_fraction(&self) -> f32 {
        (self.wet.clamp(0.0, 100.0) / 100.0) as f32
    }

    /// Merges a partial update into this config.
    pub fn apply(&mut self, update: &EffectUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(wet) = update.wet {
            self.wet = if wet.is_nan() { 0.0 } else { wet.clamp(0.0, 100.0) };
        }
        for (name, value) in &update.params {
            self.params.insert(name.clone(), value.clone());
        }
    }

    /// The processing node a voice effect builds from this config.
    pub fn voice_node(&self, kind: EffectKind) -> NodeSpec {
        let wet = self.wet_fraction();
        match kind {
            EffectKind::Filter => NodeSpec::Filter {
                kind: match self.text("type") {
                    Some("highshelf") => FilterKind::Highshelf,
                    _ => FilterKind::Lowpass,
                },
                frequency: self.number("cutoff", 8000.0) as f32,
                q: self.number("resonance", 1.0) as f32,
                gain_db: self.number("gain", 0.0) as f32,
                wet,
            },
            EffectKind::Distortion => NodeSpec::Distortion {
                drive: self.number("drive", 20.0) as f32,
                wet,
            },
            EffectKind::Compressor => NodeSpec::Compressor {
                threshold: self.number("threshold", -12.0) as f32,
                knee: self.number("knee", 30.0) as f32,
                ratio: self.number("ratio", 4.0) as f32,
                attack: 0.003,
                release: 0.1,
                wet,
            },
            EffectKind::Delay => NodeSpec::Delay {
                time: (self.number("time", 125.0) / 1000.0) as f32,
                feedback: (self.number("feedback", 25.0) / 100.0) as f32,
                wet,
            },
            EffectKind::Reverb => NodeSpec::Reverb {
                room: (self.number("room", 30.0) / 100.0) as f32,
                decay: (self.number("decay", 40.0) / 100.0) as f32,
                wet,
            },
        }
    }

    /// The processing node a master stage builds from this config.
    pub fn master_node(&self, effect: MasterEffect) -> NodeSpec {
        let wet = self.wet_fraction();
        match effect {
            MasterEffect::Reverb => NodeSpec::Reverb {
                room: (self.number("room", 50.0) / 100.0) as f32,
                decay: (self.number("decay", 40.0) / 100.0) as f32,
                wet,
            },
            MasterEffect::Delay => NodeSpec::Delay {
                time: (self.number("time", 250.0) / 1000.0) as f32,
                feedback: (self.number("feedback", 30.0) / 100.0) as f32,
                wet,
            },
            MasterEffect::Eq => NodeSpec::Filter {
                kind: FilterKind::Highshelf,
                frequency: self.number("frequency", 10000.0) as f32,
                q: 0.707,
                gain_db: self.number("gain", 0.0) as f32,
                wet,
            },
            MasterEffect::Limiter => NodeSpec::Compressor {
                threshold: self.number("threshold", -1.0) as f32,
                knee: 0.0,
                ratio: self.number("ratio", 20.0) as f32,
                attack: 0.003,
                release: 0.01,
                wet,
            },
        }
    }
}

/// A partial change to an effect. Missing fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub wet: Option<f64>,
    #[serde(default)]
    pub params: BTreeMap<String, EffectParam>,
}

impl EffectUpdate {
    pub fn enable() -> EffectUpdate {
        EffectUpdate {
            enabled: Some(true),
            ..Default::default()
        }
    }

    pub fn disable() -> EffectUpdate {
        EffectUpdate {
            enabled: Some(false),
            ..Default::default()
        }
    }

    pub fn with_wet(mut self, wet: f64) -> EffectUpdate {
        self.wet = Some(wet);
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<EffectParam>) -> EffectUpdate {
        self.params.insert(name.to_string(), value.into());
        self
    }
}

/// The starting configuration of a voice effect. Every effect starts disabled.
pub fn voice_default(voice: DrumVoice, kind: EffectKind) -> EffectConfig {
    use DrumVoice::*;

    let (wet, params): (f64, &[(&str, f64)]) = match (kind, voice) {
        (EffectKind::Reverb, Kick) => (20.0, &[("room", 30.0), ("decay", 40.0)]),
        (EffectKind::Reverb, Snare) => (35.0, &[("room", 50.0), ("decay", 30.0)]),
        (EffectKind::Reverb, ClosedHat) => (15.0, &[("room", 20.0), ("decay", 15.0)]),
        (EffectKind::Reverb, OpenHat) => (25.0, &[("room", 40.0), ("decay", 25.0)]),
        (EffectKind::Reverb, Crash) => (45.0, &[("room", 70.0), ("decay", 60.0)]),
        (EffectKind::Reverb, Ride) => (30.0, &[("room", 50.0), ("decay", 45.0)]),
        (EffectKind::Reverb, TomHigh | TomMid | TomLow) => {
            (25.0, &[("room", 40.0), ("decay", 35.0)])
        }

        (EffectKind::Delay, Kick) => (15.0, &[("time", 125.0), ("feedback", 25.0)]),
        (EffectKind::Delay, Snare) => (20.0, &[("time", 250.0), ("feedback", 15.0)]),
        (EffectKind::Delay, ClosedHat) => (10.0, &[("time", 125.0), ("feedback", 10.0)]),
        (EffectKind::Delay, OpenHat) => (15.0, &[("time", 250.0), ("feedback", 12.0)]),
        (EffectKind::Delay, Crash) => (25.0, &[("time", 375.0), ("feedback", 20.0)]),
        (EffectKind::Delay, Ride) => (20.0, &[("time", 250.0), ("feedback", 18.0)]),
        (EffectKind::Delay, TomHigh | TomMid | TomLow) => {
            (15.0, &[("time", 125.0), ("feedback", 20.0)])
        }

        (EffectKind::Filter, Kick) => (100.0, &[("cutoff", 8000.0), ("resonance", 1.0)]),
        (EffectKind::Filter, Snare) => (100.0, &[("cutoff", 12000.0), ("resonance", 0.7)]),
        (EffectKind::Filter, ClosedHat) => (100.0, &[("cutoff", 15000.0), ("resonance", 0.5)]),
        (EffectKind::Filter, OpenHat) => (100.0, &[("cutoff", 12000.0), ("resonance", 0.6)]),
        (EffectKind::Filter, Crash) => (100.0, &[("cutoff", 10000.0), ("resonance", 0.8)]),
        (EffectKind::Filter, Ride) => (100.0, &[("cutoff", 8000.0), ("resonance", 0.7)]),
        (EffectKind::Filter, TomHigh) => (100.0, &[("cutoff", 6000.0), ("resonance", 1.2)]),
        (EffectKind::Filter, TomMid) => (100.0, &[("cutoff", 4000.0), ("resonance", 1.2)]),
        (EffectKind::Filter, TomLow) => (100.0, &[("cutoff", 2000.0), ("resonance", 1.2)]),

        (EffectKind::Distortion, Kick) => (30.0, &[("drive", 20.0)]),
        (EffectKind::Distortion, Snare) => (25.0, &[("drive", 15.0)]),
        (EffectKind::Distortion, ClosedHat) => (20.0, &[("drive", 10.0)]),
        (EffectKind::Distortion, OpenHat) => (15.0, &[("drive", 8.0)]),
        (EffectKind::Distortion, Crash) => (20.0, &[("drive", 12.0)]),
        (EffectKind::Distortion, Ride) => (15.0, &[("drive", 10.0)]),
        (EffectKind::Distortion, TomHigh | TomMid | TomLow) => (25.0, &[("drive", 15.0)]),

        (EffectKind::Compressor, Kick | OpenHat | Ride) => {
            (100.0, &[("threshold", -12.0), ("ratio", 4.0)])
        }
        (EffectKind::Compressor, Snare) => (100.0, &[("threshold", -8.0), ("ratio", 6.0)]),
        (EffectKind::Compressor, ClosedHat) => (100.0, &[("threshold", -15.0), ("ratio", 3.0)]),
        (EffectKind::Compressor, Crash | TomHigh | TomMid | TomLow) => {
            (100.0, &[("threshold", -10.0), ("ratio", 5.0)])
        }
    };
    EffectConfig::new(false, wet, params)
}

/// The starting configuration of a master stage. Only the limiter starts enabled.
pub fn master_default(effect: MasterEffect) -> EffectConfig {
    match effect {
        MasterEffect::Reverb => EffectConfig::new(false, 25.0, &[("room", 50.0), ("decay", 40.0)]),
        MasterEffect::Delay => EffectConfig::new(false, 20.0, &[("time", 250.0), ("feedback", 30.0)]),
        MasterEffect::Eq => EffectConfig::new(false, 100.0, &[("frequency", 10000.0), ("gain", 0.0)]),
        MasterEffect::Limiter => {
            EffectConfig::new(true, 100.0, &[("threshold", -1.0), ("ratio", 20.0)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_defaults() {
        let reverb = voice_default(DrumVoice::Kick, EffectKind::Reverb);
        assert!(!reverb.enabled);
        assert_eq!(reverb.wet, 20.0);
        assert_eq!(reverb.number("room", 0.0), 30.0);
        assert_eq!(reverb.number("decay", 0.0), 40.0);

        let cutoffs: Vec<f64> = DrumVoice::ALL
            .into_iter()
            .map(|voice| voice_default(voice, EffectKind::Filter).number("cutoff", 0.0))
            .collect();
        assert_eq!(
            cutoffs,
            vec![8000.0, 12000.0, 15000.0, 12000.0, 10000.0, 8000.0, 6000.0, 4000.0, 2000.0]
        );
    }

    #[test]
    fn test_master_defaults() {
        assert!(master_default(MasterEffect::Limiter).enabled);
        assert!(!master_default(MasterEffect::Eq).enabled);
        assert_eq!(
            master_default(MasterEffect::Limiter).master_node(MasterEffect::Limiter),
            NodeSpec::Compressor {
                threshold: -1.0,
                knee: 0.0,
                ratio: 20.0,
                attack: 0.003,
                release: 0.01,
                wet: 1.0,
            }
        );
    }

    #[test]
    fn test_apply_update() {
        let mut config = voice_default(DrumVoice::Snare, EffectKind::Delay);
        config.apply(
            &EffectUpdate::enable()
                .with_wet(150.0)
                .with_param("time", 500.0),
        );
        assert!(config.enabled);
        assert_eq!(config.wet, 100.0);
        assert_eq!(config.number("time", 0.0), 500.0);
        assert_eq!(config.number("feedback", 0.0), 15.0);
        match config.voice_node(EffectKind::Delay) {
            NodeSpec::Delay {
                time,
                feedback,
                wet,
            } => {
                assert_eq!(time, 0.5);
                assert!((feedback - 0.15).abs() < 1e-6);
                assert_eq!(wet, 1.0);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_filter_type_param() {
        let mut config = voice_default(DrumVoice::Ride, EffectKind::Filter);
        config.apply(&EffectUpdate::default().with_param("type", "highshelf"));
        assert!(matches!(
            config.voice_node(EffectKind::Filter),
            NodeSpec::Filter {
                kind: FilterKind::Highshelf,
                ..
            }
        ));
        // Text where a number is expected falls back to the default.
        config.apply(&EffectUpdate::default().with_param("cutoff", "loud"));
        assert_eq!(config.number("cutoff", 8000.0), 8000.0);
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("Reverb".parse::<EffectKind>().unwrap(), EffectKind::Reverb);
        assert_eq!("eq".parse::<MasterEffect>().unwrap(), MasterEffect::Eq);
        assert!("chorus".parse::<EffectKind>().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let config: EffectConfig =
            serde_yml::from_str("enabled: true\nparams:\n  cutoff: 500\n  type: highshelf\n")
                .unwrap();
        assert!(config.enabled);
        assert_eq!(config.wet, 100.0);
        assert_eq!(config.number("cutoff", 0.0), 500.0);
        assert_eq!(config.text("type"), Some("highshelf"));
    }
}
