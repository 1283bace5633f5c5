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

//! The audio host: decoding, processing nodes, routing and timed playback.
//!
//! Everything above this module talks to a [`Host`]. The real-time host plays
//! through cpal, the offline host renders on demand, and the mock host records
//! what it was asked to do.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::pattern::DrumVoice;

pub mod buffer;
pub mod cpal;
pub mod decode;
pub mod dsp;
pub mod mock;
pub mod offline;
pub mod render;
pub mod resample;
pub mod thread_priority;
pub mod wav;

pub use buffer::SampleBuffer;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),
    #[error("no usable output configuration for device {0}")]
    NoOutputConfig(String),
    #[error("unable to open output stream: {0}")]
    Stream(String),
    #[error("unable to decode audio: {0}")]
    Decode(String),
    #[error("unsupported audio: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),
    #[error("unable to resample from {0} Hz to {1} Hz")]
    Resample(u32, u32),
    #[error("unknown processing node {0}")]
    UnknownNode(NodeId),
    #[error("audio host has shut down")]
    Closed,
}

/// Identifies a processing node created on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Identifies a scheduled playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highshelf,
}

/// The description of a processing node. Updating a node replaces its
/// parameters while keeping its internal state.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    Gain {
        gain: f32,
    },
    Filter {
        kind: FilterKind,
        frequency: f32,
        /// Resonance (Q).
        q: f32,
        /// Shelf gain in dB. Ignored by the lowpass.
        gain_db: f32,
        /// Wet mix, 0-1.
        wet: f32,
    },
    Delay {
        /// Delay time in seconds.
        time: f32,
        /// Feedback, 0-1.
        feedback: f32,
        wet: f32,
    },
    /// Convolution reverb with a generated impulse response.
    Reverb {
        /// Room size, 0-1. Sets the impulse length.
        room: f32,
        /// Decay, 0-1. Higher values give a longer tail.
        decay: f32,
        wet: f32,
    },
    /// Waveshaper distortion.
    Distortion {
        /// Curve amount.
        drive: f32,
        wet: f32,
    },
    Compressor {
        /// Threshold in dBFS.
        threshold: f32,
        /// Knee width in dB.
        knee: f32,
        ratio: f32,
        /// Attack time in seconds.
        attack: f32,
        /// Release time in seconds.
        release: f32,
        wet: f32,
    },
}

/// A request to play a buffer at an audio-clock time.
#[derive(Clone)]
pub struct Playback {
    pub voice: DrumVoice,
    pub buffer: SampleBuffer,
    /// Start time on the host's audio clock, in seconds.
    pub start: f64,
    pub gain: f32,
    /// Playback rate. 1.0 is the original pitch.
    pub rate: f64,
    /// Stereo position, -1.0 to 1.0.
    pub pan: f32,
}

impl fmt::Debug for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playback")
            .field("voice", &self.voice)
            .field("start", &self.start)
            .field("gain", &self.gain)
            .field("rate", &self.rate)
            .field("pan", &self.pan)
            .field("frames", &self.buffer.frames())
            .finish()
    }
}

/// The host audio output. Voices play into per-voice routes of processing
/// nodes; voice routes sum into the master route, which feeds the output.
pub trait Host: fmt::Display + Send + Sync {
    /// The output sample rate.
    fn sample_rate(&self) -> u32;

    /// The monotonic audio clock, in seconds.
    fn current_time(&self) -> f64;

    /// Decodes encoded audio into a buffer at its native sample rate.
    fn decode(&self, bytes: Vec<u8>) -> Result<SampleBuffer, HostError> {
        decode::decode(bytes)
    }

    /// Creates a processing node.
    fn create_node(&self, spec: NodeSpec) -> Result<NodeId, HostError>;

    /// Replaces the parameters of an existing node.
    fn update_node(&self, id: NodeId, spec: NodeSpec) -> Result<(), HostError>;

    /// Sets the ordered list of nodes a voice plays through.
    fn set_voice_route(&self, voice: DrumVoice, route: Vec<NodeId>) -> Result<(), HostError>;

    /// Sets the ordered list of nodes the voice sum plays through.
    fn set_master_route(&self, route: Vec<NodeId>) -> Result<(), HostError>;

    /// Schedules a playback.
    fn schedule(&self, playback: Playback) -> Result<PlaybackId, HostError>;

    /// Cancels a playback that has not finished. Unknown ids are ignored.
    fn cancel(&self, id: PlaybackId);
}

/// Lists the names of output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::list()
}

/// Gets the host named by the configuration. Names starting with `mock` give a
/// mock host and names starting with `offline` an offline host.
pub fn get_host(config: &EngineConfig) -> Result<Arc<dyn Host>, HostError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::MockHost::new(device, config.sample_rate())));
    }
    if device.starts_with("offline") {
        return Ok(Arc::new(offline::OfflineHost::new(
            device,
            config.sample_rate(),
        )));
    }

    Ok(Arc::new(cpal::CpalHost::open(device, config.sample_rate())?))
}
