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

//! Per-voice channel state: gain, mute and solo.

use crate::pattern::DrumVoice;

/// The master volume before anything sets it.
pub const DEFAULT_MASTER_VOLUME: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    /// Fader gain, 0-1.
    pub gain: f32,
    pub muted: bool,
    pub soloed: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            gain: 1.0,
            muted: false,
            soloed: false,
        }
    }
}

/// The mixer owns one channel per voice plus the master volume. It is read on
/// every trigger, so all queries are plain field reads.
#[derive(Debug, Clone)]
pub struct Mixer {
    channels: [Channel; DrumVoice::COUNT],
    master_volume: f32,
}

impl Default for Mixer {
    fn default() -> Self {
        Mixer {
            channels: [Channel::default(); DrumVoice::COUNT],
            master_volume: DEFAULT_MASTER_VOLUME,
        }
    }
}

impl Mixer {
    pub fn new() -> Mixer {
        Mixer::default()
    }

    pub fn channel(&self, voice: DrumVoice) -> &Channel {
        &self.channels[voice.index()]
    }

    /// Sets the fader gain of a voice, clamped to 0-1. Returns the stored value.
    pub fn set_volume(&mut self, voice: DrumVoice, gain: f32) -> f32 {
        let gain = clamp_unit(gain);
        self.channels[voice.index()].gain = gain;
        gain
    }

    pub fn set_mute(&mut self, voice: DrumVoice, muted: bool) {
        self.channels[voice.index()].muted = muted;
    }

    pub fn set_solo(&mut self, voice: DrumVoice, soloed: bool) {
        self.channels[voice.index()].soloed = soloed;
    }

    pub fn gain(&self, voice: DrumVoice) -> f32 {
        self.channel(voice).gain
    }

    pub fn any_soloed(&self) -> bool {
        self.channels.iter().any(|channel| channel.soloed)
    }

    /// A voice is silent if it is muted, or if anything is soloed and it isn't.
    pub fn is_audible(&self, voice: DrumVoice) -> bool {
        let channel = self.channel(voice);
        if channel.muted {
            return false;
        }
        !self.any_soloed() || channel.soloed
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Sets the master volume, clamped to 0-1. Returns the stored value.
    pub fn set_master_volume(&mut self, volume: f32) -> f32 {
        self.master_volume = clamp_unit(volume);
        self.master_volume
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
