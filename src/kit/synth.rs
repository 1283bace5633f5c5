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

//! Synthesized drum sounds. These stand in for any sample that can't be
//! decoded, so a kit always has something to play.

use std::f32::consts::PI;

use rand::Rng;

use crate::audio::SampleBuffer;
use crate::pattern::DrumVoice;

/// The length of the synthesized sound for a voice, in seconds.
pub fn duration(voice: DrumVoice) -> f32 {
    match voice {
        DrumVoice::Kick => 1.2,
        DrumVoice::Snare => 0.4,
        DrumVoice::ClosedHat => 0.08,
        DrumVoice::OpenHat => 0.3,
        DrumVoice::Crash => 2.5,
        DrumVoice::Ride => 1.5,
        DrumVoice::TomHigh | DrumVoice::TomMid | DrumVoice::TomLow => 0.6,
    }
}

/// Synthesizes a mono buffer for the voice at the given sample rate.
pub fn synthesize<R: Rng + ?Sized>(voice: DrumVoice, sample_rate: u32, rng: &mut R) -> SampleBuffer {
    let frames = (sample_rate as f32 * duration(voice)).floor() as usize;
    let data = match voice {
        DrumVoice::Kick => kick(frames, sample_rate),
        DrumVoice::Snare => snare(frames, sample_rate, rng),
        DrumVoice::ClosedHat => hat(frames, sample_rate, true, rng),
        DrumVoice::OpenHat => hat(frames, sample_rate, false, rng),
        DrumVoice::Crash => crash(frames, sample_rate, rng),
        DrumVoice::Ride => ride(frames, sample_rate),
        DrumVoice::TomHigh => tom(frames, sample_rate, 180.0),
        DrumVoice::TomMid => tom(frames, sample_rate, 140.0),
        DrumVoice::TomLow => tom(frames, sample_rate, 100.0),
    };
    SampleBuffer::mono(data, sample_rate)
}

fn noise<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen::<f32>() * 2.0 - 1.0
}

fn kick(frames: usize, sample_rate: u32) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let sub = (2.0 * PI * 50.0 * t * (-t * 20.0).exp()).sin() * (-t * 5.0).exp();
            let punch = (2.0 * PI * 80.0 * t * (-t * 25.0).exp()).sin() * (-t * 8.0).exp();
            let click = (2.0 * PI * 1500.0 * t).sin() * (-t * 120.0).exp() * 0.3;
            let sample = (sub * 0.6 + punch * 0.8 + click) * 0.9;
            (sample * 1.2).tanh()
        })
        .collect()
}

fn snare<R: Rng + ?Sized>(frames: usize, sample_rate: u32, rng: &mut R) -> Vec<f32> {
    let mut data = vec![0.0f32; frames];
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let fundamental = (2.0 * PI * 220.0 * t).sin() * 0.3;
        let harmonic = (2.0 * PI * 440.0 * t).sin() * 0.2;

        // Differencing against the previous output gives the crack.
        let noise = noise(rng) * 0.7;
        let high_noise = if i > 0 { noise - data[i - 1] * 0.8 } else { noise };

        let env = (-t * 20.0).exp() * (1.0 + (-t * 200.0).exp() * 2.0);
        data[i] = ((fundamental + harmonic + high_noise) * env * 0.8).tanh();
    }
    data
}

const HAT_PARTIALS: [f32; 5] = [8000.0, 10000.0, 12000.0, 15000.0, 18000.0];

fn hat<R: Rng + ?Sized>(frames: usize, sample_rate: u32, closed: bool, rng: &mut R) -> Vec<f32> {
    let mut data = vec![0.0f32; frames];
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let mut sample = 0.0;
        for freq in HAT_PARTIALS {
            sample += (2.0 * PI * freq * t + rng.gen::<f32>() * 0.1).sin() * 0.15;
        }

        let mut filtered = noise(rng) * 0.8;
        for j in 0..3 {
            if i > j {
                filtered -= data[i - j - 1] * 0.9;
            }
        }
        sample = (sample + filtered) * 0.5;

        let env = if closed {
            (-t * 80.0).exp()
        } else {
            (-t * 15.0).exp() * (1.0 - (-t * 50.0).exp()) * 2.0
        };
        data[i] = sample * env * 0.6;
    }
    data
}

const CRASH_PARTIALS: [f32; 7] = [3000.0, 4000.0, 5000.0, 6000.0, 8000.0, 10000.0, 12000.0];

fn crash<R: Rng + ?Sized>(frames: usize, sample_rate: u32, rng: &mut R) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let mut sample = 0.0;
            for freq in CRASH_PARTIALS {
                sample += (2.0 * PI * freq * t + rng.gen::<f32>() * 0.2).sin() * 0.1;
            }
            let noise = noise(rng) * 0.6;
            sample = (sample + noise) * (-t * 2.0).exp() * (1.0 + (-t * 20.0).exp() * 3.0);
            (sample * 0.8).tanh()
        })
        .collect()
}

const RIDE_PARTIALS: [f32; 3] = [1200.0, 2400.0, 3600.0];

fn ride(frames: usize, sample_rate: u32) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let mut sample: f32 = RIDE_PARTIALS
                .iter()
                .map(|freq| (2.0 * PI * freq * t).sin() * 0.2)
                .sum();
            let ping = (2.0 * PI * 4000.0 * t).sin() * (-t * 15.0).exp() * 0.4;
            let env = (-t * 3.0).exp() + (-t * 30.0).exp() * 0.3;
            sample = (sample + ping) * env;
            (sample * 0.8).tanh()
        })
        .collect()
}

fn tom(frames: usize, sample_rate: u32, frequency: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let freq = frequency * (1.0 + (-t * 8.0).exp() * 0.8);
            let fundamental = (2.0 * PI * freq * t).sin();
            let harmonic2 = (2.0 * PI * freq * 1.5 * t).sin() * 0.3;
            let harmonic3 = (2.0 * PI * freq * 2.2 * t).sin() * 0.15;
            let env = (-t * 6.0).exp() * (1.0 + (-t * 50.0).exp() * 0.8);
            ((fundamental + harmonic2 + harmonic3) * env * 0.7).tanh()
        })
        .collect()
}
