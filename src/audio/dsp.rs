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

//! Processing nodes run by the software render graph.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FilterKind, NodeSpec};

/// The longest delay time a delay node supports, in seconds.
const MAX_DELAY_SECONDS: f32 = 2.0;

/// Reflections per second in generated reverb impulses.
const REVERB_TAP_DENSITY: f32 = 400.0;

/// One stereo frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn new(left: f32, right: f32) -> StereoFrame {
        StereoFrame { left, right }
    }
}

pub trait Processor: Send {
    /// Processes a block in place.
    fn process(&mut self, block: &mut [StereoFrame]);

    /// Applies new parameters. Returns false if the spec describes a different
    /// kind of node, in which case the caller rebuilds it.
    fn update(&mut self, spec: &NodeSpec) -> bool;
}

/// Builds the processor for a node spec.
pub fn build(spec: &NodeSpec, sample_rate: u32) -> Box<dyn Processor> {
    let sample_rate = sample_rate as f32;
    match spec {
        NodeSpec::Gain { gain } => Box::new(Gain { gain: *gain }),
        NodeSpec::Filter { .. } => {
            let mut biquad = Biquad::new(sample_rate);
            biquad.update(spec);
            Box::new(biquad)
        }
        NodeSpec::Delay {
            time,
            feedback,
            wet,
        } => Box::new(Delay::new(sample_rate, *time, *feedback, *wet)),
        NodeSpec::Reverb { room, decay, wet } => {
            Box::new(Reverb::new(sample_rate, *room, *decay, *wet))
        }
        NodeSpec::Distortion { drive, wet } => Box::new(Distortion {
            drive: *drive,
            wet: *wet,
        }),
        NodeSpec::Compressor { .. } => {
            let mut compressor = Compressor::new(sample_rate);
            compressor.update(spec);
            Box::new(compressor)
        }
    }
}

#[inline]
fn mix(dry: f32, wet_signal: f32, wet: f32) -> f32 {
    dry * (1.0 - wet) + wet_signal * wet
}

pub struct Gain {
    gain: f32,
}

impl Processor for Gain {
    fn process(&mut self, block: &mut [StereoFrame]) {
        for frame in block.iter_mut() {
            frame.left *= self.gain;
            frame.right *= self.gain;
        }
    }

    fn update(&mut self, spec: &NodeSpec) -> bool {
        match spec {
            NodeSpec::Gain { gain } => {
                self.gain = *gain;
                true
            }
            _ => false,
        }
    }
}

#[derive(Default, Clone, Copy)]
struct BiquadState {
    z1: f32,
    z2: f32,
}

/// An RBJ biquad in transposed direct form II.
pub struct Biquad {
    sample_rate: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    wet: f32,
    left: BiquadState,
    right: BiquadState,
}

impl Biquad {
    fn new(sample_rate: f32) -> Biquad {
        Biquad {
            sample_rate,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            wet: 1.0,
            left: BiquadState::default(),
            right: BiquadState::default(),
        }
    }

    fn set_lowpass(&mut self, frequency: f32, q: f32) {
        let w0 = 2.0 * PI * frequency / self.sample_rate;
        let cos = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha;
        self.b0 = (1.0 - cos) / 2.0 / a0;
        self.b1 = (1.0 - cos) / a0;
        self.b2 = (1.0 - cos) / 2.0 / a0;
        self.a1 = -2.0 * cos / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    fn set_highshelf(&mut self, frequency: f32, gain_db: f32) {
        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * frequency / self.sample_rate;
        let cos = w0.cos();
        // Shelf slope of 1.
        let alpha = w0.sin() / 2.0 * 2f32.sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) - (a - 1.0) * cos + two_sqrt_a_alpha;
        self.b0 = a * ((a + 1.0) + (a - 1.0) * cos + two_sqrt_a_alpha) / a0;
        self.b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos) / a0;
        self.b2 = a * ((a + 1.0) + (a - 1.0) * cos - two_sqrt_a_alpha) / a0;
        self.a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos) / a0;
        self.a2 = ((a + 1.0) - (a - 1.0) * cos - two_sqrt_a_alpha) / a0;
    }

    #[inline]
    fn tick(&self, state: &mut BiquadState, x: f32) -> f32 {
        let y = self.b0 * x + state.z1;
        state.z1 = self.b1 * x - self.a1 * y + state.z2;
        state.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

impl Processor for Biquad {
    fn process(&mut self, block: &mut [StereoFrame]) {
        let mut left = self.left;
        let mut right = self.right;
        for frame in block.iter_mut() {
            frame.left = mix(frame.left, self.tick(&mut left, frame.left), self.wet);
            frame.right = mix(frame.right, self.tick(&mut right, frame.right), self.wet);
        }
        self.left = left;
        self.right = right;
    }

    fn update(&mut self, spec: &NodeSpec) -> bool {
        let NodeSpec::Filter {
            kind,
            frequency,
            q,
            gain_db,
            wet,
        } = spec
        else {
            return false;
        };

        let frequency = frequency.clamp(10.0, self.sample_rate * 0.49);
        match kind {
            FilterKind::Lowpass => self.set_lowpass(frequency, q.max(1e-4)),
            FilterKind::Highshelf => self.set_highshelf(frequency, *gain_db),
        }
        self.wet = wet.clamp(0.0, 1.0);
        true
    }
}

/// A feedback delay line per channel.
pub struct Delay {
    sample_rate: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    position: usize,
    delay_frames: usize,
    feedback: f32,
    wet: f32,
}

impl Delay {
    fn new(sample_rate: f32, time: f32, feedback: f32, wet: f32) -> Delay {
        let capacity = (sample_rate * MAX_DELAY_SECONDS) as usize + 1;
        let mut delay = Delay {
            sample_rate,
            left: vec![0.0; capacity],
            right: vec![0.0; capacity],
            position: 0,
            delay_frames: 1,
            feedback: 0.0,
            wet: 0.0,
        };
        delay.set(time, feedback, wet);
        delay
    }

    fn set(&mut self, time: f32, feedback: f32, wet: f32) {
        let max = self.left.len() - 1;
        self.delay_frames = ((time.max(0.0) * self.sample_rate) as usize).clamp(1, max);
        self.feedback = feedback.clamp(0.0, 0.95);
        self.wet = wet.clamp(0.0, 1.0);
    }
}

impl Processor for Delay {
    fn process(&mut self, block: &mut [StereoFrame]) {
        let len = self.left.len();
        for frame in block.iter_mut() {
            let read = (self.position + len - self.delay_frames) % len;
            let delayed_left = self.left[read];
            let delayed_right = self.right[read];

            self.left[self.position] = frame.left + delayed_left * self.feedback;
            self.right[self.position] = frame.right + delayed_right * self.feedback;
            self.position = (self.position + 1) % len;

            frame.left = mix(frame.left, delayed_left, self.wet);
            frame.right = mix(frame.right, delayed_right, self.wet);
        }
    }

    fn update(&mut self, spec: &NodeSpec) -> bool {
        match spec {
            NodeSpec::Delay {
                time,
                feedback,
                wet,
            } => {
                self.set(*time, *feedback, *wet);
                true
            }
            _ => false,
        }
    }
}

/// Convolution with a sparse generated impulse: decaying noise reduced to
/// randomly placed taps, with independent taps per channel.
pub struct Reverb {
    sample_rate: f32,
    room: f32,
    decay: f32,
    wet: f32,
    left_taps: Vec<(usize, f32)>,
    right_taps: Vec<(usize, f32)>,
    left: Vec<f32>,
    right: Vec<f32>,
    position: usize,
}

impl Reverb {
    fn new(sample_rate: f32, room: f32, decay: f32, wet: f32) -> Reverb {
        let mut reverb = Reverb {
            sample_rate,
            room: -1.0,
            decay: -1.0,
            wet,
            left_taps: Vec::new(),
            right_taps: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            position: 0,
        };
        reverb.set(room, decay, wet);
        reverb
    }

    fn set(&mut self, room: f32, decay: f32, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
        let room = room.clamp(0.0, 1.0);
        let decay = decay.clamp(0.0, 1.0);
        if room == self.room && decay == self.decay {
            return;
        }
        self.room = room;
        self.decay = decay;

        let length = ((0.3 + room * 2.7) * self.sample_rate) as usize;
        let exponent = 4.0 - 3.7 * decay;
        self.left_taps = impulse_taps(length, exponent, self.sample_rate, 1);
        self.right_taps = impulse_taps(length, exponent, self.sample_rate, 2);
        self.left = vec![0.0; length];
        self.right = vec![0.0; length];
        self.position = 0;
    }
}

/// Generates taps following `noise * (1 - t/len)^exponent`, normalized to unit
/// energy.
fn impulse_taps(length: usize, exponent: f32, sample_rate: f32, seed: u64) -> Vec<(usize, f32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let count = ((length as f32 / sample_rate) * REVERB_TAP_DENSITY).max(1.0) as usize;

    let mut taps: Vec<(usize, f32)> = (0..count)
        .map(|_| {
            let offset = rng.gen_range(0..length.max(1));
            let envelope = (1.0 - offset as f32 / length as f32).powf(exponent);
            let sign = if rng.gen::<bool>() { 1.0 } else { -1.0 };
            (offset, sign * envelope)
        })
        .collect();

    let energy: f32 = taps.iter().map(|(_, g)| g * g).sum();
    if energy > 0.0 {
        let norm = 1.0 / energy.sqrt();
        for (_, gain) in taps.iter_mut() {
            *gain *= norm;
        }
    }
    taps.sort_by_key(|(offset, _)| *offset);
    taps
}

impl Processor for Reverb {
    fn process(&mut self, block: &mut [StereoFrame]) {
        let len = self.left.len();
        if len == 0 {
            return;
        }
        for frame in block.iter_mut() {
            self.left[self.position] = frame.left;
            self.right[self.position] = frame.right;

            let base = self.position + len;
            let wet_left: f32 = self
                .left_taps
                .iter()
                .map(|(offset, gain)| gain * self.left[(base - offset) % len])
                .sum();
            let wet_right: f32 = self
                .right_taps
                .iter()
                .map(|(offset, gain)| gain * self.right[(base - offset) % len])
                .sum();
            self.position = (self.position + 1) % len;

            frame.left = mix(frame.left, wet_left, self.wet);
            frame.right = mix(frame.right, wet_right, self.wet);
        }
    }

    fn update(&mut self, spec: &NodeSpec) -> bool {
        match spec {
            NodeSpec::Reverb { room, decay, wet } => {
                self.set(*room, *decay, *wet);
                true
            }
            _ => false,
        }
    }
}

/// The waveshaper transfer curve for an amount `k`.
pub fn distortion_curve(k: f32, x: f32) -> f32 {
    let deg = PI / 180.0;
    ((3.0 + k) * x * 20.0 * deg) / (PI + k * x.abs())
}

pub struct Distortion {
    drive: f32,
    wet: f32,
}

impl Processor for Distortion {
    fn process(&mut self, block: &mut [StereoFrame]) {
        for frame in block.iter_mut() {
            let left = distortion_curve(self.drive, frame.left.clamp(-1.0, 1.0));
            let right = distortion_curve(self.drive, frame.right.clamp(-1.0, 1.0));
            frame.left = mix(frame.left, left, self.wet);
            frame.right = mix(frame.right, right, self.wet);
        }
    }

    fn update(&mut self, spec: &NodeSpec) -> bool {
        match spec {
            NodeSpec::Distortion { drive, wet } => {
                self.drive = *drive;
                self.wet = wet.clamp(0.0, 1.0);
                true
            }
            _ => false,
        }
    }
}

/// A feed-forward peak compressor with a soft knee. With a high ratio and a
/// short attack it serves as the master limiter.
pub struct Compressor {
    sample_rate: f32,
    threshold: f32,
    knee: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    wet: f32,
    /// Smoothed gain reduction in dB (zero or negative).
    reduction: f32,
}

impl Compressor {
    fn new(sample_rate: f32) -> Compressor {
        Compressor {
            sample_rate,
            threshold: 0.0,
            knee: 0.0,
            ratio: 1.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            wet: 1.0,
            reduction: 0.0,
        }
    }

    fn coefficient(&self, seconds: f32) -> f32 {
        if seconds <= 0.0 {
            0.0
        } else {
            (-1.0 / (seconds * self.sample_rate)).exp()
        }
    }

    /// The static gain reduction in dB for an input level in dB.
    fn target_reduction(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold;
        let slope = 1.0 / self.ratio - 1.0;
        if self.knee > 0.0 && 2.0 * over.abs() <= self.knee {
            slope * (over + self.knee / 2.0).powi(2) / (2.0 * self.knee)
        } else if over > 0.0 {
            slope * over
        } else {
            0.0
        }
    }

    /// The current gain reduction in dB.
    pub fn reduction_db(&self) -> f32 {
        self.reduction
    }
}

impl Processor for Compressor {
    fn process(&mut self, block: &mut [StereoFrame]) {
        for frame in block.iter_mut() {
            let peak = frame.left.abs().max(frame.right.abs()).max(1e-6);
            let target = self.target_reduction(20.0 * peak.log10());

            let coeff = if target < self.reduction {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.reduction = coeff * (self.reduction - target) + target;

            let gain = 10f32.powf(self.reduction / 20.0);
            frame.left = mix(frame.left, frame.left * gain, self.wet);
            frame.right = mix(frame.right, frame.right * gain, self.wet);
        }
    }

    fn update(&mut self, spec: &NodeSpec) -> bool {
        let NodeSpec::Compressor {
            threshold,
            knee,
            ratio,
            attack,
            release,
            wet,
        } = spec
        else {
            return false;
        };
        self.threshold = *threshold;
        self.knee = knee.max(0.0);
        self.ratio = ratio.max(1.0);
        self.attack_coeff = self.coefficient(*attack);
        self.release_coeff = self.coefficient(*release);
        self.wet = wet.clamp(0.0, 1.0);
        true
    }
}
