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

//! Swing, timing humanization and velocity randomization.

use rand::Rng;

/// Swing at 100% delays odd steps by this many seconds.
const MAX_SWING_DELAY: f64 = 0.1;

/// Humanize at 100% moves a hit by up to this many seconds either way.
const MAX_TIMING_JITTER: f64 = 0.02;

/// Velocity randomization at 100% moves a hit by up to this many MIDI units.
const MAX_VELOCITY_JITTER: f64 = 30.0;

const MIN_RANDOMIZED_VELOCITY: f64 = 20.0;
const MAX_VELOCITY: f64 = 127.0;

/// Groove amounts, each a percentage from 0 to 100.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Groove {
    swing: f64,
    humanize: f64,
    velocity_randomization: f64,
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// A symmetric random offset in `[-range, range)`.
fn jitter<R: Rng + ?Sized>(rng: &mut R, range: f64) -> f64 {
    (rng.gen::<f64>() - 0.5) * 2.0 * range
}

impl Groove {
    pub fn swing(&self) -> f64 {
        self.swing
    }

    pub fn humanize(&self) -> f64 {
        self.humanize
    }

    pub fn velocity_randomization(&self) -> f64 {
        self.velocity_randomization
    }

    pub fn set_swing(&mut self, amount: f64) -> f64 {
        self.swing = clamp_percent(amount);
        self.swing
    }

    pub fn set_humanize(&mut self, amount: f64) -> f64 {
        self.humanize = clamp_percent(amount);
        self.humanize
    }

    pub fn set_velocity_randomization(&mut self, amount: f64) -> f64 {
        self.velocity_randomization = clamp_percent(amount);
        self.velocity_randomization
    }

    /// The swing delay for a step. Only odd steps swing.
    pub fn swing_delay(&self, step: usize) -> f64 {
        if self.swing > 0.0 && step % 2 == 1 {
            self.swing / 100.0 * MAX_SWING_DELAY
        } else {
            0.0
        }
    }

    /// Applies swing and timing jitter to a scheduled time.
    pub fn humanize_time<R: Rng + ?Sized>(&self, time: f64, step: usize, rng: &mut R) -> f64 {
        let mut time = time + self.swing_delay(step);
        if self.humanize > 0.0 {
            time += jitter(rng, self.humanize / 100.0 * MAX_TIMING_JITTER);
        }
        time
    }

    /// Applies velocity jitter. The result is clamped to 20-127 whenever any
    /// randomization is applied; otherwise the velocity passes through.
    pub fn humanize_velocity<R: Rng + ?Sized>(&self, velocity: f64, rng: &mut R) -> f64 {
        if self.velocity_randomization <= 0.0 {
            return velocity;
        }
        let range = self.velocity_randomization / 100.0 * MAX_VELOCITY_JITTER;
        (velocity + jitter(rng, range)).clamp(MIN_RANDOMIZED_VELOCITY, MAX_VELOCITY)
    }
}
