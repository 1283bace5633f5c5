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

//! Turns one step of one voice into the hits that should sound.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::groove::Groove;
use crate::mixer::Mixer;
use crate::pattern::{DrumVoice, Step};
use crate::performance::Performance;

/// A flam's grace note lands this far ahead of the main hit.
const FLAM_OFFSET: f64 = 0.02;
const FLAM_VELOCITY: f64 = 0.8;
const ROLL_VELOCITY: f64 = 0.9;

/// Scatter at full depth moves a hit by up to this fraction of a beat.
const MAX_SCATTER_BEAT_FRACTION: f64 = 0.1;

const MIN_GAIN: f32 = 0.01;
const MAX_GAIN: f32 = 1.0;

/// One sound to schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub voice: DrumVoice,
    /// Audio-clock start time in seconds.
    pub time: f64,
    pub velocity: f64,
    pub gain: f32,
    pub pan: f32,
    pub rate: f64,
}

/// Scales a voice's base loudness by velocity.
pub fn gain_for(voice: DrumVoice, velocity: f64) -> f32 {
    let gain = voice.base_gain() * (velocity / 127.0) as f32;
    if gain.is_nan() {
        return MIN_GAIN;
    }
    gain.clamp(MIN_GAIN, MAX_GAIN)
}

/// Runs the modifier pipeline. Owns the random source so the trigger path
/// never touches a shared one.
pub struct TriggerEngine {
    rng: StdRng,
}

impl Default for TriggerEngine {
    fn default() -> Self {
        TriggerEngine::new()
    }
}

impl TriggerEngine {
    pub fn new() -> TriggerEngine {
        TriggerEngine {
            rng: StdRng::from_entropy(),
        }
    }

    /// A deterministic engine for tests and offline renders.
    pub fn with_seed(seed: u64) -> TriggerEngine {
        TriggerEngine {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Evaluates a step scheduled at `time`. Returns nothing for inactive,
    /// gated or skipped steps.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &mut self,
        voice: DrumVoice,
        step: &Step,
        index: usize,
        time: f64,
        mixer: &Mixer,
        groove: &Groove,
        performance: &Performance,
        bpm: f64,
    ) -> Vec<Hit> {
        if !step.active || !mixer.is_audible(voice) {
            return Vec::new();
        }

        let effective = f64::from(step.probability) / 100.0
            * (performance.master_probability() / 100.0)
            * 100.0;
        if effective <= 0.0 || self.rng.gen::<f64>() * 100.0 > effective {
            trace!(voice = %voice, index, "Skipped by probability");
            return Vec::new();
        }

        let mut time = time;
        if let Some(depth) = performance.scatter_at(time) {
            let range = f64::from(depth) / 10.0 * (60.0 / bpm) * MAX_SCATTER_BEAT_FRACTION;
            time += (self.rng.gen::<f64>() - 0.5) * 2.0 * range;
        }

        let time = groove.humanize_time(time, index, &mut self.rng);
        let velocity = groove.humanize_velocity(f64::from(step.velocity), &mut self.rng);

        let hit = |time: f64, velocity: f64| Hit {
            voice,
            time,
            velocity,
            gain: gain_for(voice, velocity),
            pan: step.pan_position(),
            rate: step.playback_rate(),
        };

        let mut hits = Vec::with_capacity(1 + usize::from(step.roll));
        if step.flam {
            hits.push(hit(time - FLAM_OFFSET, velocity * FLAM_VELOCITY));
        }
        if step.roll > 0 {
            let interval = 60.0 / bpm / 4.0 / f64::from(step.roll);
            hits.extend(
                (0..step.roll)
                    .map(|i| hit(time + f64::from(i) * interval, velocity * ROLL_VELOCITY)),
            );
        } else {
            hits.push(hit(time, velocity));
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(engine: &mut TriggerEngine, step: &Step, mixer: &Mixer) -> Vec<Hit> {
        engine.evaluate(
            DrumVoice::Kick,
            step,
            0,
            1.0,
            mixer,
            &Groove::default(),
            &Performance::default(),
            120.0,
        )
    }

    #[test]
    fn test_gain_for() {
        assert!((gain_for(DrumVoice::Kick, 110.0) - 110.0 / 127.0).abs() < 1e-6);
        assert!((gain_for(DrumVoice::Snare, 127.0) - 0.9).abs() < 1e-6);
        assert_eq!(gain_for(DrumVoice::Kick, 0.0), MIN_GAIN);
        assert_eq!(gain_for(DrumVoice::Kick, 500.0), MAX_GAIN);
    }

    #[test]
    fn test_plain_hit() {
        let mut engine = TriggerEngine::with_seed(1);
        let step = Step {
            pan: 25,
            pitch: 12,
            ..Step::hit(110)
        };
        let hits = evaluate(&mut engine, &step, &Mixer::new());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].time, 1.0);
        assert_eq!(hits[0].velocity, 110.0);
        assert!((hits[0].pan - 0.5).abs() < 1e-6);
        assert!((hits[0].rate - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_inactive_step_is_silent() {
        let mut engine = TriggerEngine::with_seed(1);
        assert!(evaluate(&mut engine, &Step::off(), &Mixer::new()).is_empty());
    }

    #[test]
    fn test_zero_probability_never_sounds() {
        let mut engine = TriggerEngine::with_seed(5);
        let step = Step {
            probability: 0,
            ..Step::hit(100)
        };
        for _ in 0..1000 {
            assert!(evaluate(&mut engine, &step, &Mixer::new()).is_empty());
        }
    }

    #[test]
    fn test_full_probability_always_sounds() {
        let mut engine = TriggerEngine::with_seed(5);
        let step = Step::hit(100);
        for _ in 0..1000 {
            assert_eq!(evaluate(&mut engine, &step, &Mixer::new()).len(), 1);
        }
    }

    #[test]
    fn test_master_probability_zero_silences() {
        let mut engine = TriggerEngine::with_seed(5);
        let mut performance = Performance::default();
        performance.set_master_probability(0.0);
        for _ in 0..1000 {
            let hits = engine.evaluate(
                DrumVoice::Snare,
                &Step::hit(100),
                0,
                0.0,
                &Mixer::new(),
                &Groove::default(),
                &performance,
                120.0,
            );
            assert!(hits.is_empty());
        }
    }

    #[test]
    fn test_half_probability_sounds_sometimes() {
        let mut engine = TriggerEngine::with_seed(8);
        let step = Step {
            probability: 50,
            ..Step::hit(100)
        };
        let sounded = (0..1000)
            .filter(|_| !evaluate(&mut engine, &step, &Mixer::new()).is_empty())
            .count();
        assert!((300..700).contains(&sounded), "sounded {} times", sounded);
    }

    #[test]
    fn test_mute_and_solo_gate() {
        let mut engine = TriggerEngine::with_seed(1);
        let mut mixer = Mixer::new();
        mixer.set_mute(DrumVoice::Kick, true);
        assert!(evaluate(&mut engine, &Step::hit(100), &mixer).is_empty());

        let mut mixer = Mixer::new();
        mixer.set_solo(DrumVoice::Snare, true);
        assert!(evaluate(&mut engine, &Step::hit(100), &mixer).is_empty());
        mixer.set_solo(DrumVoice::Kick, true);
        assert_eq!(evaluate(&mut engine, &Step::hit(100), &mixer).len(), 1);
    }

    #[test]
    fn test_flam_adds_grace_note() {
        let mut engine = TriggerEngine::with_seed(1);
        let step = Step {
            flam: true,
            ..Step::hit(100)
        };
        let hits = evaluate(&mut engine, &step, &Mixer::new());
        assert_eq!(hits.len(), 2);
        assert!((hits[0].time - 0.98).abs() < 1e-12);
        assert!((hits[0].velocity - 80.0).abs() < 1e-9);
        assert_eq!(hits[1].time, 1.0);
        assert_eq!(hits[1].velocity, 100.0);
    }

    #[test]
    fn test_roll_replaces_main_hit() {
        let mut engine = TriggerEngine::with_seed(1);
        let step = Step {
            roll: 4,
            ..Step::hit(100)
        };
        let hits = evaluate(&mut engine, &step, &Mixer::new());
        assert_eq!(hits.len(), 4);
        // 120 bpm: a quarter beat is 125ms, so sub-hits are 31.25ms apart.
        for (i, hit) in hits.iter().enumerate() {
            assert!((hit.time - (1.0 + i as f64 * 0.03125)).abs() < 1e-12);
            assert!((hit.velocity - 90.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scatter_bounded() {
        let mut engine = TriggerEngine::with_seed(4);
        let mut performance = Performance::default();
        performance.set_scatter(true, 10);
        let mut moved = false;
        for _ in 0..500 {
            let hits = engine.evaluate(
                DrumVoice::Kick,
                &Step::hit(100),
                0,
                1.0,
                &Mixer::new(),
                &Groove::default(),
                &performance,
                120.0,
            );
            // Depth 10 at 120 bpm allows 50ms either way.
            assert!((hits[0].time - 1.0).abs() <= 0.05);
            moved |= hits[0].time != 1.0;
        }
        assert!(moved);
    }

    #[test]
    fn test_swing_on_odd_steps() {
        let mut engine = TriggerEngine::with_seed(1);
        let mut groove = Groove::default();
        groove.set_swing(100.0);
        let odd = engine.evaluate(
            DrumVoice::ClosedHat,
            &Step::hit(100),
            1,
            1.0,
            &Mixer::new(),
            &groove,
            &Performance::default(),
            120.0,
        );
        assert!((odd[0].time - 1.1).abs() < 1e-12);
    }
}
