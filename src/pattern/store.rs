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

//! Holds the current pattern and applies edits to it.
//!
//! Every edit builds a new pattern and swaps it in whole, so a scheduler that is
//! holding the previous `Arc<Pattern>` never observes a half-applied edit.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{DrumVoice, Pattern, Step};

/// A partial update to a step. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepEdit {
    pub active: Option<bool>,
    pub velocity: Option<u8>,
    pub accent: Option<bool>,
    pub probability: Option<u8>,
    pub flam: Option<bool>,
    pub roll: Option<u8>,
    pub pan: Option<i8>,
    pub pitch: Option<i8>,
}

impl StepEdit {
    fn apply(&self, step: &Step) -> Step {
        Step {
            active: self.active.unwrap_or(step.active),
            velocity: self.velocity.unwrap_or(step.velocity),
            accent: self.accent.unwrap_or(step.accent),
            probability: self.probability.unwrap_or(step.probability),
            flam: self.flam.unwrap_or(step.flam),
            roll: self.roll.unwrap_or(step.roll),
            pan: self.pan.unwrap_or(step.pan),
            pitch: self.pitch.unwrap_or(step.pitch),
        }
        .clamped()
    }
}

/// The current pattern plus a single-slot clipboard.
pub struct PatternStore {
    current: Option<Arc<Pattern>>,
    clipboard: Option<Arc<Pattern>>,
    rng: StdRng,
}

impl PatternStore {
    pub fn new() -> PatternStore {
        PatternStore::with_rng(StdRng::from_entropy())
    }

    /// Creates a store with a fixed random source.
    pub fn with_rng(rng: StdRng) -> PatternStore {
        PatternStore {
            current: None,
            clipboard: None,
            rng,
        }
    }

    /// The current pattern.
    pub fn current(&self) -> Option<Arc<Pattern>> {
        self.current.clone()
    }

    /// Replaces the current pattern. The pattern is normalized first.
    pub fn load(&mut self, pattern: Pattern) -> Arc<Pattern> {
        let pattern = Arc::new(pattern.normalized());
        debug!(
            id = %pattern.id,
            steps = pattern.step_count,
            bpm = pattern.bpm,
            "Loaded pattern"
        );
        self.current = Some(pattern.clone());
        pattern
    }

    /// Flips the active flag of a step. The voice row is created if absent.
    /// Returns the new pattern, or `None` if there is no pattern or the index is
    /// out of range.
    pub fn toggle_step(&mut self, voice: DrumVoice, index: usize) -> Option<Arc<Pattern>> {
        self.modify_step(voice, index, |step| Step {
            active: !step.active,
            ..step.clone()
        })
    }

    /// Merges a partial edit into a step. The voice row is created if absent.
    pub fn edit_step(
        &mut self,
        voice: DrumVoice,
        index: usize,
        edit: &StepEdit,
    ) -> Option<Arc<Pattern>> {
        self.modify_step(voice, index, |step| edit.apply(step))
    }

    fn modify_step<F>(&mut self, voice: DrumVoice, index: usize, f: F) -> Option<Arc<Pattern>>
    where
        F: FnOnce(&Step) -> Step,
    {
        let current = self.current.as_ref()?;
        if index >= current.step_count {
            return None;
        }

        let mut pattern = Pattern::clone(current);
        let row = pattern
            .voices
            .entry(voice)
            .or_insert_with(|| vec![Step::off(); current.step_count]);
        row[index] = f(&row[index]);

        let pattern = Arc::new(pattern);
        self.current = Some(pattern.clone());
        Some(pattern)
    }

    /// Removes every voice row. Tempo, length and swing are kept.
    pub fn clear(&mut self) -> Option<Arc<Pattern>> {
        let current = self.current.as_ref()?;
        let mut pattern = Pattern::clone(current);
        pattern.voices.clear();

        let pattern = Arc::new(pattern);
        self.current = Some(pattern.clone());
        Some(pattern)
    }

    /// Copies the current pattern into the clipboard.
    pub fn copy(&mut self) -> bool {
        match &self.current {
            Some(pattern) => {
                self.clipboard = Some(pattern.clone());
                true
            }
            None => false,
        }
    }

    /// Replaces the current pattern with the clipboard contents.
    pub fn paste(&mut self) -> Option<Arc<Pattern>> {
        let pattern = self.clipboard.clone()?;
        self.current = Some(pattern.clone());
        Some(pattern)
    }

    /// Flips each step of the listed voices with a probability of `intensity`
    /// percent. Steps that were active get their velocity jittered by up to 20
    /// in either direction, clamped to 60-127. Voices absent from the pattern
    /// are skipped.
    pub fn randomize(&mut self, voices: &[DrumVoice], intensity: f64) -> Option<Arc<Pattern>> {
        let current = self.current.as_ref()?;
        let mut pattern = Pattern::clone(current);

        for voice in voices {
            let Some(row) = pattern.voices.get_mut(voice) else {
                continue;
            };
            for step in row.iter_mut() {
                let was_active = step.active;
                if self.rng.gen::<f64>() * 100.0 < intensity {
                    step.active = !step.active;
                }
                if was_active {
                    let jitter = (self.rng.gen::<f64>() - 0.5) * 40.0;
                    step.velocity = (f64::from(step.velocity) + jitter).clamp(60.0, 127.0) as u8;
                }
            }
        }

        let pattern = Arc::new(pattern);
        self.current = Some(pattern.clone());
        Some(pattern)
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        PatternStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Genre;

    fn store_with(pattern: Pattern) -> PatternStore {
        let mut store = PatternStore::with_rng(StdRng::seed_from_u64(7));
        store.load(pattern);
        store
    }

    fn basic() -> Pattern {
        Pattern::new("basic", "Basic", Genre::Metal, 120.0, 16).with_hits(
            DrumVoice::Kick,
            &[0, 4, 8, 12],
            110,
        )
    }

    #[test]
    fn test_toggle_creates_row() {
        let mut store = store_with(basic());
        let pattern = store.toggle_step(DrumVoice::Snare, 4).unwrap();
        let row = &pattern.voices[&DrumVoice::Snare];
        assert_eq!(row.len(), 16);
        assert!(row[4].active);
        assert_eq!(row[4].velocity, 100);
        assert_eq!(row.iter().filter(|s| s.active).count(), 1);
    }

    #[test]
    fn test_toggle_twice_restores() {
        let mut store = store_with(basic());
        let before = store.current().unwrap();
        store.toggle_step(DrumVoice::Kick, 4);
        let after = store.toggle_step(DrumVoice::Kick, 4).unwrap();
        assert_eq!(*before, *after);
    }

    #[test]
    fn test_toggle_out_of_range() {
        let mut store = store_with(basic());
        assert!(store.toggle_step(DrumVoice::Kick, 16).is_none());
        assert!(PatternStore::new().toggle_step(DrumVoice::Kick, 0).is_none());
    }

    #[test]
    fn test_edit_step_merges() {
        let mut store = store_with(basic());
        let pattern = store
            .edit_step(
                DrumVoice::Kick,
                0,
                &StepEdit {
                    probability: Some(50),
                    flam: Some(true),
                    ..StepEdit::default()
                },
            )
            .unwrap();
        let step = pattern.step(DrumVoice::Kick, 0).unwrap();
        assert!(step.active);
        assert_eq!(step.velocity, 110);
        assert_eq!(step.probability, 50);
        assert!(step.flam);
    }

    #[test]
    fn test_edit_step_clamps() {
        let mut store = store_with(basic());
        let pattern = store
            .edit_step(
                DrumVoice::Kick,
                1,
                &StepEdit {
                    velocity: Some(200),
                    pitch: Some(-40),
                    ..StepEdit::default()
                },
            )
            .unwrap();
        let step = pattern.step(DrumVoice::Kick, 1).unwrap();
        assert_eq!(step.velocity, 127);
        assert_eq!(step.pitch, -24);
    }

    #[test]
    fn test_clear_keeps_metadata() {
        let mut store = store_with(basic());
        let pattern = store.clear().unwrap();
        assert!(pattern.voices.is_empty());
        assert_eq!(pattern.bpm, 120.0);
        assert_eq!(pattern.step_count, 16);
    }

    #[test]
    fn test_copy_paste() {
        let mut store = PatternStore::new();
        assert!(!store.copy());
        assert!(store.paste().is_none());

        store.load(basic());
        assert!(store.copy());
        store.clear();
        let pasted = store.paste().unwrap();
        assert_eq!(pasted.active_count(), 4);
    }

    #[test]
    fn test_randomize_full_intensity_inverts() {
        let mut store = store_with(basic());
        let pattern = store.randomize(&[DrumVoice::Kick], 100.0).unwrap();
        let row = &pattern.voices[&DrumVoice::Kick];
        assert_eq!(row.iter().filter(|s| s.active).count(), 12);
        for index in [0, 4, 8, 12] {
            assert!(!row[index].active);
            assert!((60..=127).contains(&row[index].velocity));
        }
    }

    #[test]
    fn test_randomize_zero_intensity_keeps_activity() {
        let mut store = store_with(basic());
        let pattern = store.randomize(&[DrumVoice::Kick, DrumVoice::Snare], 0.0).unwrap();
        assert_eq!(pattern.active_count(), 4);
        assert!(!pattern.voices.contains_key(&DrumVoice::Snare));
    }
}
