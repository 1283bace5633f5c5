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

//! Look-ahead step scheduling on the audio clock.
//!
//! A coarse timer calls [`Scheduler::due_steps`] frequently. Every step whose
//! start time falls inside the schedule-ahead window is handed out with its
//! exact audio-clock time, so timer jitter never reaches the audio.

use std::collections::VecDeque;
use std::time::Duration;

use crate::pattern::{MAX_BPM, MIN_BPM};

/// Visual updates this close to the audio clock fire immediately.
pub const VISUAL_SYNC_WINDOW: f64 = 0.010;

/// A step ready to be triggered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledStep {
    pub index: usize,
    /// Audio-clock time at which the step sounds.
    pub time: f64,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    schedule_ahead: f64,
    bpm: f64,
    step_count: usize,
    playing: bool,
    /// The next step to schedule.
    cursor: usize,
    next_step_time: f64,
    visual: VecDeque<ScheduledStep>,
}

impl Scheduler {
    pub fn new(schedule_ahead: Duration) -> Scheduler {
        Scheduler {
            schedule_ahead: schedule_ahead.as_secs_f64(),
            bpm: 120.0,
            step_count: 16,
            playing: false,
            cursor: 0,
            next_step_time: 0.0,
            visual: VecDeque::new(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Starts advancing from the cursor at `now`. Returns false if already
    /// playing, in which case nothing changes.
    pub fn play(&mut self, now: f64) -> bool {
        if self.playing {
            return false;
        }
        self.playing = true;
        self.next_step_time = now;
        true
    }

    /// Halts advancement. The cursor is kept.
    pub fn pause(&mut self) {
        self.playing = false;
        self.visual.clear();
    }

    /// Halts advancement and rewinds to the first step.
    pub fn stop(&mut self) {
        self.playing = false;
        self.cursor = 0;
        self.visual.clear();
    }

    /// Sets the tempo, clamped to the legal range. Steps already handed out
    /// keep their times. Returns the stored tempo.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        if !bpm.is_nan() {
            self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        }
        self.bpm
    }

    /// Changes the loop length, wrapping the cursor into it.
    pub fn set_step_count(&mut self, step_count: usize) {
        self.step_count = step_count.max(1);
        self.cursor %= self.step_count;
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// One sixteenth note at the current tempo, whatever the loop length.
    pub fn step_interval(&self) -> f64 {
        60.0 / self.bpm / 4.0
    }

    /// Every step that starts before `now` plus the schedule-ahead window.
    /// Each is also queued for visual sync.
    pub fn due_steps(&mut self, now: f64) -> Vec<ScheduledStep> {
        let mut due = Vec::new();
        if !self.playing {
            return due;
        }
        while self.next_step_time < now + self.schedule_ahead {
            let step = ScheduledStep {
                index: self.cursor,
                time: self.next_step_time,
            };
            due.push(step);
            self.visual.push_back(step);
            self.next_step_time += self.step_interval();
            self.cursor = (self.cursor + 1) % self.step_count;
        }
        due
    }

    /// Visual updates whose step is audible at `now`, oldest first.
    pub fn drain_visual(&mut self, now: f64) -> Vec<usize> {
        let mut ready = Vec::new();
        while let Some(step) = self.visual.front() {
            if step.time - now >= VISUAL_SYNC_WINDOW {
                break;
            }
            ready.push(step.index);
            self.visual.pop_front();
        }
        ready
    }

    /// The audio-clock time of the next pending visual update.
    pub fn next_visual_time(&self) -> Option<f64> {
        self.visual.front().map(|step| step.time)
    }
}
