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

//! A wall-clock timer thread that drives a shared [`Sequencer`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::audio::thread_priority::{
    configure_thread_priority, rt_audio_enabled, timer_thread_priority,
};
use crate::playsync::CancelHandle;
use crate::sequencer::Sequencer;

/// The timer never sleeps less than this.
const MIN_WAIT: Duration = Duration::from_millis(1);

struct Timer {
    cancel: CancelHandle,
    join: thread::JoinHandle<()>,
}

/// Owns the sequencer and the thread that ticks it while playing.
pub struct Transport {
    sequencer: Arc<Mutex<Sequencer>>,
    lookahead: Duration,
    timer: Mutex<Option<Timer>>,
}

impl Transport {
    /// Wraps a sequencer. The timer wakes every `lookahead` while playing.
    pub fn new(sequencer: Sequencer, lookahead: Duration) -> Transport {
        Transport {
            sequencer: Arc::new(Mutex::new(sequencer)),
            lookahead: lookahead.max(MIN_WAIT),
            timer: Mutex::new(None),
        }
    }

    /// Locks the sequencer for direct control.
    pub fn sequencer(&self) -> MutexGuard<'_, Sequencer> {
        self.sequencer.lock()
    }

    /// Starts playback and the timer. Returns false if there is no pattern or
    /// a timer is already driving playback. A sequencer started directly
    /// through [`Transport::sequencer`] gets its timer here.
    pub fn play(&self) -> bool {
        let mut timer = self.timer.lock();
        let running = timer.as_ref().is_some_and(|timer| !timer.join.is_finished());
        {
            let mut sequencer = self.sequencer.lock();
            if !sequencer.play() && (running || !sequencer.is_playing()) {
                return false;
            }
        }

        // A timer left from before exits on its own once it sees the sequencer
        // halted; make sure it is gone before starting the next.
        if let Some(stale) = timer.take() {
            stale.cancel.cancel();
            if stale.join.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }

        let cancel = CancelHandle::new();
        let join = {
            let sequencer = self.sequencer.clone();
            let cancel = cancel.clone();
            let lookahead = self.lookahead;
            thread::Builder::new()
                .name("scheduler".to_string())
                .spawn(move || run(sequencer, cancel, lookahead))
        };
        match join {
            Ok(join) => {
                *timer = Some(Timer { cancel, join });
                true
            }
            Err(e) => {
                error!(err = %e, "Unable to start scheduler thread");
                self.sequencer.lock().pause();
                false
            }
        }
    }

    /// Halts playback and keeps the position.
    pub fn pause(&self) {
        self.stop_timer();
        self.sequencer.lock().pause();
    }

    /// Halts playback and rewinds to the first step.
    pub fn stop(&self) {
        self.stop_timer();
        self.sequencer.lock().stop();
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.lock().is_playing()
    }

    /// Cancels and joins the timer thread. The sequencer lock must not be held
    /// here, since the thread takes it on every tick.
    fn stop_timer(&self) {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            timer.cancel.cancel();
            if timer.join.join().is_err() {
                error!("Scheduler thread panicked");
            }
            debug!("Scheduler thread stopped");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

fn run(sequencer: Arc<Mutex<Sequencer>>, cancel: CancelHandle, lookahead: Duration) {
    let mut priority_set = false;
    configure_thread_priority(timer_thread_priority(), rt_audio_enabled(), &mut priority_set);
    info!(lookahead = ?lookahead, "Scheduler thread started");

    loop {
        let wait = {
            let mut sequencer = sequencer.lock();
            sequencer.tick();
            let next_visual = sequencer.next_visual_time();
            if !sequencer.is_playing() && next_visual.is_none() {
                debug!("Sequencer halted, scheduler thread exiting");
                return;
            }
            match next_visual {
                Some(time) => {
                    let until = (time - sequencer.host().current_time()).max(0.0);
                    lookahead.min(Duration::from_secs_f64(until))
                }
                None => lookahead,
            }
        };
        if cancel.wait_timeout(wait.max(MIN_WAIT)) {
            return;
        }
    }
}
