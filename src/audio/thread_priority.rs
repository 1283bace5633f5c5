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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the audio callback thread when BACKBEAT_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// The scheduler timer runs just below the audio callback.
const DEFAULT_TIMER_THREAD_PRIORITY: u8 = 60;

fn priority_from_env(name: &str, default: u8) -> ThreadPriority {
    let value = std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(default);
    match ThreadPriorityValue::try_from(value) {
        Ok(value) => ThreadPriority::Crossplatform(value),
        Err(_) => ThreadPriority::Max,
    }
}

/// Reads BACKBEAT_THREAD_PRIORITY (0-99) once; used when building the callback so
/// the environment isn't touched in the hot path.
pub fn callback_thread_priority() -> ThreadPriority {
    priority_from_env("BACKBEAT_THREAD_PRIORITY", DEFAULT_CALLBACK_THREAD_PRIORITY)
}

/// Reads BACKBEAT_TIMER_PRIORITY (0-99) for the scheduler timer thread.
pub fn timer_thread_priority() -> ThreadPriority {
    priority_from_env("BACKBEAT_TIMER_PRIORITY", DEFAULT_TIMER_THREAD_PRIORITY)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the audio callback thread.
/// Default: enabled. Opt out with BACKBEAT_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !env_flag("BACKBEAT_DISABLE_RT_AUDIO")
}

/// Raises the priority of the calling thread once.
pub fn configure_thread_priority(priority: ThreadPriority, rt_audio: bool, priority_set: &mut bool) {
    if *priority_set {
        return;
    }
    let _ = set_current_thread_priority(priority);

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for audio thread");
            }
            Err(e) => {
                warn!(error = %e, "Failed to set RT SCHED_FIFO for audio thread");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;

    *priority_set = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flag_values() {
        std::env::set_var("BACKBEAT_TEST_FLAG_ON", "yes");
        std::env::set_var("BACKBEAT_TEST_FLAG_OFF", "nope");
        assert!(env_flag("BACKBEAT_TEST_FLAG_ON"));
        assert!(!env_flag("BACKBEAT_TEST_FLAG_OFF"));
        assert!(!env_flag("BACKBEAT_TEST_FLAG_UNSET"));
    }

    #[test]
    fn test_priority_out_of_range_uses_default() {
        std::env::set_var("BACKBEAT_TEST_PRIORITY", "250");
        let priority = priority_from_env("BACKBEAT_TEST_PRIORITY", 42);
        assert_eq!(
            priority,
            ThreadPriority::Crossplatform(ThreadPriorityValue::try_from(42u8).unwrap())
        );
    }
}
