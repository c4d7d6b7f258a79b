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

/// Priority for the clock thread when XMIPLAY_THREAD_PRIORITY is unset.
const DEFAULT_CLOCK_THREAD_PRIORITY: u8 = 70;

/// Reads XMIPLAY_THREAD_PRIORITY (0-99), falling back to the default.
pub fn clock_thread_priority() -> Option<ThreadPriorityValue> {
    std::env::var("XMIPLAY_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
        .or_else(|| ThreadPriorityValue::try_from(DEFAULT_CLOCK_THREAD_PRIORITY).ok())
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

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the clock
/// thread. Opt out with XMIPLAY_DISABLE_RT_CLOCK=1.
pub fn rt_clock_enabled() -> bool {
    !env_flag("XMIPLAY_DISABLE_RT_CLOCK")
}

/// Raises the priority of the calling thread. Failures are logged and
/// otherwise ignored, the clock just runs with more jitter.
pub fn configure_clock_thread_priority(priority: Option<ThreadPriorityValue>, rt_clock: bool) {
    let Some(priority) = priority else {
        return;
    };
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = ?e, "Failed to raise clock thread priority");
    }

    #[cfg(unix)]
    if rt_clock {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for clock thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for clock thread"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = rt_clock;
}
