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
//! The scheduler clock: a thread that calls the sequencer tick at a fixed
//! period until it is stopped.

use std::{
    fmt,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, error, info, span, Level};

use crate::playsync::CancelHandle;

pub mod thread_priority;

/// If the clock falls further behind than this many periods it stops trying
/// to catch up and restarts its schedule from now.
const MAX_LAG_PERIODS: u32 = 8;

/// A running clock thread. Dropping the clock stops the thread.
pub struct Clock {
    period: Duration,
    cancel_handle: CancelHandle,
    thread: Option<JoinHandle<()>>,
}

impl Clock {
    /// Starts a clock thread that calls tick every period. Tick errors are
    /// logged and the clock keeps running.
    pub fn start<F, E>(period: Duration, mut tick: F) -> Clock
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let cancel_handle = CancelHandle::new();
        let thread = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "clock");
                let _enter = span.enter();

                thread_priority::configure_clock_thread_priority(
                    thread_priority::clock_thread_priority(),
                    thread_priority::rt_clock_enabled(),
                );
                info!(period = ?period, "Clock started.");

                let mut last_time = Instant::now();
                while !cancel_handle.is_cancelled() {
                    if let Err(e) = tick() {
                        error!(err = %e, "Tick failed.");
                    }

                    last_time += period;
                    let now = Instant::now();
                    if last_time > now {
                        spin_sleep::sleep(last_time - now);
                    } else if now - last_time > period * MAX_LAG_PERIODS {
                        debug!(lag = ?(now - last_time), "Clock fell behind, resynchronising.");
                        last_time = now;
                    }
                }
                info!("Clock stopped.");
            })
        };

        Clock {
            period,
            cancel_handle,
            thread: Some(thread),
        }
    }

    /// Returns the tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns true until the clock is stopped.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stops the clock and waits for the thread to finish its current tick.
    pub fn stop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Clock thread panicked.");
            }
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::testutil::eventually;

    #[test]
    fn test_clock_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut clock = {
            let ticks = ticks.clone();
            Clock::start(Duration::from_millis(1), move || {
                ticks.fetch_add(1, Ordering::Relaxed);
                Ok::<(), String>(())
            })
        };
        assert!(clock.is_running());
        assert_eq!(clock.period(), Duration::from_millis(1));

        eventually(|| ticks.load(Ordering::Relaxed) >= 5, "clock never ticked");
        clock.stop();
        assert!(!clock.is_running());

        let stopped_at = ticks.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::Relaxed), stopped_at);
    }

    #[test]
    fn test_tick_errors_do_not_stop_clock() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let clock = {
            let ticks = ticks.clone();
            Clock::start(Duration::from_millis(1), move || {
                ticks.fetch_add(1, Ordering::Relaxed);
                Err("broken stream")
            })
        };

        eventually(|| ticks.load(Ordering::Relaxed) >= 3, "clock stopped on error");
        drop(clock);
    }
}
