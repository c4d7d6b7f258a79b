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
use std::time::Duration;

use serde::Deserialize;

use super::error::ConfigError;

/// The tick rate XMIDI timing is expressed in.
pub const DEFAULT_TICK_RATE: u32 = 120;

/// Above this the ramp step per tick would round down to zero.
pub const MAX_TICK_RATE: u32 = 10_000;

/// A YAML representation of the scheduler clock configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Clock {
    /// The tick rate in Hz.
    tick_rate: Option<u32>,
    /// Whether to start the clock thread when the engine starts. When false
    /// the sequencer must be driven by calling tick directly.
    autostart: Option<bool>,
}

impl Clock {
    /// Creates a clock configuration.
    pub fn new(tick_rate: u32, autostart: bool) -> Clock {
        Clock {
            tick_rate: Some(tick_rate),
            autostart: Some(autostart),
        }
    }

    /// Returns the tick rate in Hz.
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate.unwrap_or(DEFAULT_TICK_RATE)
    }

    /// Returns true if the clock thread should be started with the engine.
    pub fn autostart(&self) -> bool {
        self.autostart.unwrap_or(true)
    }

    /// Returns the period between ticks.
    pub fn period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate().max(1)))
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let tick_rate = self.tick_rate();
        if tick_rate == 0 || tick_rate > MAX_TICK_RATE {
            return Err(ConfigError::TickRate(tick_rate));
        }
        Ok(())
    }
}
