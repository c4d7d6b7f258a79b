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
/// A value that moves one unit at a time toward a target over a given time.
///
/// Time is measured in 100 µs units. The step passed to advance is how many
/// of those units went by since the last call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ramp {
    current: u16,
    target: u16,
    accumulator: u32,
    increment: u32,
}

impl Ramp {
    /// Creates a ramp resting at the given value.
    pub fn new(value: u16) -> Ramp {
        Ramp {
            current: value,
            target: value,
            accumulator: 0,
            increment: 0,
        }
    }

    pub fn current(&self) -> u16 {
        self.current
    }

    pub fn target(&self) -> u16 {
        self.target
    }

    /// Returns true once the current value has reached the target.
    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Starts moving toward the target so it's reached after the given number
    /// of milliseconds. Zero applies the target immediately.
    pub fn set(&mut self, target: u16, milliseconds: u32) {
        self.target = target;
        self.accumulator = 0;
        if milliseconds == 0 {
            self.current = target;
            self.increment = 0;
            return;
        }

        let distance = u32::from(self.current.abs_diff(target));
        self.increment = if distance == 0 {
            0
        } else {
            (milliseconds.saturating_mul(10) / distance).max(1)
        };
    }

    /// Advances the ramp by the given number of time units. Returns true if
    /// the current value changed.
    pub fn advance(&mut self, step: u32) -> bool {
        if self.is_settled() {
            return false;
        }

        let before = self.current;
        self.accumulator = self.accumulator.saturating_add(step);
        while self.accumulator >= self.increment && !self.is_settled() {
            self.accumulator -= self.increment;
            if self.current < self.target {
                self.current += 1;
            } else {
                self.current -= 1;
            }
        }
        if self.is_settled() {
            self.accumulator = 0;
        }
        self.current != before
    }
}
