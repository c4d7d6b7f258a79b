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
use std::{error::Error, fmt};

/// The name the no-op device is selected by.
pub const NAME: &str = "none";

/// A device that discards everything. Used when no MIDI output is configured
/// or the configured one could not be opened.
pub struct Device;

impl super::Device for Device {
    fn name(&self) -> String {
        NAME.to_string()
    }

    fn reset(&self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn send_short(&self, _: u8, _: u8, _: u8) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn send_sysex(&self, _: &[u8]) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (No output)", NAME)
    }
}
