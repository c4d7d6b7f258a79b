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
use std::{error::Error, fmt, sync::Arc};

use tracing::warn;

pub mod midir;
pub mod mock;
pub mod none;

/// A MIDI output transport. The sequencer writes every short message and
/// system exclusive message it produces through one of these.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Resets the device to a known state.
    fn reset(&self) -> Result<(), Box<dyn Error>>;

    /// Sends a channel message. Only as many data bytes as the status calls
    /// for are written to the wire.
    fn send_short(&self, status: u8, data1: u8, data2: u8) -> Result<(), Box<dyn Error>>;

    /// Sends a complete system exclusive message, including the leading 0xF0.
    fn send_sysex(&self, data: &[u8]) -> Result<(), Box<dyn Error>>;
}

/// Returns the total length of a channel message with the given status byte.
pub fn message_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 2,
        _ => 3,
    }
}

/// Lists MIDI output ports known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device with the given name. A device that cannot be opened is
/// reported and replaced with the no-op device, so music is silent rather
/// than fatal.
pub fn get_device(name: &str) -> Arc<dyn Device> {
    if name.starts_with("mock") {
        return Arc::new(mock::Device::get(name));
    }
    if name == none::NAME {
        return Arc::new(none::Device);
    }

    match midir::get(name) {
        Ok(device) => Arc::new(device),
        Err(e) => {
            warn!(
                device = name,
                err = e.to_string(),
                "Unable to open MIDI device, music output is disabled."
            );
            Arc::new(none::Device)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_len() {
        assert_eq!(message_len(0x90), 3);
        assert_eq!(message_len(0xB5), 3);
        assert_eq!(message_len(0xC3), 2);
        assert_eq!(message_len(0xDF), 2);
        assert_eq!(message_len(0xE0), 3);
    }

    #[test]
    fn test_get_device_selects_backend() {
        assert_eq!(get_device("mock-out").name(), "mock-out");
        assert_eq!(get_device("none").name(), "none");
    }
}
