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

use parking_lot::Mutex;
use tracing::debug;

/// A message written to the mock device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A channel message, trimmed to its wire length.
    Short(Vec<u8>),
    /// A system exclusive message.
    SysEx(Vec<u8>),
}

/// A mock device. Doesn't send anything, but remembers what it was asked to
/// send so tests can inspect the wire traffic.
#[derive(Clone)]
pub struct Device {
    name: String,
    messages: Arc<Mutex<Vec<Message>>>,
    resets: Arc<Mutex<usize>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            messages: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns every message sent so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Returns the channel messages sent so far.
    pub fn short_messages(&self) -> Vec<Vec<u8>> {
        self.messages
            .lock()
            .iter()
            .filter_map(|message| match message {
                Message::Short(bytes) => Some(bytes.clone()),
                Message::SysEx(_) => None,
            })
            .collect()
    }

    /// Returns the system exclusive messages sent so far.
    pub fn sysex_messages(&self) -> Vec<Vec<u8>> {
        self.messages
            .lock()
            .iter()
            .filter_map(|message| match message {
                Message::SysEx(bytes) => Some(bytes.clone()),
                Message::Short(_) => None,
            })
            .collect()
    }

    /// Forgets every message sent so far.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Returns how many times the device has been reset.
    pub fn reset_count(&self) -> usize {
        *self.resets.lock()
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn reset(&self) -> Result<(), Box<dyn Error>> {
        *self.resets.lock() += 1;
        Ok(())
    }

    fn send_short(&self, status: u8, data1: u8, data2: u8) -> Result<(), Box<dyn Error>> {
        let message = [status, data1, data2];
        let message = &message[..super::message_len(status)];
        debug!(device = self.name, message = ?message, "Mock MIDI message.");
        self.messages.lock().push(Message::Short(message.to_vec()));
        Ok(())
    }

    fn send_sysex(&self, data: &[u8]) -> Result<(), Box<dyn Error>> {
        self.messages.lock().push(Message::SysEx(data.to_vec()));
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::Device as _;

    #[test]
    fn test_records_trimmed_messages() {
        let device = Device::get("mock");
        device.send_short(0x91, 60, 100).unwrap();
        device.send_short(0xC2, 41, 0).unwrap();
        device.send_sysex(&[0xF0, 0x41, 0xF7]).unwrap();
        device.reset().unwrap();

        assert_eq!(
            device.messages(),
            vec![
                Message::Short(vec![0x91, 60, 100]),
                Message::Short(vec![0xC2, 41]),
                Message::SysEx(vec![0xF0, 0x41, 0xF7]),
            ]
        );
        assert_eq!(device.short_messages().len(), 2);
        assert_eq!(device.sysex_messages(), vec![vec![0xF0, 0x41, 0xF7]]);
        assert_eq!(device.reset_count(), 1);

        device.clear();
        assert!(device.messages().is_empty());
    }
}
