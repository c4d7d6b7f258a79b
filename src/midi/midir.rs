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

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use midly::live::LiveEvent;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, span, Level};

/// Channel mode controllers sent on reset.
const RESET_ALL_CONTROLLERS: u8 = 121;
const ALL_NOTES_OFF: u8 = 123;

/// A MIDI output port opened through midir.
pub struct Device {
    name: String,
    port: MidiOutputPort,
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl Device {
    /// Returns the open connection, connecting on first use.
    fn connection(&self) -> Result<MappedMutexGuard<'_, MidiOutputConnection>, Box<dyn Error>> {
        let mut connection = self.connection.lock();
        if connection.is_none() {
            let output = MidiOutput::new("xmiplay output")?;
            *connection = Some(output.connect(&self.port, "xmiplay")?);
            info!(device = self.name, "Connected MIDI output.");
        }
        MutexGuard::try_map(connection, |connection| connection.as_mut())
            .map_err(|_| "MIDI output is not connected".into())
    }

    fn send(&self, message: &[u8]) -> Result<(), Box<dyn Error>> {
        if tracing::enabled!(Level::DEBUG) {
            if let Ok(event) = LiveEvent::parse(message) {
                debug!(device = self.name, event = ?event, "Sending MIDI event.");
            }
        }
        self.connection()?.send(message)?;
        Ok(())
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn reset(&self) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "reset (midir)");
        let _enter = span.enter();

        info!(device = self.name, "Resetting MIDI output.");
        for channel in 0..16u8 {
            self.send(&[0xB0 | channel, RESET_ALL_CONTROLLERS, 0])?;
            self.send(&[0xB0 | channel, ALL_NOTES_OFF, 0])?;
        }
        Ok(())
    }

    fn send_short(&self, status: u8, data1: u8, data2: u8) -> Result<(), Box<dyn Error>> {
        let message = [status, data1, data2];
        self.send(&message[..super::message_len(status)])
    }

    fn send_sysex(&self, data: &[u8]) -> Result<(), Box<dyn Error>> {
        self.send(data)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Output)", self.name)
    }
}

/// Lists midir output ports and produces the Device trait.
pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
    Ok(list_midir_devices()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn super::Device> = Box::new(device);
            device
        })
        .collect())
}

/// Lists midir output ports.
fn list_midir_devices() -> Result<Vec<Device>, Box<dyn Error>> {
    let output = MidiOutput::new("xmiplay output listing")?;

    let mut devices = Vec::new();
    for port in output.ports() {
        devices.push(Device {
            name: output.port_name(&port)?,
            port,
            connection: Mutex::new(None),
        });
    }

    devices.sort_by_key(|device| device.name.clone());
    Ok(devices)
}

/// Gets the given midir device and connects to it.
pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
    let mut matches = list_midir_devices()?
        .into_iter()
        .filter(|device| device.name.contains(name))
        .collect::<Vec<Device>>();

    if matches.is_empty() {
        return Err(format!("no device found with name {}", name).into());
    }
    if matches.len() > 1 {
        return Err(format!(
            "found too many devices that match ({}), use a less ambiguous device name",
            matches
                .iter()
                .map(|device| device.name.clone())
                .collect::<Vec<String>>()
                .join(", ")
        )
        .into());
    }

    // We've verified that there's only one element in the vector, so this should be safe.
    let device = matches.swap_remove(0);
    drop(device.connection()?);
    Ok(device)
}
