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
use serde::Deserialize;

const DEFAULT_PCM_DEVICE: &str = "default";

/// A YAML representation of the PCM (digitized voice) output configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Pcm {
    /// The audio device. "default" picks the host's default output device,
    /// "mock" and "none" select the built in backends.
    device: Option<String>,
}

impl Pcm {
    /// New will create a new PCM configuration.
    pub fn new(device: &str) -> Pcm {
        Pcm {
            device: Some(device.to_string()),
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_PCM_DEVICE)
    }
}
