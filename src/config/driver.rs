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

/// A YAML representation of one logical driver.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Driver {
    /// Whether the driver is installed at startup.
    enabled: Option<bool>,
    /// The file extension this driver prefers when resolving files.
    extension: Option<String>,
}

impl Driver {
    /// Creates a driver configuration.
    pub fn new(enabled: bool, extension: &str) -> Driver {
        Driver {
            enabled: Some(enabled),
            extension: Some(extension.to_string()),
        }
    }

    /// Returns true if the driver should be installed.
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Returns the configured extension, or the given default.
    pub fn extension_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.extension.as_deref().unwrap_or(default)
    }
}

/// The configuration of the music, sound and voice drivers.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Drivers {
    #[serde(default)]
    music: Driver,
    #[serde(default)]
    sound: Driver,
    #[serde(default)]
    voice: Driver,
}

impl Drivers {
    /// Creates a drivers configuration.
    pub fn new(music: Driver, sound: Driver, voice: Driver) -> Drivers {
        Drivers {
            music,
            sound,
            voice,
        }
    }

    pub fn music(&self) -> &Driver {
        &self.music
    }

    pub fn sound(&self) -> &Driver {
        &self.sound
    }

    pub fn voice(&self) -> &Driver {
        &self.voice
    }
}
