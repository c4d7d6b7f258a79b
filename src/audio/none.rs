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

use super::PcmStatus;

/// The name the no-op device is selected by.
pub const NAME: &str = "none";

/// A device that never plays anything and is always idle.
pub struct Device;

impl super::Device for Device {
    fn name(&self) -> String {
        NAME.to_string()
    }

    fn play_samples(&self, _: Vec<u8>, _: u32) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn stop(&self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn status(&self) -> PcmStatus {
        PcmStatus::Idle
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (No output)", NAME)
    }
}
