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

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::{PcmEvent, PcmStatus, PlaybackTracker};

/// A mock device. Doesn't actually play anything. Playback lasts until the
/// test calls finish.
#[derive(Clone)]
pub struct Device {
    name: String,
    tracker: Arc<PlaybackTracker>,
    current: Arc<Mutex<Option<(u64, Sender<PcmEvent>)>>>,
    played: Arc<Mutex<Vec<(Vec<u8>, u32)>>>,
    stops: Arc<Mutex<usize>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            tracker: Arc::new(PlaybackTracker::new()),
            current: Arc::new(Mutex::new(None)),
            played: Arc::new(Mutex::new(Vec::new())),
            stops: Arc::new(Mutex::new(0)),
        }
    }

    /// Posts the drain notification for the current playback, the way an
    /// output thread does once its buffer runs out.
    pub fn finish(&self) {
        if let Some((generation, events)) = self.current.lock().take() {
            let _ = events.send(PcmEvent::Drained(generation));
        }
    }

    /// Returns the samples and rates of every playback so far.
    pub fn played(&self) -> Vec<(Vec<u8>, u32)> {
        self.played.lock().clone()
    }

    /// Returns how many times stop was called.
    pub fn stop_count(&self) -> usize {
        *self.stops.lock()
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn play_samples(&self, samples: Vec<u8>, sample_rate: u32) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "play samples (mock)");
        let _enter = span.enter();

        info!(
            device = self.name,
            samples = samples.len(),
            sample_rate,
            "Playing samples."
        );
        *self.current.lock() = Some(self.tracker.start());
        self.played.lock().push((samples, sample_rate));
        Ok(())
    }

    fn stop(&self) -> Result<(), Box<dyn Error>> {
        *self.stops.lock() += 1;
        self.current.lock().take();
        self.tracker.stop();
        Ok(())
    }

    fn status(&self) -> PcmStatus {
        self.tracker.status()
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
    use crate::audio::Device as _;

    #[test]
    fn test_finish_and_stop() {
        let device = Device::get("mock");
        device.play_samples(vec![0x80; 4], 8000).unwrap();
        assert_eq!(device.status(), PcmStatus::Playing);
        device.finish();
        assert_eq!(device.status(), PcmStatus::Idle);

        device.play_samples(vec![0x80; 4], 8000).unwrap();
        device.stop().unwrap();
        assert_eq!(device.status(), PcmStatus::Idle);
        assert_eq!(device.stop_count(), 1);
        assert_eq!(device.played().len(), 2);
    }
}
