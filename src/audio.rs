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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use crate::voc;

pub mod cpal;
pub mod mock;
pub mod none;
pub mod resample;

/// Whether a PCM device is currently producing sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmStatus {
    Idle,
    Playing,
}

/// Posted by a backend's output thread. Each playback is tagged with a
/// generation so a late notification from a stopped buffer is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEvent {
    /// Every sample of the given playback has been written out.
    Drained(u64),
}

/// A PCM output transport for digitized voice and sound effects.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Plays 8-bit unsigned mono samples at the given rate, replacing
    /// anything that is already playing.
    fn play_samples(&self, samples: Vec<u8>, sample_rate: u32) -> Result<(), Box<dyn Error>>;

    /// Stops playback. Does nothing if idle.
    fn stop(&self) -> Result<(), Box<dyn Error>>;

    /// Returns the current playback status.
    fn status(&self) -> PcmStatus;

    /// Decodes Creative Voice data and plays its sound block.
    fn play(&self, voice: &[u8]) -> Result<(), Box<dyn Error>> {
        let block = voc::decode(voice)?;
        self.play_samples(voice[block.samples.clone()].to_vec(), block.sample_rate)
    }
}

/// Tracks playback status from the drain notifications a backend posts.
pub struct PlaybackTracker {
    sender: Sender<PcmEvent>,
    receiver: Receiver<PcmEvent>,
    generation: AtomicU64,
    playing: AtomicBool,
}

impl PlaybackTracker {
    pub fn new() -> PlaybackTracker {
        let (sender, receiver) = crossbeam_channel::unbounded();
        PlaybackTracker {
            sender,
            receiver,
            generation: AtomicU64::new(0),
            playing: AtomicBool::new(false),
        }
    }

    /// Marks a new playback as started. Returns its generation and the sender
    /// the output thread should post its drain notification on.
    pub fn start(&self) -> (u64, Sender<PcmEvent>) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.playing.store(true, Ordering::Release);
        (generation, self.sender.clone())
    }

    /// Marks the current playback as stopped.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.playing.store(false, Ordering::Release);
    }

    /// Polls pending notifications and returns the resulting status.
    pub fn status(&self) -> PcmStatus {
        let current = self.generation.load(Ordering::Acquire);
        while let Ok(PcmEvent::Drained(generation)) = self.receiver.try_recv() {
            if generation == current {
                self.playing.store(false, Ordering::Release);
            }
        }

        if self.playing.load(Ordering::Acquire) {
            PcmStatus::Playing
        } else {
            PcmStatus::Idle
        }
    }
}

impl Default for PlaybackTracker {
    fn default() -> Self {
        PlaybackTracker::new()
    }
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device with the given name. A device that cannot be opened is
/// reported and replaced with the no-op device.
pub fn get_device(name: &str) -> Arc<dyn Device> {
    if name.starts_with("mock") {
        return Arc::new(mock::Device::get(name));
    }
    if name == none::NAME {
        return Arc::new(none::Device);
    }

    match cpal::Device::get(name) {
        Ok(device) => Arc::new(device),
        Err(e) => {
            warn!(
                device = name,
                err = e.to_string(),
                "Unable to open audio device, voice output is disabled."
            );
            Arc::new(none::Device)
        }
    }
}
