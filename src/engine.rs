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
use std::{sync::Arc, time::Duration};

use tracing::{debug, info, span, warn, Level};

use crate::{
    audio::{self, PcmStatus},
    clock::Clock,
    config::{self, ConfigError},
    content::Content,
    driver::{DriverError, DriverKind, DriverRegistry},
    midi,
    sequencer::{Sequencer, SequencerError, SharedSequencer, StreamId},
};

/// Number of sound effect streams that can play at once.
pub const SOUND_BUFFERS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error("nothing is loaded into the {0} driver")]
    NotLoaded(DriverKind),
}

/// Plays music, sound effects and voices. Owns the sequencer, the driver
/// registry, the PCM device and the clock that drives them.
pub struct Engine {
    /// The sequencer, shared with the clock thread.
    sequencer: SharedSequencer,
    /// The device voices are played through.
    pcm: Arc<dyn audio::Device>,
    /// The install table and the files bound to each driver.
    registry: DriverRegistry,
    /// The clock thread, if running.
    clock: Option<Clock>,
    /// How long a music fade out takes.
    fade_out: Duration,
    /// The current music stream.
    music: Option<StreamId>,
    /// The sound effect streams, used round robin.
    sounds: [Option<StreamId>; SOUND_BUFFERS],
    next_sound: usize,
    /// Priority of the voice that is playing.
    voice_priority: Option<u8>,
    shut_down: bool,
}

impl Engine {
    /// Creates an engine with the devices named in the configuration.
    pub fn new(config: &config::Engine) -> Result<Engine, EngineError> {
        let midi = midi::get_device(config.midi().device());
        let pcm = audio::get_device(config.pcm().device());
        Engine::with_devices(config, midi, pcm)
    }

    /// Creates an engine that plays through the given devices.
    pub fn with_devices(
        config: &config::Engine,
        midi: Arc<dyn midi::Device>,
        pcm: Arc<dyn audio::Device>,
    ) -> Result<Engine, EngineError> {
        config.validate()?;
        let fade_out = config.fade_out()?;
        let span = span!(Level::INFO, "engine");
        let _enter = span.enter();

        let sequencer = SharedSequencer::new(Sequencer::new(midi, config.clock().tick_rate()));

        let mut registry = DriverRegistry::new(config.search_paths());
        let drivers = config.drivers();
        for (kind, driver, extension) in [
            (DriverKind::Music, drivers.music(), "XMI"),
            (DriverKind::Sound, drivers.sound(), "XMI"),
            (DriverKind::Voice, drivers.voice(), "VOC"),
        ] {
            if driver.enabled() {
                registry.install_driver(kind, driver.extension_or(extension));
            } else {
                info!(driver = %kind, "Driver disabled.");
            }
        }

        let clock = if config.clock().autostart() {
            let sequencer = sequencer.clone();
            Some(Clock::start(config.clock().period(), move || {
                sequencer.tick().map(|_| ())
            }))
        } else {
            None
        };

        info!(
            pcm = pcm.name(),
            tick_rate = config.clock().tick_rate(),
            clock = clock.is_some(),
            "Engine started."
        );

        Ok(Engine {
            sequencer,
            pcm,
            registry,
            clock,
            fade_out,
            music: None,
            sounds: [None; SOUND_BUFFERS],
            next_sound: 0,
            voice_priority: None,
            shut_down: false,
        })
    }

    /// Returns the shared sequencer.
    pub fn sequencer(&self) -> &SharedSequencer {
        &self.sequencer
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Returns true if a clock thread is ticking the sequencer.
    pub fn is_clock_running(&self) -> bool {
        self.clock.as_ref().is_some_and(Clock::is_running)
    }

    /// Returns the current music stream.
    pub fn music_stream(&self) -> Option<StreamId> {
        self.music
    }

    /// Loads a music file. Music that is playing is stopped first.
    pub fn load_music(&mut self, name: &str) -> Result<(), EngineError> {
        let span = span!(Level::INFO, "load music");
        let _enter = span.enter();
        self.stop_music();
        self.registry.load_file(DriverKind::Music, name)?;
        Ok(())
    }

    /// Plays a track of the loaded music file at the given volume percent,
    /// replacing the current music. Returns None if no stream slot is free.
    pub fn play_music(
        &mut self,
        track: u16,
        volume: u16,
    ) -> Result<Option<StreamId>, EngineError> {
        let span = span!(Level::INFO, "play music");
        let _enter = span.enter();
        let content = self
            .registry
            .content(DriverKind::Music)
            .ok_or(EngineError::NotLoaded(DriverKind::Music))?;

        let mut sequencer = self.sequencer.lock();
        if let Some(previous) = self.music.take() {
            discard(&mut sequencer, previous);
        }

        let Some(id) = sequencer.set_data(content, track)? else {
            return Ok(None);
        };
        sequencer.play(id)?;
        sequencer.set_volume(id, volume, 0)?;
        self.music = Some(id);

        info!(stream = %id, track, volume, "Playing music.");
        Ok(Some(id))
    }

    /// Stops and frees the current music stream.
    pub fn stop_music(&mut self) {
        if let Some(id) = self.music.take() {
            discard(&mut self.sequencer.lock(), id);
            info!(stream = %id, "Stopped music.");
        }
    }

    /// Fades the current music to silence over the configured time.
    pub fn fade_out_music(&mut self) -> Result<(), EngineError> {
        let Some(id) = self.music else {
            return Ok(());
        };
        let milliseconds = u32::try_from(self.fade_out.as_millis()).unwrap_or(u32::MAX);
        self.sequencer.lock().set_volume(id, 0, milliseconds)?;
        info!(stream = %id, fade_out = ?self.fade_out, "Fading out music.");
        Ok(())
    }

    pub fn is_music_playing(&self) -> bool {
        self.music
            .is_some_and(|id| self.sequencer.lock().is_playing(id))
    }

    /// Loads a sound effect file, sharing the music file if it's the same.
    pub fn load_sounds(&mut self, name: &str) -> Result<(), EngineError> {
        let span = span!(Level::INFO, "load sounds");
        let _enter = span.enter();
        self.stop_sounds();
        self.registry.load_sound_file(name)?;
        Ok(())
    }

    /// Plays a track of the loaded sound file in the next sound buffer,
    /// cutting off whatever that buffer was playing.
    pub fn play_sound(
        &mut self,
        track: u16,
        volume: u16,
    ) -> Result<Option<StreamId>, EngineError> {
        let span = span!(Level::INFO, "play sound");
        let _enter = span.enter();
        let content = self
            .registry
            .content(DriverKind::Sound)
            .ok_or(EngineError::NotLoaded(DriverKind::Sound))?;

        let buffer = self.next_sound;
        self.next_sound = (self.next_sound + 1) % SOUND_BUFFERS;

        let mut sequencer = self.sequencer.lock();
        if let Some(previous) = self.sounds[buffer].take() {
            discard(&mut sequencer, previous);
        }

        let Some(id) = sequencer.set_data(content, track)? else {
            return Ok(None);
        };
        sequencer.play(id)?;
        sequencer.set_volume(id, volume, 0)?;
        self.sounds[buffer] = Some(id);

        debug!(stream = %id, buffer, track, volume, "Playing sound.");
        Ok(Some(id))
    }

    /// Stops and frees every sound effect stream.
    pub fn stop_sounds(&mut self) {
        let mut sequencer = self.sequencer.lock();
        for id in self.sounds.iter_mut().filter_map(Option::take) {
            discard(&mut sequencer, id);
        }
    }

    /// Reads a voice file. Voices aren't bound to the voice driver, so any
    /// number can be held at once.
    pub fn load_voice(&self, name: &str) -> Result<Content, EngineError> {
        Ok(self.registry.read_file(DriverKind::Voice, name)?)
    }

    /// Plays voice data unless a voice of higher priority is still playing.
    /// Returns true if playback started. Data that can't be decoded or
    /// played is logged and skipped.
    pub fn play_voice(&mut self, voice: &Content, priority: u8) -> bool {
        let span = span!(Level::INFO, "play voice");
        let _enter = span.enter();
        if let Some(current) = self.voice_priority {
            if priority < current && self.pcm.status() == PcmStatus::Playing {
                debug!(priority, current, "Voice ignored, a higher priority voice is playing.");
                return false;
            }
        }

        if let Err(e) = self.pcm.play(&voice.read()) {
            warn!(err = e.to_string(), "Unable to play voice.");
            return false;
        }
        self.voice_priority = Some(priority);
        true
    }

    pub fn stop_voice(&mut self) {
        if let Err(e) = self.pcm.stop() {
            warn!(err = e.to_string(), "Unable to stop voice.");
        }
        self.voice_priority = None;
    }

    pub fn is_voice_playing(&self) -> bool {
        self.pcm.status() == PcmStatus::Playing
    }

    /// Runs one sequencer tick now. Returns false if a tick was already in
    /// progress on another thread.
    pub fn tick(&self) -> Result<bool, SequencerError> {
        self.sequencer.tick()
    }

    /// Stops the clock, silences every channel, stops the voice and
    /// uninstalls the drivers. Called on drop if not called before.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let span = span!(Level::INFO, "shutdown");
        let _enter = span.enter();

        if let Some(mut clock) = self.clock.take() {
            clock.stop();
        }
        self.music = None;
        self.sounds = [None; SOUND_BUFFERS];
        self.sequencer.lock().silence();
        self.stop_voice();
        self.registry.uninstall_all();
        info!("Engine shut down.");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stops a stream and frees its slot.
fn discard(sequencer: &mut Sequencer, id: StreamId) {
    if let Err(e) = sequencer.stop(id).and_then(|_| sequencer.clear_data(id)) {
        debug!(stream = %id, err = %e, "Stream already released.");
    }
}
