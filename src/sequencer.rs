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
//! The XMIDI sequencer. Up to eight streams play at once over the 16 hardware
//! MIDI channels, which streams can lock for their exclusive use.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, span, warn, Level};

use crate::{content::Content, midi, xmidi};

pub mod channel;
pub mod error;
mod events;
pub mod ramp;
pub mod stream;

pub use channel::{Controls, HardwareChannel, LockStatus};
pub use error::SequencerError;
pub use stream::{PlayState, Position, StreamId};

use channel::{ALL_NOTES_OFF, CHANNELS, SUSTAIN, SWITCH_ON, VOLUME};
use stream::{ActiveNote, MusicStream};

/// The number of streams that can be bound at once.
pub const SLOTS: usize = 8;

/// The rate XMIDI delays and note durations count in.
pub const XMIDI_TICK_RATE: u32 = 120;

/// Converts between the clock's tick rate and the XMIDI time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    tick_rate: u32,
}

impl Timing {
    pub fn new(tick_rate: u32) -> Timing {
        Timing {
            tick_rate: tick_rate.clamp(1, 10_000),
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Returns how many 100 µs units go by per tick. Ramps advance by this.
    pub fn ramp_step(&self) -> u32 {
        10_000 / self.tick_rate
    }

    /// Returns the tempo error a tick adds at the given tempo percent.
    pub(crate) fn tempo_units(&self, percent: u16) -> u32 {
        u32::from(percent) * XMIDI_TICK_RATE
    }

    /// Returns the tempo error that makes up one XMIDI period.
    pub(crate) fn period_units(&self) -> u32 {
        100 * self.tick_rate
    }
}

/// Scales a channel volume by a stream's volume percent.
fn scale_volume(value: u8, percent: u16) -> u8 {
    if percent == 100 {
        return value;
    }
    (u32::from(value) * u32::from(percent) / 100).min(127) as u8
}

/// Owns the hardware channel table and the stream slots.
pub struct Sequencer {
    midi: Arc<dyn midi::Device>,
    timing: Timing,
    hardware: [HardwareChannel; CHANNELS],
    slots: [Option<MusicStream>; SLOTS],
    generation: u32,
}

impl Sequencer {
    /// Resets the device and loads the default channel state into it.
    pub fn new(midi: Arc<dyn midi::Device>, tick_rate: u32) -> Sequencer {
        let span = span!(Level::INFO, "sequencer init");
        let _enter = span.enter();

        if let Err(e) = midi.reset() {
            warn!(device = midi.name(), err = e.to_string(), "Unable to reset MIDI device.");
        }

        let sequencer = Sequencer {
            midi,
            timing: Timing::new(tick_rate),
            hardware: std::array::from_fn(HardwareChannel::initial),
            slots: Default::default(),
            generation: 0,
        };
        for (channel, hardware) in sequencer.hardware.iter().enumerate() {
            for [status, data1, data2] in hardware.controls.restore_messages(channel as u8) {
                sequencer.send(status, data1, data2);
            }
        }

        info!(
            device = sequencer.midi.name(),
            tick_rate = sequencer.timing.tick_rate(),
            "Sequencer ready."
        );
        sequencer
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Returns the state of a hardware channel.
    pub fn hardware_channel(&self, channel: usize) -> &HardwareChannel {
        &self.hardware[channel]
    }

    /// Binds a track of an XMIDI container to a free slot. Returns None when
    /// every slot is taken.
    pub fn set_data(
        &mut self,
        content: Content,
        track: u16,
    ) -> Result<Option<StreamId>, SequencerError> {
        let events = xmidi::find_track(&content.read(), track)?.events;

        let Some(slot) = self.slots.iter().position(|slot| slot.is_none()) else {
            warn!(track, "No free stream slot.");
            return Ok(None);
        };

        self.generation = self.generation.wrapping_add(1);
        let id = StreamId {
            slot,
            generation: self.generation,
        };
        debug!(stream = %id, track, events = ?events, "Bound stream.");
        self.slots[slot] = Some(MusicStream::new(id, content, events));
        Ok(Some(id))
    }

    /// Starts a stream from the beginning, stopping it first if it's playing.
    pub fn play(&mut self, id: StreamId) -> Result<(), SequencerError> {
        let mut stream = self.take(id)?;
        if stream.is_playing() {
            self.reset_stream(&mut stream, PlayState::Stopped);
        }
        stream.init();
        stream.state = PlayState::Playing;
        info!(stream = %id, "Playing stream.");
        self.put_back(stream);
        Ok(())
    }

    /// Stops a stream, releasing its notes and locks.
    pub fn stop(&mut self, id: StreamId) -> Result<(), SequencerError> {
        let mut stream = self.take(id)?;
        if stream.is_playing() {
            self.reset_stream(&mut stream, PlayState::Stopped);
            info!(stream = %id, "Stopped stream.");
        }
        self.put_back(stream);
        Ok(())
    }

    /// Frees a stream's slot. A playing stream keeps its slot until it stops.
    pub fn clear_data(&mut self, id: StreamId) -> Result<(), SequencerError> {
        let mut stream = self.take(id)?;
        stream.clear_requested = true;
        if stream.is_playing() {
            debug!(stream = %id, "Deferring clear until the stream stops.");
        }
        self.put_back(stream);
        Ok(())
    }

    pub fn state(&self, id: StreamId) -> Option<PlayState> {
        self.stream(id).map(MusicStream::state)
    }

    pub fn is_playing(&self, id: StreamId) -> bool {
        self.stream(id).is_some_and(MusicStream::is_playing)
    }

    /// Moves a stream's volume percent to the target over the given time.
    /// A time of zero applies it right away.
    pub fn set_volume(
        &mut self,
        id: StreamId,
        percent: u16,
        milliseconds: u32,
    ) -> Result<(), SequencerError> {
        let mut stream = self.take(id)?;
        stream.volume.set(percent, milliseconds);
        if milliseconds == 0 {
            self.apply_volume(&stream);
        }
        self.put_back(stream);
        Ok(())
    }

    /// Moves a stream's tempo percent to the target over the given time.
    pub fn set_tempo(
        &mut self,
        id: StreamId,
        percent: u16,
        milliseconds: u32,
    ) -> Result<(), SequencerError> {
        let mut stream = self.take(id)?;
        stream.tempo.set(percent, milliseconds);
        self.put_back(stream);
        Ok(())
    }

    pub fn volume(&self, id: StreamId) -> Option<u16> {
        self.stream(id).map(|stream| stream.volume.current())
    }

    pub fn tempo(&self, id: StreamId) -> Option<u16> {
        self.stream(id).map(|stream| stream.tempo.current())
    }

    /// Returns the measure and beat a stream has reached.
    pub fn position(&self, id: StreamId) -> Option<Position> {
        self.stream(id).map(|stream| stream.beats.position())
    }

    /// Returns the number of occupied slots.
    pub fn active_streams(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Stops every stream and silences every hardware channel.
    pub fn silence(&mut self) {
        for slot in 0..SLOTS {
            let Some(mut stream) = self.slots[slot].take() else {
                continue;
            };
            if stream.is_playing() {
                self.reset_stream(&mut stream, PlayState::Stopped);
            }
            self.put_back(stream);
        }

        for channel in 0..CHANNELS {
            let status = 0xB0 | channel as u8;
            self.send(status, ALL_NOTES_OFF, 0);
            self.send(status, SUSTAIN, 0);
            self.hardware[channel].controls.sustain = Some(0);
            self.hardware[channel].notes = 0;
        }
        info!("Silenced all channels.");
    }

    /// Advances every playing stream by one clock tick. Streams are visited in
    /// slot order. A stream that hits a fault is torn down, the rest keep
    /// going, and the first fault is returned.
    pub fn tick(&mut self) -> Result<(), SequencerError> {
        let mut result = Ok(());
        for slot in 0..SLOTS {
            let Some(mut stream) = self.slots[slot].take() else {
                continue;
            };
            if stream.is_playing() {
                if let Err(e) = self.advance(&mut stream) {
                    self.reset_stream(&mut stream, PlayState::Done);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
            self.put_back(stream);
        }
        result
    }

    fn stream(&self, id: StreamId) -> Option<&MusicStream> {
        self.slots
            .get(id.slot)?
            .as_ref()
            .filter(|stream| stream.id == id)
    }

    /// Takes a stream out of its slot so it can be worked on alongside the
    /// rest of the sequencer.
    fn take(&mut self, id: StreamId) -> Result<MusicStream, SequencerError> {
        let slot = self
            .slots
            .get_mut(id.slot)
            .ok_or(SequencerError::UnknownStream(id))?;
        match slot.take() {
            Some(stream) if stream.id == id => Ok(stream),
            other => {
                *slot = other;
                Err(SequencerError::UnknownStream(id))
            }
        }
    }

    /// Returns a stream to its slot, unless a clear is pending and it has
    /// stopped playing.
    fn put_back(&mut self, stream: MusicStream) {
        if stream.clear_requested && !stream.is_playing() {
            info!(stream = %stream.id, "Cleared stream.");
            return;
        }
        let slot = stream.id.slot;
        self.slots[slot] = Some(stream);
    }

    fn send(&self, status: u8, data1: u8, data2: u8) {
        if let Err(e) = self.midi.send_short(status, data1, data2) {
            warn!(
                device = self.midi.name(),
                status,
                err = e.to_string(),
                "Unable to send MIDI message."
            );
        }
    }

    fn send_sysex(&self, data: &[u8]) {
        if let Err(e) = self.midi.send_sysex(data) {
            warn!(
                device = self.midi.name(),
                err = e.to_string(),
                "Unable to send system exclusive message."
            );
        }
    }

    /// Returns true if the logical channel's hardware channel is locked by
    /// someone other than this stream.
    fn is_blocked(&self, stream: &MusicStream, logical: usize) -> bool {
        self.hardware[stream.hardware_channel(logical)].is_locked() && !stream.owns_lock(logical)
    }

    /// Sends a channel message on the logical channel's hardware channel.
    /// Nothing is sent if the channel is blocked. The hardware table keeps
    /// the message unless it comes from the lock owner.
    fn forward(
        &mut self,
        stream: &MusicStream,
        logical: usize,
        kind: u8,
        data1: u8,
        data2: u8,
    ) -> bool {
        if self.is_blocked(stream, logical) {
            return false;
        }

        let channel = stream.hardware_channel(logical);
        if !stream.owns_lock(logical) {
            let controls = &mut self.hardware[channel].controls;
            match kind {
                0xB0 => {
                    controls.record(data1, data2);
                }
                0xC0 => controls.program = Some(data1),
                0xE0 => controls.pitch_bend = Some((data1, data2)),
                _ => {}
            }
        }
        self.send(kind | channel as u8, data1, data2);
        true
    }

    /// Sends Note-Off for each note and takes it off its hardware channel's
    /// count.
    fn release_notes(&mut self, notes: Vec<ActiveNote>) {
        for note in notes {
            self.send(0x80 | note.channel, note.note, 0);
            let hardware = &mut self.hardware[usize::from(note.channel)];
            hardware.notes = hardware.notes.saturating_sub(1);
        }
    }

    /// Releases every note on a hardware channel, in every stream.
    fn flush_channel(&mut self, current: &mut MusicStream, channel: usize) {
        let channel_id = channel as u8;
        let mut notes = current.notes.take_channel(channel_id);
        for stream in self.slots.iter_mut().flatten() {
            notes.extend(stream.notes.take_channel(channel_id));
        }
        self.release_notes(notes);
    }

    /// Picks the hardware channel to lock: the one with the fewest notes
    /// sounding, scanning from channel 15 down. Protected channels are only
    /// considered when nothing else is free, locked channels never.
    pub fn find_lock_channel(&self) -> Option<usize> {
        [LockStatus::LOCKED | LockStatus::PROTECTED, LockStatus::LOCKED]
            .into_iter()
            .find_map(|mask| {
                (0..CHANNELS)
                    .rev()
                    .filter(|&channel| !self.hardware[channel].status.intersects(mask))
                    .min_by_key(|&channel| self.hardware[channel].notes)
            })
    }

    /// Locks a hardware channel for the stream's logical channel. Falls back
    /// to the identity mapping if every channel is locked.
    fn lock(&mut self, stream: &mut MusicStream, logical: usize) {
        if stream.owns_lock(logical) {
            return;
        }

        let Some(channel) = self.find_lock_channel() else {
            debug!(stream = %stream.id, logical, "No hardware channel to lock.");
            stream.channel_map[logical] = logical as u8;
            return;
        };

        self.send(0xB0 | channel as u8, SUSTAIN, 0);
        self.flush_channel(stream, channel);
        self.hardware[channel].notes = 0;
        self.hardware[channel].status.insert(LockStatus::LOCKED);
        stream.channel_map[logical] = channel as u8;
        stream.locked |= 1 << logical;
        debug!(stream = %stream.id, logical, channel, "Locked channel.");
    }

    /// Gives up the stream's lock on the logical channel, if it has one, and
    /// maps the channel back to itself.
    fn unlock(&mut self, stream: &mut MusicStream, logical: usize) {
        if stream.owns_lock(logical) {
            let channel = stream.hardware_channel(logical);
            self.flush_channel(stream, channel);
            self.release(channel);
            stream.locked &= !(1 << logical);
            debug!(stream = %stream.id, logical, channel, "Unlocked channel.");
        }
        stream.channel_map[logical] = logical as u8;
    }

    /// Clears a hardware channel's lock bits and sends its saved state back
    /// to it.
    fn release(&mut self, channel: usize) {
        self.hardware[channel]
            .status
            .remove(LockStatus::LOCKED | LockStatus::PROTECTED);
        for [status, data1, data2] in self.hardware[channel].controls.restore_messages(channel as u8)
        {
            self.send(status, data1, data2);
        }
    }

    /// Releases everything a stream holds: its notes, any sustain it left on
    /// and its channel locks.
    fn reset_stream(&mut self, stream: &mut MusicStream, state: PlayState) {
        let notes = stream.notes.take_all();
        self.release_notes(notes);

        for logical in 0..CHANNELS {
            if stream.shadows[logical]
                .sustain
                .is_some_and(|sustain| sustain >= SWITCH_ON)
            {
                stream.shadows[logical].sustain = Some(0);
                self.forward(stream, logical, 0xB0, SUSTAIN, 0);
            }
            self.unlock(stream, logical);
        }
        stream.state = state;
    }

    /// Sends every channel volume the stream has set, scaled by its current
    /// volume percent.
    fn apply_volume(&mut self, stream: &MusicStream) {
        let percent = stream.volume.current();
        for logical in 0..CHANNELS {
            if let Some(volume) = stream.shadows[logical].volume {
                self.forward(stream, logical, 0xB0, VOLUME, scale_volume(volume, percent));
            }
        }
    }
}

/// A sequencer shared between the clock thread and the caller.
#[derive(Clone)]
pub struct SharedSequencer {
    inner: Arc<Mutex<Sequencer>>,
    ticking: Arc<AtomicBool>,
}

impl SharedSequencer {
    pub fn new(sequencer: Sequencer) -> SharedSequencer {
        SharedSequencer {
            inner: Arc::new(Mutex::new(sequencer)),
            ticking: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Locks the sequencer for a batch of calls.
    pub fn lock(&self) -> MutexGuard<'_, Sequencer> {
        self.inner.lock()
    }

    /// Ticks the sequencer. If a tick is already running elsewhere this does
    /// nothing and returns false.
    pub fn tick(&self) -> Result<bool, SequencerError> {
        if self
            .ticking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        let _ticking = TickGuard(&self.ticking);
        self.inner.lock().tick().map(|_| true)
    }
}

/// Clears the single-flight flag when a tick ends, even by unwinding.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
