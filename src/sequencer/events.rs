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
//! Event stream decoding. An XMIDI event stream is a run of channel and
//! system messages separated by delay bytes (any byte below 0x80). Note-on
//! events carry their own duration, so there are no note-off events.

use tracing::{debug, warn};

use super::{
    channel::{
        CALLBACK_TRIGGER, CHANNEL_LOCK, CHANNEL_PROTECT, CLEAR_BEAT_BAR, FOR_LOOP,
        INDIRECT_PREFIX, NEXT_LOOP, SWITCH_ON, VOLUME,
    },
    scale_volume,
    stream::{ActiveNote, MusicStream, PlayState},
    LockStatus, Sequencer, SequencerError,
};

const META_END_OF_TRACK: u8 = 0x2F;
const META_TEMPO: u8 = 0x51;
const META_TIME_SIGNATURE: u8 = 0x58;
const META_KEY_SIGNATURE: u8 = 0x59;
const META_PORT: u8 = 0x21;
const META_SMPTE_OFFSET: u8 = 0x54;
const META_MARKER: u8 = 0x06;

/// Why decoding stopped before the stream's next delay.
#[derive(Debug)]
pub(super) enum Interrupt {
    /// The event data ran out in the middle of a message.
    Truncated,
    Fault(SequencerError),
}

impl From<SequencerError> for Interrupt {
    fn from(e: SequencerError) -> Self {
        Interrupt::Fault(e)
    }
}

type Decode<T> = Result<T, Interrupt>;

/// A cursor over a stream's event bytes.
pub(super) struct Reader<'a> {
    data: &'a [u8],
    pub(super) cursor: usize,
}

impl<'a> Reader<'a> {
    pub(super) fn new(data: &'a [u8], cursor: usize) -> Reader<'a> {
        Reader { data, cursor }
    }

    fn peek(&self) -> Decode<u8> {
        self.data
            .get(self.cursor)
            .copied()
            .ok_or(Interrupt::Truncated)
    }

    fn byte(&mut self) -> Decode<u8> {
        let byte = self.peek()?;
        self.cursor += 1;
        Ok(byte)
    }

    fn bytes(&mut self, len: usize) -> Decode<&'a [u8]> {
        let bytes = self
            .data
            .get(self.cursor..self.cursor.saturating_add(len))
            .ok_or(Interrupt::Truncated)?;
        self.cursor += len;
        Ok(bytes)
    }

    /// Reads a variable length quantity: seven bits per byte, most
    /// significant first, high bit set on every byte but the last.
    pub(super) fn varlen(&mut self) -> Decode<u32> {
        let mut value: u32 = 0;
        loop {
            let byte = self.byte()?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// Reads a delay: the sum of consecutive bytes below 0x80.
    fn delay(&mut self) -> u32 {
        let mut delay: u32 = 0;
        while let Some(&byte) = self.data.get(self.cursor).filter(|byte| **byte < 0x80) {
            delay += u32::from(byte);
            self.cursor += 1;
        }
        delay
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<String>>()
        .join(" ")
}

impl Sequencer {
    /// Does one tick's worth of work on a playing stream: runs the periods the
    /// tempo allows, then steps its volume and tempo ramps.
    pub(super) fn advance(&mut self, stream: &mut MusicStream) -> Result<(), SequencerError> {
        stream.tempo_error = stream
            .tempo_error
            .saturating_add(self.timing.tempo_units(stream.tempo.current()));

        let period = self.timing.period_units();
        while stream.tempo_error >= period {
            stream.tempo_error -= period;
            stream.beats.advance();

            let expired = stream.notes.expire();
            self.release_notes(expired);

            stream.delay = stream.delay.saturating_sub(1);
            if stream.delay == 0 {
                self.decode(stream)?;
            }
            if !stream.is_playing() {
                stream.tempo_error = 0;
                return Ok(());
            }
        }

        let step = self.timing.ramp_step();
        if stream.volume.advance(step) {
            self.apply_volume(stream);
        }
        stream.tempo.advance(step);
        Ok(())
    }

    /// Decodes events until the next delay or until the stream stops.
    pub(super) fn decode(&mut self, stream: &mut MusicStream) -> Result<(), SequencerError> {
        let content = stream.content.clone();
        let data = content.read();
        let end = stream.events.end.min(data.len());
        let mut reader = Reader::new(&data[..end], stream.cursor);

        let result = self.decode_events(stream, &mut reader);
        stream.cursor = reader.cursor;
        match result {
            Ok(()) => Ok(()),
            Err(Interrupt::Truncated) => {
                warn!(
                    stream = %stream.id,
                    offset = reader.cursor,
                    "Event data ended without an end of track."
                );
                self.end_of_track(stream);
                Ok(())
            }
            Err(Interrupt::Fault(e)) => Err(e),
        }
    }

    fn decode_events(&mut self, stream: &mut MusicStream, reader: &mut Reader) -> Decode<()> {
        while stream.delay == 0 && stream.is_playing() {
            let status = reader.peek()?;
            if status < 0x80 {
                stream.delay = reader.delay();
                continue;
            }
            reader.cursor += 1;
            self.event(stream, reader, status)?;
        }
        Ok(())
    }

    fn event(&mut self, stream: &mut MusicStream, reader: &mut Reader, status: u8) -> Decode<()> {
        let logical = usize::from(status & 0x0F);
        let kind = status & 0xF0;
        match kind {
            0x90 => {
                let note = reader.byte()?;
                let velocity = reader.byte()?;
                let duration = reader.varlen()?;
                self.note_on(stream, logical, note, velocity, duration);
            }
            0x80 | 0xA0 => {
                let data1 = reader.byte()?;
                let data2 = reader.byte()?;
                self.forward(stream, logical, kind, data1, data2);
            }
            0xD0 => {
                let pressure = reader.byte()?;
                self.forward(stream, logical, kind, pressure, 0);
            }
            0xC0 => {
                let program = reader.byte()?;
                stream.shadows[logical].program = Some(program);
                self.forward(stream, logical, kind, program, 0);
            }
            0xE0 => {
                let lsb = reader.byte()?;
                let msb = reader.byte()?;
                stream.shadows[logical].pitch_bend = Some((lsb, msb));
                self.forward(stream, logical, kind, lsb, msb);
            }
            0xB0 => {
                let controller = reader.byte()?;
                let value = reader.byte()?;
                self.control_change(stream, reader, logical, controller, value)?;
            }
            _ => match status {
                0xF0 => {
                    let len = reader.varlen()? as usize;
                    let body = reader.bytes(len)?;
                    let mut message = Vec::with_capacity(len + 1);
                    message.push(0xF0);
                    message.extend_from_slice(body);
                    self.send_sysex(&message);
                }
                0xFF => {
                    self.meta(stream, reader)?;
                }
                other => {
                    warn!(
                        stream = %stream.id,
                        status = format!("{:#04X}", other),
                        offset = reader.cursor - 1,
                        "Skipping unexpected system message."
                    );
                }
            },
        }
        Ok(())
    }

    fn note_on(
        &mut self,
        stream: &mut MusicStream,
        logical: usize,
        note: u8,
        velocity: u8,
        duration: u32,
    ) {
        if self.is_blocked(stream, logical) {
            return;
        }

        let channel = stream.hardware_channel(logical);
        let active = ActiveNote {
            channel: channel as u8,
            note,
            remaining: duration.max(1),
        };
        if !stream.notes.insert(active) {
            debug!(stream = %stream.id, note, "Note table full, dropping note.");
            return;
        }
        self.send(0x90 | channel as u8, note, velocity);
        self.hardware[channel].notes += 1;
    }

    fn control_change(
        &mut self,
        stream: &mut MusicStream,
        reader: &mut Reader,
        logical: usize,
        controller: u8,
        value: u8,
    ) -> Decode<()> {
        match controller {
            VOLUME => {
                stream.shadows[logical].volume = Some(value);
                let volume = scale_volume(value, stream.volume.current());
                self.forward(stream, logical, 0xB0, VOLUME, volume);
            }
            CHANNEL_LOCK => {
                stream.shadows[logical].lock = Some(value);
                if value >= SWITCH_ON {
                    self.lock(stream, logical);
                } else {
                    self.unlock(stream, logical);
                }
            }
            CHANNEL_PROTECT => {
                stream.shadows[logical].protect = Some(value);
                let status = &mut self.hardware[stream.hardware_channel(logical)].status;
                status.set(LockStatus::PROTECTED, value >= SWITCH_ON);
            }
            FOR_LOOP => {
                if !stream.loops.push(reader.cursor, value) {
                    debug!(stream = %stream.id, "Loop stack full, dropping loop.");
                }
            }
            NEXT_LOOP => {
                if value >= SWITCH_ON {
                    if let Some(position) = stream.loops.next() {
                        reader.cursor = position;
                    }
                }
            }
            INDIRECT_PREFIX | CLEAR_BEAT_BAR | CALLBACK_TRIGGER => {
                return Err(SequencerError::UnsupportedController {
                    stream: stream.id,
                    controller,
                    offset: reader.cursor - 3,
                }
                .into());
            }
            _ => {
                stream.shadows[logical].record(controller, value);
                self.forward(stream, logical, 0xB0, controller, value);
            }
        }
        Ok(())
    }

    /// Handles a meta event. Returns the number of bytes it took up after the
    /// 0xFF status byte.
    pub(super) fn meta(&mut self, stream: &mut MusicStream, reader: &mut Reader) -> Decode<usize> {
        let start = reader.cursor;
        let kind = reader.byte()?;
        let len = reader.varlen()? as usize;
        let payload = reader.bytes(len)?;

        match kind {
            META_END_OF_TRACK => self.end_of_track(stream),
            META_TIME_SIGNATURE if payload.len() >= 2 => {
                stream.beats.set_time_signature(payload[0], payload[1]);
                debug!(
                    stream = %stream.id,
                    numerator = payload[0],
                    denominator = payload[1],
                    "Time signature."
                );
            }
            META_TEMPO if payload.len() >= 3 => {
                let time_per_beat = (u32::from(payload[0]) << 20)
                    | (u32::from(payload[1]) << 12)
                    | (u32::from(payload[2]) << 4);
                stream.beats.set_time_per_beat(time_per_beat);
                debug!(stream = %stream.id, time_per_beat, "Tempo.");
            }
            META_KEY_SIGNATURE => {
                debug!(stream = %stream.id, payload = hex(payload), "Key signature.");
            }
            META_PORT => {
                debug!(stream = %stream.id, payload = hex(payload), "MIDI port.");
            }
            META_SMPTE_OFFSET => {
                debug!(stream = %stream.id, payload = hex(payload), "SMPTE offset.");
            }
            META_MARKER => {
                debug!(
                    stream = %stream.id,
                    marker = %String::from_utf8_lossy(payload),
                    "Marker."
                );
            }
            other => {
                warn!(
                    stream = %stream.id,
                    kind = format!("{:#04X}", other),
                    payload = hex(payload),
                    "Unexpected meta event."
                );
            }
        }
        Ok(reader.cursor - start)
    }

    fn end_of_track(&mut self, stream: &mut MusicStream) {
        debug!(stream = %stream.id, "End of track.");
        self.reset_stream(stream, PlayState::Done);
    }
}
