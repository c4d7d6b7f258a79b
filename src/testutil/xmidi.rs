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

//! Builders for XMIDI containers and event streams.

/// Builds a chunk with the given tag, padded to an even length.
pub fn chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(body.len() + 9);
    data.extend_from_slice(tag);
    data.extend_from_slice(&(body.len() as u32).to_be_bytes());
    data.extend_from_slice(body);
    if body.len() % 2 == 1 {
        data.push(0);
    }
    data
}

fn xmid_form(events: &[u8]) -> Vec<u8> {
    let mut body = b"XMID".to_vec();
    body.extend_from_slice(&chunk(b"TIMB", &[0x00, 0x00]));
    body.extend_from_slice(&chunk(b"EVNT", events));
    chunk(b"FORM", &body)
}

/// Builds a single-track container.
pub fn single(events: &[u8]) -> Vec<u8> {
    xmid_form(events)
}

/// Builds a multi-track collection.
pub fn collection(tracks: &[&[u8]]) -> Vec<u8> {
    let mut body = b"XMID".to_vec();
    for events in tracks {
        body.extend_from_slice(&xmid_form(events));
    }
    chunk(b"CAT ", &body)
}

/// Encodes a value as a 7-bit-per-byte, most significant first quantity.
pub fn varlen(mut value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        bytes.insert(0, (value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    bytes
}

/// An event stream builder.
#[derive(Default)]
pub struct Events {
    bytes: Vec<u8>,
}

impl Events {
    pub fn new() -> Events {
        Events::default()
    }

    /// Waits the given number of ticks before the next event.
    pub fn delay(mut self, mut ticks: u32) -> Events {
        while ticks > 0x7F {
            self.bytes.push(0x7F);
            ticks -= 0x7F;
        }
        if ticks > 0 {
            self.bytes.push(ticks as u8);
        }
        self
    }

    pub fn note(mut self, channel: u8, note: u8, velocity: u8, duration: u32) -> Events {
        self.bytes.extend_from_slice(&[0x90 | channel, note, velocity]);
        self.bytes.extend_from_slice(&varlen(duration));
        self
    }

    pub fn control(mut self, channel: u8, controller: u8, value: u8) -> Events {
        self.bytes
            .extend_from_slice(&[0xB0 | channel, controller, value]);
        self
    }

    pub fn program(mut self, channel: u8, program: u8) -> Events {
        self.bytes.extend_from_slice(&[0xC0 | channel, program]);
        self
    }

    pub fn pitch_bend(mut self, channel: u8, lsb: u8, msb: u8) -> Events {
        self.bytes.extend_from_slice(&[0xE0 | channel, lsb, msb]);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Events {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn sysex(mut self, data: &[u8]) -> Events {
        self.bytes.push(0xF0);
        self.bytes.extend_from_slice(&varlen(data.len() as u32));
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn meta(mut self, kind: u8, data: &[u8]) -> Events {
        self.bytes.extend_from_slice(&[0xFF, kind]);
        self.bytes.extend_from_slice(&varlen(data.len() as u32));
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn tempo(self, micros_per_beat: u32) -> Events {
        let bytes = micros_per_beat.to_be_bytes();
        self.meta(0x51, &bytes[1..4])
    }

    pub fn time_signature(self, numerator: u8, denominator_power: u8) -> Events {
        self.meta(0x58, &[numerator, denominator_power, 24, 8])
    }

    pub fn end(self) -> Events {
        self.meta(0x2F, &[])
    }

    pub fn bytes(self) -> Vec<u8> {
        self.bytes
    }
}
