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
//! XMIDI music, sound effect and voice playback.
//!
//! The [sequencer] plays up to eight XMIDI streams over sixteen hardware MIDI
//! channels, arbitrating channel locks between them. The [driver] registry
//! loads the files streams read from, and the [engine] ties both to a MIDI
//! transport, a PCM transport for voices and a scheduler [clock].

pub mod audio;
pub mod clock;
pub mod config;
pub mod content;
pub mod driver;
pub mod engine;
pub mod midi;
pub mod playsync;
pub mod sequencer;
pub mod voc;
pub mod xmidi;

#[cfg(test)]
mod testutil;
