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
//! Per-channel controller state, shared by the hardware channel table and
//! the per-stream shadows.

use bitflags::bitflags;

/// The number of MIDI channels.
pub const CHANNELS: usize = 16;

pub const MODULATION: u8 = 1;
pub const VOLUME: u8 = 7;
pub const PANPOT: u8 = 10;
pub const EXPRESSION: u8 = 11;
pub const SUSTAIN: u8 = 64;
pub const CHANNEL_LOCK: u8 = 110;
pub const CHANNEL_PROTECT: u8 = 111;
pub const VOICE_PROTECT: u8 = 112;
pub const BANK_SELECT: u8 = 114;
pub const INDIRECT_PREFIX: u8 = 115;
pub const FOR_LOOP: u8 = 116;
pub const NEXT_LOOP: u8 = 117;
pub const CLEAR_BEAT_BAR: u8 = 118;
pub const CALLBACK_TRIGGER: u8 = 119;
pub const ALL_NOTES_OFF: u8 = 123;

/// Controller values at or above this mean "on".
pub const SWITCH_ON: u8 = 64;

/// Programs loaded on channels 1 through 9 at startup. Channel 9 keeps
/// whatever the synth has.
pub const DEFAULT_PROGRAMS: [Option<u8>; 9] = [
    Some(68),
    Some(48),
    Some(95),
    Some(78),
    Some(41),
    Some(3),
    Some(110),
    Some(122),
    None,
];

bitflags! {
    /// Lock state of a hardware channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LockStatus: u8 {
        /// Reserved by one stream. Everyone else's traffic is held back.
        const LOCKED = 0x80;
        /// Skipped by the first pass of lock arbitration.
        const PROTECTED = 0x40;
    }
}

impl Default for LockStatus {
    fn default() -> Self {
        LockStatus::empty()
    }
}

/// The controller values of one channel. None means the value was never set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub volume: Option<u8>,
    pub modulation: Option<u8>,
    pub panpot: Option<u8>,
    pub expression: Option<u8>,
    pub sustain: Option<u8>,
    pub bank_select: Option<u8>,
    pub lock: Option<u8>,
    pub protect: Option<u8>,
    pub voice_protect: Option<u8>,
    pub program: Option<u8>,
    /// LSB and MSB of the last pitch bend.
    pub pitch_bend: Option<(u8, u8)>,
}

impl Controls {
    fn value_mut(&mut self, controller: u8) -> Option<&mut Option<u8>> {
        match controller {
            MODULATION => Some(&mut self.modulation),
            VOLUME => Some(&mut self.volume),
            PANPOT => Some(&mut self.panpot),
            EXPRESSION => Some(&mut self.expression),
            SUSTAIN => Some(&mut self.sustain),
            CHANNEL_LOCK => Some(&mut self.lock),
            CHANNEL_PROTECT => Some(&mut self.protect),
            VOICE_PROTECT => Some(&mut self.voice_protect),
            BANK_SELECT => Some(&mut self.bank_select),
            _ => None,
        }
    }

    /// Records a controller value. Returns false for controllers that aren't
    /// tracked.
    pub fn record(&mut self, controller: u8, value: u8) -> bool {
        match self.value_mut(controller) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    /// Returns the recorded value of a controller.
    pub fn get(&self, controller: u8) -> Option<u8> {
        match controller {
            MODULATION => self.modulation,
            VOLUME => self.volume,
            PANPOT => self.panpot,
            EXPRESSION => self.expression,
            SUSTAIN => self.sustain,
            CHANNEL_LOCK => self.lock,
            CHANNEL_PROTECT => self.protect,
            VOICE_PROTECT => self.voice_protect,
            BANK_SELECT => self.bank_select,
            _ => None,
        }
    }

    /// Returns the messages that put a channel back into this state.
    pub fn restore_messages(&self, channel: u8) -> Vec<[u8; 3]> {
        let status = 0xB0 | channel;
        let mut messages: Vec<[u8; 3]> = [
            (VOLUME, self.volume),
            (MODULATION, self.modulation),
            (PANPOT, self.panpot),
            (EXPRESSION, self.expression),
            (SUSTAIN, self.sustain),
            (BANK_SELECT, self.bank_select),
            (VOICE_PROTECT, self.voice_protect),
        ]
        .into_iter()
        .filter_map(|(controller, value)| value.map(|value| [status, controller, value]))
        .collect();

        if let Some(program) = self.program {
            messages.push([0xC0 | channel, program, 0]);
        }
        if let Some((lsb, msb)) = self.pitch_bend {
            messages.push([0xE0 | channel, lsb, msb]);
        }
        messages
    }
}

/// The state of one of the 16 hardware channels, as last sent to the synth
/// by a stream that doesn't hold a lock on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardwareChannel {
    pub controls: Controls,
    /// Notes currently sounding on this channel across every stream.
    pub notes: u16,
    pub status: LockStatus,
}

impl HardwareChannel {
    /// Returns the startup state of the given channel.
    pub fn initial(channel: usize) -> HardwareChannel {
        let program = channel
            .checked_sub(1)
            .and_then(|index| DEFAULT_PROGRAMS.get(index).copied())
            .flatten();

        HardwareChannel {
            controls: Controls {
                volume: Some(127),
                panpot: Some(64),
                expression: Some(127),
                program,
                ..Controls::default()
            },
            notes: 0,
            status: LockStatus::empty(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.status.contains(LockStatus::LOCKED)
    }
}
