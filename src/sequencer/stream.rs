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
use std::{fmt, ops::Range};

use super::{
    channel::{Controls, CHANNELS},
    ramp::Ramp,
};
use crate::content::Content;

/// The number of notes a stream can hold down at once.
pub const NOTE_SLOTS: usize = 32;

/// The depth of the for-loop stack.
pub const LOOP_SLOTS: usize = 4;

/// One 120 Hz period expressed in the beat clock's fixed point units.
pub const DEFAULT_TIME_FRACTION: u32 = 133_333;

/// 500000 µs per beat (120 BPM), in the beat clock's fixed point units.
pub const DEFAULT_TIME_PER_BEAT: u32 = 500_000 << 4;

pub const DEFAULT_NUMERATOR: u8 = 4;

/// Identifies a stream in the sequencer's slot table. The generation keeps an
/// old identifier from addressing a newer stream in a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub(super) slot: usize,
    pub(super) generation: u32,
}

impl StreamId {
    /// Returns the slot the stream occupies.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
    /// The stream reached its end of track.
    Done,
}

/// A note that is sounding and will be released when its time runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveNote {
    /// The hardware channel the note was sent on.
    pub channel: u8,
    pub note: u8,
    /// Periods left before the note is released.
    pub remaining: u32,
}

/// The notes a stream is holding down.
#[derive(Debug, Clone, Default)]
pub struct NoteTable {
    entries: [Option<ActiveNote>; NOTE_SLOTS],
}

impl NoteTable {
    /// Adds a note to the first free entry. Returns false if the table is full.
    pub fn insert(&mut self, note: ActiveNote) -> bool {
        match self.entries.iter_mut().find(|entry| entry.is_none()) {
            Some(entry) => {
                *entry = Some(note);
                true
            }
            None => false,
        }
    }

    /// Iterates over the notes held.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveNote> {
        self.entries.iter().flatten()
    }

    /// Returns the number of notes held.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts one period down on every note and removes the ones that ran out.
    pub fn expire(&mut self) -> Vec<ActiveNote> {
        let mut expired = Vec::new();
        for entry in self.entries.iter_mut() {
            if let Some(note) = entry {
                note.remaining = note.remaining.saturating_sub(1);
                if note.remaining == 0 {
                    expired.push(*note);
                    *entry = None;
                }
            }
        }
        expired
    }

    /// Removes every note held on the given hardware channel.
    pub fn take_channel(&mut self, channel: u8) -> Vec<ActiveNote> {
        self.take_where(|note| note.channel == channel)
    }

    /// Removes every note.
    pub fn take_all(&mut self) -> Vec<ActiveNote> {
        self.take_where(|_| true)
    }

    fn take_where<F>(&mut self, predicate: F) -> Vec<ActiveNote>
    where
        F: Fn(&ActiveNote) -> bool,
    {
        let mut taken = Vec::new();
        for entry in self.entries.iter_mut() {
            if entry.as_ref().is_some_and(&predicate) {
                taken.extend(entry.take());
            }
        }
        taken
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoopSlot {
    /// Where the loop body starts.
    position: usize,
    /// Repeats left.
    counter: u8,
}

/// The nested for-loop stack.
#[derive(Debug, Clone, Default)]
pub struct LoopStack {
    slots: [Option<LoopSlot>; LOOP_SLOTS],
}

impl LoopStack {
    /// Opens a loop in the first free slot. Returns false, dropping the loop,
    /// when every slot is in use.
    pub fn push(&mut self, position: usize, counter: u8) -> bool {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(LoopSlot { position, counter });
                true
            }
            None => false,
        }
    }

    /// Closes an iteration of the innermost loop. Returns where to jump back
    /// to, or None when the loop is finished (or there is none).
    pub fn next(&mut self) -> Option<usize> {
        let slot = self.slots.iter_mut().rev().find(|slot| slot.is_some())?;
        if let Some(open) = slot.as_mut().filter(|open| open.counter > 0) {
            open.counter -= 1;
            return Some(open.position);
        }
        *slot = None;
        None
    }

    /// Returns the number of open loops.
    pub fn depth(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Measure and beat reached by a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub measure: u16,
    pub beat: u8,
}

/// Counts beats and measures as the stream's periods go by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatClock {
    fraction: u32,
    time_fraction: u32,
    time_per_beat: u32,
    numerator: u8,
    position: Position,
}

impl Default for BeatClock {
    fn default() -> Self {
        BeatClock {
            fraction: 0,
            time_fraction: DEFAULT_TIME_FRACTION,
            time_per_beat: DEFAULT_TIME_PER_BEAT,
            numerator: DEFAULT_NUMERATOR,
            position: Position::default(),
        }
    }
}

impl BeatClock {
    /// Accounts for one period.
    pub fn advance(&mut self) {
        let time_per_beat = self.time_per_beat.max(1);
        self.fraction = self.fraction.saturating_add(self.time_fraction);
        if self.fraction < time_per_beat {
            return;
        }

        // A short beat can roll over more than once in a period.
        let beats = self.fraction / time_per_beat;
        self.fraction %= time_per_beat;
        let numerator = u32::from(self.numerator.max(1));
        let beat = u32::from(self.position.beat).saturating_add(beats);
        self.position.beat = (beat % numerator) as u8;
        self.position.measure = self
            .position
            .measure
            .wrapping_add((beat / numerator) as u16);
    }

    /// Applies a time signature. The denominator is a power of two, so 2
    /// means quarter notes.
    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) {
        self.numerator = numerator;
        self.time_fraction = if denominator >= 2 {
            DEFAULT_TIME_FRACTION << (denominator - 2).min(14)
        } else {
            DEFAULT_TIME_FRACTION >> (2 - denominator)
        };
    }

    pub fn set_time_per_beat(&mut self, time_per_beat: u32) {
        self.time_per_beat = time_per_beat;
    }

    pub fn time_fraction(&self) -> u32 {
        self.time_fraction
    }

    pub fn time_per_beat(&self) -> u32 {
        self.time_per_beat
    }

    pub fn numerator(&self) -> u8 {
        self.numerator
    }

    pub fn position(&self) -> Position {
        self.position
    }
}

/// One sequence bound to a slot.
#[derive(Debug, Clone)]
pub struct MusicStream {
    pub(super) id: StreamId,
    /// The buffer the events live in. Shared with the driver that loaded it.
    pub(super) content: Content,
    pub(super) events: Range<usize>,
    pub(super) cursor: usize,
    pub(super) state: PlayState,
    /// Remove the stream once it stops playing.
    pub(super) clear_requested: bool,
    /// Periods until the next event is decoded.
    pub(super) delay: u32,
    /// Percent applied to every channel volume.
    pub(super) volume: Ramp,
    /// Percent of nominal speed.
    pub(super) tempo: Ramp,
    pub(super) tempo_error: u32,
    pub(super) beats: BeatClock,
    pub(super) loops: LoopStack,
    /// Logical to hardware channel.
    pub(super) channel_map: [u8; CHANNELS],
    /// What the stream last asked for on each logical channel.
    pub(super) shadows: [Controls; CHANNELS],
    /// Bit per logical channel holding a lock.
    pub(super) locked: u16,
    pub(super) notes: NoteTable,
}

impl MusicStream {
    pub(super) fn new(id: StreamId, content: Content, events: Range<usize>) -> MusicStream {
        let mut stream = MusicStream {
            id,
            content,
            cursor: events.start,
            events,
            state: PlayState::Stopped,
            clear_requested: false,
            delay: 0,
            volume: Ramp::new(100),
            tempo: Ramp::new(100),
            tempo_error: 0,
            beats: BeatClock::default(),
            loops: LoopStack::default(),
            channel_map: identity_map(),
            shadows: [Controls::default(); CHANNELS],
            locked: 0,
            notes: NoteTable::default(),
        };
        stream.init();
        stream
    }

    /// Rewinds the stream and returns every piece of playback state to its
    /// defaults. The slot, buffer and clear request are kept.
    pub(super) fn init(&mut self) {
        self.cursor = self.events.start;
        self.state = PlayState::Stopped;
        self.delay = 0;
        self.volume = Ramp::new(100);
        self.tempo = Ramp::new(100);
        self.tempo_error = 0;
        self.beats = BeatClock::default();
        self.loops = LoopStack::default();
        self.channel_map = identity_map();
        self.shadows = [Controls::default(); CHANNELS];
        self.locked = 0;
        self.notes = NoteTable::default();
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    /// Returns true if the stream holds a lock for the logical channel.
    pub(super) fn owns_lock(&self, logical: usize) -> bool {
        self.locked & (1 << logical) != 0
    }

    /// Returns the hardware channel a logical channel is mapped to.
    pub(super) fn hardware_channel(&self, logical: usize) -> usize {
        usize::from(self.channel_map[logical])
    }
}

fn identity_map() -> [u8; CHANNELS] {
    std::array::from_fn(|channel| channel as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(channel: u8, note: u8, remaining: u32) -> ActiveNote {
        ActiveNote {
            channel,
            note,
            remaining,
        }
    }

    #[test]
    fn test_note_table_expires_notes() {
        let mut table = NoteTable::default();
        assert!(table.insert(note(0, 60, 1)));
        assert!(table.insert(note(1, 62, 3)));
        assert_eq!(table.len(), 2);

        assert_eq!(table.expire(), vec![note(0, 60, 0)]);
        assert_eq!(table.len(), 1);
        assert!(table.expire().is_empty());
        assert_eq!(table.expire(), vec![note(1, 62, 0)]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_note_table_full() {
        let mut table = NoteTable::default();
        for i in 0..NOTE_SLOTS {
            assert!(table.insert(note(0, i as u8, 10)));
        }
        assert!(!table.insert(note(0, 100, 10)));
        assert_eq!(table.len(), NOTE_SLOTS);
    }

    #[test]
    fn test_note_table_take_channel() {
        let mut table = NoteTable::default();
        table.insert(note(2, 60, 10));
        table.insert(note(3, 61, 10));
        table.insert(note(2, 62, 10));

        let taken = table.take_channel(2);
        assert_eq!(taken.len(), 2);
        assert!(taken.iter().all(|note| note.channel == 2));
        assert_eq!(table.len(), 1);
        assert_eq!(table.take_all(), vec![note(3, 61, 10)]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_loop_stack_drops_fifth_push() {
        let mut loops = LoopStack::default();
        for i in 0..4 {
            assert!(loops.push(i * 10, 1));
        }
        assert!(!loops.push(40, 1));
        assert_eq!(loops.depth(), 4);

        // The innermost loop is the last one pushed, not the dropped one.
        assert_eq!(loops.next(), Some(30));
    }

    #[test]
    fn test_loop_stack_empty_next() {
        let mut loops = LoopStack::default();
        assert_eq!(loops.next(), None);
        assert_eq!(loops.depth(), 0);
    }

    #[test]
    fn test_loop_counter_one_repeats_once() {
        let mut loops = LoopStack::default();
        loops.push(7, 1);

        assert_eq!(loops.next(), Some(7));
        assert_eq!(loops.depth(), 1);
        assert_eq!(loops.next(), None);
        assert_eq!(loops.depth(), 0);
    }

    #[test]
    fn test_nested_loops() {
        let mut loops = LoopStack::default();
        loops.push(0, 1);
        loops.push(5, 0);

        assert_eq!(loops.next(), None);
        assert_eq!(loops.next(), Some(0));
        assert_eq!(loops.next(), None);
        assert_eq!(loops.depth(), 0);
    }

    #[test]
    fn test_beat_clock_default_tempo() {
        let mut clock = BeatClock::default();
        // Just over 60 periods of 1/120s make one beat at 120 BPM.
        for _ in 0..60 {
            clock.advance();
        }
        assert_eq!(clock.position(), Position::default());
        clock.advance();
        assert_eq!(clock.position(), Position { measure: 0, beat: 1 });

        for _ in 0..180 {
            clock.advance();
        }
        assert_eq!(clock.position(), Position { measure: 1, beat: 0 });
    }

    #[test]
    fn test_beat_clock_short_beats() {
        let mut clock = BeatClock::default();
        clock.set_time_per_beat(40_000);

        clock.advance();
        assert_eq!(clock.position(), Position { measure: 0, beat: 3 });
        clock.advance();
        assert_eq!(clock.position(), Position { measure: 1, beat: 2 });

        // A zero tempo counts every fraction unit as a beat.
        let mut clock = BeatClock::default();
        clock.set_time_per_beat(0);
        clock.advance();
        assert_eq!(
            clock.position(),
            Position {
                measure: 33_333,
                beat: 1
            }
        );
    }

    #[test]
    fn test_time_signature() {
        let mut clock = BeatClock::default();
        clock.set_time_signature(3, 3);
        assert_eq!(clock.numerator(), 3);
        assert_eq!(clock.time_fraction(), 266_666);

        clock.set_time_signature(2, 1);
        assert_eq!(clock.time_fraction(), 66_666);

        clock.set_time_signature(4, 2);
        assert_eq!(clock.time_fraction(), DEFAULT_TIME_FRACTION);
    }
}
