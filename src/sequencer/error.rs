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
use super::stream::StreamId;
use crate::xmidi::XmidiError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SequencerError {
    #[error(transparent)]
    Xmidi(#[from] XmidiError),

    #[error("no stream {0} in the sequencer")]
    UnknownStream(StreamId),

    #[error("stream {stream} uses unsupported controller {controller} at offset {offset}")]
    UnsupportedController {
        stream: StreamId,
        controller: u8,
        offset: usize,
    },
}
