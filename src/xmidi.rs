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

//! Locates event data inside XMIDI containers.
//!
//! An XMIDI file is either a single `FORM`/`XMID` chunk or a `CAT `/`XMID`
//! collection of them, optionally preceded by a `FORM`/`XDIR` directory. Each
//! `FORM`/`XMID` holds an `EVNT` chunk with the playable event stream.

use std::ops::Range;

const CAT: &[u8; 4] = b"CAT ";
const FORM: &[u8; 4] = b"FORM";
const XMID: &[u8; 4] = b"XMID";
const EVNT: &[u8; 4] = b"EVNT";

/// Size of a chunk header: 4 byte tag plus 4 byte big-endian length.
const CHUNK_HEADER: usize = 8;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum XmidiError {
    #[error("not an XMIDI container (unexpected chunk {0:?} at offset {1})")]
    NotXmidi(String, usize),

    #[error("container truncated at offset {0}")]
    Truncated(usize),

    #[error("track {0} not found in container")]
    TrackNotFound(u16),

    #[error("track {0} has no EVNT chunk")]
    NoEvents(u16),
}

/// The location of one playable track within a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// The track index within the container.
    pub index: u16,
    /// Byte range of the event stream, excluding the EVNT chunk header.
    pub events: Range<usize>,
}

fn chunk_at(data: &[u8], offset: usize) -> Result<(&[u8], usize), XmidiError> {
    let header = data
        .get(offset..offset + CHUNK_HEADER)
        .ok_or(XmidiError::Truncated(offset))?;
    let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    Ok((&header[0..4], size))
}

fn form_type_at(data: &[u8], offset: usize) -> Result<&[u8], XmidiError> {
    data.get(offset + CHUNK_HEADER..offset + CHUNK_HEADER + 4)
        .ok_or(XmidiError::Truncated(offset + CHUNK_HEADER))
}

/// Chunks are padded to an even length.
fn padded(size: usize) -> usize {
    size + (size & 1)
}

/// Finds the outermost XMID container, skipping any leading directory form.
/// Returns whether it is a collection, its offset and its length.
fn find_container(data: &[u8]) -> Result<(bool, usize, usize), XmidiError> {
    let mut offset = 0;
    loop {
        let (tag, size) = chunk_at(data, offset)?;
        if tag != CAT && tag != FORM {
            return Err(XmidiError::NotXmidi(
                String::from_utf8_lossy(tag).into_owned(),
                offset,
            ));
        }
        if form_type_at(data, offset)? == XMID {
            return Ok((tag == CAT, offset, size));
        }
        offset += CHUNK_HEADER + padded(size);
    }
}

/// Visits every XMID form in the container, in order, until the visitor
/// returns true. Returns the offset of the form the visitor stopped on.
fn visit_forms<F>(data: &[u8], mut visitor: F) -> Result<Option<usize>, XmidiError>
where
    F: FnMut(usize) -> bool,
{
    let (is_collection, offset, size) = find_container(data)?;
    if !is_collection {
        return Ok(visitor(offset).then_some(offset));
    }

    let end = (offset + CHUNK_HEADER + size).min(data.len());
    let mut cursor = offset + CHUNK_HEADER + 4;
    while cursor + CHUNK_HEADER <= end {
        let (tag, size) = chunk_at(data, cursor)?;
        if tag == FORM && form_type_at(data, cursor)? == XMID && visitor(cursor) {
            return Ok(Some(cursor));
        }
        cursor += CHUNK_HEADER + padded(size);
    }
    Ok(None)
}

/// Returns the number of XMID tracks in the container.
pub fn count_tracks(data: &[u8]) -> Result<u16, XmidiError> {
    let mut count: u16 = 0;
    visit_forms(data, |_| {
        count = count.saturating_add(1);
        false
    })?;
    Ok(count)
}

/// Locates the event stream of the given track.
pub fn find_track(data: &[u8], index: u16) -> Result<Track, XmidiError> {
    let mut remaining = index;
    let form = visit_forms(data, |_| {
        if remaining == 0 {
            return true;
        }
        remaining -= 1;
        false
    })?
    .ok_or(XmidiError::TrackNotFound(index))?;

    let (_, form_size) = chunk_at(data, form)?;
    let form_end = (form + CHUNK_HEADER + form_size).min(data.len());
    let mut cursor = form + CHUNK_HEADER + 4;
    while cursor + CHUNK_HEADER <= form_end {
        let (tag, size) = chunk_at(data, cursor)?;
        if tag == EVNT {
            let start = cursor + CHUNK_HEADER;
            let end = (start + size).min(data.len());
            return Ok(Track {
                index,
                events: start..end,
            });
        }
        cursor += CHUNK_HEADER + padded(size);
    }

    Err(XmidiError::NoEvents(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::xmidi::{chunk, collection, single};

    #[test]
    fn test_single_form() {
        let data = single(&[0x00, 0xFF, 0x2F, 0x00]);
        assert_eq!(count_tracks(&data), Ok(1));

        let track = find_track(&data, 0).unwrap();
        assert_eq!(&data[track.events.clone()], &[0x00, 0xFF, 0x2F, 0x00]);
        assert_eq!(find_track(&data, 1), Err(XmidiError::TrackNotFound(1)));
    }

    #[test]
    fn test_collection_selects_nth_track() {
        let data = collection(&[&[0x01], &[0x02, 0x03], &[0x04, 0x05, 0x06]]);
        assert_eq!(count_tracks(&data), Ok(3));

        let track = find_track(&data, 1).unwrap();
        assert_eq!(&data[track.events], &[0x02, 0x03]);

        let track = find_track(&data, 2).unwrap();
        assert_eq!(&data[track.events], &[0x04, 0x05, 0x06]);

        assert_eq!(find_track(&data, 3), Err(XmidiError::TrackNotFound(3)));
    }

    #[test]
    fn test_directory_form_is_skipped() {
        let mut data = Vec::new();
        data.extend_from_slice(b"FORM");
        data.extend_from_slice(&14u32.to_be_bytes());
        data.extend_from_slice(b"XDIRINFO");
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&collection(&[&[0x07]]));

        let track = find_track(&data, 0).unwrap();
        assert_eq!(&data[track.events], &[0x07]);
    }

    #[test]
    fn test_odd_chunks_are_padded() {
        let data = collection(&[&[0x01, 0x02, 0x03], &[0x09]]);
        let track = find_track(&data, 1).unwrap();
        assert_eq!(&data[track.events], &[0x09]);
    }

    #[test]
    fn test_not_xmidi() {
        assert!(matches!(
            find_track(b"RIFF\0\0\0\x04WAVE", 0),
            Err(XmidiError::NotXmidi(_, 0))
        ));
        assert_eq!(find_track(b"FORM", 0), Err(XmidiError::Truncated(0)));
    }

    #[test]
    fn test_form_without_events() {
        let mut data = Vec::new();
        let body = chunk(b"TIMB", &[0x00, 0x00]);
        data.extend_from_slice(b"FORM");
        data.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        data.extend_from_slice(XMID);
        data.extend_from_slice(&body);
        assert_eq!(find_track(&data, 0), Err(XmidiError::NoEvents(0)));
    }
}
