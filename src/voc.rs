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

//! Creative Voice File decoding. Only the first block is honoured and it must
//! be a sound data block.

use std::{fmt, ops::Range};

use tracing::warn;

/// Offset of the little-endian header length field.
const HEADER_LENGTH_OFFSET: usize = 20;

/// Block type for sound data.
const BLOCK_SOUND_DATA: u8 = 1;

/// Size of the sound data sub-header (frequency divisor and codec).
const SOUND_DATA_HEADER: usize = 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VocError {
    #[error("voice data truncated at offset {0}")]
    Truncated(usize),

    #[error("unsupported voice block type {0}")]
    UnsupportedBlock(u8),
}

/// The sample codec of a sound data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// 8-bit unsigned PCM.
    Unsigned8,
    /// Anything else. Played as if it were 8-bit unsigned.
    Other(u8),
}

impl From<u8> for Codec {
    fn from(value: u8) -> Self {
        match value {
            0 => Codec::Unsigned8,
            other => Codec::Other(other),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Unsigned8 => write!(f, "8-bit unsigned PCM"),
            Codec::Other(id) => write!(f, "codec {}", id),
        }
    }
}

/// A decoded sound data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundBlock {
    /// The sample rate derived from the frequency divisor.
    pub sample_rate: u32,
    /// The sample codec.
    pub codec: Codec,
    /// Byte range of the samples within the voice data.
    pub samples: Range<usize>,
}

impl SoundBlock {
    /// Returns the number of samples in the block.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// Converts a VOC frequency divisor into a sample rate in Hz.
pub fn sample_rate(divisor: u8) -> u32 {
    1_000_000 / (256 - u32::from(divisor))
}

/// Decodes the first block of the given voice data.
pub fn decode(data: &[u8]) -> Result<SoundBlock, VocError> {
    let header = data
        .get(HEADER_LENGTH_OFFSET..HEADER_LENGTH_OFFSET + 2)
        .ok_or(VocError::Truncated(HEADER_LENGTH_OFFSET))?;
    let start = usize::from(u16::from_le_bytes([header[0], header[1]]));

    let block = data.get(start..start + 4).ok_or(VocError::Truncated(start))?;
    if block[0] != BLOCK_SOUND_DATA {
        return Err(VocError::UnsupportedBlock(block[0]));
    }
    let length = (usize::from(block[1])
        | usize::from(block[2]) << 8
        | usize::from(block[3]) << 16)
        .saturating_sub(SOUND_DATA_HEADER);

    let sub_header = data
        .get(start + 4..start + 4 + SOUND_DATA_HEADER)
        .ok_or(VocError::Truncated(start + 4))?;
    let codec = Codec::from(sub_header[1]);
    if codec != Codec::Unsigned8 {
        warn!(codec = %codec, "Unsupported voice codec, playing as 8-bit PCM.");
    }

    let first = start + 4 + SOUND_DATA_HEADER;
    let last = (first + length).min(data.len());
    if last < first + length {
        warn!(
            declared = length,
            available = last - first,
            "Voice block is shorter than declared."
        );
    }

    Ok(SoundBlock {
        sample_rate: sample_rate(sub_header[0]),
        codec,
        samples: first..last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::voc::voice_file;

    #[test]
    fn test_decode_rate() {
        let data = voice_file(1, 24, 0, &[0x80; 16]);
        let block = decode(&data).unwrap();

        assert_eq!(block.sample_rate, 4310);
        assert_eq!(block.codec, Codec::Unsigned8);
        assert_eq!(block.sample_count(), 16);
        assert_eq!(block.samples.start, 26 + 6);
    }

    #[test]
    fn test_common_rates() {
        assert_eq!(sample_rate(0xA5), 10989);
        assert_eq!(sample_rate(0x83), 8000);
    }

    #[test]
    fn test_unsupported_block() {
        let data = voice_file(2, 24, 0, &[0x80; 4]);
        assert_eq!(decode(&data), Err(VocError::UnsupportedBlock(2)));
    }

    #[test]
    fn test_other_codec_is_played_anyway() {
        let data = voice_file(1, 0xA5, 4, &[0x80; 4]);
        let block = decode(&data).unwrap();
        assert_eq!(block.codec, Codec::Other(4));
        assert_eq!(block.sample_count(), 4);
    }

    #[test]
    fn test_truncated() {
        assert_eq!(decode(&[0u8; 10]), Err(VocError::Truncated(20)));

        let mut data = voice_file(1, 24, 0, &[0x80; 8]);
        data.truncate(31);
        assert_eq!(decode(&data), Err(VocError::Truncated(30)));
    }

    #[test]
    fn test_short_block_is_clamped() {
        let mut data = voice_file(1, 24, 0, &[0x80; 8]);
        data.truncate(data.len() - 4);
        let block = decode(&data).unwrap();
        assert_eq!(block.sample_count(), 5);
    }
}
