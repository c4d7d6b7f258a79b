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

/// Builds a voice file with a single block of the given type.
pub fn voice_file(block_type: u8, divisor: u8, codec: u8, samples: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"Creative Voice File\x1a");
    data.extend_from_slice(&26u16.to_le_bytes());
    data.extend_from_slice(&0x010Au16.to_le_bytes());
    data.extend_from_slice(&0x1129u16.to_le_bytes());

    let length = (samples.len() + 2) as u32;
    data.push(block_type);
    data.extend_from_slice(&length.to_le_bytes()[0..3]);
    data.push(divisor);
    data.push(codec);
    data.extend_from_slice(samples);
    data.push(0);
    data
}
