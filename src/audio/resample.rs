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
//! Sample rate conversion for voice data.

use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use thiserror::Error;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("unable to resample from {0} Hz to {1} Hz")]
    Failed(u32, u32),
}

/// Converts 8-bit unsigned samples to floats in [-1, 1).
pub fn to_float(samples: &[u8]) -> Vec<f32> {
    samples
        .iter()
        .map(|sample| (f32::from(*sample) - 128.0) / 128.0)
        .collect()
}

/// Resamples a mono block from one rate to another. The resampler's delay is
/// trimmed so the output lines up with the input.
pub fn resample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, ResampleError> {
    let failed = || ResampleError::Failed(source_rate, target_rate);
    if source_rate == 0 || target_rate == 0 {
        return Err(failed());
    }
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(target_rate) / f64::from(source_rate);
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, INPUT_BLOCK_SIZE, 1)
        .map_err(|_e| failed())?;
    let mut scratch = resampler.output_buffer_allocate(true);

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay);

    let mut position = 0;
    while samples.len() - position >= resampler.input_frames_next() {
        let input: [&[f32]; 1] = [&samples[position..]];
        let (consumed, produced) = resampler
            .process_into_buffer(&input[..], &mut scratch, None)
            .map_err(|_e| failed())?;
        output.extend_from_slice(&scratch[0][..produced]);
        position += consumed;
    }

    if position < samples.len() {
        let input: [&[f32]; 1] = [&samples[position..]];
        let (_, produced) = resampler
            .process_partial_into_buffer(Some(&input[..]), &mut scratch, None)
            .map_err(|_e| failed())?;
        output.extend_from_slice(&scratch[0][..produced]);
    }

    // Flush the filter tail.
    while output.len() < expected + delay {
        let (_, produced) = resampler
            .process_partial_into_buffer(None::<&[&[f32]]>, &mut scratch, None)
            .map_err(|_e| failed())?;
        if produced == 0 {
            break;
        }
        output.extend_from_slice(&scratch[0][..produced]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_float() {
        assert_eq!(to_float(&[0, 128, 192]), vec![-1.0, 0.0, 0.5]);
    }

    #[test]
    fn test_same_rate_passes_through() {
        let samples = vec![0.25, -0.25, 0.5];
        assert_eq!(resample(&samples, 22050, 22050).unwrap(), samples);
        assert!(resample(&[], 4310, 48000).unwrap().is_empty());
    }

    #[test]
    fn test_zero_rate_fails() {
        assert!(resample(&[0.0], 0, 48000).is_err());
        assert!(resample(&[0.0], 4310, 0).is_err());
    }

    #[test]
    fn test_upsample_voice_block() {
        let samples = vec![0.5; 2000];
        let output = resample(&samples, 4310, 44100).unwrap();

        let expected = (2000.0 * 44100.0 / 4310.0_f64).round() as usize;
        assert_eq!(output.len(), expected);

        // The filter settles on the input level away from the edges.
        let middle = output[expected / 2];
        assert!((middle - 0.5).abs() < 0.05, "middle sample was {}", middle);
    }

    #[test]
    fn test_downsample_keeps_length() {
        let samples = vec![0.0; 48000];
        let output = resample(&samples, 48000, 22050).unwrap();
        assert_eq!(output.len(), 22050);
        assert!(output.iter().all(|sample| sample.abs() < 1e-6));
    }
}
