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

//! Sample rate conversion of whole in-memory buffers.

use rubato::{
    SincFixedIn, SincInterpolationParameters, SincInterpolationType, VecResampler, WindowFunction,
};

use super::{HostError, SampleBuffer};

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

fn sinc_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Converts a buffer to the target rate with a band-limited sinc resampler.
/// The output is aligned with the input, so a hit's transient stays where it
/// was, and holds `ceil(frames * ratio)` frames.
pub fn resample(buffer: &SampleBuffer, target_rate: u32) -> Result<SampleBuffer, HostError> {
    let source_rate = buffer.sample_rate();
    if target_rate == source_rate || buffer.frames() == 0 {
        return Ok(buffer.clone());
    }

    let channels = usize::from(buffer.channel_count());
    let ratio = f64::from(target_rate) / f64::from(source_rate);
    let failed = || HostError::Resample(source_rate, target_rate);

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, sinc_params(), INPUT_BLOCK_SIZE, channels)
            .map_err(|_| failed())?;

    let input = deinterleave(buffer.data(), channels);
    let frames = buffer.frames();
    let expected = (frames as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let wanted = expected + delay;

    let mut scratch = resampler.output_buffer_allocate(true);
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];
    let mut position = 0;

    while output[0].len() < wanted {
        let needed = resampler.input_frames_next();
        let remaining = frames - position;
        let (consumed, produced) = if remaining >= needed {
            let block = slice_block(&input, position, needed);
            resampler
                .process_into_buffer(&block, &mut scratch, None)
                .map_err(|_| failed())?
        } else if remaining > 0 {
            let block = slice_block(&input, position, remaining);
            resampler
                .process_partial_into_buffer(Some(block.as_slice()), &mut scratch, None)
                .map_err(|_| failed())?
        } else {
            // Flush the filter tail with silence.
            resampler
                .process_partial_into_buffer(None, &mut scratch, None)
                .map_err(|_| failed())?
        };

        position += consumed.min(remaining);
        for (channel, out) in output.iter_mut().zip(&scratch) {
            let take = produced.min(wanted - channel.len());
            channel.extend_from_slice(&out[..take]);
        }
        if produced == 0 && remaining == 0 {
            break;
        }
    }

    let mut interleaved = Vec::with_capacity(expected * channels);
    for frame in delay..wanted.min(output[0].len()) {
        for channel in &output {
            interleaved.push(channel[frame]);
        }
    }
    Ok(SampleBuffer::new(interleaved, buffer.channel_count(), target_rate))
}

fn deinterleave(data: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(data.len() / channels); channels];
    for frame in data.chunks_exact(channels) {
        for (channel, sample) in planar.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    planar
}

fn slice_block(input: &[Vec<f32>], start: usize, len: usize) -> Vec<Vec<f32>> {
    input
        .iter()
        .map(|channel| channel[start..start + len].to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    fn sine(frequency: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_same_rate_is_untouched() {
        let buffer = SampleBuffer::mono(vec![0.25; 10], 48000);
        let resampled = resample(&buffer, 48000).unwrap();
        assert_eq!(resampled.frames(), 10);
        assert_eq!(resampled.data(), buffer.data());
    }

    #[test]
    fn test_length_follows_ratio() {
        let buffer = SampleBuffer::new(vec![0.0; 3000 * 2], 2, 22050);
        let resampled = resample(&buffer, 44100).unwrap();
        assert_eq!(resampled.sample_rate(), 44100);
        assert_eq!(resampled.channel_count(), 2);
        assert_eq!(resampled.frames(), 6000);

        let buffer = SampleBuffer::mono(vec![0.0; 9600], 96000);
        assert_eq!(resample(&buffer, 44100).unwrap().frames(), 4410);
    }

    #[test]
    fn test_transient_stays_aligned() {
        let mut data = vec![0.0; 4800];
        data[1000] = 1.0;
        let buffer = SampleBuffer::mono(data, 48000);
        let resampled = resample(&buffer, 96000).unwrap();

        let (peak_frame, _) = resampled
            .data()
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |(best, peak), (i, s)| {
                if s.abs() > peak {
                    (i, s.abs())
                } else {
                    (best, peak)
                }
            });
        assert!(
            (1996..=2004).contains(&peak_frame),
            "transient moved to {}",
            peak_frame
        );
    }

    #[test]
    fn test_passband_is_kept() {
        let buffer = SampleBuffer::mono(sine(1000.0, 48000, 48000), 48000);
        let resampled = resample(&buffer, 44100).unwrap();
        let middle = &resampled.data()[4410..39690];
        assert!((rms(middle) - 0.5f32.sqrt()).abs() < 0.02);
    }

    #[test]
    fn test_content_above_nyquist_is_removed() {
        // 30 kHz can't exist at 44.1 kHz; it must not fold back into the audible band.
        let buffer = SampleBuffer::mono(sine(30000.0, 96000, 96000), 96000);
        let resampled = resample(&buffer, 44100).unwrap();
        let middle = &resampled.data()[4410..39690];
        assert!(rms(middle) < 0.01, "aliased energy {}", rms(middle));
    }
}
