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

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decoded audio held in memory. The data is shared, so clones are cheap and
/// any number of playbacks can read the same buffer.
#[derive(Clone)]
pub struct SampleBuffer {
    /// Interleaved samples.
    data: Arc<[f32]>,
    channel_count: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a buffer from interleaved samples.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> SampleBuffer {
        SampleBuffer {
            data: data.into(),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// Creates a single-channel buffer.
    pub fn mono(data: Vec<f32>, sample_rate: u32) -> SampleBuffer {
        SampleBuffer::new(data, 1, sample_rate)
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The interleaved sample data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / usize::from(self.channel_count)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate.max(1)))
    }

    /// The left and right values of a frame. Mono buffers give the same value on
    /// both sides and anything past two channels is ignored.
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let channels = usize::from(self.channel_count);
        let base = index * channels;
        match self.data.get(base..base + channels) {
            Some([mono]) => (*mono, *mono),
            Some([left, right, ..]) => (*left, *right),
            _ => (0.0, 0.0),
        }
    }

    /// The largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.data.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("frames", &self.frames())
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_and_duration() {
        let buffer = SampleBuffer::new(vec![0.0; 88200], 2, 44100);
        assert_eq!(buffer.frames(), 44100);
        assert_eq!(buffer.duration(), Duration::from_secs(1));
        assert_eq!(buffer.memory_size(), 88200 * 4);
    }

    #[test]
    fn test_frame_access() {
        let mono = SampleBuffer::mono(vec![0.5, -0.5], 44100);
        assert_eq!(mono.frame(1), (-0.5, -0.5));
        assert_eq!(mono.frame(2), (0.0, 0.0));

        let stereo = SampleBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 2, 44100);
        assert_eq!(stereo.frame(1), (0.3, 0.4));
    }

    #[test]
    fn test_peak() {
        let buffer = SampleBuffer::mono(vec![0.25, -0.75, 0.5], 48000);
        assert_eq!(buffer.peak(), 0.75);
    }
}
