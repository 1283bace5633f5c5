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

//! A host that renders only when asked. Its clock is the number of frames
//! rendered, so driving it faster than real time is how patterns get bounced to
//! disk.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::render::{RenderCommand, Renderer};
use super::{Host, HostError, NodeId, NodeSpec, Playback, PlaybackId};
use crate::pattern::DrumVoice;

/// Output channels produced by [`OfflineHost::render`].
pub const CHANNELS: u16 = 2;

pub struct OfflineHost {
    name: String,
    sample_rate: u32,
    renderer: Mutex<Renderer>,
    next_id: AtomicU64,
}

impl OfflineHost {
    pub fn new(name: &str, sample_rate: u32) -> OfflineHost {
        OfflineHost {
            name: name.to_string(),
            sample_rate,
            renderer: Mutex::new(Renderer::new(sample_rate)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Renders the next `frames` frames as interleaved stereo and advances the
    /// clock by the same amount.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * usize::from(CHANNELS)];
        self.renderer
            .lock()
            .render_interleaved(&mut output, usize::from(CHANNELS));
        output
    }

    /// Playbacks scheduled or still sounding.
    pub fn active_playbacks(&self) -> usize {
        self.renderer.lock().active_playbacks()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Host for OfflineHost {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.renderer.lock().frames_rendered() as f64 / f64::from(self.sample_rate)
    }

    fn create_node(&self, spec: NodeSpec) -> Result<NodeId, HostError> {
        let id = NodeId(self.next_id());
        self.renderer
            .lock()
            .apply(RenderCommand::CreateNode(id, spec));
        Ok(id)
    }

    fn update_node(&self, id: NodeId, spec: NodeSpec) -> Result<(), HostError> {
        if id.0 >= self.next_id.load(Ordering::Relaxed) {
            return Err(HostError::UnknownNode(id));
        }
        self.renderer
            .lock()
            .apply(RenderCommand::UpdateNode(id, spec));
        Ok(())
    }

    fn set_voice_route(&self, voice: DrumVoice, route: Vec<NodeId>) -> Result<(), HostError> {
        self.renderer
            .lock()
            .apply(RenderCommand::VoiceRoute(voice, route));
        Ok(())
    }

    fn set_master_route(&self, route: Vec<NodeId>) -> Result<(), HostError> {
        self.renderer.lock().apply(RenderCommand::MasterRoute(route));
        Ok(())
    }

    fn schedule(&self, playback: Playback) -> Result<PlaybackId, HostError> {
        let id = PlaybackId(self.next_id());
        self.renderer
            .lock()
            .apply(RenderCommand::Schedule(id, playback));
        Ok(id)
    }

    fn cancel(&self, id: PlaybackId) {
        self.renderer.lock().apply(RenderCommand::Cancel(id));
    }
}

impl fmt::Display for OfflineHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Offline)", self.name)
    }
}
