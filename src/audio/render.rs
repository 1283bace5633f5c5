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

//! The software render graph.
//!
//! Each voice has a bus. Playbacks for a voice are summed into its bus starting
//! at the exact frame their start time falls on, the bus runs through the
//! voice's route, and all buses are summed and run through the master route.

use std::collections::HashMap;

use tracing::warn;

use super::dsp::{self, Processor, StereoFrame};
use super::{NodeId, NodeSpec, Playback, PlaybackId};
use crate::pattern::DrumVoice;

/// A change to the graph. Hosts that render on another thread send these
/// through a channel.
pub enum RenderCommand {
    CreateNode(NodeId, NodeSpec),
    UpdateNode(NodeId, NodeSpec),
    VoiceRoute(DrumVoice, Vec<NodeId>),
    MasterRoute(Vec<NodeId>),
    Schedule(PlaybackId, Playback),
    Cancel(PlaybackId),
}

struct ActivePlayback {
    id: PlaybackId,
    playback: Playback,
    /// The output frame the playback starts on.
    start_frame: u64,
    /// Read position in buffer frames.
    position: f64,
    /// Buffer frames advanced per output frame.
    step: f64,
}

impl ActivePlayback {
    /// Mixes the playback into a bus that starts at `block_start`. Returns
    /// true once the buffer is exhausted.
    fn render(&mut self, bus: &mut [StereoFrame], block_start: u64) -> bool {
        let block_end = block_start + bus.len() as u64;
        if self.start_frame >= block_end {
            return false;
        }

        let buffer = &self.playback.buffer;
        let frames = buffer.frames();
        let pan = self.playback.pan.clamp(-1.0, 1.0);
        let left_gain = self.playback.gain * (1.0 - pan).min(1.0);
        let right_gain = self.playback.gain * (1.0 + pan).min(1.0);

        let offset = self.start_frame.saturating_sub(block_start) as usize;
        for out in bus[offset..].iter_mut() {
            let index = self.position as usize;
            if index >= frames {
                return true;
            }
            let fraction = (self.position - index as f64) as f32;
            let (l0, r0) = buffer.frame(index);
            let (l1, r1) = if index + 1 < frames {
                buffer.frame(index + 1)
            } else {
                (0.0, 0.0)
            };

            out.left += (l0 + (l1 - l0) * fraction) * left_gain;
            out.right += (r0 + (r1 - r0) * fraction) * right_gain;
            self.position += self.step;
        }

        self.position as usize >= frames
    }
}

pub struct Renderer {
    sample_rate: u32,
    /// Frames rendered so far. This is the audio clock.
    frames_rendered: u64,
    nodes: HashMap<NodeId, Box<dyn Processor>>,
    voice_routes: [Vec<NodeId>; DrumVoice::COUNT],
    master_route: Vec<NodeId>,
    playbacks: Vec<ActivePlayback>,
    bus: Vec<StereoFrame>,
    mix: Vec<StereoFrame>,
    /// Playbacks that ended during the current block.
    finished: Vec<PlaybackId>,
}

impl Renderer {
    pub fn new(sample_rate: u32) -> Renderer {
        Renderer {
            sample_rate,
            frames_rendered: 0,
            nodes: HashMap::new(),
            voice_routes: Default::default(),
            master_route: Vec::new(),
            playbacks: Vec::new(),
            bus: Vec::new(),
            mix: Vec::new(),
            finished: Vec::new(),
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Number of playbacks scheduled or sounding.
    pub fn active_playbacks(&self) -> usize {
        self.playbacks.len()
    }

    pub fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::CreateNode(id, spec) => {
                self.nodes.insert(id, dsp::build(&spec, self.sample_rate));
            }
            RenderCommand::UpdateNode(id, spec) => match self.nodes.get_mut(&id) {
                Some(node) => {
                    if !node.update(&spec) {
                        *node = dsp::build(&spec, self.sample_rate);
                    }
                }
                None => warn!(node = %id, "Update for unknown node"),
            },
            RenderCommand::VoiceRoute(voice, route) => {
                self.voice_routes[voice.index()] = route;
            }
            RenderCommand::MasterRoute(route) => {
                self.master_route = route;
            }
            RenderCommand::Schedule(id, playback) => {
                let start_frame = (playback.start.max(0.0) * f64::from(self.sample_rate)).round();
                let step = playback.rate.max(0.0)
                    * f64::from(playback.buffer.sample_rate())
                    / f64::from(self.sample_rate);
                self.playbacks.push(ActivePlayback {
                    id,
                    playback,
                    start_frame: start_frame as u64,
                    position: 0.0,
                    step,
                });
            }
            RenderCommand::Cancel(id) => {
                self.playbacks.retain(|active| active.id != id);
            }
        }
    }

    /// Renders the next block of stereo frames into `output`.
    pub fn render(&mut self, output: &mut [StereoFrame]) {
        let frames = output.len();
        let block_start = self.frames_rendered;
        output.fill(StereoFrame::default());
        if self.bus.len() < frames {
            self.bus.resize(frames, StereoFrame::default());
        }

        self.finished.clear();
        for voice in DrumVoice::ALL {
            let bus = &mut self.bus[..frames];
            bus.fill(StereoFrame::default());

            for active in self
                .playbacks
                .iter_mut()
                .filter(|active| active.playback.voice == voice)
            {
                if active.render(bus, block_start) {
                    self.finished.push(active.id);
                }
            }

            for id in &self.voice_routes[voice.index()] {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.process(bus);
                }
            }

            for (out, frame) in output.iter_mut().zip(bus.iter()) {
                out.left += frame.left;
                out.right += frame.right;
            }
        }

        for id in &self.master_route {
            if let Some(node) = self.nodes.get_mut(id) {
                node.process(output);
            }
        }

        if !self.finished.is_empty() {
            let finished = &self.finished;
            self.playbacks.retain(|active| !finished.contains(&active.id));
            self.finished.clear();
        }
        self.frames_rendered += frames as u64;
    }

    /// Renders interleaved samples for an output with any channel count. Left
    /// and right go to the first two channels; a mono output gets their average.
    pub fn render_interleaved(&mut self, output: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = output.len() / channels;

        let mut mix = std::mem::take(&mut self.mix);
        if mix.len() < frames {
            mix.resize(frames, StereoFrame::default());
        }
        self.render(&mut mix[..frames]);

        for (chunk, frame) in output.chunks_mut(channels).zip(mix.iter()) {
            if channels == 1 {
                chunk[0] = (frame.left + frame.right) * 0.5;
                continue;
            }
            chunk.fill(0.0);
            chunk[0] = frame.left;
            chunk[1] = frame.right;
        }
        self.mix = mix;
    }
}
