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
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{Host, HostError, NodeId, NodeSpec, Playback, PlaybackId, SampleBuffer};
use crate::pattern::DrumVoice;

/// A mock host. Doesn't play anything; it records every request and its clock
/// only moves when told to.
pub struct MockHost {
    name: String,
    sample_rate: u32,
    /// The audio clock in seconds.
    clock: Mutex<f64>,
    next_id: AtomicU64,
    nodes: Mutex<HashMap<NodeId, NodeSpec>>,
    voice_routes: Mutex<HashMap<DrumVoice, Vec<NodeId>>>,
    master_route: Mutex<Vec<NodeId>>,
    scheduled: Mutex<Vec<(PlaybackId, Playback)>>,
    cancelled: Mutex<Vec<PlaybackId>>,
    fail_decode: AtomicBool,
}

impl MockHost {
    pub fn new(name: &str, sample_rate: u32) -> MockHost {
        MockHost {
            name: name.to_string(),
            sample_rate,
            clock: Mutex::new(0.0),
            next_id: AtomicU64::new(1),
            nodes: Mutex::new(HashMap::new()),
            voice_routes: Mutex::new(HashMap::new()),
            master_route: Mutex::new(Vec::new()),
            scheduled: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_decode: AtomicBool::new(false),
        }
    }

    /// Moves the audio clock forward.
    pub fn advance(&self, seconds: f64) {
        *self.clock.lock() += seconds;
    }

    /// Sets the audio clock.
    pub fn set_time(&self, seconds: f64) {
        *self.clock.lock() = seconds;
    }

    /// Makes every decode fail.
    pub fn set_fail_decode(&self, fail: bool) {
        self.fail_decode.store(fail, Ordering::Relaxed);
    }

    /// Every playback scheduled so far, in order.
    pub fn scheduled(&self) -> Vec<Playback> {
        self.scheduled
            .lock()
            .iter()
            .map(|(_, playback)| playback.clone())
            .collect()
    }

    /// Scheduled playbacks for one voice.
    pub fn scheduled_for(&self, voice: DrumVoice) -> Vec<Playback> {
        self.scheduled()
            .into_iter()
            .filter(|playback| playback.voice == voice)
            .collect()
    }

    /// Scheduled playbacks that have not been cancelled.
    pub fn live(&self) -> Vec<Playback> {
        let cancelled = self.cancelled.lock();
        self.scheduled
            .lock()
            .iter()
            .filter(|(id, _)| !cancelled.contains(id))
            .map(|(_, playback)| playback.clone())
            .collect()
    }

    pub fn cancelled(&self) -> Vec<PlaybackId> {
        self.cancelled.lock().clone()
    }

    pub fn clear_scheduled(&self) {
        self.scheduled.lock().clear();
        self.cancelled.lock().clear();
    }

    pub fn node(&self, id: NodeId) -> Option<NodeSpec> {
        self.nodes.lock().get(&id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn voice_route(&self, voice: DrumVoice) -> Vec<NodeId> {
        self.voice_routes
            .lock()
            .get(&voice)
            .cloned()
            .unwrap_or_default()
    }

    pub fn master_route(&self) -> Vec<NodeId> {
        self.master_route.lock().clone()
    }
}

impl Host for MockHost {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        *self.clock.lock()
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<SampleBuffer, HostError> {
        if self.fail_decode.load(Ordering::Relaxed) {
            return Err(HostError::Decode("mock decode failure".to_string()));
        }
        super::decode::decode(bytes)
    }

    fn create_node(&self, spec: NodeSpec) -> Result<NodeId, HostError> {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.nodes.lock().insert(id, spec);
        Ok(id)
    }

    fn update_node(&self, id: NodeId, spec: NodeSpec) -> Result<(), HostError> {
        match self.nodes.lock().get_mut(&id) {
            Some(existing) => {
                *existing = spec;
                Ok(())
            }
            None => Err(HostError::UnknownNode(id)),
        }
    }

    fn set_voice_route(&self, voice: DrumVoice, route: Vec<NodeId>) -> Result<(), HostError> {
        self.voice_routes.lock().insert(voice, route);
        Ok(())
    }

    fn set_master_route(&self, route: Vec<NodeId>) -> Result<(), HostError> {
        *self.master_route.lock() = route;
        Ok(())
    }

    fn schedule(&self, playback: Playback) -> Result<PlaybackId, HostError> {
        let id = PlaybackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            voice = %playback.voice,
            start = playback.start,
            gain = playback.gain,
            "Scheduled playback (mock)"
        );
        self.scheduled.lock().push((id, playback));
        Ok(id)
    }

    fn cancel(&self, id: PlaybackId) {
        self.cancelled.lock().push(id);
    }
}

impl fmt::Display for MockHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
