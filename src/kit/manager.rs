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
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, span, warn, Level};

use super::loader::SampleLoader;
use super::{find_kit, genre_voices, resolve_sample, synth, DrumKit, KitError};
use crate::audio::{Host, SampleBuffer};
use crate::pattern::{DrumVoice, Genre};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KitState {
    /// Nothing has been requested yet.
    Idle,
    /// Buffers for the current kit are still arriving.
    Loading,
    Ready,
}

impl fmt::Display for KitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KitState::Idle => "idle",
            KitState::Loading => "loading",
            KitState::Ready => "ready",
        };
        write!(f, "{}", name)
    }
}

/// Asks the loader thread for the buffer of one voice.
struct LoadRequest {
    generation: u64,
    voice: DrumVoice,
    source: &'static str,
}

/// A buffer delivered by the loader thread.
struct LoadedVoice {
    generation: u64,
    voice: DrumVoice,
    buffer: SampleBuffer,
}

/// Called whenever a kit finishes loading.
pub type KitChangeCallback = Box<dyn FnMut(&'static DrumKit) + Send>;

/// Owns the active kit and the buffer each voice plays.
///
/// Decoding happens on a loader thread. Every request carries a generation so
/// buffers from a superseded kit or genre are discarded when they arrive. Until
/// a voice's new buffer lands, its previous buffer stays in use.
pub struct KitManager {
    kit: &'static DrumKit,
    genre: Option<Genre>,
    state: KitState,
    buffers: [Option<SampleBuffer>; DrumVoice::COUNT],
    generation: u64,
    /// Buffers still expected for the current generation.
    pending: usize,
    requests: Option<Sender<LoadRequest>>,
    results: Receiver<LoadedVoice>,
    loader_thread: Option<thread::JoinHandle<()>>,
    on_change: Option<KitChangeCallback>,
}

impl KitManager {
    /// Creates an idle manager. Sources resolve against the samples path.
    pub fn new(host: Arc<dyn Host>, samples_path: &Path) -> KitManager {
        let (requests, request_rx) = crossbeam_channel::unbounded::<LoadRequest>();
        let (result_tx, results) = crossbeam_channel::unbounded::<LoadedVoice>();

        let mut loader = SampleLoader::new(host.clone(), samples_path);
        let loader_thread = thread::Builder::new()
            .name("kit-loader".to_string())
            .spawn(move || {
                let mut rng = StdRng::from_entropy();
                for request in request_rx.iter() {
                    let buffer = match loader.load(request.source) {
                        Ok(buffer) => buffer,
                        Err(e) => {
                            warn!(
                                voice = %request.voice,
                                err = %e,
                                "Unable to load sample, synthesizing instead"
                            );
                            synth::synthesize(request.voice, host.sample_rate(), &mut rng)
                        }
                    };
                    let delivered = result_tx.send(LoadedVoice {
                        generation: request.generation,
                        voice: request.voice,
                        buffer,
                    });
                    if delivered.is_err() {
                        return;
                    }
                }
            });
        let loader_thread = match loader_thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(err = %e, "Unable to start kit loader thread");
                None
            }
        };

        KitManager {
            kit: &super::KITS[0],
            genre: None,
            state: KitState::Idle,
            buffers: Default::default(),
            generation: 0,
            pending: 0,
            requests: Some(requests),
            results,
            loader_thread,
            on_change: None,
        }
    }

    pub fn state(&self) -> KitState {
        self.state
    }

    /// The active kit. Before the first `set_kit` this is the default kit.
    pub fn current_kit(&self) -> &'static DrumKit {
        self.kit
    }

    pub fn genre(&self) -> Option<Genre> {
        self.genre
    }

    /// Registers a callback run whenever a kit finishes loading.
    pub fn on_change(&mut self, callback: KitChangeCallback) {
        self.on_change = Some(callback);
    }

    /// Switches to a kit and starts loading all of its voices. An unknown id
    /// leaves the current kit and buffers untouched.
    pub fn set_kit(&mut self, id: &str) -> Result<(), KitError> {
        let kit = find_kit(id).ok_or_else(|| {
            warn!(kit = id, "Kit not found");
            KitError::NotFound(id.to_string())
        })?;
        info!(kit = kit.id, genre = ?self.genre, "Switching kit");
        self.kit = kit;
        self.request(DrumVoice::ALL.to_vec());
        Ok(())
    }

    /// Selects a genre. Only voices whose source changes are reloaded.
    pub fn set_genre(&mut self, genre: Genre) {
        self.change_genre(Some(genre));
    }

    /// Drops any genre override so every voice plays the kit's own source.
    pub fn clear_genre(&mut self) {
        self.change_genre(None);
    }

    fn change_genre(&mut self, genre: Option<Genre>) {
        if genre == self.genre {
            return;
        }
        let previous = self.genre;
        self.genre = genre;
        info!(genre = ?genre, "Switching genre");

        match self.state {
            // Nothing loaded yet; the next set_kit picks the genre up.
            KitState::Idle => {}
            // Outstanding requests resolved against the old genre.
            KitState::Loading => {
                self.request(DrumVoice::ALL.to_vec());
            }
            _ => {
                let mut voices: Vec<DrumVoice> = previous.map(genre_voices).unwrap_or_default();
                for voice in genre.map(genre_voices).unwrap_or_default() {
                    if !voices.contains(&voice) {
                        voices.push(voice);
                    }
                }
                voices.sort();
                if !voices.is_empty() {
                    self.request(voices);
                }
            }
        }
    }

    fn request(&mut self, voices: Vec<DrumVoice>) {
        let Some(requests) = self.requests.clone() else {
            return;
        };
        self.generation += 1;
        self.pending = 0;
        for voice in voices {
            let source = resolve_sample(self.kit, self.genre, voice);
            let sent = requests.send(LoadRequest {
                generation: self.generation,
                voice,
                source,
            });
            if sent.is_ok() {
                self.pending += 1;
            }
        }
        self.state = if self.pending > 0 {
            KitState::Loading
        } else {
            KitState::Ready
        };
    }

    /// Installs any buffers the loader has delivered. Returns true if the kit
    /// became ready.
    pub fn poll(&mut self) -> bool {
        let mut became_ready = false;
        while let Ok(loaded) = self.results.try_recv() {
            became_ready |= self.install(loaded);
        }
        became_ready
    }

    fn install(&mut self, loaded: LoadedVoice) -> bool {
        if loaded.generation != self.generation {
            return false;
        }
        self.buffers[loaded.voice.index()] = Some(loaded.buffer);
        self.pending = self.pending.saturating_sub(1);
        if self.pending > 0 || self.state != KitState::Loading {
            return false;
        }

        self.state = KitState::Ready;
        info!(kit = self.kit.id, "Kit ready");
        if let Some(callback) = self.on_change.as_mut() {
            callback(self.kit);
        }
        true
    }

    /// Blocks until the kit is ready or the timeout passes. Returns whether the
    /// kit is ready.
    pub fn wait_ready(&mut self, timeout: Duration) -> bool {
        let _enter = span!(Level::DEBUG, "wait_ready", kit = self.kit.id).entered();
        let deadline = Instant::now() + timeout;
        self.poll();
        while self.state == KitState::Loading {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(loaded) => {
                    self.install(loaded);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.state == KitState::Ready
    }

    /// The buffer a voice currently plays, if one has been loaded.
    pub fn buffer(&self, voice: DrumVoice) -> Option<&SampleBuffer> {
        self.buffers[voice.index()].as_ref()
    }

    /// The source a voice resolves to under the current kit and genre.
    pub fn source(&self, voice: DrumVoice) -> &'static str {
        resolve_sample(self.kit, self.genre, voice)
    }
}

impl Drop for KitManager {
    fn drop(&mut self) {
        // Closing the request channel ends the loader thread.
        self.requests = None;
        if let Some(handle) = self.loader_thread.take() {
            let _ = handle.join();
        }
    }
}
