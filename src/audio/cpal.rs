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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info};

use super::render::{RenderCommand, Renderer};
use super::thread_priority::{callback_thread_priority, configure_thread_priority, rt_audio_enabled};
use super::{Host, HostError, NodeId, NodeSpec, Playback, PlaybackId};
use crate::pattern::DrumVoice;
use crate::playsync::CancelHandle;

/// A real-time host playing through a cpal output stream. The render graph lives
/// inside the stream callback and receives changes through a channel; the
/// callback publishes the number of frames it has rendered as the audio clock.
pub struct CpalHost {
    name: String,
    sample_rate: u32,
    channels: u16,
    commands: Sender<RenderCommand>,
    frames_rendered: Arc<AtomicU64>,
    next_id: AtomicU64,
    cancel_handle: CancelHandle,
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Finds an output device by name across every cpal host.
fn find_device(name: &str) -> Result<Option<cpal::Device>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    if name == "default" {
        return Ok(cpal::default_host().default_output_device());
    }

    for host_id in cpal::available_hosts() {
        let devices = match cpal::host_from_id(host_id)?.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };
        for device in devices {
            #[allow(deprecated)]
            let device_name = device.name()?;
            if device_name.trim() == name {
                return Ok(Some(device));
            }
        }
    }
    Ok(None)
}

/// Lists the names of output devices that offer at least one configuration.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut names = Vec::new();
    for host_id in cpal::available_hosts() {
        let devices = match cpal::host_from_id(host_id)?.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };
        for device in devices {
            let has_config = device
                .supported_output_configs()
                .map(|mut configs| configs.next().is_some())
                .unwrap_or(false);
            if has_config {
                #[allow(deprecated)]
                names.push(format!("{} ({})", device.name()?, host_id.name()));
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Builds the callback for a sample type. The graph renders in f32 and is
/// converted on the way out.
fn create_callback<T>(
    mut renderer: Renderer,
    commands: Receiver<RenderCommand>,
    frames_rendered: Arc<AtomicU64>,
    channels: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;
    let mut scratch: Vec<f32> = Vec::new();

    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        configure_thread_priority(priority, rt_audio, &mut priority_set);

        while let Ok(command) = commands.try_recv() {
            renderer.apply(command);
        }

        if scratch.len() != data.len() {
            scratch.resize(data.len(), 0.0);
        }
        renderer.render_interleaved(&mut scratch, channels);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
        frames_rendered.store(renderer.frames_rendered(), Ordering::Release);
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: cpal::SampleFormat,
    config: &cpal::StreamConfig,
    renderer: Renderer,
    commands: Receiver<RenderCommand>,
    frames_rendered: Arc<AtomicU64>,
) -> Result<cpal::Stream, HostError> {
    let channels = usize::from(config.channels);
    let err_fn = |err| error!("cpal output stream error: {}", err);
    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_output_stream(
            config,
            create_callback::<i16>(renderer, commands, frames_rendered, channels),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I32 => device.build_output_stream(
            config,
            create_callback::<i32>(renderer, commands, frames_rendered, channels),
            err_fn,
            None,
        ),
        _ => device.build_output_stream(
            config,
            create_callback::<f32>(renderer, commands, frames_rendered, channels),
            err_fn,
            None,
        ),
    };
    stream.map_err(|e| HostError::Stream(e.to_string()))
}

impl CpalHost {
    /// Opens the named output device and starts its stream.
    pub fn open(name: &str, sample_rate: u32) -> Result<CpalHost, HostError> {
        let device = find_device(name)
            .map_err(|e| HostError::Stream(e.to_string()))?
            .ok_or_else(|| HostError::DeviceNotFound(name.to_string()))?;
        let default_config = device
            .default_output_config()
            .map_err(|_| HostError::NoOutputConfig(name.to_string()))?;
        let channels = default_config.channels();
        let sample_format = default_config.sample_format();

        let config = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let (commands, command_rx) = crossbeam_channel::unbounded();
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let cancel_handle = CancelHandle::new();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), HostError>>(1);

        // cpal streams are not Send everywhere, so the stream is created and
        // held on its own thread until the host is dropped.
        let output_thread = {
            let frames_rendered = frames_rendered.clone();
            let cancel_handle = cancel_handle.clone();
            let device_name = name.to_string();
            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || {
                    let stream = match build_stream(
                        &device,
                        sample_format,
                        &config,
                        Renderer::new(sample_rate),
                        command_rx,
                        frames_rendered,
                    ) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(HostError::Stream(e.to_string())));
                        return;
                    }
                    info!(device = device_name, sample_rate, channels, "Output stream started");
                    let _ = ready_tx.send(Ok(()));

                    cancel_handle.wait();
                    drop(stream);
                    info!(device = device_name, "Output stream stopped");
                })
                .map_err(|e| HostError::Stream(e.to_string()))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(HostError::Closed);
            }
        }

        Ok(CpalHost {
            name: name.to_string(),
            sample_rate,
            channels,
            commands,
            frames_rendered,
            next_id: AtomicU64::new(1),
            cancel_handle,
            output_thread: Mutex::new(Some(output_thread)),
        })
    }

    fn send(&self, command: RenderCommand) -> Result<(), HostError> {
        self.commands.send(command).map_err(|_| HostError::Closed)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Host for CpalHost {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / f64::from(self.sample_rate)
    }

    fn create_node(&self, spec: NodeSpec) -> Result<NodeId, HostError> {
        let id = NodeId(self.next_id());
        self.send(RenderCommand::CreateNode(id, spec))?;
        Ok(id)
    }

    fn update_node(&self, id: NodeId, spec: NodeSpec) -> Result<(), HostError> {
        if id.0 >= self.next_id.load(Ordering::Relaxed) {
            return Err(HostError::UnknownNode(id));
        }
        self.send(RenderCommand::UpdateNode(id, spec))
    }

    fn set_voice_route(&self, voice: DrumVoice, route: Vec<NodeId>) -> Result<(), HostError> {
        self.send(RenderCommand::VoiceRoute(voice, route))
    }

    fn set_master_route(&self, route: Vec<NodeId>) -> Result<(), HostError> {
        self.send(RenderCommand::MasterRoute(route))
    }

    fn schedule(&self, playback: Playback) -> Result<PlaybackId, HostError> {
        let id = PlaybackId(self.next_id());
        self.send(RenderCommand::Schedule(id, playback))?;
        Ok(id)
    }

    fn cancel(&self, id: PlaybackId) {
        let _ = self.send(RenderCommand::Cancel(id));
    }
}

impl Drop for CpalHost {
    fn drop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(thread) = self.output_thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl fmt::Display for CpalHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Channels={})", self.name, self.channels)
    }
}
