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

//! The drum machine engine.
//!
//! A [`Sequencer`] owns every piece of engine state and is driven by calling
//! [`Sequencer::tick`] regularly. It never spawns a timer of its own; see
//! [`crate::transport::Transport`] for that.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, span, warn, Level, Span};

use crate::audio::offline::{OfflineHost, CHANNELS as OFFLINE_CHANNELS};
use crate::audio::{Host, HostError, Playback, PlaybackId};
use crate::config::{ConfigError, EngineConfig};
use crate::effects::{EffectKind, EffectUpdate, EffectsChain, MasterEffect};
use crate::groove::Groove;
use crate::kit::manager::KitChangeCallback;
use crate::kit::{DrumKit, KitError, KitManager, KitState};
use crate::mixer::Mixer;
use crate::notation::{self, NotationError};
use crate::pattern::store::{PatternStore, StepEdit};
use crate::pattern::{DrumVoice, Genre, Pattern};
use crate::performance::{FillKind, Performance};
use crate::scheduler::{ScheduledStep, Scheduler};
use crate::trigger::{gain_for, Hit, TriggerEngine};

/// Rendering granularity of [`bounce`].
const BOUNCE_BLOCK: Duration = Duration::from_millis(25);

/// Called with the index of each step as it becomes audible, and with 0 on stop.
pub type StepCallback = Box<dyn FnMut(usize) + Send>;

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("audio host error: {0}")]
    Host(#[from] HostError),

    #[error(transparent)]
    Kit(#[from] KitError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct Sequencer {
    host: Arc<dyn Host>,
    store: PatternStore,
    scheduler: Scheduler,
    mixer: Mixer,
    effects: EffectsChain,
    kits: KitManager,
    groove: Groove,
    performance: Performance,
    trigger: TriggerEngine,
    on_step: Option<StepCallback>,
    current_step: usize,
    /// Submitted playbacks and their start times, kept until they start.
    pending: Vec<(PlaybackId, f64)>,
    cancel_pending_on_stop: bool,
    span: Span,
}

impl Sequencer {
    /// Creates a sequencer on the given host and starts loading the configured
    /// kit. Fails if the host can't build the effects graph or the kit is unknown.
    pub fn new(host: Arc<dyn Host>, config: &EngineConfig) -> Result<Sequencer, SequencerError> {
        Sequencer::build(host, config, TriggerEngine::new(), PatternStore::new())
    }

    /// Like [`Sequencer::new`], but every random decision follows the seed.
    pub fn with_seed(
        host: Arc<dyn Host>,
        config: &EngineConfig,
        seed: u64,
    ) -> Result<Sequencer, SequencerError> {
        Sequencer::build(
            host,
            config,
            TriggerEngine::with_seed(seed),
            PatternStore::with_rng(StdRng::seed_from_u64(seed.wrapping_add(1))),
        )
    }

    fn build(
        host: Arc<dyn Host>,
        config: &EngineConfig,
        trigger: TriggerEngine,
        store: PatternStore,
    ) -> Result<Sequencer, SequencerError> {
        let span = span!(Level::INFO, "sequencer", host = %host);
        let _enter = span.enter();

        let mut effects = EffectsChain::new(host.clone());
        effects.initialize()?;
        let mut mixer = Mixer::new();
        let master_volume = mixer.set_master_volume(config.master_volume());
        effects.set_master_volume(master_volume)?;

        let mut kits = KitManager::new(host.clone(), &config.samples_path());
        if let Some(genre) = config.genre()? {
            kits.set_genre(genre);
        }
        kits.set_kit(config.kit())?;

        info!(
            kit = config.kit(),
            sample_rate = host.sample_rate(),
            "Sequencer ready"
        );
        drop(_enter);

        Ok(Sequencer {
            scheduler: Scheduler::new(config.schedule_ahead()?),
            store,
            mixer,
            effects,
            kits,
            groove: Groove::default(),
            performance: Performance::default(),
            trigger,
            on_step: None,
            current_step: 0,
            pending: Vec::new(),
            cancel_pending_on_stop: config.cancel_pending_on_stop(),
            host,
            span,
        })
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Replaces the current pattern. The cursor goes back to the first step and
    /// the pattern's tempo and swing are adopted. Playback continues from the
    /// top if it was running.
    pub fn load_pattern(&mut self, pattern: Pattern) -> Arc<Pattern> {
        let span = self.span.clone();
        let _enter = span.enter();
        let was_playing = self.scheduler.is_playing();
        if was_playing {
            self.halt(true);
        }

        let pattern = self.store.load(pattern);
        self.scheduler.set_step_count(pattern.step_count);
        self.scheduler.set_tempo(pattern.bpm);
        self.scheduler.reset_cursor();
        self.groove.set_swing(pattern.swing_percent());
        self.performance.reset_loops();
        self.current_step = 0;
        info!(
            pattern = %pattern.id,
            name = %pattern.name,
            bpm = self.scheduler.bpm(),
            steps = pattern.step_count,
            "Pattern loaded"
        );

        if was_playing {
            self.scheduler.play(self.host.current_time());
        }
        pattern
    }

    pub fn pattern(&self) -> Option<Arc<Pattern>> {
        self.store.current()
    }

    /// Keeps the scheduler's loop length in step with an edited pattern. The
    /// cursor is not reset.
    fn adopt(&mut self, pattern: Option<Arc<Pattern>>) -> bool {
        match pattern {
            Some(pattern) => {
                self.scheduler.set_step_count(pattern.step_count);
                true
            }
            None => false,
        }
    }

    /// Flips a step. Returns false if there is no pattern or the step is out of range.
    pub fn toggle_step(&mut self, voice: DrumVoice, index: usize) -> bool {
        let pattern = self.store.toggle_step(voice, index);
        self.adopt(pattern)
    }

    /// Applies a partial edit to a step.
    pub fn edit_step(&mut self, voice: DrumVoice, index: usize, edit: &StepEdit) -> bool {
        let pattern = self.store.edit_step(voice, index, edit);
        self.adopt(pattern)
    }

    /// Removes every hit from the current pattern.
    pub fn clear_pattern(&mut self) -> bool {
        let pattern = self.store.clear();
        self.adopt(pattern)
    }

    pub fn copy_pattern(&mut self) -> bool {
        self.store.copy()
    }

    pub fn paste_pattern(&mut self) -> bool {
        let pattern = self.store.paste();
        self.adopt(pattern)
    }

    /// Randomizes the given voices; see [`PatternStore::randomize`].
    pub fn randomize(&mut self, voices: &[DrumVoice], intensity: f64) -> bool {
        let pattern = self.store.randomize(voices, intensity);
        self.adopt(pattern)
    }

    /// Starts playback from the cursor. Returns false if already playing or
    /// there is no pattern to play.
    pub fn play(&mut self) -> bool {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.store.current().is_none() {
            warn!("Cannot play: no pattern loaded");
            return false;
        }
        let now = self.host.current_time();
        if !self.scheduler.play(now) {
            debug!("Already playing");
            return false;
        }
        info!(step = self.scheduler.cursor(), now, "Playing");
        true
    }

    /// Halts playback and keeps the cursor.
    pub fn pause(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.scheduler.is_playing() {
            info!(step = self.scheduler.cursor(), "Paused");
        }
        self.scheduler.pause();
        self.cancel_pending();
    }

    /// Halts playback, rewinds to the first step and reports step 0.
    pub fn stop(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        info!("Stopped");
        self.halt(true);
    }

    fn halt(&mut self, notify: bool) {
        self.scheduler.stop();
        self.cancel_pending();
        self.performance.reset_loops();
        self.current_step = 0;
        if notify {
            if let Some(callback) = self.on_step.as_mut() {
                callback(0);
            }
        }
    }

    fn cancel_pending(&mut self) {
        if !self.cancel_pending_on_stop {
            self.pending.clear();
            return;
        }
        let now = self.host.current_time();
        let mut cancelled = 0;
        for (id, start) in self.pending.drain(..) {
            if start > now {
                self.host.cancel(id);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(cancelled, "Cancelled pending hits");
        }
    }

    /// Cancels every submitted hit that starts at or after `time`.
    fn cancel_from(&mut self, time: f64) {
        let host = &self.host;
        self.pending.retain(|(id, start)| {
            if *start >= time {
                host.cancel(*id);
                false
            } else {
                true
            }
        });
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    /// The last step that became audible.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn tempo(&self) -> f64 {
        self.scheduler.bpm()
    }

    /// Sets the tempo, clamped to 60-300 BPM. Applies from the next step.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        let bpm = self.scheduler.set_tempo(bpm);
        debug!(bpm, "Tempo changed");
        bpm
    }

    /// Sets the output volume. Same as [`Sequencer::set_master_volume`].
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.set_master_volume(volume)
    }

    pub fn set_master_volume(&mut self, volume: f32) -> f32 {
        let volume = self.mixer.set_master_volume(volume);
        if let Err(e) = self.effects.set_master_volume(volume) {
            error!(err = %e, "Unable to set master volume");
        }
        volume
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn set_voice_volume(&mut self, voice: DrumVoice, volume: f32) -> f32 {
        let volume = self.mixer.set_volume(voice, volume);
        if let Err(e) = self.effects.set_voice_gain(voice, volume) {
            error!(voice = %voice, err = %e, "Unable to set voice volume");
        }
        volume
    }

    pub fn set_voice_mute(&mut self, voice: DrumVoice, muted: bool) {
        self.mixer.set_mute(voice, muted);
    }

    pub fn set_voice_solo(&mut self, voice: DrumVoice, soloed: bool) {
        self.mixer.set_solo(voice, soloed);
    }

    pub fn groove(&self) -> &Groove {
        &self.groove
    }

    pub fn set_swing(&mut self, amount: f64) -> f64 {
        self.groove.set_swing(amount)
    }

    pub fn set_humanize(&mut self, amount: f64) -> f64 {
        self.groove.set_humanize(amount)
    }

    pub fn set_velocity_randomization(&mut self, amount: f64) -> f64 {
        self.groove.set_velocity_randomization(amount)
    }

    pub fn performance(&self) -> &Performance {
        &self.performance
    }

    pub fn set_master_probability(&mut self, probability: f64) -> f64 {
        self.performance.set_master_probability(probability)
    }

    pub fn set_scatter(&mut self, enabled: bool, depth: u8) {
        self.performance.set_scatter(enabled, depth);
    }

    /// Scatters hits at the given depth for the next bar.
    pub fn trigger_scatter(&mut self, intensity: u8) {
        let now = self.host.current_time();
        self.performance
            .trigger_scatter(intensity, now, self.scheduler.bpm());
    }

    pub fn set_auto_fill_interval(&mut self, bars: u32) {
        self.performance.set_auto_fill_interval(bars);
    }

    /// Plays a fill on the next pass through the pattern.
    pub fn trigger_fill(&mut self, kind: FillKind) {
        self.performance.trigger_fill(kind);
    }

    pub fn kit(&self) -> &'static DrumKit {
        self.kits.current_kit()
    }

    pub fn kit_state(&self) -> KitState {
        self.kits.state()
    }

    /// Switches kits. Unknown ids leave the current kit untouched.
    pub fn set_kit(&mut self, id: &str) -> Result<(), KitError> {
        let span = self.span.clone();
        let _enter = span.enter();
        self.kits.set_kit(id)
    }

    pub fn genre(&self) -> Option<Genre> {
        self.kits.genre()
    }

    pub fn set_genre(&mut self, genre: Genre) {
        self.kits.set_genre(genre);
    }

    pub fn clear_genre(&mut self) {
        self.kits.clear_genre();
    }

    /// Blocks until the kit has loaded. Returns whether it is ready.
    pub fn wait_for_kit(&mut self, timeout: Duration) -> bool {
        self.kits.wait_ready(timeout)
    }

    pub fn on_kit_change(&mut self, callback: KitChangeCallback) {
        self.kits.on_change(callback);
    }

    pub fn on_step(&mut self, callback: StepCallback) {
        self.on_step = Some(callback);
    }

    pub fn effects(&self) -> &EffectsChain {
        &self.effects
    }

    pub fn set_voice_effect(
        &mut self,
        voice: DrumVoice,
        kind: EffectKind,
        update: &EffectUpdate,
    ) -> Result<(), HostError> {
        self.effects.set_voice_effect(voice, kind, update)
    }

    pub fn set_master_effect(
        &mut self,
        effect: MasterEffect,
        update: &EffectUpdate,
    ) -> Result<(), HostError> {
        self.effects.set_master_effect(effect, update)
    }

    /// Plays a voice right now. Mute and solo apply; step modifiers don't.
    pub fn trigger_voice(&mut self, voice: DrumVoice, velocity: u8) -> bool {
        if !self.mixer.is_audible(voice) {
            return false;
        }
        let velocity = f64::from(velocity.min(127));
        self.play_hit(Hit {
            voice,
            time: self.host.current_time(),
            velocity,
            gain: gain_for(voice, velocity),
            pan: 0.0,
            rate: 1.0,
        })
    }

    /// The current pattern in text notation.
    pub fn export_pattern(&self) -> Option<String> {
        self.store.current().map(|pattern| notation::export(&pattern))
    }

    /// Parses text notation and loads the result.
    pub fn import_pattern(&mut self, text: &str) -> Result<Arc<Pattern>, NotationError> {
        let pattern = notation::import(text)?;
        Ok(self.load_pattern(pattern))
    }

    /// Reads a pattern file and loads it.
    pub fn load_pattern_file(&mut self, path: &Path) -> Result<Arc<Pattern>, ConfigError> {
        let pattern = crate::config::load_pattern(path)?;
        Ok(self.load_pattern(pattern))
    }

    /// The audio-clock time of the next visual update, if one is queued.
    pub fn next_visual_time(&self) -> Option<f64> {
        self.scheduler.next_visual_time()
    }

    /// One pass of the scheduling loop: installs loaded kit buffers, schedules
    /// every step inside the look-ahead window and fires due step callbacks.
    /// Never fails; per-hit problems are logged and the hit is dropped.
    pub fn tick(&mut self) {
        let now = self.host.current_time();
        let span = span!(parent: &self.span, Level::TRACE, "tick", now);
        let _enter = span.enter();

        self.kits.poll();
        self.performance.expire(now);
        self.pending.retain(|(_, start)| *start > now);

        if let Some(pattern) = self.store.current() {
            for step in self.scheduler.due_steps(now) {
                self.schedule_step(&pattern, step);
            }
        }

        for index in self.scheduler.drain_visual(now) {
            self.current_step = index;
            if let Some(callback) = self.on_step.as_mut() {
                callback(index);
            }
        }
    }

    fn schedule_step(&mut self, pattern: &Pattern, scheduled: ScheduledStep) {
        if scheduled.index == 0 {
            self.performance.begin_loop();
        }
        let bpm = self.scheduler.bpm();
        for voice in DrumVoice::ALL {
            let step = match self
                .performance
                .override_step(pattern, voice, scheduled.index)
            {
                Some(step) => step,
                None => match pattern.step(voice, scheduled.index) {
                    Some(step) => step.clone(),
                    None => continue,
                },
            };
            let hits = self.trigger.evaluate(
                voice,
                &step,
                scheduled.index,
                scheduled.time,
                &self.mixer,
                &self.groove,
                &self.performance,
                bpm,
            );
            for hit in hits {
                self.play_hit(hit);
            }
        }
    }

    fn play_hit(&mut self, hit: Hit) -> bool {
        let Some(buffer) = self.kits.buffer(hit.voice) else {
            debug!(voice = %hit.voice, "No buffer loaded, skipping hit");
            return false;
        };
        let playback = Playback {
            voice: hit.voice,
            buffer: buffer.clone(),
            start: hit.time,
            gain: hit.gain,
            rate: hit.rate,
            pan: hit.pan,
        };
        match self.host.schedule(playback) {
            Ok(id) => {
                self.pending.push((id, hit.time));
                true
            }
            Err(e) => {
                error!(voice = %hit.voice, err = %e, "Unable to schedule hit");
                false
            }
        }
    }
}

/// Plays a pattern through an offline host faster than real time and returns
/// the interleaved output. `loops` passes through the pattern are rendered,
/// followed by `tail` of silence for decays to ring out. The sequencer must be
/// built on `host` with a pattern loaded.
pub fn bounce(
    sequencer: &mut Sequencer,
    host: &OfflineHost,
    loops: u32,
    tail: Duration,
) -> Vec<f32> {
    let sample_rate = f64::from(host.sample_rate());
    let block = ((sample_rate * BOUNCE_BLOCK.as_secs_f64()) as usize).max(1);
    let step_count = sequencer
        .pattern()
        .map_or(0, |pattern| pattern.step_count);
    let length = f64::from(loops) * step_count as f64 * sequencer.scheduler.step_interval();
    let frames = (length * sample_rate).round() as usize;
    let tail_frames = (tail.as_secs_f64() * sample_rate).round() as usize;

    info!(loops, seconds = length, "Bouncing pattern");
    let mut output = Vec::with_capacity((frames + tail_frames) * usize::from(OFFLINE_CHANNELS));
    let end = host.current_time() + length;
    if sequencer.play() {
        let mut rendered = 0;
        while rendered < frames {
            sequencer.tick();
            let count = block.min(frames - rendered);
            output.extend(host.render(count));
            rendered += count;
        }
        // The look-ahead has already handed out the start of another pass.
        sequencer.cancel_from(end);
        sequencer.stop();
    }
    output.extend(host.render(tail_frames));
    output
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::audio::mock::MockHost;
    use crate::pattern::Step;
    use crate::testutil::kick_pattern;

    struct Fixture {
        host: Arc<MockHost>,
        sequencer: Sequencer,
        _dir: tempfile::TempDir,
    }

    fn fixture_with(config: impl FnOnce(EngineConfig) -> EngineConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(MockHost::new("mock", 8000));
        let config = config(EngineConfig::new("mock").with_samples_path(dir.path()));
        let mut sequencer = Sequencer::with_seed(host.clone(), &config, 7).unwrap();
        assert!(sequencer.wait_for_kit(Duration::from_secs(10)));
        Fixture {
            host,
            sequencer,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|config| config)
    }

    /// Ticks every 25ms of audio clock from the current time up to `until`.
    fn run_until(fixture: &mut Fixture, until: f64) {
        while fixture.host.current_time() < until - 1e-9 {
            fixture.sequencer.tick();
            fixture.host.advance(0.025);
        }
        fixture.sequencer.tick();
    }

    #[test]
    fn test_four_on_the_floor() {
        let mut fixture = fixture();
        fixture.sequencer.load_pattern(kick_pattern());
        assert!(fixture.sequencer.play());
        run_until(&mut fixture, 1.875);

        let kicks = fixture.host.scheduled_for(DrumVoice::Kick);
        let times: Vec<f64> = kicks.iter().map(|kick| kick.start).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5]);
        let expected_gain = 110.0 / 127.0;
        for kick in &kicks {
            assert!((kick.gain - expected_gain).abs() < 1e-6);
            assert_eq!(kick.rate, 1.0);
        }
        assert_eq!(fixture.host.scheduled().len(), 4);
    }

    #[test]
    fn test_play_without_pattern() {
        let mut fixture = fixture();
        assert!(!fixture.sequencer.play());
        assert!(!fixture.sequencer.is_playing());
    }

    #[test]
    fn test_play_twice_schedules_once() {
        let mut fixture = fixture();
        fixture.sequencer.load_pattern(kick_pattern());
        assert!(fixture.sequencer.play());
        run_until(&mut fixture, 0.3);
        assert!(!fixture.sequencer.play());
        run_until(&mut fixture, 1.875);
        assert_eq!(fixture.host.scheduled_for(DrumVoice::Kick).len(), 4);
    }

    #[test]
    fn test_stop_resets_and_halts() {
        let mut fixture = fixture();
        let steps = Arc::new(Mutex::new(Vec::new()));
        {
            let steps = steps.clone();
            fixture
                .sequencer
                .on_step(Box::new(move |step| steps.lock().push(step)));
        }
        fixture.sequencer.load_pattern(kick_pattern());
        fixture.sequencer.play();
        run_until(&mut fixture, 0.6);
        assert!(fixture.sequencer.current_step() > 0);

        fixture.sequencer.stop();
        assert_eq!(fixture.sequencer.current_step(), 0);
        assert_eq!(steps.lock().last(), Some(&0));

        let scheduled = fixture.host.scheduled().len();
        let until = fixture.host.current_time() + 1.0;
        run_until(&mut fixture, until);
        assert_eq!(fixture.host.scheduled().len(), scheduled);
    }

    #[test]
    fn test_step_callback_in_order() {
        let mut fixture = fixture();
        let steps = Arc::new(Mutex::new(Vec::new()));
        {
            let steps = steps.clone();
            fixture
                .sequencer
                .on_step(Box::new(move |step| steps.lock().push(step)));
        }
        fixture.sequencer.load_pattern(kick_pattern());
        fixture.sequencer.play();
        run_until(&mut fixture, 2.1);
        let steps = steps.lock();
        let expected: Vec<usize> = (0..16).chain(0..1).collect();
        assert_eq!(steps[..17], expected[..]);
    }

    #[test]
    fn test_pause_resumes_from_cursor() {
        let mut fixture = fixture();
        fixture.sequencer.load_pattern(kick_pattern());
        fixture.sequencer.play();
        // Steps 0-3 are scheduled by 0.3s.
        run_until(&mut fixture, 0.3);
        fixture.sequencer.pause();
        fixture.host.clear_scheduled();

        fixture.host.advance(5.0);
        assert!(fixture.sequencer.play());
        let resumed = fixture.host.current_time();
        fixture.sequencer.tick();
        let kicks = fixture.host.scheduled_for(DrumVoice::Kick);
        assert_eq!(kicks.len(), 1);
        assert!((kicks[0].start - resumed).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_kit_keeps_current() {
        let mut fixture = fixture();
        let kit = fixture.sequencer.kit().id;
        assert!(matches!(
            fixture.sequencer.set_kit("cowbell-deluxe"),
            Err(KitError::NotFound(_))
        ));
        assert_eq!(fixture.sequencer.kit().id, kit);
        assert_eq!(fixture.sequencer.kit_state(), KitState::Ready);
    }

    #[test]
    fn test_load_pattern_adopts_tempo_and_swing() {
        let mut fixture = fixture();
        let mut pattern = kick_pattern();
        pattern.bpm = 90.0;
        pattern.swing = 0.25;
        fixture.sequencer.load_pattern(pattern);
        assert_eq!(fixture.sequencer.tempo(), 90.0);
        assert!((fixture.sequencer.groove().swing() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_pattern_while_playing_restarts() {
        let mut fixture = fixture();
        fixture.sequencer.load_pattern(kick_pattern());
        fixture.sequencer.play();
        run_until(&mut fixture, 0.6);
        assert!(fixture.sequencer.current_step() > 0);

        let mut pattern = kick_pattern();
        pattern.bpm = 60.0;
        fixture.sequencer.load_pattern(pattern);
        assert!(fixture.sequencer.is_playing());
        assert_eq!(fixture.sequencer.current_step(), 0);
        assert_eq!(fixture.sequencer.tempo(), 60.0);

        fixture.host.clear_scheduled();
        let restart = fixture.host.current_time();
        fixture.sequencer.tick();
        let kicks = fixture.host.scheduled_for(DrumVoice::Kick);
        assert_eq!(kicks.len(), 1);
        assert!((kicks[0].start - restart).abs() < 1e-9);
    }

    #[test]
    fn test_set_tempo_clamps() {
        let mut fixture = fixture();
        assert_eq!(fixture.sequencer.set_tempo(10.0), 60.0);
        assert_eq!(fixture.sequencer.set_tempo(1000.0), 300.0);
    }

    #[test]
    fn test_cancel_pending_on_stop() {
        let mut fixture = fixture_with(|config| config.with_cancel_pending_on_stop(true));
        fixture.sequencer.load_pattern(kick_pattern());
        fixture.sequencer.play();
        fixture.host.set_time(0.45);
        fixture.sequencer.tick();
        assert_eq!(fixture.host.scheduled_for(DrumVoice::Kick).len(), 2);

        fixture.sequencer.stop();
        assert_eq!(fixture.host.cancelled().len(), 1);
        assert_eq!(fixture.host.live().len(), 1);
    }

    #[test]
    fn test_pending_kept_by_default() {
        let mut fixture = fixture();
        fixture.sequencer.load_pattern(kick_pattern());
        fixture.sequencer.play();
        fixture.host.set_time(0.45);
        fixture.sequencer.tick();
        fixture.sequencer.stop();
        assert!(fixture.host.cancelled().is_empty());
    }

    #[test]
    fn test_muted_voice_is_silent() {
        let mut fixture = fixture();
        fixture.sequencer.load_pattern(kick_pattern());
        fixture.sequencer.set_voice_mute(DrumVoice::Kick, true);
        fixture.sequencer.play();
        run_until(&mut fixture, 1.0);
        assert!(fixture.host.scheduled().is_empty());
    }

    #[test]
    fn test_edits_keep_cursor() {
        let mut fixture = fixture();
        fixture.sequencer.load_pattern(kick_pattern());
        fixture.sequencer.play();
        run_until(&mut fixture, 0.3);
        fixture.host.clear_scheduled();

        // The cursor sits at step 4, so step 6 is still ahead.
        assert!(fixture.sequencer.toggle_step(DrumVoice::Snare, 6));
        assert!(!fixture.sequencer.toggle_step(DrumVoice::Snare, 99));
        run_until(&mut fixture, 0.7);
        let snares = fixture.host.scheduled_for(DrumVoice::Snare);
        assert_eq!(snares.len(), 1);
        assert!((snares[0].start - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_step_pan_and_pitch() {
        let mut fixture = fixture();
        let mut pattern = kick_pattern();
        pattern.voices.get_mut(&DrumVoice::Kick).unwrap()[0] = Step {
            pan: -50,
            pitch: -12,
            ..Step::hit(100)
        };
        fixture.sequencer.load_pattern(pattern);
        fixture.sequencer.play();
        fixture.sequencer.tick();
        let kick = &fixture.host.scheduled_for(DrumVoice::Kick)[0];
        assert_eq!(kick.pan, -1.0);
        assert!((kick.rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_trigger_voice() {
        let mut fixture = fixture();
        fixture.host.set_time(3.0);
        assert!(fixture.sequencer.trigger_voice(DrumVoice::Snare, 127));
        let snare = &fixture.host.scheduled_for(DrumVoice::Snare)[0];
        assert_eq!(snare.start, 3.0);
        assert!((snare.gain - 0.9).abs() < 1e-6);

        fixture.sequencer.set_voice_solo(DrumVoice::Kick, true);
        assert!(!fixture.sequencer.trigger_voice(DrumVoice::Snare, 127));
    }

    #[test]
    fn test_fill_replaces_region_then_crash() {
        let mut fixture = fixture();
        let pattern = kick_pattern().with_hits(DrumVoice::Snare, &[4, 12], 100);
        fixture.sequencer.load_pattern(pattern);
        fixture.sequencer.trigger_fill(FillKind::B);
        fixture.sequencer.play();
        // One full loop is 2s; stop short of the second loop's step 1.
        run_until(&mut fixture, 2.0);

        let snares: Vec<f64> = fixture
            .host
            .scheduled_for(DrumVoice::Snare)
            .iter()
            .map(|snare| snare.start)
            .collect();
        // Step 4 plays as written, then the roll covers steps 12-15.
        assert_eq!(snares, vec![0.5, 1.5, 1.625, 1.75, 1.875]);
        let crashes = fixture.host.scheduled_for(DrumVoice::Crash);
        assert_eq!(crashes.len(), 1);
        assert_eq!(crashes[0].start, 2.0);
    }

    #[test]
    fn test_export_and_import() {
        let mut fixture = fixture();
        assert_eq!(fixture.sequencer.export_pattern(), None);
        fixture.sequencer.load_pattern(kick_pattern());
        let text = fixture.sequencer.export_pattern().unwrap();
        assert!(text.contains("36:110"));

        let imported = fixture.sequencer.import_pattern(&text).unwrap();
        assert_eq!(imported.step_count, 16);
        assert_eq!(fixture.sequencer.pattern().unwrap().id, imported.id);
        assert!(fixture.sequencer.import_pattern("nothing to see").is_err());
    }

    #[test]
    fn test_bounce_renders_whole_loops() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(OfflineHost::new("offline", 8000));
        let config = EngineConfig::new("offline").with_samples_path(dir.path());
        let mut sequencer = Sequencer::with_seed(host.clone(), &config, 1).unwrap();
        assert!(sequencer.wait_for_kit(Duration::from_secs(10)));
        sequencer.load_pattern(
            Pattern::new("hats", "Hats", Genre::Metal, 120.0, 16).with_hits(
                DrumVoice::ClosedHat,
                &[0, 8],
                127,
            ),
        );

        let output = bounce(&mut sequencer, &host, 1, Duration::from_millis(500));
        // Two seconds of pattern and half a second of tail, in stereo.
        assert_eq!(output.len(), 2 * (16000 + 4000));
        assert!(!sequencer.is_playing());

        let peak = |from: f64, to: f64| {
            output[(from * 8000.0) as usize * 2..(to * 8000.0) as usize * 2]
                .iter()
                .fold(0f32, |peak, sample| peak.max(sample.abs()))
        };
        assert!(peak(0.0, 0.05) > 0.001);
        assert!(peak(1.0, 1.05) > 0.001);
        assert_eq!(peak(0.5, 0.9), 0.0);
        // The downbeat of the next pass was scheduled ahead but cut.
        assert_eq!(peak(2.0, 2.5), 0.0);
    }

    #[test]
    fn test_master_volume() {
        let mut fixture = fixture();
        assert_eq!(fixture.sequencer.mixer().master_volume(), 0.7);
        assert_eq!(fixture.sequencer.set_volume(2.0), 1.0);
        assert_eq!(fixture.sequencer.set_voice_volume(DrumVoice::Ride, -1.0), 0.0);
    }
}
