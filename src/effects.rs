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

//! Per-voice and master effects routing.
//!
//! Each voice plays through a gain node followed by whichever of its effects
//! are enabled, in a fixed order. Effect nodes are created the first time the
//! effect is enabled and reused afterwards; disabling an effect takes it out of
//! the route. The master bus is built in full up front and skips disabled
//! stages.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::{Host, HostError, NodeId, NodeSpec};
use crate::mixer::DEFAULT_MASTER_VOLUME;
use crate::pattern::DrumVoice;

pub mod settings;

pub use settings::{
    master_default, voice_default, EffectConfig, EffectKind, EffectParam, EffectUpdate,
    MasterEffect,
};

struct VoiceChain {
    gain: Option<NodeId>,
    configs: BTreeMap<EffectKind, EffectConfig>,
    nodes: BTreeMap<EffectKind, NodeId>,
}

impl VoiceChain {
    fn new(voice: DrumVoice) -> VoiceChain {
        VoiceChain {
            gain: None,
            configs: EffectKind::ALL
                .into_iter()
                .map(|kind| (kind, voice_default(voice, kind)))
                .collect(),
            nodes: BTreeMap::new(),
        }
    }

    /// The gain node followed by every enabled effect that has a node.
    fn route(&self) -> Vec<NodeId> {
        let effects = EffectKind::ALL.into_iter().filter_map(|kind| {
            let enabled = self.configs.get(&kind).is_some_and(|config| config.enabled);
            enabled.then(|| self.nodes.get(&kind).copied()).flatten()
        });
        self.gain.into_iter().chain(effects).collect()
    }
}

/// Owns the effect configuration and the processing nodes it has created.
pub struct EffectsChain {
    host: Arc<dyn Host>,
    voices: Vec<VoiceChain>,
    master_gain: Option<NodeId>,
    master_volume: f32,
    master_configs: BTreeMap<MasterEffect, EffectConfig>,
    master_nodes: BTreeMap<MasterEffect, NodeId>,
}

impl EffectsChain {
    pub fn new(host: Arc<dyn Host>) -> EffectsChain {
        EffectsChain {
            host,
            voices: DrumVoice::ALL.into_iter().map(VoiceChain::new).collect(),
            master_gain: None,
            master_volume: DEFAULT_MASTER_VOLUME,
            master_configs: MasterEffect::ALL
                .into_iter()
                .map(|effect| (effect, master_default(effect)))
                .collect(),
            master_nodes: BTreeMap::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.master_gain.is_some()
    }

    /// Creates the voice gain nodes and the full master bus, then wires every
    /// route. Effects enabled before this call are built here too.
    pub fn initialize(&mut self) -> Result<(), HostError> {
        if self.is_initialized() {
            return Ok(());
        }

        for voice in DrumVoice::ALL {
            let gain = self.host.create_node(NodeSpec::Gain { gain: 1.0 })?;
            let chain = &mut self.voices[voice.index()];
            chain.gain = Some(gain);
            let enabled: Vec<EffectKind> = chain
                .configs
                .iter()
                .filter(|(_, config)| config.enabled)
                .map(|(kind, _)| *kind)
                .collect();
            for kind in enabled {
                self.build_voice_node(voice, kind)?;
            }
            self.rewire_voice(voice)?;
        }

        self.master_gain = Some(self.host.create_node(NodeSpec::Gain {
            gain: self.master_volume,
        })?);
        for effect in MasterEffect::ALL {
            let spec = self.master_configs[&effect].master_node(effect);
            let id = self.host.create_node(spec)?;
            self.master_nodes.insert(effect, id);
        }
        self.rewire_master()?;

        info!(host = %self.host, "Effects chain initialized");
        Ok(())
    }

    pub fn voice_config(&self, voice: DrumVoice, kind: EffectKind) -> &EffectConfig {
        &self.voices[voice.index()].configs[&kind]
    }

    pub fn master_config(&self, effect: MasterEffect) -> &EffectConfig {
        &self.master_configs[&effect]
    }

    /// Whether a voice effect has a processing node yet.
    pub fn has_voice_node(&self, voice: DrumVoice, kind: EffectKind) -> bool {
        self.voices[voice.index()].nodes.contains_key(&kind)
    }

    /// The nodes a voice currently plays through, in order.
    pub fn voice_route(&self, voice: DrumVoice) -> Vec<NodeId> {
        self.voices[voice.index()].route()
    }

    /// The nodes of the master bus currently in the signal path, in order.
    pub fn master_route(&self) -> Vec<NodeId> {
        let stages = MasterEffect::ALL.into_iter().filter_map(|effect| {
            self.master_configs[&effect]
                .enabled
                .then(|| self.master_nodes.get(&effect).copied())
                .flatten()
        });
        self.master_gain.into_iter().chain(stages).collect()
    }

    /// Updates a voice effect. Enabling it builds its node the first time;
    /// parameter changes update the existing node in place.
    pub fn set_voice_effect(
        &mut self,
        voice: DrumVoice,
        kind: EffectKind,
        update: &EffectUpdate,
    ) -> Result<(), HostError> {
        let initialized = self.is_initialized();
        let chain = &mut self.voices[voice.index()];
        let config = chain
            .configs
            .entry(kind)
            .or_insert_with(|| voice_default(voice, kind));
        config.apply(update);
        let enabled = config.enabled;
        let spec = config.voice_node(kind);
        let existing = chain.nodes.get(&kind).copied();
        debug!(voice = %voice, effect = %kind, enabled, "Voice effect changed");

        if !initialized {
            return Ok(());
        }
        match existing {
            Some(id) => self.host.update_node(id, spec)?,
            None if enabled => self.build_voice_node(voice, kind)?,
            None => {}
        }
        self.rewire_voice(voice)
    }

    /// Updates a master stage. The node already exists; only its parameters and
    /// whether it is in the path change.
    pub fn set_master_effect(
        &mut self,
        effect: MasterEffect,
        update: &EffectUpdate,
    ) -> Result<(), HostError> {
        let config = self
            .master_configs
            .entry(effect)
            .or_insert_with(|| master_default(effect));
        config.apply(update);
        let spec = config.master_node(effect);
        debug!(effect = %effect, enabled = config.enabled, "Master effect changed");

        if let Some(id) = self.master_nodes.get(&effect) {
            self.host.update_node(*id, spec)?;
            self.rewire_master()?;
        }
        Ok(())
    }

    /// Sets the fader gain node of a voice.
    pub fn set_voice_gain(&mut self, voice: DrumVoice, gain: f32) -> Result<(), HostError> {
        match self.voices[voice.index()].gain {
            Some(id) => self.host.update_node(id, NodeSpec::Gain { gain }),
            None => Ok(()),
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) -> Result<(), HostError> {
        self.master_volume = volume;
        match self.master_gain {
            Some(id) => self.host.update_node(id, NodeSpec::Gain { gain: volume }),
            None => Ok(()),
        }
    }

    fn build_voice_node(&mut self, voice: DrumVoice, kind: EffectKind) -> Result<(), HostError> {
        let chain = &mut self.voices[voice.index()];
        if chain.nodes.contains_key(&kind) {
            return Ok(());
        }
        let spec = chain.configs[&kind].voice_node(kind);
        let id = self.host.create_node(spec)?;
        debug!(voice = %voice, effect = %kind, node = %id, "Built effect node");
        chain.nodes.insert(kind, id);
        Ok(())
    }

    fn rewire_voice(&self, voice: DrumVoice) -> Result<(), HostError> {
        self.host.set_voice_route(voice, self.voice_route(voice))
    }

    fn rewire_master(&self) -> Result<(), HostError> {
        self.host.set_master_route(self.master_route())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockHost;

    fn chain() -> (Arc<MockHost>, EffectsChain) {
        let host = Arc::new(MockHost::new("mock", 44100));
        let mut chain = EffectsChain::new(host.clone());
        chain.initialize().unwrap();
        (host, chain)
    }

    #[test]
    fn test_initialize_builds_master_bus() {
        let (host, chain) = chain();
        // Nine voice gains, the master gain and four master stages.
        assert_eq!(host.node_count(), 14);

        let master = host.master_route();
        assert_eq!(master, chain.master_route());
        // Only the limiter is enabled by default.
        assert_eq!(master.len(), 2);
        assert_eq!(
            host.node(master[0]),
            Some(NodeSpec::Gain {
                gain: DEFAULT_MASTER_VOLUME
            })
        );
        assert!(matches!(
            host.node(master[1]),
            Some(NodeSpec::Compressor { ratio, .. }) if ratio == 20.0
        ));

        for voice in DrumVoice::ALL {
            assert_eq!(host.voice_route(voice).len(), 1);
        }
    }

    #[test]
    fn test_lazy_voice_effect() {
        let (host, mut chain) = chain();
        let voice = DrumVoice::Snare;

        // Parameter changes on a disabled effect don't build anything.
        chain
            .set_voice_effect(
                voice,
                EffectKind::Reverb,
                &EffectUpdate::default().with_param("room", 80.0),
            )
            .unwrap();
        assert!(!chain.has_voice_node(voice, EffectKind::Reverb));
        assert_eq!(host.node_count(), 14);

        chain
            .set_voice_effect(voice, EffectKind::Reverb, &EffectUpdate::enable())
            .unwrap();
        assert!(chain.has_voice_node(voice, EffectKind::Reverb));
        assert_eq!(host.node_count(), 15);
        let route = host.voice_route(voice);
        assert_eq!(route.len(), 2);
        assert!(matches!(
            host.node(route[1]),
            Some(NodeSpec::Reverb { room, .. }) if (room - 0.8).abs() < 1e-6
        ));
    }

    #[test]
    fn test_disable_keeps_node() {
        let (host, mut chain) = chain();
        let voice = DrumVoice::Kick;
        chain
            .set_voice_effect(voice, EffectKind::Filter, &EffectUpdate::enable())
            .unwrap();
        chain
            .set_voice_effect(voice, EffectKind::Filter, &EffectUpdate::disable())
            .unwrap();
        assert_eq!(host.voice_route(voice).len(), 1);
        assert!(chain.has_voice_node(voice, EffectKind::Filter));

        // Re-enabling reuses the node.
        chain
            .set_voice_effect(
                voice,
                EffectKind::Filter,
                &EffectUpdate::enable().with_param("cutoff", 500.0),
            )
            .unwrap();
        assert_eq!(host.node_count(), 15);
        let route = host.voice_route(voice);
        assert!(matches!(
            host.node(route[1]),
            Some(NodeSpec::Filter { frequency, .. }) if frequency == 500.0
        ));
    }

    #[test]
    fn test_voice_effect_order() {
        let (host, mut chain) = chain();
        let voice = DrumVoice::TomLow;
        for kind in [
            EffectKind::Reverb,
            EffectKind::Delay,
            EffectKind::Filter,
            EffectKind::Compressor,
            EffectKind::Distortion,
        ] {
            chain
                .set_voice_effect(voice, kind, &EffectUpdate::enable())
                .unwrap();
        }
        let kinds: Vec<&'static str> = host
            .voice_route(voice)
            .into_iter()
            .map(|id| match host.node(id) {
                Some(NodeSpec::Gain { .. }) => "gain",
                Some(NodeSpec::Filter { .. }) => "filter",
                Some(NodeSpec::Distortion { .. }) => "distortion",
                Some(NodeSpec::Compressor { .. }) => "compressor",
                Some(NodeSpec::Delay { .. }) => "delay",
                Some(NodeSpec::Reverb { .. }) => "reverb",
                None => "missing",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["gain", "filter", "distortion", "compressor", "delay", "reverb"]
        );
    }

    #[test]
    fn test_master_stages_toggle() {
        let (host, mut chain) = chain();
        chain
            .set_master_effect(MasterEffect::Eq, &EffectUpdate::enable().with_param("gain", 3.0))
            .unwrap();
        chain
            .set_master_effect(MasterEffect::Limiter, &EffectUpdate::disable())
            .unwrap();
        let route = host.master_route();
        assert_eq!(route.len(), 2);
        assert!(matches!(
            host.node(route[1]),
            Some(NodeSpec::Filter { gain_db, .. }) if gain_db == 3.0
        ));
        assert_eq!(host.node_count(), 14);
    }

    #[test]
    fn test_effects_before_initialize() {
        let host = Arc::new(MockHost::new("mock", 44100));
        let mut chain = EffectsChain::new(host.clone());
        chain
            .set_voice_effect(DrumVoice::Ride, EffectKind::Delay, &EffectUpdate::enable())
            .unwrap();
        assert_eq!(host.node_count(), 0);
        chain.initialize().unwrap();
        assert_eq!(host.voice_route(DrumVoice::Ride).len(), 2);
    }

    #[test]
    fn test_gains() {
        let (host, mut chain) = chain();
        chain.set_voice_gain(DrumVoice::Crash, 0.25).unwrap();
        let gain = host.voice_route(DrumVoice::Crash)[0];
        assert_eq!(host.node(gain), Some(NodeSpec::Gain { gain: 0.25 }));

        chain.set_master_volume(0.5).unwrap();
        assert_eq!(
            host.node(host.master_route()[0]),
            Some(NodeSpec::Gain { gain: 0.5 })
        );
    }
}
