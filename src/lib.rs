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

//! A step-sequencer drum machine.
//!
//! The crate is organized around an owned [`sequencer::Sequencer`] that turns a
//! [`pattern::Pattern`] into sample-accurate triggers on an audio [`audio::Host`].
//! A [`transport::Transport`] drives the sequencer from a coarse wall-clock timer
//! using look-ahead scheduling.

pub mod audio;
pub mod config;
pub mod effects;
pub mod groove;
pub mod kit;
pub mod mixer;
pub mod notation;
pub mod pattern;
pub mod performance;
pub mod playsync;
pub mod scheduler;
pub mod sequencer;
pub mod transport;
pub mod trigger;

#[cfg(test)]
mod testutil;
