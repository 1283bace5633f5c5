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

//! Drum kits: the catalog of sample sets and the genre overrides layered on top.

use std::fmt;

use crate::pattern::{DrumVoice, Genre};

pub mod loader;
pub mod manager;
pub mod synth;

pub use manager::{KitManager, KitState};

/// The kit selected when nothing else is configured.
pub const DEFAULT_KIT: &str = "pearl";

#[derive(Debug, thiserror::Error)]
pub enum KitError {
    #[error("kit not found: {0}")]
    NotFound(String),
}

/// A named set of sound sources, one per voice. Sound sources are file names
/// relative to the configured samples directory.
pub struct DrumKit {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Genres the kit suits.
    pub genres: &'static [Genre],
    /// Sound sources indexed by [`DrumVoice::index`].
    samples: [&'static str; DrumVoice::COUNT],
}

impl DrumKit {
    /// The sound source for a voice.
    pub fn sample(&self, voice: DrumVoice) -> &'static str {
        self.samples[voice.index()]
    }

    /// True if the kit lists the genre as compatible.
    pub fn suits(&self, genre: Genre) -> bool {
        self.genres.contains(&genre)
    }
}

impl fmt::Debug for DrumKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrumKit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("genres", &self.genres)
            .finish()
    }
}

/// Every kit, in display order. The first entry is the default kit.
pub static KITS: [DrumKit; 6] = [
    DrumKit {
        id: "pearl",
        name: "Pearl Studio Kit",
        description: "Clean, professional studio sounds",
        genres: &[Genre::Jazz, Genre::Metal, Genre::Metalcore, Genre::PostHardcore],
        samples: [
            "pearlkit-kick.wav",
            "pearlkit-snare1.wav",
            "pearlkit-hihat.wav",
            "pearlkit-hihatO.wav",
            "pearlkit-ridecrash.wav",
            "pearlkit-ride1.wav",
            "pearlkit-hitom1.wav",
            "pearlkit-hitom2.wav",
            "pearlkit-lowtom1.wav",
        ],
    },
    DrumKit {
        id: "real-heavy",
        name: "Big & Heavy Real Kit",
        description: "Powerful, punchy real drum samples",
        genres: &[Genre::Metal, Genre::Metalcore],
        samples: [
            "real-kick-F036.wav",
            "real-01BB1-snare-R4M.wav",
            "real-01L1.UF-HiHat-M.wav",
            "real-01L3.UF-HiHat-A-L.wav",
            "real-01EG19THCM.wav",
            "real-long-ride.wav",
            "real-02.TOM1C-L.wav",
            "real-02.TOM5C-L.wav",
            "real-03.TOM2C-L.wav",
        ],
    },
    DrumKit {
        id: "real-aggressive",
        name: "Aggressive Real Kit",
        description: "Hard-hitting samples for extreme genres",
        genres: &[Genre::Metalcore, Genre::PostHardcore],
        samples: [
            "real-kick-F045.wav",
            "real-01RR-snare-R2A-R.wav",
            "real-02R3.UF-HiHat-M.wav",
            "real-02R3.UF-HiHat-A-R.wav",
            "real-01TP19THCM.wav",
            "real-long-ride.wav",
            "real-02.TOM1C-L.wav",
            "real-03.TOM3C-L.wav",
            "real-08.TOM4M.wav",
        ],
    },
    DrumKit {
        id: "real-dynamic",
        name: "Dynamic Real Kit",
        description: "Versatile samples for post-hardcore and dynamic playing",
        genres: &[Genre::PostHardcore, Genre::Metal],
        samples: [
            "real-kick-F024.wav",
            "real-02LI-snare-R2M.wav",
            "real-01L2.UF-HiHat-M.wav",
            "real-02L4.UF-HiHat-A-R.wav",
            "real-01TP20CHIM.wav",
            "real-long-ride.wav",
            "real-02.TOM1C-L.wav",
            "real-02.TOM5C-L.wav",
            "real-03.TOM2C-L.wav",
        ],
    },
    DrumKit {
        id: "real-jazz",
        name: "Jazz Real Kit",
        description: "Warm, dynamic samples perfect for jazz",
        genres: &[Genre::Jazz],
        samples: [
            "real-kick-F049.wav",
            "real-soft-snare.wav",
            "real-01PD.UF-HiHat-M.wav",
            "real-01L3.UF-HiHat-A-L.wav",
            "pearlkit-ridecrash.wav",
            "real-long-ride.wav",
            "pearlkit-hitom1.wav",
            "pearlkit-hitom2.wav",
            "pearlkit-lowtom1.wav",
        ],
    },
    DrumKit {
        id: "classic",
        name: "Classic Electronic",
        description: "Classic drum machine sounds",
        genres: &[Genre::Metal, Genre::Metalcore, Genre::PostHardcore],
        samples: [
            "BDRUM13.wav",
            "SNARE2.wav",
            "HHCLOSE1.wav",
            "HHOPEN1.wav",
            "CRASH.wav",
            "RIDE.wav",
            "TOMHI5.wav",
            "TOMMID5.wav",
            "TOMLOW5.wav",
        ],
    },
];

/// Looks up a kit by id.
pub fn find_kit(id: &str) -> Option<&'static DrumKit> {
    KITS.iter().find(|kit| kit.id == id)
}

/// The kits that list the genre as compatible.
pub fn kits_for_genre(genre: Genre) -> impl Iterator<Item = &'static DrumKit> {
    KITS.iter().filter(move |kit| kit.suits(genre))
}

/// The genre-specific sound source for a voice, if the genre replaces it.
pub fn genre_override(genre: Genre, voice: DrumVoice) -> Option<&'static str> {
    let source = match (genre, voice) {
        (Genre::Metal, DrumVoice::Kick) => "real-kick-F036.wav",
        (Genre::Metal, DrumVoice::Snare) => "real-01BB1-snare-R4M.wav",
        (Genre::Metal, DrumVoice::ClosedHat) => "real-01L1.UF-HiHat-M.wav",
        (Genre::Metal, DrumVoice::Crash) => "real-01EG19THCM.wav",

        (Genre::Metalcore, DrumVoice::Kick) => "real-kick-F045.wav",
        (Genre::Metalcore, DrumVoice::Snare) => "real-01RR-snare-R2A-R.wav",
        (Genre::Metalcore, DrumVoice::ClosedHat) => "real-02R3.UF-HiHat-M.wav",
        (Genre::Metalcore, DrumVoice::Crash) => "real-01TP19THCM.wav",

        (Genre::PostHardcore, DrumVoice::Kick) => "real-kick-F024.wav",
        (Genre::PostHardcore, DrumVoice::Snare) => "real-02LI-snare-R2M.wav",
        (Genre::PostHardcore, DrumVoice::ClosedHat) => "real-01L2.UF-HiHat-M.wav",
        (Genre::PostHardcore, DrumVoice::Crash) => "real-01TP20CHIM.wav",

        (Genre::Jazz, DrumVoice::Kick) => "real-kick-F049.wav",
        (Genre::Jazz, DrumVoice::Snare) => "real-soft-snare.wav",
        (Genre::Jazz, DrumVoice::ClosedHat) => "real-01PD.UF-HiHat-M.wav",
        (Genre::Jazz, DrumVoice::Ride) => "real-long-ride.wav",
        (Genre::Jazz, DrumVoice::Crash) => "pearlkit-ridecrash.wav",

        _ => return None,
    };
    Some(source)
}

/// The voices a genre replaces.
pub fn genre_voices(genre: Genre) -> Vec<DrumVoice> {
    DrumVoice::ALL
        .into_iter()
        .filter(|voice| genre_override(genre, *voice).is_some())
        .collect()
}

/// Resolves the sound source for a voice: a genre override wins over the kit.
pub fn resolve_sample(kit: &DrumKit, genre: Option<Genre>, voice: DrumVoice) -> &'static str {
    genre
        .and_then(|genre| genre_override(genre, voice))
        .unwrap_or_else(|| kit.sample(voice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_kit_exists() {
        let kit = find_kit(DEFAULT_KIT).unwrap();
        assert_eq!(kit.id, KITS[0].id);
        assert_eq!(kit.sample(DrumVoice::TomLow), "pearlkit-lowtom1.wav");
        assert!(find_kit("tr-808").is_none());
    }

    #[test]
    fn test_kit_ids_unique() {
        for (i, kit) in KITS.iter().enumerate() {
            assert!(KITS[i + 1..].iter().all(|other| other.id != kit.id));
        }
    }

    #[test]
    fn test_kits_for_genre() {
        let jazz: Vec<&str> = kits_for_genre(Genre::Jazz).map(|kit| kit.id).collect();
        assert_eq!(jazz, vec!["pearl", "real-jazz"]);
        assert!(kits_for_genre(Genre::Metal).all(|kit| kit.suits(Genre::Metal)));
    }

    #[test]
    fn test_genre_overrides() {
        assert_eq!(
            genre_voices(Genre::Metal),
            vec![
                DrumVoice::Kick,
                DrumVoice::Snare,
                DrumVoice::ClosedHat,
                DrumVoice::Crash
            ]
        );
        assert!(genre_voices(Genre::Jazz).contains(&DrumVoice::Ride));
        assert_eq!(genre_override(Genre::Metal, DrumVoice::TomLow), None);
    }

    #[test]
    fn test_resolve_sample_prefers_genre() {
        let kit = find_kit("classic").unwrap();
        assert_eq!(resolve_sample(kit, None, DrumVoice::Kick), "BDRUM13.wav");
        assert_eq!(
            resolve_sample(kit, Some(Genre::Metal), DrumVoice::Kick),
            "real-kick-F036.wav"
        );
        assert_eq!(
            resolve_sample(kit, Some(Genre::Metal), DrumVoice::Ride),
            "RIDE.wav"
        );
    }
}
