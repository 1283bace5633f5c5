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

//! Text notation for exchanging patterns with tab editors.
//!
//! ```text
//! \title "Basic Rock"
//! \tempo 120
//! \track "Drums" channel 10
//! \clef percussion
//! 0 [36:110 42:100] 480
//! 480 [42:100] 480
//! ```
//!
//! Each note line is `<time> [<note>:<velocity>[>] ...] <duration>`, with times in
//! ticks of 1920 per bar.

use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::pattern::{DrumVoice, Genre, Pattern, Step, DEFAULT_BPM};

/// Ticks in one bar of four quarter notes.
const TICKS_PER_BAR: f64 = 1920.0;

/// The step count given to imported patterns.
pub const IMPORT_STEP_COUNT: usize = 16;

const DEFAULT_TITLE: &str = "Imported Pattern";

#[derive(Debug, thiserror::Error)]
pub enum NotationError {
    #[error("no title, tempo or note lines found")]
    Unrecognized,
}

/// The tick length of one step for a pattern of the given length.
pub fn step_ticks(step_count: usize) -> f64 {
    TICKS_PER_BAR / (step_count.max(1) as f64 / 4.0)
}

/// Writes a pattern as text notation. Only steps with at least one active
/// voice produce a line.
pub fn export(pattern: &Pattern) -> String {
    let duration = step_ticks(pattern.step_count);
    let mut out = String::new();

    let _ = writeln!(out, "\\title \"{}\"", pattern.name);
    let _ = writeln!(out, "\\tempo {}", pattern.bpm);
    let _ = writeln!(out, "\\track \"Drums\" channel 10");
    let _ = writeln!(out, "\\clef percussion");

    for index in 0..pattern.step_count {
        let notes: Vec<String> = pattern
            .voices
            .iter()
            .filter_map(|(voice, row)| {
                let step = row.get(index).filter(|step| step.active)?;
                let accent = if step.accent { ">" } else { "" };
                Some(format!("{}:{}{}", voice.note(), step.velocity, accent))
            })
            .collect();

        if !notes.is_empty() {
            let time = index as f64 * duration;
            let _ = writeln!(out, "{} [{}] {}", time, notes.join(" "), duration);
        }
    }

    out
}

/// Parses text notation into a pattern of [`IMPORT_STEP_COUNT`] steps.
///
/// Lines that cannot be understood are skipped. Text without a single title,
/// tempo or note line is rejected.
pub fn import(text: &str) -> Result<Pattern, NotationError> {
    let mut title = DEFAULT_TITLE.to_string();
    let mut bpm = DEFAULT_BPM;
    let mut recognized = false;
    let mut pattern = Pattern::new("", "", Genre::Metal, bpm, IMPORT_STEP_COUNT);
    pattern.fills = vec![false; IMPORT_STEP_COUNT];
    for voice in DrumVoice::ALL {
        pattern
            .voices
            .insert(voice, vec![Step::off(); IMPORT_STEP_COUNT]);
    }

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("\\title") {
            recognized = true;
            if let Some(name) = rest.split('"').nth(1) {
                title = name.to_string();
            }
        } else if let Some(rest) = line.strip_prefix("\\tempo") {
            recognized = true;
            if let Some(tempo) = rest
                .split_whitespace()
                .next()
                .and_then(|t| t.parse::<f64>().ok())
                .filter(|t| t.is_finite())
            {
                bpm = tempo;
            }
        } else if let Some((index, notes)) = parse_note_line(line) {
            recognized = true;
            for (voice, step) in notes {
                if let Some(row) = pattern.voices.get_mut(&voice) {
                    row[index] = step;
                }
            }
        } else if !line.is_empty() && !line.starts_with('\\') {
            debug!(line, "Skipping unrecognized notation line");
        }
    }

    if !recognized {
        return Err(NotationError::Unrecognized);
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    pattern.id = format!("imported-{}", millis);
    pattern.name = title;
    pattern.bpm = bpm;
    Ok(pattern.normalized())
}

/// Parses `<time> [notes] <duration>` into a step index and its hits.
fn parse_note_line(line: &str) -> Option<(usize, Vec<(DrumVoice, Step)>)> {
    let open = line.find('[')?;
    let close = open + line[open..].find(']')?;

    let time: f64 = line[..open].trim().parse().ok()?;
    let duration = line[close + 1..]
        .split_whitespace()
        .next()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .unwrap_or_else(|| step_ticks(IMPORT_STEP_COUNT));
    if time < 0.0 {
        return None;
    }
    let index = (time / duration).round() as usize % IMPORT_STEP_COUNT;

    let notes = line[open + 1..close]
        .split_whitespace()
        .filter_map(parse_note)
        .collect();
    Some((index, notes))
}

fn parse_note(token: &str) -> Option<(DrumVoice, Step)> {
    let (note, velocity) = match token.split_once(':') {
        Some((note, velocity)) => (note, Some(velocity)),
        None => (token, None),
    };
    let voice = DrumVoice::from_note(note.parse().ok()?)?;

    let accent = velocity.is_some_and(|v| v.contains('>'));
    let velocity = velocity
        .map(|v| v.trim_end_matches('>'))
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(100);

    Some((
        voice,
        Step {
            accent,
            ..Step::hit(velocity)
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn active_pairs(pattern: &Pattern) -> BTreeSet<(DrumVoice, usize)> {
        pattern
            .voices
            .iter()
            .flat_map(|(voice, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, step)| step.active)
                    .map(move |(index, _)| (*voice, index))
            })
            .collect()
    }

    #[test]
    fn test_export_format() {
        let mut pattern = Pattern::new("rock", "Basic Rock", Genre::Metal, 120.0, 16)
            .with_hits(DrumVoice::Kick, &[0, 8], 110)
            .with_hits(DrumVoice::ClosedHat, &[0, 2], 90);
        pattern.voices.get_mut(&DrumVoice::Kick).unwrap()[8].accent = true;

        let text = export(&pattern);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "\\title \"Basic Rock\"",
                "\\tempo 120",
                "\\track \"Drums\" channel 10",
                "\\clef percussion",
                "0 [36:110 42:90] 480",
                "960 [42:90] 480",
                "3840 [36:110>] 480",
            ]
        );
    }

    #[test]
    fn test_export_uneven_step_count() {
        let pattern =
            Pattern::new("odd", "Odd", Genre::Metal, 140.0, 12).with_hits(DrumVoice::Snare, &[1], 100);
        let text = export(&pattern);
        assert!(text.contains("640 [38:100] 640"));
    }

    #[test]
    fn test_round_trip() {
        let mut pattern = Pattern::new("all", "All Voices", Genre::Jazz, 150.0, 16);
        for (i, voice) in DrumVoice::ALL.into_iter().enumerate() {
            pattern = pattern.with_hits(voice, &[i, (i + 5) % 16], 80 + i as u8);
        }

        let imported = import(&export(&pattern)).unwrap();
        assert_eq!(imported.name, "All Voices");
        assert_eq!(imported.bpm, 150.0);
        assert_eq!(imported.step_count, IMPORT_STEP_COUNT);
        assert_eq!(active_pairs(&imported), active_pairs(&pattern));
        assert_eq!(imported.step(DrumVoice::Ride, 5).unwrap().velocity, 85);
    }

    #[test]
    fn test_round_trip_folds_long_patterns() {
        let pattern = Pattern::new("long", "Long", Genre::Metal, 120.0, 32).with_hits(
            DrumVoice::Kick,
            &[0, 20],
            100,
        );
        let imported = import(&export(&pattern)).unwrap();
        let expected: BTreeSet<_> = [(DrumVoice::Kick, 0), (DrumVoice::Kick, 4)].into();
        assert_eq!(active_pairs(&imported), expected);
    }

    #[test]
    fn test_import_skips_malformed_lines() {
        let text = "\\title \"Broken\"\n\
                    \\tempo fast\n\
                    garbage line\n\
                    0 [36:100 99:100 x:1 38] 480\n\
                    abc [42:100] 480\n\
                    960 [46:70>\n\
                    1920 [49:0] 480\n";
        let pattern = import(text).unwrap();
        assert_eq!(pattern.name, "Broken");
        assert_eq!(pattern.bpm, DEFAULT_BPM);

        let expected: BTreeSet<_> = [
            (DrumVoice::Kick, 0),
            (DrumVoice::Snare, 0),
            (DrumVoice::Crash, 4),
        ]
        .into();
        assert_eq!(active_pairs(&pattern), expected);
        assert_eq!(pattern.step(DrumVoice::Snare, 0).unwrap().velocity, 100);
        assert_eq!(pattern.step(DrumVoice::Crash, 4).unwrap().velocity, 100);
        for voice in DrumVoice::ALL {
            assert_eq!(pattern.voices[&voice].len(), IMPORT_STEP_COUNT);
        }
    }

    #[test]
    fn test_import_non_finite_tempo() {
        for tempo in ["NaN", "inf", "-inf"] {
            let text = format!("\\title \"X\"\n\\tempo {}\n0 [36:100] 480\n", tempo);
            let pattern = import(&text).unwrap();
            assert_eq!(pattern.bpm, DEFAULT_BPM);
            assert!(export(&pattern).contains("\\tempo 120"));
        }
    }

    #[test]
    fn test_import_accent() {
        let pattern = import("0 [38:120>] 480").unwrap();
        let step = pattern.step(DrumVoice::Snare, 0).unwrap();
        assert!(step.accent);
        assert_eq!(step.velocity, 120);
        assert_eq!(pattern.name, DEFAULT_TITLE);
    }

    #[test]
    fn test_import_unrecognized() {
        assert!(import("").is_err());
        assert!(import("hello\nworld").is_err());
    }
}
