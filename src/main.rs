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
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use backbeat::audio::offline::{OfflineHost, CHANNELS};
use backbeat::audio::{self, wav};
use backbeat::config::{self, EngineConfig};
use backbeat::kit::{self, KITS};
use backbeat::notation;
use backbeat::pattern::Genre;
use backbeat::sequencer::{bounce, Sequencer};
use backbeat::transport::Transport;
use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How long to wait for a kit to finish loading before giving up.
const KIT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Silence rendered after the last pass so cymbals can ring out.
const RENDER_TAIL: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A step-sequencer drum machine."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available drum kits.
    Kits {
        /// Only list kits suited to this genre.
        #[arg(short, long)]
        genre: Option<String>,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a pattern file through the audio interface.
    Play {
        /// The path to the pattern file.
        pattern: PathBuf,
        /// The path to the engine config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The audio device to play through, if not set by the config.
        #[arg(short, long)]
        device: Option<String>,
        /// The kit to play with.
        #[arg(short, long)]
        kit: Option<String>,
        /// The genre whose sample overrides apply, or "none".
        #[arg(short, long)]
        genre: Option<String>,
        /// Overrides the pattern's tempo.
        #[arg(short, long)]
        bpm: Option<f64>,
        /// Stops after this many passes through the pattern. Plays until
        /// killed if not set.
        #[arg(short = 'n', long)]
        bars: Option<u32>,
    },
    /// Renders a pattern file to a WAV file.
    Render {
        /// The path to the pattern file.
        pattern: PathBuf,
        /// The WAV file to write.
        output: PathBuf,
        /// The path to the engine config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The kit to render with.
        #[arg(short, long)]
        kit: Option<String>,
        /// The genre whose sample overrides apply, or "none".
        #[arg(short, long)]
        genre: Option<String>,
        /// Passes through the pattern to render.
        #[arg(short = 'n', long, default_value_t = 1)]
        bars: u32,
    },
    /// Prints a pattern file as text notation.
    Export {
        /// The path to the pattern file.
        pattern: PathBuf,
    },
    /// Reads text notation and prints the pattern as YAML.
    Import {
        /// The path to the notation file.
        file: PathBuf,
    },
}

/// Builds the engine config from an optional file plus command line overrides.
fn engine_config(
    path: Option<&Path>,
    device: &str,
    kit: Option<String>,
    genre: Option<String>,
) -> Result<EngineConfig, Box<dyn Error>> {
    let mut config = match path {
        Some(path) => config::load_engine_config(path)?,
        None => EngineConfig::new(device),
    };
    if let Some(kit) = kit {
        config = config.with_kit(&kit);
    }
    if let Some(genre) = genre {
        let genre = if genre.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(Genre::from_str(&genre)?)
        };
        config = config.with_genre(genre);
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Kits { genre } => {
            let genre = genre.map(|genre| Genre::from_str(&genre)).transpose()?;
            let kits: Vec<_> = match genre {
                Some(genre) => kit::kits_for_genre(genre).collect(),
                None => KITS.iter().collect(),
            };

            println!("Kits (count: {}):", kits.len());
            for kit in kits {
                let genres: Vec<&str> = kit.genres.iter().map(|genre| genre.name()).collect();
                println!(
                    "- {} ({}): {} [{}]",
                    kit.id,
                    kit.name,
                    kit.description,
                    genres.join(", ")
                );
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            pattern,
            config,
            device,
            kit,
            genre,
            bpm,
            bars,
        } => {
            let config = engine_config(
                config.as_deref(),
                device.as_deref().unwrap_or("default"),
                kit,
                genre,
            )?;
            let host = audio::get_host(&config)?;
            let mut sequencer = Sequencer::new(host, &config)?;
            if !sequencer.wait_for_kit(KIT_LOAD_TIMEOUT) {
                return Err("timed out loading kit".into());
            }
            let pattern = sequencer.load_pattern_file(&pattern)?;
            let bpm = match bpm {
                Some(bpm) => sequencer.set_tempo(bpm),
                None => sequencer.tempo(),
            };

            let transport = Transport::new(sequencer, config.lookahead()?);
            info!(pattern = %pattern.name, bpm, "Starting playback");
            if !transport.play() {
                return Err("unable to start playback".into());
            }
            match bars {
                Some(bars) => {
                    let seconds = f64::from(bars) * pattern.step_count as f64 * 15.0 / bpm;
                    thread::sleep(Duration::from_secs_f64(seconds));
                    transport.stop();
                }
                None => loop {
                    thread::sleep(Duration::from_secs(1));
                },
            }
        }
        Commands::Render {
            pattern,
            output,
            config,
            kit,
            genre,
            bars,
        } => {
            let config = engine_config(config.as_deref(), "offline", kit, genre)?;
            let host = Arc::new(OfflineHost::new("offline", config.sample_rate()));
            let mut sequencer = Sequencer::new(host.clone(), &config)?;
            if !sequencer.wait_for_kit(KIT_LOAD_TIMEOUT) {
                return Err("timed out loading kit".into());
            }
            sequencer.load_pattern_file(&pattern)?;

            let samples = bounce(&mut sequencer, &host, bars, RENDER_TAIL);
            wav::write_wav(&output, &samples, CHANNELS, config.sample_rate())?;
            println!(
                "Rendered {} pass(es) to {}.",
                bars,
                output.display()
            );
        }
        Commands::Export { pattern } => {
            let pattern = config::load_pattern(&pattern)?;
            print!("{}", notation::export(&pattern));
        }
        Commands::Import { file } => {
            let pattern = notation::import(&fs::read_to_string(&file)?)?;
            print!("{}", serde_yml::to_string(&pattern)?);
        }
    }

    Ok(())
}
