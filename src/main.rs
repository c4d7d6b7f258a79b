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
use std::{error::Error, fs, path::PathBuf, thread, time::Duration};

use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xmiplay::{audio, config, engine::Engine, midi, voc, xmidi};

/// How often the play commands check whether playback has finished.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An XMIDI music and voice player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available MIDI output devices.
    MidiDevices {},
    /// Lists the available audio output devices.
    Devices {},
    /// Counts the tracks in an XMIDI file.
    Tracks {
        /// The path to the XMIDI file.
        path: PathBuf,
    },
    /// Describes the sound block of a Creative Voice file.
    Voc {
        /// The path to the voice file.
        path: PathBuf,
    },
    /// Plays a music track until it ends.
    Play {
        /// The path to the engine config.
        config_path: PathBuf,
        /// The name of the music file, resolved against the search paths.
        name: String,
        /// The track within the file.
        #[arg(short, long, default_value_t = 0)]
        track: u16,
        /// The volume percent.
        #[arg(short, long, default_value_t = 100)]
        volume: u16,
    },
    /// Plays a voice file until it ends.
    Voice {
        /// The path to the engine config.
        config_path: PathBuf,
        /// The name of the voice file, resolved against the search paths.
        name: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
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
        Commands::Tracks { path } => {
            let data = fs::read(&path)?;
            println!("{}: {} track(s)", path.display(), xmidi::count_tracks(&data)?);
        }
        Commands::Voc { path } => {
            let data = fs::read(&path)?;
            let block = voc::decode(&data)?;
            println!("{}:", path.display());
            println!("- codec: {}", block.codec);
            println!("- sample rate: {}Hz", block.sample_rate);
            println!("- samples: {}", block.sample_count());
        }
        Commands::Play {
            config_path,
            name,
            track,
            volume,
        } => {
            let config = config::Engine::deserialize(&config_path)?;
            let mut engine = Engine::new(&config)?;
            engine.load_music(&name)?;
            if engine.play_music(track, volume)?.is_none() {
                return Err("no free stream slot".into());
            }

            // Without a clock thread, drive the sequencer from here.
            let period = config.clock().period();
            while engine.is_music_playing() {
                if engine.is_clock_running() {
                    thread::sleep(POLL_INTERVAL);
                } else {
                    engine.tick()?;
                    spin_sleep::sleep(period);
                }
            }
            engine.shutdown();
        }
        Commands::Voice { config_path, name } => {
            let mut engine = Engine::new(&config::Engine::deserialize(&config_path)?)?;
            let voice = engine.load_voice(&name)?;
            if !engine.play_voice(&voice, u8::MAX) {
                return Err("unable to play voice".into());
            }

            while engine.is_voice_playing() {
                thread::sleep(POLL_INTERVAL);
            }
            engine.shutdown();
        }
    }

    Ok(())
}
