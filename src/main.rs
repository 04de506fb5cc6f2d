// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use polysampler::config::Sampler;
use polysampler::dispatch::{Routing, TriggerSender, VoiceDispatcher};
use polysampler::midi::{self, MidiDecoder, TraceFilter, TraceSink};
use polysampler::poller::MidiPoller;
use polysampler::samples::{
    generated_silence, CompletionEngine, NoteOrigin, SampleLoader, DEFAULT_FILTER,
    DEFAULT_STAGE_LIMIT,
};
use polysampler::session::Session;
use tracing::info;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=MIDI polyphonic sampler

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/polysampler
ExecStart=/usr/local/bin/polysampler start "$POLYSAMPLER_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=polysampler.service
"#;

/// How often a running session is checked for a closed MIDI input.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI-triggered polyphonic sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the sampler with the given config and plays until interrupted.
    Start {
        /// The path to the sampler config.
        config_path: String,
    },
    /// Completes a sample folder and reports where each note comes from.
    Complete {
        /// The folder of single note samples.
        folder: String,
        /// The wildcard filter for sample files.
        #[arg(short, long, default_value = DEFAULT_FILTER)]
        filter: String,
        /// The number of completion stages.
        #[arg(short, long, default_value_t = DEFAULT_STAGE_LIMIT)]
        stage_limit: usize,
        /// Prints the report as YAML.
        #[arg(long)]
        yaml: bool,
    },
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Prints every event received from a MIDI device until interrupted.
    Monitor {
        /// The MIDI device name to watch.
        device_name: String,
        /// Counts clock and active sensing messages instead of printing them.
        #[arg(long)]
        count_clock_and_sense: bool,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

/// Prints trace lines to stdout.
struct StdoutSink;

impl TraceSink for StdoutSink {
    fn trace(&self, line: &str) {
        println!("{}", line);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let config = Sampler::deserialize(&PathBuf::from(config_path))?;
            let mut session = Session::start(&config)?;
            info!("Sampler started, press Ctrl-C to stop");

            loop {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        result?;
                        info!("Interrupted");
                        break;
                    }
                    _ = tokio::time::sleep(SESSION_CHECK_INTERVAL) => {
                        if !session.is_running() {
                            info!("MIDI input closed");
                            break;
                        }
                    }
                }
            }
            session.stop();
        }
        Commands::Complete {
            folder,
            filter,
            stage_limit,
            yaml,
        } => {
            let supplied = SampleLoader::new(&filter)
                .load_folder(&PathBuf::from(&folder))?
                .into_iter()
                .map(|loaded| (loaded.note, loaded.buffer))
                .collect();
            let (_, report) = CompletionEngine::new(stage_limit)
                .complete(supplied, Arc::new(generated_silence()))?;

            if yaml {
                print!("{}", serde_yml::to_string(&report)?);
                return Ok(());
            }

            println!("Notes (folder: {}):", folder);
            for note in report.notes.iter() {
                match note.origin {
                    NoteOrigin::Recorded => println!("- {} ({}): recorded", note.name, note.note),
                    NoteOrigin::Shifted { source, stage } => println!(
                        "- {} ({}): shifted from {} in stage {}",
                        note.name, note.note, source, stage
                    ),
                    NoteOrigin::Silence => println!("- {} ({}): silence", note.name, note.note),
                }
            }
            println!(
                "\nRecorded: {}, shifted: {}, silent: {}, stages: {:?}",
                report.recorded, report.shifted, report.silent, report.stages
            );
        }
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
        Commands::Monitor {
            device_name,
            count_clock_and_sense,
        } => {
            let device = midi::get_device(&device_name)?;
            let (word_tx, word_rx) = crossbeam_channel::unbounded();
            device.watch_events(word_tx)?;

            // No modules, so nothing is dispatched.
            let (engine, _commands) = TriggerSender::bounded(1);
            let mut poller = MidiPoller::start(
                word_rx,
                MidiDecoder::new(TraceFilter {
                    count_clock_and_sense,
                    ..TraceFilter::default()
                }),
                VoiceDispatcher::new(Routing::ChannelPerModule, 0),
                Arc::new(engine),
                Arc::new(StdoutSink),
                Duration::from_millis(1),
            );
            println!("Watching {}, press Ctrl-C to stop.", device);
            tokio::signal::ctrl_c().await?;

            device.stop_watch_events();
            if let Some(decoder) = poller.stop() {
                println!(
                    "Notes: {}, clocks: {}, active sensing: {}",
                    decoder.total_note_count(),
                    decoder.clock_count(),
                    decoder.active_sense_count()
                );
            }
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
