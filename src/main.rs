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
use std::{error::Error, path::PathBuf};

use clap::{crate_version, Parser, Subcommand};
use padloop::{config, controller::Controller, midi};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=pad looper

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/padloop
ExecStart=/usr/local/bin/padloop start "$PADLOOP_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=padloop.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI looper for pad controllers."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available MIDI input/output devices.
    MidiDevices {},
    /// Validates a looper config and prints the resolved settings.
    Check {
        /// The path to the looper config.
        config_path: String,
    },
    /// Start will start the looper.
    Start {
        /// The path to the looper config.
        config_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
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
        Commands::Check { config_path } => {
            let config = config::Looper::deserialize(&PathBuf::from(&config_path))?;

            println!("Config {} is valid:", config_path);
            println!("- Input device: {}", config.device());
            println!(
                "- Output device: {} (channel {})",
                config.output_device(),
                config.output_channel()?.as_int() + 1
            );
            println!("- Loop length: {}", config.loop_length());
            println!("- Max events: {}", config.max_events()?);
            println!("- Feedback timeout: {:?}", config.feedback_timeout()?);
            println!("- Thru: {}", config.thru());
            println!("- Follow transport: {}", config.follow_transport());
            println!("- Pads: {}", config.pads()?.len());
            match config.pad_feedback()? {
                Some(feedback) => println!(
                    "- Pad feedback: channel {}, velocity {}",
                    feedback.channel.as_int() + 1,
                    feedback.velocity.as_int()
                ),
                None => println!("- Pad feedback: off"),
            }
            match config.clock() {
                config::Clock::External => println!("- Clock: external"),
                config::Clock::Internal { bpm } => println!("- Clock: internal at {} bpm", bpm),
            }
        }
        Commands::Start { config_path } => {
            let config = config::Looper::deserialize(&PathBuf::from(&config_path))?;
            let input = midi::get_device(config.device())?;
            let output = if config.output_device() == config.device() {
                input.clone()
            } else {
                midi::get_device(config.output_device())?
            };

            let mut controller = Controller::new(&config, input, output)?;

            let shutdown = controller.shutdown_handle();
            tokio::spawn(async move {
                match signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Interrupted, stopping.");
                        shutdown.notify_one();
                    }
                    Err(e) => error!(err = %e, "Unable to listen for interrupts."),
                }
            });

            controller.join().await?;
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
