// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use paced::commands::config::ConfigCommand;
use paced::commands::probe::{ProbeCommand, ProbeOptions};
use paced::config::{PacedConfig, default_config_dir};
use paced::error::{Result, format_error_chain, format_error_with_color, get_exit_code};
use paced::logging;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "paced")]
#[command(author, version, about = "Paced mutual exclusion diagnostics", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory containing paced.toml (defaults to the platform config dir)
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hammer one mutex from several threads and report admission spacing
    Probe {
        /// Number of concurrent worker threads
        #[arg(short, long, default_value_t = 4)]
        workers: usize,

        /// Admissions requested by each worker
        #[arg(short, long, default_value_t = 2)]
        calls: usize,

        /// Time each admission holds the slot, in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 10)]
        hold_ms: u64,

        /// Cooldown override in milliseconds, or 'off'
        #[arg(long, value_name = "VALUE")]
        cooldown: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved configuration
    Config {
        /// Cooldown override in milliseconds, or 'off'
        #[arg(long, value_name = "VALUE")]
        cooldown: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    logging::setup_logger(cli.verbose);

    let result: Result<()> = (|| {
        let config_dir = cli
            .config_dir
            .clone()
            .or_else(default_config_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let config = PacedConfig::load(&config_dir)?;

        match cli.command {
            Commands::Probe {
                workers,
                calls,
                hold_ms,
                cooldown,
                json,
            } => {
                let command = ProbeCommand::new(&config)?;
                command.execute(&ProbeOptions {
                    workers,
                    calls,
                    hold: Duration::from_millis(hold_ms),
                    cooldown,
                    json,
                })
            }
            Commands::Config { cooldown, json } => {
                let command = ConfigCommand::new(&config, &config_dir)?;
                command.execute(cooldown.as_deref(), json)
            }
        }
    })();

    if let Err(e) = result {
        if std::io::stderr().is_terminal() {
            eprint!("{}", format_error_with_color(&e, true));
        } else {
            eprintln!("{}", format_error_chain(&e));
        }
        std::process::exit(get_exit_code(&e));
    }
}
