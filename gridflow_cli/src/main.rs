/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod commands;

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use gridflow::Config;

use crate::commands::config::ConfigCommand;
use crate::commands::demo::DemoCommand;

#[derive(Parser)]
#[command(name = "gridflow")]
struct Cli {
    /// YAML configuration file, applied on top of the defaults and
    /// overridden by GRIDFLOW_* environment variables.
    #[arg(long, global = true, env = "GRIDFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[clap(about = r#"Inspect the effective configuration"#)]
    #[command(subcommand)]
    Config(ConfigCommand),

    #[clap(about = r#"Run a demo pipeline over synthetic terrain"#)]
    #[command(subcommand)]
    Demo(DemoCommand),
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Cli::parse();
    let config = Config::load(args.config.as_deref())?;
    gridflow::telemetry::initialize_logging_with_config(&config);

    let result = match args.command {
        Command::Config(command) => command.run(&config),
        Command::Demo(command) => command.run(&config).await,
    };
    if let Err(err) = &result {
        tracing::error!("gridflow failed: {:#}", err);
    }
    result
}
