/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use gridflow::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as YAML, with every key
    /// resolved to the value a runtime would use.
    Show,
    /// Write the effective configuration to a YAML file.
    Save {
        /// The file to write.
        path: PathBuf,
    },
}

impl ConfigCommand {
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let resolved = config.resolved();
        match self {
            ConfigCommand::Show => {
                print!("{}", resolved.to_yaml_string()?);
            }
            ConfigCommand::Save { path } => {
                resolved
                    .to_yaml(&path)
                    .with_context(|| format!("saving configuration to {}", path.display()))?;
                println!("wrote {}", path.display());
            }
        }
        Ok(())
    }
}
