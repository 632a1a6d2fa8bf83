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

use crate::config::{CONFIG_FILE_NAME, PacedConfig};
use crate::error::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ConfigOutput {
    config_file: String,
    cooldown_ms: u64,
    cooldown_source: String,
    hold: String,
    close_delay_ms: Option<u64>,
}

pub struct ConfigCommand<'a> {
    config: &'a PacedConfig,
    config_dir: &'a Path,
}

impl<'a> ConfigCommand<'a> {
    pub fn new(config: &'a PacedConfig, config_dir: &'a Path) -> Result<Self> {
        Ok(Self { config, config_dir })
    }

    pub fn execute(&self, cooldown_override: Option<&str>, json: bool) -> Result<()> {
        let cooldown = self.config.resolve_cooldown(cooldown_override)?;
        let hold = match self.config.mutex.hold_policy()? {
            crate::locking::HoldPolicy::Exclusive => "exclusive".to_string(),
            crate::locking::HoldPolicy::Lease(lease) => format!("lease ({}ms)", lease.as_millis()),
        };

        let output = ConfigOutput {
            config_file: self.config_dir.join(CONFIG_FILE_NAME).display().to_string(),
            cooldown_ms: u64::try_from(cooldown.value.as_millis()).unwrap_or(u64::MAX),
            cooldown_source: cooldown.source.to_string(),
            hold,
            close_delay_ms: self
                .config
                .cache
                .close_delay()
                .map(|delay| u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)),
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!("Config file:  {}", output.config_file);
        println!(
            "Cooldown:     {}ms ({})",
            output.cooldown_ms, output.cooldown_source
        );
        println!("Hold policy:  {}", output.hold);
        match output.close_delay_ms {
            Some(delay) => println!("Close delay:  {delay}ms"),
            None => println!("Close delay:  off"),
        }
        Ok(())
    }
}
