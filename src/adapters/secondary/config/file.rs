/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! TOML configuration file adapter

use crate::domain::{ConfigError, SmartctlSettings};
use crate::ports::ConfigurationProvider;
use async_trait::async_trait;
use log::{debug, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Reads [`SmartctlSettings`] from a TOML file
///
/// ```toml
/// smartctl_binary = "/usr/sbin/smartctl"
/// default_options = ["-n", "standby"]
///
/// [formats]
/// ata = "text"
///
/// [device_options]
/// "/dev/sdb" = "-d sat,12"
/// "/dev/sdc::usbjmicron" = "-T permissive"
/// ```
pub struct FileConfigurationProvider {
    path: PathBuf,
    /// Missing file means defaults instead of an error
    optional: bool,
}

impl FileConfigurationProvider {
    /// Provider for a file that must exist
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            optional: false,
        }
    }

    /// Provider falling back to defaults when the file does not exist
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            optional: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigurationProvider for FileConfigurationProvider {
    async fn get_settings(&self) -> Result<SmartctlSettings, ConfigError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if self.optional && e.kind() == ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", self.path.display());
                return Ok(SmartctlSettings::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let settings = SmartctlSettings::from_toml_str(&content)?;
        info!("Loaded configuration from {}", self.path.display());
        Ok(settings)
    }
}
