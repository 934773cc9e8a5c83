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

use super::parsers::SmartctlParser;
use super::smartctl::SmartctlVersion;
use super::{ConfigError, DetectedType, OutputFormat, ParserType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Preferred smartctl output format per parser type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatPreferences {
    pub basic: OutputFormat,
    pub ata: OutputFormat,
    pub nvme: OutputFormat,
    pub scsi: OutputFormat,
}

impl Default for FormatPreferences {
    fn default() -> Self {
        Self {
            basic: OutputFormat::Json,
            ata: OutputFormat::Json,
            nvme: OutputFormat::Json,
            scsi: OutputFormat::Json,
        }
    }
}

impl FormatPreferences {
    pub fn format_for(&self, parser_type: ParserType) -> OutputFormat {
        match parser_type {
            ParserType::Basic => self.basic,
            ParserType::Ata => self.ata,
            ParserType::Nvme => self.nvme,
            ParserType::Scsi => self.scsi,
        }
    }

    /// Downgrade everything to text when the installed smartctl predates JSON
    pub fn for_version(self, version: Option<SmartctlVersion>) -> Self {
        match version {
            Some(v) if !v.supports_json() => Self {
                basic: OutputFormat::Text,
                ata: OutputFormat::Text,
                nvme: OutputFormat::Text,
                scsi: OutputFormat::Text,
            },
            _ => self,
        }
    }

    /// Parser to use for a detected type and output format
    ///
    /// Falls back to the basic parser when the family has no grammar for `format`.
    pub fn parser_type_for(&self, detected: DetectedType, format: OutputFormat) -> ParserType {
        let family = ParserType::for_detected_type(detected);
        if SmartctlParser::is_supported(family, format) {
            family
        } else {
            ParserType::Basic
        }
    }
}

/// Settings loaded from the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartctlSettings {
    /// smartctl program name or path
    pub smartctl_binary: String,
    /// Arguments passed to every invocation, before device options
    pub default_options: Vec<String>,
    pub command_timeout_secs: u64,
    /// Retries when smartctl cannot be spawned
    pub retry_count: u32,
    pub formats: FormatPreferences,
    /// Basename prefix of optical devices; `None` disables optical detection
    pub optical_prefix: Option<String>,
    /// Pattern for saved output files; `{serial}`, `{model}` and `{date}` are replaced
    pub save_filename_format: String,
    /// Extra arguments per device, keyed by `/dev/sdX` or `/dev/sdX::type`
    pub device_options: BTreeMap<String, String>,
}

impl Default for SmartctlSettings {
    fn default() -> Self {
        Self {
            smartctl_binary: "smartctl".to_string(),
            default_options: Vec::new(),
            command_timeout_secs: 30,
            retry_count: 2,
            formats: FormatPreferences::default(),
            optical_prefix: if cfg!(target_os = "linux") {
                Some("sr".to_string())
            } else {
                None
            },
            save_filename_format: "{serial}_{model}_{date}".to_string(),
            device_options: BTreeMap::new(),
        }
    }
}

impl SmartctlSettings {
    /// Parse settings from TOML; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Configured extra arguments for a device
    ///
    /// A `device::type` entry takes precedence over a plain `device` entry.
    pub fn device_options_for(&self, device: &str, type_arg: &str) -> Vec<String> {
        let typed_key = format!("{device}::{type_arg}");
        let typed_entry = if type_arg.is_empty() {
            None
        } else {
            self.device_options.get(&typed_key)
        };
        let entry = typed_entry.or_else(|| self.device_options.get(device));

        entry
            .map(|options| options.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Default optical-device predicate over a device basename
    pub fn is_optical(&self, device_base: &str) -> bool {
        match &self.optical_prefix {
            Some(prefix) if !prefix.is_empty() => device_base.starts_with(prefix.as_str()),
            _ => false,
        }
    }
}
