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

use crate::domain::{FormatPreferences, SmartctlExitStatus, SmartctlSettings, SmartctlVersion};
use crate::ports::{CommandExecutor, DeviceOptionResolver, SystemCommand};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Predicate telling whether a device basename is an optical drive
pub type OpticalPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Result of one smartctl invocation
///
/// `stdout` is kept even when `error` is set; callers still look for
/// diagnostics in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmartctlRun {
    pub stdout: String,
    pub error: Option<String>,
}

/// Everything a device needs to run and interpret smartctl
///
/// Shared by all devices; holds no per-device state.
pub struct SmartctlContext {
    /// Command executor for spawning smartctl
    executor: Arc<dyn CommandExecutor>,
    settings: SmartctlSettings,
    option_resolver: Arc<dyn DeviceOptionResolver>,
    is_optical: OpticalPredicate,
}

impl SmartctlContext {
    /// Create a context; device options and the optical predicate come from `settings`
    pub fn new(executor: Arc<dyn CommandExecutor>, settings: SmartctlSettings) -> Self {
        let option_resolver: Arc<dyn DeviceOptionResolver> = Arc::new(settings.clone());
        let optical_settings = settings.clone();
        Self {
            executor,
            settings,
            option_resolver,
            is_optical: Arc::new(move |base: &str| optical_settings.is_optical(base)),
        }
    }

    /// Replace the source of per-device options
    pub fn with_option_resolver(mut self, resolver: Arc<dyn DeviceOptionResolver>) -> Self {
        self.option_resolver = resolver;
        self
    }

    /// Replace the optical-device predicate
    pub fn with_optical_predicate(mut self, predicate: OpticalPredicate) -> Self {
        self.is_optical = predicate;
        self
    }

    pub fn settings(&self) -> &SmartctlSettings {
        &self.settings
    }

    pub fn formats(&self) -> &FormatPreferences {
        &self.settings.formats
    }

    pub fn device_options(&self, device: &str, type_arg: &str) -> Vec<String> {
        self.option_resolver.device_options(device, type_arg)
    }

    pub fn is_optical(&self, device_base: &str) -> bool {
        (self.is_optical)(device_base)
    }

    fn command(&self, args: Vec<String>) -> SystemCommand {
        // Text output is only stable in the C locale.
        SystemCommand::new(&self.settings.smartctl_binary)
            .with_args(args)
            .env_vars(vec![("LC_ALL", "C")])
            .timeout(Duration::from_secs(self.settings.command_timeout_secs))
    }

    /// Run smartctl with the given arguments
    ///
    /// Only exit bits 0 and 1, spawn failures and timeouts count as errors.
    pub async fn execute(&self, args: Vec<String>) -> SmartctlRun {
        let command = self.command(args);
        debug!("Executing: {}", command.display());

        match self.executor.execute(&command).await {
            Ok(output) => {
                let status = SmartctlExitStatus::new(output.exit_code);
                if status.is_fatal() {
                    if !output.stderr.trim().is_empty() {
                        debug!("smartctl stderr: {}", output.stderr.trim());
                    }
                    SmartctlRun {
                        stdout: output.stdout,
                        error: Some(status.to_string()),
                    }
                } else {
                    if status.code() != Some(0) {
                        warn!("{}", status);
                    }
                    SmartctlRun {
                        stdout: output.stdout,
                        error: None,
                    }
                }
            }
            Err(e) => SmartctlRun {
                stdout: String::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Version of the configured smartctl binary, if it runs
    pub async fn detect_version(&self) -> Option<SmartctlVersion> {
        let run = self.execute(vec!["--version".to_string()]).await;
        if let Some(error) = &run.error {
            warn!("Cannot determine smartctl version: {}", error);
        }
        SmartctlVersion::parse(&run.stdout)
    }
}
