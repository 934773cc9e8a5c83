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

//! Dependency injection container for device inspection services

use crate::adapters::{FileConfigurationProvider, FileSystemRepository, UnixCommandExecutor};
use crate::domain::{ConfigError, InspectionService, SmartctlContext, SmartctlSettings};
use crate::ports::{CommandExecutor, ConfigurationProvider, FileRepository};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the dependency injection container
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    /// TOML settings file; built-in defaults when `None`
    pub config_path: Option<PathBuf>,
    /// Overrides `smartctl_binary` from the settings
    pub smartctl_binary: Option<String>,
    /// Overrides `command_timeout_secs` from the settings
    pub command_timeout: Option<Duration>,
    /// Ask smartctl for its version and fall back to text output if it predates JSON
    pub detect_version: bool,
}

/// Simple configuration provider implementation
pub struct SimpleConfigurationProvider {
    settings: SmartctlSettings,
}

impl SimpleConfigurationProvider {
    pub fn new(settings: SmartctlSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl ConfigurationProvider for SimpleConfigurationProvider {
    async fn get_settings(&self) -> Result<SmartctlSettings, ConfigError> {
        Ok(self.settings.clone())
    }
}

/// Dependency injection container
pub struct ServiceContainer {
    config: ContainerConfig,
}

impl ServiceContainer {
    /// Create a new service container with configuration
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    /// Create the configuration provider
    pub fn create_configuration_provider(&self) -> Arc<dyn ConfigurationProvider> {
        match &self.config.config_path {
            Some(path) => Arc::new(FileConfigurationProvider::new(path.clone())),
            None => Arc::new(SimpleConfigurationProvider::new(SmartctlSettings::default())),
        }
    }

    /// Settings with the container's overrides applied
    pub async fn load_settings(&self) -> Result<SmartctlSettings, ConfigError> {
        let mut settings = self.create_configuration_provider().get_settings().await?;
        if let Some(binary) = &self.config.smartctl_binary {
            settings.smartctl_binary = binary.clone();
        }
        if let Some(timeout) = self.config.command_timeout {
            settings.command_timeout_secs = timeout.as_secs().max(1);
        }
        Ok(settings)
    }

    /// Create the command executor
    pub fn create_command_executor(&self, settings: &SmartctlSettings) -> Arc<dyn CommandExecutor> {
        Arc::new(UnixCommandExecutor::new(
            Duration::from_secs(settings.command_timeout_secs),
            settings.retry_count,
        ))
    }

    /// Create the file repository for captures and summaries
    pub fn create_file_repository(&self) -> Arc<dyn FileRepository> {
        Arc::new(FileSystemRepository::new())
    }

    /// Create the smartctl context shared by all devices
    pub async fn create_smartctl_context(&self) -> Result<Arc<SmartctlContext>, ConfigError> {
        let mut settings = self.load_settings().await?;
        let executor = self.create_command_executor(&settings);

        if self.config.detect_version {
            let probe = SmartctlContext::new(Arc::clone(&executor), settings.clone());
            match probe.detect_version().await {
                Some(version) => {
                    info!("Using smartctl {}", version);
                    settings.formats = settings.formats.for_version(Some(version));
                }
                None => warn!("Cannot determine the version of {}", settings.smartctl_binary),
            }
        }

        Ok(Arc::new(SmartctlContext::new(executor, settings)))
    }

    /// Create the complete inspection service
    pub async fn create_inspection_service(&self) -> Result<Arc<InspectionService>, ConfigError> {
        let context = self.create_smartctl_context().await?;
        Ok(Arc::new(InspectionService::new(context)))
    }

    /// Get platform name for logging
    pub fn get_platform_name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "macOS"
        } else if cfg!(target_os = "linux") {
            "Linux"
        } else {
            "Unknown"
        }
    }

    /// Required programs that cannot be found
    pub async fn validate_dependencies(&self) -> Result<Vec<String>, ConfigError> {
        let settings = self.load_settings().await?;
        let executor = self.create_command_executor(&settings);
        let binary = settings.smartctl_binary;

        // An explicit path is checked directly, a bare name through PATH.
        let found = if binary.contains('/') {
            tokio::fs::try_exists(&binary).await.unwrap_or(false)
        } else {
            matches!(executor.get_command_path(&binary).await, Ok(Some(_)))
        };
        Ok(if found { Vec::new() } else { vec![binary] })
    }

    /// Check if the process may open raw block devices
    pub async fn check_privileges(&self) -> bool {
        let executor = self.create_command_executor(&SmartctlSettings::default());
        executor.has_elevated_privileges().await.unwrap_or(false)
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new(ContainerConfig::default())
    }
}

/// Builder pattern for container configuration
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
        }
    }

    /// Read settings from a TOML file
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// Use a different smartctl binary
    pub fn smartctl_binary(mut self, binary: &str) -> Self {
        self.config.smartctl_binary = Some(binary.to_string());
        self
    }

    /// Set command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = Some(timeout);
        self
    }

    /// Probe the smartctl version before first use
    pub fn detect_version(mut self, detect: bool) -> Self {
        self.config.detect_version = detect;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ContainerConfig {
        self.config
    }
}

impl Default for ContainerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
