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

use crate::domain::{ConfigError, SmartctlSettings};
use async_trait::async_trait;

/// Secondary port - Configuration provider abstraction
///
/// This interface abstracts how configuration is loaded and managed,
/// allowing for different sources (files, in-memory defaults, etc.)
#[async_trait]
pub trait ConfigurationProvider: Send + Sync {
    /// Get smartctl settings
    ///
    /// # Returns
    /// * `Ok(SmartctlSettings)` - Settings, defaults filled in
    /// * `Err(ConfigError)` - Error loading configuration
    async fn get_settings(&self) -> Result<SmartctlSettings, ConfigError>;
}

/// Secondary port - per-device extra smartctl arguments
///
/// Called during every fetch, so implementations must not block.
pub trait DeviceOptionResolver: Send + Sync {
    /// Extra arguments configured for `device` when addressed with `type_arg`
    fn device_options(&self, device: &str, type_arg: &str) -> Vec<String>;
}

impl DeviceOptionResolver for SmartctlSettings {
    fn device_options(&self, device: &str, type_arg: &str) -> Vec<String> {
        self.device_options_for(device, type_arg)
    }
}
