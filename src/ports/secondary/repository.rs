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

use crate::domain::{DeviceSummary, RepositoryError};
use async_trait::async_trait;
use std::path::Path;

/// Secondary port - File repository abstraction
///
/// This interface abstracts file-based storage of raw smartctl captures and
/// device summaries. Saved captures can be replayed as virtual devices.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Save a raw smartctl capture
    ///
    /// # Arguments
    /// * `output` - Captured smartctl output
    /// * `path` - File path to save to
    ///
    /// # Returns
    /// * `Ok(())` - Capture successfully saved
    /// * `Err(RepositoryError)` - Error occurred during save
    async fn save_capture(&self, output: &str, path: &Path) -> Result<(), RepositoryError>;

    /// Save a device summary in JSON format
    async fn save_json(&self, summary: &DeviceSummary, path: &Path) -> Result<(), RepositoryError>;

    /// Save a device summary in TOML format
    async fn save_toml(&self, summary: &DeviceSummary, path: &Path) -> Result<(), RepositoryError>;

    /// Load a device summary from a JSON file
    ///
    /// # Arguments
    /// * `path` - File path to load from
    ///
    /// # Returns
    /// * `Ok(DeviceSummary)` - Loaded summary
    /// * `Err(RepositoryError)` - Error occurred during load
    async fn load_json(&self, path: &Path) -> Result<DeviceSummary, RepositoryError>;

    /// Check if file exists
    async fn file_exists(&self, path: &Path) -> Result<bool, RepositoryError>;
}
