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

use crate::domain::{DeviceError, DeviceSummary};
use async_trait::async_trait;
use std::path::Path;

/// What to inspect and how
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectionRequest {
    /// Device path, e.g. `/dev/sda`
    pub device: String,
    /// Explicit interface type (`-d`), empty to let smartctl decide
    pub type_arg: String,
    /// Extra smartctl arguments for this device
    pub extra_args: Vec<String>,
    /// Fetch attributes and logs too, not just identity
    pub full: bool,
}

impl InspectionRequest {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            ..Self::default()
        }
    }
}

/// Primary port - Main interface offered by the inspection domain
///
/// This is what external systems (CLI, GUI, library consumers) use to interact
/// with the device inspection functionality.
#[async_trait]
pub trait DeviceInspectionService: Send + Sync {
    /// Run smartctl against a device and summarize the result
    ///
    /// # Arguments
    /// * `request` - Device and fetch options
    ///
    /// # Returns
    /// * `Ok(DeviceSummary)` - Snapshot after the last successful fetch
    /// * `Err(DeviceError)` - Execution or parsing failed
    async fn inspect(&self, request: &InspectionRequest) -> Result<DeviceSummary, DeviceError>;

    /// Load a previously captured smartctl output file
    ///
    /// # Arguments
    /// * `file` - Path of the captured output
    async fn replay(&self, file: &Path) -> Result<DeviceSummary, DeviceError>;

    /// Switch SMART on or off
    ///
    /// # Arguments
    /// * `request` - Device to address
    /// * `enable` - Desired state
    async fn set_smart_enabled(&self, request: &InspectionRequest, enable: bool) -> Result<(), DeviceError>;
}
