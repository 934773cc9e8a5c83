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

use super::smartctl_context::SmartctlContext;
use super::storage_device::StorageDevice;
use crate::domain::{DeviceError, DeviceSummary};
use crate::ports::{DeviceInspectionService, InspectionRequest};
use async_trait::async_trait;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

/// Domain service that implements device inspection
///
/// Creates a [`StorageDevice`] per request and drives it through the
/// basic and, if asked, full fetch.
pub struct InspectionService {
    /// Shared smartctl runner and settings
    context: Arc<SmartctlContext>,
}

impl InspectionService {
    /// Create a new inspection service
    ///
    /// # Arguments
    /// * `context` - smartctl context shared by every device
    pub fn new(context: Arc<SmartctlContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &SmartctlContext {
        &self.context
    }

    fn device_for(request: &InspectionRequest) -> StorageDevice {
        let mut device = if request.type_arg.is_empty() {
            StorageDevice::new(&request.device)
        } else {
            StorageDevice::with_type(&request.device, &request.type_arg)
        };
        device.set_extra_arguments(request.extra_args.clone());
        device.set_is_manually_added(true);
        device
    }

    async fn fetch(context: &SmartctlContext, request: &InspectionRequest) -> Result<StorageDevice, DeviceError> {
        let mut device = Self::device_for(request);
        device.fetch_basic_data_and_parse(context).await?;
        if request.full {
            device.fetch_full_data_and_parse(context).await?;
        }
        info!(
            "{}: {} ({} data)",
            device.device_with_type(),
            device.detected_type(),
            device.parse_status()
        );
        Ok(device)
    }

    /// Inspect a device and keep it, raw captures included
    pub async fn inspect_device(&self, request: &InspectionRequest) -> Result<StorageDevice, DeviceError> {
        Self::fetch(&self.context, request).await
    }

    /// Load a capture file into a virtual device
    pub async fn replay_device(&self, file: &Path) -> Result<StorageDevice, DeviceError> {
        let mut device = StorageDevice::new_virtual(file);
        device.load_virtual(&self.context).await?;
        Ok(device)
    }

    /// Inspect several devices concurrently, one task per device
    ///
    /// Results come back in request order.
    pub async fn inspect_many(
        &self,
        requests: Vec<InspectionRequest>,
    ) -> Vec<(InspectionRequest, Result<StorageDevice, DeviceError>)> {
        let tasks: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let context = Arc::clone(&self.context);
                let task_request = request.clone();
                let handle = tokio::spawn(async move { Self::fetch(&context, &task_request).await });
                (request, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (request, handle) in tasks {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Inspection of {} failed: {}", request.device, e);
                    Err(DeviceError::ExecutionError(e.to_string()))
                }
            };
            results.push((request, result));
        }
        results
    }
}

#[async_trait]
impl DeviceInspectionService for InspectionService {
    async fn inspect(&self, request: &InspectionRequest) -> Result<DeviceSummary, DeviceError> {
        Ok(self.inspect_device(request).await?.summary())
    }

    async fn replay(&self, file: &Path) -> Result<DeviceSummary, DeviceError> {
        Ok(self.replay_device(file).await?.summary())
    }

    async fn set_smart_enabled(&self, request: &InspectionRequest, enable: bool) -> Result<(), DeviceError> {
        let mut device = Self::device_for(request);
        device.set_smart_enabled(&self.context, enable).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::testing::ScriptedExecutor;
    use crate::domain::{CommandError, DetectedType, ParseStatus, SmartctlSettings};
    use crate::ports::{CommandExecutor, CommandOutput, SystemCommand};

    const SAT_SSD: &str = r#"{
        "json_format_version": [1, 0],
        "smartctl": {"version": [7, 3], "exit_status": 0},
        "device": {"name": "/dev/sda", "type": "sat", "protocol": "ATA"},
        "model_name": "Samsung SSD 860 EVO 500GB",
        "serial_number": "S3Z1NB0K000000",
        "smart_support": {"available": true, "enabled": true},
        "smart_status": {"passed": true},
        "ata_smart_attributes": {"revision": 1, "table": []}
    }"#;

    fn service(executor: &Arc<ScriptedExecutor>) -> InspectionService {
        InspectionService::new(Arc::new(SmartctlContext::new(
            executor.clone(),
            SmartctlSettings::default(),
        )))
    }

    #[tokio::test]
    async fn test_inspect_basic_then_full() {
        let executor = Arc::new(ScriptedExecutor::repeating(ScriptedExecutor::output(SAT_SSD, 0), 2));
        let service = service(&executor);
        let request = InspectionRequest {
            full: true,
            ..InspectionRequest::new("/dev/sda")
        };

        let summary = service.inspect(&request).await.unwrap();
        assert_eq!(summary.detected_type, DetectedType::AtaSsd);
        assert_eq!(summary.parse_status, ParseStatus::Full);
        assert_eq!(summary.health_passed, Some(true));
        assert_eq!(summary.serial.as_deref(), Some("S3Z1NB0K000000"));
        assert_eq!(executor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_inspect_passes_type_and_extra_args() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedExecutor::output(SAT_SSD, 0)]));
        let service = service(&executor);
        let request = InspectionRequest {
            type_arg: "sat".to_string(),
            extra_args: vec!["-T".to_string(), "permissive".to_string()],
            ..InspectionRequest::new("/dev/sda")
        };

        let device = service.inspect_device(&request).await.unwrap();
        assert!(device.is_manually_added());
        assert_eq!(
            executor.calls()[0].args[..4],
            ["-d", "sat", "-T", "permissive"].map(String::from)
        );
    }

    #[tokio::test]
    async fn test_inspect_many_keeps_order() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedExecutor::output(SAT_SSD, 0)]));
        let service = service(&executor);
        let requests = vec![InspectionRequest::new("/dev/sda"), InspectionRequest::new("/dev/sdb")];

        let results = service.inspect_many(requests).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.device, "/dev/sda");
        assert_eq!(results[1].0.device, "/dev/sdb");
        // Only one scripted answer: exactly one device succeeds.
        assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 1);
    }

    /// Panics while running smartctl for `/dev/sdb`
    struct CrashingExecutor;

    #[async_trait]
    impl CommandExecutor for CrashingExecutor {
        async fn execute(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError> {
            if command.args.last().map(String::as_str) == Some("/dev/sdb") {
                panic!("executor crashed");
            }
            Ok(ScriptedExecutor::output(SAT_SSD, 0))
        }

        async fn get_command_path(&self, _command_name: &str) -> Result<Option<String>, CommandError> {
            Ok(None)
        }

        async fn has_elevated_privileges(&self) -> Result<bool, CommandError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_inspect_many_reports_crashed_task() {
        let service = InspectionService::new(Arc::new(SmartctlContext::new(
            Arc::new(CrashingExecutor),
            SmartctlSettings::default(),
        )));
        let requests = vec![
            InspectionRequest::new("/dev/sda"),
            InspectionRequest::new("/dev/sdb"),
            InspectionRequest::new("/dev/sdc"),
        ];

        let results = service.inspect_many(requests).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0.device, "/dev/sdb");
        assert!(matches!(results[1].1, Err(DeviceError::ExecutionError(_))));
        assert!(results[2].1.is_ok());
    }

    #[tokio::test]
    async fn test_replay_file() {
        let temp = assert_fs::NamedTempFile::new("sda.json").unwrap();
        std::fs::write(temp.path(), SAT_SSD).unwrap();
        let executor = Arc::new(ScriptedExecutor::new(vec![]));
        let service = service(&executor);

        let summary = service.replay(temp.path()).await.unwrap();
        assert!(summary.is_virtual);
        assert_eq!(summary.parse_status, ParseStatus::Full);
        assert!(!summary.smart_switch_supported);
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_set_smart_enabled() {
        let executor = Arc::new(ScriptedExecutor::new(vec![ScriptedExecutor::output("SMART Enabled.\n", 0)]));
        let service = service(&executor);
        service
            .set_smart_enabled(&InspectionRequest::new("/dev/sda"), true)
            .await
            .unwrap();
        assert_eq!(executor.call_count(), 1);
    }
}
