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

//! End-to-end runs of the public API against canned smartctl output

use assert_fs::prelude::*;
use async_trait::async_trait;
use smart_inspect::domain::CommandError;
use smart_inspect::{
    CommandExecutor, CommandOutput, ConfigurationProvider, DetectedType, DeviceInspectionService,
    FileConfigurationProvider, FileRepository, FileSystemRepository, InspectionRequest,
    InspectionService, ParseStatus, SelfTestSupportStatus, SmartStatus, SmartctlContext,
    StorageDevice, SystemCommand,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const SSD_BASIC: &str = r#"{
    "json_format_version": [1, 0],
    "smartctl": {"version": [7, 3], "exit_status": 0},
    "device": {"name": "/dev/sda", "type": "sat", "protocol": "ATA"},
    "model_name": "Samsung SSD 860 EVO 500GB",
    "serial_number": "S3Z1NB0K000000",
    "user_capacity": {"blocks": 976773168, "bytes": 500107862016},
    "smart_support": {"available": true, "enabled": true},
    "smart_status": {"passed": true}
}"#;

const SSD_FULL: &str = r#"{
    "json_format_version": [1, 0],
    "smartctl": {"version": [7, 3], "exit_status": 0},
    "device": {"name": "/dev/sda", "type": "sat", "protocol": "ATA"},
    "model_name": "Samsung SSD 860 EVO 500GB",
    "serial_number": "S3Z1NB0K000000",
    "user_capacity": {"blocks": 976773168, "bytes": 500107862016},
    "smart_support": {"available": true, "enabled": true},
    "smart_status": {"passed": true},
    "ata_smart_attributes": {"revision": 1, "table": [
        {"id": 9, "name": "Power_On_Hours", "value": 95, "raw": {"value": 21000, "string": "21000"}}
    ]},
    "ata_smart_self_test_log": {"standard": {"revision": 1, "count": 1, "table": [
        {"type": {"value": 1, "string": "Short offline"}, "lifetime_hours": 20990}
    ]}}
}"#;

/// Hands out fixture outputs in order, remembering what was asked
struct FixtureExecutor {
    outputs: Mutex<VecDeque<&'static str>>,
    seen: Mutex<Vec<SystemCommand>>,
}

impl FixtureExecutor {
    fn new(outputs: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(outputs.iter().copied().collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<SystemCommand> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for FixtureExecutor {
    async fn execute(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError> {
        self.seen.lock().unwrap().push(command.clone());
        let stdout = self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CommandError::ExecutionFailed("out of fixtures".to_string()))?;
        Ok(CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        })
    }

    async fn get_command_path(&self, command_name: &str) -> Result<Option<String>, CommandError> {
        Ok(Some(format!("/usr/sbin/{command_name}")))
    }

    async fn has_elevated_privileges(&self) -> Result<bool, CommandError> {
        Ok(true)
    }
}

#[tokio::test]
async fn inspect_capture_and_replay() {
    let temp = assert_fs::TempDir::new().unwrap();
    let executor = FixtureExecutor::new(&[SSD_BASIC, SSD_FULL]);
    let context = Arc::new(SmartctlContext::new(executor.clone(), Default::default()));
    let service = InspectionService::new(context.clone());

    let request = InspectionRequest {
        full: true,
        ..InspectionRequest::new("/dev/sda")
    };
    let device = service.inspect_device(&request).await.unwrap();
    assert_eq!(device.detected_type(), DetectedType::AtaSsd);
    assert_eq!(device.parse_status(), ParseStatus::Full);
    assert_eq!(device.smart_status(), SmartStatus::Enabled);
    assert_eq!(device.self_test_support_status(), SelfTestSupportStatus::Supported);
    assert_eq!(executor.seen().len(), 2);

    let filename = device.save_filename("{serial}_{model}");
    assert_eq!(filename, "S3Z1NB0K000000_Samsung_SSD_860_EVO_500GB.json");
    let capture = temp.child(&filename);
    FileSystemRepository::new()
        .save_capture(device.output_for_saving(), capture.path())
        .await
        .unwrap();
    capture.assert(SSD_FULL);

    let replayed = service.replay(capture.path()).await.unwrap();
    assert!(replayed.is_virtual);
    assert_eq!(replayed.parse_status, ParseStatus::Full);
    assert_eq!(replayed.serial.as_deref(), Some("S3Z1NB0K000000"));
    assert_eq!(replayed.self_test_support, SelfTestSupportStatus::Supported);
    assert_eq!(executor.seen().len(), 2);
}

#[tokio::test]
async fn configured_options_reach_smartctl() {
    let temp = assert_fs::TempDir::new().unwrap();
    let config = temp.child("smart_inspect.toml");
    config
        .write_str(
            r#"
smartctl_binary = "/opt/sbin/smartctl"
default_options = ["-n", "standby"]

[device_options]
"/dev/sda" = "-d sat"
"#,
        )
        .unwrap();

    let settings = FileConfigurationProvider::new(config.path())
        .get_settings()
        .await
        .unwrap();
    let executor = FixtureExecutor::new(&[SSD_BASIC]);
    let context = SmartctlContext::new(executor.clone(), settings);

    let mut device = StorageDevice::new("/dev/sda");
    device.fetch_basic_data_and_parse(&context).await.unwrap();

    let seen = executor.seen();
    assert_eq!(seen[0].program, "/opt/sbin/smartctl");
    assert_eq!(
        seen[0].args,
        ["-n", "standby", "-d", "sat", "--info", "--health", "--capabilities", "--json=o", "/dev/sda"]
    );
    assert_eq!(device.model_name(), Some("Samsung SSD 860 EVO 500GB"));
}
