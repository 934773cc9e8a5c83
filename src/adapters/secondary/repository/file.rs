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

//! File-based repository for smartctl captures and device summaries

use crate::domain::{DeviceSummary, RepositoryError};
use crate::ports::FileRepository;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;

/// File system repository
pub struct FileSystemRepository;

impl FileSystemRepository {
    /// Create a new file system repository
    pub fn new() -> Self {
        Self
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<(), RepositoryError> {
        let write_error = |e: std::io::Error| RepositoryError::WriteFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_error)?;
        }
        fs::write(path, contents).await.map_err(write_error)
    }
}

impl Default for FileSystemRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileRepository for FileSystemRepository {
    async fn save_capture(&self, output: &str, path: &Path) -> Result<(), RepositoryError> {
        self.write(path, output).await
    }

    async fn save_json(&self, summary: &DeviceSummary, path: &Path) -> Result<(), RepositoryError> {
        let json_string = serde_json::to_string_pretty(summary).map_err(|e| {
            RepositoryError::SerializationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.write(path, &json_string).await
    }

    async fn save_toml(&self, summary: &DeviceSummary, path: &Path) -> Result<(), RepositoryError> {
        let toml_string = toml::to_string_pretty(summary).map_err(|e| {
            RepositoryError::SerializationFailed(format!("TOML serialization failed: {}", e))
        })?;
        self.write(path, &toml_string).await
    }

    async fn load_json(&self, path: &Path) -> Result<DeviceSummary, RepositoryError> {
        let json_string = fs::read_to_string(path)
            .await
            .map_err(|e| RepositoryError::ReadFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        serde_json::from_str(&json_string).map_err(|e| {
            RepositoryError::SerializationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    async fn file_exists(&self, path: &Path) -> Result<bool, RepositoryError> {
        Ok(fs::try_exists(path).await.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DetectedType, ParseStatus, PropertyValue, SelfTestSupportStatus, SmartStatus,
        StorageProperty,
    };
    use assert_fs::prelude::*;
    use tempfile::tempdir;

    fn create_test_summary() -> DeviceSummary {
        DeviceSummary {
            device: "/dev/sda".to_string(),
            is_virtual: false,
            detected_type: DetectedType::AtaSsd,
            parse_status: ParseStatus::Basic,
            smart_status: SmartStatus::Enabled,
            self_test_support: SelfTestSupportStatus::Unknown,
            smart_switch_supported: true,
            health_passed: Some(true),
            model: Some("Samsung SSD 860 EVO 500GB".to_string()),
            family: None,
            serial: Some("S3Z1NB0K000000".to_string()),
            size: Some("500 GB".to_string()),
            properties: vec![
                StorageProperty::new("model_name", PropertyValue::String("Samsung SSD 860 EVO 500GB".into())),
                StorageProperty::new("rotation_rate", PropertyValue::Integer(0)),
                StorageProperty::new("smart_support/enabled", PropertyValue::Bool(true)),
            ],
        }
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("sda.json");
        let repository = FileSystemRepository::new();
        let summary = create_test_summary();

        repository.save_json(&summary, &path).await.unwrap();
        assert!(repository.file_exists(&path).await.unwrap());

        let loaded = repository.load_json(&path).await.unwrap();
        assert_eq!(loaded.serial, summary.serial);
        assert_eq!(loaded.detected_type, DetectedType::AtaSsd);
        assert_eq!(loaded.properties, summary.properties);
    }

    #[tokio::test]
    async fn test_save_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sda.toml");
        let repository = FileSystemRepository::new();

        repository.save_toml(&create_test_summary(), &path).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("detected_type = \"ata_ssd\""));
        assert!(content.contains("[[properties]]"));
    }

    #[tokio::test]
    async fn test_save_capture() {
        let temp = assert_fs::TempDir::new().unwrap();
        let repository = FileSystemRepository::new();
        let output = "smartctl 7.3 2022-02-28 r5338\n";

        repository
            .save_capture(output, &temp.path().join("captures/sda.txt"))
            .await
            .unwrap();
        temp.child("captures/sda.txt").assert(output);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let repository = FileSystemRepository::new();
        let path = Path::new("/nonexistent/sda.json");
        assert!(!repository.file_exists(path).await.unwrap());
        assert!(matches!(
            repository.load_json(path).await,
            Err(RepositoryError::ReadFailed { .. })
        ));
    }
}
