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

//! SMART Inspection Library
//!
//! This library runs `smartctl` against storage devices and turns its text or
//! JSON output into a typed device model, using a Ports and Adapters
//! (Hexagonal) architecture for maintainability and testability.
//!
//! # Architecture
//!
//! - **Domain**: device model, command lines, parsers, the per-device orchestrator
//! - **Ports**: Interfaces for external interactions
//! - **Adapters**: process execution, configuration files, capture storage
//!
//! # Usage
//!
//! ```rust,no_run
//! use smart_inspect::{DeviceInspectionService, InspectionRequest, ServiceContainer};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ServiceContainer::default().create_inspection_service().await?;
//!
//!     let summary = service.inspect(&InspectionRequest::new("/dev/sda")).await?;
//!     println!("{}: {} ({})", summary.device, summary.detected_type, summary.smart_status);
//!     Ok(())
//! }
//! ```
//!
//! Long-lived callers keep a [`StorageDevice`] instead, subscribe to its
//! change events and drive the fetches themselves:
//!
//! ```rust,no_run
//! use smart_inspect::{ServiceContainer, StorageDevice};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = ServiceContainer::default().create_smartctl_context().await?;
//!     let mut device = StorageDevice::new("/dev/nvme0");
//!     let mut events = device.subscribe();
//!
//!     device.fetch_basic_data_and_parse(&context).await?;
//!     device.fetch_full_data_and_parse(&context).await?;
//!     while let Ok(event) = events.try_recv() {
//!         println!("{} changed ({:?})", event.device, event.reason);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod container;
pub mod domain;
pub mod ports;

pub use adapters::{FileConfigurationProvider, FileSystemRepository, UnixCommandExecutor};
pub use container::{
    ContainerConfig, ContainerConfigBuilder, ServiceContainer, SimpleConfigurationProvider,
};
pub use domain::{
    ChangeReason, DetectedType, DeviceError, DeviceEvent, DeviceSummary, InspectionService,
    ParseStatus, SelfTestSupportStatus, SharedStorageDevice, SmartStatus, SmartctlContext,
    SmartctlSettings, StorageDevice,
};
pub use ports::{
    CommandExecutor, CommandOutput, ConfigurationProvider, DeviceInspectionService,
    DeviceOptionResolver, FileRepository, InspectionRequest, SystemCommand,
};
