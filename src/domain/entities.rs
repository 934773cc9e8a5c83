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

use super::properties::StorageProperty;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Device family / interface classification
///
/// `Unknown` and `NeedsExplicitType` are transient; every other variant is
/// terminal for the purpose of building smartctl commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedType {
    /// Nothing is known yet
    Unknown,
    /// smartctl asked for an explicit `-d` type
    NeedsExplicitType,
    /// SCSI device, or something we can only talk to as SCSI
    BasicScsi,
    /// Optical drive
    #[serde(rename = "cddvd")]
    CdDvd,
    /// RAID controller smartctl cannot pass through
    UnsupportedRaid,
    /// (S)ATA, rotation not known yet
    AtaAny,
    /// Rotational (S)ATA drive
    AtaHdd,
    /// Solid state (S)ATA drive
    AtaSsd,
    /// NVMe drive
    Nvme,
}

impl DetectedType {
    const ALL: [DetectedType; 9] = [
        DetectedType::Unknown,
        DetectedType::NeedsExplicitType,
        DetectedType::BasicScsi,
        DetectedType::CdDvd,
        DetectedType::UnsupportedRaid,
        DetectedType::AtaAny,
        DetectedType::AtaHdd,
        DetectedType::AtaSsd,
        DetectedType::Nvme,
    ];

    /// Stable identifier, as written by the text parser and config files
    pub fn storable_name(&self) -> &'static str {
        match self {
            DetectedType::Unknown => "unknown",
            DetectedType::NeedsExplicitType => "needs_explicit_type",
            DetectedType::BasicScsi => "basic_scsi",
            DetectedType::CdDvd => "cddvd",
            DetectedType::UnsupportedRaid => "unsupported_raid",
            DetectedType::AtaAny => "ata_any",
            DetectedType::AtaHdd => "ata_hdd",
            DetectedType::AtaSsd => "ata_ssd",
            DetectedType::Nvme => "nvme",
        }
    }

    /// Look up a type by its storable name, falling back to `default`
    pub fn from_storable_name(name: &str, default: DetectedType) -> DetectedType {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.storable_name() == name)
            .unwrap_or(default)
    }

    pub fn displayable_name(&self) -> &'static str {
        match self {
            DetectedType::Unknown => "Unknown",
            DetectedType::NeedsExplicitType => "Needs Explicit Type",
            DetectedType::BasicScsi => "Basic SCSI",
            DetectedType::CdDvd => "CD/DVD",
            DetectedType::UnsupportedRaid => "Unsupported RAID",
            DetectedType::AtaAny => "(S)ATA",
            DetectedType::AtaHdd => "(S)ATA HDD",
            DetectedType::AtaSsd => "(S)ATA SSD",
            DetectedType::Nvme => "NVMe",
        }
    }

    /// Whether the classification is still incomplete
    pub fn is_transient(&self) -> bool {
        matches!(self, DetectedType::Unknown | DetectedType::NeedsExplicitType)
    }

    /// Any of the (S)ATA variants
    pub fn is_ata(&self) -> bool {
        matches!(
            self,
            DetectedType::AtaAny | DetectedType::AtaHdd | DetectedType::AtaSsd
        )
    }
}

impl Default for DetectedType {
    fn default() -> Self {
        DetectedType::Unknown
    }
}

impl fmt::Display for DetectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.displayable_name())
    }
}

/// How much of the fact store the current fetch cycle populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Nothing parsed
    None,
    /// Identity and capabilities only
    Basic,
    /// Family-specific data (attributes, logs) as well
    Full,
}

impl Default for ParseStatus {
    fn default() -> Self {
        ParseStatus::None
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseStatus::None => "None",
            ParseStatus::Basic => "Basic",
            ParseStatus::Full => "Full",
        };
        f.write_str(name)
    }
}

/// SMART enabled / disabled / unsupported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartStatus {
    Enabled,
    Disabled,
    Unsupported,
}

impl SmartStatus {
    /// Combine the parsed "enabled" and "supported" flags
    ///
    /// An unknown state is reported optimistically as `Disabled` whenever
    /// support is not ruled out, so the user gets a chance to enable it.
    pub fn from_flags(enabled: Option<bool>, supported: Option<bool>) -> SmartStatus {
        match (enabled, supported) {
            (Some(true), _) => SmartStatus::Enabled,
            (Some(false), Some(false)) => SmartStatus::Unsupported,
            (Some(false), _) => SmartStatus::Disabled,
            (None, Some(true)) => SmartStatus::Disabled,
            (None, Some(false)) | (None, None) => SmartStatus::Unsupported,
        }
    }

    pub fn displayable_name(&self) -> &'static str {
        match self {
            SmartStatus::Enabled => "Enabled",
            SmartStatus::Disabled => "Disabled",
            SmartStatus::Unsupported => "Unsupported",
        }
    }
}

impl fmt::Display for SmartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.displayable_name())
    }
}

/// Whether the drive can run self-tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfTestSupportStatus {
    Unknown,
    Supported,
    Unsupported,
}

impl fmt::Display for SelfTestSupportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelfTestSupportStatus::Unknown => "Unknown",
            SelfTestSupportStatus::Supported => "Supported",
            SelfTestSupportStatus::Unsupported => "Unsupported",
        };
        f.write_str(name)
    }
}

/// smartctl output encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Legacy human-readable text
    Text,
    /// `--json` structured output
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// Parser capability level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserType {
    /// Identity and capabilities, any device family
    Basic,
    /// (S)ATA attributes and logs
    Ata,
    /// NVMe health and logs
    Nvme,
    /// SCSI / optical / RAID
    Scsi,
}

impl ParserType {
    /// Family parser matching a detected type
    pub fn for_detected_type(detected: DetectedType) -> ParserType {
        match detected {
            DetectedType::Unknown | DetectedType::NeedsExplicitType => ParserType::Basic,
            DetectedType::AtaAny | DetectedType::AtaHdd | DetectedType::AtaSsd => ParserType::Ata,
            DetectedType::Nvme => ParserType::Nvme,
            DetectedType::BasicScsi | DetectedType::CdDvd | DetectedType::UnsupportedRaid => {
                ParserType::Scsi
            }
        }
    }
}

/// Which of the two captures a fetch produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    /// Identity, health and capabilities
    Basic,
    /// Everything the device family supports
    Full,
}

/// What a [`StorageDevice`](crate::domain::StorageDevice) talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceIdentity {
    /// A device path or handle, e.g. `/dev/sda`
    Real { device: String },
    /// A previously captured smartctl output file
    Virtual { file: PathBuf },
}

impl DeviceIdentity {
    pub fn is_virtual(&self) -> bool {
        matches!(self, DeviceIdentity::Virtual { .. })
    }
}

/// Why a change notification was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// A parse replaced the fact store
    Parsed,
    /// The test-active flag flipped
    TestActivity,
}

/// Change notification sent to observers of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Device path, or virtual file name
    pub device: String,
    /// State generation after the change
    pub generation: u64,
    pub reason: ChangeReason,
}

/// Read-only snapshot of a device, suitable for display or serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device: String,
    pub is_virtual: bool,
    pub detected_type: DetectedType,
    pub parse_status: ParseStatus,
    pub smart_status: SmartStatus,
    pub self_test_support: SelfTestSupportStatus,
    pub smart_switch_supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub properties: Vec<StorageProperty>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_status_precedence_table() {
        use SmartStatus::*;
        let cases = [
            (Some(true), Some(true), Enabled),
            (Some(true), Some(false), Enabled),
            (Some(true), None, Enabled),
            (Some(false), Some(true), Disabled),
            (Some(false), Some(false), Unsupported),
            (Some(false), None, Disabled),
            (None, Some(true), Disabled),
            (None, Some(false), Unsupported),
            (None, None, Unsupported),
        ];
        for (enabled, supported, expected) in cases {
            assert_eq!(
                SmartStatus::from_flags(enabled, supported),
                expected,
                "enabled={enabled:?} supported={supported:?}"
            );
        }
    }

    #[test]
    fn test_storable_names() {
        assert_eq!(
            DetectedType::from_storable_name("ata_any", DetectedType::BasicScsi),
            DetectedType::AtaAny
        );
        assert_eq!(
            DetectedType::from_storable_name("cddvd", DetectedType::BasicScsi),
            DetectedType::CdDvd
        );
        assert_eq!(
            DetectedType::from_storable_name("floppy", DetectedType::BasicScsi),
            DetectedType::BasicScsi
        );
    }

    #[test]
    fn test_parser_type_for_detected_type() {
        assert_eq!(ParserType::for_detected_type(DetectedType::AtaSsd), ParserType::Ata);
        assert_eq!(ParserType::for_detected_type(DetectedType::Nvme), ParserType::Nvme);
        assert_eq!(ParserType::for_detected_type(DetectedType::CdDvd), ParserType::Scsi);
        assert_eq!(ParserType::for_detected_type(DetectedType::Unknown), ParserType::Basic);
    }

    #[test]
    fn test_parse_status_ordering() {
        assert!(ParseStatus::None < ParseStatus::Basic);
        assert!(ParseStatus::Basic < ParseStatus::Full);
    }
}
