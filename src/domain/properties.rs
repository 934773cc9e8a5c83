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

//! Typed, sectioned facts extracted from one smartctl capture

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value of a single fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

/// Semantic group a fact belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertySection {
    /// Identity: model, serial, capacity, interface
    Info,
    /// Overall health self-assessment
    OverallHealth,
    /// SMART support and feature flags
    Capabilities,
    /// ATA attributes / NVMe health log
    Attributes,
    ErrorLog,
    SelftestLog,
    SelectiveSelftestLog,
    TemperatureLog,
    ErcLog,
    Statistics,
    PhyLog,
    DirectoryLog,
    /// Tool metadata and dialect-specific helper facts
    Internal,
}

impl PropertySection {
    /// Sections a basic (identity-only) parse keeps
    pub const BASIC: [PropertySection; 4] = [
        PropertySection::Info,
        PropertySection::OverallHealth,
        PropertySection::Capabilities,
        PropertySection::Internal,
    ];

    /// Classify a flattened smartctl key
    pub fn for_key(key: &str) -> PropertySection {
        let root = key.split('/').next().unwrap_or(key);
        match root {
            "smart_status" => PropertySection::OverallHealth,
            "smart_support" | "ata_smart_data" | "read_lookahead" | "write_cache"
            | "ata_security" | "ata_apm" | "ata_aam" | "ata_dsn" | "nvme_smart_health_information_add_log" => {
                PropertySection::Capabilities
            }
            "ata_smart_attributes"
            | "nvme_smart_health_information_log"
            | "scsi_grown_defect_list"
            | "scsi_error_counter_log"
            | "scsi_start_stop_cycle_counter" => PropertySection::Attributes,
            "ata_smart_error_log" | "nvme_error_information_log" => PropertySection::ErrorLog,
            "ata_smart_self_test_log" | "nvme_self_test_log" | "scsi_self_test_0"
            | "scsi_extended_self_test_seconds" => PropertySection::SelftestLog,
            "ata_smart_selective_self_test_log" => PropertySection::SelectiveSelftestLog,
            "ata_sct_temperature_history" | "temperature" => PropertySection::TemperatureLog,
            "ata_sct_erc" => PropertySection::ErcLog,
            "ata_device_statistics" => PropertySection::Statistics,
            "sata_phy_event_counters" => PropertySection::PhyLog,
            "ata_log_directory" => PropertySection::DirectoryLog,
            "smartctl" | "json_format_version" | "local_time" | "_text_only" => {
                PropertySection::Internal
            }
            _ if root.starts_with("scsi_self_test") => PropertySection::SelftestLog,
            _ => PropertySection::Info,
        }
    }
}

/// One fact: key, section, typed value and a human-readable rendition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageProperty {
    /// Hierarchical key, e.g. `smart_status/passed`
    pub generic_name: String,
    pub section: PropertySection,
    pub value: PropertyValue,
    pub readable_value: String,
}

impl StorageProperty {
    /// Create a fact in the section its key implies
    pub fn new(generic_name: &str, value: PropertyValue) -> Self {
        Self::in_section(generic_name, PropertySection::for_key(generic_name), value)
    }

    pub fn in_section(generic_name: &str, section: PropertySection, value: PropertyValue) -> Self {
        let readable_value = match &value {
            PropertyValue::Bool(true) => "Yes".to_string(),
            PropertyValue::Bool(false) => "No".to_string(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::String(s) => s.clone(),
        };
        Self {
            generic_name: generic_name.to_string(),
            section,
            value,
            readable_value,
        }
    }

    /// Override the human-readable value
    pub fn with_readable(mut self, readable: impl Into<String>) -> Self {
        self.readable_value = readable.into();
        self
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            PropertyValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            PropertyValue::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// The fact store
///
/// Replaced wholesale after every successful parse; never edited in place
/// once handed to a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<StorageProperty>", into = "Vec<StorageProperty>")]
pub struct PropertyRepository {
    properties: Vec<StorageProperty>,
    /// Positions of each key in `properties`, in insertion order
    index: HashMap<String, Vec<usize>>,
}

impl PropertyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact. A later fact with the same key and section replaces the earlier one.
    pub fn add(&mut self, property: StorageProperty) {
        let positions = self.index.entry(property.generic_name.clone()).or_default();
        match positions
            .iter()
            .copied()
            .find(|&i| self.properties[i].section == property.section)
        {
            Some(i) => self.properties[i] = property,
            None => {
                positions.push(self.properties.len());
                self.properties.push(property);
            }
        }
    }

    /// First fact with this key, in any section
    pub fn lookup(&self, generic_name: &str) -> Option<&StorageProperty> {
        self.index
            .get(generic_name)
            .and_then(|positions| positions.first())
            .map(|&i| &self.properties[i])
    }

    /// First fact with this key inside `section`
    pub fn lookup_in(&self, generic_name: &str, section: PropertySection) -> Option<&StorageProperty> {
        self.index
            .get(generic_name)?
            .iter()
            .map(|&i| &self.properties[i])
            .find(|p| p.section == section)
    }

    pub fn has_properties_for_section(&self, section: PropertySection) -> bool {
        self.properties.iter().any(|p| p.section == section)
    }

    /// Copy of this store keeping only the given sections
    pub fn retain_sections(&self, sections: &[PropertySection]) -> PropertyRepository {
        self.properties
            .iter()
            .filter(|p| sections.contains(&p.section))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorageProperty> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn into_vec(self) -> Vec<StorageProperty> {
        self.properties
    }
}

impl PartialEq for PropertyRepository {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties
    }
}

impl From<Vec<StorageProperty>> for PropertyRepository {
    fn from(properties: Vec<StorageProperty>) -> Self {
        properties.into_iter().collect()
    }
}

impl From<PropertyRepository> for Vec<StorageProperty> {
    fn from(repo: PropertyRepository) -> Self {
        repo.into_vec()
    }
}

impl FromIterator<StorageProperty> for PropertyRepository {
    fn from_iter<I: IntoIterator<Item = StorageProperty>>(iter: I) -> Self {
        let mut repo = PropertyRepository::new();
        for property in iter {
            repo.add(property);
        }
        repo
    }
}
