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

//! Narrowing a device classification from freshly parsed facts

use super::parsers::PARSER_DETECTED_DRIVE_TYPE_KEY;
use super::{DetectedType, PropertyRepository};
use log::{info, warn};

/// Inputs besides the facts themselves
pub struct ResolveContext<'a> {
    /// Device basename, empty for virtual devices
    pub device_base: &'a str,
    /// Name used in log messages
    pub device_label: &'a str,
    /// Whether a basename denotes an optical drive on this host
    pub is_optical: &'a dyn Fn(&str) -> bool,
}

/// HDD if a nonzero rotation rate is known, SSD otherwise
fn ata_by_rotation(repo: &PropertyRepository) -> DetectedType {
    match repo.lookup("rotation_rate").and_then(|p| p.as_integer()) {
        Some(rpm) if rpm != 0 => DetectedType::AtaHdd,
        _ => DetectedType::AtaSsd,
    }
}

/// Refine `current` using the facts a parser just produced
///
/// Never returns a transient type: anything still unknown becomes `BasicScsi`.
pub fn resolve_detected_type(
    current: DetectedType,
    repo: &PropertyRepository,
    ctx: &ResolveContext<'_>,
) -> DetectedType {
    let mut detected = current;

    // Only the text dialect sets this.
    if let Some(name) = repo
        .lookup(PARSER_DETECTED_DRIVE_TYPE_KEY)
        .and_then(|p| p.as_str())
    {
        detected = DetectedType::from_storable_name(name, DetectedType::BasicScsi);
        if detected == DetectedType::AtaAny {
            detected = ata_by_rotation(repo);
        }
    }

    // Only the JSON dialect sets this. USB flash drives in non-scsi mode lack it.
    if let Some(smartctl_type) = repo.lookup("device/type").and_then(|p| p.as_str()) {
        let protocol = repo
            .lookup("device/protocol")
            .and_then(|p| p.as_str())
            .map(|p| p.to_lowercase())
            .unwrap_or_default();

        if smartctl_type == "scsi" {
            detected = if (ctx.is_optical)(ctx.device_base) {
                DetectedType::CdDvd
            } else {
                DetectedType::BasicScsi
            };
        } else if smartctl_type == "sat" || protocol == "ata" {
            detected = ata_by_rotation(repo);
        } else if smartctl_type == "nvme" || protocol == "nvme" {
            // NVMe behind a USB bridge reports a bridge type with protocol "nvme".
            detected = DetectedType::Nvme;
        } else {
            warn!(
                "Unsupported type {} (protocol: {}) reported by smartctl for {}",
                smartctl_type, protocol, ctx.device_label
            );
        }
    }

    if detected == DetectedType::Unknown {
        detected = DetectedType::BasicScsi;
    }

    info!(
        "Device {} detected after parser to be of type {}",
        ctx.device_label,
        detected.storable_name()
    );
    detected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PropertyValue, StorageProperty};

    fn repo(props: &[(&str, PropertyValue)]) -> PropertyRepository {
        props
            .iter()
            .map(|(k, v)| StorageProperty::new(k, v.clone()))
            .collect()
    }

    fn text(s: &str) -> PropertyValue {
        PropertyValue::String(s.to_string())
    }

    fn never_optical(_: &str) -> bool {
        false
    }

    fn sr_optical(base: &str) -> bool {
        base.starts_with("sr")
    }

    fn ctx<'a>(base: &'a str, optical: &'a dyn Fn(&str) -> bool) -> ResolveContext<'a> {
        ResolveContext {
            device_base: base,
            device_label: base,
            is_optical: optical,
        }
    }

    #[test]
    fn test_text_ata_with_rotation_is_hdd() {
        let facts = repo(&[
            (PARSER_DETECTED_DRIVE_TYPE_KEY, text("ata_any")),
            ("rotation_rate", PropertyValue::Integer(7200)),
        ]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sda", &never_optical)),
            DetectedType::AtaHdd
        );
    }

    #[test]
    fn test_text_ata_without_rotation_is_ssd() {
        let facts = repo(&[(PARSER_DETECTED_DRIVE_TYPE_KEY, text("ata_any"))]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sda", &never_optical)),
            DetectedType::AtaSsd
        );
        let facts = repo(&[
            (PARSER_DETECTED_DRIVE_TYPE_KEY, text("ata_any")),
            ("rotation_rate", PropertyValue::Integer(0)),
        ]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sda", &never_optical)),
            DetectedType::AtaSsd
        );
    }

    #[test]
    fn test_unrecognized_text_type_defaults_to_scsi() {
        let facts = repo(&[(PARSER_DETECTED_DRIVE_TYPE_KEY, text("tape"))]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("st0", &never_optical)),
            DetectedType::BasicScsi
        );
    }

    #[test]
    fn test_json_sat_without_rotation_is_ssd() {
        let facts = repo(&[("device/type", text("sat")), ("device/protocol", text("ATA"))]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sda", &never_optical)),
            DetectedType::AtaSsd
        );
    }

    #[test]
    fn test_json_ata_protocol_behind_bridge() {
        let facts = repo(&[
            ("device/type", text("usbjmicron")),
            ("device/protocol", text("ATA")),
            ("rotation_rate", PropertyValue::Integer(5400)),
        ]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sdc", &never_optical)),
            DetectedType::AtaHdd
        );
    }

    #[test]
    fn test_json_nvme() {
        let facts = repo(&[("device/type", text("nvme"))]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("nvme0", &never_optical)),
            DetectedType::Nvme
        );
        let facts = repo(&[
            ("device/type", text("sntrealtek")),
            ("device/protocol", text("NVMe")),
        ]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sdd", &never_optical)),
            DetectedType::Nvme
        );
    }

    #[test]
    fn test_json_scsi_optical_predicate() {
        let facts = repo(&[("device/type", text("scsi")), ("device/protocol", text("SCSI"))]);
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sr0", &sr_optical)),
            DetectedType::CdDvd
        );
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sdb", &sr_optical)),
            DetectedType::BasicScsi
        );
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sr0", &never_optical)),
            DetectedType::BasicScsi
        );
    }

    #[test]
    fn test_unsupported_json_type_keeps_classification() {
        let facts = repo(&[("device/type", text("megaraid"))]);
        assert_eq!(
            resolve_detected_type(DetectedType::AtaHdd, &facts, &ctx("sda", &never_optical)),
            DetectedType::AtaHdd
        );
        assert_eq!(
            resolve_detected_type(DetectedType::Unknown, &facts, &ctx("sda", &never_optical)),
            DetectedType::BasicScsi
        );
    }

    #[test]
    fn test_no_facts_never_regresses_terminal_type() {
        let empty = PropertyRepository::new();
        assert_eq!(
            resolve_detected_type(DetectedType::Nvme, &empty, &ctx("nvme0", &never_optical)),
            DetectedType::Nvme
        );
        assert_eq!(
            resolve_detected_type(DetectedType::NeedsExplicitType, &empty, &ctx("sda", &never_optical)),
            DetectedType::NeedsExplicitType
        );
    }
}
