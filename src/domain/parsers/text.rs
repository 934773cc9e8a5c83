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

//! Legacy smartctl text output parsing

use super::common::{
    bytes_to_human_readable, clean_value, parse_boolean, parse_capacity, parse_key_value,
    parse_rotation_rate,
};
use crate::domain::{
    DetectedType, ParserError, PropertyRepository, PropertySection, PropertyValue, StorageProperty,
};
use lazy_static::lazy_static;
use regex::Regex;

/// Key under which the text dialect records the drive type it recognized
pub const PARSER_DETECTED_DRIVE_TYPE_KEY: &str = "_text_only/custom/parser_detected_drive_type";

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"(?m)^smartctl\s+(\d+)\.(\d+)").unwrap();
    static ref SECTION_RE: Regex = Regex::new(r"^=== START OF (.+?) SECTION ===").unwrap();
    static ref SELF_TEST_ENTRY_RE: Regex =
        Regex::new(r"^#\s*(\d+)\s+(.+?)\s{2,}(.+?)\s+(\d+)%\s+(\d+)\s+(\S+)").unwrap();
    static ref ERROR_COUNT_RE: Regex = Regex::new(r"^ATA Error Count:\s*(\d+)").unwrap();
}

/// Device family hints found while reading the information section
#[derive(Default)]
struct FamilyEvidence {
    ata: bool,
    nvme: bool,
    scsi: bool,
    optical: bool,
}

impl FamilyEvidence {
    fn drive_type(&self) -> Option<DetectedType> {
        if self.nvme {
            Some(DetectedType::Nvme)
        } else if self.ata {
            Some(DetectedType::AtaAny)
        } else if self.optical {
            Some(DetectedType::CdDvd)
        } else if self.scsi {
            Some(DetectedType::BasicScsi)
        } else {
            None
        }
    }
}

/// Parse identity, health and capability facts from text output
pub fn parse_basic_text(output: &str) -> Result<PropertyRepository, ParserError> {
    let mut repo = PropertyRepository::new();
    let evidence = parse_common_text(output, &mut repo)?;
    if let Some(drive_type) = evidence.drive_type() {
        repo.add(StorageProperty::new(
            PARSER_DETECTED_DRIVE_TYPE_KEY,
            PropertyValue::String(drive_type.storable_name().to_string()),
        ));
    }
    Ok(repo)
}

/// Parse a full (S)ATA text capture: identity plus attributes and logs
pub fn parse_ata_text(output: &str) -> Result<PropertyRepository, ParserError> {
    let mut repo = PropertyRepository::new();
    let evidence = parse_common_text(output, &mut repo)?;

    if !evidence.ata {
        return Err(ParserError::UnsupportedData(
            "The output does not contain ATA device data".to_string(),
        ));
    }
    if !output.lines().any(|l| l.starts_with("=== START OF READ SMART DATA SECTION ===")) {
        return Err(ParserError::MissingSection(
            "No SMART data section found in smartctl output".to_string(),
        ));
    }

    repo.add(StorageProperty::new(
        PARSER_DETECTED_DRIVE_TYPE_KEY,
        PropertyValue::String(DetectedType::AtaAny.storable_name().to_string()),
    ));
    parse_attribute_table(output, &mut repo);
    parse_self_test_log(output, &mut repo);
    parse_error_log(output, &mut repo);
    Ok(repo)
}

fn parse_common_text(output: &str, repo: &mut PropertyRepository) -> Result<FamilyEvidence, ParserError> {
    if output.trim().is_empty() {
        return Err(ParserError::EmptyOutput);
    }

    let version = VERSION_RE.captures(output).ok_or_else(|| {
        ParserError::MissingSection("Cannot detect smartctl version information".to_string())
    })?;
    repo.add(StorageProperty::new(
        "smartctl/version/_merged",
        PropertyValue::String(format!("{}.{}", &version[1], &version[2])),
    ));

    let mut evidence = FamilyEvidence::default();
    let mut current_section: Option<String> = None;
    let mut saw_info_section = false;

    for line in output.lines() {
        if let Some(captures) = SECTION_RE.captures(line) {
            let name = captures[1].to_string();
            saw_info_section |= name == "INFORMATION";
            current_section = Some(name);
            continue;
        }

        let Some((key, value)) = parse_key_value(line, ':') else {
            continue;
        };

        // Health lines live in the SMART data section, the rest in the information section.
        match key.as_str() {
            "SMART overall-health self-assessment test result" => {
                let passed = value.trim() == "PASSED";
                repo.add(health_property(passed));
                continue;
            }
            "SMART Health Status" => {
                let passed = value.trim().eq_ignore_ascii_case("OK");
                repo.add(health_property(passed));
                continue;
            }
            _ => {}
        }

        if current_section.as_deref() == Some("INFORMATION") {
            add_info_line(&key, &value, repo, &mut evidence);
        }
    }

    if !saw_info_section {
        return Err(ParserError::MissingSection(
            "No information section found in smartctl output".to_string(),
        ));
    }

    Ok(evidence)
}

fn health_property(passed: bool) -> StorageProperty {
    StorageProperty::new("smart_status/passed", PropertyValue::Bool(passed))
        .with_readable(if passed { "PASSED" } else { "FAILED" })
}

fn string_property(key: &str, value: &str) -> StorageProperty {
    StorageProperty::new(key, PropertyValue::String(clean_value(value)))
}

fn add_info_line(key: &str, value: &str, repo: &mut PropertyRepository, evidence: &mut FamilyEvidence) {
    match key {
        "Model Family" => repo.add(string_property("model_family", value)),
        "Device Model" => {
            evidence.ata = true;
            repo.add(string_property("model_name", value));
        }
        "Model Number" => {
            evidence.nvme = true;
            repo.add(string_property("model_name", value));
        }
        "Serial Number" => repo.add(string_property("serial_number", value)),
        "Firmware Version" => repo.add(string_property("firmware_version", value)),
        "User Capacity" | "Total NVM Capacity" => {
            if let Some((bytes, short)) = parse_capacity(value) {
                let readable = short.unwrap_or_else(|| bytes_to_human_readable(bytes));
                let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
                repo.add(
                    StorageProperty::new("user_capacity/bytes", PropertyValue::Integer(bytes))
                        .with_readable(readable.clone()),
                );
                repo.add(
                    StorageProperty::new("user_capacity/bytes/_short", PropertyValue::Integer(bytes))
                        .with_readable(readable),
                );
            }
        }
        "Rotation Rate" => {
            if let Some(rpm) = parse_rotation_rate(value) {
                repo.add(
                    StorageProperty::new("rotation_rate", PropertyValue::Integer(rpm))
                        .with_readable(clean_value(value)),
                );
            }
        }
        "ATA Version is" => {
            evidence.ata = true;
            repo.add(string_property("ata_version/string", value));
        }
        "SATA Version is" => {
            evidence.ata = true;
            repo.add(string_property("sata_version/string", value));
        }
        "NVMe Version" => {
            evidence.nvme = true;
            repo.add(string_property("nvme_version/string", value));
        }
        "Vendor" => {
            evidence.scsi = true;
            repo.add(string_property("scsi_vendor", value));
        }
        "Product" => {
            evidence.scsi = true;
            repo.add(string_property("scsi_model_name", value));
        }
        "Revision" => repo.add(string_property("scsi_revision", value)),
        "Device type" => {
            evidence.optical |= value.contains("CD/DVD");
            repo.add(string_property("scsi_device_type/name", value));
        }
        "Form Factor" => repo.add(string_property("form_factor/name", value)),
        "Local Time is" => repo.add(StorageProperty::in_section(
            "local_time/asctime",
            PropertySection::Internal,
            PropertyValue::String(clean_value(value)),
        )),
        "SMART support is" => {
            let word = value.split_whitespace().next().unwrap_or_default().to_lowercase();
            let flag = parse_boolean(value);
            match (word.as_str(), flag) {
                ("available" | "unavailable", Some(b)) => repo.add(StorageProperty::new(
                    "smart_support/available",
                    PropertyValue::Bool(b),
                )),
                ("enabled" | "disabled", Some(b)) => repo.add(StorageProperty::new(
                    "smart_support/enabled",
                    PropertyValue::Bool(b),
                )),
                _ => {}
            }
        }
        other => {
            let generic = other
                .to_lowercase()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>();
            repo.add(StorageProperty::in_section(
                &format!("info/{generic}"),
                PropertySection::Info,
                PropertyValue::String(clean_value(value)),
            ));
        }
    }
}

/// Attribute table, brief (`FLAGS ... FAIL`) or old (`FLAG ... TYPE UPDATED WHEN_FAILED`) layout
fn parse_attribute_table(output: &str, repo: &mut PropertyRepository) {
    let mut lines = output.lines().skip_while(|l| !l.starts_with("ID# ATTRIBUTE_NAME"));
    let Some(header) = lines.next() else {
        return;
    };
    let brief = header.split_whitespace().any(|w| w == "FAIL");

    let mut index = 0;
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (when_failed, raw_start) = if brief { (6, 7) } else { (8, 9) };
        if parts.len() <= raw_start {
            continue;
        }
        let Ok(id) = parts[0].parse::<i64>() else {
            continue;
        };

        let prefix = format!("ata_smart_attributes/table/{index}");
        repo.add(StorageProperty::new(&format!("{prefix}/id"), PropertyValue::Integer(id)));
        repo.add(string_property(&format!("{prefix}/name"), parts[1]));
        repo.add(string_property(&format!("{prefix}/flags/string"), parts[2]));
        for (offset, field) in [(3, "value"), (4, "worst"), (5, "thresh")] {
            if let Ok(n) = parts[offset].parse::<i64>() {
                repo.add(StorageProperty::new(
                    &format!("{prefix}/{field}"),
                    PropertyValue::Integer(n),
                ));
            }
        }
        repo.add(string_property(&format!("{prefix}/when_failed"), parts[when_failed]));

        let raw = parts[raw_start..].join(" ");
        if let Ok(n) = parts[raw_start].parse::<i64>() {
            repo.add(
                StorageProperty::new(&format!("{prefix}/raw/value"), PropertyValue::Integer(n))
                    .with_readable(raw.clone()),
            );
        }
        repo.add(string_property(&format!("{prefix}/raw/string"), &raw));
        index += 1;
    }

    repo.add(StorageProperty::new(
        "ata_smart_attributes/table/_count",
        PropertyValue::Integer(index),
    ));
}

fn parse_self_test_log(output: &str, repo: &mut PropertyRepository) {
    let mut in_log = false;
    let mut count = 0i64;
    let mut seen = false;

    for line in output.lines() {
        if line.starts_with("SMART Self-test log structure")
            || line.starts_with("SMART Extended Self-test Log")
        {
            in_log = true;
            seen = true;
            continue;
        }
        if !in_log {
            continue;
        }
        if line.trim().is_empty() && count > 0 {
            break;
        }
        if line.starts_with("No self-tests have been logged") {
            break;
        }
        if let Some(c) = SELF_TEST_ENTRY_RE.captures(line) {
            let prefix = format!("ata_smart_self_test_log/standard/table/{count}");
            repo.add(string_property(&format!("{prefix}/type/string"), &c[2]));
            repo.add(string_property(&format!("{prefix}/status/string"), &c[3]));
            if let Ok(n) = c[4].parse::<i64>() {
                repo.add(StorageProperty::new(
                    &format!("{prefix}/status/remaining_percent"),
                    PropertyValue::Integer(n),
                ));
            }
            if let Ok(n) = c[5].parse::<i64>() {
                repo.add(StorageProperty::new(
                    &format!("{prefix}/lifetime_hours"),
                    PropertyValue::Integer(n),
                ));
            }
            repo.add(string_property(&format!("{prefix}/lba"), &c[6]));
            count += 1;
        }
    }

    if seen {
        repo.add(StorageProperty::new(
            "ata_smart_self_test_log/standard/count",
            PropertyValue::Integer(count),
        ));
    }
}

fn parse_error_log(output: &str, repo: &mut PropertyRepository) {
    for line in output.lines() {
        let count = if line.starts_with("No Errors Logged") {
            Some(0)
        } else {
            ERROR_COUNT_RE
                .captures(line)
                .and_then(|c| c[1].parse::<i64>().ok())
        };
        if let Some(count) = count {
            repo.add(StorageProperty::new(
                "ata_smart_error_log/summary/count",
                PropertyValue::Integer(count),
            ));
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATA_HDD_BASIC: &str = "\
smartctl 7.3 2022-02-28 r5338 [x86_64-linux-6.1.0] (local build)
Copyright (C) 2002-22, Bruce Allen, Christian Franke, www.smartmontools.org

=== START OF INFORMATION SECTION ===
Model Family:     Western Digital Blue
Device Model:     WDC WD10EZEX-08WN4A0
Serial Number:    WD-WCC6Y0000000
User Capacity:    1,000,204,886,016 bytes [1.00 TB]
Rotation Rate:    7200 rpm
ATA Version is:   ACS-3 T13/2161-D revision 3b
SMART support is: Available - device has SMART capability.
SMART support is: Enabled

=== START OF READ SMART DATA SECTION ===
SMART overall-health self-assessment test result: PASSED
";

    const ATA_HDD_FULL_TAIL: &str = "
SMART Attributes Data Structure revision number: 16
Vendor Specific SMART Attributes with Thresholds:
ID# ATTRIBUTE_NAME          FLAGS    VALUE WORST THRESH FAIL RAW_VALUE
  1 Raw_Read_Error_Rate     POSR-K   200   200   051    -    0
  9 Power_On_Hours          -O--CK   088   088   000    -    9240
194 Temperature_Celsius     -O---K   112   103   000    -    31 (Min/Max 20/40)

SMART Error Log Version: 1
No Errors Logged

SMART Self-test log structure revision number 1
Num  Test_Description    Status                  Remaining  LifeTime(hours)  LBA_of_first_error
# 1  Short offline       Completed without error       00%      9230         -
# 2  Extended offline    Completed without error       00%      9001         -
";

    #[test]
    fn test_basic_text_identity() {
        let repo = parse_basic_text(ATA_HDD_BASIC).unwrap();
        assert_eq!(
            repo.lookup("model_name").and_then(|p| p.as_str()),
            Some("WDC WD10EZEX-08WN4A0")
        );
        assert_eq!(repo.lookup("rotation_rate").and_then(|p| p.as_integer()), Some(7200));
        assert_eq!(
            repo.lookup("user_capacity/bytes").map(|p| p.readable_value.as_str()),
            Some("1.00 TB")
        );
        assert_eq!(
            repo.lookup("smart_support/available").and_then(|p| p.as_bool()),
            Some(true)
        );
        assert_eq!(
            repo.lookup("smart_support/enabled").and_then(|p| p.as_bool()),
            Some(true)
        );
        assert_eq!(
            repo.lookup_in("smart_status/passed", PropertySection::OverallHealth)
                .map(|p| p.readable_value.as_str()),
            Some("PASSED")
        );
        assert_eq!(
            repo.lookup(PARSER_DETECTED_DRIVE_TYPE_KEY).and_then(|p| p.as_str()),
            Some("ata_any")
        );
    }

    #[test]
    fn test_scsi_optical_detection() {
        let output = "\
smartctl 7.2 2020-12-30 r5155 [x86_64-linux-5.10.0] (local build)

=== START OF INFORMATION SECTION ===
Vendor:               HL-DT-ST
Product:              DVDRAM GH24NSD1
Revision:             LG00
Device type:          CD/DVD
";
        let repo = parse_basic_text(output).unwrap();
        assert_eq!(
            repo.lookup(PARSER_DETECTED_DRIVE_TYPE_KEY).and_then(|p| p.as_str()),
            Some("cddvd")
        );
        assert_eq!(
            repo.lookup("scsi_model_name").and_then(|p| p.as_str()),
            Some("DVDRAM GH24NSD1")
        );
    }

    #[test]
    fn test_missing_sections() {
        assert!(matches!(
            parse_basic_text("random garbage").unwrap_err(),
            ParserError::MissingSection(_)
        ));
        let no_info = "smartctl 7.3 2022-02-28 r5338\n/dev/sdx: Unable to detect device type\n";
        assert!(parse_basic_text(no_info)
            .unwrap_err()
            .to_string()
            .contains("information section"));
    }

    #[test]
    fn test_ata_text_requires_smart_data() {
        let basic_only = ATA_HDD_BASIC.replace(
            "=== START OF READ SMART DATA SECTION ===\nSMART overall-health self-assessment test result: PASSED\n",
            "",
        );
        assert!(parse_ata_text(&basic_only).is_err());
    }

    #[test]
    fn test_ata_text_attributes_and_logs() {
        let output = format!("{ATA_HDD_BASIC}{ATA_HDD_FULL_TAIL}");
        let repo = parse_ata_text(&output).unwrap();

        assert_eq!(
            repo.lookup("ata_smart_attributes/table/_count").and_then(|p| p.as_integer()),
            Some(3)
        );
        assert_eq!(
            repo.lookup("ata_smart_attributes/table/1/raw/value").and_then(|p| p.as_integer()),
            Some(9240)
        );
        assert_eq!(
            repo.lookup("ata_smart_attributes/table/2/raw/string").and_then(|p| p.as_str()),
            Some("31 (Min/Max 20/40)")
        );
        assert_eq!(
            repo.lookup("ata_smart_self_test_log/standard/count").and_then(|p| p.as_integer()),
            Some(2)
        );
        assert_eq!(
            repo.lookup("ata_smart_self_test_log/standard/table/1/type/string")
                .and_then(|p| p.as_str()),
            Some("Extended offline")
        );
        assert_eq!(
            repo.lookup("ata_smart_error_log/summary/count").and_then(|p| p.as_integer()),
            Some(0)
        );
        assert!(repo.has_properties_for_section(PropertySection::SelftestLog));
    }
}
