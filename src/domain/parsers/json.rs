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

//! smartctl `--json` output parsing
//!
//! The document is flattened into `/`-joined keys (`device/type`,
//! `ata_smart_attributes/table/0/raw/value`, ...), each placed in the section
//! its root key implies.

use super::common::bytes_to_human_readable;
use crate::domain::{
    ParserError, ParserType, PropertyRepository, PropertySection, PropertyValue, StorageProperty,
};
use serde_json::Value;

/// Parse smartctl JSON output with the given capability level
pub fn parse_json_output(output: &str, parser_type: ParserType) -> Result<PropertyRepository, ParserError> {
    if output.trim().is_empty() {
        return Err(ParserError::EmptyOutput);
    }

    let json: Value =
        serde_json::from_str(output).map_err(|e| ParserError::InvalidJson(e.to_string()))?;

    if json.get("json_format_version").is_none() {
        return Err(ParserError::MissingSection(
            "Not a smartctl JSON document: json_format_version is missing".to_string(),
        ));
    }

    let errors = error_messages(&json);
    if json.get("device").is_none() && !errors.is_empty() {
        return Err(ParserError::UnsupportedData(errors.join(" ")));
    }

    let mut repo = PropertyRepository::new();
    flatten_into("", &json, &mut repo);
    add_derived_properties(&json, &mut repo);

    match parser_type {
        ParserType::Basic => {
            let basic = repo.retain_sections(&PropertySection::BASIC);
            if !basic.has_properties_for_section(PropertySection::Info) {
                return Err(ParserError::MissingSection(
                    "No device information found in smartctl output".to_string(),
                ));
            }
            Ok(basic)
        }
        family => {
            check_family_evidence(&json, family)?;
            Ok(repo)
        }
    }
}

/// Texts of `smartctl/messages` entries with error severity
fn error_messages(json: &Value) -> Vec<String> {
    json.pointer("/smartctl/messages")
        .and_then(|v| v.as_array())
        .map(|messages| {
            messages
                .iter()
                .filter(|m| m.get("severity").and_then(|s| s.as_str()) == Some("error"))
                .filter_map(|m| m.get("string").and_then(|s| s.as_str()))
                .map(|s| s.trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn flatten_into(prefix: &str, value: &Value, repo: &mut PropertyRepository) {
    // The embedded text output (--json=o) is kept as raw output, not as facts.
    if prefix == "smartctl/output" {
        return;
    }

    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}/{key}")
        }
    };

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(&join(key), child, repo);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(&join(&index.to_string()), child, repo);
            }
        }
        Value::Bool(b) => repo.add(StorageProperty::new(prefix, PropertyValue::Bool(*b))),
        Value::Number(n) => {
            let property = match n.as_i64() {
                Some(i) => StorageProperty::new(prefix, PropertyValue::Integer(i)),
                None => StorageProperty::new(prefix, PropertyValue::String(n.to_string())),
            };
            repo.add(property);
        }
        Value::String(s) => repo.add(StorageProperty::new(prefix, PropertyValue::String(s.clone()))),
        Value::Null => {}
    }
}

/// Facts whose readable form differs from the raw JSON value
fn add_derived_properties(json: &Value, repo: &mut PropertyRepository) {
    if let Some(bytes) = json.pointer("/user_capacity/bytes").and_then(|v| v.as_i64()) {
        let readable = bytes_to_human_readable(bytes.max(0) as u64);
        repo.add(
            StorageProperty::new("user_capacity/bytes", PropertyValue::Integer(bytes))
                .with_readable(readable.clone()),
        );
        repo.add(
            StorageProperty::new("user_capacity/bytes/_short", PropertyValue::Integer(bytes))
                .with_readable(readable),
        );
    } else if let Some(bytes) = json
        .pointer("/nvme_total_capacity")
        .and_then(|v| v.as_i64())
    {
        repo.add(
            StorageProperty::new("user_capacity/bytes", PropertyValue::Integer(bytes))
                .with_readable(bytes_to_human_readable(bytes.max(0) as u64)),
        );
    }

    if let Some(passed) = json.pointer("/smart_status/passed").and_then(|v| v.as_bool()) {
        repo.add(
            StorageProperty::new("smart_status/passed", PropertyValue::Bool(passed))
                .with_readable(if passed { "PASSED" } else { "FAILED" }),
        );
    }

    if let Some(version) = json.pointer("/smartctl/version").and_then(|v| v.as_array()) {
        let merged = version
            .iter()
            .filter_map(|v| v.as_i64())
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(".");
        if !merged.is_empty() {
            repo.add(StorageProperty::new(
                "smartctl/version/_merged",
                PropertyValue::String(merged),
            ));
        }
    }
}

fn lowercase_protocol(json: &Value) -> String {
    json.pointer("/device/protocol")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_lowercase()
}

fn has_root_key(json: &Value, predicate: impl Fn(&str) -> bool) -> bool {
    json.as_object()
        .map(|map| map.keys().any(|k| predicate(k)))
        .unwrap_or(false)
}

fn check_family_evidence(json: &Value, family: ParserType) -> Result<(), ParserError> {
    let protocol = lowercase_protocol(json);
    let (matches, name) = match family {
        ParserType::Ata => (
            protocol == "ata" || has_root_key(json, |k| k.starts_with("ata_smart_")),
            "ATA",
        ),
        ParserType::Nvme => (
            protocol == "nvme" || has_root_key(json, |k| k.starts_with("nvme_")),
            "NVMe",
        ),
        ParserType::Scsi => (
            protocol == "scsi" || has_root_key(json, |k| k.starts_with("scsi_")),
            "SCSI",
        ),
        ParserType::Basic => (true, "basic"),
    };

    if matches {
        Ok(())
    } else {
        Err(ParserError::UnsupportedData(format!(
            "The output does not contain {name} device data"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAT_SSD: &str = r#"{
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
        "ata_smart_self_test_log": {"standard": {"revision": 1, "count": 0}}
    }"#;

    #[test]
    fn test_basic_parser_keeps_identity_only() {
        let repo = parse_json_output(SAT_SSD, ParserType::Basic).unwrap();
        assert_eq!(repo.lookup("device/type").and_then(|p| p.as_str()), Some("sat"));
        assert_eq!(
            repo.lookup("smart_support/enabled").and_then(|p| p.as_bool()),
            Some(true)
        );
        assert_eq!(
            repo.lookup("user_capacity/bytes").map(|p| p.readable_value.as_str()),
            Some("500 GB")
        );
        assert!(!repo.has_properties_for_section(PropertySection::Attributes));
        assert!(!repo.has_properties_for_section(PropertySection::SelftestLog));
    }

    #[test]
    fn test_ata_parser_keeps_logs() {
        let repo = parse_json_output(SAT_SSD, ParserType::Ata).unwrap();
        assert!(repo.has_properties_for_section(PropertySection::SelftestLog));
        assert_eq!(
            repo.lookup("ata_smart_attributes/table/0/raw/value")
                .and_then(|p| p.as_integer()),
            Some(21000)
        );
        assert_eq!(
            repo.lookup("smartctl/version/_merged").and_then(|p| p.as_str()),
            Some("7.3")
        );
    }

    #[test]
    fn test_family_mismatch_is_rejected() {
        let err = parse_json_output(SAT_SSD, ParserType::Nvme).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedData(_)));
    }

    #[test]
    fn test_error_only_document() {
        let output = r#"{
            "json_format_version": [1, 0],
            "smartctl": {"exit_status": 1, "messages": [
                {"string": "/dev/sdb: Unknown USB bridge [0x1234:0x5678]", "severity": "error"},
                {"string": "Please specify device type with the -d option.", "severity": "error"}
            ]}
        }"#;
        let err = parse_json_output(output, ParserType::Basic).unwrap_err();
        assert!(err.to_string().contains("specify device type"));
    }

    #[test]
    fn test_invalid_documents() {
        assert_eq!(
            parse_json_output("  ", ParserType::Basic).unwrap_err(),
            ParserError::EmptyOutput
        );
        assert!(matches!(
            parse_json_output("{not json", ParserType::Basic).unwrap_err(),
            ParserError::InvalidJson(_)
        ));
        assert!(matches!(
            parse_json_output(r#"{"device": {}}"#, ParserType::Basic).unwrap_err(),
            ParserError::MissingSection(_)
        ));
    }

    #[test]
    fn test_embedded_text_output_is_not_a_fact() {
        let output = r#"{
            "json_format_version": [1, 0],
            "smartctl": {"output": ["smartctl 7.3", "line two"]},
            "device": {"name": "/dev/nvme0", "type": "nvme", "protocol": "NVMe"},
            "model_name": "WDC PC SN730",
            "nvme_total_capacity": 512110190592,
            "nvme_smart_health_information_log": {"percentage_used": 3}
        }"#;
        let repo = parse_json_output(output, ParserType::Nvme).unwrap();
        assert!(repo.iter().all(|p| !p.generic_name.starts_with("smartctl/output")));
        assert_eq!(
            repo.lookup("user_capacity/bytes").map(|p| p.readable_value.as_str()),
            Some("512 GB")
        );
    }
}
