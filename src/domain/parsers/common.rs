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

//! Helpers shared by the text and JSON dialects

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CAPACITY_RE: Regex =
        Regex::new(r"^([\d,. ']+)\s*bytes(?:\s*\[([^\]]+)\])?").unwrap();
    static ref ROTATION_RE: Regex = Regex::new(r"^(\d+)\s*rpm").unwrap();
}

/// Parse a key-value pair from a smartctl text line
///
/// # Arguments
/// * `line` - Line to parse (e.g., "Device Model:     WDC WD5000AAKX")
/// * `separator` - Separator character (usually ':')
///
/// # Returns
/// * `Some((String, String))` - Key-value pair
/// * `None` - No separator in the line
pub fn parse_key_value(line: &str, separator: char) -> Option<(String, String)> {
    let pos = line.find(separator)?;
    let key = line[..pos].trim().to_string();
    let value = line[pos + 1..].trim().to_string();
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Clean and normalize a string value
///
/// Collapses runs of whitespace into single spaces.
pub fn clean_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse smartctl's yes/no style words
///
/// # Returns
/// * `Some(bool)` - Parsed boolean value
/// * `None` - Not a recognized word
pub fn parse_boolean(value: &str) -> Option<bool> {
    let first = value.trim().split_whitespace().next()?.trim_end_matches(['.', ',']);
    match first.to_lowercase().as_str() {
        "yes" | "true" | "enabled" | "available" | "passed" | "ok" => Some(true),
        "no" | "false" | "disabled" | "unavailable" | "failed!" | "failed" => Some(false),
        _ => None,
    }
}

/// Parse a capacity line value
///
/// Input looks like `500,107,862,016 bytes [500 GB]`; locale separators
/// (`,`, `.`, `'`, space) are ignored.
///
/// # Returns
/// Bytes plus smartctl's own short rendition, if present.
pub fn parse_capacity(value: &str) -> Option<(u64, Option<String>)> {
    let captures = CAPACITY_RE.captures(value.trim())?;
    let digits: String = captures[1].chars().filter(|c| c.is_ascii_digit()).collect();
    let bytes = digits.parse::<u64>().ok()?;
    let short = captures.get(2).map(|m| m.as_str().trim().to_string());
    Some((bytes, short))
}

/// Parse a rotation rate value
///
/// `Solid State Device` yields 0, `7200 rpm` yields 7200.
pub fn parse_rotation_rate(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("Solid State Device") {
        return Some(0);
    }
    ROTATION_RE
        .captures(value)
        .and_then(|c| c[1].parse::<i64>().ok())
}

/// Convert bytes to a human-readable capacity the way smartctl does
///
/// Decimal units, three significant digits (e.g. "500 GB", "1.00 TB").
pub fn bytes_to_human_readable(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    const THRESHOLD: f64 = 1000.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        return format!("{} {}", bytes, UNITS[unit_index]);
    }

    // Rounding can carry into the next precision band or the next unit.
    loop {
        let mut decimals = significant_decimals(size);
        let mut rounded = round_to(size, decimals);
        while significant_decimals(rounded) < decimals {
            decimals = significant_decimals(rounded);
            rounded = round_to(size, decimals);
        }
        if rounded >= THRESHOLD && unit_index < UNITS.len() - 1 {
            size /= THRESHOLD;
            unit_index += 1;
            continue;
        }
        return format!("{:.*} {}", decimals, rounded, UNITS[unit_index]);
    }
}

fn significant_decimals(value: f64) -> usize {
    if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    }
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
