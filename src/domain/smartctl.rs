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

//! smartctl exit status and version handling

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref VERSION_LINE_RE: Regex = Regex::new(r"(?m)^smartctl\s+(\d+)\.(\d+)").unwrap();
}

const EXIT_BIT_MESSAGES: [&str; 8] = [
    "Command line did not parse.",
    "Device open failed, or device did not return an IDENTIFY DEVICE structure.",
    "Some SMART or ATA command to the disk failed, or there was a checksum error in a SMART data structure.",
    "SMART status check returned \"DISK FAILING\".",
    "Prefail attributes are at or below their thresholds.",
    "Some attributes have been at or below their thresholds at some time in the past.",
    "The device error log contains records of errors.",
    "The device self-test log contains records of errors.",
];

/// Decoded smartctl exit status bitmask
///
/// Bits 0 and 1 mean smartctl could not talk to the device at all; the
/// other bits describe the disk and still come with usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartctlExitStatus {
    code: Option<i32>,
}

impl SmartctlExitStatus {
    /// `None` means the process ended without an exit code (e.g. a signal)
    pub fn new(code: Option<i32>) -> Self {
        Self { code }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn is_bit_set(&self, bit: u8) -> bool {
        match self.code {
            Some(code) if bit < 8 => code & (1 << bit) != 0,
            _ => false,
        }
    }

    /// Whether the output cannot be trusted
    pub fn is_fatal(&self) -> bool {
        match self.code {
            None => true,
            Some(_) => self.is_bit_set(0) || self.is_bit_set(1),
        }
    }

    /// Human-readable descriptions of every set bit
    pub fn messages(&self) -> Vec<&'static str> {
        (0..8u8)
            .filter(|bit| self.is_bit_set(*bit))
            .map(|bit| EXIT_BIT_MESSAGES[bit as usize])
            .collect()
    }
}

impl fmt::Display for SmartctlExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            None => write!(f, "smartctl was terminated abnormally"),
            Some(code) => {
                write!(f, "smartctl exited with status {code}")?;
                let messages = self.messages();
                if !messages.is_empty() {
                    write!(f, ": {}", messages.join(" "))?;
                }
                Ok(())
            }
        }
    }
}

/// smartctl release version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SmartctlVersion {
    pub major: u32,
    pub minor: u32,
}

impl SmartctlVersion {
    /// First release with `--json` output
    pub const FIRST_JSON: SmartctlVersion = SmartctlVersion { major: 7, minor: 0 };

    /// Parse the first line of `smartctl --version` (or of any text output)
    pub fn parse(output: &str) -> Option<SmartctlVersion> {
        let captures = VERSION_LINE_RE.captures(output)?;
        Some(SmartctlVersion {
            major: captures[1].parse().ok()?,
            minor: captures[2].parse().ok()?,
        })
    }

    pub fn supports_json(&self) -> bool {
        *self >= Self::FIRST_JSON
    }
}

impl fmt::Display for SmartctlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_fatal_bits() {
        assert!(!SmartctlExitStatus::new(Some(0)).is_fatal());
        assert!(SmartctlExitStatus::new(Some(1)).is_fatal());
        assert!(SmartctlExitStatus::new(Some(2)).is_fatal());
        // Disk failing and error-log bits still produce usable output.
        assert!(!SmartctlExitStatus::new(Some(4 | 8 | 64)).is_fatal());
        assert!(SmartctlExitStatus::new(None).is_fatal());
    }

    #[test]
    fn test_exit_status_messages() {
        let status = SmartctlExitStatus::new(Some(2 | 64));
        assert_eq!(status.messages().len(), 2);
        let text = status.to_string();
        assert!(text.starts_with("smartctl exited with status 66"));
        assert!(text.contains("Device open failed"));
    }

    #[test]
    fn test_version_parse() {
        let version = SmartctlVersion::parse(
            "smartctl 7.3 2022-02-28 r5338 [x86_64-linux-6.1.0] (local build)\nCopyright",
        )
        .unwrap();
        assert_eq!(version, SmartctlVersion { major: 7, minor: 3 });
        assert!(version.supports_json());
        assert!(!SmartctlVersion::parse("smartctl 6.6 2017-11-05").unwrap().supports_json());
        assert!(SmartctlVersion::parse("not smartctl").is_none());
    }
}
