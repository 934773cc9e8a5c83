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

//! smartctl argument construction

use super::{DetectedType, FetchPhase, FormatPreferences, OutputFormat, ParserType};

/// JSON output with the original text embedded, so text pattern checks keep working
pub const JSON_WITH_TEXT_FLAG: &str = "--json=o";

/// Individual options making up `--xall` for (S)ATA drives
///
/// Spelled out so that new sections added to `--xall` by future smartctl
/// releases do not change what we capture.
pub const ATA_FULL_OPTIONS: [&str; 14] = [
    "--health",
    "--info",
    "--get=all",
    "--capabilities",
    "--attributes",
    "--format=brief",
    "--log=xerror,50,error",
    "--log=xselftest,50,selftest",
    "--log=selective",
    "--log=directory",
    "--log=scttemp",
    "--log=scterc",
    "--log=devstat",
    "--log=sataphy",
];

const XALL_OPTION: &str = "--xall";

/// Everything that decides how a device is addressed on the command line
#[derive(Debug, Clone, Default)]
pub struct DeviceTarget<'a> {
    /// Device path, appended last
    pub device: &'a str,
    /// Interface type for `-d`, empty if none
    pub type_arg: &'a str,
    /// Arguments given by the caller for this device
    pub extra_args: &'a [String],
    /// Arguments from the configuration file for this device
    pub config_options: &'a [String],
}

/// Device-targeting arguments, lowest priority first
///
/// smartctl lets a later `-d` win, so config options override caller
/// options, which override the detected type.
pub fn device_options(target: &DeviceTarget<'_>) -> Vec<String> {
    let mut args = Vec::new();
    if !target.type_arg.is_empty() {
        args.push("-d".to_string());
        args.push(target.type_arg.to_string());
    }
    args.extend(target.extra_args.iter().cloned());
    args.extend(target.config_options.iter().cloned());
    args
}

/// Options requesting identity, health and capabilities
pub fn basic_command_options(formats: &FormatPreferences) -> Vec<String> {
    let mut options: Vec<String> = ["--info", "--health", "--capabilities"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if formats.format_for(ParserType::Basic) == OutputFormat::Json {
        options.push(JSON_WITH_TEXT_FLAG.to_string());
    }
    options
}

/// Options requesting everything for the device family
///
/// Returns `None` for transient types, which have no template.
pub fn full_command_options(detected: DetectedType, formats: &FormatPreferences) -> Option<Vec<String>> {
    let mut options: Vec<String> = match detected {
        DetectedType::Unknown | DetectedType::NeedsExplicitType => return None,
        DetectedType::AtaAny | DetectedType::AtaHdd | DetectedType::AtaSsd => {
            ATA_FULL_OPTIONS.iter().map(|s| s.to_string()).collect()
        }
        DetectedType::Nvme
        | DetectedType::BasicScsi
        | DetectedType::CdDvd
        | DetectedType::UnsupportedRaid => vec![XALL_OPTION.to_string()],
    };

    let parser_type = ParserType::for_detected_type(detected);
    if formats.format_for(parser_type) == OutputFormat::Json {
        options.push(JSON_WITH_TEXT_FLAG.to_string());
    }
    Some(options)
}

/// Options switching SMART on or off
pub fn smart_toggle_options(enable: bool) -> Vec<String> {
    if enable {
        vec!["--smart=on".to_string(), "--saveauto=on".to_string()]
    } else {
        vec!["--smart=off".to_string()]
    }
}

/// Complete argument list for a fetch phase
///
/// Order: global default options, device options, phase options, device path.
/// Returns `None` when a full fetch is requested for a transient type.
pub fn build_arguments(
    phase: FetchPhase,
    target: &DeviceTarget<'_>,
    detected: DetectedType,
    formats: &FormatPreferences,
    default_options: &[String],
) -> Option<Vec<String>> {
    let phase_options = match phase {
        FetchPhase::Basic => basic_command_options(formats),
        FetchPhase::Full => full_command_options(detected, formats)?,
    };
    Some(assemble(target, default_options, phase_options))
}

/// Argument list for arbitrary command options against a device
pub fn assemble(target: &DeviceTarget<'_>, default_options: &[String], command_options: Vec<String>) -> Vec<String> {
    let mut args: Vec<String> = default_options.to_vec();
    args.extend(device_options(target));
    args.extend(command_options);
    args.push(target.device.to_string());
    args
}
