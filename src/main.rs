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

/*!
Inspects storage devices with smartctl and prints what was found: device
type, identity, SMART state and health. `--format json` and `--format toml`
also include every parsed fact.

Captures can be saved with `--save-output` and replayed later with `--load`.
*/

use clap::{ArgAction, Parser, ValueEnum};
use log::{error, info, warn};
use serde::Serialize;
use smart_inspect::{
    ContainerConfigBuilder, DeviceInspectionService, DeviceSummary, FileRepository,
    InspectionRequest, InspectionService, ServiceContainer, StorageDevice,
};
use std::error::Error;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FileFormat {
    Text,
    Json,
    Toml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SmartSwitch {
    On,
    Off,
}

#[derive(Parser, Debug)]
#[command(name = "smart_inspect", version, about = "Inspect storage devices with smartctl")]
struct Opt {
    /// Devices to inspect, e.g. /dev/sda
    #[arg(required_unless_present = "load")]
    devices: Vec<String>,

    /// TOML settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// smartctl binary to run
    #[arg(long, value_name = "PATH")]
    smartctl: Option<String>,

    /// Interface type passed to smartctl as -d
    #[arg(short = 'd', long = "type", value_name = "TYPE")]
    type_arg: Option<String>,

    /// Extra smartctl argument (repeatable)
    #[arg(long = "extra", value_name = "ARG", allow_hyphen_values = true)]
    extra: Vec<String>,

    /// Also fetch attributes and logs
    #[arg(long)]
    full: bool,

    /// Replay a saved smartctl capture instead of running smartctl
    #[arg(long, value_name = "FILE", conflicts_with_all = ["devices", "smart"])]
    load: Option<PathBuf>,

    /// Switch SMART on or off before inspecting
    #[arg(long, value_enum)]
    smart: Option<SmartSwitch>,

    /// Summary output format
    #[arg(long, value_enum, default_value_t = FileFormat::Text)]
    format: FileFormat,

    /// Save the raw smartctl output of each device into this directory
    #[arg(long, value_name = "DIR")]
    save_output: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct Report<'a> {
    devices: &'a [DeviceSummary],
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn render_text(summary: &DeviceSummary) -> String {
    let mut out = String::new();
    let unknown = "-";
    let _ = writeln!(out, "Device:          {}", summary.device);
    let _ = writeln!(out, "Type:            {}", summary.detected_type);
    let _ = writeln!(out, "Parsed data:     {}", summary.parse_status);
    let _ = writeln!(out, "Model family:    {}", summary.family.as_deref().unwrap_or(unknown));
    let _ = writeln!(out, "Model:           {}", summary.model.as_deref().unwrap_or(unknown));
    let _ = writeln!(out, "Serial number:   {}", summary.serial.as_deref().unwrap_or(unknown));
    let _ = writeln!(out, "Capacity:        {}", summary.size.as_deref().unwrap_or(unknown));
    let _ = writeln!(out, "SMART:           {}", summary.smart_status);
    let health = match summary.health_passed {
        Some(true) => "PASSED",
        Some(false) => "FAILED",
        None => unknown,
    };
    let _ = writeln!(out, "Health:          {}", health);
    let _ = write!(out, "Self-tests:      {}", summary.self_test_support);
    out
}

fn render(summaries: &[DeviceSummary], format: FileFormat) -> Result<String, Box<dyn Error>> {
    Ok(match format {
        FileFormat::Text => summaries
            .iter()
            .map(render_text)
            .collect::<Vec<_>>()
            .join("\n\n"),
        FileFormat::Json => match summaries {
            [single] => serde_json::to_string_pretty(single)?,
            many => serde_json::to_string_pretty(many)?,
        },
        FileFormat::Toml => toml::to_string_pretty(&Report { devices: summaries })?,
    })
}

async fn save_capture(
    container: &ServiceContainer,
    service: &InspectionService,
    device: &StorageDevice,
    dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let pattern = &service.context().settings().save_filename_format;
    let path = dir.join(device.save_filename(pattern));
    container
        .create_file_repository()
        .save_capture(device.output_for_saving(), &path)
        .await?;
    Ok(path)
}

async fn run(opt: Opt) -> Result<bool, Box<dyn Error>> {
    let mut builder = ContainerConfigBuilder::new().detect_version(opt.load.is_none());
    if let Some(config) = &opt.config {
        builder = builder.config_path(config);
    }
    if let Some(smartctl) = &opt.smartctl {
        builder = builder.smartctl_binary(smartctl);
    }
    let container = ServiceContainer::new(builder.build());

    if opt.load.is_none() {
        let missing = container.validate_dependencies().await?;
        if !missing.is_empty() {
            return Err(format!("Cannot find {}", missing.join(", ")).into());
        }
        if !container.check_privileges().await {
            warn!("Not running as root; smartctl may be unable to open devices");
        }
    }

    let service = container.create_inspection_service().await?;
    info!("Running on {}", container.get_platform_name());

    let mut devices = Vec::new();
    let mut all_ok = true;

    if let Some(file) = &opt.load {
        devices.push(service.replay_device(file).await?);
    } else {
        let requests: Vec<InspectionRequest> = opt
            .devices
            .iter()
            .map(|device| InspectionRequest {
                type_arg: opt.type_arg.clone().unwrap_or_default(),
                extra_args: opt.extra.clone(),
                full: opt.full,
                ..InspectionRequest::new(device)
            })
            .collect();

        if let Some(switch) = opt.smart {
            let enable = switch == SmartSwitch::On;
            for request in &requests {
                match service.set_smart_enabled(request, enable).await {
                    Ok(()) => println!(
                        "SMART {} on {}",
                        if enable { "enabled" } else { "disabled" },
                        request.device
                    ),
                    Err(e) => {
                        error!("{}: {}", request.device, e);
                        all_ok = false;
                    }
                }
            }
        }

        for (request, result) in service.inspect_many(requests).await {
            match result {
                Ok(device) => devices.push(device),
                Err(e) => {
                    error!("{}: {}", request.device, e);
                    all_ok = false;
                }
            }
        }
    }

    if let Some(dir) = &opt.save_output {
        for device in devices.iter().filter(|d| !d.is_virtual()) {
            let path = save_capture(&container, &service, device, dir).await?;
            info!("Saved {} output to {}", device.device_with_type(), path.display());
        }
    }

    let summaries: Vec<DeviceSummary> = devices.iter().map(StorageDevice::summary).collect();
    if !summaries.is_empty() {
        println!("{}", render(&summaries, opt.format)?);
    }
    Ok(all_ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    let opt = Opt::parse();
    init_logging(opt.verbose);

    match run(opt).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
