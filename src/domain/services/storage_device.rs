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

//! One storage device and everything smartctl told us about it
//!
//! A [`StorageDevice`] owns its raw smartctl captures, the facts parsed from
//! them and a few signals derived from those facts. Fetching runs in two
//! phases: the basic phase identifies the device, the full phase uses the
//! identified type to pick the right command line and parser.
//!
//! Mutating operations take `&mut self`; share a device between tasks through
//! [`SharedStorageDevice`] so a fetch, a SMART toggle and a reader never
//! overlap. Observers subscribe to [`DeviceEvent`]s.

use super::smartctl_context::SmartctlContext;
use crate::domain::command_builder::{self, DeviceTarget};
use crate::domain::type_resolver::{resolve_detected_type, ResolveContext};
use crate::domain::{
    detect_output_format, ChangeReason, DetectedType, DeviceError, DeviceEvent, DeviceIdentity,
    DeviceSummary, FetchPhase, OutputFormat, ParseStatus, ParserType, PropertyRepository,
    PropertySection, SelfTestSupportStatus, SmartStatus, SmartctlParser, StorageProperty,
};
use chrono::Local;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, Mutex};

/// Interface type tried when smartctl asks for an explicit `-d`
pub const FALLBACK_TYPE_ARG: &str = "scsi";

const EVENT_CHANNEL_CAPACITY: usize = 16;

lazy_static! {
    static ref NEEDS_EXPLICIT_TYPE_RE: Regex =
        Regex::new(r"(?mi)specify device type with the -d option").unwrap();
    static ref SMART_SWITCHED_RE: Regex = Regex::new(r"(?mi)^SMART (Enabled|Disabled)").unwrap();
    static ref MANDATORY_COMMAND_FAILED_RE: Regex =
        Regex::new(r"(?mi)^A mandatory SMART command failed").unwrap();
}

/// A device shared between tasks; the mutex serializes fetches
pub type SharedStorageDevice = Arc<Mutex<StorageDevice>>;

/// Identity facts looked up once per parse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CommonProperties {
    model_name: Option<String>,
    family_name: Option<String>,
    serial_number: Option<String>,
    size: Option<String>,
    smart_supported: Option<bool>,
    smart_enabled: Option<bool>,
}

impl CommonProperties {
    fn read(repo: &PropertyRepository) -> Self {
        let first_string = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| repo.lookup(key).and_then(|p| p.as_str()))
                .map(str::to_string)
        };
        let flag = |key: &str| repo.lookup(key).and_then(|p| p.as_bool());

        Self {
            model_name: first_string(&["model_name", "scsi_model_name"]),
            family_name: first_string(&["model_family", "scsi_vendor"]),
            serial_number: first_string(&["serial_number"]),
            size: ["user_capacity/bytes/_short", "user_capacity/bytes"]
                .iter()
                .find_map(|key| repo.lookup(key))
                .map(|p| p.readable_value.clone()),
            smart_supported: flag("smart_support/available"),
            smart_enabled: flag("smart_support/enabled"),
        }
    }
}

/// Signals computed on first access after each change
#[derive(Debug, Default)]
struct SignalCache {
    smart_status: OnceLock<SmartStatus>,
    health: OnceLock<Option<StorageProperty>>,
    self_test_support: OnceLock<SelfTestSupportStatus>,
}

#[derive(Debug)]
pub struct StorageDevice {
    identity: DeviceIdentity,
    /// Value for `-d`, empty to let smartctl decide
    type_arg: String,
    extra_args: Vec<String>,
    is_manually_added: bool,

    detected_type: DetectedType,
    parse_status: ParseStatus,
    basic_output: String,
    full_output: String,
    properties: Arc<PropertyRepository>,
    common: CommonProperties,
    signals: SignalCache,

    test_is_active: bool,
    generation: u64,
    events: broadcast::Sender<DeviceEvent>,
}

impl StorageDevice {
    fn with_identity(identity: DeviceIdentity, type_arg: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            identity,
            type_arg: type_arg.to_string(),
            extra_args: Vec::new(),
            is_manually_added: false,
            detected_type: DetectedType::Unknown,
            parse_status: ParseStatus::None,
            basic_output: String::new(),
            full_output: String::new(),
            properties: Arc::new(PropertyRepository::new()),
            common: CommonProperties::default(),
            signals: SignalCache::default(),
            test_is_active: false,
            generation: 0,
            events,
        }
    }

    /// A real device, type left to smartctl
    pub fn new(device: &str) -> Self {
        Self::with_identity(
            DeviceIdentity::Real {
                device: device.to_string(),
            },
            "",
        )
    }

    /// A real device addressed with an explicit `-d` type
    pub fn with_type(device: &str, type_arg: &str) -> Self {
        Self::with_identity(
            DeviceIdentity::Real {
                device: device.to_string(),
            },
            type_arg,
        )
    }

    /// A device backed by a captured smartctl output file
    pub fn new_virtual(file: impl Into<PathBuf>) -> Self {
        Self::with_identity(DeviceIdentity::Virtual { file: file.into() }, "")
    }

    pub fn into_shared(self) -> SharedStorageDevice {
        Arc::new(Mutex::new(self))
    }

    /// Receive a [`DeviceEvent`] after every parse and test-activity change
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    // Identity

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn is_virtual(&self) -> bool {
        self.identity.is_virtual()
    }

    /// Device path; empty for virtual devices
    pub fn device(&self) -> &str {
        match &self.identity {
            DeviceIdentity::Real { device } => device,
            DeviceIdentity::Virtual { .. } => "",
        }
    }

    /// Last path component of the device, e.g. `sda`; empty for virtual devices
    pub fn device_base(&self) -> String {
        match &self.identity {
            DeviceIdentity::Real { device } => Path::new(device)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| device.clone()),
            DeviceIdentity::Virtual { .. } => String::new(),
        }
    }

    /// File name of the capture behind a virtual device
    pub fn virtual_file(&self) -> Option<&Path> {
        match &self.identity {
            DeviceIdentity::Virtual { file } => Some(file),
            DeviceIdentity::Real { .. } => None,
        }
    }

    pub fn virtual_filename(&self) -> String {
        self.virtual_file()
            .and_then(|file| file.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `/dev/sda (sat)`, or `Virtual (capture.json)`
    pub fn device_with_type(&self) -> String {
        if self.is_virtual() {
            let filename = self.virtual_filename();
            let shown = if filename.is_empty() { "[empty]" } else { filename.as_str() };
            format!("Virtual ({shown})")
        } else if self.type_arg.is_empty() {
            self.device().to_string()
        } else {
            format!("{} ({})", self.device(), self.type_arg)
        }
    }

    /// Device path, or capture file name for virtual devices
    fn display_name(&self) -> String {
        if self.is_virtual() {
            self.virtual_filename()
        } else {
            self.device().to_string()
        }
    }

    pub fn type_argument(&self) -> &str {
        &self.type_arg
    }

    pub fn extra_arguments(&self) -> &[String] {
        &self.extra_args
    }

    pub fn set_extra_arguments(&mut self, args: Vec<String>) {
        self.extra_args = args;
    }

    pub fn is_manually_added(&self) -> bool {
        self.is_manually_added
    }

    pub fn set_is_manually_added(&mut self, manually_added: bool) {
        self.is_manually_added = manually_added;
    }

    // Parsed state

    pub fn detected_type(&self) -> DetectedType {
        self.detected_type
    }

    pub fn parse_status(&self) -> ParseStatus {
        self.parse_status
    }

    pub fn basic_output(&self) -> &str {
        &self.basic_output
    }

    pub fn full_output(&self) -> &str {
        &self.full_output
    }

    /// Replace the capture a virtual device replays
    pub fn set_full_output(&mut self, output: String) {
        self.full_output = output;
    }

    /// Snapshot of the current facts
    pub fn properties(&self) -> Arc<PropertyRepository> {
        Arc::clone(&self.properties)
    }

    /// Number of change notifications sent so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn model_name(&self) -> Option<&str> {
        self.common.model_name.as_deref()
    }

    /// Model family, or vendor for SCSI devices
    pub fn family_name(&self) -> Option<&str> {
        self.common.family_name.as_deref()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.common.serial_number.as_deref()
    }

    /// Capacity in human-readable form, e.g. `1.00 TB`
    pub fn device_size(&self) -> Option<&str> {
        self.common.size.as_deref()
    }

    // Derived signals

    pub fn smart_status(&self) -> SmartStatus {
        *self.signals.smart_status.get_or_init(|| {
            SmartStatus::from_flags(self.common.smart_enabled, self.common.smart_supported)
        })
    }

    /// Overall health verdict, if smartctl reported one
    pub fn health_property(&self) -> Option<StorageProperty> {
        self.signals
            .health
            .get_or_init(|| {
                self.properties
                    .lookup_in("smart_status/passed", PropertySection::OverallHealth)
                    .cloned()
            })
            .clone()
    }

    pub fn self_test_support_status(&self) -> SelfTestSupportStatus {
        *self.signals.self_test_support.get_or_init(|| match self.parse_status {
            ParseStatus::Full => {
                if self.properties.has_properties_for_section(PropertySection::SelftestLog) {
                    SelfTestSupportStatus::Supported
                } else {
                    SelfTestSupportStatus::Unsupported
                }
            }
            ParseStatus::Basic => {
                if self.smart_status() == SmartStatus::Enabled {
                    SelfTestSupportStatus::Unknown
                } else {
                    SelfTestSupportStatus::Unsupported
                }
            }
            ParseStatus::None => SelfTestSupportStatus::Unknown,
        })
    }

    /// Whether SMART can be switched on and off from here
    pub fn smart_switch_supported(&self) -> bool {
        !self.is_virtual()
            && self.smart_status() != SmartStatus::Unsupported
            && self.detected_type != DetectedType::Nvme
    }

    pub fn test_is_active(&self) -> bool {
        self.test_is_active
    }

    /// Mark a self-test as running; observers hear about actual changes only
    pub fn set_test_is_active(&mut self, active: bool) {
        if self.test_is_active == active {
            return;
        }
        self.test_is_active = active;
        self.invalidate_signals();
        self.notify(ChangeReason::TestActivity);
    }

    fn invalidate_signals(&mut self) {
        self.signals = SignalCache::default();
    }

    fn reset_parse_status(&mut self) {
        self.parse_status = ParseStatus::None;
        self.invalidate_signals();
    }

    fn notify(&mut self, reason: ChangeReason) {
        self.generation += 1;
        let event = DeviceEvent {
            device: self.display_name(),
            generation: self.generation,
            reason,
        };
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn ensure_idle(&self) -> Result<(), DeviceError> {
        if self.test_is_active {
            return Err(DeviceError::TestRunning);
        }
        Ok(())
    }

    fn ensure_real(&self) -> Result<(), DeviceError> {
        if self.is_virtual() {
            return Err(DeviceError::CannotExecuteOnVirtual);
        }
        Ok(())
    }

    /// Run `f` with this device's command-line target
    fn with_target<R>(&self, ctx: &SmartctlContext, f: impl FnOnce(&DeviceTarget<'_>) -> R) -> R {
        let config_options = ctx.device_options(self.device(), &self.type_arg);
        let target = DeviceTarget {
            device: self.device(),
            type_arg: &self.type_arg,
            extra_args: &self.extra_args,
            config_options: &config_options,
        };
        f(&target)
    }

    fn phase_arguments(&self, ctx: &SmartctlContext, phase: FetchPhase) -> Option<Vec<String>> {
        self.with_target(ctx, |target| {
            command_builder::build_arguments(
                phase,
                target,
                self.detected_type,
                ctx.formats(),
                &ctx.settings().default_options,
            )
        })
    }

    /// Run smartctl against this device
    ///
    /// Returns whatever stdout was captured, even on failure. With
    /// `check_type`, a failed run asking for `-d` marks the type as needing one.
    async fn execute_device_smartctl(
        &mut self,
        ctx: &SmartctlContext,
        args: Vec<String>,
        check_type: bool,
    ) -> (String, Result<(), DeviceError>) {
        if self.is_virtual() {
            warn!("Cannot execute smartctl on a virtual device");
            return (String::new(), Err(DeviceError::CannotExecuteOnVirtual));
        }

        let run = ctx.execute(args).await;
        match run.error {
            None => (run.stdout, Ok(())),
            Some(message) => {
                warn!("Error while executing smartctl for {}: {}", self.device_with_type(), message);
                if check_type
                    && self.detected_type == DetectedType::Unknown
                    && NEEDS_EXPLICIT_TYPE_RE.is_match(&run.stdout)
                {
                    debug!("{} needs an explicit device type", self.device_with_type());
                    self.detected_type = DetectedType::NeedsExplicitType;
                }
                (run.stdout, Err(DeviceError::ExecutionError(message)))
            }
        }
    }

    /// Fetch identity, health and capabilities, then parse them
    ///
    /// When smartctl cannot guess the interface and no `-d` was given, the
    /// fetch is repeated once with `-d scsi`.
    pub async fn fetch_basic_data_and_parse(&mut self, ctx: &SmartctlContext) -> Result<(), DeviceError> {
        self.ensure_idle()?;
        self.ensure_real()?;

        loop {
            self.reset_parse_status();
            self.basic_output.clear();
            // Full data belongs to the previous identity.
            self.full_output.clear();

            let args = self
                .phase_arguments(ctx, FetchPhase::Basic)
                .ok_or(DeviceError::TypeNotResolved)?;
            let (output, status) = self.execute_device_smartctl(ctx, args, true).await;
            self.basic_output = output;

            let executed = matches!(status, Ok(()) | Err(DeviceError::ExecutionError(_)));
            if executed
                && self.detected_type == DetectedType::NeedsExplicitType
                && self.type_arg.is_empty()
            {
                info!(
                    "smartctl needs an explicit type for {}, retrying with -d {}",
                    self.device_with_type(),
                    FALLBACK_TYPE_ARG
                );
                self.type_arg = FALLBACK_TYPE_ARG.to_string();
                self.detected_type = DetectedType::BasicScsi;
                continue;
            }

            status?;
            return self.parse_basic_data(ctx);
        }
    }

    /// Parse the current basic capture
    pub fn parse_basic_data(&mut self, ctx: &SmartctlContext) -> Result<(), DeviceError> {
        self.reset_parse_status();
        let format = self.detect_format(&self.basic_output);
        let repo = run_parser(ParserType::Basic, format, &self.basic_output)?;
        self.detected_type = self.resolve_type(ctx, &repo);
        self.apply_parse_result(repo, ParseStatus::Basic);
        Ok(())
    }

    /// Fetch everything the device family offers, then parse it
    ///
    /// The type must be resolved by a basic fetch first.
    pub async fn fetch_full_data_and_parse(&mut self, ctx: &SmartctlContext) -> Result<(), DeviceError> {
        self.ensure_idle()?;
        self.ensure_real()?;
        debug_assert!(
            !self.detected_type.is_transient(),
            "full fetch for {} before its type was resolved",
            self.device_with_type()
        );

        let args = self
            .phase_arguments(ctx, FetchPhase::Full)
            .ok_or(DeviceError::TypeNotResolved)?;

        self.reset_parse_status();
        self.full_output.clear();

        let (output, status) = self.execute_device_smartctl(ctx, args, false).await;
        status?;
        self.full_output = output;
        self.parse_full_data(ctx)
    }

    /// Parse the current full capture with the family parser
    pub fn parse_full_data(&mut self, ctx: &SmartctlContext) -> Result<(), DeviceError> {
        self.reset_parse_status();
        let format = self.detect_format(&self.full_output);
        let parser_type = ctx.formats().parser_type_for(self.detected_type, format);
        let repo = run_parser(parser_type, format, &self.full_output)?;
        self.detected_type = self.resolve_type(ctx, &repo);

        let status = if parser_type == ParserType::Basic {
            ParseStatus::Basic
        } else {
            ParseStatus::Full
        };
        self.apply_parse_result(repo, status);
        Ok(())
    }

    /// Parse a capture of unknown kind (basic or full) loaded into a virtual device
    ///
    /// The basic parser establishes identity and type; the family parser then
    /// upgrades to `Full` if it accepts the capture. Sends one notification.
    pub fn parse_any_data_for_virtual(&mut self, ctx: &SmartctlContext) -> Result<(), DeviceError> {
        self.ensure_idle()?;
        self.reset_parse_status();

        let format = detect_output_format(&self.full_output)?;
        let basic = run_parser(ParserType::Basic, format, &self.full_output)?;
        self.detected_type = self.resolve_type(ctx, &basic);

        let parser_type = ctx.formats().parser_type_for(self.detected_type, format);
        if parser_type != ParserType::Basic {
            match run_parser(parser_type, format, &self.full_output) {
                Ok(full) => {
                    self.apply_parse_result(full, ParseStatus::Full);
                    return Ok(());
                }
                Err(e) => debug!(
                    "Capture for {} is not full {:?} data: {}",
                    self.device_with_type(),
                    parser_type,
                    e
                ),
            }
        }

        self.apply_parse_result(basic, ParseStatus::Basic);
        Ok(())
    }

    /// Read the capture file behind a virtual device and parse it
    pub async fn load_virtual(&mut self, ctx: &SmartctlContext) -> Result<(), DeviceError> {
        self.ensure_idle()?;
        let Some(file) = self.virtual_file().map(Path::to_path_buf) else {
            return Err(DeviceError::Io(format!(
                "{} is not a virtual device",
                self.device_with_type()
            )));
        };

        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|e| DeviceError::Io(format!("{}: {}", file.display(), e)))?;
        self.full_output = String::from_utf8_lossy(&bytes).into_owned();
        self.parse_any_data_for_virtual(ctx)
    }

    /// Switch SMART on or off
    ///
    /// Success is read from smartctl's response text only. Does not refresh
    /// the parsed state; fetch again to see the new status.
    pub async fn set_smart_enabled(&mut self, ctx: &SmartctlContext, enable: bool) -> Result<(), DeviceError> {
        self.ensure_idle()?;

        let args = self.with_target(ctx, |target| {
            command_builder::assemble(
                target,
                &ctx.settings().default_options,
                command_builder::smart_toggle_options(enable),
            )
        });
        let (output, status) = self.execute_device_smartctl(ctx, args, false).await;

        if MANDATORY_COMMAND_FAILED_RE.is_match(&output) && !SMART_SWITCHED_RE.is_match(&output) {
            return Err(DeviceError::CommandFailed("Mandatory SMART command failed.".to_string()));
        }
        status?;

        if SMART_SWITCHED_RE.is_match(&output) {
            info!(
                "SMART {} on {}",
                if enable { "enabled" } else { "disabled" },
                self.device_with_type()
            );
            Ok(())
        } else {
            Err(DeviceError::CommandUnknownError("Unknown error occurred.".to_string()))
        }
    }

    /// Capture worth saving: the full one if present
    pub fn output_for_saving(&self) -> &str {
        if self.full_output.is_empty() {
            &self.basic_output
        } else {
            &self.full_output
        }
    }

    /// File name for saving the capture, from a `{serial}_{model}_{date}` style pattern
    pub fn save_filename(&self, pattern: &str) -> String {
        let date = Local::now().format("%Y-%m-%d_%H%M").to_string();
        let extension = match detect_output_format(self.output_for_saving()) {
            Ok(OutputFormat::Json) => "json",
            _ => "txt",
        };
        format!(
            "{}.{}",
            format_save_filename(pattern, self.serial_number(), self.model_name(), &date),
            extension
        )
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            device: self.display_name(),
            is_virtual: self.is_virtual(),
            detected_type: self.detected_type,
            parse_status: self.parse_status,
            smart_status: self.smart_status(),
            self_test_support: self.self_test_support_status(),
            smart_switch_supported: self.smart_switch_supported(),
            health_passed: self.health_property().and_then(|p| p.as_bool()),
            model: self.common.model_name.clone(),
            family: self.common.family_name.clone(),
            serial: self.common.serial_number.clone(),
            size: self.common.size.clone(),
            properties: self.properties.iter().cloned().collect(),
        }
    }

    fn detect_format(&self, output: &str) -> OutputFormat {
        detect_output_format(output).unwrap_or_else(|e| {
            warn!(
                "Cannot detect smartctl output format for {} ({}), assuming text",
                self.device_with_type(),
                e
            );
            OutputFormat::Text
        })
    }

    fn resolve_type(&self, ctx: &SmartctlContext, repo: &PropertyRepository) -> DetectedType {
        let device_base = self.device_base();
        let device_label = self.device_with_type();
        let is_optical = |base: &str| ctx.is_optical(base);
        resolve_detected_type(
            self.detected_type,
            repo,
            &ResolveContext {
                device_base: &device_base,
                device_label: &device_label,
                is_optical: &is_optical,
            },
        )
    }

    fn apply_parse_result(&mut self, repo: PropertyRepository, status: ParseStatus) {
        self.common = CommonProperties::read(&repo);
        self.properties = Arc::new(repo);
        // Without a model name the capture carried no real identity data.
        self.parse_status = if status == ParseStatus::Basic && self.common.model_name.is_none() {
            ParseStatus::None
        } else {
            status
        };
        self.invalidate_signals();
        self.notify(ChangeReason::Parsed);
    }
}

fn run_parser(parser_type: ParserType, format: OutputFormat, output: &str) -> Result<PropertyRepository, DeviceError> {
    let parser = SmartctlParser::create(parser_type, format);
    debug_assert!(parser.is_some(), "no {parser_type:?} parser for {format} output");
    let parser = parser.ok_or_else(|| DeviceError::ParseError("Cannot create parser".to_string()))?;
    Ok(parser.parse(output)?)
}

fn sanitize_filename_part(part: &str) -> String {
    part.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn format_save_filename(pattern: &str, serial: Option<&str>, model: Option<&str>, date: &str) -> String {
    pattern
        .replace("{serial}", &sanitize_filename_part(serial.unwrap_or("unknown")))
        .replace("{model}", &sanitize_filename_part(model.unwrap_or("unknown")))
        .replace("{date}", &sanitize_filename_part(date))
}
