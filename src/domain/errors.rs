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

use thiserror::Error;

/// Errors returned by storage device operations
///
/// Every message is suitable for direct display to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// A self-test is running on the drive; retry once it finishes
    #[error("A test is currently being performed on this drive.")]
    TestRunning,
    /// The operation needs a real device but this one replays a file
    #[error("Cannot execute smartctl on a virtual device.")]
    CannotExecuteOnVirtual,
    /// smartctl could not be run, or did not exit cleanly
    #[error("{0}")]
    ExecutionError(String),
    /// The captured output could not be interpreted
    #[error("Cannot parse smartctl output: {0}")]
    ParseError(String),
    /// The drive firmware rejected a control command
    #[error("{0}")]
    CommandFailed(String),
    /// The control command response matched no known pattern
    #[error("{0}")]
    CommandUnknownError(String),
    /// Full data was requested before the device type was resolved
    #[error("Device type has not been resolved yet; fetch basic data first.")]
    TypeNotResolved,
    /// Reading a captured output file failed
    #[error("I/O error: {0}")]
    Io(String),
}

/// Discriminant of [`DeviceError`] without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorKind {
    TestRunning,
    CannotExecuteOnVirtual,
    ExecutionError,
    ParseError,
    CommandFailed,
    CommandUnknownError,
    TypeNotResolved,
    Io,
}

impl DeviceError {
    /// Kind of this error, for matching without caring about the message
    pub fn kind(&self) -> DeviceErrorKind {
        match self {
            DeviceError::TestRunning => DeviceErrorKind::TestRunning,
            DeviceError::CannotExecuteOnVirtual => DeviceErrorKind::CannotExecuteOnVirtual,
            DeviceError::ExecutionError(_) => DeviceErrorKind::ExecutionError,
            DeviceError::ParseError(_) => DeviceErrorKind::ParseError,
            DeviceError::CommandFailed(_) => DeviceErrorKind::CommandFailed,
            DeviceError::CommandUnknownError(_) => DeviceErrorKind::CommandUnknownError,
            DeviceError::TypeNotResolved => DeviceErrorKind::TypeNotResolved,
            DeviceError::Io(_) => DeviceErrorKind::Io,
        }
    }

    /// Whether waiting and retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DeviceError::TestRunning)
    }
}

/// Errors raised by a parser when the output does not fit its grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParserError {
    /// The output format (text or JSON) could not be determined
    #[error("Unknown smartctl output format")]
    UnknownFormat,
    /// The output is empty
    #[error("Empty output received")]
    EmptyOutput,
    /// JSON syntax error
    #[error("Invalid JSON data: {0}")]
    InvalidJson(String),
    /// A section the parser depends on is absent
    #[error("{0}")]
    MissingSection(String),
    /// The output is well formed but belongs to another device family
    #[error("{0}")]
    UnsupportedData(String),
}

/// Command execution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The process could not be spawned or waited for
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),
    /// The process did not finish in time
    #[error("Command timed out: {0}")]
    Timeout(String),
    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Cannot read configuration file '{path}': {message}")]
    Read { path: String, message: String },
    /// The configuration file is not valid TOML for the settings schema
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors saving or loading captures and summaries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("Failed to write {path}: {message}")]
    WriteFailed { path: String, message: String },
    #[error("Failed to read {path}: {message}")]
    ReadFailed { path: String, message: String },
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

impl From<CommandError> for DeviceError {
    fn from(err: CommandError) -> Self {
        DeviceError::ExecutionError(err.to_string())
    }
}

impl From<ParserError> for DeviceError {
    fn from(err: ParserError) -> Self {
        DeviceError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for DeviceError {
    fn from(err: ConfigError) -> Self {
        DeviceError::ExecutionError(err.to_string())
    }
}

impl From<RepositoryError> for DeviceError {
    fn from(err: RepositoryError) -> Self {
        DeviceError::Io(err.to_string())
    }
}
