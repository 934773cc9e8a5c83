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

//! Pure parsing functions for converting raw smartctl output to facts
//!
//! These functions are pure (no side effects) and can be easily tested in isolation.
//! They take string input and return a [`PropertyRepository`] or a parsing error.

pub mod common;
pub mod json;
pub mod text;

pub use common::*;
pub use json::parse_json_output;
pub use text::{parse_ata_text, parse_basic_text, PARSER_DETECTED_DRIVE_TYPE_KEY};

use crate::domain::{OutputFormat, ParserError, ParserType, PropertyRepository};

/// Detect whether captured output is text or JSON
pub fn detect_output_format(output: &str) -> Result<OutputFormat, ParserError> {
    let trimmed = output.trim_start();
    if trimmed.is_empty() {
        return Err(ParserError::EmptyOutput);
    }
    if trimmed.starts_with('{') {
        return Ok(OutputFormat::Json);
    }
    if output.lines().any(|l| l.starts_with("smartctl ")) {
        return Ok(OutputFormat::Text);
    }
    Err(ParserError::UnknownFormat)
}

/// The closed set of parsers, one per supported (capability, format) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmartctlParser {
    BasicText,
    BasicJson,
    AtaText,
    AtaJson,
    NvmeJson,
    ScsiJson,
}

impl SmartctlParser {
    /// Select the parser for a pair, or `None` if there is no grammar for it
    pub fn create(parser_type: ParserType, format: OutputFormat) -> Option<SmartctlParser> {
        match (parser_type, format) {
            (ParserType::Basic, OutputFormat::Text) => Some(SmartctlParser::BasicText),
            (ParserType::Basic, OutputFormat::Json) => Some(SmartctlParser::BasicJson),
            (ParserType::Ata, OutputFormat::Text) => Some(SmartctlParser::AtaText),
            (ParserType::Ata, OutputFormat::Json) => Some(SmartctlParser::AtaJson),
            (ParserType::Nvme, OutputFormat::Json) => Some(SmartctlParser::NvmeJson),
            (ParserType::Scsi, OutputFormat::Json) => Some(SmartctlParser::ScsiJson),
            (ParserType::Nvme, OutputFormat::Text) | (ParserType::Scsi, OutputFormat::Text) => None,
        }
    }

    /// Whether a grammar exists for the pair
    pub fn is_supported(parser_type: ParserType, format: OutputFormat) -> bool {
        Self::create(parser_type, format).is_some()
    }

    pub fn parser_type(&self) -> ParserType {
        match self {
            SmartctlParser::BasicText | SmartctlParser::BasicJson => ParserType::Basic,
            SmartctlParser::AtaText | SmartctlParser::AtaJson => ParserType::Ata,
            SmartctlParser::NvmeJson => ParserType::Nvme,
            SmartctlParser::ScsiJson => ParserType::Scsi,
        }
    }

    pub fn parse(&self, output: &str) -> Result<PropertyRepository, ParserError> {
        match self {
            SmartctlParser::BasicText => parse_basic_text(output),
            SmartctlParser::AtaText => parse_ata_text(output),
            SmartctlParser::BasicJson
            | SmartctlParser::AtaJson
            | SmartctlParser::NvmeJson
            | SmartctlParser::ScsiJson => parse_json_output(output, self.parser_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_output_format() {
        assert_eq!(
            detect_output_format("  \n{\"json_format_version\": [1, 0]}").unwrap(),
            OutputFormat::Json
        );
        assert_eq!(
            detect_output_format("smartctl 7.3 2022-02-28 r5338\n").unwrap(),
            OutputFormat::Text
        );
        assert_eq!(
            detect_output_format("hello").unwrap_err(),
            ParserError::UnknownFormat
        );
        assert_eq!(detect_output_format("").unwrap_err(), ParserError::EmptyOutput);
    }

    #[test]
    fn test_parser_table() {
        assert_eq!(
            SmartctlParser::create(ParserType::Ata, OutputFormat::Text),
            Some(SmartctlParser::AtaText)
        );
        assert!(SmartctlParser::create(ParserType::Nvme, OutputFormat::Text).is_none());
        assert!(SmartctlParser::is_supported(ParserType::Scsi, OutputFormat::Json));
        assert_eq!(SmartctlParser::NvmeJson.parser_type(), ParserType::Nvme);
    }
}
