//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use pinsync_core::{BuildRecord, Cid, PinMode, UpdateReport};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init`.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
    pub record: String,
}

/// Output for `import`.
#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub success: bool,
    pub result_code: u8,
    pub cid: Cid,
    pub size: u64,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Output for `update`.
#[derive(Debug, Serialize)]
pub struct UpdateOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub report: UpdateReport,
}

/// One link of a directory for `ls`.
#[derive(Debug, Clone, Serialize)]
pub struct LinkInfo {
    pub name: String,
    pub cid: Cid,
    pub size: u64,
}

/// Data variants for `ls`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LsData {
    Directory { cid: Cid, links: Vec<LinkInfo> },
    Blob { cid: Cid, size: u64 },
}

/// Output for `ls`.
#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub data: LsData,
}

/// Output for `stat`.
#[derive(Debug, Serialize)]
pub struct StatOutput {
    pub success: bool,
    pub result_code: u8,
    pub cid: Cid,
    #[serde(rename = "type")]
    pub kind: String,
    pub cumulative_size: u64,
    pub locator: String,
}

/// Output for `record`.
#[derive(Debug, Serialize)]
pub struct RecordOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
    pub record: BuildRecord,
}

/// A name and its current value.
#[derive(Debug, Clone, Serialize)]
pub struct NameInfo {
    pub name: String,
    pub cid: Cid,
}

/// Output for `names publish` and `names resolve`.
#[derive(Debug, Serialize)]
pub struct NameOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub name: NameInfo,
}

/// Output for `names history`.
#[derive(Debug, Serialize)]
pub struct NamesHistoryOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub history: Vec<Cid>,
}

/// Output for `names list`.
#[derive(Debug, Serialize)]
pub struct NamesListOutput {
    pub success: bool,
    pub result_code: u8,
    pub names: Vec<NameInfo>,
}

/// Output for `names rm`.
#[derive(Debug, Serialize)]
pub struct NamesRmOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
}

/// A pinned CID.
#[derive(Debug, Clone, Serialize)]
pub struct PinInfo {
    pub cid: Cid,
    pub mode: PinMode,
}

/// Output for `pin add`.
#[derive(Debug, Serialize)]
pub struct PinAddOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub pin: PinInfo,
}

/// Output for `pin rm`.
#[derive(Debug, Serialize)]
pub struct PinRmOutput {
    pub success: bool,
    pub result_code: u8,
    pub cid: Cid,
}

/// Output for `pin ls`.
#[derive(Debug, Serialize)]
pub struct PinListOutput {
    pub success: bool,
    pub result_code: u8,
    pub pins: Vec<PinInfo>,
}

/// Output for `gc`.
#[derive(Debug, Serialize)]
pub struct GcOutput {
    pub success: bool,
    pub result_code: u8,
    pub dry_run: bool,
    pub objects_deleted: usize,
    pub bytes_freed: u64,
}
