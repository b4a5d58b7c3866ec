//! Result set rendering
//!
//! stdout carries nothing but the result set, so it can be piped straight
//! into a test runner. Diagnostics go through `tracing` to stderr.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

use crate::error::Result;

/// How the result set is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One absolute path per line
    #[default]
    Plain,
    /// A JSON array of path strings
    Json,
}

/// Output formatter for the located test files
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_files(&self, files: &[PathBuf]) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_files(files, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Write the result set to `writer` in the configured format
    pub fn write_files(&self, files: &[PathBuf], writer: &mut impl Write) -> Result<()> {
        match self.format {
            OutputFormat::Plain => {
                for file in files {
                    writeln!(writer, "{}", file.display())?;
                }
            }
            OutputFormat::Json => {
                let paths: Vec<String> = files
                    .iter()
                    .map(|file| file.to_string_lossy().into_owned())
                    .collect();
                serde_json::to_writer_pretty(&mut *writer, &paths).map_err(std::io::Error::from)?;
                writeln!(writer)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
