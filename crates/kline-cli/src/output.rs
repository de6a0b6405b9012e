//! Output formatting for kline-cli (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use kline_passthru::{Direction, ReceivedFrame};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl From<OutputFormat> for &str {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => print_csv(data),
        }
    }

    /// Print key-value pairs (for info command)
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Csv => {
                let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
                println!("{}", keys.join(","));
                let values: Vec<String> = pairs.iter().map(|(_, v)| escape_csv(v)).collect();
                println!("{}", values.join(","));
            }
        }
    }

    /// Print one frame as it arrives (monitor streaming)
    pub fn print_frame(&self, frame: &ReceivedFrame) {
        let row = FrameRow::from(frame);
        match self.format {
            OutputFormat::Table => {
                let line = frame.to_string();
                match frame.direction() {
                    Direction::Rx => println!("{}", line),
                    Direction::Tx => println!("{}", line.dimmed()),
                }
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(&row) {
                    println!("{}", json);
                }
            }
            OutputFormat::Csv => {
                println!(
                    "{},{},{},{}",
                    row.time, row.direction, row.data, row.size
                );
            }
        }
    }

    /// Header line for streamed CSV frames
    pub fn frame_header(&self) {
        if self.format == OutputFormat::Csv {
            println!("time,direction,data,size");
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    let Some(first) = data.first() else {
        return;
    };

    // Field names from the first item
    if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(first) {
        let headers: Vec<String> = map.keys().cloned().collect();
        println!("{}", headers.join(","));

        for item in data {
            if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(h)
                            .map(|v| match v {
                                serde_json::Value::String(s) => escape_csv(s),
                                other => escape_csv(&other.to_string()),
                            })
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Adapter display for adapters command
#[derive(Debug, Tabled, Serialize)]
pub struct AdapterRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Family")]
    pub family: String,
    #[tabled(rename = "Driver")]
    pub library: String,
    #[tabled(rename = "Installed")]
    pub installed: String,
}

/// Frame display for listen and monitor commands
#[derive(Debug, Tabled, Serialize)]
pub struct FrameRow {
    #[tabled(rename = "Time")]
    pub time: String,
    #[tabled(rename = "Dir")]
    pub direction: String,
    #[tabled(rename = "Data")]
    pub data: String,
    #[tabled(rename = "Size")]
    pub size: usize,
}

impl From<&ReceivedFrame> for FrameRow {
    fn from(frame: &ReceivedFrame) -> Self {
        Self {
            time: frame.received_at.format("%H:%M:%S%.3f").to_string(),
            direction: frame.direction().to_string(),
            data: frame.frame.hex(),
            size: frame.data().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("C1 33"), "C1 33");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
