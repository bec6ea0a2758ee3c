use super::output::{CommandOutput, CommandStatus};

use serde_json::Value;
use std::fmt::Write;


pub fn setup_logging(verbose: u8, quiet: bool, json: bool) {
    if json {
        // Mute all logging if JSON output is enabled
        tracing::subscriber::set_global_default(tracing::subscriber::NoSubscriber::default())
            .expect("Setting no-op subscriber failed");
        return;
    }

    let level = if quiet {
        tracing::Level::ERROR
    } else { match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }};

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default subscriber failed!");
}


/// Prints the command result to stdout, or its error through the log.
pub fn render_human_output(output: &CommandOutput<Value>) {
    match output.status {
        CommandStatus::Success => {
            if let Some(data) = &output.data {
                print!("{}", render_data(data));
            }
        },
        CommandStatus::Error => {
            if let Some(error) = &output.error {
                tracing::error!("{} failed: {}", output.command, error.message());
            }
        },
    }
}

/// Rows as tab-separated text under a header line; anything else as
/// `key: value` lines.
fn render_data(data: &Value) -> String {
    let mut text = String::new();

    if let (Some(columns), Some(rows)) = (data["columns"].as_array(), data["rows"].as_array()) {
        let header: Vec<&str> = columns
            .iter()
            .map(|column| column["name"].as_str().unwrap_or(""))
            .collect();
        let _ = writeln!(text, "{}", header.join("\t"));

        for row in rows {
            let cells: Vec<String> = row
                .as_array()
                .map(|cells| cells.iter().map(render_cell).collect())
                .unwrap_or_default();
            let _ = writeln!(text, "{}", cells.join("\t"));
        }
        return text;
    }

    if let Some(fields) = data.as_object() {
        for (key, value) in fields {
            let _ = writeln!(text, "{}: {}", key, render_cell(value));
        }
    }
    text
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
