use std::io::IsTerminal;

use clap::ValueEnum;
use clfsctl_client::{FsckReply, Message, PongLag};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct LagOutput {
    event: &'static str,
    id: u64,
    lag_micros: i64,
    lag_ms: f64,
}

pub fn print_lag(id: u64, lag: PongLag, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&LagOutput {
            event: "pong",
            id,
            lag_micros: lag.micros,
            lag_ms: lag.as_millis_f64(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("PONG received, lag is {lag}");
        }
        OutputFormat::Raw => println!("{:.3}", lag.as_millis_f64()),
    }
}

#[derive(Serialize)]
struct FsckStartedOutput {
    event: &'static str,
    id: u64,
}

pub fn print_fsck_started(id: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&FsckStartedOutput {
            event: "fsck_requested",
            id,
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("fsck requested (id {id})"),
        OutputFormat::Raw => println!("{id}"),
    }
}

pub fn print_fsck(reply: &FsckReply, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(reply),
        OutputFormat::Table | OutputFormat::Pretty => {
            let details = details_line(reply.details.iter());
            if details.is_empty() {
                println!("fsck {}: {}", reply.id, reply.status);
            } else {
                println!("fsck {}: {} {details}", reply.id, reply.status);
            }
        }
    }
}

/// Print any message, typed or not, as it would appear on the wire.
pub fn print_message(message: &Message, format: OutputFormat) {
    let object = match message.to_object() {
        Ok(object) => object,
        Err(err) => {
            eprintln!("unprintable {} message: {err}", message.command());
            return;
        }
    };

    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&object),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "ID", "FIELDS"])
                .add_row(vec![
                    message.command().to_string(),
                    message.id().map(|id| id.to_string()).unwrap_or_default(),
                    details_line(object.iter().filter(|(key, _)| !is_envelope(key))),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} id={} {}",
                message.command(),
                message
                    .id()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                details_line(object.iter().filter(|(key, _)| !is_envelope(key)))
            );
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn is_envelope(key: &str) -> bool {
    key == "command" || key == "id"
}

/// `key=value` pairs, with strings left unquoted.
pub fn details_line<'a>(fields: impl Iterator<Item = (&'a String, &'a Value)>) -> String {
    fields
        .map(|(key, value)| match value {
            Value::String(text) => format!("{key}={text}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
