use std::path::PathBuf;

use clfsctl_frame::Object;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::{InfoArgs, Target};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct PeerCreds {
    uid: u32,
    gid: u32,
    pid: u32,
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    socket: PathBuf,
    handshake: &'a Object,
    peer_credentials: Option<PeerCreds>,
}

pub fn run(_args: InfoArgs, target: &Target, format: OutputFormat) -> CliResult<i32> {
    let socket = target.socket_path()?;
    let client = target.connect(format)?;

    let peer_credentials = client
        .connection()
        .peer_credentials()
        .map(|(uid, gid, pid)| PeerCreds { uid, gid, pid });

    let out = InfoOutput {
        socket,
        handshake: client.info(),
        peer_credentials,
    };
    print_info(&out, format);
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Raw => print_json(out.handshake),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in out.handshake {
                table.add_row(vec![key.clone(), display_value(value)]);
            }
            println!("Socket: {}", out.socket.display());
            println!("{table}");
            if let Some(c) = &out.peer_credentials {
                println!("Peer credentials: uid={} gid={} pid={}", c.uid, c.gid, c.pid);
            }
        }
        OutputFormat::Pretty => {
            println!("Daemon Info:");
            println!("  Socket:           {}", out.socket.display());
            for (key, value) in out.handshake {
                println!("  {:<17} {}", format!("{key}:"), display_value(value));
            }
            match &out.peer_credentials {
                Some(c) => println!(
                    "  Peer credentials: uid={} gid={} pid={}",
                    c.uid, c.gid, c.pid
                ),
                None => println!("  Peer credentials: unavailable"),
            }
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
