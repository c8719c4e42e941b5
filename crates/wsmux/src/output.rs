use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use wsmux_frame::RAW_STREAM_ID;

#[derive(Clone, Debug, Copy, ValueEnum)]
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
struct MessageOutput<'a> {
    stream_id: u32,
    mode: &'a str,
    path: &'a str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

/// One message received on a stream.
pub struct Received<'a> {
    pub stream_id: u32,
    pub path: &'a str,
    pub payload: &'a [u8],
}

pub fn print_message(message: &Received<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                stream_id: message.stream_id,
                mode: stream_mode(message.stream_id),
                path: message.path,
                payload_size: message.payload.len(),
                payload: payload_preview(message.payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STREAM", "MODE", "PATH", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    message.stream_id.to_string(),
                    stream_mode(message.stream_id).to_string(),
                    message.path.to_string(),
                    message.payload.len().to_string(),
                    payload_preview(message.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "stream={} ({}) path={} size={} payload={}",
                message.stream_id,
                stream_mode(message.stream_id),
                message.path,
                message.payload.len(),
                payload_preview(message.payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(message.payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn stream_mode(stream_id: u32) -> &'static str {
    if stream_id == RAW_STREAM_ID {
        "compat"
    } else {
        "mux"
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_marks_binary() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }

    #[test]
    fn raw_stream_is_compat_mode() {
        assert_eq!(stream_mode(0), "compat");
        assert_eq!(stream_mode(17), "mux");
    }
}
