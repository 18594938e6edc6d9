use std::borrow::Cow;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use netplay_frame::{hex_dump, DeflateFilter, Envelope, PayloadFilter};
use serde::Serialize;

/// Longest payload preview shown before truncation.
const PREVIEW_LIMIT: usize = 256;

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
struct EnvelopeOutput<'a> {
    type_id: u16,
    options: String,
    compressed: bool,
    wire_size: usize,
    payload_size: usize,
    payload: String,
    sender: &'a str,
    timestamp: String,
}

pub fn print_envelope(envelope: &Envelope, sender: &str, format: OutputFormat) {
    let payload = readable_payload(envelope);
    match format {
        OutputFormat::Json => {
            let out = EnvelopeOutput {
                type_id: envelope.type_id(),
                options: envelope.options().to_string(),
                compressed: envelope.options().is_compressed(),
                wire_size: envelope.wire_size(),
                payload_size: payload.len(),
                payload: payload_preview(&payload),
                sender,
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
                .set_header(vec!["TYPE", "OPTIONS", "SIZE", "SENDER", "PAYLOAD"])
                .add_row(vec![
                    envelope.type_id().to_string(),
                    envelope.options().to_string(),
                    payload.len().to_string(),
                    sender.to_string(),
                    payload_preview(&payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} {} size={} sender={} payload={}",
                envelope.type_id(),
                envelope.options(),
                payload.len(),
                sender,
                payload_preview(&payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(&payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Payload with compression undone when possible; raw bytes otherwise.
fn readable_payload(envelope: &Envelope) -> Cow<'_, [u8]> {
    if !envelope.options().is_compressed() {
        return Cow::Borrowed(envelope.payload().as_ref());
    }
    match DeflateFilter::default().decompress(envelope.payload()) {
        Ok(plain) => Cow::Owned(plain),
        Err(err) => {
            tracing::debug!(type_id = envelope.type_id(), error = %err, "showing compressed payload as is");
            Cow::Borrowed(envelope.payload().as_ref())
        }
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if text.len() <= PREVIEW_LIMIT => text.to_string(),
        Ok(text) => {
            let cut = (0..=PREVIEW_LIMIT)
                .rev()
                .find(|&i| text.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}… ({} bytes)", &text[..cut], text.len())
        }
        Err(_) if payload.len() <= PREVIEW_LIMIT / 3 => format!("hex:{}", hex_dump(payload)),
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
    use netplay_frame::Options;

    use super::*;

    #[test]
    fn preview_text_and_binary() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert!(payload_preview(&[0xff, 0x00]).starts_with("hex:"));
        assert_eq!(payload_preview(&vec![0xff; 1000]), "<binary 1000 bytes>");
        assert!(payload_preview("x".repeat(300).as_bytes()).ends_with("(300 bytes)"));
    }

    #[test]
    fn compressed_payload_is_shown_decompressed() {
        let packed = DeflateFilter::default()
            .compress(b"hello hello hello")
            .expect("compress should succeed");
        let envelope = Envelope::with_options(1, Options::COMPRESSED, packed);
        assert_eq!(readable_payload(&envelope).as_ref(), b"hello hello hello");
    }

    #[test]
    fn undecodable_compressed_payload_falls_back() {
        let envelope = Envelope::with_options(1, Options::COMPRESSED, &b"nope"[..]);
        assert_eq!(readable_payload(&envelope).as_ref(), b"nope");
    }
}
