use crate::types::{Fields, Record, Sink, Tags};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::Write;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Writes records as influx line protocol, one line per record.
pub struct LineProtocolSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LineProtocolSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl LineProtocolSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> Sink for LineProtocolSink<W> {
    fn emit(
        &self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let line = format_line(measurement, &fields, &tags, timestamp)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("line protocol writer poisoned"))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

pub fn format_line(
    measurement: &str,
    fields: &Fields,
    tags: &Tags,
    timestamp: DateTime<Utc>,
) -> Result<String> {
    if fields.is_empty() {
        bail!("record for {} has no fields", measurement);
    }

    let mut line = escape(measurement, &[',', ' ']);
    for (key, value) in tags {
        let key = escape(key, &[',', '=', ' ']);
        let value = escape(value, &[',', '=', ' ']);
        // Empty tag keys or values are not representable.
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&key);
        line.push('=');
        line.push_str(&value);
    }

    let rendered: Vec<String> = fields
        .iter()
        .map(|(key, value)| format!("{}={}", escape(key, &[',', '=', ' ']), field_value(value)))
        .collect();
    line.push(' ');
    line.push_str(&rendered.join(","));

    let nanos = timestamp
        .timestamp_nanos_opt()
        .ok_or_else(|| anyhow!("timestamp {} out of range", timestamp))?;
    line.push(' ');
    line.push_str(&nanos.to_string());
    Ok(line)
}

fn field_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => format!("{}i", n),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

/// Quoted string field. Line breaks are dropped so a record stays on one line.
fn quote(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        match c {
            '\n' | '\r' => continue,
            '\\' | '"' => quoted.push('\\'),
            _ => {}
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        // Line breaks cannot be escaped in keys or tag values.
        if c == '\n' || c == '\r' {
            continue;
        }
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Hands records to an in-process consumer over an unbounded channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Record>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Sink for ChannelSink {
    fn emit(
        &self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.sender
            .send(Record {
                measurement: measurement.to_string(),
                tags,
                fields,
                timestamp,
            })
            .map_err(|_| anyhow!("record receiver dropped"))
    }
}
