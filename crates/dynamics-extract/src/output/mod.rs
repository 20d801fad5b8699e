//! Output protocol: schema, record and state messages.
//!
//! Every stream is announced by one `SCHEMA` message before its first
//! `RECORD`. `STATE` messages carry the complete bookmark document after
//! each checkpoint.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use crate::discover::StreamDescriptor;
use crate::error::Result;
use crate::source::Record;
use crate::state::BookmarkState;

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message {
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
    },
    Record {
        stream: String,
        record: Record,
    },
    State {
        value: BookmarkState,
    },
}

impl Message {
    /// Schema announcement for a discovered stream.
    pub fn schema(descriptor: &StreamDescriptor) -> Self {
        Message::Schema {
            stream: descriptor.id.clone(),
            schema: descriptor.schema.to_json(),
            key_properties: descriptor.key_properties.clone(),
        }
    }
}

/// Consumer of emitted messages.
pub trait RecordSink: Send {
    /// Write one message.
    fn write_message(&mut self, message: Message) -> Result<()>;

    /// Announce a stream's schema and key properties.
    fn write_schema(&mut self, descriptor: &StreamDescriptor) -> Result<()> {
        self.write_message(Message::schema(descriptor))
    }

    /// Emit one schema-shaped record.
    fn write_record(&mut self, stream: &str, record: Record) -> Result<()> {
        self.write_message(Message::Record {
            stream: stream.to_string(),
            record,
        })
    }

    /// Emit the full bookmark state.
    fn write_state(&mut self, state: &BookmarkState) -> Result<()> {
        self.write_message(Message::State {
            value: state.clone(),
        })
    }

    /// Flush buffered output.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn write_message(&mut self, message: Message) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &message)?;
        self.writer.write_all(b"\n")?;
        // STATE lines must be durable before the next record is read
        if matches!(message, Message::State { .. }) {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects messages in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub messages: Vec<Message>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records emitted for `stream`, in order.
    pub fn records(&self, stream: &str) -> Vec<&Record> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Record { stream: s, record } if s == stream => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Every emitted state document, in order.
    pub fn states(&self) -> Vec<&BookmarkState> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::State { value } => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Names of announced streams, in order.
    pub fn schema_streams(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Schema { stream, .. } => Some(stream.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn write_message(&mut self, message: Message) -> Result<()> {
        self.messages.push(message);
        Ok(())
    }
}
