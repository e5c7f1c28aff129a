use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::event::Event;

/// Protocol version written into every header
pub const PROTOCOL_VERSION: &str = "1.5.2";

/// Longest accepted header line, newline included
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// Upper bound for a declared data or payload block
pub const MAX_BLOCK_LEN: usize = 16 * 1024 * 1024;

/// Wire-level decode/encode failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header, data block or payload does not form a valid frame
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Header names an event type this peer does not speak
    #[error("malformed frame: unrecognized event type {0:?}")]
    UnknownType(String),

    /// Transport failure while reading a frame
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct FrameHeader {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    data_length: Option<usize>,
    #[serde(default)]
    payload_length: Option<usize>,
}

impl FrameHeader {
    fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let header: FrameHeader = serde_json::from_slice(line)
            .map_err(|e| ProtocolError::MalformedFrame(format!("invalid header: {}", e)))?;

        for len in [header.data_length, header.payload_length].into_iter().flatten() {
            if len > MAX_BLOCK_LEN {
                return Err(ProtocolError::MalformedFrame(format!(
                    "declared block of {} bytes exceeds {}",
                    len, MAX_BLOCK_LEN
                )));
            }
        }

        Ok(header)
    }

    fn into_event(self, data_block: Option<&[u8]>, payload: Option<Vec<u8>>) -> Result<Event, ProtocolError> {
        let mut data = self.data.unwrap_or_default();

        if let Some(block) = data_block {
            if !block.is_empty() {
                let extra: Map<String, Value> = serde_json::from_slice(block)
                    .map_err(|e| ProtocolError::MalformedFrame(format!("invalid data block: {}", e)))?;
                data.extend(extra);
            }
        }

        Event::from_parts(&self.event_type, data, payload)
    }
}

/// Encode one event as a complete frame
pub fn encode(event: &Event) -> Result<Vec<u8>, ProtocolError> {
    let data = event.data()?;
    let data_block = if data.is_empty() {
        Vec::new()
    } else {
        serde_json::to_vec(&data)
            .map_err(|e| ProtocolError::MalformedFrame(format!("unencodable data: {}", e)))?
    };
    let payload = event.payload();

    let mut header = Map::new();
    header.insert("type".into(), Value::from(event.event_type()));
    header.insert("version".into(), Value::from(PROTOCOL_VERSION));
    if !data_block.is_empty() {
        header.insert("data_length".into(), Value::from(data_block.len()));
    }
    if let Some(payload) = payload {
        header.insert("payload_length".into(), Value::from(payload.len()));
    }

    let mut frame = serde_json::to_vec(&header)
        .map_err(|e| ProtocolError::MalformedFrame(format!("unencodable header: {}", e)))?;
    frame.push(b'\n');
    frame.extend_from_slice(&data_block);
    if let Some(payload) = payload {
        frame.extend_from_slice(payload);
    }

    Ok(frame)
}

/// Decode one frame from the front of `cursor`, advancing it past the frame
pub fn decode(cursor: &mut &[u8]) -> Result<Event, ProtocolError> {
    let buf = *cursor;
    let newline = buf
        .iter()
        .take(MAX_HEADER_LEN)
        .position(|&b| b == b'\n')
        .ok_or_else(|| ProtocolError::MalformedFrame("missing or oversized header line".into()))?;

    let header = FrameHeader::parse(&buf[..newline])?;
    let mut rest = &buf[newline + 1..];

    let data_block = match header.data_length {
        Some(len) => Some(take(&mut rest, len, "data block")?),
        None => None,
    };
    let payload = match header.payload_length {
        Some(len) => Some(take(&mut rest, len, "payload")?.to_vec()),
        None => None,
    };

    let event = header.into_event(data_block, payload)?;
    *cursor = rest;
    Ok(event)
}

fn take<'a>(rest: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8], ProtocolError> {
    if rest.len() < len {
        return Err(ProtocolError::MalformedFrame(format!(
            "{} declared {} bytes, {} available",
            what,
            len,
            rest.len()
        )));
    }
    let (block, tail) = rest.split_at(len);
    *rest = tail;
    Ok(block)
}

/// Read one frame from an async stream
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Event>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_HEADER_LEN as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(ProtocolError::MalformedFrame(if read >= MAX_HEADER_LEN {
            "oversized header line".into()
        } else {
            "stream ended inside header line".into()
        }));
    }
    line.pop();

    let header = FrameHeader::parse(&line)?;

    let data_block = match header.data_length {
        Some(len) => Some(read_block(reader, len, "data block").await?),
        None => None,
    };
    let payload = match header.payload_length {
        Some(len) => Some(read_block(reader, len, "payload").await?),
        None => None,
    };

    header.into_event(data_block.as_deref(), payload).map(Some)
}

async fn read_block<R>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut block = vec![0u8; len];
    match reader.read_exact(&mut block).await {
        Ok(_) => Ok(block),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::MalformedFrame(
            format!("stream ended inside {} of {} bytes", what, len),
        )),
        Err(e) => Err(e.into()),
    }
}
