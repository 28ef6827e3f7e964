//! Wire format between the parent and an isolated worker.
//!
//! Every frame is `[tag: u8][len: u32 big-endian][payload]`. The parent sends one
//! request frame on the worker's stdin; the worker answers on stdout with a body frame
//! (or the empty no-body frame) followed by the envelope frame, then closes the stream.

use super::error::IsolatedError;
use crate::context::RequestContext;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

pub const TAG_REQUEST: u8 = b'R';
pub const TAG_BODY: u8 = b'B';
pub const TAG_NO_BODY: u8 = b'N';
pub const TAG_ENVELOPE: u8 = b'E';

pub const HEADER_LEN: usize = 5;

/// Largest payload either side will accept.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// What a worker reports about its run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status_code: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// The task failed (error or panic)
    pub faulted: bool,
    /// The task stopped itself deliberately; not a fault
    #[serde(default)]
    pub early_exit: bool,
    /// Length of the preceding body frame
    pub body_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Envelope for a run that never produced frames of its own.
    #[must_use]
    pub fn synthesized_fault(status_code: u16, error: &str) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            faulted: true,
            early_exit: false,
            body_length: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Payload of the request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task: String,
    pub request: RequestContext,
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

/// Body as seen by the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolatedBody {
    /// The worker produced output, possibly empty on a normal run
    Bytes(Vec<u8>),
    /// The worker sent the explicit no-body frame
    NotProduced,
}

impl IsolatedBody {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IsolatedBody::Bytes(b) => b,
            IsolatedBody::NotProduced => &[],
        }
    }

    #[must_use]
    pub fn is_produced(&self) -> bool {
        matches!(self, IsolatedBody::Bytes(_))
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            IsolatedBody::Bytes(b) => b,
            IsolatedBody::NotProduced => Vec::new(),
        }
    }
}

pub fn write_frame<W: Write>(out: &mut W, tag: u8, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&n| n as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "frame payload too large"))?;
    let mut header = [0u8; HEADER_LEN];
    header[0] = tag;
    header[1..].copy_from_slice(&len.to_be_bytes());
    out.write_all(&header)?;
    out.write_all(payload)
}

/// Read one frame from a stream; `Ok(None)` on a clean end of stream.
pub fn read_frame<R: Read>(input: &mut R) -> Result<Option<(u8, Vec<u8>)>, IsolatedError> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match input.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(truncated("frame header")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(IsolatedError::Io(e)),
        }
    }
    let len = frame_len(&header)?;
    let mut payload = vec![0u8; len];
    input.read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            truncated("frame payload")
        } else {
            IsolatedError::Io(e)
        }
    })?;
    Ok(Some((header[0], payload)))
}

/// Split a fully drained worker stream into body and envelope.
///
/// The stream must hold exactly a body (or no-body) frame, then an envelope frame, and
/// nothing else. The envelope's `bodyLength` must agree with the body frame.
pub fn decode_response(bytes: &[u8]) -> Result<(IsolatedBody, Envelope), IsolatedError> {
    if bytes.is_empty() {
        return Err(IsolatedError::Protocol(
            "worker closed its output without a response".to_string(),
        ));
    }
    let mut rest = bytes;

    let (tag, payload) = next_frame(&mut rest)?;
    let body = match tag {
        TAG_BODY => IsolatedBody::Bytes(payload.to_vec()),
        TAG_NO_BODY if payload.is_empty() => IsolatedBody::NotProduced,
        TAG_NO_BODY => {
            return Err(IsolatedError::Protocol(
                "no-body frame carries a payload".to_string(),
            ))
        }
        other => return Err(unexpected("body", other)),
    };

    let (tag, payload) = next_frame(&mut rest)?;
    if tag != TAG_ENVELOPE {
        return Err(unexpected("envelope", tag));
    }
    let envelope: Envelope = serde_json::from_slice(payload)
        .map_err(|e| IsolatedError::Protocol(format!("malformed envelope: {e}")))?;

    if !rest.is_empty() {
        return Err(IsolatedError::Protocol(format!(
            "{} trailing bytes after envelope",
            rest.len()
        )));
    }
    let actual = body.as_bytes().len() as u64;
    if envelope.body_length != actual {
        return Err(IsolatedError::Protocol(format!(
            "envelope declares {} body bytes, frame carried {actual}",
            envelope.body_length
        )));
    }
    Ok((body, envelope))
}

fn next_frame<'a>(rest: &mut &'a [u8]) -> Result<(u8, &'a [u8]), IsolatedError> {
    if rest.len() < HEADER_LEN {
        return Err(truncated("frame header"));
    }
    let (header, tail) = rest.split_at(HEADER_LEN);
    let len = frame_len(header)?;
    if tail.len() < len {
        return Err(truncated("frame payload"));
    }
    let (payload, tail) = tail.split_at(len);
    *rest = tail;
    Ok((header[0], payload))
}

fn frame_len(header: &[u8]) -> Result<usize, IsolatedError> {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(IsolatedError::Protocol(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }
    Ok(len)
}

fn truncated(what: &str) -> IsolatedError {
    IsolatedError::Protocol(format!("truncated {what}"))
}

fn unexpected(expected: &str, tag: u8) -> IsolatedError {
    IsolatedError::Protocol(format!(
        "expected {expected} frame, got tag {:?}",
        char::from(tag)
    ))
}
