//! Length + crc32c framing for request/response bodies.
//!
//! Header layout: `len: u32 LE`, `crc32c(body): u32 LE`, then `len` body
//! bytes. Empty bodies are invalid.

use std::io::{self, Read, Write};

use crc32c::crc32c;
use thiserror::Error;

pub const FRAME_HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("frame length invalid: {reason}")]
    LengthInvalid { reason: String },
    #[error("frame too large: max {max_frame_bytes} got {got_bytes}")]
    TooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },
    #[error("frame crc mismatch: expected {expected} got {got}")]
    CrcMismatch { expected: u32, got: u32 },
}

pub struct FrameReader<R> {
    reader: R,
    max_frame_bytes: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            max_frame_bytes,
        }
    }

    /// Reads one frame body. `Ok(None)` means the peer closed the stream
    /// cleanly between frames.
    pub fn read_next(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        if !fill(&mut self.reader, &mut header, "frame header truncated")? {
            return Ok(None);
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if length == 0 {
            return Err(FrameError::LengthInvalid {
                reason: "frame length cannot be zero".to_string(),
            });
        }
        if length > self.max_frame_bytes {
            return Err(FrameError::TooLarge {
                max_frame_bytes: self.max_frame_bytes,
                got_bytes: length,
            });
        }
        let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let mut body = vec![0u8; length];
        if !fill(&mut self.reader, &mut body, "frame body truncated")? {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "frame body missing").into());
        }

        let got = crc32c(&body);
        if got != expected {
            return Err(FrameError::CrcMismatch { expected, got });
        }
        Ok(Some(body))
    }
}

/// Fills `buf` completely. Returns `false` on EOF before the first byte.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8], truncated: &str) -> Result<bool, FrameError> {
    let mut read = 0usize;
    while read < buf.len() {
        let n = match reader.read(&mut buf[read..]) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if n == 0 {
            if read == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, truncated.to_string()).into());
        }
        read += n;
    }
    Ok(true)
}

pub struct FrameWriter<W> {
    writer: W,
    max_frame_bytes: usize,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W, max_frame_bytes: usize) -> Self {
        Self {
            writer,
            max_frame_bytes,
        }
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<usize, FrameError> {
        let frame = encode_frame(payload, self.max_frame_bytes)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(frame.len())
    }
}

pub fn encode_frame(payload: &[u8], max_frame_bytes: usize) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::LengthInvalid {
            reason: "frame length cannot be zero".to_string(),
        });
    }
    if payload.len() > max_frame_bytes {
        return Err(FrameError::TooLarge {
            max_frame_bytes,
            got_bytes: payload.len(),
        });
    }
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::LengthInvalid {
        reason: "frame length exceeds u32".to_string(),
    })?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&crc32c(payload).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}
