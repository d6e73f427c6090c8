//! Record framing for text streams.
//!
//! Splits arbitrarily chunked bytes into records. Two framings are accepted
//! on the same stream:
//! - newline-delimited JSON, one envelope per line
//! - Server-Sent Events, one envelope per `data:` line
//!
//! Blank lines, SSE comments and the `event:`/`id:`/`retry:` fields carry no
//! envelope and are skipped.

use session_sync_core::config::DEFAULT_MAX_RECORD_BYTES;

/// Output of the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One complete record.
    Record(String),
    /// A record longer than the configured limit was dropped.
    Oversized,
    /// A record was not valid UTF-8 and was dropped.
    InvalidUtf8,
}

/// Incremental record decoder.
#[derive(Debug)]
pub struct RecordDecoder {
    buffer: Vec<u8>,
    max_record_bytes: usize,
    discarding: bool,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORD_BYTES)
    }
}

impl RecordDecoder {
    /// Create a decoder that drops records longer than `max_record_bytes`.
    #[must_use]
    pub fn new(max_record_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_record_bytes,
            discarding: false,
        }
    }

    /// Feed a chunk; returns every record it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let line = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                // Tail of an oversized record.
                self.discarding = false;
                continue;
            }

            self.buffer.extend_from_slice(line);
            if self.buffer.len() > self.max_record_bytes {
                frames.push(self.drop_oversized());
                continue;
            }

            let line = std::mem::take(&mut self.buffer);
            frames.extend(classify(line));
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_record_bytes {
                frames.push(self.drop_oversized());
                self.discarding = true;
            }
        }

        frames
    }

    /// Flush a final record that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Frame> {
        self.discarding = false;
        let line = std::mem::take(&mut self.buffer);
        classify(line)
    }

    /// Bytes held for an incomplete record.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn drop_oversized(&mut self) -> Frame {
        tracing::warn!(
            max = self.max_record_bytes,
            buffered = self.buffer.len(),
            "Dropping oversized record"
        );
        self.buffer.clear();
        Frame::Oversized
    }
}

fn classify(line: Vec<u8>) -> Option<Frame> {
    let Ok(line) = String::from_utf8(line) else {
        tracing::warn!("Dropping record that is not valid UTF-8");
        return Some(Frame::InvalidUtf8);
    };
    let line = line.strip_suffix('\r').unwrap_or(&line);

    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.strip_prefix(' ').unwrap_or(data);
        return (!data.trim().is_empty()).then(|| Frame::Record(data.to_string()));
    }
    if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
    {
        return None;
    }
    Some(Frame::Record(line.to_string()))
}
