//! Incremental line framing over a raw byte stream
//!
//! The backend emits newline-delimited events, but the HTTP body arrives
//! in arbitrary chunks: a chunk boundary can fall mid-line or even mid
//! multi-byte character. The framer buffers raw bytes and only decodes
//! whole lines, so partial UTF-8 sequences simply wait in the buffer
//! until their line completes.

/// Reassembles discrete text lines from arbitrarily chunked bytes
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    /// Create a new framer with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw bytes, returning every line completed by it.
    ///
    /// Lines are split on `\n` (a trailing `\r` is stripped). Empty lines
    /// are discarded. A line that is not valid UTF-8 is logged and
    /// dropped rather than failing the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.buf.drain(..=pos).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            if raw.is_empty() {
                continue;
            }
            match String::from_utf8(raw) {
                Ok(line) => lines.push(line),
                Err(e) => {
                    tracing::debug!("dropping non-UTF-8 line ({} bytes)", e.as_bytes().len());
                }
            }
        }
        lines
    }

    /// Flush a trailing line that was never newline-terminated.
    ///
    /// Called once the underlying byte stream is exhausted.
    pub fn finish(&mut self) -> Option<String> {
        let mut raw = std::mem::take(&mut self.buf);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        if raw.is_empty() {
            return None;
        }
        match String::from_utf8(raw) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::debug!("dropping non-UTF-8 tail ({} bytes)", e.as_bytes().len());
                None
            }
        }
    }
}
