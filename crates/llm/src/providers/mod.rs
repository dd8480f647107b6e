//! Generation provider implementations.

pub mod claude;
pub mod ollama;

pub use claude::ClaudeClient;
pub use ollama::OllamaClient;

/// Reassembles newline-delimited records from arbitrary byte chunks.
///
/// HTTP chunk boundaries do not align with NDJSON or SSE lines; a record may
/// be split across several chunks, and so may a multi-byte character. Bytes
/// are only decoded once a whole line has arrived.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every complete, non-empty line.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_joins_split_records() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"response\":\"Hel").is_empty());
        let lines = buffer.push(b"lo\"}\n{\"response\":\"!\"}\n\n");
        assert_eq!(lines, vec!["{\"response\":\"Hello\"}", "{\"response\":\"!\"}"]);
    }

    #[test]
    fn test_line_buffer_strips_crlf() {
        let mut buffer = LineBuffer::default();
        let lines = buffer.push(b"data: {}\r\n\r\n");
        assert_eq!(lines, vec!["data: {}"]);
    }

    #[test]
    fn test_line_buffer_keeps_split_hangul_intact() {
        let record = "{\"response\":\"보스\"}\n".as_bytes();
        // '보' starts right after the opening quote; cut inside its encoding.
        let cut = record.iter().position(|&b| b >= 0x80).unwrap() + 1;

        let mut buffer = LineBuffer::default();
        assert!(buffer.push(&record[..cut]).is_empty());
        let lines = buffer.push(&record[cut..]);
        assert_eq!(lines, vec!["{\"response\":\"보스\"}"]);
    }
}
