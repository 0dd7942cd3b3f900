/// Splits a byte stream into newline-delimited lines.
///
/// Network chunks can end anywhere, including inside a JSON object or a
/// multi-byte UTF-8 sequence, so bytes are buffered until a full line is
/// available and only then decoded.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every line it completed. Blank lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(line) = decode_line(&line) {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the stream closes without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
