//! Newline framing for the device byte stream
//!
//! Notifications arrive in arbitrary slices of the line protocol. The framer
//! decodes them as UTF-8, accumulates text, and hands back each complete
//! `\n`-terminated line exactly once, trimmed, in arrival order.
//!
//! There is no bound on line length: a peer that never sends a newline grows
//! the buffer without limit.

// ----------------------------------------------------------------------------
// Line Framer
// ----------------------------------------------------------------------------

/// Accumulates raw chunks and yields complete protocol lines
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Decoded text not yet consumed
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence split across chunks
    undecoded: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and iterate the lines it completes
    ///
    /// The iterator is lazy. Lines it does not reach (because it was dropped
    /// early) stay buffered and come out of the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.decode(chunk);
        Lines { framer: self }
    }

    /// Text not yet emitted as a line
    ///
    /// Normally just the partial tail, but also holds complete lines an
    /// earlier iterator was dropped before reaching.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Drop everything buffered, e.g. when the link goes away
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.undecoded.clear();
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.undecoded.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.undecoded);
        let mut rest = bytes.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    self.buffer
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // incomplete sequence at the end: wait for more bytes
                            self.undecoded = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }
}

/// Complete lines produced by one [`LineFramer::feed`] call
#[derive(Debug)]
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.framer.next_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_multiple_lines() {
        let mut framer = LineFramer::new();
        let lines: Vec<_> = framer.feed(b"HELLO,a\nEV,1,2,3\n").collect();
        assert_eq!(lines, vec!["HELLO,a", "EV,1,2,3"]);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"EV,17000").count(), 0);
        assert_eq!(framer.pending(), "EV,17000");

        let lines: Vec<_> = framer.feed(b"00000,4523,17\nSY").collect();
        assert_eq!(lines, vec!["EV,1700000000,4523,17"]);
        assert_eq!(framer.pending(), "SY");
    }

    #[test]
    fn test_blank_and_whitespace_lines_are_skipped() {
        let mut framer = LineFramer::new();
        let lines: Vec<_> = framer.feed(b"\n  \r\n  CAL,0.5 \r\n\n").collect();
        assert_eq!(lines, vec!["CAL,0.5"]);
    }

    #[test]
    fn test_dropped_iterator_keeps_remaining_lines() {
        let mut framer = LineFramer::new();
        let first = framer.feed(b"A\nB\nC\n").next();
        assert_eq!(first.as_deref(), Some("A"));

        assert_eq!(framer.pending(), "B\nC\n");

        let rest: Vec<_> = framer.feed(b"").collect();
        assert_eq!(rest, vec!["B", "C"]);
    }

    #[test]
    fn test_utf8_sequence_split_across_chunks() {
        let mut framer = LineFramer::new();
        let text = "HELLO,Bänd\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert_eq!(framer.feed(&text[..split]).count(), 0);
        let lines: Vec<_> = framer.feed(&text[split..]).collect();
        assert_eq!(lines, vec!["HELLO,Bänd"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        let lines: Vec<_> = framer.feed(b"CAL,\xFF1\n").collect();
        assert_eq!(lines, vec!["CAL,\u{FFFD}1"]);
    }

    #[test]
    fn test_clear_discards_partial_tail() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"EV,1,2").count(), 0);
        framer.clear();
        let lines: Vec<_> = framer.feed(b",3\nCAL,1\n").collect();
        assert_eq!(lines, vec![",3", "CAL,1"]);
    }
}
