//! Header-framed message transport.
//!
//! LSP uses a simple framing protocol over stdio:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```
//!
//! The reading and writing halves are separate types so each can be moved to
//! its own thread.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};

use crate::errors::TransportError;

const CONTENT_LENGTH: &str = "content-length";

/// Largest message body the reader will buffer.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Reads LSP-framed messages from a byte stream.
pub struct MessageReader<R> {
    reader: BufReader<R>,
}

impl<R: Read> MessageReader<R> {
    /// Wraps a raw stream, typically a child's stdout.
    #[must_use]
    pub fn new(stream: R) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    /// Receives one framed message (blocks until complete).
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between messages.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::MissingContentLength` if no Content-Length header is found,
    /// `TransportError::InvalidHeader` for a malformed length,
    /// `TransportError::MessageTooLarge` above [`MAX_MESSAGE_BYTES`], and
    /// `TransportError::Io` if reading fails or the stream ends mid-message.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(content_length) = self.read_headers()? else {
            return Ok(None);
        };
        if content_length > MAX_MESSAGE_BYTES {
            return Err(TransportError::MessageTooLarge {
                length: content_length,
                limit: MAX_MESSAGE_BYTES,
            });
        }
        let mut content = vec![0u8; content_length];
        self.reader.read_exact(&mut content)?;
        Ok(Some(content))
    }

    /// Reads headers and extracts the Content-Length value.
    fn read_headers(&mut self) -> Result<Option<usize>, TransportError> {
        let mut content_length: Option<usize> = None;
        let mut saw_header = false;

        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line)?;
            if bytes_read == 0 {
                if saw_header {
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed while reading headers",
                    )));
                }
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                if saw_header {
                    break;
                }
                // Tolerate stray blank lines between messages.
                continue;
            }
            saw_header = true;

            if let Some(length) = parse_content_length(trimmed)? {
                content_length = Some(length);
            }
            // Ignore other headers (e.g., Content-Type)
        }

        content_length
            .map(Some)
            .ok_or(TransportError::MissingContentLength)
    }
}

fn parse_content_length(header_line: &str) -> Result<Option<usize>, TransportError> {
    let Some((name, value)) = header_line.split_once(':') else {
        return Err(TransportError::InvalidHeader);
    };
    if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return Ok(None);
    }
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| TransportError::InvalidHeader)
}

/// Writes LSP-framed messages to a byte stream.
pub struct MessageWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> MessageWriter<W> {
    /// Wraps a raw stream, typically a child's stdin.
    #[must_use]
    pub fn new(stream: W) -> Self {
        Self {
            writer: BufWriter::new(stream),
        }
    }

    /// Sends one framed message and flushes it.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if writing to the stream fails.
    pub fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let header = format!("Content-Length: {}\r\n\r\n", message.len());
        self.writer.write_all(header.as_bytes())?;
        self.writer.write_all(message)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Consumes the writer and returns the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if buffered bytes cannot be flushed.
    pub fn into_inner(self) -> Result<W, TransportError> {
        self.writer
            .into_inner()
            .map_err(|error| TransportError::Io(error.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    fn written(message: &[u8]) -> Vec<u8> {
        let mut writer = MessageWriter::new(Vec::new());
        writer.send(message).expect("send failed");
        writer.into_inner().expect("flush failed")
    }

    #[rstest]
    fn sends_lsp_framed_message() {
        let bytes = written(b"test payload");

        let text = String::from_utf8(bytes).expect("invalid utf8");
        assert!(text.starts_with("Content-Length: 12\r\n\r\n"));
        assert!(text.ends_with("test payload"));
    }

    #[rstest]
    fn sends_empty_message() {
        let text = String::from_utf8(written(b"")).expect("invalid utf8");

        assert_eq!(text, "Content-Length: 0\r\n\r\n");
    }

    #[rstest]
    fn receives_lsp_framed_message() {
        let mut reader = MessageReader::new(Cursor::new(b"Content-Length: 5\r\n\r\nhello".to_vec()));

        let received = reader.receive().expect("receive failed");

        assert_eq!(received.as_deref(), Some(&b"hello"[..]));
    }

    #[rstest]
    fn receives_consecutive_messages_in_order() {
        let input = b"Content-Length: 3\r\n\r\noneContent-Length: 3\r\n\r\ntwo".to_vec();
        let mut reader = MessageReader::new(Cursor::new(input));

        let first = reader.receive().expect("first receive failed");
        let second = reader.receive().expect("second receive failed");
        let end = reader.receive().expect("end of stream should be clean");

        assert_eq!(first.as_deref(), Some(&b"one"[..]));
        assert_eq!(second.as_deref(), Some(&b"two"[..]));
        assert!(end.is_none());
    }

    #[rstest]
    #[case(&b"Content-Length: 4\r\nContent-Type: application/json\r\n\r\ntest"[..])]
    #[case(&b"content-length:4\r\n\r\ntest"[..])]
    fn accepts_header_variants(#[case] input: &[u8]) {
        let mut reader = MessageReader::new(Cursor::new(input.to_vec()));

        let received = reader.receive().expect("receive failed");

        assert_eq!(received.as_deref(), Some(&b"test"[..]));
    }

    #[rstest]
    fn handles_missing_content_length() {
        let input = b"Content-Type: application/json\r\n\r\ntest".to_vec();
        let mut reader = MessageReader::new(Cursor::new(input));

        let result = reader.receive();

        assert!(matches!(result, Err(TransportError::MissingContentLength)));
    }

    #[rstest]
    #[case(&b"Content-Length: invalid\r\n\r\ntest"[..])]
    #[case(&b"garbage without colon\r\n\r\n"[..])]
    fn handles_invalid_headers(#[case] input: &[u8]) {
        let mut reader = MessageReader::new(Cursor::new(input.to_vec()));

        let result = reader.receive();

        assert!(matches!(result, Err(TransportError::InvalidHeader)));
    }

    #[rstest]
    #[case(&b"Content-Length: 18446744073709551615\r\n\r\n"[..])]
    #[case(&b"Content-Length: 67108865\r\n\r\n"[..])]
    fn rejects_oversized_lengths_before_allocating(#[case] input: &[u8]) {
        let mut reader = MessageReader::new(Cursor::new(input.to_vec()));

        let result = reader.receive();

        assert!(
            matches!(result, Err(TransportError::MessageTooLarge { limit: MAX_MESSAGE_BYTES, .. })),
            "unexpected result: {result:?}"
        );
    }

    #[rstest]
    fn handles_eof_during_headers() {
        let mut reader = MessageReader::new(Cursor::new(b"Content-Length: 10".to_vec()));

        let result = reader.receive();

        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[rstest]
    fn handles_truncated_body() {
        let mut reader = MessageReader::new(Cursor::new(b"Content-Length: 10\r\n\r\nshort".to_vec()));

        let result = reader.receive();

        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
