//! Header-framed transport halves.
//!
//! Every message crosses the wire with the same framing the Language Server
//! Protocol uses over stdio:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```
//!
//! The read and write halves are separate types because the channel reads on
//! a dedicated thread while any caller may write.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use super::error::TransportError;

const CONTENT_LENGTH: &str = "Content-Length";

/// Largest payload accepted from a peer.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Reads framed messages from a byte stream.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a readable stream.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Receives one framed message (blocks until complete).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the stream ends cleanly between
    /// frames, [`TransportError::MissingContentLength`] or
    /// [`TransportError::InvalidHeader`] for malformed headers, and
    /// [`TransportError::Io`] if reading fails mid-frame.
    pub fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let content_length = self.read_headers()?;
        if content_length > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge {
                length: content_length,
                limit: MAX_FRAME_BYTES,
            });
        }
        let mut content = vec![0u8; content_length];
        self.reader.read_exact(&mut content)?;
        Ok(content)
    }

    /// Consumes the header block and returns the declared payload length.
    fn read_headers(&mut self) -> Result<usize, TransportError> {
        let mut content_length = None;
        let mut line = String::new();
        let mut first = true;

        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(if first {
                    TransportError::Closed
                } else {
                    TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "stream ended inside a frame header",
                    ))
                });
            }
            first = false;

            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                return content_length.ok_or(TransportError::MissingContentLength);
            }
            let Some((name, value)) = header.split_once(':') else {
                return Err(TransportError::InvalidHeader);
            };
            // Unknown headers such as Content-Type are skipped.
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let length = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| TransportError::InvalidHeader)?;
                content_length = Some(length);
            }
        }
    }
}

/// Writes framed messages to a byte stream.
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wraps a writable stream.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Sends one framed message and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if writing to the stream fails.
    pub fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", message.len());
        self.writer.write_all(header.as_bytes())?;
        self.writer.write_all(message)?;
        self.writer.flush()?;
        Ok(())
    }
}
