use std::fmt;
use std::io::Read;
use std::iter::FusedIterator;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::types::{CommonHeader, COMMON_HEADER_LEN};

/// Why a message with a complete header could not be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFault {
    /// Declared length cannot even hold the common header.
    LengthTooSmall { length: u32 },
    /// Declared length runs past the end of the input.
    LengthOverrun { length: u32, available: u64 },
}

impl fmt::Display for MessageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageFault::LengthTooSmall { length } => write!(
                f,
                "declared length {length} is smaller than the {COMMON_HEADER_LEN}-byte common header"
            ),
            MessageFault::LengthOverrun { length, available } => write!(
                f,
                "declared length {length} overruns the input, only {available} bytes remain"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("truncated common header for message #{index} at offset {offset}: {available} trailing bytes")]
    TruncatedHeader {
        index: u64,
        offset: u64,
        available: usize,
    },
    #[error("malformed message #{index} at offset {offset}: {fault}")]
    MalformedMessage {
        index: u64,
        offset: u64,
        fault: MessageFault,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Byte offset where framing failed, if the error is a framing error.
    pub fn offset(&self) -> Option<u64> {
        match self {
            ParseError::TruncatedHeader { offset, .. }
            | ParseError::MalformedMessage { offset, .. } => Some(*offset),
            ParseError::Io(_) => None,
        }
    }
}

/// Check a decoded header against the bytes left in the input.
fn check_length(
    header: &CommonHeader,
    available: u64,
    index: u64,
    offset: u64,
) -> Result<usize, ParseError> {
    let length = header.message_length;
    let fault = if (length as usize) < COMMON_HEADER_LEN {
        MessageFault::LengthTooSmall { length }
    } else if u64::from(length) > available {
        MessageFault::LengthOverrun { length, available }
    } else {
        return Ok(length as usize);
    };
    warn!(index, offset, %fault, "malformed BMP message");
    Err(ParseError::MalformedMessage {
        index,
        offset,
        fault,
    })
}

/// One framed message borrowed from the walked buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpan<'a> {
    pub index: u64,
    pub offset: usize,
    pub header: CommonHeader,
    /// The whole message, header included.
    pub bytes: &'a [u8],
}

/// Walks back-to-back BMP messages in an in-memory buffer.
///
/// Every step either yields the next message, reports a framing error, or ends.
/// After an error the walker stays exhausted; build a new one to re-scan.
#[derive(Debug, Clone)]
pub struct MessageWalker<'a> {
    data: &'a [u8],
    head: usize,
    index: u64,
    done: bool,
}

impl<'a> MessageWalker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MessageWalker {
            data,
            head: 0,
            index: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for MessageWalker<'a> {
    type Item = Result<MessageSpan<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rest = &self.data[self.head..];
        if rest.is_empty() {
            self.done = true;
            return None;
        }

        let offset = self.head as u64;
        let header = match CommonHeader::decode(rest) {
            Ok(h) => h,
            Err(e) => {
                self.done = true;
                warn!(index = self.index, offset, available = e.available, "truncated BMP header");
                return Some(Err(ParseError::TruncatedHeader {
                    index: self.index,
                    offset,
                    available: e.available,
                }));
            }
        };

        let length = match check_length(&header, rest.len() as u64, self.index, offset) {
            Ok(len) => len,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        trace!(
            index = self.index,
            offset,
            length,
            message_type = %header.message_type,
            "framed BMP message"
        );

        let span = MessageSpan {
            index: self.index,
            offset: self.head,
            header,
            bytes: &rest[..length],
        };
        self.head += length;
        self.index += 1;
        Some(Ok(span))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.data.len() - self.head;
        // one extra slot for a trailing error
        (0, Some(remaining / COMMON_HEADER_LEN + 1))
    }
}

impl FusedIterator for MessageWalker<'_> {}

/// One framed message read from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpMessage {
    pub index: u64,
    pub offset: u64,
    pub header: CommonHeader,
    /// The whole message, header included.
    pub bytes: Vec<u8>,
}

const READ_BUF_SIZE: usize = 32 * 1024;

/// Streaming counterpart of [`MessageWalker`] over any [`Read`] source.
///
/// A whole message is buffered before it is yielded. A corrupt length field
/// makes the iterator read the rest of the input before reporting the overrun,
/// so memory use is bounded by the input size rather than by the declared length.
pub struct MessageIterator<R> {
    reader: R,
    buf: Vec<u8>,
    eof: bool,
    done: bool,
    offset: u64,
    index: u64,
}

impl<R: Read> MessageIterator<R> {
    pub fn new(reader: R) -> Self {
        MessageIterator {
            reader,
            buf: Vec::with_capacity(READ_BUF_SIZE * 2),
            eof: false,
            done: false,
            offset: 0,
            index: 0,
        }
    }

    fn fill_buf(&mut self) -> Result<bool, std::io::Error> {
        if self.eof {
            return Ok(false);
        }
        let old_len = self.buf.len();
        self.buf.resize(old_len + READ_BUF_SIZE, 0);
        let n = match self.reader.read(&mut self.buf[old_len..]) {
            Ok(n) => n,
            Err(e) => {
                self.buf.truncate(old_len);
                return Err(e);
            }
        };
        self.buf.truncate(old_len + n);
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        Ok(true)
    }

    /// Read until at least `want` bytes are buffered or the reader is exhausted.
    fn fill_to(&mut self, want: usize) -> Result<(), std::io::Error> {
        while self.buf.len() < want {
            match self.fill_buf() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: ParseError) -> Option<Result<BmpMessage, ParseError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<R: Read> Iterator for MessageIterator<R> {
    type Item = Result<BmpMessage, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Err(e) = self.fill_to(COMMON_HEADER_LEN) {
            return self.fail(ParseError::Io(e));
        }

        if self.buf.is_empty() {
            debug!(messages = self.index, bytes = self.offset, "end of BMP stream");
            self.done = true;
            return None;
        }

        let header = match CommonHeader::decode(&self.buf) {
            Ok(h) => h,
            Err(e) => {
                warn!(index = self.index, offset = self.offset, available = e.available, "truncated BMP header");
                let err = ParseError::TruncatedHeader {
                    index: self.index,
                    offset: self.offset,
                    available: e.available,
                };
                return self.fail(err);
            }
        };

        if (header.message_length as usize) >= COMMON_HEADER_LEN {
            if let Err(e) = self.fill_to(header.message_length as usize) {
                return self.fail(ParseError::Io(e));
            }
        }

        let length = match check_length(&header, self.buf.len() as u64, self.index, self.offset) {
            Ok(len) => len,
            Err(e) => return self.fail(e),
        };

        let rest = self.buf.split_off(length);
        let bytes = std::mem::replace(&mut self.buf, rest);

        trace!(
            index = self.index,
            offset = self.offset,
            length,
            message_type = %header.message_type,
            "framed BMP message"
        );

        let message = BmpMessage {
            index: self.index,
            offset: self.offset,
            header,
            bytes,
        };
        self.offset += length as u64;
        self.index += 1;
        Some(Ok(message))
    }
}

impl<R: Read> FusedIterator for MessageIterator<R> {}
