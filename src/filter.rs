use std::io::{Read, Write};

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::frame::{MessageIterator, MessageWalker, ParseError};
use crate::types::{CommonHeader, MessageType};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed writing message #{index} at offset {offset}: {source}")]
    Write {
        index: u64,
        offset: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("failed flushing output: {0}")]
    Flush(#[source] std::io::Error),
}

/// Allow-list of message types to keep.
///
/// Starts out denying everything: a type passes only once it has been allowed.
/// Unknown type codes never pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeFilter {
    enabled: [bool; 7],
}

impl TypeFilter {
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn allow_all() -> Self {
        TypeFilter { enabled: [true; 7] }
    }

    pub fn allow(&mut self, kind: MessageType) -> &mut Self {
        if let Some(i) = kind.index() {
            self.enabled[i] = true;
        }
        self
    }

    pub fn allows(&self, kind: MessageType) -> bool {
        kind.index().is_some_and(|i| self.enabled[i])
    }

    pub fn is_empty(&self) -> bool {
        !self.enabled.iter().any(|&e| e)
    }

    pub fn allowed(&self) -> impl Iterator<Item = MessageType> + '_ {
        MessageType::KNOWN
            .into_iter()
            .filter(move |kind| self.allows(*kind))
    }
}

impl FromIterator<MessageType> for TypeFilter {
    fn from_iter<I: IntoIterator<Item = MessageType>>(iter: I) -> Self {
        let mut filter = TypeFilter::deny_all();
        for kind in iter {
            filter.allow(kind);
        }
        filter
    }
}

/// Per-type kept/discarded counters for one filtering run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    kept: [u64; 7],
    discarded: [u64; 7],
    unrecognized: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: MessageType, kept: bool) {
        match (kind.index(), kept) {
            (Some(i), true) => self.kept[i] += 1,
            (Some(i), false) => self.discarded[i] += 1,
            // unknown types are never kept
            (None, _) => self.unrecognized += 1,
        }
    }

    pub fn kept(&self, kind: MessageType) -> u64 {
        kind.index().map_or(0, |i| self.kept[i])
    }

    /// Discarded count for `kind`; unknown codes share the [`Statistics::unrecognized`] bucket.
    pub fn discarded(&self, kind: MessageType) -> u64 {
        kind.index().map_or(self.unrecognized, |i| self.discarded[i])
    }

    pub fn unrecognized(&self) -> u64 {
        self.unrecognized
    }

    pub fn total_kept(&self) -> u64 {
        self.kept.iter().sum()
    }

    pub fn total_discarded(&self) -> u64 {
        self.discarded.iter().sum::<u64>() + self.unrecognized
    }
}

/// Apply `filter` to one framed message, writing it to `out` if kept.
fn apply<W: Write>(
    filter: &TypeFilter,
    stats: &mut Statistics,
    out: &mut W,
    index: u64,
    offset: u64,
    header: &CommonHeader,
    bytes: &[u8],
) -> Result<(), FilterError> {
    let keep = filter.allows(header.message_type);
    stats.record(header.message_type, keep);
    if !keep {
        trace!(index, offset, message_type = %header.message_type, "discarding message");
        return Ok(());
    }
    out.write_all(bytes).map_err(|source| FilterError::Write {
        index,
        offset,
        source,
    })
}

/// Filter an in-memory BMP stream into `out`.
///
/// Kept messages are copied verbatim, in input order. On a framing error the
/// messages already written stay in `out`.
pub fn filter_buffer<W: Write>(
    data: &[u8],
    mut out: W,
    filter: &TypeFilter,
) -> Result<Statistics, FilterError> {
    let mut stats = Statistics::new();
    for span in MessageWalker::new(data) {
        let span = span?;
        apply(
            filter,
            &mut stats,
            &mut out,
            span.index,
            span.offset as u64,
            &span.header,
            span.bytes,
        )?;
    }
    finish(out, stats)
}

/// Filter a BMP stream read from `reader` into `out`.
pub fn filter_stream<R: Read, W: Write>(
    reader: R,
    mut out: W,
    filter: &TypeFilter,
) -> Result<Statistics, FilterError> {
    let mut stats = Statistics::new();
    for message in MessageIterator::new(reader) {
        let message = message?;
        apply(
            filter,
            &mut stats,
            &mut out,
            message.index,
            message.offset,
            &message.header,
            &message.bytes,
        )?;
    }
    finish(out, stats)
}

fn finish<W: Write>(mut out: W, stats: Statistics) -> Result<Statistics, FilterError> {
    out.flush().map_err(FilterError::Flush)?;
    debug!(
        kept = stats.total_kept(),
        discarded = stats.total_discarded(),
        unrecognized = stats.unrecognized(),
        "filtering done"
    );
    if stats.unrecognized() > 0 {
        info!(count = stats.unrecognized(), "discarded messages of unrecognized type");
    }
    Ok(stats)
}
