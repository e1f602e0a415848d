//! Newline framing for inbound bytes.

/// One unit extracted from the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A complete, non-blank line with trailing whitespace removed.
    Complete(Vec<u8>),
    /// A line exceeded the size limit and is being dropped.
    Oversized { limit: usize },
}

/// Accumulates bytes and yields frames delimited by `\n`.
///
/// A line longer than the limit is reported once as [`Frame::Oversized`] and
/// everything up to the next delimiter is discarded.
#[derive(Debug)]
pub(crate) struct FrameBuffer {
    pending: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl FrameBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
            discarding: false,
        }
    }

    /// Appends `bytes` and returns every frame they complete.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = bytes;
        while let Some(position) = rest.iter().position(|byte| *byte == b'\n') {
            let line = &rest[..position];
            rest = &rest[position + 1..];
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.pending.len() + line.len() > self.limit {
                self.pending.clear();
                frames.push(Frame::Oversized { limit: self.limit });
                continue;
            }
            self.pending.extend_from_slice(line);
            let mut frame = std::mem::take(&mut self.pending);
            trim_trailing_whitespace(&mut frame);
            if frame.iter().any(|byte| !byte.is_ascii_whitespace()) {
                frames.push(Frame::Complete(frame));
            }
        }

        if !self.discarding && !rest.is_empty() {
            if self.pending.len() + rest.len() > self.limit {
                self.pending.clear();
                self.discarding = true;
                frames.push(Frame::Oversized { limit: self.limit });
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        frames
    }
}

fn trim_trailing_whitespace(bytes: &mut Vec<u8>) {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |position| position + 1);
    bytes.truncate(end);
}
