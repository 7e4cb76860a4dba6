//! Stream capture for guest stdout/stderr.
//!
//! Every write is appended verbatim to a per-channel buffer. Capture never
//! fails: characters that do not fit an optional capacity, and bytes that are
//! not valid UTF-8, are dropped instead of raising into the guest.

use std::io;

use serde::{Deserialize, Serialize};

/// Guest output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct Buffer {
    text: String,
    chars: usize,
    dropped: usize,
    /// Trailing bytes of an incomplete UTF-8 sequence from the byte writer.
    pending: Vec<u8>,
}

impl Buffer {
    fn clear(&mut self) {
        self.text.clear();
        self.chars = 0;
        self.dropped = 0;
        self.pending.clear();
    }
}

/// Immutable snapshot of both buffers at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Per-session capture buffers.
#[derive(Debug, Default)]
pub struct StreamCapture {
    stdout: Buffer,
    stderr: Buffer,
    limit: Option<usize>,
}

impl StreamCapture {
    /// Create an unbounded capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capture holding at most `limit` characters per channel.
    #[must_use]
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Truncate both buffers. Safe to call in any state.
    pub fn reset(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
    }

    /// Append `text` to a channel.
    ///
    /// Returns the character count of `text`, including any characters
    /// dropped because the channel is full.
    pub fn write(&mut self, channel: Channel, text: &str) -> usize {
        let limit = self.limit;
        let buf = self.buffer_mut(channel);
        let offered = text.chars().count();

        let room = limit.map_or(offered, |l| l.saturating_sub(buf.chars));
        if room >= offered {
            buf.text.push_str(text);
            buf.chars += offered;
        } else {
            let cut = text.char_indices().nth(room).map_or(text.len(), |(i, _)| i);
            buf.text.push_str(&text[..cut]);
            buf.chars += room;
            if buf.dropped == 0 {
                tracing::warn!(?channel, ?limit, "capture buffer full, dropping output");
            }
            buf.dropped += offered - room;
        }
        offered
    }

    /// Current full contents of a channel. Non-destructive.
    #[must_use]
    pub fn read(&self, channel: Channel) -> &str {
        &self.buffer(channel).text
    }

    /// Number of characters dropped from a channel since the last reset.
    #[must_use]
    pub fn dropped(&self, channel: Channel) -> usize {
        self.buffer(channel).dropped
    }

    /// Byte-oriented writer for one channel.
    pub fn writer(&mut self, channel: Channel) -> CaptureWriter<'_> {
        CaptureWriter {
            capture: self,
            channel,
        }
    }

    /// Copy both buffers out.
    #[must_use]
    pub fn snapshot(&self) -> CapturedOutput {
        CapturedOutput {
            stdout: self.stdout.text.clone(),
            stderr: self.stderr.text.clone(),
        }
    }

    const fn buffer(&self, channel: Channel) -> &Buffer {
        match channel {
            Channel::Stdout => &self.stdout,
            Channel::Stderr => &self.stderr,
        }
    }

    const fn buffer_mut(&mut self, channel: Channel) -> &mut Buffer {
        match channel {
            Channel::Stdout => &mut self.stdout,
            Channel::Stderr => &mut self.stderr,
        }
    }
}

/// [`io::Write`] adapter over one capture channel.
///
/// Never returns an error. Invalid UTF-8 is dropped; an incomplete sequence
/// at the end of a write is held until the next write completes it.
pub struct CaptureWriter<'a> {
    capture: &'a mut StreamCapture,
    channel: Channel,
}

impl CaptureWriter<'_> {
    /// Whether the sink is an interactive terminal. Capture never is.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        false
    }
}

impl io::Write for CaptureWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = std::mem::take(&mut self.capture.buffer_mut(self.channel).pending);
        bytes.extend_from_slice(buf);

        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.capture.write(self.channel, text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.capture.write(self.channel, text);
                    }
                    match e.error_len() {
                        None => {
                            self.capture.buffer_mut(self.channel).pending = after.to_vec();
                            break;
                        }
                        Some(bad) => rest = &after[bad..],
                    }
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_write_appends_in_order() {
        let mut capture = StreamCapture::new();
        assert_eq!(capture.write(Channel::Stdout, "hé"), 2);
        capture.write(Channel::Stderr, "oops\n");
        capture.write(Channel::Stdout, "llo\n");
        assert_eq!(capture.read(Channel::Stdout), "héllo\n");
        assert_eq!(capture.read(Channel::Stderr), "oops\n");
        // reads are non-destructive
        assert_eq!(capture.read(Channel::Stdout), "héllo\n");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut capture = StreamCapture::new();
        capture.write(Channel::Stdout, "x");
        capture.reset();
        capture.reset();
        assert_eq!(capture.snapshot(), CapturedOutput::default());
    }

    #[test]
    fn test_limit_drops_overflow() {
        let mut capture = StreamCapture::with_limit(Some(4));
        assert_eq!(capture.write(Channel::Stdout, "abc"), 3);
        assert_eq!(capture.write(Channel::Stdout, "déf"), 3);
        assert_eq!(capture.read(Channel::Stdout), "abcd");
        assert_eq!(capture.dropped(Channel::Stdout), 2);
        assert_eq!(capture.read(Channel::Stderr), "");
    }

    #[test]
    fn test_writer_drops_invalid_utf8() {
        let mut capture = StreamCapture::new();
        let mut out = capture.writer(Channel::Stdout);
        assert_eq!(out.write(b"ok \xff\xfe done").unwrap(), 10);
        out.flush().unwrap();
        assert!(!out.is_terminal());
        assert_eq!(capture.read(Channel::Stdout), "ok  done");
    }

    #[test]
    fn test_writer_joins_split_sequences() {
        let mut capture = StreamCapture::new();
        let euro = "€".as_bytes();
        capture.writer(Channel::Stderr).write_all(&euro[..1]).unwrap();
        assert_eq!(capture.read(Channel::Stderr), "");
        capture.writer(Channel::Stderr).write_all(&euro[1..]).unwrap();
        assert_eq!(capture.read(Channel::Stderr), "€");
    }
}
