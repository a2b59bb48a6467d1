use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream;

use crate::errors::WatchError;
use crate::transport::ByteStream;

/// A line broke the framer's bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOverflow {
    /// Lines the same chunk completed before the oversized one, in order.
    pub completed: Vec<Vec<u8>>,
    pub limit: usize,
}

impl From<LineOverflow> for WatchError {
    fn from(overflow: LineOverflow) -> Self {
        Self::LineTooLong {
            limit: overflow.limit,
        }
    }
}

/// Incremental newline framer.
///
/// Lines end at `\n` or `\r\n`; boundary bytes are stripped. Chunk boundaries
/// carry no meaning, so a line may span any number of pushed chunks.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    // Bytes of `buf` already known to contain no `\n`.
    scanned: usize,
    max_line_bytes: Option<usize>,
}

impl LineFramer {
    /// Creates a framer. `None` leaves partial lines unbounded.
    pub fn new(max_line_bytes: Option<usize>) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line_bytes,
        }
    }

    /// Buffers `chunk` and returns every line it completes, in order.
    ///
    /// Line lengths exclude the boundary bytes. On overflow the lines completed
    /// ahead of the oversized one are handed back in the error and the buffer
    /// is discarded.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, LineOverflow> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = strip_cr(&self.buf[start..end]);
            if let Some(limit) = self.exceeded(line.len()) {
                return Err(self.overflow(lines, limit));
            }
            lines.push(line.to_vec());
            start = end + 1;
            self.scanned = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        // A trailing `\r` may still turn out to be half of a boundary.
        if let Some(limit) = self.exceeded(strip_cr(&self.buf).len()) {
            return Err(self.overflow(lines, limit));
        }
        Ok(lines)
    }

    /// Flushes the trailing partial line at end of stream, if any.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(strip_cr(&rest).to_vec())
    }

    fn exceeded(&self, len: usize) -> Option<usize> {
        self.max_line_bytes.filter(|limit| len > *limit)
    }

    fn overflow(&mut self, completed: Vec<Vec<u8>>, limit: usize) -> LineOverflow {
        self.buf.clear();
        self.scanned = 0;
        LineOverflow { completed, limit }
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Frames a gated body into a stream of lines.
///
/// The stream yields one item per completed line and ends (`None`) when the
/// body ends cleanly. A failing body or a line over the bound yields a single
/// `Err` after every line completed before it. Nothing is yielded after an
/// error.
pub fn frame_lines(
    body: ByteStream,
    framer: LineFramer,
) -> impl futures::Stream<Item = Result<Vec<u8>, WatchError>> + Send {
    struct State {
        body: ByteStream,
        framer: LineFramer,
        pending: VecDeque<Vec<u8>>,
        failed: Option<WatchError>,
        done: bool,
    }

    stream::try_unfold(
        State {
            body,
            framer,
            pending: VecDeque::new(),
            failed: None,
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(line) = state.pending.pop_front() {
                    return Ok(Some((line, state)));
                }
                if let Some(err) = state.failed.take() {
                    return Err(err);
                }
                if state.done {
                    return Ok(None);
                }

                match state.body.next().await {
                    Some(Ok(chunk)) => match state.framer.push_chunk(&chunk) {
                        Ok(lines) => state.pending.extend(lines),
                        Err(mut overflow) => {
                            state.pending.extend(std::mem::take(&mut overflow.completed));
                            state.failed = Some(overflow.into());
                        }
                    },
                    Some(Err(err)) => return Err(err),
                    None => {
                        state.done = true;
                        if let Some(rest) = state.framer.finish() {
                            state.pending.push_back(rest);
                        }
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: Vec<Result<&'static str, WatchError>>) -> ByteStream {
        Box::pin(stream::iter(chunks.into_iter().map(|chunk| {
            chunk.map(|text| bytes::Bytes::from_static(text.as_bytes()))
        })))
    }

    #[test]
    fn boundary_split_across_chunks_yields_one_line() {
        let mut framer = LineFramer::default();
        assert!(framer.push_chunk(br#"{"type":"ADD"#).expect("push").is_empty());
        assert!(framer.push_chunk(b"ED\"}\r").expect("push").is_empty());
        let lines = framer.push_chunk(b"\n").expect("push");
        assert_eq!(lines, vec![br#"{"type":"ADDED"}"#.to_vec()]);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn many_lines_in_one_chunk_keep_order() {
        let mut framer = LineFramer::default();
        let lines = framer.push_chunk(b"a\nb\r\n\nc").expect("push");
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec(), Vec::new()]);
        assert_eq!(framer.finish(), Some(b"c".to_vec()));
    }

    #[test]
    fn bound_rejects_partial_line_growth() {
        let mut framer = LineFramer::new(Some(4));
        assert!(framer.push_chunk(b"abcd").is_ok());
        assert_eq!(
            framer.push_chunk(b"e"),
            Err(LineOverflow {
                completed: Vec::new(),
                limit: 4
            })
        );
    }

    #[test]
    fn bound_rejects_complete_long_line() {
        let mut framer = LineFramer::new(Some(2));
        assert_eq!(
            framer.push_chunk(b"abc\n"),
            Err(LineOverflow {
                completed: Vec::new(),
                limit: 2
            })
        );
    }

    #[test]
    fn overflow_keeps_lines_completed_earlier_in_the_chunk() {
        let mut framer = LineFramer::new(Some(5));
        assert_eq!(
            framer.push_chunk(b"ok\nxxxxxxxxxx"),
            Err(LineOverflow {
                completed: vec![b"ok".to_vec()],
                limit: 5
            })
        );
    }

    #[test]
    fn bound_ignores_carriage_return_awaiting_its_newline() {
        let mut split = LineFramer::new(Some(3));
        assert_eq!(split.push_chunk(b"abc\r"), Ok(Vec::new()));
        assert_eq!(split.push_chunk(b"\n"), Ok(vec![b"abc".to_vec()]));

        let mut joined = LineFramer::new(Some(3));
        assert_eq!(joined.push_chunk(b"abc\r\n"), Ok(vec![b"abc".to_vec()]));
    }

    #[tokio::test]
    async fn frame_lines_yields_earlier_lines_before_overflow() {
        let lines: Vec<_> = frame_lines(
            body(vec![Ok("one\ntwo\nxxxxxxxx"), Ok("three\n")]),
            LineFramer::new(Some(5)),
        )
        .collect()
        .await;
        assert_eq!(
            lines,
            vec![
                Ok(b"one".to_vec()),
                Ok(b"two".to_vec()),
                Err(WatchError::LineTooLong { limit: 5 }),
            ]
        );
    }

    #[tokio::test]
    async fn frame_lines_flushes_trailing_partial_line() {
        let lines: Vec<_> = frame_lines(body(vec![Ok("one\ntw"), Ok("o")]), LineFramer::default())
            .collect()
            .await;
        assert_eq!(lines, vec![Ok(b"one".to_vec()), Ok(b"two".to_vec())]);
    }

    #[tokio::test]
    async fn frame_lines_stops_after_source_error() {
        let lines: Vec<_> = frame_lines(
            body(vec![
                Ok("one\n"),
                Err(WatchError::transport("reset")),
                Ok("two\n"),
            ]),
            LineFramer::default(),
        )
        .collect()
        .await;
        assert_eq!(
            lines,
            vec![Ok(b"one".to_vec()), Err(WatchError::transport("reset"))]
        );
    }
}
