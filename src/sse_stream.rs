//! Stream adapter that frames raw byte chunks into SSE events.

use crate::Error;
use futures_util::{Stream, StreamExt};
use memchr::memmem;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Upper bound on buffered bytes for a single unterminated event.
const MAX_EVENT_BYTES: usize = 1_000_000;

/// A Server-Sent Events (SSE) event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type, when the vendor names its events.
    pub event_type: Option<String>,
    /// Event data (joined across `data:` lines).
    pub data: String,
}

impl SseEvent {
    /// Whether this is the `[DONE]` sentinel some vendors use to end a stream.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Parses SSE events out of a byte stream, tolerating events split across
/// transport chunks and UTF-8 sequences split across chunk boundaries.
pub struct SseStream<S> {
    inner: S,
    /// Unconsumed raw bytes carried over between chunks.
    buffer: Vec<u8>,
    /// Parsed events not yet yielded.
    events: VecDeque<SseEvent>,
}

impl<S> SseStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Drain every complete event (terminated by a blank line) from the
    /// buffer into the event queue.
    fn parse_buffer(&mut self) -> Result<(), Error> {
        let separator = b"\n\n";
        let finder = memmem::Finder::new(separator);
        let mut start = 0;

        while let Some(pos) = finder.find(&self.buffer[start..]) {
            let event_end = start + pos;
            let event_text = std::str::from_utf8(&self.buffer[start..event_end])
                .map_err(|e| Error::provider_stream("sse", format!("invalid UTF-8: {e}")))?;

            if let Some(event) = Self::parse_event(event_text) {
                self.events.push_back(event);
            }

            start = event_end + separator.len();
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(())
    }

    /// Parse one complete event from its text form. Returns `None` when the
    /// block carries no data lines (comments, keep-alives).
    fn parse_event(event_text: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();

        for line in event_text.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some((field, mut value)) = line.split_once(':') {
                if let Some(stripped) = value.strip_prefix(' ') {
                    value = stripped;
                }
                match field {
                    "event" => event_type = Some(value.to_string()),
                    "data" => data_lines.push(value.to_string()),
                    // id/retry fields are irrelevant to the vendor protocols
                    _ => {}
                }
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
        })
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, Error>> + Unpin,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    // Some vendors end the stream without a trailing blank
                    // line; treat the leftover buffer as a final event.
                    if !self.buffer.is_empty() {
                        if let Ok(text) = std::str::from_utf8(&self.buffer) {
                            if let Some(event) = Self::parse_event(text.trim()) {
                                self.buffer.clear();
                                return Poll::Ready(Some(Ok(event)));
                            }
                        }
                        self.buffer.clear();
                    }
                    return Poll::Ready(None);
                }
            };

            self.buffer.extend_from_slice(&chunk);

            if self.buffer.len() > MAX_EVENT_BYTES {
                self.buffer.clear();
                return Poll::Ready(Some(Err(Error::provider_stream(
                    "sse",
                    "event exceeded maximum buffered size",
                ))));
            }

            if let Err(e) = self.parse_buffer() {
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn byte_stream(
        chunks: Vec<&'static [u8]>,
    ) -> impl Stream<Item = Result<bytes::Bytes, Error>> + Unpin {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(bytes::Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_complete_events() {
        let mut sse = SseStream::new(byte_stream(vec![b"data: Hello\n\ndata: World\n\n"]));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "Hello");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "World");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let mut sse = SseStream::new(byte_stream(vec![
            b"data: Hel",
            b"lo World\n\ndata: ",
            b"Second\n\n",
        ]));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "Hello World");
        assert_eq!(sse.next().await.unwrap().unwrap().data, "Second");
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_multiline_data_and_event_type() {
        let mut sse = SseStream::new(byte_stream(vec![
            b"event: content_block_delta\ndata: line 1\ndata: line 2\n\n",
        ]));

        let event = sse.next().await.unwrap().unwrap();
        assert_eq!(event.event_type.as_deref(), Some("content_block_delta"));
        assert_eq!(event.data, "line 1\nline 2");
    }

    #[tokio::test]
    async fn test_utf8_split_across_chunks() {
        // Euro sign is three bytes; split it across transport chunks.
        let euro = "€".as_bytes();
        let first = [b"data: price ".as_slice(), &euro[..2]].concat();
        let second = [&euro[2..], b"100\n\n"].concat();
        let chunks: Vec<Result<bytes::Bytes, Error>> =
            vec![Ok(bytes::Bytes::from(first)), Ok(bytes::Bytes::from(second))];
        let mut sse = SseStream::new(stream::iter(chunks));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "price €100");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_an_error() {
        let mut sse = SseStream::new(byte_stream(vec![b"data: \xFF\xFE\n\n"]));
        assert!(sse.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_stream_ends_without_final_separator() {
        let mut sse = SseStream::new(byte_stream(vec![b"data: first\n\n", b"data: [DONE]"]));

        assert_eq!(sse.next().await.unwrap().unwrap().data, "first");
        let last = sse.next().await.unwrap().unwrap();
        assert!(last.is_done());
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn test_comments_and_blank_blocks_are_skipped() {
        let mut sse = SseStream::new(byte_stream(vec![b": keep-alive\n\ndata: real\n\n"]));
        assert_eq!(sse.next().await.unwrap().unwrap().data, "real");
        assert!(sse.next().await.is_none());
    }
}
