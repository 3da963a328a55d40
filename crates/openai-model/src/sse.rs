#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Transport,
    InvalidPayload,
}

/// The source of raw bytes for an SSE stream.
pub enum ByteStream {
    Response(Response),
    #[cfg(test)]
    Preset(VecDeque<Bytes>),
}

impl ByteStream {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        ByteStream::Response(response)
    }

    #[cfg(test)]
    pub fn from_preset(chunks: impl Into<VecDeque<Bytes>>) -> Self {
        ByteStream::Preset(chunks.into())
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            ByteStream::Response(response) => {
                response.chunk().await.map_err(|err| {
                    debug!("transport error: {err}");
                    Error::Transport
                })
            }
            #[cfg(test)]
            ByteStream::Preset(chunks) => Ok(chunks.pop_front()),
        }
    }
}

/// A reader for server-sent events on top of a byte stream.
///
/// Only `data` fields are understood, which is all the chat-completions
/// endpoint produces. Event blocks are delimited by a blank line, and
/// multiple `data` lines in one block are joined with a line feed, per
/// the SSE specification.
pub struct Sse {
    buf: String,
    stream: ByteStream,
}

impl Sse {
    #[inline]
    pub fn new(stream: ByteStream) -> Self {
        Self {
            buf: String::new(),
            stream,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Flush out any complete event that is already buffered.
            while let Some(block) = self.take_block() {
                if let Some(data) = parse_block(&block)? {
                    return Ok(Some(data));
                }
                // A block with no data lines (e.g. a comment) is skipped.
            }

            let Some(bytes) = self.stream.next_chunk().await? else {
                return Ok(None);
            };
            let Ok(s) = str::from_utf8(&bytes) else {
                return Err(Error::InvalidPayload);
            };
            self.buf.push_str(s);
        }
    }

    /// Removes and returns the first blank-line-delimited block from the
    /// buffer, if one is complete.
    fn take_block(&mut self) -> Option<String> {
        let end_idx = self.buf.find("\n\n")?;
        let block = self.buf[..end_idx].to_owned();
        self.buf.drain(..end_idx + 2);
        Some(block)
    }
}

fn parse_block(block: &str) -> Result<Option<String>, Error> {
    let mut data: Option<String> = None;
    for line in block.lines() {
        if line.starts_with(':') {
            // Comment line.
            continue;
        }
        let Some(value) = line.strip_prefix("data:") else {
            // Other fields are not supported.
            return Err(Error::InvalidPayload);
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match &mut data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_owned()),
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let stream = ByteStream::from_preset(vec![
            Bytes::from_static(b"data: hello\n\n"),
            Bytes::from_static(b"data: bye\n\n"),
        ]);
        let mut sse = Sse::new(stream);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let stream = ByteStream::from_preset(vec![
            Bytes::from_static(b"data:"),
            Bytes::from_static(b" hello\n"),
            Bytes::from_static(b"\n"),
        ]);
        let mut sse = Sse::new(stream);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multi_line_data() {
        let stream = ByteStream::from_preset(vec![Bytes::from_static(
            b"data: first\ndata: second\n\n",
        )]);
        let mut sse = Sse::new(stream);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "first\nsecond");
    }

    #[tokio::test]
    async fn test_comments_are_skipped() {
        let stream = ByteStream::from_preset(vec![Bytes::from_static(
            b": keep-alive\n\ndata: hello\n\n",
        )]);
        let mut sse = Sse::new(stream);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let stream =
            ByteStream::from_preset(vec![Bytes::from_static(b"xxxxxx\n\n")]);
        let mut sse = Sse::new(stream);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        // An incomplete block is not an event.
        let stream =
            ByteStream::from_preset(vec![Bytes::from_static(b"data: hello\n")]);
        let mut sse = Sse::new(stream);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
