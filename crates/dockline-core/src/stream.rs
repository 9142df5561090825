//! Streaming response bodies.
//!
//! Build output, pull progress, events, logs and attach sessions all arrive
//! as open-ended bodies. [`ByteStream`] hands the raw chunks to the caller;
//! [`Demuxer`] splits the daemon's stdout/stderr multiplexing frames; and
//! [`JsonDecoder`] pulls consecutive JSON documents out of progress and
//! event streams.
//!
//! ## Multiplexed frame layout
//!
//! ```text
//! ┌─────────┬─────────┬──────────────────┬─────────────────────┐
//! │ type u8 │ 0 0 0   │ size u32 (BE)    │ payload (size B)    │
//! └─────────┴─────────┴──────────────────┴─────────────────────┘
//!   0 = stdin, 1 = stdout, 2 = stderr
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use hyper::body::Incoming;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

const FRAME_HEADER_LEN: usize = 8;

/// A live response body.
///
/// Dropping the stream closes the underlying connection.
pub struct ByteStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
}

impl ByteStream {
    /// Wrap any chunk stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    pub(crate) fn from_body(body: Incoming) -> Self {
        let frames = http_body_util::BodyStream::new(body).filter_map(|frame| {
            futures::future::ready(match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(e) => Some(Err(Error::Http(e))),
            })
        });
        Self::new(frames)
    }

    /// Read the stream to the end.
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Split a multiplexed (non-TTY) stream into stdout/stderr frames.
    pub fn demux(self) -> LogStream {
        LogStream::new(self)
    }

    /// Decode the stream as a sequence of JSON documents.
    pub fn json<T>(self) -> JsonStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        JsonStream::new(self)
    }

    /// Decode the stream as build/pull/push progress messages.
    pub fn progress(self) -> JsonStream<ProgressMessage> {
        self.json()
    }
}

impl Stream for ByteStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream").finish_non_exhaustive()
    }
}

// ── Multiplexed stdout/stderr ───────────────────────────────────────────

/// One demultiplexed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    StdIn(Bytes),
    StdOut(Bytes),
    StdErr(Bytes),
}

impl LogOutput {
    /// Frame payload regardless of origin.
    pub fn bytes(&self) -> &Bytes {
        match self {
            LogOutput::StdIn(b) | LogOutput::StdOut(b) | LogOutput::StdErr(b) => b,
        }
    }
}

/// Incremental decoder for the multiplexed frame format.
///
/// Frames may straddle chunk boundaries; partial headers and payloads are
/// buffered until complete.
#[derive(Debug, Default)]
pub struct Demuxer {
    buf: BytesMut,
}

impl Demuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the wire.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<LogOutput>> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let kind = self.buf[0];
        if kind > 2 {
            return Err(Error::Frame(format!("unknown stream type {kind}")));
        }

        let size = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
        if self.buf.len() < FRAME_HEADER_LEN + size {
            return Ok(None);
        }

        self.buf.advance(FRAME_HEADER_LEN);
        let payload = self.buf.split_to(size).freeze();

        Ok(Some(match kind {
            0 => LogOutput::StdIn(payload),
            1 => LogOutput::StdOut(payload),
            _ => LogOutput::StdErr(payload),
        }))
    }

    /// Check that no partial frame is left over at end of stream.
    pub fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(Error::Frame(format!(
                "stream ended inside a frame ({} trailing bytes)",
                self.buf.len()
            )))
        }
    }
}

/// Stream of demultiplexed frames.
pub struct LogStream {
    inner: Pin<Box<dyn Stream<Item = Result<LogOutput>> + Send>>,
}

impl LogStream {
    fn new(bytes: ByteStream) -> Self {
        let frames = futures::stream::unfold(
            (bytes, Demuxer::new(), false),
            |(mut bytes, mut demuxer, done)| async move {
                if done {
                    return None;
                }
                loop {
                    match demuxer.next_frame() {
                        Ok(Some(frame)) => return Some((Ok(frame), (bytes, demuxer, false))),
                        Ok(None) => {}
                        Err(e) => return Some((Err(e), (bytes, demuxer, true))),
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => demuxer.push(&chunk),
                        Some(Err(e)) => return Some((Err(e), (bytes, demuxer, true))),
                        None => {
                            return match demuxer.finish() {
                                Ok(()) => None,
                                Err(e) => Some((Err(e), (bytes, demuxer, true))),
                            };
                        }
                    }
                }
            },
        );
        Self {
            inner: Box::pin(frames),
        }
    }
}

impl Stream for LogStream {
    type Item = Result<LogOutput>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Drive a multiplexed stream into two sinks until EOF.
///
/// Stdin echo frames go to `stdout`.
pub async fn demux_stream<O, E>(stream: ByteStream, stdout: &mut O, stderr: &mut E) -> Result<()>
where
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut frames = stream.demux();
    while let Some(frame) = frames.next().await {
        match frame? {
            LogOutput::StdOut(b) | LogOutput::StdIn(b) => stdout.write_all(&b).await?,
            LogOutput::StdErr(b) => stderr.write_all(&b).await?,
        }
    }
    stdout.flush().await?;
    stderr.flush().await?;
    Ok(())
}

/// Copy a raw stream (TTY output, tar archives) into a sink until EOF.
pub async fn copy_stream<W>(mut stream: ByteStream, out: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(total)
}

// ── JSON document streams ───────────────────────────────────────────────

/// Incremental decoder for concatenated or newline-delimited JSON.
#[derive(Debug)]
pub struct JsonDecoder<T> {
    buf: BytesMut,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self {
            buf: BytesMut::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> JsonDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete document, if one is buffered.
    pub fn next_value(&mut self) -> Result<Option<T>> {
        let (next, offset) = {
            let mut iter = serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
            let next = iter.next();
            (next, iter.byte_offset())
        };

        match next {
            None => {
                // Only whitespace left.
                self.buf.clear();
                Ok(None)
            }
            Some(Ok(value)) => {
                self.buf.advance(offset);
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(e.into()),
        }
    }

    /// Check that no partial document is left over at end of stream.
    pub fn finish(&self) -> Result<()> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(Error::Stream(format!(
                "stream ended inside a JSON document ({} trailing bytes)",
                self.buf.len()
            )))
        }
    }
}

/// Stream of decoded JSON documents.
pub struct JsonStream<T> {
    inner: Pin<Box<dyn Stream<Item = Result<T>> + Send>>,
}

impl<T> JsonStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn new(bytes: ByteStream) -> Self {
        let values = futures::stream::unfold(
            (bytes, JsonDecoder::<T>::new(), false),
            |(mut bytes, mut decoder, done)| async move {
                if done {
                    return None;
                }
                loop {
                    match decoder.next_value() {
                        Ok(Some(value)) => return Some((Ok(value), (bytes, decoder, false))),
                        Ok(None) => {}
                        Err(e) => return Some((Err(e), (bytes, decoder, true))),
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => decoder.push(&chunk),
                        Some(Err(e)) => return Some((Err(e), (bytes, decoder, true))),
                        None => {
                            return match decoder.finish() {
                                Ok(()) => None,
                                Err(e) => Some((Err(e), (bytes, decoder, true))),
                            };
                        }
                    }
                }
            },
        );
        Self {
            inner: Box::pin(values),
        }
    }
}

impl<T> Stream for JsonStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl JsonStream<ProgressMessage> {
    /// Consume a progress stream, failing on the first in-band error.
    ///
    /// The daemon reports build and pull failures inside a 200 response, so
    /// this is the only way to learn that the operation failed.
    pub async fn wait(mut self) -> Result<Vec<ProgressMessage>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await {
            messages.push(message?.into_result()?);
        }
        Ok(messages)
    }
}

/// Progress line from build, pull, push and import streams.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default, rename = "progressDetail")]
    pub progress_detail: Option<ProgressDetail>,
    /// Build output text.
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "errorDetail")]
    pub error_detail: Option<ErrorDetail>,
    #[serde(default)]
    pub aux: Option<serde_json::Value>,
}

impl ProgressMessage {
    /// Turn an in-band `error` into [`Error::Stream`].
    pub fn into_result(self) -> Result<Self> {
        let detail = self.error_detail.as_ref().and_then(|d| d.message.clone());
        match self.error.clone().or(detail) {
            Some(message) => Err(Error::Stream(message)),
            None => Ok(self),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressDetail {
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(kind: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![kind, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn chunked(data: Vec<u8>, size: usize) -> ByteStream {
        let chunks: Vec<Result<Bytes>> = data
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        ByteStream::new(futures::stream::iter(chunks))
    }

    #[test]
    fn test_demuxer_single_frames() {
        let mut d = Demuxer::new();
        d.push(&frame(1, b"out"));
        d.push(&frame(2, b"err"));
        assert_eq!(
            d.next_frame().unwrap(),
            Some(LogOutput::StdOut(Bytes::from_static(b"out")))
        );
        assert_eq!(
            d.next_frame().unwrap(),
            Some(LogOutput::StdErr(Bytes::from_static(b"err")))
        );
        assert_eq!(d.next_frame().unwrap(), None);
        d.finish().unwrap();
    }

    #[test]
    fn test_demuxer_split_at_every_offset() {
        let mut wire = frame(1, b"hello\n");
        wire.extend(frame(2, b"warning\n"));
        wire.extend(frame(1, b""));

        for split in 0..=wire.len() {
            let mut d = Demuxer::new();
            let mut out = Vec::new();
            for part in [&wire[..split], &wire[split..]] {
                d.push(part);
                while let Some(f) = d.next_frame().unwrap() {
                    out.push(f);
                }
            }
            d.finish().unwrap();
            assert_eq!(out.len(), 3, "split at {split}");
            assert_eq!(out[0].bytes().as_ref(), b"hello\n");
            assert_eq!(out[1], LogOutput::StdErr(Bytes::from_static(b"warning\n")));
        }
    }

    #[test]
    fn test_demuxer_rejects_unknown_type() {
        let mut d = Demuxer::new();
        d.push(&frame(7, b"x"));
        assert!(matches!(d.next_frame(), Err(Error::Frame(_))));
    }

    #[test]
    fn test_demuxer_truncated_frame() {
        let mut d = Demuxer::new();
        let wire = frame(1, b"partial payload");
        d.push(&wire[..10]);
        assert_eq!(d.next_frame().unwrap(), None);
        assert!(d.finish().is_err());
    }

    #[tokio::test]
    async fn test_demux_stream_routes_to_sinks() {
        let mut wire = frame(1, b"line one\n");
        wire.extend(frame(2, b"oops\n"));
        wire.extend(frame(1, b"line two\n"));

        let mut out = Vec::new();
        let mut err = Vec::new();
        demux_stream(chunked(wire, 3), &mut out, &mut err)
            .await
            .unwrap();

        assert_eq!(out, b"line one\nline two\n");
        assert_eq!(err, b"oops\n");
    }

    #[tokio::test]
    async fn test_demux_stream_reports_truncation() {
        let wire = frame(1, b"cut short");
        let truncated = wire[..wire.len() - 2].to_vec();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = demux_stream(chunked(truncated, 4), &mut out, &mut err).await;
        assert!(matches!(result, Err(Error::Frame(_))));
    }

    #[tokio::test]
    async fn test_copy_stream_counts_bytes() {
        let mut out = Vec::new();
        let n = copy_stream(chunked(b"raw tty output".to_vec(), 5), &mut out)
            .await
            .unwrap();
        assert_eq!(n, 14);
        assert_eq!(out, b"raw tty output");
    }

    #[test]
    fn test_json_decoder_concatenated_and_split() {
        let mut d = JsonDecoder::<serde_json::Value>::new();
        d.push(br#"{"a":1}{"b":"#);
        assert_eq!(d.next_value().unwrap(), Some(serde_json::json!({"a": 1})));
        assert_eq!(d.next_value().unwrap(), None);
        d.push(b"2}\n\n");
        assert_eq!(d.next_value().unwrap(), Some(serde_json::json!({"b": 2})));
        assert_eq!(d.next_value().unwrap(), None);
        d.finish().unwrap();
    }

    #[test]
    fn test_json_decoder_invalid_document() {
        let mut d = JsonDecoder::<serde_json::Value>::new();
        d.push(b"{not json}\n");
        assert!(matches!(d.next_value(), Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_progress_stream_wait_success() {
        let body = concat!(
            "{\"status\":\"Pulling from library/ubuntu\",\"id\":\"latest\"}\r\n",
            "{\"status\":\"Downloading\",\"progressDetail\":{\"current\":10,\"total\":100},\"id\":\"abc\"}\r\n",
            "{\"status\":\"Status: Downloaded newer image for ubuntu:latest\"}\r\n",
        );
        let messages = chunked(body.as_bytes().to_vec(), 7)
            .progress()
            .wait()
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[1].progress_detail.as_ref().unwrap().total,
            Some(100)
        );
    }

    #[tokio::test]
    async fn test_progress_stream_wait_in_band_error() {
        let body = concat!(
            "{\"stream\":\"Step 1/2 : FROM ubuntu\\n\"}\n",
            "{\"errorDetail\":{\"message\":\"manifest unknown\"},\"error\":\"manifest unknown\"}\n",
        );
        let result = chunked(body.as_bytes().to_vec(), 11).progress().wait().await;
        match result {
            Err(Error::Stream(msg)) => assert_eq!(msg, "manifest unknown"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_json_stream_truncated_document() {
        let mut values = chunked(br#"{"a":1}{"b""#.to_vec(), 4).json::<serde_json::Value>();
        assert!(values.next().await.unwrap().is_ok());
        assert!(matches!(values.next().await, Some(Err(Error::Stream(_)))));
        assert!(values.next().await.is_none());
    }
}
