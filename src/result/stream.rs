//! Incremental decoding of line-framed (`JSONLines_Compact`) results.
//!
//! Each line of the body is one [`StreamingFrame`]. The protocol reads just
//! enough lines to answer the cursor and never holds the whole result.

use super::table::{parse_column_types, ColumnDescriptor, Row, Statistics};
use crate::error::{ErrorDetail, FireboltError, FireboltErrorKind, ServerError, StreamProtocolError};
use crate::transport::{BodyStream, TransportError};
use crate::types::{self, TypeDescriptor};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;


/// One decoded protocol line.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamingFrame {
    Start { columns: Vec<ColumnDescriptor> },
    Data { rows: Vec<Row> },
    FinishOk { statistics: Option<Statistics> },
    FinishError { errors: Vec<ErrorDetail> },
}

#[derive(Deserialize)]
#[serde(tag = "message_type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireFrame {
    Start {
        #[serde(alias = "result_columns")]
        meta: Vec<ColumnDescriptor>,
    },
    Data {
        data: Vec<Vec<serde_json::Value>>,
    },
    FinishSuccessfully {
        #[serde(default)]
        statistics: Option<Statistics>,
    },
    FinishWithErrors {
        #[serde(default)]
        errors: Vec<ErrorDetail>,
    },
}

impl StreamingFrame {
    pub fn decode(line: &[u8]) -> Result<Self, StreamProtocolError> {
        let frame: WireFrame = serde_json::from_slice(line)
            .map_err(|_| StreamProtocolError::Malformed(String::from_utf8_lossy(line).into_owned()))?;

        Ok(match frame {
            WireFrame::Start { meta } => Self::Start { columns: meta },
            WireFrame::Data { data } => Self::Data {
                rows: data
                    .iter()
                    .map(|row| row.iter().map(types::cell_text).collect())
                    .collect(),
            },
            WireFrame::FinishSuccessfully { statistics } => Self::FinishOk { statistics },
            WireFrame::FinishWithErrors { errors } => Self::FinishError { errors },
        })
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "START",
            Self::Data { .. } => "DATA",
            Self::FinishOk { .. } => "FINISH_SUCCESSFULLY",
            Self::FinishError { .. } => "FINISH_WITH_ERRORS",
        }
    }
}


/// Splits a chunked body into lines.
struct LineReader {
    body: BodyStream,
    buffer: BytesMut,
    exhausted: bool,
}

impl LineReader {
    fn new(body: BodyStream) -> Self {
        Self { body, buffer: BytesMut::new(), exhausted: false }
    }

    /// Next line without its terminator, or `None` at end of body.
    async fn next_line(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            if let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
                let mut line = self.buffer.split_to(end + 1);
                line.truncate(end);
                if line.last() == Some(&b'\r') {
                    line.truncate(end - 1);
                }
                return Ok(Some(line.freeze()));
            }

            if self.exhausted {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.buffer.split().freeze()));
            }

            match self.body.next().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk?),
                None => self.exhausted = true,
            }
        }
    }

    fn release(&mut self) {
        self.body = Box::pin(futures_util::stream::empty());
        self.buffer.clear();
        self.exhausted = true;
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    AwaitStart,
    Streaming,
    FinishedOk,
    FinishedError,
}


/// State machine over a line-framed response body.
pub struct StreamingProtocol {
    reader: LineReader,
    state: StreamState,
    columns: Vec<ColumnDescriptor>,
    types: Vec<TypeDescriptor>,
    pending: VecDeque<Row>,
    current: Option<Row>,
    had_rows: bool,
    deferred: Option<FireboltError>,
    statistics: Option<Statistics>,
    status: u16,
    cancel: CancellationToken,
}

impl std::fmt::Debug for StreamingProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingProtocol")
            .field("state", &self.state)
            .field("columns", &self.columns)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl StreamingProtocol {
    /// Read up to the `START` frame and prefetch the first row.
    ///
    /// A failure found while prefetching is held back and reported by the
    /// first [`advance`](Self::advance); cancellation is reported right away.
    pub async fn open(
        body: BodyStream,
        status: u16,
        cancel: CancellationToken,
    ) -> Result<Self, FireboltError> {
        let mut protocol = Self {
            reader: LineReader::new(body),
            state: StreamState::AwaitStart,
            columns: vec![],
            types: vec![],
            pending: VecDeque::new(),
            current: None,
            had_rows: false,
            deferred: None,
            statistics: None,
            status,
            cancel,
        };

        while protocol.state == StreamState::AwaitStart {
            protocol.step().await?;
        }

        if let Err(e) = protocol.prefetch().await {
            if e.is_cancelled() {
                return Err(e);
            }
            protocol.deferred = Some(e);
        }

        Ok(protocol)
    }

    async fn prefetch(&mut self) -> Result<(), FireboltError> {
        while self.pending.is_empty() && self.state == StreamState::Streaming {
            self.step().await?;
        }
        Ok(())
    }

    /// Move to the next row. Returns `false` once the stream is finished.
    pub async fn advance(&mut self) -> Result<bool, FireboltError> {
        if let Some(e) = self.deferred.take() {
            self.current = None;
            return Err(e);
        }

        loop {
            if let Some(row) = self.pending.pop_front() {
                self.current = Some(row);
                return Ok(true);
            }
            if self.state != StreamState::Streaming {
                self.current = None;
                return Ok(false);
            }
            if let Err(e) = self.step().await {
                self.current = None;
                return Err(e);
            }
        }
    }

    /// Read and apply one line.
    async fn step(&mut self) -> Result<(), FireboltError> {
        let line = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::debug!("Stream cancelled in state {:?}", self.state);
                self.fail();
                return Err(FireboltErrorKind::Cancelled.into());
            },
            line = self.reader.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                return match self.state {
                    StreamState::AwaitStart => {
                        self.fail();
                        Err(StreamProtocolError::UnexpectedMessage {
                            expected: "START",
                            found: "end of stream",
                        }.into())
                    },
                    _ => {
                        tracing::warn!("Stream ended without a terminal message, treating it as finished");
                        self.state = StreamState::FinishedOk;
                        Ok(())
                    },
                };
            },
            Err(e) => {
                self.fail();
                return Err(e.into());
            },
        };

        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        let frame = match StreamingFrame::decode(&line) {
            Ok(frame) => frame,
            Err(e) => {
                self.fail();
                return Err(e.into());
            },
        };
        self.apply(frame)
    }

    fn apply(&mut self, frame: StreamingFrame) -> Result<(), FireboltError> {
        match (self.state, frame) {
            (StreamState::AwaitStart, StreamingFrame::Start { columns }) => {
                let types = match parse_column_types(&columns) {
                    Ok(types) => types,
                    Err(e) => {
                        self.fail();
                        return Err(e);
                    },
                };
                tracing::debug!("Stream started with {} column(s)", columns.len());
                self.columns = columns;
                self.types = types;
                self.state = StreamState::Streaming;
                Ok(())
            },
            (StreamState::AwaitStart, other) => {
                self.fail();
                Err(StreamProtocolError::UnexpectedMessage {
                    expected: "START",
                    found: other.message_type(),
                }.into())
            },
            (StreamState::Streaming, StreamingFrame::Data { rows }) => {
                if let Some(row) = rows.iter().find(|row| row.len() != self.columns.len()) {
                    let message = format!(
                        "row has {} cell(s), expected {}",
                        row.len(),
                        self.columns.len()
                    );
                    self.fail();
                    return Err(StreamProtocolError::Malformed(message).into());
                }
                self.had_rows |= !rows.is_empty();
                self.pending.extend(rows);
                Ok(())
            },
            (StreamState::Streaming, StreamingFrame::FinishOk { statistics }) => {
                tracing::debug!("Stream finished successfully");
                self.statistics = statistics;
                self.state = StreamState::FinishedOk;
                Ok(())
            },
            (StreamState::Streaming, StreamingFrame::FinishError { errors }) => {
                tracing::debug!("Stream finished with {} error(s)", errors.len());
                self.fail();
                Err(ServerError::from_details(self.status, errors).into())
            },
            (StreamState::Streaming, StreamingFrame::Start { .. }) => {
                self.fail();
                Err(StreamProtocolError::UnexpectedMessage {
                    expected: "DATA or FINISH",
                    found: "START",
                }.into())
            },
            (state, frame) => {
                tracing::warn!("Ignoring {} frame in state {:?}", frame.message_type(), state);
                Ok(())
            },
        }
    }

    fn fail(&mut self) {
        self.state = StreamState::FinishedError;
        self.pending.clear();
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_types(&self) -> &[TypeDescriptor] {
        &self.types
    }

    /// Whether the stream has produced any row, including prefetched ones.
    pub fn has_rows(&self) -> bool {
        self.had_rows
    }

    pub fn current(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    /// Statistics from the `FINISH_SUCCESSFULLY` frame, once it was read.
    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    /// Drop the remaining body without reading it.
    pub fn close(&mut self) {
        self.reader.release();
        self.pending.clear();
        self.current = None;
        self.deferred = None;
        if self.state == StreamState::Streaming || self.state == StreamState::AwaitStart {
            self.state = StreamState::FinishedOk;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn body(lines: &[&str]) -> BodyStream {
        let text = lines.join("\n");
        let chunks: Vec<Result<Bytes, TransportError>> = text
            .into_bytes()
            .chunks(7)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Box::pin(futures_util::stream::iter(chunks))
    }

    async fn open(lines: &[&str]) -> Result<StreamingProtocol, FireboltError> {
        StreamingProtocol::open(body(lines), 200, CancellationToken::new()).await
    }

    const START: &str = r#"{"message_type":"START","meta":[{"name":"x","type":"int"}]}"#;
    const FINISH: &str = r#"{"message_type":"FINISH_SUCCESSFULLY"}"#;

    #[test]
    fn decodes_each_frame_kind() {
        let cases: Vec<(&str, &str)> = vec![
            (START, "START"),
            (r#"{"message_type":"START","result_columns":[]}"#, "START"),
            (r#"{"message_type":"DATA","data":[[1]]}"#, "DATA"),
            (FINISH, "FINISH_SUCCESSFULLY"),
            (r#"{"message_type":"FINISH_WITH_ERRORS","errors":[{"description":"x"}]}"#, "FINISH_WITH_ERRORS"),
        ];
        for (line, expect) in cases {
            let frame = StreamingFrame::decode(line.as_bytes()).unwrap();
            assert_eq!(frame.message_type(), expect);
        }

        for line in ["not json", r#"{"message_type":"PROGRESS"}"#, r#"{"data":[]}"#] {
            assert!(matches!(
                StreamingFrame::decode(line.as_bytes()),
                Err(StreamProtocolError::Malformed(_))
            ));
        }
    }

    #[tokio::test]
    async fn yields_rows_in_order() {
        let mut protocol = open(&[START, r#"{"message_type":"DATA","data":[[1],[2]]}"#, FINISH])
            .await
            .unwrap();

        assert!(protocol.has_rows());
        assert_eq!(protocol.state(), StreamState::Streaming);

        assert!(protocol.advance().await.unwrap());
        assert_eq!(protocol.current(), Some(&vec![Some("1".to_string())]));
        assert!(protocol.advance().await.unwrap());
        assert_eq!(protocol.current(), Some(&vec![Some("2".to_string())]));
        assert!(!protocol.advance().await.unwrap());
        assert_eq!(protocol.state(), StreamState::FinishedOk);
        assert!(!protocol.advance().await.unwrap());
    }

    #[tokio::test]
    async fn accumulates_data_frames_and_skips_blank_lines() {
        let mut protocol = open(&[
            START,
            r#"{"message_type":"DATA","data":[]}"#,
            "",
            r#"{"message_type":"DATA","data":[[1]]}"#,
            r#"{"message_type":"DATA","data":[[null],[3]]}"#,
            FINISH,
        ])
        .await
        .unwrap();

        let mut seen = vec![];
        while protocol.advance().await.unwrap() {
            seen.push(protocol.current().unwrap()[0].clone());
        }
        assert_eq!(seen, vec![Some("1".to_string()), None, Some("3".to_string())]);
    }

    #[tokio::test]
    async fn finish_with_errors_surfaces_server_error() {
        let mut protocol = open(&[
            START,
            r#"{"message_type":"FINISH_WITH_ERRORS","errors":[{"name":"DivideByZero","description":"division by zero"}]}"#,
        ])
        .await
        .unwrap();

        assert!(!protocol.has_rows());
        let error = protocol.advance().await.unwrap_err();
        match error.kind {
            FireboltErrorKind::Server(server) => {
                assert_eq!(server.errors.len(), 1);
                assert!(server.message.contains("division by zero"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(protocol.state(), StreamState::FinishedError);
        assert!(!protocol.advance().await.unwrap());
    }

    #[tokio::test]
    async fn rows_before_an_error_are_still_delivered() {
        let mut protocol = open(&[
            START,
            r#"{"message_type":"DATA","data":[[1]]}"#,
            r#"{"message_type":"FINISH_WITH_ERRORS","errors":[]}"#,
        ])
        .await
        .unwrap();

        assert!(protocol.advance().await.unwrap());
        assert!(protocol.advance().await.is_err());
        assert!(!protocol.advance().await.unwrap());
    }

    #[tokio::test]
    async fn first_frame_must_be_start() {
        let error = open(&[r#"{"message_type":"DATA","data":[[1]]}"#]).await.unwrap_err();
        assert!(matches!(
            error.kind,
            FireboltErrorKind::StreamProtocol(StreamProtocolError::UnexpectedMessage {
                expected: "START",
                found: "DATA"
            })
        ));

        let error = open(&[]).await.unwrap_err();
        assert!(matches!(error.kind, FireboltErrorKind::StreamProtocol(_)));
    }

    #[tokio::test]
    async fn malformed_line_finishes_with_error() {
        let mut protocol = open(&[START, r#"{"message_type":"DATA","data":[[1]]}"#, "{oops", FINISH])
            .await
            .unwrap();

        assert!(protocol.advance().await.unwrap());
        let error = protocol.advance().await.unwrap_err();
        assert!(matches!(
            error.kind,
            FireboltErrorKind::StreamProtocol(StreamProtocolError::Malformed(_))
        ));
        assert_eq!(protocol.state(), StreamState::FinishedError);
        assert!(!protocol.advance().await.unwrap());
    }

    #[tokio::test]
    async fn missing_terminal_frame_is_soft_end() {
        let mut protocol = open(&[START, r#"{"message_type":"DATA","data":[[7]]}"#]).await.unwrap();

        assert!(protocol.advance().await.unwrap());
        assert!(!protocol.advance().await.unwrap());
        assert_eq!(protocol.state(), StreamState::FinishedOk);
    }

    #[tokio::test]
    async fn cancellation_finishes_with_error() {
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<Bytes, TransportError>>();
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        tx.send(Ok(Bytes::from(format!("{START}\n{}\n", r#"{"message_type":"DATA","data":[[1]]}"#))))
            .unwrap();

        let mut protocol = StreamingProtocol::open(Box::pin(stream), 200, cancel.clone())
            .await
            .unwrap();
        assert!(protocol.advance().await.unwrap());

        cancel.cancel();
        let error = protocol.advance().await.unwrap_err();
        assert!(error.is_cancelled());
        assert_eq!(protocol.state(), StreamState::FinishedError);
        drop(tx);
    }
}
