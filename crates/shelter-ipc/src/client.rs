//! IPC client implementation

use shelter_api::{
    AggregateQuery, AggregateResult, Command, IngestOutcome, Request, Response, ResponsePayload,
    ResponseResult, SensorReading,
};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::{IpcError, IpcResult};

/// Client connection to shelterd.
///
/// Requests are answered in order on one connection, so each call writes a
/// line and reads the next line back.
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let (read_half, write_half) = UnixStream::connect(socket_path).await?.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
        })
    }

    /// Send a command and return the raw response envelope
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut line = serde_json::to_string(&Request::new(request_id, command))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        line.clear();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let response: Response = serde_json::from_str(line.trim())?;

        // Id 0 is how the daemon answers a request it could not parse
        if response.request_id != request_id && response.request_id != 0 {
            return Err(IpcError::UnexpectedResponse(format!(
                "response to request {} while waiting for {}",
                response.request_id, request_id
            )));
        }

        Ok(response)
    }

    /// Send a command; a daemon-side error becomes `IpcError::Rejected`
    pub async fn call(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(info) => Err(IpcError::Rejected(info)),
        }
    }

    /// Submit one sensor reading
    pub async fn ingest(&mut self, reading: SensorReading) -> IpcResult<IngestOutcome> {
        match self.call(Command::IngestEvent(reading)).await? {
            ResponsePayload::Ingested(outcome) => Ok(outcome),
            other => Err(unexpected("ingest_event", &other)),
        }
    }

    /// Run an aggregate query
    pub async fn query(&mut self, query: AggregateQuery) -> IpcResult<AggregateResult> {
        match self.call(Command::Query(query)).await? {
            ResponsePayload::Aggregate(result) => Ok(result),
            other => Err(unexpected("query", &other)),
        }
    }

    pub async fn ping(&mut self) -> IpcResult<()> {
        match self.call(Command::Ping).await? {
            ResponsePayload::Pong => Ok(()),
            other => Err(unexpected("ping", &other)),
        }
    }
}

fn unexpected(command: &str, payload: &ResponsePayload) -> IpcError {
    IpcError::UnexpectedResponse(format!("{} answered with {:?}", command, payload))
}
