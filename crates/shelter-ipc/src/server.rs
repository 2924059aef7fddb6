//! IPC server implementation

use shelter_api::{API_VERSION, ClientInfo, ClientRole, ErrorCode, ErrorInfo, Request, Response};
use shelter_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Socket file mode: owner and group may connect
const SOCKET_MODE: u32 = 0o660;

/// Message from client to server
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// IPC Server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<String>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Start listening
    pub async fn start(&mut self) -> IpcResult<()> {
        // Remove a stale socket left by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(
            &self.socket_path,
            std::fs::Permissions::from_mode(SOCKET_MODE),
        )?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);

        Ok(())
    }

    /// Get receiver for server messages
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self.listener.as_ref().ok_or(IpcError::NotStarted)?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = get_peer_uid(&stream);
                    let role = role_for_uid(uid);

                    let info = ClientInfo::new(role);
                    let info = match uid {
                        Some(u) => info.with_uid(u),
                        None => info,
                    };

                    debug!(client_id = %client_id, uid = ?uid, role = ?role, "Client accepted");

                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (read_half, write_half) = stream.into_split();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<String>();

        {
            let mut clients = self.clients.write().await;
            clients.insert(
                client_id.clone(),
                ClientHandle {
                    info: info.clone(),
                    response_tx: response_tx.clone(),
                },
            );
        }

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        let clients = self.clients.clone();
        let message_tx = self.message_tx.clone();

        // Reader: one request per line; malformed lines are answered here
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(client_id = %client_id, "Client disconnected (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match parse_request(line) {
                            Ok(request) => {
                                let _ = message_tx.send(ServerMessage::Request {
                                    client_id: client_id.clone(),
                                    request,
                                });
                            }
                            Err(reply) => {
                                warn!(
                                    client_id = %client_id,
                                    error = %reply.message,
                                    "Invalid request"
                                );
                                let response = Response::error(0, reply);
                                if let Ok(json) = serde_json::to_string(&response) {
                                    let _ = response_tx.send(json);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        debug!(client_id = %client_id, error = %e, "Read error");
                        break;
                    }
                }
            }

            // Dropping the last sender ends the writer task
            clients.write().await.remove(&client_id);
            let _ = message_tx.send(ServerMessage::ClientDisconnected { client_id });
        });

        // Writer: drains responses until every sender is gone
        tokio::spawn(async move {
            let mut writer = write_half;

            while let Some(mut msg) = response_rx.recv().await {
                msg.push('\n');
                if let Err(e) = writer.write_all(msg.as_bytes()).await {
                    debug!(error = %e, "Write error");
                    break;
                }
            }
        });
    }

    /// Send a response to a specific client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        let clients = self.clients.read().await;
        match clients.get(client_id) {
            Some(handle) => handle
                .response_tx
                .send(json)
                .map_err(|_| IpcError::ConnectionClosed),
            None => Err(IpcError::ConnectionClosed),
        }
    }

    /// Get client info
    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|h| h.info.clone())
    }

    /// Get connected client count
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decode one request line, or build the error to send back
fn parse_request(line: &str) -> Result<Request, ErrorInfo> {
    let request: Request = serde_json::from_str(line).map_err(|e| {
        ErrorInfo::new(ErrorCode::InvalidRequest, format!("malformed request: {}", e))
    })?;

    if request.api_version != API_VERSION {
        return Err(ErrorInfo::new(
            ErrorCode::InvalidRequest,
            format!(
                "unsupported api_version {}, expected {}",
                request.api_version, API_VERSION
            ),
        ));
    }

    Ok(request)
}

/// Root and the daemon's own user administer; everyone else reports
fn role_for_uid(uid: Option<u32>) -> ClientRole {
    match uid {
        Some(0) => ClientRole::Admin,
        Some(u) if u == nix::unistd::getuid().as_raw() => ClientRole::Admin,
        _ => ClientRole::Reporter,
    }
}

/// Get peer UID from Unix socket
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();

    match nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(cred) => Some(cred.uid()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IpcClient;
    use shelter_api::{Command, ResponsePayload, ResponseResult};
    use tempfile::tempdir;

    async fn started(socket_path: &Path) -> Arc<IpcServer> {
        let mut server = IpcServer::new(socket_path);
        server.start().await.unwrap();
        let server = Arc::new(server);

        let accept = server.clone();
        tokio::spawn(async move {
            let _ = accept.run().await;
        });

        server
    }

    #[tokio::test]
    async fn test_server_start() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();

        assert!(socket_path.exists());
        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, SOCKET_MODE);
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = started(&socket_path).await;
        let mut messages = server.take_message_receiver().await.unwrap();

        let responder = server.clone();
        tokio::spawn(async move {
            while let Some(msg) = messages.recv().await {
                if let ServerMessage::Request { client_id, request } = msg {
                    // Same user as the test process
                    let info = responder.get_client_info(&client_id).await.unwrap();
                    assert_eq!(info.role, ClientRole::Admin);

                    let response = Response::success(request.request_id, ResponsePayload::Pong);
                    responder.send_response(&client_id, response).await.unwrap();
                }
            }
        });

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let first = client.send(Command::Ping).await.unwrap();
        let second = client.send(Command::Ping).await.unwrap();

        assert_eq!(first.request_id, 1);
        assert_eq!(second.request_id, 2);
        assert!(matches!(second.result, ResponseResult::Ok(ResponsePayload::Pong)));
    }

    #[tokio::test]
    async fn test_malformed_line_gets_error() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let _server = started(&socket_path).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"{not json}\n").await.unwrap();

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        let response: Response = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(response.request_id, 0);
        match response.result {
            ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_api_version_checked() {
        let line = r#"{"request_id":3,"api_version":99,"command":{"type":"ping"}}"#;
        let err = parse_request(line).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);

        let line = r#"{"request_id":3,"api_version":1,"command":{"type":"ping"}}"#;
        assert_eq!(parse_request(line).unwrap().request_id, 3);
    }

    #[test]
    fn test_odd_sensor_id_is_not_a_malformed_request() {
        for sensor_id in ["-1", "1.5", "null"] {
            let line = format!(
                r#"{{"request_id":4,"api_version":1,"command":{{"type":"ingest_event","shelter_id":"abc","sensor_id":{},"status":"Obstacle","timestamp":"2024-01-01 08:00:00","credential":"x"}}}}"#,
                sensor_id
            );

            match parse_request(&line).unwrap().command {
                Command::IngestEvent(reading) => {
                    let err = reading.sensor_id.resolve().unwrap_err();
                    assert_eq!(ErrorInfo::from(&err).code, ErrorCode::InvalidState);
                }
                other => panic!("unexpected command {:?}", other),
            }
        }
    }

    #[test]
    fn test_root_is_admin() {
        assert_eq!(role_for_uid(Some(0)), ClientRole::Admin);
        assert_eq!(role_for_uid(None), ClientRole::Reporter);
    }
}
