//! Synchronous JSONL client for an instance's control socket.
//!
//! Requesters connect to the target's socket, send one `ControlRequest` and
//! block for one `ControlReply` until the configured read timeout elapses.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use crate::{ControlReply, ControlRequest, ErrorCode};

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Error from the control client layer.
#[non_exhaustive]
#[derive(Debug)]
pub enum IpcError {
    /// Control socket does not exist or connection was refused.
    NoResponder { path: String },
    /// Socket exists but connection failed for a non-`ConnectionRefused` reason.
    ConnectionFailed(std::io::Error),
    /// No reply arrived before the read timeout.
    TimedOut,
    /// Control thread returned an explicit error reply.
    ResponderError { code: ErrorCode, message: String },
    /// Protocol-level error (serialization, empty reply, invalid JSON).
    ProtocolError { message: String },
    /// Other I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for IpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpcError::NoResponder { path } => {
                write!(f, "No instance listening (socket not found at {})", path)
            }
            IpcError::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            IpcError::TimedOut => write!(f, "Timed out waiting for reply"),
            IpcError::ResponderError { code, message } => {
                write!(f, "Instance error [{}]: {}", code, message)
            }
            IpcError::ProtocolError { message } => write!(f, "Protocol error: {}", message),
            IpcError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for IpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IpcError::ConnectionFailed(e) | IpcError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IpcError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => IpcError::TimedOut,
            _ => IpcError::Io(e),
        }
    }
}

/// A synchronous JSONL connection to one instance's control socket.
#[derive(Debug)]
pub struct IpcConnection {
    stream: UnixStream,
}

impl IpcConnection {
    /// Connect to the control socket at `socket_path`.
    ///
    /// Returns `IpcError::NoResponder` if the socket doesn't exist or the
    /// connection is refused (stale socket file of a dead instance).
    pub fn connect(socket_path: &Path, read_timeout: Duration) -> Result<Self, IpcError> {
        if !socket_path.exists() {
            return Err(IpcError::NoResponder {
                path: socket_path.display().to_string(),
            });
        }

        let stream = UnixStream::connect(socket_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                IpcError::NoResponder {
                    path: socket_path.display().to_string(),
                }
            } else {
                IpcError::ConnectionFailed(e)
            }
        })?;

        stream
            .set_read_timeout(Some(read_timeout))
            .map_err(IpcError::Io)?;
        stream
            .set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(IpcError::Io)?;

        Ok(Self { stream })
    }

    /// Send a typed request and read one typed reply.
    ///
    /// Converts `ControlReply::Error` into `IpcError::ResponderError`.
    pub fn send(&mut self, request: &ControlRequest) -> Result<ControlReply, IpcError> {
        let msg = serde_json::to_string(request).map_err(|e| IpcError::ProtocolError {
            message: e.to_string(),
        })?;

        writeln!(self.stream, "{}", msg)?;
        self.stream.flush()?;

        // One reply line per request; never buffer past it.
        let mut reader = BufReader::new(&self.stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;

        if line.is_empty() {
            return Err(IpcError::ProtocolError {
                message: "Empty reply from instance".to_string(),
            });
        }

        let reply: ControlReply =
            serde_json::from_str(&line).map_err(|e| IpcError::ProtocolError {
                message: format!("Invalid JSON reply: {}", e),
            })?;

        if let ControlReply::Error { code, message, .. } = reply {
            return Err(IpcError::ResponderError { code, message });
        }

        Ok(reply)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), IpcError> {
        self.stream.set_read_timeout(timeout).map_err(IpcError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    fn serve_one(listener: UnixListener, response: &'static str) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(&stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            writeln!(stream, "{}", response).unwrap();
            stream.flush().unwrap();
        })
    }

    #[test]
    fn test_connect_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("4242.sock");

        let result = IpcConnection::connect(&sock_path, Duration::from_secs(1));
        assert!(
            matches!(result, Err(IpcError::NoResponder { .. })),
            "Should return NoResponder for missing socket"
        );
    }

    #[test]
    fn test_connect_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("stale.sock");
        drop(UnixListener::bind(&sock_path).unwrap());

        let result = IpcConnection::connect(&sock_path, Duration::from_secs(1));
        assert!(matches!(result, Err(IpcError::NoResponder { .. })));
    }

    #[test]
    fn test_send_processed() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();
        let handle = serve_one(listener, r#"{"type":"processed","id":"w1"}"#);

        let mut conn = IpcConnection::connect(&sock_path, Duration::from_secs(2)).unwrap();
        let reply = conn
            .send(&ControlRequest::Wake {
                id: "w1".to_string(),
                todo_uid: 3,
            })
            .unwrap();
        assert!(matches!(reply, ControlReply::Processed { .. }));

        handle.join().unwrap();
    }

    #[test]
    fn test_send_error_reply() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();
        let handle = serve_one(
            listener,
            r#"{"type":"error","id":"1","code":"table_corrupt","message":"bad header"}"#,
        );

        let mut conn = IpcConnection::connect(&sock_path, Duration::from_secs(2)).unwrap();
        let result = conn.send(&ControlRequest::Ping {
            id: "1".to_string(),
        });
        match result.unwrap_err() {
            IpcError::ResponderError { code, message } => {
                assert_eq!(code, ErrorCode::TableCorrupt);
                assert_eq!(message, "bad header");
            }
            other => panic!("expected ResponderError, got: {}", other),
        }

        handle.join().unwrap();
    }

    #[test]
    fn test_send_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();
        let handle = serve_one(listener, "not-json{");

        let mut conn = IpcConnection::connect(&sock_path, Duration::from_secs(2)).unwrap();
        let result = conn.send(&ControlRequest::Ping {
            id: "1".to_string(),
        });
        match result.unwrap_err() {
            IpcError::ProtocolError { message } => {
                assert!(message.contains("Invalid JSON"), "got: {}", message);
            }
            other => panic!("expected ProtocolError, got: {}", other),
        }

        handle.join().unwrap();
    }

    #[test]
    fn test_silent_peer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();

        let mut conn = IpcConnection::connect(&sock_path, Duration::from_millis(100)).unwrap();
        // Accepted but never answered
        let (_server, _) = listener.accept().unwrap();

        let result = conn.send(&ControlRequest::Ping {
            id: "1".to_string(),
        });
        assert!(
            matches!(result, Err(IpcError::TimedOut)),
            "got: {:?}",
            result
        );
    }
}
