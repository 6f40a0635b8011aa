//! Remote console client speaking the length-prefixed RCON packet format.
//!
//! Every [`RemoteConsole::send`] opens a fresh TCP connection, authenticates,
//! sends one command and reads one reply. The stream is owned by the call and
//! dropped on every exit path.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::ConsoleConfig;
use crate::constants::console;
use crate::errors::ConsoleError;

pub const PACKET_AUTH: i32 = 3;
pub const PACKET_EXEC: i32 = 2;
pub const PACKET_AUTH_RESPONSE: i32 = 2;
pub const PACKET_RESPONSE: i32 = 0;

/// A single request/reply channel to the server console.
#[async_trait]
pub trait RemoteConsole: Send + Sync {
    async fn send(&self, command: &str) -> Result<String, ConsoleError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    /// Length prefix, id, type, body and two NUL terminators.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let length = (body.len() + 10) as i32;

        let mut frame = Vec::with_capacity(body.len() + 14);
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&self.id.to_le_bytes());
        frame.extend_from_slice(&self.kind.to_le_bytes());
        frame.extend_from_slice(body);
        frame.extend_from_slice(&[0, 0]);
        frame
    }

    /// Decode everything after the length prefix.
    pub fn decode(payload: &[u8]) -> Result<Self, String> {
        if payload.len() < 10 {
            return Err(format!("packet of {} bytes is too short", payload.len()));
        }

        let id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);

        let body = &payload[8..];
        let end = body
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| "packet body is not NUL-terminated".to_string())?;

        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(&body[..end]).into_owned(),
        })
    }
}

async fn write_packet<W>(stream: &mut W, packet: &Packet, address: &str) -> Result<(), ConsoleError>
where
    W: AsyncWrite + Unpin,
{
    stream
        .write_all(&packet.encode())
        .await
        .map_err(|e| ConsoleError::Io {
            address: address.to_string(),
            reason: format!("write failed: {}", e),
        })
}

async fn read_packet<R>(stream: &mut R, address: &str) -> Result<Packet, ConsoleError>
where
    R: AsyncRead + Unpin,
{
    let io_error = |e: std::io::Error| ConsoleError::Io {
        address: address.to_string(),
        reason: format!("read failed: {}", e),
    };

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.map_err(io_error)?;
    let length = i32::from_le_bytes(header);

    if !(10..=console::MAX_PACKET_SIZE).contains(&length) {
        return Err(ConsoleError::Protocol {
            address: address.to_string(),
            reason: format!("invalid packet length {}", length),
        });
    }

    let mut payload = vec![0u8; length as usize];
    stream.read_exact(&mut payload).await.map_err(io_error)?;

    Packet::decode(&payload).map_err(|reason| ConsoleError::Protocol {
        address: address.to_string(),
        reason,
    })
}

pub struct RconClient {
    address: String,
    password: String,
    timeout: Duration,
    next_id: AtomicI32,
}

impl RconClient {
    pub fn new(address: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            timeout,
            next_id: AtomicI32::new(1),
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self::new(config.address(), config.password.clone(), config.timeout())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn next_id(&self) -> i32 {
        // Ids stay positive; -1 is the server's authentication failure marker
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id <= 0 {
            self.next_id.store(2, Ordering::Relaxed);
            1
        } else {
            id
        }
    }

    async fn connect(&self) -> Result<TcpStream, ConsoleError> {
        let connect_timeout = self.timeout.min(console::CONNECT_TIMEOUT);

        match timeout(connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ConsoleError::ConnectFailed {
                address: self.address.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ConsoleError::Timeout {
                address: self.address.clone(),
                operation: "connecting".to_string(),
            }),
        }
    }

    async fn authenticate(&self, stream: &mut TcpStream) -> Result<(), ConsoleError> {
        let auth_id = self.next_id();
        write_packet(
            stream,
            &Packet::new(auth_id, PACKET_AUTH, self.password.as_str()),
            &self.address,
        )
        .await?;

        // Some servers send an empty response packet ahead of the auth reply
        loop {
            let reply = read_packet(stream, &self.address).await?;
            if reply.kind != PACKET_AUTH_RESPONSE {
                continue;
            }
            if reply.id == -1 {
                return Err(ConsoleError::AuthenticationFailed {
                    address: self.address.clone(),
                });
            }
            if reply.id != auth_id {
                return Err(ConsoleError::Protocol {
                    address: self.address.clone(),
                    reason: format!("auth reply id {} does not match {}", reply.id, auth_id),
                });
            }
            return Ok(());
        }
    }

    /// Bodies that would not fit in one packet are refused before connecting.
    fn check_body(&self, body: &str) -> Result<(), ConsoleError> {
        let limit = console::MAX_PACKET_SIZE as usize - 10;
        if body.len() > limit {
            return Err(ConsoleError::Protocol {
                address: self.address.clone(),
                reason: format!("body of {} bytes exceeds the {} byte limit", body.len(), limit),
            });
        }
        Ok(())
    }

    async fn exchange(&self, command: &str) -> Result<String, ConsoleError> {
        self.check_body(&self.password)?;
        self.check_body(command)?;

        let mut stream = self.connect().await?;
        self.authenticate(&mut stream).await?;

        let command_id = self.next_id();
        write_packet(
            &mut stream,
            &Packet::new(command_id, PACKET_EXEC, command),
            &self.address,
        )
        .await?;

        let reply = read_packet(&mut stream, &self.address).await?;
        if reply.id != command_id {
            return Err(ConsoleError::Protocol {
                address: self.address.clone(),
                reason: format!("reply id {} does not match {}", reply.id, command_id),
            });
        }

        Ok(reply.body)
    }
}

#[async_trait]
impl RemoteConsole for RconClient {
    async fn send(&self, command: &str) -> Result<String, ConsoleError> {
        debug!("Sending console command to {}: {}", self.address, command);

        match timeout(self.timeout, self.exchange(command)).await {
            Ok(result) => result,
            Err(_) => Err(ConsoleError::Timeout {
                address: self.address.clone(),
                operation: format!("sending '{}'", command),
            }),
        }
    }
}
