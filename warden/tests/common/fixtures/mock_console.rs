//! Scripted remote consoles
//!
//! `ScriptedConsole` implements the console trait in-process; `MockRconServer`
//! speaks the real wire format on a local TCP port.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use warden::console::client::{
    Packet, PACKET_AUTH, PACKET_AUTH_RESPONSE, PACKET_EXEC, PACKET_RESPONSE,
};
use warden::console::RemoteConsole;
use warden::errors::ConsoleError;

/// Records every command and fails call number `fail_on` (1-based).
pub struct ScriptedConsole {
    fail_on: Option<usize>,
    reply: String,
    calls: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl ScriptedConsole {
    pub fn healthy() -> Arc<Self> {
        Self::build(None, "")
    }

    pub fn failing_on(call: usize) -> Arc<Self> {
        Self::build(Some(call), "")
    }

    pub fn replying(reply: &str) -> Arc<Self> {
        Self::build(None, reply)
    }

    fn build(fail_on: Option<usize>, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_on,
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl RemoteConsole for ScriptedConsole {
    async fn send(&self, command: &str) -> Result<String, ConsoleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().await.push(command.to_string());
        if Some(call) == self.fail_on {
            return Err(ConsoleError::ConnectFailed {
                address: "127.0.0.1:25575".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.reply.clone())
    }
}

/// Local RCON server answering every command with a fixed reply.
pub struct MockRconServer {
    address: String,
    commands: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockRconServer {
    pub async fn start(password: &str, reply: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let password = password.to_string();
        let reply = reply.to_string();
        let seen = commands.clone();
        let count = connections.clone();

        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                let password = password.clone();
                let reply = reply.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, &password, &reply, &seen).await;
                });
            }
        });

        Self {
            address,
            commands,
            connections,
            task,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockRconServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_frame(socket: &mut TcpStream) -> std::io::Result<Packet> {
    let mut header = [0u8; 4];
    socket.read_exact(&mut header).await?;
    let mut payload = vec![0u8; i32::from_le_bytes(header) as usize];
    socket.read_exact(&mut payload).await?;
    Packet::decode(&payload).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

async fn serve(
    mut socket: TcpStream,
    password: &str,
    reply: &str,
    seen: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let auth = read_frame(&mut socket).await?;
    if auth.kind != PACKET_AUTH {
        return Ok(());
    }

    let auth_id = if auth.body == password { auth.id } else { -1 };
    socket
        .write_all(&Packet::new(auth_id, PACKET_AUTH_RESPONSE, "").encode())
        .await?;
    if auth_id == -1 {
        return Ok(());
    }

    // One command per connection
    let command = read_frame(&mut socket).await?;
    if command.kind == PACKET_EXEC {
        seen.lock().await.push(command.body.clone());
        socket
            .write_all(&Packet::new(command.id, PACKET_RESPONSE, reply).encode())
            .await?;
    }
    Ok(())
}
