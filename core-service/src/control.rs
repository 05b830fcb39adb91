//! # Control Channel
//!
//! A line-oriented TCP endpoint on the loopback interface that reports
//! whether a dispatcher is running and asks it to stop.
//!
//! | Request    | Reply                    | Effect                          |
//! |------------|--------------------------|---------------------------------|
//! | `status`   | `running`                | none                            |
//! | `shutdown` | `stopping`               | cancels the dispatcher, closes  |
//! | other      | `error: unknown command` | none                            |
//!
//! One request per connection, each served on its own task. A client that
//! sends nothing is dropped after [`CLIENT_TIMEOUT`]. The server only ever
//! cancels the dispatcher's token; it never touches the change log,
//! checkpoint or id mappings.

use crate::error::{CoreError, Result};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_CONTROL_PORT: u16 = 9000;

/// How long a connected client may take to send its request line.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

const REPLY_RUNNING: &str = "running";
const REPLY_STOPPING: &str = "stopping";
const REPLY_UNKNOWN: &str = "error: unknown command";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlCommand {
    Status,
    Shutdown,
}

impl ControlCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "status" => Some(Self::Status),
            "shutdown" => Some(Self::Shutdown),
            _ => None,
        }
    }

    fn reply(self) -> &'static str {
        match self {
            Self::Status => REPLY_RUNNING,
            Self::Shutdown => REPLY_STOPPING,
        }
    }
}

/// Serves control requests for one running dispatcher.
pub struct ControlServer {
    listener: TcpListener,
    dispatcher: CancellationToken,
}

impl ControlServer {
    /// Bind `127.0.0.1:port`. Port 0 picks a free port.
    pub async fn bind(port: u16, dispatcher: CancellationToken) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .await
            .map_err(|e| CoreError::Control(format!("cannot listen on port {port}: {e}")))?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Answer requests until a `shutdown` arrives or the dispatcher token is
    /// cancelled by someone else.
    #[instrument(skip(self), fields(addr = ?self.listener.local_addr().ok()))]
    pub async fn serve(self) -> Result<()> {
        info!("Control channel listening");
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept control connection");
                            continue;
                        }
                    };
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        match handle_client(stream, CLIENT_TIMEOUT).await {
                            Ok(Some(ControlCommand::Shutdown)) => {
                                info!(%peer, "Shutdown requested");
                                dispatcher.cancel();
                            }
                            Ok(command) => debug!(%peer, ?command, "Control request served"),
                            Err(e) => warn!(%peer, error = %e, "Control connection failed"),
                        }
                    });
                }
                _ = self.dispatcher.cancelled() => break,
            }
        }
        info!("Control channel closed");
        Ok(())
    }
}

async fn handle_client(
    stream: TcpStream,
    read_timeout: Duration,
) -> io::Result<Option<ControlCommand>> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    tokio::time::timeout(read_timeout, reader.read_line(&mut line))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no request received"))??;

    let command = ControlCommand::parse(&line);
    let reply = command.map_or(REPLY_UNKNOWN, ControlCommand::reply);
    writer.write_all(format!("{reply}\n").as_bytes()).await?;
    writer.shutdown().await?;
    Ok(command)
}

/// Send one request to the control channel on `port` and return the reply.
pub async fn send_command(port: u16, command: &str) -> Result<String> {
    let stream = TcpStream::connect(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await?;
    let (reader, mut writer) = stream.into_split();
    writer.write_all(format!("{}\n", command.trim()).as_bytes()).await?;

    let mut reply = String::new();
    BufReader::new(reader).read_line(&mut reply).await?;
    Ok(reply.trim().to_string())
}

/// Whether a dispatcher answers on `port`. Nothing listening means not running.
pub async fn query_status(port: u16) -> Result<bool> {
    match send_command(port, "status").await {
        Ok(reply) => Ok(reply == REPLY_RUNNING),
        Err(CoreError::Io(e)) if e.kind() == io::ErrorKind::ConnectionRefused => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn start() -> (u16, CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let token = CancellationToken::new();
        let server = ControlServer::bind(0, token.clone()).await.unwrap();
        let port = server.local_addr().unwrap().port();
        let task = tokio::spawn(server.serve());
        (port, token, task)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ControlCommand::parse("status\n"), Some(ControlCommand::Status));
        assert_eq!(ControlCommand::parse(" shutdown "), Some(ControlCommand::Shutdown));
        assert_eq!(ControlCommand::parse("STATUS"), None);
        assert_eq!(ControlCommand::parse(""), None);
    }

    #[tokio::test]
    async fn test_status_and_unknown_commands() {
        let (port, token, task) = start().await;

        assert_eq!(send_command(port, "status").await.unwrap(), "running");
        assert!(query_status(port).await.unwrap());
        assert_eq!(
            send_command(port, "restart").await.unwrap(),
            "error: unknown command"
        );
        assert!(!token.is_cancelled());

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_dispatcher_and_closes() {
        let (port, token, task) = start().await;

        assert_eq!(send_command(port, "shutdown").await.unwrap(), "stopping");
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("server did not close")
            .unwrap()
            .unwrap();

        assert!(token.is_cancelled());
        assert!(!query_status(port).await.unwrap());
    }

    #[tokio::test]
    async fn test_idle_client_does_not_block_other_requests() {
        let (port, token, task) = start().await;
        let _idle = TcpStream::connect(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), send_command(port, "status"))
            .await
            .expect("status blocked by idle client")
            .unwrap();
        assert_eq!(reply, "running");

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("server did not close")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        let err = handle_client(stream, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_server_closes_when_dispatcher_is_cancelled() {
        let (_port, token, task) = start().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("server did not close")
            .unwrap()
            .unwrap();
    }
}
