use log::{debug, error, info};
use shared::{decode_datagram, format_request, Command, BUFFER_SIZE, PING_MESSAGE};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UdpSocket;

/// What the client does with a datagram from the server
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming<'a> {
    /// Liveness probe, answered without showing it
    Probe,
    /// Anything else, shown to the user
    Line(&'a str),
}

pub fn classify(text: &str) -> Incoming<'_> {
    let trimmed = text.trim_end_matches('\n');
    if trimmed == PING_MESSAGE {
        Incoming::Probe
    } else {
        Incoming::Line(trimmed)
    }
}

/// Whether sending `line` ends the session locally
pub fn is_disconnect(line: &str) -> bool {
    line.starts_with("disconn$")
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        bind_addr: &str,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let server_addr = server_addr.parse()?;
        info!("Client bound to {}", socket.local_addr()?);

        Ok(Client {
            socket,
            server_addr,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn send_line(&self, line: &str) -> std::io::Result<()> {
        self.socket.send_to(line.as_bytes(), self.server_addr).await?;
        Ok(())
    }

    async fn handle_datagram<W: AsyncWrite + Unpin>(
        &self,
        text: &str,
        output: &mut W,
    ) -> std::io::Result<()> {
        match classify(text) {
            Incoming::Probe => {
                debug!("Answering liveness probe");
                self.send_line(&format_request(Command::RetPing, "")).await
            }
            Incoming::Line(line) => {
                output
                    .write_all(format!("[SERVER] {}\n", line).as_bytes())
                    .await?;
                output.flush().await
            }
        }
    }

    /// Runs the client on stdin and stdout
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.run_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Relays lines from `input` to the server and server datagrams to
    /// `output` until the input ends or a disconnect is sent.
    pub async fn run_with<R, W>(
        &self,
        input: R,
        mut output: W,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(input).lines();
        let mut buffer = [0u8; BUFFER_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            let text = decode_datagram(&buffer[..len]);
                            self.handle_datagram(&text, &mut output).await?;
                        }
                        Err(e) => {
                            error!("Error receiving datagram: {}", e);
                            return Err(e.into());
                        }
                    }
                }

                line = lines.next_line() => {
                    let line = match line? {
                        Some(line) => line,
                        None => {
                            info!("Input closed, exiting");
                            break;
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }

                    self.send_line(&line).await?;

                    if is_disconnect(&line) {
                        info!("Disconnected, exiting");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
