use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::message::IrcLine;
use crate::{ChatNetwork, NetworkEvent};

#[derive(Debug, Clone)]
pub struct IrcConfig {
    /// `host:port`
    pub server: String,
    /// Network name `say` accepts
    pub network: String,
    pub nick: String,
    /// Rooms joined once registration completes
    pub rooms: Vec<String>,
    /// Services login sent after the first JOIN: (target, message)
    pub login: Option<(String, String)>,
}

/// Handle to a running IRC connection task.
pub struct IrcClient {
    network: String,
    line_tx: mpsc::UnboundedSender<String>,
}

impl IrcClient {
    /// Connect and spawn the protocol task. Inbound chat lines arrive on the
    /// returned receiver.
    pub async fn connect(config: IrcConfig) -> Result<(Self, mpsc::Receiver<NetworkEvent>)> {
        let stream = TcpStream::connect(&config.server).await?;
        info!("Connected to {} as {}", config.server, config.nick);

        let (event_tx, event_rx) = mpsc::channel(1024);
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let client = Self {
            network: config.network.clone(),
            line_tx,
        };

        tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(stream);
            if let Err(e) = run_irc(BufReader::new(reader), writer, &config, line_rx, event_tx.clone()).await {
                error!("IRC connection to {} failed: {}", config.server, e);
                let _ = event_tx.send(NetworkEvent::Error(e.to_string())).await;
            }
        });

        Ok((client, event_rx))
    }
}

impl ChatNetwork for IrcClient {
    fn network(&self) -> &str {
        &self.network
    }

    fn say(&self, network: &str, room: &str, text: &str) -> bool {
        if network != self.network {
            warn!("Refusing to relay to unknown network '{}'", network);
            return false;
        }
        self.line_tx.send(format!("PRIVMSG {} :{}", room, text)).is_ok()
    }
}

async fn run_irc<R, W>(
    mut reader: R,
    mut writer: W,
    config: &IrcConfig,
    mut line_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::Sender<NetworkEvent>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send_line(&mut writer, &format!("NICK {}", config.nick)).await?;
    send_line(&mut writer, &format!("USER {} 0 * :{}", config.nick, config.nick)).await?;

    let mut logged_in = false;
    let mut line_buf = String::new();

    loop {
        tokio::select! {
            result = reader.read_line(&mut line_buf) => {
                if result? == 0 {
                    let _ = event_tx.send(NetworkEvent::Error("connection closed".into())).await;
                    break;
                }

                if let Some(msg) = IrcLine::parse(&line_buf) {
                    match msg.command.as_str() {
                        // RPL_WELCOME
                        "001" => {
                            for room in &config.rooms {
                                send_line(&mut writer, &format!("JOIN {}", room)).await?;
                            }
                        }
                        "PING" => {
                            let token = msg.params.first().map(|s| s.as_str()).unwrap_or("");
                            send_line(&mut writer, &format!("PONG :{}", token)).await?;
                        }
                        "JOIN" => {
                            let room = msg.params.first().map(|s| s.as_str()).unwrap_or("");
                            if msg.nick() == Some(config.nick.as_str()) {
                                info!("Joined {}", room);
                                if !logged_in {
                                    logged_in = true;
                                    if let Some((target, text)) = &config.login {
                                        send_line(&mut writer, &format!("PRIVMSG {} :{}", target, text)).await?;
                                    }
                                }
                            }
                        }
                        "PRIVMSG" if msg.params.len() >= 2 => {
                            let event = NetworkEvent::Message {
                                from: msg.nick().unwrap_or("").to_string(),
                                room: msg.params[0].clone(),
                                text: msg.params[1].clone(),
                            };
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        "ERROR" => {
                            let reason = msg.params.last().cloned().unwrap_or_default();
                            let _ = event_tx.send(NetworkEvent::Error(reason)).await;
                        }
                        _ => {
                            debug!("irc <- {}", line_buf.trim_end());
                        }
                    }
                }
                line_buf.clear();
            }
            Some(line) = line_rx.recv() => {
                send_line(&mut writer, &line).await?;
            }
        }
    }

    Ok(())
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    debug!("irc -> {}", line);
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    Ok(())
}
