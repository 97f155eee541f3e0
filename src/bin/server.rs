//! VEIL demo server
//!
//! Accepts handshakes on a UDP port and echoes tunneled data back to each
//! client through its session.
//!
//! Usage: veil-server --config <FILE>
//!        veil-server --gen-psk

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use tokio::net::UdpSocket;

use veil::crypto::SecureRandom;
use veil::handshake::{message::INIT_SIZE, Responder};
use veil::session::{Frame, Session};
use veil::{wrapper, Config, PSK_SIZE};

#[derive(Deserialize)]
struct ServerFileConfig {
    /// Pre-shared key, base64
    psk_b64: String,
    /// Listen address, host:port
    listen_addr: String,
    /// Optional key-schedule domain separator
    #[serde(default)]
    info: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--gen-psk") => {
            let psk: [u8; PSK_SIZE] = SecureRandom::bytes();
            println!("{}", STANDARD.encode(psk));
            Ok(())
        }
        Some("-c" | "--config") if args.len() >= 3 => {
            let (config, listen_addr) = load_config(&args[2])?;
            run(config, &listen_addr).await
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!(
        r#"VEIL demo server

USAGE:
    veil-server --config <FILE>
    veil-server --gen-psk

CONFIGURATION FILE FORMAT (JSON):
    {{
        "psk_b64": "<base64 32-byte key>",
        "listen_addr": "0.0.0.0:4433"
    }}
"#
    );
}

fn load_config(path: &str) -> anyhow::Result<(Config, String)> {
    let content = std::fs::read_to_string(path)?;
    let file: ServerFileConfig = serde_json::from_str(&content)?;

    let psk_bytes = STANDARD.decode(&file.psk_b64)?;
    let psk: [u8; PSK_SIZE] = psk_bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("psk_b64 must decode to {PSK_SIZE} bytes"))?;

    let mut config = Config::new(psk);
    config.info = file.info.into_bytes();
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    Ok((config, file.listen_addr))
}

async fn run(config: Config, listen_addr: &str) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(listen_addr).await?;
    let responder = Responder::new(config)?;
    let mut sessions: HashMap<SocketAddr, Session> = HashMap::new();

    tracing::info!("VEIL server listening on {listen_addr}");

    let mut buf = vec![0u8; 65_535];
    loop {
        let (n, peer) = socket.recv_from(&mut buf).await?;

        let payload = match wrapper::unwrap_all(&buf[..n]) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(%peer, "dropping non-TLS datagram: {err}");
                continue;
            }
        };

        // A fresh or retransmitted handshake? Records of the same length
        // fail validation here and fall through to the session path.
        if payload.len() == INIT_SIZE {
            match responder.handle_init(&payload) {
                Ok((response, session)) => {
                    socket.send_to(&wrapper::wrap(&response), peer).await?;
                    if let Some(session) = session {
                        tracing::info!(%peer, session_id = session.id(), "session installed");
                        if let Some(old) = sessions.insert(peer, session) {
                            old.shutdown();
                        }
                    }
                    continue;
                }
                Err(err) => {
                    // Not a valid INIT; maybe it is a record
                    tracing::debug!(%peer, "datagram is not a valid INIT: {err}");
                }
            }
        }

        let Some(session) = sessions.get(&peer) else {
            tracing::debug!(%peer, "record from unknown peer");
            continue;
        };

        match session.decrypt_record(&payload) {
            Ok(frames) => {
                for frame in frames {
                    match frame {
                        Frame::Data { stream_id, payload } => {
                            for record in session.encrypt_stream_data(stream_id, &payload)? {
                                socket.send_to(&wrapper::wrap(&record), peer).await?;
                            }
                        }
                        Frame::Keepalive => {}
                        Frame::Control(body) => {
                            tracing::debug!(%peer, len = body.len(), "control frame");
                        }
                        Frame::Close { stream_id } => {
                            tracing::info!(%peer, stream_id, "stream closed by peer");
                        }
                    }
                }
            }
            Err(err) if err.is_recoverable() => continue,
            Err(err) => {
                tracing::warn!(%peer, "fatal session error: {err}");
                if let Some(session) = sessions.remove(&peer) {
                    session.shutdown();
                }
            }
        }
    }
}
