//! VEIL demo client
//!
//! Performs a handshake against a `veil-server`, sends a message through
//! the tunnel, and prints the echo.
//!
//! Usage: veil-client --config <FILE> [MESSAGE]

use std::env;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

use veil::transport::{Camouflaged, Datagram, UdpTransport};
use veil::{handshake, session::Frame, Config, PSK_SIZE};

#[derive(Deserialize)]
struct ClientFileConfig {
    /// Pre-shared key, base64
    psk_b64: String,
    /// Server address, host:port
    server_addr: String,
    /// Optional key-schedule domain separator
    #[serde(default)]
    info: String,
    /// Optional handshake deadline override (milliseconds)
    #[serde(default)]
    handshake_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args[1] != "-c" && args[1] != "--config" {
        print_usage();
        return Ok(());
    }

    let config = load_config(&args[2])?;
    let message = args.get(3).cloned().unwrap_or_else(|| "ping".to_string());

    run(config, &message).await
}

fn print_usage() {
    println!(
        r#"VEIL demo client

USAGE:
    veil-client --config <FILE> [MESSAGE]

CONFIGURATION FILE FORMAT (JSON):
    {{
        "psk_b64": "<base64 32-byte key>",
        "server_addr": "server.example.com:4433"
    }}
"#
    );
}

fn load_config(path: &str) -> anyhow::Result<(Config, String)> {
    let content = std::fs::read_to_string(path)?;
    let file: ClientFileConfig = serde_json::from_str(&content)?;

    let psk_bytes = STANDARD.decode(&file.psk_b64)?;
    let psk: [u8; PSK_SIZE] = psk_bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("psk_b64 must decode to {PSK_SIZE} bytes"))?;

    let mut config = Config::new(psk);
    config.info = file.info.into_bytes();
    if let Some(timeout) = file.handshake_timeout_ms {
        config.handshake_timeout_ms = timeout;
    }
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    Ok((config, file.server_addr))
}

async fn run((config, server_addr): (Config, String), message: &str) -> anyhow::Result<()> {
    tracing::info!("connecting to {server_addr}");

    let udp = UdpTransport::connect(server_addr.as_str()).await?;
    let mut transport = Camouflaged::new(udp);

    let session = handshake::connect(&mut transport, config).await?;
    tracing::info!(session_id = session.id(), "tunnel established");

    for record in session.encrypt_data(message.as_bytes())? {
        transport.send(&record).await?;
    }
    tracing::info!("sent {} bytes", message.len());

    match tokio::time::timeout(Duration::from_secs(5), transport.recv()).await {
        Ok(datagram) => {
            let frames = session.decrypt_record(&datagram?)?;
            for frame in frames {
                if let Frame::Data { payload, .. } = frame {
                    println!("< {}", String::from_utf8_lossy(&payload));
                }
            }
        }
        Err(_) => tracing::warn!("no echo within timeout"),
    }

    let stats = session.stats();
    tracing::info!(
        sent = stats.bytes_sent,
        received = stats.bytes_received,
        "closing session"
    );
    session.shutdown();
    Ok(())
}
