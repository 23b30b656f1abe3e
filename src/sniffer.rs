//! OSC sniffer for debugging tally receivers
//!
//! Listens on a UDP port and prints every datagram, decoded when it is a
//! valid OSC message. Point the gateway (or a console) at this port to see
//! exactly what a tally receiver would get.

use anyhow::{Context, Result};
use chrono::Local;
use colored::*;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::info;

use crate::osc::{OscArg, OscMessage};

/// Largest datagram we expect from a tally sender
const MAX_PACKET: usize = 1536;

/// CLI OSC sniffer
pub async fn run_osc_sniffer(port: u16) -> Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind sniffer on UDP port {}", port))?;

    println!("{}", "=== OSC Sniffer ===".bold().cyan());
    println!("Listening on {}", socket.local_addr()?);
    println!("Press Ctrl+C to exit\n");
    println!("{}", "Format: [time] FROM | HEX => PARSED".dimmed());
    println!("{}\n", "─".repeat(80).dimmed());
    info!("OSC sniffer listening on UDP {}", port);

    let mut buf = vec![0u8; MAX_PACKET];
    let mut count: u64 = 0;

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, from) = received.context("Sniffer receive failed")?;
                count += 1;
                println!("{}", format_packet(from, &buf[..len]));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\n{} ({} packets)", "Sniffer stopped".yellow(), count);
    Ok(())
}

/// Render one datagram as a sniffer line
pub fn format_packet(from: SocketAddr, data: &[u8]) -> String {
    let timestamp = Local::now().format("%H:%M:%S%.3f").to_string();
    let hex = format_hex(data);

    let (hex_colored, parsed) = match OscMessage::decode(data) {
        Ok(msg) => {
            let colored = match tally_state(&msg) {
                Some(true) => hex.bright_green(),
                Some(false) => hex.bright_red(),
                None => hex.normal(),
            };
            (colored, format!(" => {}", msg.to_string().bright_blue()))
        }
        Err(e) => (hex.bright_black(), format!(" => {}", e.to_string().red())),
    };

    format!(
        "[{}] {} | {}{}",
        timestamp.dimmed(),
        from.to_string().cyan(),
        hex_colored,
        parsed
    )
}

/// `Some(on)` for a single numeric argument, as sent to tally lights
fn tally_state(msg: &OscMessage) -> Option<bool> {
    match msg.args.as_slice() {
        [OscArg::Float(v)] => Some(*v > 0.5),
        [OscArg::Int(v)] => Some(*v != 0),
        _ => None,
    }
}

/// Space-separated uppercase hex, truncated for very long packets
pub fn format_hex(data: &[u8]) -> String {
    const SHOWN: usize = 48;
    let mut out = data
        .iter()
        .take(SHOWN)
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > SHOWN {
        out.push_str(&format!(" …(+{})", data.len() - SHOWN));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x2F, 0x00, 0xAB]), "2F 00 AB");
        let long = vec![0u8; 50];
        assert!(format_hex(&long).ends_with("…(+2)"));
    }

    #[test]
    fn test_format_packet_decodes_tally() {
        colored::control::set_override(false);
        let from: SocketAddr = "10.0.0.1:57121".parse().unwrap();
        let msg = OscMessage::tally("/exec/1/3", true);
        let line = format_packet(from, &msg.encode().unwrap());

        assert!(line.contains("10.0.0.1:57121"));
        assert!(line.contains("=> /exec/1/3"));
        assert_eq!(tally_state(&msg), Some(true));
        assert_eq!(tally_state(&OscMessage::tally("/exec/1/3", false)), Some(false));
    }

    #[test]
    fn test_format_packet_garbage() {
        colored::control::set_override(false);
        let from: SocketAddr = "10.0.0.1:1".parse().unwrap();
        let line = format_packet(from, b"hello");
        assert!(line.contains("68 65 6C 6C 6F"));
    }
}
