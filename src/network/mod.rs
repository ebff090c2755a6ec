use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::constants::TS_PACKET_SIZE;

/// TS packets carried per datagram
pub const PACKETS_PER_DATAGRAM: usize = 5;
pub const MULTICAST_TTL: u32 = 16;

/// Creates and configures a UDP socket for sending TS packets
/// Multicast destinations get a TTL so they leave the host
pub fn create_udp_sender(dest: &SocketAddr) -> anyhow::Result<Socket> {
    let ip = match dest.ip() {
        IpAddr::V4(v4) => v4,
        _ => anyhow::bail!("only IPv4 is supported"),
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;

    if ip.is_multicast() {
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
        socket.set_multicast_loop_v4(true)?;
    }

    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// One `file,ip:port,packets_per_sec` replay job
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTarget {
    pub file: PathBuf,
    pub dest: SocketAddr,
    /// Packets sent between one-second pauses; 0 sends unthrottled
    pub packets_per_sec: u64,
}

impl FromStr for StreamTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut parts = s.splitn(3, ',');
        let (Some(file), Some(dest), Some(pps)) = (parts.next(), parts.next(), parts.next()) else {
            anyhow::bail!("expected <file>,<ip>:<port>,<packets_per_sec>, got '{s}'");
        };
        Ok(Self {
            file: PathBuf::from(file),
            dest: dest.parse().with_context(|| format!("bad destination '{dest}'"))?,
            packets_per_sec: pps.parse().with_context(|| format!("bad packet rate '{pps}'"))?,
        })
    }
}

/// Sends a whole file; returns the number of TS packets sent
pub async fn stream_file(target: &StreamTarget) -> anyhow::Result<u64> {
    let sock = UdpSocket::from_std(create_udp_sender(&target.dest)?.into())?;
    let mut file = tokio::fs::File::open(&target.file)
        .await
        .with_context(|| format!("cannot open {}", target.file.display()))?;
    info!(file = %target.file.display(), dest = %target.dest, pps = target.packets_per_sec, "streaming");

    let mut buf = vec![0u8; TS_PACKET_SIZE * PACKETS_PER_DATAGRAM];
    let mut sent = 0u64;
    let mut since_pause = 0u64;
    loop {
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let len = filled - filled % TS_PACKET_SIZE;
        if len == 0 {
            break;
        }
        sock.send_to(&buf[..len], target.dest).await?;

        let packets = (len / TS_PACKET_SIZE) as u64;
        sent += packets;
        since_pause += packets;
        if target.packets_per_sec > 0 && since_pause >= target.packets_per_sec {
            since_pause = 0;
            debug!(file = %target.file.display(), sent, "pausing");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        if filled < buf.len() {
            break;
        }
    }
    info!(file = %target.file.display(), packets = sent, "end of file");
    Ok(sent)
}
