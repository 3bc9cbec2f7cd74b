//! Pre-connect liveness probe
//!
//! [`ServerListPing`] performs the status half of the server list ping over a
//! plain TCP stream:
//!
//! ```text
//! C -> S  handshake    0x00 | varint protocol | string host | u16 port | varint 1
//! C -> S  request      0x00
//! S -> C  response     0x00 | string json
//! C -> S  ping         0x01 | i64 payload
//! S -> C  pong         0x01 | i64 payload
//! ```
//!
//! Every packet is prefixed with its varint length.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::ProbeError;
use crate::session::ConnectTarget;
use crate::timers::deadline_after;

const MAX_PACKET: usize = 1024 * 1024;
/// Status exchange does not depend on the protocol version; -1 by convention
const STATUS_PROTOCOL: i32 = -1;

/// What the server reported about itself
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerStatus {
    pub version_name: String,
    pub protocol: i32,
    pub online_players: u32,
    pub max_players: u32,
    /// Round trip of the ping/pong exchange, if it completed
    pub latency: Option<Duration>,
}

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, target: &ConnectTarget) -> Result<ServerStatus, ProbeError>;
}

#[derive(Debug, Deserialize, Default)]
struct StatusVersion {
    #[serde(default)]
    name: String,
    #[serde(default)]
    protocol: i32,
}

#[derive(Debug, Deserialize, Default)]
struct StatusPlayers {
    #[serde(default)]
    online: u32,
    #[serde(default)]
    max: u32,
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    #[serde(default)]
    version: StatusVersion,
    #[serde(default)]
    players: StatusPlayers,
}

pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7f == 0 {
            buf.push(v as u8);
            return;
        }
        buf.push((v & 0x7f) as u8 | 0x80);
        v >>= 7;
    }
}

/// Decode a varint from the front of `bytes`, returning value and length
pub fn read_varint(bytes: &[u8]) -> Result<(i32, usize), ProbeError> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().enumerate().take(5) {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value as i32, i + 1));
        }
    }
    if bytes.len() < 5 {
        Err(ProbeError::Protocol("truncated varint".into()))
    } else {
        Err(ProbeError::Protocol("varint too long".into()))
    }
}

async fn read_varint_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, ProbeError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await?;
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("varint too long".into()))
}

fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    write_varint(&mut out, body.len() as i32);
    out.extend_from_slice(body);
    out
}

pub fn handshake_packet(host: &str, port: u16) -> Vec<u8> {
    let mut body = vec![0x00];
    write_varint(&mut body, STATUS_PROTOCOL);
    write_varint(&mut body, host.len() as i32);
    body.extend_from_slice(host.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, 1);
    frame(&body)
}

async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProbeError> {
    let len = read_varint_from(reader).await?;
    if len <= 0 {
        return Err(ProbeError::Protocol(format!("bad packet length {}", len)));
    }
    let len = len as usize;
    if len > MAX_PACKET {
        return Err(ProbeError::Protocol(format!("packet of {} bytes exceeds limit", len)));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Parse the status response body (packet id included)
pub fn parse_status(body: &[u8]) -> Result<ServerStatus, ProbeError> {
    let (id, mut at) = read_varint(body)?;
    if id != 0x00 {
        return Err(ProbeError::Protocol(format!("unexpected packet 0x{:02x}", id)));
    }
    let (len, used) = read_varint(&body[at..])?;
    at += used;
    let end = at
        .checked_add(len.max(0) as usize)
        .filter(|end| *end <= body.len())
        .ok_or_else(|| ProbeError::Protocol("truncated status json".into()))?;

    let doc: StatusDocument =
        serde_json::from_slice(&body[at..end]).map_err(|e| ProbeError::Protocol(e.to_string()))?;
    Ok(ServerStatus {
        version_name: doc.version.name,
        protocol: doc.version.protocol,
        online_players: doc.players.online,
        max_players: doc.players.max,
        latency: None,
    })
}

/// Server list ping over TCP
#[derive(Debug, Clone)]
pub struct ServerListPing {
    timeout: Duration,
    measure_latency: bool,
}

impl ServerListPing {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            measure_latency: true,
        }
    }

    /// Skip the ping/pong round trip
    pub fn status_only(mut self) -> Self {
        self.measure_latency = false;
        self
    }

    async fn request_status(&self, target: &ConnectTarget) -> Result<(TcpStream, ServerStatus), ProbeError> {
        let mut stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
        stream.set_nodelay(true)?;

        stream.write_all(&handshake_packet(&target.host, target.port)).await?;
        stream.write_all(&frame(&[0x00])).await?;
        stream.flush().await?;

        let body = read_packet(&mut stream).await?;
        let status = parse_status(&body)?;
        Ok((stream, status))
    }

    /// Ping/pong round trip; `None` if the server does not complete it
    async fn round_trip(stream: &mut TcpStream) -> Option<Duration> {
        let payload = chrono::Utc::now().timestamp_millis();
        let mut ping = vec![0x01];
        ping.extend_from_slice(&payload.to_be_bytes());
        let sent = Instant::now();
        stream.write_all(&frame(&ping)).await.ok()?;

        let pong = read_packet(stream).await.ok()?;
        (pong.len() == 9 && pong[0] == 0x01 && pong[1..] == payload.to_be_bytes()).then(|| sent.elapsed())
    }
}

#[async_trait]
impl LivenessProbe for ServerListPing {
    async fn probe(&self, target: &ConnectTarget) -> Result<ServerStatus, ProbeError> {
        let deadline = deadline_after(Instant::now(), self.timeout);
        let (mut stream, mut status) = match tokio::time::timeout_at(deadline, self.request_status(target)).await {
            Ok(result) => result?,
            Err(_) => return Err(ProbeError::Timeout(self.timeout)),
        };

        // Once the status parsed the server is online, with or without a pong
        if self.measure_latency {
            status.latency = tokio::time::timeout_at(deadline, Self::round_trip(&mut stream))
                .await
                .ok()
                .flatten();
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn target(port: u16) -> ConnectTarget {
        ConnectTarget {
            host: "127.0.0.1".into(),
            port,
            username: "probe".into(),
            protocol_version: None,
        }
    }

    fn status_body(json: &str) -> Vec<u8> {
        let mut body = vec![0x00];
        write_varint(&mut body, json.len() as i32);
        body.extend_from_slice(json.as_bytes());
        body
    }

    #[test]
    fn test_varint_known_values() {
        let cases: &[(i32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (25565, &[0xdd, 0xc7, 0x01]),
            (-1, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];
        for (value, bytes) in cases {
            let mut buf = Vec::new();
            write_varint(&mut buf, *value);
            assert_eq!(&buf, bytes);
            assert_eq!(read_varint(bytes).unwrap(), (*value, bytes.len()));
        }
        assert!(read_varint(&[0x80, 0x80]).is_err());
    }

    #[test]
    fn test_handshake_layout() {
        let packet = handshake_packet("a.b", 25565);
        // len, id, protocol -1 (5 bytes), host len, host, port, next state
        assert_eq!(packet[0] as usize, packet.len() - 1);
        assert_eq!(packet[1], 0x00);
        assert_eq!(&packet[2..7], &[0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(packet[7], 3);
        assert_eq!(&packet[8..11], b"a.b");
        assert_eq!(&packet[11..13], &25565u16.to_be_bytes());
        assert_eq!(packet[13], 1);
    }

    #[test]
    fn test_parse_status() {
        let json = r#"{"version":{"name":"1.20.4","protocol":765},"players":{"max":20,"online":3},"description":"hi"}"#;
        let status = parse_status(&status_body(json)).unwrap();
        assert_eq!(status.version_name, "1.20.4");
        assert_eq!(status.protocol, 765);
        assert_eq!(status.online_players, 3);
        assert_eq!(status.max_players, 20);
    }

    #[test]
    fn test_parse_status_rejects_garbage() {
        assert!(parse_status(&status_body("not json")).is_err());
        assert!(parse_status(&[0x05, 0x00]).is_err());
        let mut truncated = status_body(r#"{"version":{}}"#);
        truncated.truncate(6);
        assert!(parse_status(&truncated).is_err());
    }

    #[tokio::test]
    async fn test_probe_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let handshake = read_packet(&mut socket).await.unwrap();
            assert_eq!(handshake[0], 0x00);
            let request = read_packet(&mut socket).await.unwrap();
            assert_eq!(request, vec![0x00]);

            let json = r#"{"version":{"name":"Paper 1.20.4","protocol":765},"players":{"max":50,"online":7}}"#;
            socket.write_all(&frame(&status_body(json))).await.unwrap();

            let ping = read_packet(&mut socket).await.unwrap();
            socket.write_all(&frame(&ping)).await.unwrap();
        });

        let status = ServerListPing::new(Duration::from_secs(5))
            .probe(&target(port))
            .await
            .unwrap();
        assert_eq!(status.version_name, "Paper 1.20.4");
        assert_eq!(status.online_players, 7);
        assert!(status.latency.is_some());
        server.await.unwrap();
    }

    async fn status_then(after: impl FnOnce(TcpStream) + Send + 'static) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_packet(&mut socket).await.unwrap();
            read_packet(&mut socket).await.unwrap();
            let json = r#"{"version":{"name":"Vanilla","protocol":765},"players":{"max":10,"online":0}}"#;
            socket.write_all(&frame(&status_body(json))).await.unwrap();
            after(socket);
        });
        port
    }

    #[tokio::test]
    async fn test_close_after_status_is_still_online() {
        let port = status_then(drop).await;
        let status = ServerListPing::new(Duration::from_secs(2))
            .probe(&target(port))
            .await
            .unwrap();
        assert_eq!(status.version_name, "Vanilla");
        assert_eq!(status.latency, None);
    }

    #[tokio::test]
    async fn test_unanswered_ping_is_still_online() {
        let port = status_then(|socket| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                drop(socket);
            });
        })
        .await;
        let status = ServerListPing::new(Duration::from_millis(300))
            .probe(&target(port))
            .await
            .unwrap();
        assert_eq!(status.max_players, 10);
        assert_eq!(status.latency, None);
    }

    #[tokio::test]
    async fn test_probe_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = ServerListPing::new(Duration::from_secs(2))
            .status_only()
            .probe(&target(port))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Io(_)));
    }

    #[tokio::test]
    async fn test_probe_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let err = ServerListPing::new(Duration::from_millis(200))
            .probe(&target(port))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let mut bytes = Vec::new();
        write_varint(&mut bytes, (MAX_PACKET + 1) as i32);
        let err = read_packet(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Protocol(_)));
    }
}
