//! Minecraft Java Edition "Server List Ping" status query.

use crate::{
    config::DEFAULT_PORT,
    probe::{PlayerCounts, QueryError, ServerQuery},
};
use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use serde::Deserialize;
use std::net::IpAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{debug, warn};

/// "Any version"; servers answer status requests regardless of protocol.
const PROTOCOL_VERSION: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;
const PACKET_ID: i32 = 0x00;
// Status JSON is capped at 32767 UTF-16 units, a UTF-8 char is at most 4 bytes.
const MAX_PACKET_LEN: usize = 32767 * 4 + 10;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    players: Players,
}

#[derive(Debug, Deserialize)]
struct Players {
    online: u32,
    max: u32,
}

/// Looks up `_minecraft._tcp` service records.
#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// Target host and port of the preferred record for `name`, `None` when there is none.
    async fn lookup(&self, name: &str) -> Option<(String, u16)>;
}

pub struct SystemSrvResolver(TokioAsyncResolver);

impl SystemSrvResolver {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            warn!("Failed to read system DNS config, using defaults: {e}");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self(resolver)
    }
}

#[async_trait]
impl SrvResolver for SystemSrvResolver {
    async fn lookup(&self, name: &str) -> Option<(String, u16)> {
        let records = match self.0.srv_lookup(name).await {
            Ok(records) => records,
            Err(e) => {
                debug!("No SRV record for {name}: {e}");
                return None;
            }
        };
        records
            .iter()
            .min_by_key(|srv| srv.priority())
            .map(|srv| {
                let target = srv.target().to_utf8();
                (target.trim_end_matches('.').to_string(), srv.port())
            })
    }
}

pub struct JavaServerPing {
    srv: Box<dyn SrvResolver>,
}

impl JavaServerPing {
    pub fn new(srv: impl SrvResolver + 'static) -> Self {
        Self { srv: Box::new(srv) }
    }

    /// Follows the server's SRV record when the port was left at the default.
    async fn resolve(&self, host: &str, port: u16) -> (String, u16) {
        if port != DEFAULT_PORT || host.parse::<IpAddr>().is_ok() {
            return (host.to_string(), port);
        }
        match self.srv.lookup(&format!("_minecraft._tcp.{host}")).await {
            Some((target, srv_port)) => {
                debug!("{host} resolved through SRV to {target}:{srv_port}");
                (target, srv_port)
            }
            None => (host.to_string(), port),
        }
    }
}

#[async_trait]
impl ServerQuery for JavaServerPing {
    async fn query(&self, host: &str, port: u16) -> Result<PlayerCounts, QueryError> {
        let (host, port) = self.resolve(host, port).await;
        let host = host.as_str();
        let mut stream = TcpStream::connect((host, port)).await?;
        stream.write_all(&handshake(host, port)).await?;
        stream.write_all(&frame(PACKET_ID, &[])).await?;
        stream.flush().await?;

        let json = read_status(&mut stream).await?;
        debug!("Status response from {host}:{port}: {json}");
        let status: StatusResponse = serde_json::from_str(&json)?;
        Ok(PlayerCounts {
            online: status.players.online,
            max: status.players.max,
        })
    }
}

fn handshake(host: &str, port: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(host.len() + 10);
    write_varint(&mut payload, PROTOCOL_VERSION);
    write_string(&mut payload, host);
    payload.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut payload, NEXT_STATE_STATUS);
    frame(PACKET_ID, &payload)
}

fn frame(id: i32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 5);
    write_varint(&mut body, id);
    body.extend_from_slice(payload);

    let mut packet = Vec::with_capacity(body.len() + 5);
    write_varint(&mut packet, body.len() as i32);
    packet.extend_from_slice(&body);
    packet
}

async fn read_status<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, QueryError> {
    let len = read_len(reader, MAX_PACKET_LEN).await?;
    let mut body = vec![0; len];
    reader.read_exact(&mut body).await?;

    let mut body = body.as_slice();
    let id = read_varint(&mut body).await?;
    if id != PACKET_ID {
        return Err(QueryError::Protocol(format!(
            "unexpected packet id {id:#04x}"
        )));
    }
    let remaining = body.len();
    let str_len = read_len(&mut body, remaining).await?;
    if str_len != body.len() {
        return Err(QueryError::Protocol(format!(
            "string length {str_len} does not match remaining {} bytes",
            body.len()
        )));
    }
    String::from_utf8(body.to_vec())
        .map_err(|e| QueryError::Protocol(format!("status is not utf-8: {e}")))
}

async fn read_len<R: AsyncRead + Unpin>(reader: &mut R, max: usize) -> Result<usize, QueryError> {
    let len = read_varint(reader).await?;
    match usize::try_from(len) {
        Ok(len) if len <= max => Ok(len),
        _ => Err(QueryError::Protocol(format!("invalid length {len}"))),
    }
}

fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7f == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, QueryError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(QueryError::Protocol("varint is longer than 5 bytes".into()))
}
