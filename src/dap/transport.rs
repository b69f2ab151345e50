//! Framed DAP transport.
//!
//! The debugger is the listening side: the IDE connects to `(ip, port)`.
//! Messages are JSON bodies behind `Content-Length` headers. All reads are
//! non-blocking; [`Transport::poll`] pumps whatever bytes are available and
//! never waits.

use anyhow::{Context, anyhow};
use jsonschema::Validator;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::time::Duration;

/// Frame-delimited duplex message channel with a non-blocking poll.
pub trait Transport: Send {
    /// Pump the channel: accept a pending client, read available bytes,
    /// queue complete frames. Returns an error only on channel failure
    /// (client gone, socket error); the session then terminates.
    fn poll(&mut self) -> anyhow::Result<()>;

    /// Pop the next queued inbound message, if any.
    fn input(&mut self) -> Option<Value>;

    fn send(&mut self, message: &Value) -> anyhow::Result<()>;

    /// Install a JSON schema used to validate inbound requests.
    /// Invalid messages are dropped without response.
    fn set_schema(&mut self, path: &Path) -> anyhow::Result<()> {
        let _ = path;
        Ok(())
    }
}

/// TCP transport: one listener, at most one client at a time.
///
/// A dropped client surfaces as a poll error; the listener survives so the
/// next session can attach on the same channel.
pub struct TcpTransport {
    listener: TcpListener,
    client: Option<TcpStream>,
    rx_buf: Vec<u8>,
    inbox: VecDeque<Value>,
    schema: Option<Validator>,
}

impl TcpTransport {
    pub fn bind(ip: &str, port: u16) -> anyhow::Result<TcpTransport> {
        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .with_context(|| format!("invalid listen address {ip}:{port}"))?;
        let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
        listener.set_nonblocking(true)?;
        log::info!(target: "dap", "listening on {}", listener.local_addr()?);

        Ok(TcpTransport {
            listener,
            client: None,
            rx_buf: Vec::new(),
            inbox: VecDeque::new(),
            schema: None,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    fn accept_pending(&mut self) -> anyhow::Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        match self.listener.accept() {
            Ok((stream, peer)) => {
                log::info!(target: "dap", "client connected: {peer}");
                stream.set_nodelay(true)?;
                stream.set_nonblocking(true)?;
                self.client = Some(stream);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    fn read_available(&mut self) -> anyhow::Result<()> {
        let Some(stream) = self.client.as_mut() else {
            return Ok(());
        };

        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    log::info!(target: "dap", "client disconnected");
                    self.client = None;
                    self.rx_buf.clear();
                    return Err(anyhow!("DAP connection closed"));
                }
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.client = None;
                    self.rx_buf.clear();
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Extract complete `Content-Length`-framed bodies from the buffer.
    fn drain_frames(&mut self) {
        loop {
            let Some(header_end) = find_subslice(&self.rx_buf, b"\r\n\r\n") else {
                return;
            };
            let body_start = header_end + 4;

            let content_length = std::str::from_utf8(&self.rx_buf[..header_end])
                .ok()
                .and_then(parse_content_length);
            let Some(len) = content_length else {
                log::warn!(target: "dap", "frame without Content-Length header, dropped");
                self.rx_buf.drain(..body_start);
                continue;
            };

            if self.rx_buf.len() < body_start + len {
                return;
            }

            let body: Vec<u8> = self
                .rx_buf
                .drain(..body_start + len)
                .skip(body_start)
                .collect();
            match serde_json::from_slice::<Value>(&body) {
                Ok(msg) => {
                    if self.validate(&msg) {
                        log::debug!(target: "dap", "<- {msg}");
                        self.inbox.push_back(msg);
                    }
                }
                Err(err) => log::warn!(target: "dap", "malformed message dropped: {err}"),
            }
        }
    }

    fn validate(&self, message: &Value) -> bool {
        match &self.schema {
            Some(validator) if !validator.is_valid(message) => {
                log::warn!(target: "dap", "message rejected by schema, dropped");
                false
            }
            _ => true,
        }
    }
}

impl Transport for TcpTransport {
    fn poll(&mut self) -> anyhow::Result<()> {
        self.accept_pending()?;
        let res = self.read_available();
        self.drain_frames();
        res
    }

    fn input(&mut self) -> Option<Value> {
        self.inbox.pop_front()
    }

    fn send(&mut self, message: &Value) -> anyhow::Result<()> {
        let stream = self
            .client
            .as_mut()
            .ok_or_else(|| anyhow!("no DAP client connected"))?;

        let payload = serde_json::to_vec(message)?;
        log::debug!(target: "dap", "-> {message}");

        let mut framed = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        framed.extend_from_slice(&payload);
        write_all_nonblocking(stream, &framed)?;
        stream.flush()?;
        Ok(())
    }

    fn set_schema(&mut self, path: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read schema {}", path.display()))?;
        let schema: Value = serde_json::from_str(&text)?;
        let validator = jsonschema::options()
            .build(&schema)
            .map_err(|err| anyhow!("compile schema {}: {err}", path.display()))?;
        self.schema = Some(validator);
        Ok(())
    }
}

/// The stream is non-blocking; spin briefly on a full send buffer instead
/// of failing the session.
fn write_all_nonblocking(stream: &mut TcpStream, mut buf: &[u8]) -> std::io::Result<()> {
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_content_length(header: &str) -> Option<usize> {
    header.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
