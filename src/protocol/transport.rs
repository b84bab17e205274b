//! Blocking byte transport
//!
//! TCP (via socket2), Unix domain sockets, and TLS on top of either.

use bytes::Bytes;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use super::codec::{self, HEADER_LEN};
use super::Connection;
use crate::config::{ConnectionOptions, IpMode};
use crate::error::{code, XError};

/// Socket before any TLS upgrade
pub enum PlainStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl PlainStream {
    fn shutdown(&self) {
        let _ = match self {
            PlainStream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            PlainStream::Unix(s) => s.shutdown(Shutdown::Both),
        };
    }
}

impl Read for PlainStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PlainStream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            PlainStream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for PlainStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            PlainStream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            PlainStream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            PlainStream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            PlainStream::Unix(s) => s.flush(),
        }
    }
}

/// Transport stream, plain or encrypted
pub enum Stream {
    Plain(PlainStream),
    Tls(Box<StreamOwned<ClientConnection, PlainStream>>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

/// Connection state of one session
#[derive(Default)]
pub struct XConnection {
    stream: Option<Stream>,
}

impl XConnection {
    /// Open the transport described by `options`
    pub fn connect(&mut self, options: &ConnectionOptions, ip_mode: IpMode) -> Result<(), XError> {
        self.close();

        let read_timeout =
            (options.read_timeout_ms > 0).then(|| Duration::from_millis(options.read_timeout_ms));

        if !options.socket.is_empty() {
            let stream = connect_unix(&options.socket, read_timeout)?;
            debug!(socket = %options.socket, "Connected through unix socket");
            self.stream = Some(Stream::Plain(stream));
            return Ok(());
        }

        let connect_timeout = Duration::from_millis(options.connect_timeout_ms.max(1));
        let stream = connect_tcp(&options.host, options.port, ip_mode, connect_timeout)?;
        stream
            .set_read_timeout(read_timeout)
            .map_err(|e| XError::from_io(&e))?;

        self.stream = Some(Stream::Plain(PlainStream::Tcp(stream)));
        Ok(())
    }

    /// Replace the plain stream with a TLS stream and finish the handshake
    pub fn upgrade_tls(&mut self, config: Arc<ClientConfig>, host: &str) -> Result<(), XError> {
        let plain = match self.stream.take() {
            Some(Stream::Plain(plain)) => plain,
            Some(tls @ Stream::Tls(_)) => {
                self.stream = Some(tls);
                return Ok(());
            }
            None => {
                return Err(XError::new(
                    code::CR_SERVER_GONE_ERROR,
                    "MySQL server has gone away",
                ))
            }
        };

        let server_name = ServerName::try_from(host.to_string())
            .or_else(|_| ServerName::try_from("localhost".to_string()))
            .map_err(ssl_error)?;

        let conn = ClientConnection::new(config, server_name).map_err(ssl_error)?;
        let mut tls = StreamOwned::new(conn, plain);
        while tls.conn.is_handshaking() {
            if let Err(e) = tls.conn.complete_io(&mut tls.sock) {
                tls.sock.shutdown();
                return Err(ssl_error(e));
            }
        }

        debug!(
            version = ?tls.conn.protocol_version(),
            suite = ?tls.conn.negotiated_cipher_suite().map(|s| s.suite()),
            "TLS established"
        );
        self.stream = Some(Stream::Tls(Box::new(tls)));
        Ok(())
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.stream, Some(Stream::Tls(_)))
    }

    /// Write one already encoded frame
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), XError> {
        let stream = self.stream_mut()?;
        stream
            .write_all(frame)
            .and_then(|_| stream.flush())
            .map_err(|e| XError::from_io(&e))
    }

    /// Read one frame, returning (type, payload, total bytes read)
    pub fn read_frame(&mut self) -> Result<(u8, Bytes, usize), XError> {
        let stream = self.stream_mut()?;

        let mut header = [0u8; HEADER_LEN];
        stream
            .read_exact(&mut header)
            .map_err(|e| XError::from_io(&e))?;
        let len = codec::decode_header(header)?;

        let mut body = vec![0u8; len];
        stream
            .read_exact(&mut body)
            .map_err(|e| XError::from_io(&e))?;

        let msg_type = body[0];
        let payload = Bytes::from(body).slice(1..);
        Ok((msg_type, payload, HEADER_LEN + len))
    }

    fn stream_mut(&mut self) -> Result<&mut Stream, XError> {
        self.stream
            .as_mut()
            .ok_or_else(|| XError::new(code::CR_SERVER_GONE_ERROR, "MySQL server has gone away"))
    }
}

impl Connection for XConnection {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        match self.stream.take() {
            Some(Stream::Plain(plain)) => plain.shutdown(),
            Some(Stream::Tls(mut tls)) => {
                tls.conn.send_close_notify();
                let _ = tls.conn.complete_io(&mut tls.sock);
                tls.sock.shutdown();
            }
            None => {}
        }
    }
}

/// Resolve `host` honoring the address family restriction
pub fn resolve(host: &str, port: u16, ip_mode: IpMode) -> Result<Vec<SocketAddr>, XError> {
    let unknown = |detail: String| {
        XError::new(
            code::CR_UNKNOWN_HOST,
            format!("Unknown MySQL server host '{}' ({})", host, detail),
        )
    };

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| unknown(e.to_string()))?
        .filter(|addr| match ip_mode {
            IpMode::Ip4 => addr.is_ipv4(),
            IpMode::Ip6 => addr.is_ipv6(),
            IpMode::Any => true,
        })
        .collect();

    if addrs.is_empty() {
        return Err(unknown(format!("no {} address", ip_mode)));
    }
    Ok(addrs)
}

/// Create a TCP connection, trying each resolved address in turn
fn connect_tcp(
    host: &str,
    port: u16,
    ip_mode: IpMode,
    timeout: Duration,
) -> Result<TcpStream, XError> {
    let mut last_error = None;

    for addr in resolve(host, port, ip_mode)? {
        match open_socket(addr, timeout) {
            Ok(stream) => {
                debug!(%addr, "TCP connection established");
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "TCP connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    let detail = last_error.map(|e| e.to_string()).unwrap_or_default();
    Err(XError::new(
        code::CR_CONN_HOST_ERROR,
        format!("Can't connect to MySQL server on '{}:{}' ({})", host, port, detail),
    ))
}

fn open_socket(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(SockProtocol::TCP))?;

    // Small request/response messages
    socket.set_nodelay(true)?;
    socket.set_keepalive(true)?;

    socket.connect_timeout(&addr.into(), timeout)?;
    Ok(socket.into())
}

#[cfg(unix)]
fn connect_unix(path: &str, read_timeout: Option<Duration>) -> Result<PlainStream, XError> {
    let stream = UnixStream::connect(path).map_err(|e| {
        XError::new(
            code::CR_CONNECTION_ERROR,
            format!(
                "Can't connect to local MySQL server through socket '{}' ({})",
                path, e
            ),
        )
    })?;
    stream
        .set_read_timeout(read_timeout)
        .map_err(|e| XError::from_io(&e))?;
    Ok(PlainStream::Unix(stream))
}

#[cfg(not(unix))]
fn connect_unix(path: &str, _read_timeout: Option<Duration>) -> Result<PlainStream, XError> {
    Err(XError::new(
        code::CR_CONNECTION_ERROR,
        format!("Unix sockets are not supported on this platform ({})", path),
    ))
}

fn ssl_error(err: impl std::fmt::Display) -> XError {
    XError::new(
        code::CR_SSL_CONNECTION_ERROR,
        format!("SSL connection error: {}", err),
    )
}
