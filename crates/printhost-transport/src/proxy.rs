//! TCP-proxied serial transport
//!
//! A thin length-prefixed protocol against a proxy process that owns
//! the physical serial port:
//!
//! - commands are UTF-8 strings prefixed with a 4-byte little-endian
//!   byte count;
//! - the empty command requests the device list: the proxy replies
//!   with a 4-byte count followed by that many length-prefixed paths;
//! - a non-empty command names an endpoint and is followed by a raw
//!   4-byte little-endian baud value, after which the connection
//!   becomes a transparent bidirectional byte pipe to the serial port.
//!
//! Both sides live here: `ProxyFactory` is the host-side client,
//! `serve` is the proxy process itself.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use printhost_core::{CancelToken, Result, TransportError};

use crate::alias::{self, Alias};
use crate::device::{Device, DeviceFactory, DeviceInfo};

/// Default TCP port of the proxy process
pub const DEFAULT_PROXY_PORT: u16 = 5001;

/// Upper bound on a length-prefixed string, to reject corrupt peers
const MAX_STRING_LEN: usize = 4096;

/// Upper bound on a peer's device-list count, to reject corrupt peers
const MAX_DEVICE_COUNT: u32 = 1024;

fn write_string(stream: &mut TcpStream, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    stream
        .write_all(&(bytes.len() as u32).to_le_bytes())
        .and_then(|_| stream.write_all(bytes))
        .map_err(|e| TransportError::from(e).into())
}

fn read_string(stream: &mut TcpStream) -> Result<String> {
    let len = read_u32(stream)? as usize;
    if len > MAX_STRING_LEN {
        return Err(TransportError::Protocol {
            reason: format!("string length {} exceeds limit", len),
        }
        .into());
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).map_err(TransportError::from)?;
    String::from_utf8(buf).map_err(|_| {
        TransportError::Protocol {
            reason: "string is not valid UTF-8".to_string(),
        }
        .into()
    })
}

fn read_u32(stream: &mut TcpStream) -> Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).map_err(TransportError::from)?;
    Ok(u32::from_le_bytes(buf))
}

/// Factory for serial MCUs behind a remote proxy process
pub struct ProxyFactory {
    addr: String,
    aliases: Vec<Alias>,
}

impl ProxyFactory {
    /// Create a factory connecting to `addr` ("host:port")
    pub fn new(addr: impl Into<String>, aliases: Vec<Alias>) -> Self {
        Self {
            addr: addr.into(),
            aliases,
        }
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr).map_err(|e| TransportError::FailedToOpen {
            endpoint: self.addr.clone(),
            reason: e.to_string(),
        })?;
        stream.set_nodelay(true).map_err(TransportError::from)?;
        Ok(stream)
    }
}

impl DeviceFactory for ProxyFactory {
    fn device_names(&self, cancel: &CancelToken) -> Result<Vec<DeviceInfo>> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        let mut stream = self.connect()?;
        write_string(&mut stream, "")?;
        let count = read_u32(&mut stream)?;
        if count > MAX_DEVICE_COUNT {
            return Err(TransportError::Protocol {
                reason: format!("device count {} exceeds limit", count),
            }
            .into());
        }
        let mut paths = Vec::with_capacity(count as usize);
        for _ in 0..count {
            paths.push(read_string(&mut stream)?);
        }
        Ok(alias::resolve(&self.aliases, &paths))
    }

    fn open(&self, info: &DeviceInfo, cancel: &CancelToken) -> Result<Box<dyn Device>> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        let mut stream = self.connect()?;
        write_string(&mut stream, &info.endpoint)?;
        stream
            .write_all(&info.baud.to_le_bytes())
            .map_err(TransportError::from)?;
        tracing::info!(
            "Opened {} at {} baud via proxy {}",
            info.endpoint,
            info.baud,
            self.addr
        );
        Ok(Box::new(ProxyDevice {
            stream,
            name: info.name.clone(),
        }))
    }
}

/// Raw byte pipe to the proxy's serial port
struct ProxyDevice {
    stream: TcpStream,
    name: String,
}

impl Device for ProxyDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream
            .read(buf)
            .map_err(|e| TransportError::from(e).into())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(data)
            .map_err(|e| TransportError::from(e).into())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream
            .flush()
            .map_err(|e| TransportError::from(e).into())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Opens local serial ports on behalf of proxy clients
///
/// The seam that lets the loopback tests run the full wire protocol
/// without hardware.
pub trait LocalOpener: Send + Sync {
    /// Endpoint paths this proxy can open
    fn list(&self) -> Result<Vec<String>>;

    /// Open an endpoint, returning independent read and write halves
    fn open(&self, endpoint: &str, baud: u32)
        -> Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)>;
}

/// Default opener backed by the local serial layer
pub struct SerialPortOpener;

impl LocalOpener for SerialPortOpener {
    fn list(&self) -> Result<Vec<String>> {
        let ports = serialport::available_ports().map_err(|e| TransportError::Io {
            reason: e.to_string(),
        })?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(
        &self,
        endpoint: &str,
        baud: u32,
    ) -> Result<(Box<dyn Read + Send>, Box<dyn Write + Send>)> {
        let reader = serialport::new(endpoint, baud)
            .timeout(Duration::from_millis(100))
            .open_native()
            .map_err(|e| TransportError::FailedToOpen {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let writer = reader.try_clone_native().map_err(|e| TransportError::Io {
            reason: e.to_string(),
        })?;
        Ok((Box::new(reader), Box::new(writer)))
    }
}

/// Run the proxy server until cancelled
///
/// Each accepted connection is served on its own thread; a connection
/// failure only terminates that connection.
pub fn serve(listener: TcpListener, opener: Arc<dyn LocalOpener>, cancel: CancelToken) -> Result<()> {
    listener.set_nonblocking(true).map_err(TransportError::from)?;
    tracing::info!("Proxy listening on {:?}", listener.local_addr().ok());

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let opener = opener.clone();
                std::thread::spawn(move || {
                    if let Err(e) = handle_client(stream, opener) {
                        if !e.is_end_of_stream() {
                            tracing::warn!("Proxy connection from {} failed: {}", peer, e);
                        }
                    }
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(TransportError::from(e).into()),
        }
    }
}

fn handle_client(mut stream: TcpStream, opener: Arc<dyn LocalOpener>) -> Result<()> {
    stream.set_nonblocking(false).map_err(TransportError::from)?;
    stream.set_nodelay(true).map_err(TransportError::from)?;

    let command = read_string(&mut stream)?;
    if command.is_empty() {
        let paths = opener.list()?;
        stream
            .write_all(&(paths.len() as u32).to_le_bytes())
            .map_err(TransportError::from)?;
        for path in &paths {
            write_string(&mut stream, path)?;
        }
        return Ok(());
    }

    let baud = read_u32(&mut stream)?;
    let (mut dev_read, mut dev_write) = opener.open(&command, baud)?;
    tracing::debug!("Proxy piping {} at {} baud", command, baud);

    // Device to socket on a helper thread, socket to device here. The
    // stop flag lets the helper exit once the client hangs up, since a
    // quiet serial port would otherwise keep it in timed-out reads.
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let pump_stop = stop.clone();
    let mut socket_out = stream.try_clone().map_err(TransportError::from)?;
    let pump = std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match dev_read.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if socket_out.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    if pump_stop.load(std::sync::atomic::Ordering::Relaxed) {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = socket_out.shutdown(std::net::Shutdown::Write);
    });

    let mut buf = [0u8; 4096];
    let result = loop {
        match stream.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                if let Err(e) = dev_write
                    .write_all(&buf[..n])
                    .and_then(|_| dev_write.flush())
                {
                    break Err(TransportError::from(e).into());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(TransportError::from(e).into()),
        }
    };
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    drop(dev_write);
    let _ = pump.join();
    result
}
