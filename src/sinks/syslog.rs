//! Syslog sink for remote logging
//!
//! Sends `<PRI>`-prefixed lines to a remote collector over UDP or TCP.
//! Failed sends are retried with exponential backoff; after the last
//! attempt the record is reported as a connection error and dropped.

use crate::core::{LogError, LogRecord, Renderer, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::Duration;

pub const DEFAULT_SYSLOG_PORT: u16 = 6514;

/// Facility code `user`
pub const FACILITY_USER: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyslogTransport {
    #[default]
    Udp,
    Tcp,
}

/// Bounded exponential backoff between send attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based), with jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        let jitter_cap = (self.base_delay.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
        capped + Duration::from_millis(jitter)
    }
}

enum Connection {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

pub struct SyslogSink {
    host: String,
    port: u16,
    addr: SocketAddr,
    transport: SyslogTransport,
    facility: u8,
    retry: RetryPolicy,
    renderer: Renderer,
    connection: Option<Connection>,
}

impl SyslogSink {
    /// Resolve the collector address
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty host and a connection
    /// error when the host cannot be resolved.
    pub fn new(host: impl Into<String>, port: u16, renderer: Renderer) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(LogError::config("syslog", "No host is specified to use syslog"));
        }
        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| LogError::connection(format!("{}:{}", host, port), e.to_string(), 1))?
            .next()
            .ok_or_else(|| {
                LogError::connection(format!("{}:{}", host, port), "address did not resolve", 1)
            })?;

        Ok(Self {
            host,
            port,
            addr,
            transport: SyslogTransport::default(),
            facility: FACILITY_USER,
            retry: RetryPolicy::default(),
            renderer,
            connection: None,
        })
    }

    #[must_use]
    pub fn with_transport(mut self, transport: SyslogTransport) -> Self {
        self.transport = transport;
        self.connection = None;
        self
    }

    #[must_use]
    pub fn with_facility(mut self, facility: u8) -> Self {
        self.facility = facility.min(23);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn transport(&self) -> SyslogTransport {
        self.transport
    }

    fn priority(&self, record: &LogRecord) -> u8 {
        self.facility * 8 + record.level().syslog_severity()
    }

    /// Frame a record the way the collector expects it
    pub fn frame(&self, record: &LogRecord) -> Vec<u8> {
        let mut frame = format!("<{}>{}", self.priority(record), self.renderer.render(record));
        match self.transport {
            SyslogTransport::Udp => frame.push('\0'),
            SyslogTransport::Tcp => frame.push('\n'),
        }
        frame.into_bytes()
    }

    fn connect(&self) -> std::io::Result<Connection> {
        match self.transport {
            SyslogTransport::Udp => {
                let bind_addr = if self.addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
                let socket = UdpSocket::bind(bind_addr)?;
                socket.connect(self.addr)?;
                Ok(Connection::Udp(socket))
            }
            SyslogTransport::Tcp => {
                let stream = TcpStream::connect_timeout(&self.addr, Duration::from_secs(5))?;
                stream.set_write_timeout(Some(Duration::from_secs(5)))?;
                stream.set_nodelay(true)?;
                Ok(Connection::Tcp(stream))
            }
        }
    }

    fn send_once(&mut self, frame: &[u8]) -> std::io::Result<()> {
        if self.connection.is_none() {
            self.connection = Some(self.connect()?);
        }
        match self.connection.as_mut() {
            Some(Connection::Udp(socket)) => socket.send(frame).map(|_| ()),
            Some(Connection::Tcp(stream)) => stream.write_all(frame),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "syslog connection unavailable",
            )),
        }
    }

    pub fn write(&mut self, record: &LogRecord) -> Result<()> {
        let frame = self.frame(record);
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.send_once(&frame) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.connection = None;
                    last_error = e.to_string();
                    if attempt < attempts {
                        thread::sleep(self.retry.delay_for(attempt));
                    }
                }
            }
        }

        Err(LogError::connection(self.target(), last_error, attempts))
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(Connection::Tcp(ref mut stream)) = self.connection {
            stream.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for SyslogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyslogSink")
            .field("target", &self.target())
            .field("transport", &self.transport)
            .field("facility", &self.facility)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_empty_host_is_configuration_error() {
        let err = SyslogSink::new("  ", 514, Renderer::json()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("No host is specified to use syslog"));
    }

    #[test]
    fn test_priority_uses_facility_and_severity() {
        let sink = SyslogSink::new("127.0.0.1", 514, Renderer::logfmt()).unwrap();
        let frame = sink.frame(&LogRecord::new("app", LogLevel::Error, "failed"));
        let text = String::from_utf8(frame).unwrap();
        // user facility (1) * 8 + error (3)
        assert!(text.starts_with("<11>"));
        assert!(text.ends_with('\0'));
    }

    #[test]
    fn test_udp_delivery() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut sink = SyslogSink::new("127.0.0.1", port, Renderer::json()).unwrap();
        sink.write(&LogRecord::new("app", LogLevel::Info, "over udp")).unwrap();

        let mut buf = [0u8; 2048];
        let n = receiver.recv(&mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.starts_with("<14>"));
        assert!(text.contains("over udp"));
    }

    #[test]
    fn test_tcp_delivery_is_newline_framed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).unwrap();
            line
        });

        let mut sink = SyslogSink::new("127.0.0.1", port, Renderer::json())
            .unwrap()
            .with_transport(SyslogTransport::Tcp);
        sink.write(&LogRecord::new("app", LogLevel::Warning, "over tcp")).unwrap();
        sink.flush().unwrap();

        let line = server.join().unwrap();
        assert!(line.starts_with("<12>"));
        assert!(line.ends_with('\n'));
        assert!(line.contains("over tcp"));
    }

    #[test]
    fn test_exhausted_retries_surface_connection_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut sink = SyslogSink::new("127.0.0.1", port, Renderer::json())
            .unwrap()
            .with_transport(SyslogTransport::Tcp)
            .with_retry(quick_retry());

        let err = sink
            .write(&LogRecord::new("app", LogLevel::Info, "lost"))
            .unwrap_err();
        assert!(matches!(err, LogError::Connection { attempts: 2, .. }));
    }

    #[test]
    fn test_backoff_is_bounded() {
        let retry = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        assert!(retry.delay_for(1) >= Duration::from_millis(100));
        assert!(retry.delay_for(8) <= Duration::from_millis(450));
    }
}
