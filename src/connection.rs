//! TCP and TLS connection to a stream broker.
//!
//! A [`Connection`] owns one socket with buffered RESP I/O. It supports
//! single commands, pipelines (all commands written before any reply is
//! read) and `MULTI`/`EXEC` transactions sent as one pipeline.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::resp;
use crate::types::Value;

/// Default read/write buffer size (8 KB).
const DEFAULT_BUF_SIZE: usize = 8 * 1024;

/// Settings for opening a broker connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// ACL username; `None` authenticates as the default user.
    pub username: Option<String>,
    /// Optional password for AUTH.
    pub password: Option<String>,
    /// Database index to SELECT on connect.
    pub database: u8,
    /// Read/write buffer size in bytes.
    pub buffer_size: usize,
    /// Upper bound on TCP connect plus handshake.
    pub connect_timeout: Duration,
    /// Maximum number of pooled connections.
    pub pool_size: usize,
    /// Enable TLS (requires the `tls` feature).
    pub tls: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            buffer_size: DEFAULT_BUF_SIZE,
            connect_timeout: Duration::from_secs(5),
            pool_size: 8,
            tls: false,
        }
    }
}

impl ConnectionConfig {
    /// Create a config for `host:port` with defaults elsewhere.
    pub fn from_addr(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One socket to the broker with buffered RESP I/O.
pub struct Connection {
    stream: Stream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

/// Abstraction over plain TCP and TLS streams.
enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    /// Open a connection, authenticate, select the database and PING.
    ///
    /// Every step must succeed; a connection that cannot PING is never
    /// handed out.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        tokio::time::timeout(config.connect_timeout, Self::handshake(config))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))?
    }

    async fn handshake(config: &ConnectionConfig) -> Result<Self> {
        let tcp = TcpStream::connect(config.address()).await?;
        tcp.set_nodelay(true)?;

        let stream = if config.tls {
            #[cfg(feature = "tls")]
            {
                use std::sync::Arc;
                use tokio_rustls::TlsConnector;

                let mut root_store = rustls::RootCertStore::empty();
                root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

                let tls_config = rustls::ClientConfig::builder()
                    .with_root_certificates(root_store)
                    .with_no_client_auth();

                let connector = TlsConnector::from(Arc::new(tls_config));
                let domain = rustls::pki_types::ServerName::try_from(config.host.clone())
                    .map_err(|e| Error::Protocol(format!("invalid TLS server name: {}", e)))?;

                Stream::Tls(Box::new(connector.connect(domain, tcp).await?))
            }
            #[cfg(not(feature = "tls"))]
            {
                return Err(Error::InvalidArgument(
                    "TLS support requires the `tls` feature".into(),
                ));
            }
        } else {
            Stream::Tcp(tcp)
        };

        let mut conn = Self {
            stream,
            read_buf: BytesMut::with_capacity(config.buffer_size),
            write_buf: BytesMut::with_capacity(config.buffer_size),
        };

        if let Some(ref password) = config.password {
            let mut auth = vec![Bytes::from("AUTH")];
            if let Some(ref username) = config.username {
                auth.push(Bytes::copy_from_slice(username.as_bytes()));
            }
            auth.push(Bytes::copy_from_slice(password.as_bytes()));
            match conn.execute(&auth).await {
                Ok(Value::Status(ref s)) if s == "OK" => {}
                Ok(other) => {
                    return Err(Error::Auth(format!("unexpected AUTH response: {}", other)))
                }
                Err(Error::Server(msg)) => return Err(Error::Auth(msg)),
                Err(e) => return Err(e),
            }
        }

        if config.database != 0 {
            conn.execute(&[
                Bytes::from("SELECT"),
                Bytes::from(config.database.to_string()),
            ])
            .await?
            .expect_ok()?;
        }

        match conn.execute(&[Bytes::from("PING")]).await? {
            Value::Status(ref s) if s == "PONG" => {
                info!(address = %config.address(), "PING: PONG");
            }
            other => {
                return Err(Error::UnexpectedResponse {
                    expected: "PONG",
                    actual: other.to_string(),
                })
            }
        }

        Ok(conn)
    }

    /// Send one command and read its reply. Error replies become `Err`.
    pub async fn execute(&mut self, args: &[Bytes]) -> Result<Value> {
        self.write_buf.clear();
        resp::encode_command(args, &mut self.write_buf);
        self.flush().await?;
        self.read_response().await?.into_result()
    }

    /// Send all commands in one write, then read one reply per command.
    ///
    /// Error replies are returned as [`Value::Error`] in their slot.
    pub async fn pipeline(&mut self, commands: &[Vec<Bytes>]) -> Result<Vec<Value>> {
        self.write_buf.clear();
        for args in commands {
            resp::encode_command(args, &mut self.write_buf);
        }
        self.flush().await?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(self.read_response().await?);
        }
        Ok(replies)
    }

    /// Run `commands` inside `MULTI`/`EXEC` in a single round trip.
    ///
    /// Returns the per-command results from the `EXEC` reply. Fails if the
    /// transaction was not queued or was discarded by the broker.
    pub async fn transaction(&mut self, commands: &[Vec<Bytes>]) -> Result<Vec<Value>> {
        let mut batch = Vec::with_capacity(commands.len() + 2);
        batch.push(vec![Bytes::from("MULTI")]);
        batch.extend(commands.iter().cloned());
        batch.push(vec![Bytes::from("EXEC")]);

        let mut replies = self.pipeline(&batch).await?;
        let exec = replies.pop().ok_or(Error::ConnectionClosed)?;

        for reply in replies {
            if let Value::Error(msg) = reply {
                return Err(Error::Server(msg));
            }
        }

        match exec {
            Value::Array(results) => {
                debug!(commands = results.len(), "transaction executed");
                Ok(results)
            }
            Value::Nil => Err(Error::Server("EXECABORT transaction discarded".into())),
            other => other.into_result().and_then(|v| v.into_array()),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        match &mut self.stream {
            Stream::Tcp(tcp) => {
                tcp.write_all(&self.write_buf).await?;
                tcp.flush().await?;
            }
            #[cfg(feature = "tls")]
            Stream::Tls(tls) => {
                tls.write_all(&self.write_buf).await?;
                tls.flush().await?;
            }
        }
        self.write_buf.clear();
        Ok(())
    }

    /// Read a single reply from the connection.
    async fn read_response(&mut self) -> Result<Value> {
        loop {
            if let Some(value) = resp::decode_value(&mut self.read_buf)? {
                return Ok(value);
            }

            let n = match &mut self.stream {
                Stream::Tcp(tcp) => tcp.read_buf(&mut self.read_buf).await?,
                #[cfg(feature = "tls")]
                Stream::Tls(tls) => tls.read_buf(&mut self.read_buf).await?,
            };

            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}
