//! Exit-identity rotation through the Tor control protocol.
//!
//! Rotation is best effort: every failure is logged and swallowed so that a
//! missing or misconfigured control port never stops a crawl.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Default control port address.
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:9051";

/// Default pause after a successful `NEWNYM` so the new circuit is in place.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

/// Upper bound for one whole control-port conversation.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from one control-port conversation.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Connecting, reading or writing the control socket failed.
    #[error("control port {addr}: {source}")]
    Io {
        /// Control port address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The cookie file could not be read.
    #[error("cannot read control cookie {path}: {source}")]
    Cookie {
        /// Cookie file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The controller answered with a non-250 status.
    #[error("control port rejected {command}: {reply}")]
    Rejected {
        /// Command that was rejected (secrets are never included).
        command: &'static str,
        /// Raw reply line.
        reply: String,
    },

    /// The conversation did not finish in time.
    #[error("control port {addr} timed out after {}s", timeout.as_secs())]
    Timeout {
        /// Control port address.
        addr: String,
        /// Configured timeout.
        timeout: Duration,
    },
}

impl IdentityError {
    fn io(addr: &str, source: std::io::Error) -> Self {
        Self::Io {
            addr: addr.to_string(),
            source,
        }
    }
}

/// Requests a new outbound identity.
#[async_trait]
pub trait IdentityRotator: Send + Sync + std::fmt::Debug {
    /// Rotates the identity. Never fails; problems are logged.
    async fn rotate(&self);
}

/// Rotator used with direct transport: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRotation;

#[async_trait]
impl IdentityRotator for NoRotation {
    async fn rotate(&self) {
        debug!("identity rotation disabled");
    }
}

/// How to authenticate to the control port.
#[derive(Clone, Default)]
pub enum ControlAuth {
    /// Ask with `PROTOCOLINFO` and use what the controller offers: no
    /// credential when `NULL` is allowed, else the advertised cookie file.
    #[default]
    Auto,
    /// `AUTHENTICATE "<password>"`.
    Password(String),
    /// `AUTHENTICATE <hex of cookie file>`.
    CookieFile(PathBuf),
}

impl std::fmt::Debug for ControlAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::Password(_) => f.write_str("Password([REDACTED])"),
            Self::CookieFile(path) => f.debug_tuple("CookieFile").field(path).finish(),
        }
    }
}

/// Authentication methods advertised in a `PROTOCOLINFO` reply.
#[derive(Debug, Default, PartialEq, Eq)]
struct AuthInfo {
    methods: Vec<String>,
    cookie_file: Option<PathBuf>,
}

impl AuthInfo {
    /// Reads the `AUTH` line out of the reply lines, if there is one.
    fn from_reply(lines: &[String]) -> Self {
        lines
            .iter()
            .filter_map(|line| line.get(4..))
            .find_map(|text| text.strip_prefix("AUTH "))
            .map(Self::parse)
            .unwrap_or_default()
    }

    /// Parses `METHODS=A,B COOKIEFILE="path"`; unknown keys are skipped.
    fn parse(mut rest: &str) -> Self {
        let mut info = Self::default();
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                return info;
            }
            if let Some(value) = rest.strip_prefix("METHODS=") {
                let end = value.find(' ').unwrap_or(value.len());
                info.methods = value[..end].split(',').map(str::to_string).collect();
                rest = &value[end..];
            } else if let Some((path, remaining)) = rest
                .strip_prefix("COOKIEFILE=")
                .and_then(unquote)
            {
                info.cookie_file = Some(PathBuf::from(path));
                rest = remaining;
            } else {
                let end = rest.find(' ').unwrap_or(rest.len());
                rest = &rest[end..];
            }
        }
    }

    fn offers(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

/// Tor control port client that sends `SIGNAL NEWNYM`.
#[derive(Debug, Clone)]
pub struct TorControl {
    addr: String,
    auth: ControlAuth,
    settle: Duration,
    timeout: Duration,
}

impl TorControl {
    /// Creates a client for the control port at `addr`.
    #[must_use]
    pub fn new(addr: impl Into<String>, auth: ControlAuth) -> Self {
        Self {
            addr: addr.into(),
            auth,
            settle: DEFAULT_SETTLE,
            timeout: CONTROL_TIMEOUT,
        }
    }

    /// Sets the pause taken after a successful rotation.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Sets the timeout for one control-port conversation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Control port address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Authenticates and sends `SIGNAL NEWNYM`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the port is unreachable, a reply is not
    /// `250`, or the conversation exceeds the timeout.
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn request_new_identity(&self) -> Result<(), IdentityError> {
        tokio::time::timeout(self.timeout, self.converse())
            .await
            .map_err(|_| IdentityError::Timeout {
                addr: self.addr.clone(),
                timeout: self.timeout,
            })?
    }

    async fn converse(&self) -> Result<(), IdentityError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| IdentityError::io(&self.addr, e))?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let credential = match &self.auth {
            ControlAuth::Auto => self.discover_credential(&mut writer, &mut reader).await?,
            ControlAuth::Password(password) => quote(password),
            ControlAuth::CookieFile(path) => read_cookie(path).await?,
        };
        let authenticate = if credential.is_empty() {
            "AUTHENTICATE\r\n".to_string()
        } else {
            format!("AUTHENTICATE {credential}\r\n")
        };
        self.command(&mut writer, &mut reader, "AUTHENTICATE", &authenticate)
            .await?;
        self.command(&mut writer, &mut reader, "SIGNAL NEWNYM", "SIGNAL NEWNYM\r\n")
            .await?;

        // The controller closes the connection after QUIT; its reply is not needed.
        if let Err(e) = writer.write_all(b"QUIT\r\n").await {
            debug!(error = %e, "QUIT not delivered");
        }
        Ok(())
    }

    /// Picks a credential from the controller's `PROTOCOLINFO` answer.
    async fn discover_credential<W, R>(
        &self,
        writer: &mut W,
        reader: &mut R,
    ) -> Result<String, IdentityError>
    where
        W: AsyncWrite + Unpin,
        R: AsyncBufRead + Unpin,
    {
        writer
            .write_all(b"PROTOCOLINFO 1\r\n")
            .await
            .map_err(|e| IdentityError::io(&self.addr, e))?;
        let lines = read_reply_lines(reader)
            .await
            .map_err(|e| IdentityError::io(&self.addr, e))?;
        let last = lines.last().cloned().unwrap_or_default();
        if !last.starts_with("250") {
            return Err(IdentityError::Rejected {
                command: "PROTOCOLINFO",
                reply: last,
            });
        }

        let info = AuthInfo::from_reply(&lines);
        debug!(methods = ?info.methods, cookie_file = ?info.cookie_file, "controller auth methods");
        if info.offers("NULL") {
            return Ok(String::new());
        }
        match &info.cookie_file {
            Some(path) if info.offers("COOKIE") => read_cookie(path).await,
            _ => {
                debug!("no cookie offered, authenticating without credential");
                Ok(String::new())
            }
        }
    }

    async fn command<W, R>(
        &self,
        writer: &mut W,
        reader: &mut R,
        name: &'static str,
        line: &str,
    ) -> Result<(), IdentityError>
    where
        W: AsyncWrite + Unpin,
        R: AsyncBufRead + Unpin,
    {
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| IdentityError::io(&self.addr, e))?;
        let reply = read_reply(reader)
            .await
            .map_err(|e| IdentityError::io(&self.addr, e))?;
        if reply.starts_with("250") {
            debug!(command = name, "control command accepted");
            Ok(())
        } else {
            Err(IdentityError::Rejected {
                command: name,
                reply,
            })
        }
    }
}

#[async_trait]
impl IdentityRotator for TorControl {
    async fn rotate(&self) {
        match self.request_new_identity().await {
            Ok(()) => {
                info!(
                    addr = %self.addr,
                    settle_secs = self.settle.as_secs(),
                    "requested new identity"
                );
                tokio::time::sleep(self.settle).await;
            }
            Err(e) => warn!(error = %e, "identity rotation failed"),
        }
    }
}

/// Reads one (possibly multi-line) reply, returning every line.
///
/// Intermediate lines use `250-`/`250+`; the final line has a space after
/// the status code.
async fn read_reply_lines<R>(reader: &mut R) -> std::io::Result<Vec<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "control connection closed",
            ));
        }
        let line = line.trim_end().to_string();
        let last = line.as_bytes().get(3).is_none_or(|b| *b == b' ');
        lines.push(line);
        if last {
            return Ok(lines);
        }
    }
}

/// Reads one reply and returns its final line.
async fn read_reply<R>(reader: &mut R) -> std::io::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    Ok(read_reply_lines(reader).await?.pop().unwrap_or_default())
}

async fn read_cookie(path: &Path) -> Result<String, IdentityError> {
    let cookie = tokio::fs::read(path)
        .await
        .map_err(|source| IdentityError::Cookie {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(hex::encode(cookie))
}

fn quote(password: &str) -> String {
    let escaped = password.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Splits a leading quoted string off `input`, undoing backslash escapes.
fn unquote(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut value = String::new();
    let mut chars = body.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            '"' => return Some((value, &body[index + 1..])),
            '\\' => value.push(chars.next()?.1),
            other => value.push(other),
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const OK: &str = "250 OK\r\n";

    fn protocolinfo(auth_line: &str) -> String {
        format!(
            "250-PROTOCOLINFO 1\r\n250-{auth_line}\r\n250-VERSION Tor=\"0.4.8.9\"\r\n250 OK\r\n"
        )
    }

    /// Accepts one connection, answers each command line with the next
    /// scripted reply, and returns everything the client sent.
    async fn fake_controller(replies: Vec<String>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let mut received = String::new();
            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                received.push_str(&line);
                writer.write_all(reply.as_bytes()).await.unwrap();
            }
            let mut rest = String::new();
            let _ = reader.read_to_string(&mut rest).await;
            received.push_str(&rest);
            received
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_password_auth_then_newnym_then_quit() {
        let (addr, server) = fake_controller(vec![OK.into(), OK.into()]).await;
        let control = TorControl::new(addr, ControlAuth::Password("se\"cret".to_string()));

        control.request_new_identity().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(
            received,
            "AUTHENTICATE \"se\\\"cret\"\r\nSIGNAL NEWNYM\r\nQUIT\r\n"
        );
    }

    #[tokio::test]
    async fn test_cookie_auth_sends_hex() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let cookie = temp_dir.path().join("control_auth_cookie");
        std::fs::write(&cookie, [0xde, 0xad, 0x01]).unwrap();
        let (addr, server) = fake_controller(vec![OK.into(), OK.into()]).await;

        TorControl::new(addr, ControlAuth::CookieFile(cookie))
            .request_new_identity()
            .await
            .unwrap();

        assert!(server.await.unwrap().starts_with("AUTHENTICATE dead01\r\n"));
    }

    #[tokio::test]
    async fn test_auto_auth_without_credential_when_null_offered() {
        let (addr, server) = fake_controller(vec![
            protocolinfo("AUTH METHODS=NULL"),
            OK.into(),
            OK.into(),
        ])
        .await;

        TorControl::new(addr, ControlAuth::Auto)
            .request_new_identity()
            .await
            .unwrap();

        assert!(
            server
                .await
                .unwrap()
                .starts_with("PROTOCOLINFO 1\r\nAUTHENTICATE\r\nSIGNAL NEWNYM\r\n")
        );
    }

    #[tokio::test]
    async fn test_auto_auth_reads_advertised_cookie() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let cookie = temp_dir.path().join("control.authcookie");
        std::fs::write(&cookie, [0x00, 0x0f, 0xff]).unwrap();
        let auth_line = format!(
            "AUTH METHODS=COOKIE,SAFECOOKIE COOKIEFILE=\"{}\"",
            cookie.display()
        );
        let (addr, server) =
            fake_controller(vec![protocolinfo(&auth_line), OK.into(), OK.into()]).await;

        TorControl::new(addr, ControlAuth::Auto)
            .request_new_identity()
            .await
            .unwrap();

        assert_eq!(
            server.await.unwrap(),
            "PROTOCOLINFO 1\r\nAUTHENTICATE 000fff\r\nSIGNAL NEWNYM\r\nQUIT\r\n"
        );
    }

    #[tokio::test]
    async fn test_auto_auth_missing_cookie_file_is_cookie_error() {
        let (addr, _server) = fake_controller(vec![protocolinfo(
            "AUTH METHODS=COOKIE COOKIEFILE=\"/nonexistent/control.authcookie\"",
        )])
        .await;

        let err = TorControl::new(addr, ControlAuth::Auto)
            .request_new_identity()
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Cookie { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_auto_auth_password_only_controller_rejects() {
        let (addr, _server) = fake_controller(vec![
            protocolinfo("AUTH METHODS=HASHEDPASSWORD"),
            "515 Authentication failed: Password did not match\r\n".into(),
        ])
        .await;

        let err = TorControl::new(addr, ControlAuth::Auto)
            .request_new_identity()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IdentityError::Rejected {
                command: "AUTHENTICATE",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_rejected_authentication_is_an_error() {
        let (addr, _server) = fake_controller(vec![
            "515 Authentication failed: Password did not match\r\n".into(),
        ])
        .await;
        let err = TorControl::new(addr, ControlAuth::Password("wrong".to_string()))
            .request_new_identity()
            .await
            .unwrap_err();
        match err {
            IdentityError::Rejected { command, reply } => {
                assert_eq!(command, "AUTHENTICATE");
                assert!(reply.starts_with("515"));
                assert!(!reply.contains("wrong"));
            }
            other => panic!("Expected Rejected, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiline_reply_reads_to_final_line() {
        let (addr, _server) =
            fake_controller(vec!["250-first\r\n250+second\r\n250 OK\r\n".into(), OK.into()]).await;
        TorControl::new(addr, ControlAuth::Password("p".to_string()))
            .request_new_identity()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_port_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TorControl::new(addr, ControlAuth::Auto)
            .request_new_identity()
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Io { .. }));
    }

    #[tokio::test]
    async fn test_silent_controller_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = TorControl::new(addr, ControlAuth::Auto)
            .with_timeout(Duration::from_millis(100))
            .request_new_identity()
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_rotate_swallows_errors_and_skips_settle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let control = TorControl::new(addr, ControlAuth::Auto).with_settle(Duration::from_secs(60));

        let started = std::time::Instant::now();
        control.rotate().await;
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let debug = format!("{:?}", ControlAuth::Password("hunter2".to_string()));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_auth_info_parses_methods_and_escaped_cookie_path() {
        let lines = vec![
            "250-PROTOCOLINFO 1".to_string(),
            r#"250-AUTH METHODS=COOKIE,SAFECOOKIE COOKIEFILE="/run/tor/a \"b\".cookie""#
                .to_string(),
            "250 OK".to_string(),
        ];
        let info = AuthInfo::from_reply(&lines);
        assert_eq!(info.methods, vec!["COOKIE", "SAFECOOKIE"]);
        assert_eq!(
            info.cookie_file,
            Some(PathBuf::from("/run/tor/a \"b\".cookie"))
        );
        assert!(info.offers("COOKIE"));
        assert!(!info.offers("NULL"));
    }

    #[test]
    fn test_auth_info_without_auth_line_is_empty() {
        let info = AuthInfo::from_reply(&["250 OK".to_string()]);
        assert_eq!(info, AuthInfo::default());
    }
}
