//! RouterOS API client.
//!
//! The API speaks "sentences" over a plain TCP stream (port 8728). A
//! sentence is a list of length-prefixed words ended by an empty word.
//! Replies start with `!re` (one data row), `!done` (end of reply),
//! `!trap` (command error) or `!fatal` (connection is being closed).

use std::collections::HashMap;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Words longer than this are treated as garbage rather than allocated.
pub const MAX_WORD_LEN: usize = 1 << 20;

/// Default API port.
pub const DEFAULT_PORT: u16 = 8728;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed reply: {0}")]
    Decode(String),

    #[error("Command {command} failed: {message}")]
    Trap { command: String, message: String },

    #[error("Device closed the session: {0}")]
    Fatal(String),

    #[error("Login rejected for {user}: {message}")]
    LoginRejected { user: String, message: String },

    #[error("Device requires the legacy challenge login")]
    LegacyLogin,
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// One `!re` row as attribute name → value.
pub type Row = HashMap<String, String>;

// ── Word encoding ─────────────────────────────────────────────────

/// Encode a word length using the API's variable-width prefix.
pub fn encode_length(len: usize) -> Vec<u8> {
    let len = len as u32;
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x4000 {
        let v = len | 0x8000;
        vec![(v >> 8) as u8, v as u8]
    } else if len < 0x20_0000 {
        let v = len | 0xC0_0000;
        vec![(v >> 16) as u8, (v >> 8) as u8, v as u8]
    } else if len < 0x1000_0000 {
        let v = len | 0xE000_0000;
        vec![(v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8]
    } else {
        vec![
            0xF0,
            (len >> 24) as u8,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ]
    }
}

async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<usize> {
    let first = reader.read_u8().await?;
    let (extra, initial) = match first {
        b if b & 0x80 == 0x00 => (0, u32::from(b)),
        b if b & 0xC0 == 0x80 => (1, u32::from(b & 0x3F)),
        b if b & 0xE0 == 0xC0 => (2, u32::from(b & 0x1F)),
        b if b & 0xF0 == 0xE0 => (3, u32::from(b & 0x0F)),
        0xF0 => (4, 0),
        b => return Err(ApiError::Decode(format!("control byte {b:#04x} in length"))),
    };

    let mut len = initial;
    for _ in 0..extra {
        len = (len << 8) | u32::from(reader.read_u8().await?);
    }
    Ok(len as usize)
}

/// Write one sentence and flush it.
pub async fn write_sentence<W, S>(writer: &mut W, words: &[S]) -> Result<()>
where
    W: AsyncWrite + Unpin,
    S: AsRef<str>,
{
    let mut buf = Vec::new();
    for word in words {
        let bytes = word.as_ref().as_bytes();
        buf.extend_from_slice(&encode_length(bytes.len()));
        buf.extend_from_slice(bytes);
    }
    buf.push(0);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one sentence. Returns an empty vec only for a bare terminator.
pub async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<String>> {
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(ApiError::Decode(format!("word of {len} bytes")));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        let word = String::from_utf8(buf)
            .map_err(|e| ApiError::Decode(format!("non-UTF-8 word: {e}")))?;
        words.push(word);
    }
}

// ── Replies ───────────────────────────────────────────────────────

/// A decoded reply sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Re(Row),
    Done(Row),
    Trap(Row),
    Fatal(String),
}

impl Reply {
    pub fn parse(words: Vec<String>) -> Result<Self> {
        let mut iter = words.into_iter();
        let kind = iter
            .next()
            .ok_or_else(|| ApiError::Decode("empty sentence".to_string()))?;
        if kind == "!fatal" {
            return Ok(Reply::Fatal(iter.collect::<Vec<_>>().join(" ")));
        }
        let attrs = parse_attributes(iter);
        match kind.as_str() {
            "!re" => Ok(Reply::Re(attrs)),
            "!done" => Ok(Reply::Done(attrs)),
            "!trap" => Ok(Reply::Trap(attrs)),
            other => Err(ApiError::Decode(format!("unknown reply type {other:?}"))),
        }
    }
}

/// Collect `=name=value` words. API tags (`.tag=`) and unknown words are skipped.
fn parse_attributes(words: impl Iterator<Item = String>) -> Row {
    let mut attrs = Row::new();
    for word in words {
        let Some(rest) = word.strip_prefix('=') else {
            continue;
        };
        match rest.split_once('=') {
            Some((name, value)) => attrs.insert(name.to_string(), value.to_string()),
            None => attrs.insert(rest.to_string(), String::new()),
        };
    }
    attrs
}

// ── Connection ────────────────────────────────────────────────────

/// An API session over any byte stream.
pub struct ApiConnection<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ApiConnection<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Authenticate with the post-6.43 plaintext login.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<()> {
        let name = format!("=name={user}");
        let pass = format!("=password={password}");
        write_sentence(&mut self.stream, &["/login", name.as_str(), pass.as_str()]).await?;

        match self.collect("/login").await {
            Ok((_, done)) if done.contains_key("ret") => Err(ApiError::LegacyLogin),
            Ok(_) => Ok(()),
            Err(ApiError::Trap { message, .. }) => Err(ApiError::LoginRejected {
                user: user.to_string(),
                message,
            }),
            Err(e) => Err(e),
        }
    }

    /// Run a command and return its `!re` rows.
    pub async fn command(&mut self, path: &str, args: &[(&str, &str)]) -> Result<Vec<Row>> {
        let mut words = vec![path.to_string()];
        words.extend(args.iter().map(|(k, v)| format!("={k}={v}")));
        write_sentence(&mut self.stream, &words).await?;
        let (rows, _) = self.collect(path).await?;
        Ok(rows)
    }

    /// Read replies until `!done`. A `!trap` is reported once the reply ends.
    async fn collect(&mut self, command: &str) -> Result<(Vec<Row>, Row)> {
        let mut rows = Vec::new();
        let mut trap: Option<String> = None;
        loop {
            let words = read_sentence(&mut self.stream).await?;
            if words.is_empty() {
                continue;
            }
            match Reply::parse(words)? {
                Reply::Re(row) => rows.push(row),
                Reply::Trap(attrs) => {
                    let message = attrs.get("message").cloned().unwrap_or_default();
                    trap.get_or_insert(message);
                }
                Reply::Fatal(reason) => return Err(ApiError::Fatal(reason)),
                Reply::Done(attrs) => {
                    return match trap {
                        Some(message) => Err(ApiError::Trap {
                            command: command.to_string(),
                            message,
                        }),
                        None => Ok((rows, attrs)),
                    };
                }
            }
        }
    }

    /// Shut the write side down. Errors are irrelevant at this point.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn roundtrip_length(len: usize) -> usize {
        let encoded = encode_length(len);
        let mut reader = encoded.as_slice();
        read_length(&mut reader).await.unwrap()
    }

    #[tokio::test]
    async fn test_length_prefix_widths() {
        assert_eq!(encode_length(0x7F), vec![0x7F]);
        assert_eq!(encode_length(0x80), vec![0x80, 0x80]);
        assert_eq!(encode_length(0x3FFF), vec![0xBF, 0xFF]);
        assert_eq!(encode_length(0x4000), vec![0xC0, 0x40, 0x00]);
        assert_eq!(encode_length(0x20_0000), vec![0xE0, 0x20, 0x00, 0x00]);
        assert_eq!(encode_length(0x1000_0000), vec![0xF0, 0x10, 0x00, 0x00, 0x00]);

        for len in [0, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000] {
            assert_eq!(roundtrip_length(len).await, len);
        }
    }

    #[tokio::test]
    async fn test_control_byte_rejected() {
        let mut reader: &[u8] = &[0xF8];
        assert!(matches!(
            read_sentence(&mut reader).await,
            Err(ApiError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_word_rejected() {
        let mut bytes = encode_length(MAX_WORD_LEN + 1);
        bytes.extend_from_slice(b"xx");
        let mut reader = bytes.as_slice();
        assert!(matches!(
            read_sentence(&mut reader).await,
            Err(ApiError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_sentence_is_io_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_length(10));
        bytes.extend_from_slice(b"abc");
        let mut reader = bytes.as_slice();
        assert!(matches!(read_sentence(&mut reader).await, Err(ApiError::Io(_))));
    }

    #[test]
    fn test_reply_attributes() {
        let reply = Reply::parse(vec![
            "!re".to_string(),
            "=name=core-1".to_string(),
            "=comment=a=b".to_string(),
            "=disabled=".to_string(),
            ".tag=7".to_string(),
        ])
        .unwrap();
        let Reply::Re(row) = reply else {
            panic!("expected !re");
        };
        assert_eq!(row.get("name").map(String::as_str), Some("core-1"));
        assert_eq!(row.get("comment").map(String::as_str), Some("a=b"));
        assert_eq!(row.get("disabled").map(String::as_str), Some(""));
        assert_eq!(row.len(), 3);

        assert!(Reply::parse(vec!["!bogus".to_string()]).is_err());
        assert_eq!(
            Reply::parse(vec!["!fatal".to_string(), "session terminated".to_string()]).unwrap(),
            Reply::Fatal("session terminated".to_string())
        );
    }

    #[tokio::test]
    async fn test_command_collects_rows_and_reports_trap() {
        let (client, mut server) = duplex(4096);
        let responder = tokio::spawn(async move {
            let req = read_sentence(&mut server).await.unwrap();
            assert_eq!(req, vec!["/routing/ospf/neighbor/print"]);
            write_sentence(&mut server, &["!re", "=address=10.0.0.2", "=cost=10"]).await.unwrap();
            write_sentence(&mut server, &["!re", "=address=10.0.0.3"]).await.unwrap();
            write_sentence(&mut server, &["!done"]).await.unwrap();

            let req = read_sentence(&mut server).await.unwrap();
            assert_eq!(req, vec!["/nope/print"]);
            write_sentence(&mut server, &["!trap", "=message=no such command"]).await.unwrap();
            write_sentence(&mut server, &["!done"]).await.unwrap();
        });

        let mut conn = ApiConnection::new(client);
        let rows = conn.command("/routing/ospf/neighbor/print", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("cost").map(String::as_str), Some("10"));

        let err = conn.command("/nope/print", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Trap { ref message, .. } if message == "no such command"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_outcomes() {
        let (client, mut server) = duplex(1024);
        let responder = tokio::spawn(async move {
            let req = read_sentence(&mut server).await.unwrap();
            assert_eq!(req, vec!["/login", "=name=admin", "=password=secret"]);
            write_sentence(&mut server, &["!trap", "=message=invalid user name or password"])
                .await
                .unwrap();
            write_sentence(&mut server, &["!done"]).await.unwrap();

            read_sentence(&mut server).await.unwrap();
            write_sentence(&mut server, &["!done", "=ret=93b438ec9b80057c06dd9fe67d56aa9a"])
                .await
                .unwrap();

            read_sentence(&mut server).await.unwrap();
            write_sentence(&mut server, &["!done"]).await.unwrap();
        });

        let mut conn = ApiConnection::new(client);
        assert!(matches!(
            conn.login("admin", "secret").await,
            Err(ApiError::LoginRejected { .. })
        ));
        assert!(matches!(
            conn.login("admin", "secret").await,
            Err(ApiError::LegacyLogin)
        ));
        conn.login("admin", "secret").await.unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_fatal_reply() {
        let (client, mut server) = duplex(1024);
        tokio::spawn(async move {
            read_sentence(&mut server).await.unwrap();
            write_sentence(&mut server, &["!fatal", "not logged in"]).await.unwrap();
        });
        let mut conn = ApiConnection::new(client);
        let err = conn.command("/system/identity/print", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Fatal(ref m) if m == "not logged in"));
    }
}
