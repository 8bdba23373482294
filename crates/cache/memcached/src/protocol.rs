//! Memcached text protocol client.
//!
//! Only the commands the store needs are implemented: `get`, `set`, `add`,
//! `delete`, `incr`, `decr`, `flush_all` and `version`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

use keylock_cache::error::StoreError;

/// Longest key the server accepts.
const MAX_KEY_LENGTH: usize = 250;

/// Storage commands sharing the `<verb> <key> <flags> <exptime> <bytes>`
/// framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    Set,
    Add,
}

impl StoreVerb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Add => "add",
        }
    }
}

fn io_error(e: &std::io::Error) -> StoreError {
    StoreError::Connection(e.to_string())
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty()
        || key.len() > MAX_KEY_LENGTH
        || key.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(StoreError::Backend(format!("invalid memcached key: {key:?}")));
    }
    Ok(())
}

/// Turn a server error line into a [`StoreError`], or pass it through.
fn server_error(line: &str) -> StoreError {
    if line == "ERROR" {
        StoreError::Backend("memcached rejected the command".to_owned())
    } else if let Some(msg) = line.strip_prefix("CLIENT_ERROR ") {
        StoreError::Backend(format!("memcached client error: {msg}"))
    } else if let Some(msg) = line.strip_prefix("SERVER_ERROR ") {
        StoreError::Backend(format!("memcached server error: {msg}"))
    } else {
        StoreError::Backend(format!("unexpected memcached reply: {line}"))
    }
}

/// A single connection speaking the text protocol.
pub struct Connection<S = BufStream<TcpStream>> {
    stream: S,
}

impl Connection {
    /// Dial `addr`, giving up after `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, StoreError> {
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| StoreError::Connection(format!("connecting to {addr} timed out")))?
            .map_err(|e| io_error(&e))?;
        tcp.set_nodelay(true).map_err(|e| io_error(&e))?;

        tracing::debug!(addr, "memcached connection opened");
        Ok(Self::new(BufStream::new(tcp)))
    }
}

impl<S> Connection<S>
where
    S: AsyncBufRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    async fn send(&mut self, request: &[u8]) -> Result<(), StoreError> {
        self.stream
            .write_all(request)
            .await
            .map_err(|e| io_error(&e))?;
        self.stream.flush().await.map_err(|e| io_error(&e))
    }

    /// Read one reply line without its `\r\n` terminator.
    async fn read_line(&mut self) -> Result<String, StoreError> {
        let mut line = String::new();
        let read = self
            .stream
            .read_line(&mut line)
            .await
            .map_err(|e| io_error(&e))?;
        if read == 0 {
            return Err(StoreError::Connection(
                "memcached closed the connection".to_owned(),
            ));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(line)
    }

    /// Read a data block of `len` bytes followed by `\r\n`.
    async fn read_block(&mut self, len: usize) -> Result<String, StoreError> {
        let mut block = vec![0u8; len + 2];
        self.stream
            .read_exact(&mut block)
            .await
            .map_err(|e| io_error(&e))?;
        if !block.ends_with(b"\r\n") {
            return Err(StoreError::Backend(
                "memcached data block is not terminated by CRLF".to_owned(),
            ));
        }
        block.truncate(len);
        String::from_utf8(block)
            .map_err(|e| StoreError::Serialization(format!("memcached value is not UTF-8: {e}")))
    }

    /// Fetch several keys. Missing keys are simply absent from the result.
    pub async fn get_multi(&mut self, keys: &[String]) -> Result<HashMap<String, String>, StoreError> {
        let mut found = HashMap::with_capacity(keys.len());
        if keys.is_empty() {
            return Ok(found);
        }
        for key in keys {
            check_key(key)?;
        }

        let request = format!("get {}\r\n", keys.join(" "));
        self.send(request.as_bytes()).await?;

        loop {
            let line = self.read_line().await?;
            if line == "END" {
                return Ok(found);
            }

            // VALUE <key> <flags> <bytes> [<cas unique>]
            let mut parts = line.split(' ');
            let (Some("VALUE"), Some(key), Some(_flags), Some(len)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(server_error(&line));
            };
            let len: usize = len
                .parse()
                .map_err(|_| StoreError::Backend(format!("bad value length in reply: {line}")))?;
            let key = key.to_owned();
            let value = self.read_block(len).await?;
            found.insert(key, value);
        }
    }

    pub async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let mut found = self.get_multi(&[key.to_owned()]).await?;
        Ok(found.remove(key))
    }

    /// Run a storage command. Returns `false` on `NOT_STORED`.
    pub async fn store(
        &mut self,
        verb: StoreVerb,
        key: &str,
        value: &str,
        exptime: u32,
    ) -> Result<bool, StoreError> {
        check_key(key)?;
        let mut request = format!(
            "{} {key} 0 {exptime} {}\r\n",
            verb.as_str(),
            value.len()
        )
        .into_bytes();
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
        self.send(&request).await?;

        match self.read_line().await?.as_str() {
            "STORED" => Ok(true),
            "NOT_STORED" => Ok(false),
            other => Err(server_error(other)),
        }
    }

    /// Delete a key. Returns `false` on `NOT_FOUND`.
    pub async fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        check_key(key)?;
        self.send(format!("delete {key}\r\n").as_bytes()).await?;

        match self.read_line().await?.as_str() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(server_error(other)),
        }
    }

    /// `incr`. Returns `None` when the key does not exist.
    pub async fn incr(&mut self, key: &str, amount: u64) -> Result<Option<u64>, StoreError> {
        self.arithmetic("incr", key, amount).await
    }

    /// `decr`. The server clamps at zero. Returns `None` when the key does
    /// not exist.
    pub async fn decr(&mut self, key: &str, amount: u64) -> Result<Option<u64>, StoreError> {
        self.arithmetic("decr", key, amount).await
    }

    async fn arithmetic(
        &mut self,
        verb: &str,
        key: &str,
        amount: u64,
    ) -> Result<Option<u64>, StoreError> {
        check_key(key)?;
        self.send(format!("{verb} {key} {amount}\r\n").as_bytes())
            .await?;

        let line = self.read_line().await?;
        if line == "NOT_FOUND" {
            return Ok(None);
        }
        line.trim_end()
            .parse()
            .map(Some)
            .map_err(|_| server_error(&line))
    }

    pub async fn flush_all(&mut self) -> Result<(), StoreError> {
        self.send(b"flush_all\r\n").await?;
        match self.read_line().await?.as_str() {
            "OK" => Ok(()),
            other => Err(server_error(other)),
        }
    }

    /// Server version string. Doubles as a liveness check.
    pub async fn version(&mut self) -> Result<String, StoreError> {
        self.send(b"version\r\n").await?;
        let line = self.read_line().await?;
        line.strip_prefix("VERSION ")
            .map(str::to_owned)
            .ok_or_else(|| server_error(&line))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;

    /// Connect to a scripted peer that expects each request in turn and
    /// answers with the paired reply.
    fn scripted(exchanges: Vec<(&'static str, &'static str)>) -> Connection<BufStream<DuplexStream>> {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            for (expected, reply) in exchanges {
                let mut request = vec![0u8; expected.len()];
                server.read_exact(&mut request).await.unwrap();
                assert_eq!(String::from_utf8(request).unwrap(), expected);
                server.write_all(reply.as_bytes()).await.unwrap();
            }
        });
        Connection::new(BufStream::new(client))
    }

    #[tokio::test]
    async fn get_hit_and_miss() {
        let mut conn = scripted(vec![
            ("get JOB:42\r\n", "VALUE JOB:42 0 8\r\nworker-1\r\nEND\r\n"),
            ("get MISSING\r\n", "END\r\n"),
        ]);

        assert_eq!(conn.get("JOB:42").await.unwrap().as_deref(), Some("worker-1"));
        assert!(conn.get("MISSING").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_multi_reads_values_containing_crlf() {
        let mut conn = scripted(vec![(
            "get A B C\r\n",
            "VALUE A 0 4\r\nx\r\ny\r\nVALUE C 0 1 99\r\nz\r\nEND\r\n",
        )]);

        let found = conn
            .get_multi(&["A".into(), "B".into(), "C".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["A"], "x\r\ny");
        assert_eq!(found["C"], "z");
    }

    #[tokio::test]
    async fn add_reports_not_stored() {
        let mut conn = scripted(vec![
            ("add LOCK 0 10 1\r\na\r\n", "STORED\r\n"),
            ("add LOCK 0 10 1\r\nb\r\n", "NOT_STORED\r\n"),
        ]);

        assert!(conn.store(StoreVerb::Add, "LOCK", "a", 10).await.unwrap());
        assert!(!conn.store(StoreVerb::Add, "LOCK", "b", 10).await.unwrap());
    }

    #[tokio::test]
    async fn delete_and_arithmetic() {
        let mut conn = scripted(vec![
            ("delete K\r\n", "DELETED\r\n"),
            ("delete K\r\n", "NOT_FOUND\r\n"),
            ("incr N 5\r\n", "15\r\n"),
            ("decr N 20\r\n", "0\r\n"),
            ("incr GONE 1\r\n", "NOT_FOUND\r\n"),
        ]);

        assert!(conn.delete("K").await.unwrap());
        assert!(!conn.delete("K").await.unwrap());
        assert_eq!(conn.incr("N", 5).await.unwrap(), Some(15));
        assert_eq!(conn.decr("N", 20).await.unwrap(), Some(0));
        assert_eq!(conn.incr("GONE", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn server_errors_become_backend_errors() {
        let mut conn = scripted(vec![(
            "incr TEXT 1\r\n",
            "CLIENT_ERROR cannot increment or decrement non-numeric value\r\n",
        )]);

        let err = conn.incr("TEXT", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("non-numeric")));
    }

    #[tokio::test]
    async fn flush_and_version() {
        let mut conn = scripted(vec![
            ("flush_all\r\n", "OK\r\n"),
            ("version\r\n", "VERSION 1.6.21\r\n"),
        ]);

        conn.flush_all().await.unwrap();
        assert_eq!(conn.version().await.unwrap(), "1.6.21");
    }

    #[tokio::test]
    async fn closed_connection_is_a_connection_error() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut conn = Connection::new(BufStream::new(client));

        let err = conn.version().await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn rejects_keys_with_whitespace() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = Connection::new(BufStream::new(client));

        let err = conn.get("HAS SPACE").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(conn.delete(&"K".repeat(251)).await.is_err());
    }
}
