//! Convenience client library: connects over TCP, frames commands with
//! `\n`, and parses RESP replies. Used by `kvcli` and by the integration
//! tests.

use std::io::{BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use kv_proto::Reply;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connect(std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server returned an error reply: {0}")]
    ServerError(String),
    #[error("unexpected reply shape: {0:?}")]
    UnexpectedReply(Reply),
}

pub type ClientResult<T> = Result<T, ClientError>;

pub struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).map_err(ClientError::Connect)?;
        stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
        stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    /// Sends a raw command line (without a trailing newline — this adds
    /// one) and returns the decoded reply.
    pub fn command(&mut self, line: &str) -> ClientResult<Reply> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(Reply::decode(&mut self.reader)?)
    }

    pub fn ping(&mut self) -> ClientResult<()> {
        match self.command("PING")? {
            Reply::Simple(_) | Reply::Bulk(_) => Ok(()),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    pub fn set_string(&mut self, key: &str, value: &str) -> ClientResult<()> {
        self.expect_ok(&format!("SET {key} {value}"))
    }

    pub fn set_int64(&mut self, key: &str, value: i64) -> ClientResult<()> {
        self.expect_ok(&format!("SET {key} {value}"))
    }

    pub fn set_double(&mut self, key: &str, value: f64) -> ClientResult<()> {
        self.expect_ok(&format!("SET {key} {value}"))
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> ClientResult<()> {
        self.expect_ok(&format!("SET {key} {value}"))
    }

    fn expect_ok(&mut self, line: &str) -> ClientResult<()> {
        match self.command(line)? {
            Reply::Simple(s) if s == "OK" => Ok(()),
            Reply::Error(e) => Err(ClientError::ServerError(e)),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    /// Fetches a key as a raw bulk string; `Ok(None)` on a null reply.
    pub fn get(&mut self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        match self.command(&format!("GET {key}"))? {
            Reply::Bulk(v) => Ok(v),
            Reply::Error(e) => Err(ClientError::ServerError(e)),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    pub fn get_int64(&mut self, key: &str) -> ClientResult<i64> {
        let bytes = self.require_bulk(key)?;
        String::from_utf8_lossy(&bytes)
            .parse()
            .map_err(|_| ClientError::UnexpectedReply(Reply::bulk(bytes)))
    }

    pub fn get_double(&mut self, key: &str) -> ClientResult<f64> {
        let bytes = self.require_bulk(key)?;
        String::from_utf8_lossy(&bytes)
            .parse()
            .map_err(|_| ClientError::UnexpectedReply(Reply::bulk(bytes)))
    }

    fn require_bulk(&mut self, key: &str) -> ClientResult<Vec<u8>> {
        match self.get(key)? {
            Some(bytes) => Ok(bytes),
            None => Err(ClientError::ServerError("key not found".to_string())),
        }
    }

    pub fn delete(&mut self, key: &str) -> ClientResult<bool> {
        match self.command(&format!("DEL {key}"))? {
            Reply::Integer(n) => Ok(n == 1),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    pub fn exists(&mut self, key: &str) -> ClientResult<bool> {
        match self.command(&format!("EXISTS {key}"))? {
            Reply::Integer(n) => Ok(n == 1),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    pub fn keys(&mut self) -> ClientResult<Vec<Vec<u8>>> {
        match self.command("KEYS")? {
            Reply::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Reply::Bulk(Some(b)) => Ok(b),
                    other => Err(ClientError::UnexpectedReply(other)),
                })
                .collect(),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    pub fn clear(&mut self) -> ClientResult<()> {
        self.expect_ok("CLEAR")
    }

    pub fn save(&mut self, path: Option<&str>) -> ClientResult<()> {
        match path {
            Some(p) => self.expect_ok(&format!("SAVE {p}")),
            None => self.expect_ok("SAVE"),
        }
    }

    pub fn load(&mut self, path: Option<&str>) -> ClientResult<()> {
        match path {
            Some(p) => self.expect_ok(&format!("LOAD {p}")),
            None => self.expect_ok("LOAD"),
        }
    }

    pub fn info(&mut self) -> ClientResult<String> {
        match self.command("INFO")? {
            Reply::Bulk(Some(bytes)) => Ok(String::from_utf8_lossy(&bytes).to_string()),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    pub fn stats(&mut self) -> ClientResult<String> {
        match self.command("STATS")? {
            Reply::Bulk(Some(bytes)) => Ok(String::from_utf8_lossy(&bytes).to_string()),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    pub fn quit(&mut self) -> ClientResult<()> {
        let _ = self.command("QUIT");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_reply_error_message_mentions_the_reply() {
        let err = ClientError::UnexpectedReply(Reply::Integer(5));
        assert!(format!("{err}").contains("5"));
    }
}
