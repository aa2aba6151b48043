use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Socket operation that failed during a capture or replay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOp {
    Socket,
    Bind,
    Listen,
    Accept,
    Connect,
    Read,
    Send,
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportOp::Socket => f.write_str("socket"),
            TransportOp::Bind => f.write_str("bind"),
            TransportOp::Listen => f.write_str("listen"),
            TransportOp::Accept => f.write_str("accept"),
            TransportOp::Connect => f.write_str("connect"),
            TransportOp::Read => f.write_str("read"),
            TransportOp::Send => f.write_str("send"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Open,
    Create,
    Read,
    Write,
    Rewind,
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOp::Open => f.write_str("open"),
            FileOp::Create => f.write_str("create"),
            FileOp::Read => f.write_str("read"),
            FileOp::Write => f.write_str("write"),
            FileOp::Rewind => f.write_str("rewind"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{op} failed for {addr}: {source}")]
    Transport {
        op: TransportOp,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("{op} failed for '{}': {source}", path.display())]
    File {
        op: FileOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    pub fn transport(op: TransportOp, addr: SocketAddr) -> impl FnOnce(io::Error) -> Self {
        move |source| SessionError::Transport { op, addr, source }
    }

    pub fn file(op: FileOp, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| SessionError::File { op, path, source }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport { .. })
    }
}
