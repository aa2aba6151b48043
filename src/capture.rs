use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::{FileOp, SessionError, TransportOp};

pub(crate) const CHUNK_SIZE: usize = 1024;

/// Outcome of one recorded session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub peer: SocketAddr,
    pub bytes: u64,
    pub file: PathBuf,
}

/// Listening socket that records exactly one BMP session.
pub struct CaptureListener {
    listener: TcpListener,
    local: SocketAddr,
    router: Option<IpAddr>,
}

impl CaptureListener {
    /// Bind `0.0.0.0:port` with address reuse and a backlog of one.
    pub fn bind(port: u16, router: Option<IpAddr>) -> Result<Self, SessionError> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(SessionError::transport(TransportOp::Socket, addr))?;
        socket
            .set_reuse_address(true)
            .map_err(SessionError::transport(TransportOp::Socket, addr))?;
        socket
            .bind(&addr.into())
            .map_err(SessionError::transport(TransportOp::Bind, addr))?;
        socket
            .listen(1)
            .map_err(SessionError::transport(TransportOp::Listen, addr))?;

        let listener: TcpListener = socket.into();
        let local = listener
            .local_addr()
            .map_err(SessionError::transport(TransportOp::Listen, addr))?;
        info!(%local, router = ?router, "listening for BMP session");
        Ok(CaptureListener {
            listener,
            local,
            router,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Accept connections until one comes from the configured router.
    ///
    /// Connections from any other address are closed straight away.
    pub fn accept_router(&self) -> Result<(TcpStream, SocketAddr), SessionError> {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(conn) => conn,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SessionError::transport(TransportOp::Accept, self.local)(e)),
            };
            info!(%peer, "connected");

            match self.router {
                Some(router) if peer.ip() != router => {
                    warn!(%peer, %router, "peer is not the configured router, closing");
                    drop(stream);
                }
                _ => return Ok((stream, peer)),
            }
        }
    }

    /// Record one session into `path`, then stop listening.
    pub fn record_to(self, path: &Path) -> Result<CaptureReport, SessionError> {
        let (mut stream, peer) = self.accept_router()?;
        let mut file =
            File::create(path).map_err(SessionError::file(FileOp::Create, path))?;

        debug!(%peer, file = %path.display(), "draining session");
        let bytes = drain(&mut stream, peer, &mut file, path)?;
        file.flush().map_err(SessionError::file(FileOp::Write, path))?;

        info!(%peer, bytes, file = %path.display(), "session closed by peer");
        Ok(CaptureReport {
            peer,
            bytes,
            file: path.to_path_buf(),
        })
    }
}

/// Copy everything read from `stream` into `file` until the peer closes.
fn drain<R: Read, W: Write>(
    stream: &mut R,
    peer: SocketAddr,
    file: &mut W,
    path: &Path,
) -> Result<u64, SessionError> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(SessionError::transport(TransportOp::Read, peer)(e)),
        };
        file.write_all(&buf[..n])
            .map_err(SessionError::file(FileOp::Write, path))?;
        total += n as u64;
    }
}

/// Listen on the configured port and record a single session to the configured file.
pub fn record(config: &CaptureConfig) -> Result<CaptureReport, SessionError> {
    CaptureListener::bind(config.port, config.router)?.record_to(&config.file)
}
