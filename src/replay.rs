use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::path::Path;
use std::thread;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace};

use crate::capture::CHUNK_SIZE;
use crate::config::{LoopCount, ReplayConfig};
use crate::error::{FileOp, SessionError, TransportOp};

/// Totals for a replay that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    pub iterations: u64,
    pub bytes_sent: u64,
}

/// Connect to `dest`, optionally from a chosen local address.
///
/// Binding to an address not configured on this host needs the OS to allow
/// it (`net.ipv4.ip_nonlocal_bind=1` on Linux).
pub fn connect(dest: SocketAddr, source: Option<IpAddr>) -> Result<TcpStream, SessionError> {
    let Some(source) = source else {
        return TcpStream::connect(dest).map_err(SessionError::transport(TransportOp::Connect, dest));
    };

    let local = SocketAddr::new(source, 0);
    let socket = Socket::new(Domain::for_address(dest), Type::STREAM, Some(Protocol::TCP))
        .map_err(SessionError::transport(TransportOp::Socket, dest))?;
    socket
        .bind(&local.into())
        .map_err(SessionError::transport(TransportOp::Bind, local))?;
    socket
        .connect(&dest.into())
        .map_err(SessionError::transport(TransportOp::Connect, dest))?;
    debug!(%dest, %source, "connected from spoofed source");
    Ok(socket.into())
}

enum ChunkError {
    Read(std::io::Error),
    Send(std::io::Error),
}

/// Send everything `source` yields, in fixed-size chunks.
fn send_once<R: Read, W: Write>(source: &mut R, sink: &mut W) -> Result<u64, ChunkError> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => return Ok(sent),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ChunkError::Read(e)),
        };
        sink.write_all(&buf[..n]).map_err(ChunkError::Send)?;
        sent += n as u64;
    }
}

/// Stream the whole of `source` into `sink` according to `loops`, sleeping
/// `interval` between iterations.
///
/// The source is rewound before every iteration. With [`LoopCount::Infinite`]
/// this only returns on error.
pub fn stream_loops<R: Read + Seek, W: Write>(
    source: &mut R,
    sink: &mut W,
    loops: LoopCount,
    interval: Duration,
    path: &Path,
    dest: SocketAddr,
) -> Result<ReplayReport, SessionError> {
    let mut report = ReplayReport::default();
    let mut iteration: u64 = 1;
    loop {
        source
            .seek(SeekFrom::Start(0))
            .map_err(SessionError::file(FileOp::Rewind, path))?;
        let sent = send_once(source, sink).map_err(|e| match e {
            ChunkError::Read(e) => SessionError::file(FileOp::Read, path)(e),
            ChunkError::Send(e) => SessionError::transport(TransportOp::Send, dest)(e),
        })?;
        sink.flush()
            .map_err(SessionError::transport(TransportOp::Send, dest))?;

        report.iterations = iteration;
        report.bytes_sent += sent;
        info!(iteration, loops = %loops, bytes = sent, "sent capture file");

        if loops.is_last(iteration) {
            return Ok(report);
        }
        if !interval.is_zero() {
            trace!(?interval, "pausing before next iteration");
            thread::sleep(interval);
        }
        iteration = iteration.saturating_add(1);
    }
}

/// Keep `stream` open until the process is terminated.
fn hold_open(stream: TcpStream) -> ! {
    info!(peer = ?stream.peer_addr().ok(), "done, holding connection open until interrupted");
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

/// Replay the configured capture file to the configured destination.
///
/// The file is opened before connecting so a bad path never touches the network.
/// With keep-open set this never returns once the last iteration is sent.
pub fn play(config: &ReplayConfig) -> Result<ReplayReport, SessionError> {
    let path = config.file();
    let mut file = File::open(path).map_err(SessionError::file(FileOp::Open, path))?;

    let dest = config.dest();
    let mut stream = connect(dest, config.source())?;
    info!(%dest, file = %path.display(), loops = %config.loops(), "connected, sending data");

    let report = stream_loops(
        &mut file,
        &mut stream,
        config.loops(),
        config.interval(),
        path,
        dest,
    )?;

    if config.keep_open() {
        hold_open(stream);
    }

    // a failed shutdown just means the peer is already gone
    if let Err(e) = stream.shutdown(Shutdown::Write) {
        debug!(error = %e, "shutdown after replay failed");
    }
    info!(
        iterations = report.iterations,
        bytes = report.bytes_sent,
        "replay done"
    );
    Ok(report)
}
