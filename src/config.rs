use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("loop count must be zero (infinite) or positive, got {0}")]
    NegativeLoopCount(i64),
    #[error("interval must be a finite, non-negative number of seconds, got {0}")]
    InvalidInterval(f64),
    #[error("keep-open cannot be combined with an infinite loop (loop=0)")]
    KeepOpenWithInfiniteLoop,
    #[error("play mode requires a destination address")]
    MissingDestination,
    #[error("play mode requires a non-zero destination port")]
    InvalidPort,
    #[error("record mode listens on IPv4 only, router {0} could never connect")]
    RouterFamilyMismatch(IpAddr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    Record,
    Play,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Record => f.write_str("record"),
            Mode::Play => f.write_str("play"),
        }
    }
}

/// How many times a replay sends the capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Finite(NonZeroU64),
    Infinite,
}

impl LoopCount {
    pub const ONCE: LoopCount = LoopCount::Finite(NonZeroU64::MIN);

    /// `0` means loop forever.
    pub fn from_count(count: u64) -> Self {
        NonZeroU64::new(count).map_or(LoopCount::Infinite, LoopCount::Finite)
    }

    /// Whether `iteration` (1-based) is the final one.
    pub fn is_last(&self, iteration: u64) -> bool {
        match self {
            LoopCount::Finite(n) => iteration >= n.get(),
            LoopCount::Infinite => false,
        }
    }
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::ONCE
    }
}

impl fmt::Display for LoopCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopCount::Finite(n) => write!(f, "{n}"),
            LoopCount::Infinite => f.write_str("infinite"),
        }
    }
}

pub fn parse_interval(seconds: f64) -> Result<Duration, ConfigError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ConfigError::InvalidInterval(seconds));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::InvalidInterval(seconds))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub port: u16,
    pub file: PathBuf,
    /// Only accept a session from this address.
    pub router: Option<IpAddr>,
}

/// Validated replay settings.
///
/// Built with [`ReplayConfig::new`] and the `with_*` methods, which reject
/// combinations that make no sense before any socket is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    file: PathBuf,
    dest: SocketAddr,
    source: Option<IpAddr>,
    loops: LoopCount,
    interval: Duration,
    keep_open: bool,
}

impl ReplayConfig {
    /// Send `file` to `dest` once, then close.
    pub fn new(file: impl Into<PathBuf>, dest: SocketAddr) -> Self {
        ReplayConfig {
            file: file.into(),
            dest,
            source: None,
            loops: LoopCount::ONCE,
            interval: Duration::ZERO,
            keep_open: false,
        }
    }

    /// Bind the local end to `source` before connecting.
    pub fn with_source(mut self, source: IpAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_loops(mut self, loops: LoopCount) -> Result<Self, ConfigError> {
        if self.keep_open && loops == LoopCount::Infinite {
            return Err(ConfigError::KeepOpenWithInfiniteLoop);
        }
        self.loops = loops;
        Ok(self)
    }

    pub fn with_keep_open(mut self, keep_open: bool) -> Result<Self, ConfigError> {
        if keep_open && self.loops == LoopCount::Infinite {
            return Err(ConfigError::KeepOpenWithInfiniteLoop);
        }
        self.keep_open = keep_open;
        Ok(self)
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn dest(&self) -> SocketAddr {
        self.dest
    }

    pub fn source(&self) -> Option<IpAddr> {
        self.source
    }

    pub fn loops(&self) -> LoopCount {
        self.loops
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn keep_open(&self) -> bool {
        self.keep_open
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionConfig {
    Record(CaptureConfig),
    Play(ReplayConfig),
}

/// Raw capture/replay options as given on the command line.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub mode: Mode,
    pub port: u16,
    pub file: PathBuf,
    pub router: Option<IpAddr>,
    pub dest_addr: Option<IpAddr>,
    pub loop_count: i64,
    pub interval: f64,
    pub keep_open: bool,
}

impl SessionOptions {
    pub fn new(mode: Mode, port: u16, file: impl Into<PathBuf>) -> Self {
        SessionOptions {
            mode,
            port,
            file: file.into(),
            router: None,
            dest_addr: None,
            loop_count: 1,
            interval: 0.0,
            keep_open: false,
        }
    }

    pub fn validate(self) -> Result<SessionConfig, ConfigError> {
        match self.mode {
            Mode::Record => {
                if self.dest_addr.is_some()
                    || self.loop_count != 1
                    || self.interval != 0.0
                    || self.keep_open
                {
                    warn!("destination, loop, interval and keep-open only apply to play mode, ignoring");
                }
                if let Some(router @ IpAddr::V6(_)) = self.router {
                    return Err(ConfigError::RouterFamilyMismatch(router));
                }
                Ok(SessionConfig::Record(CaptureConfig {
                    port: self.port,
                    file: self.file,
                    router: self.router,
                }))
            }
            Mode::Play => {
                let count = u64::try_from(self.loop_count)
                    .map_err(|_| ConfigError::NegativeLoopCount(self.loop_count))?;
                let interval = parse_interval(self.interval)?;
                let dest = self.dest_addr.ok_or(ConfigError::MissingDestination)?;
                if self.port == 0 {
                    return Err(ConfigError::InvalidPort);
                }

                let mut config = ReplayConfig::new(self.file, SocketAddr::new(dest, self.port))
                    .with_interval(interval)
                    .with_loops(LoopCount::from_count(count))?
                    .with_keep_open(self.keep_open)?;
                if let Some(router) = self.router {
                    config = config.with_source(router);
                }
                Ok(SessionConfig::Play(config))
            }
        }
    }
}
