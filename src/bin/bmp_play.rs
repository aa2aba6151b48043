use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::info;

use bmp_session_tools::{play, record, Mode, SessionConfig, SessionOptions};

#[derive(Parser)]
#[command(
    name = "bmp-play",
    about = "Record a BMP session to a file, or play a recorded file back to a collector"
)]
struct Cli {
    /// Either 'record' or 'play'
    #[arg(short, long, value_enum)]
    mode: Mode,

    /// TCP port to listen on (record) or send to (play)
    #[arg(short, long)]
    port: u16,

    /// File to write to (record) or read from (play)
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Router address to accept (record) or spoof as source (play)
    #[arg(short, long, value_name = "ADDR")]
    router: Option<IpAddr>,

    /// Collector address to send to (play)
    #[arg(short = 'd', long = "destip", visible_alias = "dest-addr", value_name = "ADDR")]
    dest_addr: Option<IpAddr>,

    /// Number of times to send the file, 0 loops forever (play)
    #[arg(short, long = "loop", default_value_t = 1, allow_negative_numbers = true)]
    loop_count: i64,

    /// Seconds to wait between loops (play)
    #[arg(short, long, default_value_t = 0.0, allow_negative_numbers = true)]
    interval: f64,

    /// Hold the connection open after the last byte is sent (play)
    #[arg(short, long)]
    keep_open: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl From<Cli> for SessionOptions {
    fn from(cli: Cli) -> Self {
        SessionOptions {
            mode: cli.mode,
            port: cli.port,
            file: cli.file,
            router: cli.router,
            dest_addr: cli.dest_addr,
            loop_count: cli.loop_count,
            interval: cli.interval,
            keep_open: cli.keep_open,
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match SessionOptions::from(cli).validate() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid arguments: {e}");
            process::exit(2);
        }
    };

    let result = match &config {
        SessionConfig::Record(capture) => {
            info!(port = capture.port, file = %capture.file.display(), "listening for connection");
            record(capture).map(|report| {
                info!(peer = %report.peer, bytes = report.bytes, "recording done");
            })
        }
        SessionConfig::Play(replay) => {
            info!(
                file = %replay.file().display(),
                dest = %replay.dest(),
                "sending recorded session"
            );
            play(replay).map(|report| {
                info!(
                    iterations = report.iterations,
                    bytes = report.bytes_sent,
                    "playback done"
                );
            })
        }
    };

    if let Err(e) = result {
        let action = match config {
            SessionConfig::Record(_) => "record",
            SessionConfig::Play(_) => "play",
        };
        eprintln!("failed to {action}: {e}");
        process::exit(1);
    }
}
