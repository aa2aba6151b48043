use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::process;

use clap::Parser;

use bmp_session_tools::{filter_stream, MessageType, Statistics, TypeFilter};

#[derive(Parser)]
#[command(
    name = "bmp-filter",
    about = "Filter BMP messages from a recorded session by message type"
)]
struct Cli {
    /// Recorded BMP stream to read (- for stdin)
    #[arg(short, long, value_name = "FILE")]
    input: String,

    /// File to write kept messages to
    #[arg(short, long, value_name = "FILE")]
    output: String,

    /// Include Route Monitoring messages
    #[arg(long)]
    route_monitoring: bool,

    /// Include Statistics Report messages
    #[arg(long)]
    statistics_report: bool,

    /// Include Peer Down Notification messages
    #[arg(long)]
    peer_down: bool,

    /// Include Peer Up Notification messages
    #[arg(long)]
    peer_up: bool,

    /// Include Initiation messages
    #[arg(long)]
    initiation: bool,

    /// Include Termination messages
    #[arg(long)]
    termination: bool,

    /// Include Route Mirroring messages
    #[arg(short = 'm', long)]
    route_mirroring: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn type_filter(&self) -> TypeFilter {
        [
            (self.route_monitoring, MessageType::RouteMonitoring),
            (self.statistics_report, MessageType::StatisticsReport),
            (self.peer_down, MessageType::PeerDownNotification),
            (self.peer_up, MessageType::PeerUpNotification),
            (self.initiation, MessageType::InitiationMessage),
            (self.termination, MessageType::TerminationMessage),
            (self.route_mirroring, MessageType::RouteMirroring),
        ]
        .into_iter()
        .filter_map(|(enabled, kind)| enabled.then_some(kind))
        .collect()
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
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

fn open_input(path: &str) -> Box<dyn Read> {
    if path == "-" {
        return Box::new(io::stdin().lock());
    }
    match File::open(path) {
        Ok(f) => Box::new(f),
        Err(e) => {
            eprintln!("{path}: {e}");
            process::exit(1);
        }
    }
}

fn print_stats(stats: &Statistics) {
    println!("### PACKETS KEPT ###");
    for kind in MessageType::KNOWN {
        println!("{:<32}{}", format!("{}:", kind.name()), stats.kept(kind));
    }
    println!("### PACKETS DISCARDED ###");
    for kind in MessageType::KNOWN {
        println!("{:<32}{}", format!("{}:", kind.name()), stats.discarded(kind));
    }
    if stats.unrecognized() > 0 {
        println!("{:<32}{}", "Unrecognized type:", stats.unrecognized());
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let filter = cli.type_filter();
    if filter.is_empty() {
        tracing::warn!("no message type enabled, every message will be discarded");
    }

    let reader = open_input(&cli.input);
    let output = match File::create(&cli.output) {
        Ok(f) => BufWriter::new(f),
        Err(e) => {
            eprintln!("{}: {e}", cli.output);
            process::exit(1);
        }
    };

    match filter_stream(reader, output, &filter) {
        Ok(stats) => print_stats(&stats),
        Err(e) => {
            eprintln!("{}: {e}", cli.input);
            process::exit(1);
        }
    }
}
