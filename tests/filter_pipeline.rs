use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use bmp_session_tools::{
    filter_stream, FilterError, MessageType, MessageWalker, ParseError, Statistics, TypeFilter,
};

fn message(kind: u8, payload: &[u8]) -> Vec<u8> {
    let len = (6 + payload.len()) as u32;
    let mut out = vec![3];
    out.extend_from_slice(&len.to_be_bytes());
    out.push(kind);
    out.extend_from_slice(payload);
    out
}

/// A session-shaped stream: initiation, peer ups, updates, stats, a peer down, termination.
fn session_stream() -> Vec<u8> {
    let mut data = message(4, b"\x00\x01\x00\x05vMX01");
    for peer in 0..3u8 {
        data.extend(message(3, &[peer; 48]));
    }
    for i in 0..20u8 {
        data.extend(message(0, &vec![i; 30 + usize::from(i)]));
        if i % 5 == 4 {
            data.extend(message(1, &[0, 0, 0, 1, i]));
        }
    }
    data.extend(message(2, &[1]));
    data.extend(message(6, &[0xab; 12]));
    data.extend(message(5, &[0, 1]));
    data
}

fn run_filter(input: &Path, output: &Path, filter: &TypeFilter) -> Result<Statistics, FilterError> {
    let reader = File::open(input).unwrap();
    let writer = BufWriter::new(File::create(output).unwrap());
    filter_stream(reader, writer, filter)
}

#[test]
fn peer_down_only_example() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bmp");
    let output = dir.path().join("out.bmp");

    let mut data = message(0, &[1, 2, 3, 4, 5, 6]);
    data.extend(message(2, &[7, 8]));
    fs::write(&input, &data).unwrap();

    let filter: TypeFilter = [MessageType::PeerDownNotification].into_iter().collect();
    let stats = run_filter(&input, &output, &filter).unwrap();

    let out = fs::read(&output).unwrap();
    assert_eq!(out.len(), 8);
    assert_eq!(out, &data[12..]);
    assert_eq!(stats.kept(MessageType::PeerDownNotification), 1);
    assert_eq!(stats.discarded(MessageType::RouteMonitoring), 1);
    assert_eq!(stats.total_kept(), 1);
    assert_eq!(stats.total_discarded(), 1);
}

#[test]
fn no_flags_produces_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bmp");
    let output = dir.path().join("out.bmp");
    let data = session_stream();
    fs::write(&input, &data).unwrap();

    let stats = run_filter(&input, &output, &TypeFilter::deny_all()).unwrap();

    assert!(fs::read(&output).unwrap().is_empty());
    assert_eq!(stats.total_kept(), 0);
    let total = MessageWalker::new(&data).count() as u64;
    assert_eq!(stats.total_discarded(), total);
    eprintln!("session stream: {total} messages, all discarded");
}

#[test]
fn kept_messages_are_verbatim_and_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bmp");
    let output = dir.path().join("out.bmp");
    let data = session_stream();
    fs::write(&input, &data).unwrap();

    let filter: TypeFilter = [MessageType::RouteMonitoring, MessageType::StatisticsReport]
        .into_iter()
        .collect();
    let stats = run_filter(&input, &output, &filter).unwrap();

    let expected: Vec<u8> = MessageWalker::new(&data)
        .map(Result::unwrap)
        .filter(|span| filter.allows(span.header.message_type))
        .flat_map(|span| span.bytes.to_vec())
        .collect();
    let out = fs::read(&output).unwrap();
    assert_eq!(out, expected);

    assert_eq!(stats.kept(MessageType::RouteMonitoring), 20);
    assert_eq!(stats.kept(MessageType::StatisticsReport), 4);
    assert_eq!(stats.discarded(MessageType::PeerUpNotification), 3);
    assert_eq!(stats.discarded(MessageType::InitiationMessage), 1);
    assert_eq!(stats.discarded(MessageType::TerminationMessage), 1);
    assert_eq!(stats.discarded(MessageType::RouteMirroring), 1);
    assert_eq!(stats.discarded(MessageType::PeerDownNotification), 1);

    // the filtered output is itself a well-formed stream
    let reframed: Vec<_> = MessageWalker::new(&out)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(reframed.len(), 24);
}

#[test]
fn rerun_gives_identical_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bmp");
    fs::write(&input, session_stream()).unwrap();
    let filter: TypeFilter = [MessageType::PeerUpNotification, MessageType::TerminationMessage]
        .into_iter()
        .collect();

    let first = dir.path().join("first.bmp");
    let second = dir.path().join("second.bmp");
    let a = run_filter(&input, &first, &filter).unwrap();
    let b = run_filter(&input, &second, &filter).unwrap();

    assert_eq!(a, b);
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn unknown_types_land_in_unrecognized_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bmp");
    let output = dir.path().join("out.bmp");
    let mut data = message(0, &[1]);
    data.extend(message(77, &[2, 3]));
    data.extend(message(255, &[]));
    fs::write(&input, &data).unwrap();

    let stats = run_filter(&input, &output, &TypeFilter::allow_all()).unwrap();

    assert_eq!(fs::read(&output).unwrap(), message(0, &[1]));
    assert_eq!(stats.unrecognized(), 2);
    assert_eq!(stats.total_discarded(), 2);
}

#[test]
fn truncated_capture_reports_offset() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bmp");
    let output = dir.path().join("out.bmp");
    let mut data = session_stream();
    let full = data.len();
    data.truncate(full - 1);
    fs::write(&input, &data).unwrap();

    let err = run_filter(&input, &output, &TypeFilter::allow_all()).unwrap_err();
    let FilterError::Parse(parse) = &err else {
        panic!("expected framing error, got {err:?}");
    };
    // the termination message is the last 8 bytes
    assert_eq!(parse.offset(), Some((full - 8) as u64));
    assert!(matches!(parse, ParseError::MalformedMessage { .. }));
    assert!(err.to_string().contains(&format!("offset {}", full - 8)));

    // everything before the broken message was written
    assert_eq!(fs::read(&output).unwrap(), &data[..full - 8]);
}

#[test]
fn corrupted_length_stops_without_reading_past_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bmp");
    let output = dir.path().join("out.bmp");
    let mut data = message(0, &[9; 10]);
    data.extend_from_slice(&[3, 0, 0, 0, 0, 0]);
    data.extend(message(0, &[9; 10]));
    fs::write(&input, &data).unwrap();

    let err = run_filter(&input, &output, &TypeFilter::allow_all()).unwrap_err();
    assert!(matches!(
        err,
        FilterError::Parse(ParseError::MalformedMessage { index: 1, offset: 16, .. })
    ));
    assert_eq!(fs::read(&output).unwrap(), message(0, &[9; 10]));
}
