use std::fmt;

use thiserror::Error;

/// Size of the BMP common header: version (1), message length (4), message type (1).
pub const COMMON_HEADER_LEN: usize = 6;

/// BMP message type carried in the last byte of the common header.
///
/// Codes outside the seven defined by RFC 7854 decode to [`MessageType::Unknown`]
/// instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    RouteMonitoring,
    StatisticsReport,
    PeerDownNotification,
    PeerUpNotification,
    InitiationMessage,
    TerminationMessage,
    RouteMirroring,
    Unknown(u8),
}

impl MessageType {
    pub const KNOWN: [MessageType; 7] = [
        MessageType::RouteMonitoring,
        MessageType::StatisticsReport,
        MessageType::PeerDownNotification,
        MessageType::PeerUpNotification,
        MessageType::InitiationMessage,
        MessageType::TerminationMessage,
        MessageType::RouteMirroring,
    ];

    pub fn code(self) -> u8 {
        match self {
            MessageType::RouteMonitoring => 0,
            MessageType::StatisticsReport => 1,
            MessageType::PeerDownNotification => 2,
            MessageType::PeerUpNotification => 3,
            MessageType::InitiationMessage => 4,
            MessageType::TerminationMessage => 5,
            MessageType::RouteMirroring => 6,
            MessageType::Unknown(code) => code,
        }
    }

    /// Position in [`MessageType::KNOWN`], `None` for unknown codes.
    pub fn index(self) -> Option<usize> {
        match self {
            MessageType::Unknown(_) => None,
            known => Some(usize::from(known.code())),
        }
    }

    pub fn is_known(self) -> bool {
        self.index().is_some()
    }

    /// Human readable name, as printed in statistics summaries.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::RouteMonitoring => "Route Monitoring",
            MessageType::StatisticsReport => "Statistics Report",
            MessageType::PeerDownNotification => "Peer Down Notification",
            MessageType::PeerUpNotification => "Peer Up Notification",
            MessageType::InitiationMessage => "Initiation Message",
            MessageType::TerminationMessage => "Termination Message",
            MessageType::RouteMirroring => "Route Mirroring Message",
            MessageType::Unknown(_) => "Unrecognized",
        }
    }
}

impl From<u8> for MessageType {
    fn from(code: u8) -> Self {
        match code {
            0 => MessageType::RouteMonitoring,
            1 => MessageType::StatisticsReport,
            2 => MessageType::PeerDownNotification,
            3 => MessageType::PeerUpNotification,
            4 => MessageType::InitiationMessage,
            5 => MessageType::TerminationMessage,
            6 => MessageType::RouteMirroring,
            other => MessageType::Unknown(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::RouteMonitoring => f.write_str("route-monitoring"),
            MessageType::StatisticsReport => f.write_str("statistics-report"),
            MessageType::PeerDownNotification => f.write_str("peer-down"),
            MessageType::PeerUpNotification => f.write_str("peer-up"),
            MessageType::InitiationMessage => f.write_str("initiation"),
            MessageType::TerminationMessage => f.write_str("termination"),
            MessageType::RouteMirroring => f.write_str("route-mirroring"),
            MessageType::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("common header needs 6 bytes, only {available} available")]
pub struct TruncatedHeader {
    pub available: usize,
}

/// BMP common header.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+
/// |    Version    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Message Length                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Msg. Type   |
/// +---------------+
/// ```
///
/// `message_length` counts the whole message, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonHeader {
    pub version: u8,
    pub message_length: u32,
    pub message_type: MessageType,
}

impl CommonHeader {
    /// Decode the header from the first six bytes of `data`.
    ///
    /// Only the header itself is read; the length is not checked against anything.
    pub fn decode(data: &[u8]) -> Result<Self, TruncatedHeader> {
        match data {
            [version, l0, l1, l2, l3, kind, ..] => Ok(CommonHeader {
                version: *version,
                message_length: u32::from_be_bytes([*l0, *l1, *l2, *l3]),
                message_type: MessageType::from(*kind),
            }),
            short => Err(TruncatedHeader {
                available: short.len(),
            }),
        }
    }

    pub fn encode(&self) -> [u8; COMMON_HEADER_LEN] {
        let len = self.message_length.to_be_bytes();
        [
            self.version,
            len[0],
            len[1],
            len[2],
            len[3],
            self.message_type.code(),
        ]
    }
}
