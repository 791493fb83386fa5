//! Gossip wire format.
//!
//! Every message is a short ASCII string of `=`-separated fields led by a
//! one-letter code, sent as raw bytes with no length prefix:
//!
//! ```text
//! Q=P=N1        introduce: introducer name, assigned name
//! R=3=N3        neighbour: address digit, neighbour name
//! S=N1=23=41    telemetry: name, temperature, humidity
//! T=3=N3        two-hop:   address digit, neighbour name
//! U=3=2=N1      update:    address digit, rounded metres, observer name
//! ```
//!
//! Payloads are bounded by [`MAX_PAYLOAD_LEN`]. Anything longer is cut
//! silently, as is everything after the first space, comma or newline.
//! Addresses travel as a single hex digit; see
//! [`beacon_topology::ADDRESS_PREFIX`].

use std::fmt;

use beacon_topology::{MeshAddress, ShortName};
use thiserror::Error;

/// Wire budget for one application payload, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 12;

/// Field separator.
pub const FIELD_DELIMITER: char = '=';

/// Bytes of the introducer's name carried by an introduction.
pub const INTRODUCER_NAME_LEN: usize = 1;

/// The five message kinds, by wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `Q`: admission, carries the new node's name.
    Introduce,
    /// `R`: one of the sender's neighbours, for the recipient to adopt.
    Neighbour,
    /// `S`: sender's sensor readings.
    Telemetry,
    /// `T`: one of the sender's neighbours, as a two-hop edge.
    TwoHop,
    /// `U`: distance and name refresh for a two-hop edge.
    TwoHopUpdate,
}

impl MessageKind {
    /// Leading code byte.
    pub const fn code(self) -> u8 {
        match self {
            Self::Introduce => b'Q',
            Self::Neighbour => b'R',
            Self::Telemetry => b'S',
            Self::TwoHop => b'T',
            Self::TwoHopUpdate => b'U',
        }
    }

    /// Kind for a code byte.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            b'Q' => Some(Self::Introduce),
            b'R' => Some(Self::Neighbour),
            b'S' => Some(Self::Telemetry),
            b'T' => Some(Self::TwoHop),
            b'U' => Some(Self::TwoHopUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code() as char)
    }
}

/// Errors decoding a payload. All of them mean "ignore this message".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("payload is not ASCII text")]
    NotText,

    #[error("unknown message code {0:?}")]
    UnknownKind(String),

    #[error("{kind} message is missing its {field} field")]
    Incomplete {
        kind: MessageKind,
        field: &'static str,
    },

    #[error("{kind} message has a non-numeric {field} field")]
    InvalidNumber {
        kind: MessageKind,
        field: &'static str,
    },
}

/// A decoded gossip message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Introduce {
        introducer: ShortName,
        assigned: ShortName,
    },
    Neighbour {
        neighbour: MeshAddress,
        name: ShortName,
    },
    Telemetry {
        name: ShortName,
        temperature: i32,
        humidity: i32,
    },
    TwoHop {
        neighbour: MeshAddress,
        name: ShortName,
    },
    TwoHopUpdate {
        neighbour: MeshAddress,
        distance: i8,
        observer: ShortName,
    },
}

impl Message {
    /// The message kind.
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Introduce { .. } => MessageKind::Introduce,
            Self::Neighbour { .. } => MessageKind::Neighbour,
            Self::Telemetry { .. } => MessageKind::Telemetry,
            Self::TwoHop { .. } => MessageKind::TwoHop,
            Self::TwoHopUpdate { .. } => MessageKind::TwoHopUpdate,
        }
    }

    /// Encode to wire bytes, applying the payload budget.
    pub fn encode(&self) -> Vec<u8> {
        let text = self.to_string();
        let end = text
            .find([' ', ',', '\n'])
            .unwrap_or(text.len())
            .min(MAX_PAYLOAD_LEN);
        text.as_bytes()[..end].to_vec()
    }

    /// Decode wire bytes. Only the first [`MAX_PAYLOAD_LEN`] bytes are read.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let payload = &payload[..payload.len().min(MAX_PAYLOAD_LEN)];
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }
        if !payload.is_ascii() {
            return Err(DecodeError::NotText);
        }
        let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotText)?;

        // Consecutive delimiters collapse, as strtok-based firmware parsers do.
        let mut tokens = text.split(FIELD_DELIMITER).filter(|t| !t.is_empty());
        let head = tokens.next().ok_or(DecodeError::Empty)?;
        let kind = match head.as_bytes() {
            [code] => MessageKind::from_code(*code),
            _ => None,
        }
        .ok_or_else(|| DecodeError::UnknownKind(head.to_string()))?;

        let mut field = |name: &'static str| {
            tokens
                .next()
                .ok_or(DecodeError::Incomplete { kind, field: name })
        };

        let message = match kind {
            MessageKind::Introduce => {
                let introducer = field("introducer")?;
                let assigned = field("assigned name")?;
                Self::Introduce {
                    introducer: ShortName::truncated(introducer, INTRODUCER_NAME_LEN),
                    assigned: ShortName::new(assigned),
                }
            }
            MessageKind::Neighbour => Self::Neighbour {
                neighbour: parse_address(field("address")?),
                name: ShortName::new(field("name")?),
            },
            MessageKind::Telemetry => {
                let name = ShortName::new(field("name")?);
                let temperature = parse_number(field("temperature")?, kind, "temperature")?;
                let humidity = parse_number(field("humidity")?, kind, "humidity")?;
                Self::Telemetry {
                    name,
                    temperature,
                    humidity,
                }
            }
            MessageKind::TwoHop => Self::TwoHop {
                neighbour: parse_address(field("address")?),
                name: ShortName::new(field("name")?),
            },
            MessageKind::TwoHopUpdate => {
                let neighbour = parse_address(field("address")?);
                let distance = parse_number(field("distance")?, kind, "distance")?;
                let observer = ShortName::new(field("observer")?);
                Self::TwoHopUpdate {
                    neighbour,
                    distance: distance.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8,
                    observer,
                }
            }
        };
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.kind().code() as char;
        match self {
            Self::Introduce {
                introducer,
                assigned,
            } => {
                let introducer = ShortName::truncated(introducer.as_str(), INTRODUCER_NAME_LEN);
                write!(f, "{code}={introducer}={assigned}")
            }
            Self::Neighbour { neighbour, name } | Self::TwoHop { neighbour, name } => {
                write!(f, "{code}={}={name}", neighbour.suffix_digit())
            }
            Self::Telemetry {
                name,
                temperature,
                humidity,
            } => write!(f, "{code}={name}={temperature}={humidity}"),
            Self::TwoHopUpdate {
                neighbour,
                distance,
                observer,
            } => write!(f, "{code}={}={distance}={observer}", neighbour.suffix_digit()),
        }
    }
}

/// First character of the field, substituted into the address template.
fn parse_address(token: &str) -> MeshAddress {
    token
        .chars()
        .next()
        .map(MeshAddress::from_suffix_digit)
        .unwrap_or(MeshAddress::UNASSIGNED)
}

/// Leading signed decimal integer; trailing garbage is ignored.
fn parse_number(token: &str, kind: MessageKind, field: &'static str) -> Result<i32, DecodeError> {
    let invalid = DecodeError::InvalidNumber { kind, field };
    let bytes = token.as_bytes();
    let sign_len = usize::from(matches!(bytes.first(), Some(b'-' | b'+')));
    let digits = bytes[sign_len..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return Err(invalid);
    }
    token[..sign_len + digits].parse().map_err(|_| invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ShortName {
        ShortName::new(s)
    }

    #[test]
    fn telemetry_round_trip() {
        let msg = Message::Telemetry {
            name: name("Nx"),
            temperature: 23,
            humidity: 41,
        };
        let wire = msg.encode();
        assert_eq!(wire, b"S=Nx=23=41");
        assert_eq!(Message::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn introduce_carries_one_byte_introducer() {
        let msg = Message::Introduce {
            introducer: name("PRV"),
            assigned: name("N1"),
        };
        assert_eq!(msg.encode(), b"Q=P=N1");

        let decoded = Message::decode(b"Q=P=N1").unwrap();
        assert_eq!(
            decoded,
            Message::Introduce {
                introducer: name("P"),
                assigned: name("N1"),
            }
        );
    }

    #[test]
    fn neighbour_reconstructs_address_from_digit() {
        let decoded = Message::decode(b"R=3=N3").unwrap();
        assert_eq!(
            decoded,
            Message::Neighbour {
                neighbour: MeshAddress(0x0003),
                name: name("N3"),
            }
        );

        let msg = Message::Neighbour {
            neighbour: MeshAddress(0x000c),
            name: name("N12"),
        };
        assert_eq!(msg.encode(), b"R=c=N12");
    }

    #[test]
    fn two_hop_non_hex_digit_is_unassigned() {
        let decoded = Message::decode(b"T=z=N3").unwrap();
        assert_eq!(
            decoded,
            Message::TwoHop {
                neighbour: MeshAddress::UNASSIGNED,
                name: name("N3"),
            }
        );
    }

    #[test]
    fn update_encodes_rounded_distance() {
        let msg = Message::TwoHopUpdate {
            neighbour: MeshAddress(0x0003),
            distance: -2,
            observer: name("N1"),
        };
        assert_eq!(msg.encode(), b"U=3=-2=N1");
        assert_eq!(Message::decode(b"U=3=-2=N1").unwrap(), msg);
    }

    #[test]
    fn address_outside_prefix_is_lossy() {
        let msg = Message::TwoHop {
            neighbour: MeshAddress(0x0123),
            name: name("N3"),
        };
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(
            decoded,
            Message::TwoHop {
                neighbour: MeshAddress(0x0003),
                name: name("N3"),
            }
        );
    }

    #[test]
    fn encode_truncates_to_budget() {
        let msg = Message::Telemetry {
            name: name("N12"),
            temperature: -1234,
            humidity: 100,
        };
        let wire = msg.encode();
        assert_eq!(wire.len(), MAX_PAYLOAD_LEN);
        assert_eq!(wire, b"S=N12=-1234=");
    }

    #[test]
    fn encode_stops_at_first_space() {
        let msg = Message::Neighbour {
            neighbour: MeshAddress(1),
            name: name("a b"),
        };
        assert_eq!(msg.encode(), b"R=1=a");
    }

    #[test]
    fn decode_reads_only_budget() {
        // The thirteenth byte is cut before parsing.
        let decoded = Message::decode(b"S=N1=23=41999").unwrap();
        assert_eq!(
            decoded,
            Message::Telemetry {
                name: name("N1"),
                temperature: 23,
                humidity: 4199,
            }
        );
    }

    #[test]
    fn malformed_payloads_are_recoverable() {
        assert_eq!(Message::decode(b""), Err(DecodeError::Empty));
        assert_eq!(Message::decode(b"==="), Err(DecodeError::Empty));
        assert_eq!(
            Message::decode(b"X=1=2"),
            Err(DecodeError::UnknownKind("X".into()))
        );
        assert_eq!(
            Message::decode(b"S=N1=23"),
            Err(DecodeError::Incomplete {
                kind: MessageKind::Telemetry,
                field: "humidity",
            })
        );
        assert_eq!(
            Message::decode(b"Q=P"),
            Err(DecodeError::Incomplete {
                kind: MessageKind::Introduce,
                field: "assigned name",
            })
        );
        assert_eq!(
            Message::decode(b"U=3=far=N1"),
            Err(DecodeError::InvalidNumber {
                kind: MessageKind::TwoHopUpdate,
                field: "distance",
            })
        );
        assert_eq!(Message::decode(&[0xff, b'=']), Err(DecodeError::NotText));
    }

    #[test]
    fn numbers_ignore_trailing_garbage() {
        let decoded = Message::decode(b"S=N1=23C=41%").unwrap();
        assert_eq!(
            decoded,
            Message::Telemetry {
                name: name("N1"),
                temperature: 23,
                humidity: 41,
            }
        );
    }

    #[test]
    fn repeated_delimiters_collapse() {
        assert_eq!(
            Message::decode(b"S==N1=23=41").unwrap(),
            Message::decode(b"S=N1=23=41").unwrap()
        );
    }

    #[test]
    fn kind_codes() {
        for kind in [
            MessageKind::Introduce,
            MessageKind::Neighbour,
            MessageKind::Telemetry,
            MessageKind::TwoHop,
            MessageKind::TwoHopUpdate,
        ] {
            assert_eq!(MessageKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(MessageKind::from_code(b'V'), None);
    }
}
