//! Bearer frames.
//!
//! Every datagram on the bearer is one frame:
//!
//! ```text
//! +-------+---------+------+------------------------------+
//! | "BM"  | version | kind | body                         |
//! | 2     | 1       | 1    | depends on kind              |
//! +-------+---------+------+------------------------------+
//!
//! Data      source u16 | destination u16 | len u8 | payload (len <= 12)
//! Beacon    uuid [16]
//! Invite    uuid [16]  | address u16
//! Complete  uuid [16]  | address u16
//! ```
//!
//! Integers are big-endian. `Beacon`, `Invite` and `Complete` stand in for
//! the mesh stack's provisioning bearer; `Data` carries gossip payloads.

use beacon_protocols::MAX_PAYLOAD_LEN;
use beacon_topology::{DeviceUuid, MeshAddress};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Frame magic.
pub const MAGIC: [u8; 2] = *b"BM";

/// Current frame version.
pub const VERSION: u8 = 1;

const HEADER_LEN: usize = 4;

/// Largest possible frame.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + 5 + MAX_PAYLOAD_LEN;

/// Frame type classification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Unicast gossip payload
    Data,
    /// Unprovisioned node announcing its UUID
    Beacon,
    /// Provisioner assigning an address to a UUID
    Invite,
    /// Node confirming the assigned address
    Complete,
}

impl FrameKind {
    const fn to_byte(self) -> u8 {
        match self {
            Self::Data => 0,
            Self::Beacon => 1,
            Self::Invite => 2,
            Self::Complete => 3,
        }
    }

    const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Data),
            1 => Some(Self::Beacon),
            2 => Some(Self::Invite),
            3 => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Frame decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame shorter than its header")]
    TooShort,

    #[error("bad frame magic")]
    BadMagic,

    #[error("unsupported frame version {0}")]
    Version(u8),

    #[error("unknown frame kind {0}")]
    UnknownKind(u8),

    #[error("{kind:?} frame truncated")]
    Truncated { kind: FrameKind },

    #[error("payload of {0} bytes exceeds the wire budget")]
    PayloadTooLong(usize),
}

/// One bearer frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Data {
        source: MeshAddress,
        destination: MeshAddress,
        payload: Bytes,
    },
    Beacon {
        uuid: DeviceUuid,
    },
    Invite {
        uuid: DeviceUuid,
        address: MeshAddress,
    },
    Complete {
        uuid: DeviceUuid,
        address: MeshAddress,
    },
}

impl Frame {
    /// Build a data frame, rejecting payloads over budget.
    pub fn data(source: MeshAddress, destination: MeshAddress, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        Ok(Self::Data {
            source,
            destination,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Data { .. } => FrameKind::Data,
            Self::Beacon { .. } => FrameKind::Beacon,
            Self::Invite { .. } => FrameKind::Invite,
            Self::Complete { .. } => FrameKind::Complete,
        }
    }

    /// Serialize to a datagram.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAX_FRAME_LEN.max(HEADER_LEN + 18));
        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.kind().to_byte());
        match self {
            Self::Data {
                source,
                destination,
                payload,
            } => {
                buf.put_u16(source.value());
                buf.put_u16(destination.value());
                // Frame::data enforces the budget; a hand-built frame is cut.
                let len = payload.len().min(MAX_PAYLOAD_LEN);
                buf.put_u8(len as u8);
                buf.put_slice(&payload[..len]);
            }
            Self::Beacon { uuid } => buf.put_slice(uuid.as_bytes()),
            Self::Invite { uuid, address } | Self::Complete { uuid, address } => {
                buf.put_slice(uuid.as_bytes());
                buf.put_u16(address.value());
            }
        }
        buf.freeze()
    }

    /// Parse a datagram.
    pub fn decode(datagram: &[u8]) -> Result<Self, FrameError> {
        if datagram.len() < HEADER_LEN {
            return Err(FrameError::TooShort);
        }
        let mut buf = datagram;
        if buf[..2] != MAGIC {
            return Err(FrameError::BadMagic);
        }
        buf.advance(2);
        let version = buf.get_u8();
        if version != VERSION {
            return Err(FrameError::Version(version));
        }
        let byte = buf.get_u8();
        let kind = FrameKind::from_byte(byte).ok_or(FrameError::UnknownKind(byte))?;
        let truncated = FrameError::Truncated { kind };

        match kind {
            FrameKind::Data => {
                if buf.remaining() < 5 {
                    return Err(truncated);
                }
                let source = MeshAddress(buf.get_u16());
                let destination = MeshAddress(buf.get_u16());
                let len = usize::from(buf.get_u8());
                if len > MAX_PAYLOAD_LEN {
                    return Err(FrameError::PayloadTooLong(len));
                }
                if buf.remaining() < len {
                    return Err(truncated);
                }
                Ok(Self::Data {
                    source,
                    destination,
                    payload: Bytes::copy_from_slice(&buf[..len]),
                })
            }
            FrameKind::Beacon => Ok(Self::Beacon {
                uuid: read_uuid(&mut buf).ok_or(truncated)?,
            }),
            FrameKind::Invite | FrameKind::Complete => {
                let uuid = read_uuid(&mut buf).ok_or_else(|| truncated.clone())?;
                if buf.remaining() < 2 {
                    return Err(truncated);
                }
                let address = MeshAddress(buf.get_u16());
                Ok(if kind == FrameKind::Invite {
                    Self::Invite { uuid, address }
                } else {
                    Self::Complete { uuid, address }
                })
            }
        }
    }
}

fn read_uuid(buf: &mut &[u8]) -> Option<DeviceUuid> {
    if buf.remaining() < 16 {
        return None;
    }
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Some(DeviceUuid::from_bytes(bytes))
}
