//! [`Message`]: the envelope flooded across the super-peer backbone.

use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::error::CodecError;
use crate::fileinfo::FileInfo;

/// A flooded protocol message: carries a dedup identity, a hop budget, the file this message
/// concerns, and the address of whoever last forwarded it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub message_id: String,
    pub ttl: u32,
    pub file_info: FileInfo,
    pub sender: Address,
}

impl Message {
    pub fn new(message_id: impl Into<String>, ttl: u32, file_info: FileInfo, sender: Address) -> Self {
        Self {
            message_id: message_id.into(),
            ttl,
            file_info,
            sender,
        }
    }

    /// Builds the node-unique id `<origin>-<sequence>` used for dedup and reverse-path routing.
    pub fn make_id(origin: &Address, sequence: u64) -> String {
        format!("{origin}-{sequence}")
    }

    /// Returns a copy with `ttl` decremented by one and `sender` rewritten, as every forwarding
    /// super-peer must do before passing the message to its neighbors.
    pub fn forwarded(&self, new_sender: Address) -> Message {
        Message {
            message_id: self.message_id.clone(),
            ttl: self.ttl.saturating_sub(1),
            file_info: self.file_info.clone(),
            sender: new_sender,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.message_id, self.ttl, self.file_info, self.sender
        )
    }
}

impl FromStr for Message {
    type Err = CodecError;

    /// Parses `id;ttl;fileinfo;sender`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.splitn(4, ';').collect();
        if fields.len() != 4 {
            return Err(CodecError::MalformedFrame {
                expected: 4,
                actual: fields.len(),
                frame: s.to_string(),
            });
        }
        let message_id = fields[0].to_string();
        if message_id.is_empty() {
            return Err(CodecError::MalformedFrame {
                expected: 4,
                actual: fields.len(),
                frame: s.to_string(),
            });
        }
        let ttl: u32 = fields[1]
            .parse()
            .map_err(|_| CodecError::BadInteger(fields[1].to_string()))?;
        let file_info: FileInfo = fields[2].parse()?;
        let sender: Address = fields[3].parse()?;
        Ok(Message {
            message_id,
            ttl,
            file_info,
            sender,
        })
    }
}
