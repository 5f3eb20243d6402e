//! [`FileInfo`]: the unit of metadata tracked for every file name a node knows about.

use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::error::CodecError;

/// Metadata describing one named file: who originates it, which version, and (pull model
/// only) whether the holder still believes it's current.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub origin: Address,
    pub version: u64,
    pub valid: bool,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, origin: Address, version: u64) -> Self {
        Self {
            name: name.into(),
            origin,
            version,
            valid: true,
        }
    }

    pub fn is_origin(&self, addr: &Address) -> bool {
        &self.origin == addr
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.name, self.origin, self.version, self.valid
        )
    }
}

impl FromStr for FileInfo {
    type Err = CodecError;

    /// Parses `name,origin,version[,valid]`. `valid` defaults to `true` when omitted, since
    /// push-model messages never populate it meaningfully.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(',').collect();
        if fields.len() != 3 && fields.len() != 4 {
            return Err(CodecError::MalformedFrame {
                expected: 3,
                actual: fields.len(),
                frame: s.to_string(),
            });
        }
        let name = fields[0].to_string();
        if name.is_empty() {
            return Err(CodecError::MalformedFrame {
                expected: 3,
                actual: fields.len(),
                frame: s.to_string(),
            });
        }
        let origin: Address = fields[1].parse()?;
        let version: u64 = fields[2]
            .parse()
            .map_err(|_| CodecError::BadInteger(fields[2].to_string()))?;
        let valid = match fields.get(3) {
            Some(v) => v
                .parse()
                .map_err(|_| CodecError::BadInteger(v.to_string()))?,
            None => true,
        };
        Ok(FileInfo {
            name,
            origin,
            version,
            valid,
        })
    }
}
