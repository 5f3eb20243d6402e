//! Line-oriented text protocol: one frame per line, as specified by the wire protocol (§4.2).
//!
//! A [`Frame`] is the parsed form of a single protocol line. Register/deregister status replies
//! and status-probe replies are plain text lines too, represented here as dedicated variants so
//! callers match on a single enum instead of re-parsing ad hoc.

use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::error::CodecError;
use crate::fileinfo::FileInfo;
use crate::message::Message;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// The first line of any inbound connection: the initiator's own address.
    Handshake(Address),
    Register(Message),
    Deregister(Message),
    Query(Message),
    QueryHit(Message, Address),
    Invalidate(Message),
    Obtain(Message),
    Status(FileInfo),
    Deleted,
    UpToDate,
    Outdated,
    /// Register/deregister status code: 0 = success, >0 = failure reason.
    StatusCode(i32),
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Handshake(addr) => write!(f, "{addr}"),
            Frame::Register(m) => write!(f, "register {m}"),
            Frame::Deregister(m) => write!(f, "deregister {m}"),
            Frame::Query(m) => write!(f, "query {m}"),
            Frame::QueryHit(m, holder) => write!(f, "queryhit {m} {holder}"),
            Frame::Invalidate(m) => write!(f, "invalidate {m}"),
            Frame::Obtain(m) => write!(f, "obtain {m}"),
            Frame::Status(info) => write!(f, "status {info}"),
            Frame::Deleted => write!(f, "deleted"),
            Frame::UpToDate => write!(f, "uptodate"),
            Frame::Outdated => write!(f, "outdated"),
            Frame::StatusCode(code) => write!(f, "{code}"),
        }
    }
}

impl FromStr for Frame {
    type Err = CodecError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(CodecError::EmptyFrame);
        }
        if let Some(rest) = line.strip_prefix("register ") {
            return Ok(Frame::Register(rest.parse()?));
        }
        if let Some(rest) = line.strip_prefix("deregister ") {
            return Ok(Frame::Deregister(rest.parse()?));
        }
        if let Some(rest) = line.strip_prefix("queryhit ") {
            let mut parts = rest.splitn(2, ' ');
            let msg = parts
                .next()
                .ok_or_else(|| CodecError::MalformedFrame {
                    expected: 2,
                    actual: 1,
                    frame: line.to_string(),
                })?
                .parse()?;
            let holder = parts
                .next()
                .ok_or_else(|| CodecError::MalformedFrame {
                    expected: 2,
                    actual: 1,
                    frame: line.to_string(),
                })?
                .parse()?;
            return Ok(Frame::QueryHit(msg, holder));
        }
        if let Some(rest) = line.strip_prefix("query ") {
            return Ok(Frame::Query(rest.parse()?));
        }
        if let Some(rest) = line.strip_prefix("invalidate ") {
            return Ok(Frame::Invalidate(rest.parse()?));
        }
        if let Some(rest) = line.strip_prefix("obtain ") {
            return Ok(Frame::Obtain(rest.parse()?));
        }
        if let Some(rest) = line.strip_prefix("status ") {
            return Ok(Frame::Status(rest.parse()?));
        }
        match line {
            "deleted" => return Ok(Frame::Deleted),
            "uptodate" => return Ok(Frame::UpToDate),
            "outdated" => return Ok(Frame::Outdated),
            _ => {}
        }
        if let Ok(code) = line.parse::<i32>() {
            return Ok(Frame::StatusCode(code));
        }
        if let Ok(addr) = line.parse::<Address>() {
            return Ok(Frame::Handshake(addr));
        }
        Err(CodecError::UnknownVerb(line.to_string()))
    }
}
