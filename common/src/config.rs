//! Topology configuration: the consistency model and the static super-peer/leaf graph.

use std::collections::HashMap;
use std::path::Path;

use crate::address::Address;
use crate::error::ConfigError;

/// The cache-coherence model a node runs under, selected by the topology file's `c` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyModel {
    /// Origin-initiated invalidations.
    Push,
    /// Replica-initiated polling with a time-to-refresh, in minutes.
    Pull { ttr_minutes: u64 },
}

impl Default for ConsistencyModel {
    fn default() -> Self {
        ConsistencyModel::Push
    }
}

/// The static topology declared by the config file, filtered down to whatever is relevant to
/// a single node's own address at load time.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub model: ConsistencyModel,
    /// super-peer address -> its neighbor super-peers
    pub neighbors: HashMap<Address, Vec<Address>>,
    /// super-peer address -> its leaves
    pub leaves: HashMap<Address, Vec<Address>>,
}

impl Topology {
    /// Neighbors of `sp`, if `sp` is a super-peer known to this topology.
    pub fn neighbors_of(&self, sp: &Address) -> &[Address] {
        self.neighbors.get(sp).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Leaves of `sp`, if `sp` is a super-peer known to this topology.
    pub fn leaves_of(&self, sp: &Address) -> &[Address] {
        self.leaves.get(sp).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The super-peer that a given leaf connects to, if declared.
    pub fn super_peer_of(&self, leaf: &Address) -> Option<Address> {
        self.leaves
            .iter()
            .find(|(_, leaves)| leaves.contains(leaf))
            .map(|(sp, _)| sp.clone())
    }

    /// Whether `addr` appears anywhere in the topology (as a super-peer, neighbor, or leaf).
    pub fn mentions(&self, addr: &Address) -> bool {
        self.neighbors.contains_key(addr)
            || self.leaves.contains_key(addr)
            || self.neighbors.values().flatten().any(|a| a == addr)
            || self.leaves.values().flatten().any(|a| a == addr)
    }

    /// Parses the topology file, failing fast on any malformed line.
    ///
    /// Records not mentioning `self_addr` are still parsed (so cross-references like
    /// `super_peer_of` work) but callers should reject a topology that never mentions the
    /// node's own address via [`Topology::mentions`].
    pub fn load(path: &Path, self_addr: &Address) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let topology = Self::parse(&text)?;
        if !topology.mentions(self_addr) {
            return Err(ConfigError::NodeNotInTopology(self_addr.to_string()));
        }
        Ok(topology)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut topology = Topology::default();
        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                ["c", "push"] => topology.model = ConsistencyModel::Push,
                ["c", "pull", ttr] => {
                    let ttr_minutes: u64 = ttr.parse().map_err(|_| ConfigError::BadTtr {
                        line_no,
                        value: ttr.to_string(),
                    })?;
                    topology.model = ConsistencyModel::Pull { ttr_minutes };
                }
                ["s", sp, neighbor] => {
                    let sp = parse_addr(sp, line_no)?;
                    let neighbor = parse_addr(neighbor, line_no)?;
                    topology.neighbors.entry(sp).or_default().push(neighbor);
                }
                ["p", sp, leaf] => {
                    let sp = parse_addr(sp, line_no)?;
                    let leaf = parse_addr(leaf, line_no)?;
                    topology.leaves.entry(sp).or_default().push(leaf);
                }
                ["c" | "s" | "p", ..] => {
                    return Err(ConfigError::MalformedLine {
                        line_no,
                        line: line.to_string(),
                    })
                }
                [unknown, ..] => {
                    tracing::warn!(line_no, prefix = unknown, "ignoring unknown topology record");
                }
                [] => unreachable!("empty lines are skipped above"),
            }
        }
        Ok(topology)
    }
}

fn parse_addr(s: &str, line_no: usize) -> Result<Address, ConfigError> {
    s.parse().map_err(|source| ConfigError::Address { line_no, source })
}
