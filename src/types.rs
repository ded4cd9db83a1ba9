//! Core identifier and value types shared across the document engine.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Stable node identifier, assigned by the CRDT substrate on creation.
///
/// Backed directly by `loro::TreeID`, whose `Display` implementation
/// already produces the wire format `"<counter>@<peer>"` required by
/// the design (§3, §6).
pub type NodeId = loro::TreeID;

/// 64-bit peer identifier supplied at document construction (design §6).
pub type PeerId = u64;

fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+@\d+$").unwrap())
}

fn symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$(\d+)$").unwrap())
}

/// True if `s` matches the concrete identifier format `"<counter>@<peer>"`.
pub fn is_concrete_id(s: &str) -> bool {
    id_re().is_match(s)
}

/// True if `s` matches the symbolic identifier format `"$<k>"`.
pub fn is_symbol(s: &str) -> bool {
    symbol_re().is_match(s)
}

/// Parse a `"$<k>"` symbol into its index, if `s` is one.
pub fn parse_symbol(s: &str) -> Option<u32> {
    symbol_re()
        .captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a concrete `"<counter>@<peer>"` identifier back into a [`NodeId`].
pub fn parse_node_id(s: &str) -> Option<NodeId> {
    if !is_concrete_id(s) {
        return None;
    }
    let (counter, peer) = s.split_once('@')?;
    Some(NodeId {
        peer: peer.parse().ok()?,
        counter: counter.parse().ok()?,
    })
}

/// A symbolic identifier (`$0`, `$1`, ...) appearing in a recorded,
/// generalized patch before it has been bound to a concrete id (design §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub u32);

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl Symbol {
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_concrete_and_symbolic_ids() {
        assert!(is_concrete_id("3@12345"));
        assert!(!is_concrete_id("$3"));
        assert!(is_symbol("$3"));
        assert!(!is_symbol("3@12345"));
        assert_eq!(parse_symbol("$7"), Some(7));
        assert_eq!(parse_symbol("not-a-symbol"), None);
    }

    #[test]
    fn round_trips_node_id_through_display() {
        let id = NodeId { peer: 42, counter: 7 };
        let text = id.to_string();
        assert_eq!(text, "7@42");
        assert_eq!(parse_node_id(&text), Some(id));
    }
}
