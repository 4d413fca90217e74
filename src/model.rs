use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use dnsrelay_parser::QueryType;
use dnsrelay_resolver::BlockMode;

/// How a matched question should be answered. Exactly one of the tagged
/// variants per rule, mirroring the JSON `upstream` object's mutually
/// exclusive fields.
#[derive(Clone, Debug)]
pub enum Upstream {
    Block(BlockMode),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Udp(SocketAddr),
    Doh {
        url: String,
        proxy: Option<String>,
    },
}

impl Upstream {
    /// The registry key this upstream resolves to, used only for logging
    /// (the registry itself derives its own keys from the constructor
    /// arguments it's called with).
    pub fn describe(&self) -> String {
        match self {
            Upstream::Block(mode) => format!("block:{mode:?}"),
            Upstream::Ipv4(addr) => format!("ipv4:{addr}"),
            Upstream::Ipv6(addr) => format!("ipv6:{addr}"),
            Upstream::Udp(addr) => format!("udp:{addr}"),
            Upstream::Doh { url, proxy } => {
                format!("doh:{url}|{}", proxy.as_deref().unwrap_or(""))
            }
        }
    }
}

/// A rule's match criteria: an optional record-type filter plus exact and
/// suffix domain lists. At least one of `exact`/`suffix` is non-empty,
/// enforced by `Pattern::validate` at config load time.
#[derive(Clone, Debug, Default)]
pub struct Pattern {
    pub record: Option<QueryType>,
    pub exact: Vec<String>,
    pub suffix: Vec<String>,
}

/// A single configured rule. `priority` is the rule's zero-based index in
/// the configuration's `rule` array; lower wins when two rules match the
/// same question.
#[derive(Clone, Debug)]
pub struct Rule {
    pub priority: usize,
    pub pattern: Pattern,
    pub upstream: Upstream,
}
