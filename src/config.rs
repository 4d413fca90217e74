use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use dnsrelay_parser::QueryType;
use dnsrelay_resolver::BlockMode;
use serde::Deserialize;

use crate::model::{Pattern as RoutePattern, Rule, Upstream};

#[derive(Debug, Deserialize)]
struct RawPattern {
    record: Option<String>,
    #[serde(default)]
    domain: Vec<String>,
    #[serde(default)]
    suffix: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawUpstream {
    block: Option<String>,
    ipv4: Option<String>,
    ipv6: Option<String>,
    udp: Option<String>,
    doh: Option<String>,
    doh_proxy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    pattern: RawPattern,
    upstream: RawUpstream,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_host")]
    pub host: IpAddr,
    #[serde(default = "Config::default_port")]
    pub port: u16,
    #[serde(default = "Config::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    rule: Vec<RawRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            log_level: Self::default_log_level(),
            rule: Vec::new(),
        }
    }
}

impl Config {
    fn default_host() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    fn default_port() -> u16 {
        53
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn load(path: &Path) -> Self {
        let conf = ::config::Config::builder()
            .add_source(::config::File::from(path).required(true))
            .add_source(::config::Environment::default().separator("_"))
            .build()
            .expect("unable to locate configuration file");
        conf.try_deserialize()
            .expect("configuration format invalid")
    }

    /// Loads `conf_path` if given, otherwise falls back to defaults
    /// overlaid with environment variables — a `-conf` flag is optional,
    /// matching the upstream reference's behavior of running with built-in
    /// defaults when no config file is specified.
    pub fn resolve(conf_path: Option<&Path>) -> Self {
        match conf_path {
            Some(path) => Self::load(path),
            None => {
                let conf = ::config::Config::builder()
                    .add_source(::config::Environment::default().separator("_"))
                    .build()
                    .expect("unable to build configuration from environment");
                conf.try_deserialize().unwrap_or_default()
            }
        }
    }

    /// Validates and converts every raw rule into the routing model,
    /// panicking with the offending field name on the first invalid one —
    /// configuration errors are fatal at startup, not something the handler
    /// recovers from at request time.
    pub fn rules(&self) -> Vec<Rule> {
        self.rule
            .iter()
            .enumerate()
            .map(|(priority, raw)| build_rule(priority, raw))
            .collect()
    }
}

fn build_rule(priority: usize, raw: &RawRule) -> Rule {
    let pattern = build_pattern(&raw.pattern);
    let upstream = build_upstream(&raw.upstream);
    Rule {
        priority,
        pattern,
        upstream,
    }
}

fn build_pattern(raw: &RawPattern) -> RoutePattern {
    if raw.domain.is_empty() && raw.suffix.is_empty() {
        panic!("invalid pattern: both domain and suffix are empty");
    }
    let record = raw.record.as_deref().map(|mnemonic| {
        QueryType::from_str(mnemonic)
            .unwrap_or_else(|_| panic!("invalid pattern: unrecognized record type {mnemonic:?}"))
    });
    RoutePattern {
        record,
        exact: raw.domain.clone(),
        suffix: raw.suffix.clone(),
    }
}

fn build_upstream(raw: &RawUpstream) -> Upstream {
    let set_count = [
        raw.block.is_some(),
        raw.ipv4.is_some(),
        raw.ipv6.is_some(),
        raw.udp.is_some(),
        raw.doh.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count();
    if set_count != 1 {
        panic!("invalid upstream: exactly one of block/ipv4/ipv6/udp/doh must be set");
    }

    if let Some(mode) = &raw.block {
        let mode = BlockMode::from_str(mode)
            .unwrap_or_else(|_| panic!("invalid upstream: unsupported block action {mode:?}"));
        return Upstream::Block(mode);
    }
    if let Some(addr) = &raw.ipv4 {
        let addr = addr
            .parse::<Ipv4Addr>()
            .unwrap_or_else(|_| panic!("invalid upstream: invalid IPv4 {addr:?}"));
        return Upstream::Ipv4(addr);
    }
    if let Some(addr) = &raw.ipv6 {
        let addr = addr
            .parse::<std::net::Ipv6Addr>()
            .unwrap_or_else(|_| panic!("invalid upstream: invalid IPv6 {addr:?}"));
        return Upstream::Ipv6(addr);
    }
    if let Some(hostport) = &raw.udp {
        let addr = hostport
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| panic!("invalid upstream: invalid UDP host:port {hostport:?}"));
        return Upstream::Udp(addr);
    }
    if raw.doh_proxy.is_some() && raw.doh.is_none() {
        panic!("invalid upstream: doh_proxy set without doh");
    }
    if let Some(url) = &raw.doh {
        url::Url::parse(url).unwrap_or_else(|_| panic!("invalid upstream: unparseable doh url {url:?}"));
        return Upstream::Doh {
            url: url.clone(),
            proxy: raw.doh_proxy.clone(),
        };
    }

    unreachable!("set_count == 1 guarantees one of the branches above matched")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_minimal_rule_set() {
        let json = r#"{
            "host": "0.0.0.0",
            "port": 5353,
            "rule": [
                {"pattern": {"domain": ["blocked.test"]}, "upstream": {"block": "nxdomain"}},
                {"pattern": {"suffix": ["example.com"]}, "upstream": {"udp": "127.0.0.1:5300"}}
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let rules = config.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].priority, 0);
        assert!(matches!(rules[1].upstream, Upstream::Udp(_)));
    }

    #[test]
    #[should_panic(expected = "both domain and suffix are empty")]
    fn rejects_a_pattern_with_no_domains() {
        let json = r#"{"rule": [{"pattern": {}, "upstream": {"block": "nodata"}}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        config.rules();
    }

    #[test]
    #[should_panic(expected = "exactly one of")]
    fn rejects_an_upstream_with_multiple_tags_set() {
        let json = r#"{"rule": [{"pattern": {"domain": ["x.test"]}, "upstream": {"ipv4": "1.1.1.1", "ipv6": "::1"}}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        config.rules();
    }

    #[test]
    #[should_panic(expected = "doh_proxy set without doh")]
    fn rejects_a_doh_proxy_without_doh() {
        let json = r#"{"rule": [{"pattern": {"domain": ["x.test"]}, "upstream": {"udp": "127.0.0.1:53", "doh_proxy": "http://proxy.test"}}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        config.rules();
    }

    #[test]
    #[should_panic(expected = "unparseable doh url")]
    fn rejects_an_unparseable_doh_url() {
        let json = r#"{"rule": [{"pattern": {"domain": ["x.test"]}, "upstream": {"doh": "not a url"}}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        config.rules();
    }

    #[test]
    fn defaults_host_port_and_log_level_when_absent() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.host, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(config.port, 53);
        assert_eq!(config.log_level, "info");
    }
}
