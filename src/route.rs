use std::collections::HashMap;

use dnsrelay_parser::QueryType;

use crate::model::{Rule, Upstream};

/// Lowercases, strips a trailing dot, and splits on `.` right-to-left so the
/// resulting sequence reads root -> TLD -> ... -> leaf. Both rule domains
/// and incoming query names are canonicalized this way before any trie
/// operation, so `Example.COM.` and `example.com` land on the same path.
fn segments(domain: &str) -> Vec<String> {
    let lowered = domain.trim_end_matches('.').to_ascii_lowercase();
    if lowered.is_empty() {
        return Vec::new();
    }
    lowered.split('.').rev().map(str::to_string).collect()
}

#[derive(Clone)]
struct Matched {
    priority: usize,
    has_record: bool,
    upstream: Upstream,
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    matched: Option<Matched>,
}

impl TrieNode {
    /// Descends/creates nodes along `path`, stamping the terminal node with
    /// `matched` iff no stamp is present yet or the new one has strictly
    /// smaller priority (earlier rules win).
    fn insert(&mut self, path: &[String], matched: Matched) {
        let mut node = self;
        for segment in path {
            node = node.children.entry(segment.clone()).or_default();
        }
        match &node.matched {
            Some(existing) if existing.priority <= matched.priority => {}
            _ => node.matched = Some(matched),
        }
    }

    /// Exact lookup: every segment of `path` must be consumed and the
    /// terminal node must carry a stamp.
    fn lookup_exact(&self, path: &[String]) -> Option<&Matched> {
        let mut node = self;
        for segment in path {
            node = node.children.get(segment)?;
        }
        node.matched.as_ref()
    }

    /// Suffix lookup: walks as far as `path` allows, remembering the
    /// deepest node visited that carries a stamp. Returns the depth at
    /// which that stamp was found together with the stamp itself.
    fn lookup_suffix(&self, path: &[String]) -> Option<(usize, &Matched)> {
        let mut node = self;
        let mut best = None;
        for (depth, segment) in path.iter().enumerate() {
            node = node.children.get(segment)?;
            if let Some(matched) = &node.matched {
                best = Some((depth + 1, matched));
            }
        }
        best
    }
}

/// The four tries described in spec.md §4.2: {exact, suffix} x
/// {per-record, any-record}, built once at startup and read-only
/// thereafter.
#[derive(Default)]
pub struct RouteTrie {
    exact: HashMap<QueryType, TrieNode>,
    exact_any: TrieNode,
    suffix: HashMap<QueryType, TrieNode>,
    suffix_any: TrieNode,
}

impl RouteTrie {
    pub fn build(rules: &[Rule]) -> Self {
        let mut trie = Self::default();
        for rule in rules {
            let has_record = rule.pattern.record.is_some();
            for domain in &rule.pattern.exact {
                let matched = Matched {
                    priority: rule.priority,
                    has_record,
                    upstream: rule.upstream.clone(),
                };
                let path = segments(domain);
                match rule.pattern.record {
                    Some(record) => trie.exact.entry(record).or_default().insert(&path, matched),
                    None => trie.exact_any.insert(&path, matched),
                }
            }
            for domain in &rule.pattern.suffix {
                let matched = Matched {
                    priority: rule.priority,
                    has_record,
                    upstream: rule.upstream.clone(),
                };
                let path = segments(domain);
                match rule.pattern.record {
                    Some(record) => trie.suffix.entry(record).or_default().insert(&path, matched),
                    None => trie.suffix_any.insert(&path, matched),
                }
            }
        }
        trie
    }

    /// Resolves the upstream for `(name, qtype)`, or `None` if nothing
    /// matches. See spec.md §4.2 for the exact-beats-suffix,
    /// longest-suffix-wins, record-specificity-breaks-ties algorithm this
    /// implements.
    pub fn search(&self, name: &str, qtype: QueryType) -> Option<&Upstream> {
        let path = segments(name);

        if let Some(found) = self
            .exact
            .get(&qtype)
            .and_then(|trie| trie.lookup_exact(&path))
        {
            return Some(&found.upstream);
        }
        if let Some(found) = self.exact_any.lookup_exact(&path) {
            return Some(&found.upstream);
        }

        let per_record = self
            .suffix
            .get(&qtype)
            .and_then(|trie| trie.lookup_suffix(&path));
        let any_record = self.suffix_any.lookup_suffix(&path);

        match (per_record, any_record) {
            (Some((_, a)), None) => Some(&a.upstream),
            (None, Some((_, b))) => Some(&b.upstream),
            (Some((depth_a, a)), Some((depth_b, b))) => {
                if depth_a != depth_b {
                    if depth_a > depth_b {
                        Some(&a.upstream)
                    } else {
                        Some(&b.upstream)
                    }
                } else if a.has_record != b.has_record {
                    Some(if a.has_record { &a.upstream } else { &b.upstream })
                } else if a.priority <= b.priority {
                    Some(&a.upstream)
                } else {
                    Some(&b.upstream)
                }
            }
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pattern;
    use std::net::Ipv4Addr;

    fn rule(priority: usize, pattern: Pattern, upstream: Upstream) -> Rule {
        Rule {
            priority,
            pattern,
            upstream,
        }
    }

    fn ipv4(n: u8) -> Upstream {
        Upstream::Ipv4(Ipv4Addr::new(n, n, n, n))
    }

    fn describe(upstream: Option<&Upstream>) -> Option<String> {
        upstream.map(Upstream::describe)
    }

    #[test]
    fn priority_monotonicity() {
        let rules = vec![
            rule(
                0,
                Pattern {
                    record: None,
                    exact: vec!["example.com".into()],
                    suffix: vec![],
                },
                ipv4(1),
            ),
            rule(
                1,
                Pattern {
                    record: None,
                    exact: vec!["example.com".into()],
                    suffix: vec![],
                },
                ipv4(2),
            ),
        ];
        let trie = RouteTrie::build(&rules);
        assert_eq!(
            describe(trie.search("example.com", QueryType::A)),
            describe(Some(&ipv4(1)))
        );
    }

    #[test]
    fn longest_suffix_wins() {
        let rules = vec![
            rule(
                0,
                Pattern {
                    record: None,
                    exact: vec![],
                    suffix: vec!["c".into()],
                },
                ipv4(1),
            ),
            rule(
                5,
                Pattern {
                    record: None,
                    exact: vec![],
                    suffix: vec!["a.b.c".into()],
                },
                ipv4(2),
            ),
        ];
        let trie = RouteTrie::build(&rules);
        assert_eq!(
            describe(trie.search("x.a.b.c", QueryType::A)),
            describe(Some(&ipv4(2)))
        );
    }

    #[test]
    fn exact_beats_suffix() {
        let rules = vec![
            rule(
                0,
                Pattern {
                    record: None,
                    exact: vec![],
                    suffix: vec!["example".into()],
                },
                ipv4(1),
            ),
            rule(
                1,
                Pattern {
                    record: None,
                    exact: vec!["foo.example".into()],
                    suffix: vec![],
                },
                ipv4(2),
            ),
        ];
        let trie = RouteTrie::build(&rules);
        assert_eq!(
            describe(trie.search("foo.example", QueryType::A)),
            describe(Some(&ipv4(2)))
        );
    }

    #[test]
    fn record_specificity_breaks_ties_at_equal_depth() {
        let rules = vec![
            rule(
                0,
                Pattern {
                    record: Some(QueryType::A),
                    exact: vec![],
                    suffix: vec!["example.com".into()],
                },
                ipv4(1),
            ),
            rule(
                1,
                Pattern {
                    record: None,
                    exact: vec![],
                    suffix: vec!["example.com".into()],
                },
                ipv4(2),
            ),
        ];
        let trie = RouteTrie::build(&rules);
        assert_eq!(
            describe(trie.search("x.example.com", QueryType::A)),
            describe(Some(&ipv4(1)))
        );
        assert_eq!(
            describe(trie.search("x.example.com", QueryType::Aaaa)),
            describe(Some(&ipv4(2)))
        );
    }

    #[test]
    fn no_match_returns_none() {
        let trie = RouteTrie::build(&[]);
        assert!(trie.search("anything.test", QueryType::A).is_none());
    }

    #[test]
    fn canonicalizes_case_and_trailing_dot() {
        let rules = vec![rule(
            0,
            Pattern {
                record: None,
                exact: vec!["Example.COM.".into()],
                suffix: vec![],
            },
            ipv4(9),
        )];
        let trie = RouteTrie::build(&rules);
        assert_eq!(
            describe(trie.search("example.com", QueryType::A)),
            describe(Some(&ipv4(9)))
        );
    }
}
