use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dnsrelay_parser::{QueryType, Record, ResponseCode};
use tracing::debug;

use crate::deferred::{Deferred, Outcome};

/// A settled answer set together with the instant it stops being usable.
/// `expires_at <= Instant::now()` means the entry is stale and must be
/// treated as a miss on the next `get`.
#[derive(Clone, Debug)]
pub struct CachedAnswer {
    pub answers: Vec<Record>,
    expires_at: Instant,
}

pub type CacheEntry = Arc<Deferred<CachedAnswer, ResponseCode>>;
type Entry = CacheEntry;

/// The result of a cache lookup.
pub enum Lookup {
    /// A live answer set, with TTLs already rewritten to the remaining
    /// time-to-live.
    Hit(Vec<Record>),
    /// A previous resolution attempt for this key failed with this rcode;
    /// the failure itself is cached so concurrent/soon-after callers don't
    /// re-hit a downed upstream.
    Rejected(ResponseCode),
    /// No entry, or the entry expired. The caller owns filling this key via
    /// `install`.
    Miss,
}

fn key(name: &str, qtype: QueryType) -> String {
    format!("{}/{}", name.trim_end_matches('.').to_ascii_lowercase(), qtype.to_num())
}

/// A single-flight, TTL-aware cache of question -> answer-set. Concurrent
/// lookups for the same `(name, qtype)` while a resolution is in flight
/// share one upstream call via `Deferred`.
#[derive(Default)]
pub struct AnswerCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl AnswerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `(name, qtype)`. Does not create an entry; callers that see
    /// `Miss` own calling `install` next.
    pub fn get(&self, name: &str, qtype: QueryType) -> Lookup {
        let cache_key = key(name, qtype);
        let entry = {
            let entries = self.entries.lock().unwrap();
            entries.get(&cache_key).cloned()
        };

        let Some(entry) = entry else {
            return Lookup::Miss;
        };

        match entry.peek() {
            None => Lookup::Miss,
            Some(Outcome::Rejected(rcode)) => {
                self.entries.lock().unwrap().remove(&cache_key);
                Lookup::Rejected(rcode)
            }
            Some(Outcome::Resolved(cached)) => {
                if cached.expires_at <= Instant::now() {
                    self.entries.lock().unwrap().remove(&cache_key);
                    Lookup::Miss
                } else {
                    let left = cached.expires_at.saturating_duration_since(Instant::now());
                    let remaining = left.as_secs().saturating_add(u64::from(left.subsec_nanos() > 0)).max(1) as u32;
                    let answers = cached
                        .answers
                        .iter()
                        .map(|record| record.with_ttl(remaining))
                        .collect();
                    Lookup::Hit(answers)
                }
            }
        }
    }

    /// Registers this caller as the one resolving `(name, qtype)`, or
    /// returns the `Deferred` another caller already installed so both can
    /// wait on the same in-flight resolution (single-flight).
    pub fn install(&self, name: &str, qtype: QueryType) -> (bool, CacheEntry) {
        let cache_key = key(name, qtype);
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(&cache_key) {
            return (false, existing.clone());
        }
        let deferred = Arc::new(Deferred::pending());
        entries.insert(cache_key, deferred.clone());
        (true, deferred)
    }

    /// Settles an in-flight resolution with a successful answer set. An
    /// empty `answers` with `ttl_secs == 0` is resolved but immediately
    /// expired: the next `get` deletes it and reports `Miss`, though any
    /// caller already blocked in `Deferred::wait` still observes the
    /// resolved (empty) value, per the single-flight contract.
    pub fn resolve(&self, deferred: &Deferred<CachedAnswer, ResponseCode>, answers: Vec<Record>, ttl_secs: u32) {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs as u64);
        deferred.resolve(CachedAnswer { answers, expires_at });
    }

    /// Rejects the in-flight resolution and immediately removes it from the
    /// map, per spec.md §4.3: removal is what lets the next query retry the
    /// upstream instead of replaying a stale failure; the reject is what
    /// delivers the rcode to waiters already blocked in `Deferred::wait`. A
    /// no-op if `deferred` is no longer the entry stored at this key (it was
    /// already replaced by a fresh single-flight leader).
    pub fn reject(&self, name: &str, qtype: QueryType, deferred: &CacheEntry, rcode: ResponseCode) {
        deferred.reject(rcode);
        let cache_key = key(name, qtype);
        let mut entries = self.entries.lock().unwrap();
        if entries.get(&cache_key).is_some_and(|existing| Arc::ptr_eq(existing, deferred)) {
            entries.remove(&cache_key);
        }
    }

    /// Drops every entry whose terminal value has expired, or that has sat
    /// pending past `max_pending`. Intended to be driven by a periodic
    /// background task; a stuck single-flight leader (crashed before
    /// resolving or rejecting) would otherwise wedge every waiter forever.
    pub fn sweep(&self, max_pending: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| match entry.peek() {
            Some(Outcome::Resolved(cached)) => cached.expires_at > now,
            Some(Outcome::Rejected(_)) => false,
            None => entry.pending_since().map(|since| now - since < max_pending).unwrap_or(true),
        });
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
    }
}
