use std::sync::Arc;

use dnsrelay_parser::{BytePacketBuffer, DnsPacket, Header, Question, Record, ResponseCode};
use dnsrelay_resolver::{ResolveError, Resolver, ResolverRegistry};
use dnsrelay_server::prelude::Message;
use tracing::{error, instrument, warn};

use crate::cache::{AnswerCache, Lookup};
use crate::deferred::Outcome;
use crate::error::HandleError;
use crate::model::Upstream;
use crate::route::RouteTrie;

/// Single-flight misses across rules with a `Udp`/`Doh` upstream can, in
/// theory, be rejected, expired and retried by a fresh leader several
/// times over under heavy contention; this bounds how many times a single
/// request will cycle through that before giving up with SERVFAIL.
const INSTALL_RETRY_LIMIT: usize = 8;
const MAX_CACHE_TTL: u32 = 3600;

/// Standard query opcode. Anything else isn't implemented by this forwarder.
const OPCODE_QUERY: u8 = 0;

pub struct RequestHandler {
    routes: RouteTrie,
    cache: Arc<AnswerCache>,
    registry: ResolverRegistry,
}

impl RequestHandler {
    pub fn new(routes: RouteTrie, cache: Arc<AnswerCache>, registry: ResolverRegistry) -> Self {
        Self {
            routes,
            cache,
            registry,
        }
    }

    /// Exposes the shared cache so the caller can drive the background
    /// eviction sweep (§4.3) alongside the server's accept loop.
    pub fn cache(&self) -> &Arc<AnswerCache> {
        &self.cache
    }

    async fn resolver_for(&self, upstream: &Upstream) -> Option<Arc<dyn Resolver>> {
        match upstream {
            Upstream::Block(mode) => Some(self.registry.block(*mode).await),
            Upstream::Ipv4(addr) => Some(self.registry.ipv4(*addr).await),
            Upstream::Ipv6(addr) => Some(self.registry.ipv6(*addr).await),
            Upstream::Udp(addr) => Some(self.registry.udp(*addr).await),
            Upstream::Doh { url, proxy } => {
                match self.registry.doh(url, proxy.as_deref()).await {
                    Ok(resolver) => Some(resolver),
                    Err(error) => {
                        warn!(%error, url, "could not construct doh resolver");
                        None
                    }
                }
            }
        }
    }

    /// Runs the cache-then-route-then-resolve pipeline for a single
    /// question, per the §4.5 state machine. Single-flight: concurrent
    /// callers for the same key share one resolver invocation via the
    /// cache's `Deferred`.
    #[instrument(skip(self, question), fields(name = %question.name, qtype = ?question.kind))]
    async fn answer(&self, question: &Question, dnssec: bool) -> Result<Vec<Record>, HandleError> {
        for _ in 0..INSTALL_RETRY_LIMIT {
            match self.cache.get(&question.name, question.kind) {
                Lookup::Hit(answers) => return Ok(answers),
                Lookup::Rejected(rcode) => {
                    return Err(HandleError::Resolve(ResolveError::ProtocolRcode(rcode)));
                }
                Lookup::Miss => {}
            }

            let (is_leader, deferred) = self.cache.install(&question.name, question.kind);
            if !is_leader {
                // Don't interpret the outcome directly: looping back through
                // `get` applies the same TTL-rewrite/expiry/deletion rules
                // uniformly, whether we were a follower or just lost a race
                // to another follower.
                let _ = deferred.wait().await;
                continue;
            }

            let Some(upstream) = self.routes.search(&question.name, question.kind).cloned() else {
                self.cache
                    .reject(&question.name, question.kind, &deferred, ResponseCode::NotImplemented);
                return Err(HandleError::NoUpstream);
            };

            let Some(resolver) = self.resolver_for(&upstream).await else {
                self.cache
                    .reject(&question.name, question.kind, &deferred, ResponseCode::NotImplemented);
                return Err(HandleError::NoUpstream);
            };

            match resolver.resolve(question, dnssec).await {
                Ok(answers) => {
                    let ttl = answers
                        .iter()
                        .map(Record::ttl)
                        .min()
                        .unwrap_or(0)
                        .min(MAX_CACHE_TTL);
                    self.cache.resolve(&deferred, answers.clone(), ttl);
                    return Ok(answers);
                }
                Err(ResolveError::ProtocolRcode(rcode)) => {
                    self.cache.reject(&question.name, question.kind, &deferred, rcode);
                    return Err(HandleError::Resolve(ResolveError::ProtocolRcode(rcode)));
                }
                Err(error @ ResolveError::Transport(_)) => {
                    self.cache
                        .reject(&question.name, question.kind, &deferred, ResponseCode::ServerFailure);
                    return Err(HandleError::Resolve(error));
                }
            }
        }
        Err(HandleError::CacheContention)
    }
}

fn encode(packet: DnsPacket, address: std::net::SocketAddr) -> Option<Message> {
    match packet.create_buffer() {
        Ok(buffer) => Some(Message {
            address,
            buffer: buffer.buf,
            size: buffer.pos(),
        }),
        Err(error) => {
            error!(?error, "failed to encode reply");
            None
        }
    }
}

#[async_trait::async_trait]
impl dnsrelay_server::Handler for RequestHandler {
    async fn handle(&self, message: Message) -> Option<Message> {
        let mut buffer = BytePacketBuffer {
            buf: message.buffer,
            pos: 0,
        };

        let request = match DnsPacket::try_from(&mut buffer) {
            Ok(packet) => packet,
            Err(error) => {
                // A 12-byte header is the minimum unit we can salvage an id
                // from; anything shorter is dropped with no reply.
                if message.size < 12 {
                    warn!(?error, "dropping undecodable short packet");
                    return None;
                }
                let id = Header::peek_id(&buffer).unwrap_or(0);
                warn!(?error, id, "decode failure, replying with FORMERR");
                let reply =
                    DnsPacket::new(Header::response(id).with_response_code(ResponseCode::FormatError))
                        .finalize();
                return encode(reply, message.address);
            }
        };

        if request.header.opcode != OPCODE_QUERY {
            let mut reply = DnsPacket::response_to(&request);
            reply.header.response_code = ResponseCode::NotImplemented;
            return encode(reply.finalize(), message.address);
        }
        if request.questions.len() != 1 {
            let mut reply = DnsPacket::response_to(&request);
            reply.header.response_code = ResponseCode::FormatError;
            return encode(reply.finalize(), message.address);
        }

        let question = request.questions[0].clone();
        // Per spec.md §4.5, the resolver's dnssec flag and the reply's EDNS0
        // propagation are keyed on OPT *presence*, not the DO bit.
        let has_edns0 = request.has_edns0();

        let mut reply = DnsPacket::response_to(&request);
        match self.answer(&question, has_edns0).await {
            Ok(answers) => {
                reply.header.response_code = ResponseCode::NoError;
                reply.answers = answers;
            }
            Err(error) => {
                error!(%error, "request failed");
                reply.header.response_code = error.response_code();
            }
        }
        if has_edns0 {
            reply = reply.with_edns0_reply(request.dnssec_requested());
        }
        encode(reply.finalize(), message.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Pattern, Rule};
    use dnsrelay_parser::QueryType;
    use dnsrelay_server::Handler;
    use similar_asserts::assert_eq;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::UdpSocket;

    fn rule(priority: usize, suffix: &str, upstream: Upstream) -> Rule {
        Rule {
            priority,
            pattern: Pattern {
                record: None,
                exact: vec![],
                suffix: vec![suffix.to_string()],
            },
            upstream,
        }
    }

    fn build_handler(rules: Vec<Rule>) -> RequestHandler {
        RequestHandler::new(
            RouteTrie::build(&rules),
            Arc::new(AnswerCache::new()),
            ResolverRegistry::new(),
        )
    }

    fn request_message(name: &str, kind: QueryType, dnssec: bool) -> Message {
        let mut packet = DnsPacket::new(Header::question(7)).with_question(Question::new(name.to_string(), kind));
        if dnssec {
            packet = packet.with_edns0_reply(true);
        }
        let buffer = packet.finalize().create_buffer().unwrap();
        Message {
            address: "127.0.0.1:9".parse().unwrap(),
            buffer: buffer.buf,
            size: buffer.pos(),
        }
    }

    fn decode(message: &Message) -> DnsPacket {
        let mut buffer = BytePacketBuffer {
            buf: message.buffer,
            pos: 0,
        };
        DnsPacket::try_from(&mut buffer).unwrap()
    }

    #[tokio::test]
    async fn s1_block_rule_returns_nxdomain_with_no_answers() {
        let handler = build_handler(vec![rule(
            0,
            "blocked.test",
            Upstream::Block(dnsrelay_resolver::BlockMode::Nxdomain),
        )]);
        let reply = handler
            .handle(request_message("blocked.test", QueryType::A, false))
            .await
            .unwrap();
        let packet = decode(&reply);
        assert_eq!(packet.header.response_code, ResponseCode::NameError);
        assert!(packet.answers.is_empty());
    }

    #[tokio::test]
    async fn s2_static_rule_returns_configured_address() {
        let handler = build_handler(vec![rule(
            0,
            "static.test",
            Upstream::Ipv4(Ipv4Addr::new(10, 0, 0, 1)),
        )]);
        let reply = handler
            .handle(request_message("static.test", QueryType::A, false))
            .await
            .unwrap();
        let packet = decode(&reply);
        assert_eq!(packet.header.response_code, ResponseCode::NoError);
        match &packet.answers[0] {
            Record::A { addr, ttl, .. } => {
                assert_eq!(*addr, Ipv4Addr::new(10, 0, 0, 1));
                assert_eq!(*ttl, 60);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    async fn stub_udp_server(calls: Arc<AtomicUsize>, delay: Duration) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let mut buf = [0u8; 512];
                let (len, src) = match socket.recv_from(&mut buf).await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                calls.fetch_add(1, Ordering::SeqCst);
                let mut request_buffer = BytePacketBuffer { buf, pos: 0 };
                let request = DnsPacket::try_from(&mut request_buffer).unwrap();
                tokio::time::sleep(delay).await;
                let mut reply = DnsPacket::response_to(&request).with_answer(Record::A {
                    domain: "www.example.com".to_string(),
                    addr: Ipv4Addr::new(93, 184, 216, 34),
                    ttl: 30,
                });
                reply.header.id = request.header.id;
                let buffer = reply.finalize().create_buffer().unwrap();
                let _ = socket.send_to(&buffer.buf[..buffer.pos()], src).await;
            }
        });
        address
    }

    #[tokio::test]
    async fn s3_udp_rule_forwards_and_relays_the_answer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let upstream_addr = stub_udp_server(calls.clone(), Duration::from_millis(0)).await;

        let handler = build_handler(vec![rule(0, "example.com", Upstream::Udp(upstream_addr))]);
        let reply = handler
            .handle(request_message("www.example.com", QueryType::A, false))
            .await
            .unwrap();
        let packet = decode(&reply);
        assert_eq!(packet.header.response_code, ResponseCode::NoError);
        match &packet.answers[0] {
            Record::A { addr, .. } => assert_eq!(*addr, Ipv4Addr::new(93, 184, 216, 34)),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[tokio::test]
    async fn s4_concurrent_identical_queries_single_flight_the_upstream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let upstream_addr = stub_udp_server(calls.clone(), Duration::from_millis(150)).await;

        let handler = Arc::new(build_handler(vec![rule(
            0,
            "example.com",
            Upstream::Udp(upstream_addr),
        )]));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handler = handler.clone();
            tasks.push(tokio::spawn(async move {
                handler
                    .handle(request_message("www.example.com", QueryType::A, false))
                    .await
                    .unwrap()
            }));
        }

        let mut replies = Vec::new();
        for task in tasks {
            replies.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = decode(&replies[0]);
        for reply in &replies[1..] {
            assert_eq!(decode(reply).answers, first.answers);
        }
    }

    #[tokio::test]
    async fn rejected_entries_are_not_retained_as_a_negative_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap();
        // Nothing answers this socket, so every resolve attempt times out... instead
        // of waiting on a real timeout, reply once with SERVFAIL immediately.
        let calls_clone = calls.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let (_, src) = socket.recv_from(&mut buf).await.unwrap();
                calls_clone.fetch_add(1, Ordering::SeqCst);
                let mut request_buffer = BytePacketBuffer { buf, pos: 0 };
                let request = DnsPacket::try_from(&mut request_buffer).unwrap();
                let mut reply = DnsPacket::response_to(&request);
                reply.header.id = request.header.id;
                reply.header.response_code = ResponseCode::ServerFailure;
                let buffer = reply.finalize().create_buffer().unwrap();
                let _ = socket.send_to(&buffer.buf[..buffer.pos()], src).await;
            }
        });

        let handler = build_handler(vec![rule(0, "example.com", Upstream::Udp(address))]);

        for _ in 0..2 {
            let reply = handler
                .handle(request_message("www.example.com", QueryType::A, false))
                .await
                .unwrap();
            assert_eq!(decode(&reply).header.response_code, ResponseCode::ServerFailure);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2, "each query re-hit the upstream");
    }

    #[tokio::test]
    async fn edns0_request_gets_an_edns0_reply() {
        let handler = build_handler(vec![rule(
            0,
            "static.test",
            Upstream::Ipv4(Ipv4Addr::new(10, 0, 0, 1)),
        )]);
        let reply = handler
            .handle(request_message("static.test", QueryType::A, true))
            .await
            .unwrap();
        let packet = decode(&reply);
        assert!(packet.dnssec_requested());
    }

    #[tokio::test]
    async fn no_route_matches_is_notimp() {
        let handler = build_handler(vec![]);
        let reply = handler
            .handle(request_message("nowhere.test", QueryType::A, false))
            .await
            .unwrap();
        assert_eq!(
            decode(&reply).header.response_code,
            ResponseCode::NotImplemented
        );
    }

    #[tokio::test]
    async fn unsupported_opcode_is_notimp() {
        let handler = build_handler(vec![]);
        let mut packet = DnsPacket::new(Header::question(1)).with_question(Question::new(
            "static.test".to_string(),
            QueryType::A,
        ));
        packet.header.opcode = 4;
        let buffer = packet.finalize().create_buffer().unwrap();
        let message = Message {
            address: "127.0.0.1:9".parse().unwrap(),
            buffer: buffer.buf,
            size: buffer.pos(),
        };
        let reply = handler.handle(message).await.unwrap();
        assert_eq!(
            decode(&reply).header.response_code,
            ResponseCode::NotImplemented
        );
    }

    #[tokio::test]
    async fn multiple_questions_is_formerr() {
        let handler = build_handler(vec![]);
        let packet = DnsPacket::new(Header::question(1))
            .with_question(Question::new("one.test".to_string(), QueryType::A))
            .with_question(Question::new("two.test".to_string(), QueryType::A));
        let buffer = packet.finalize().create_buffer().unwrap();
        let message = Message {
            address: "127.0.0.1:9".parse().unwrap(),
            buffer: buffer.buf,
            size: buffer.pos(),
        };
        let reply = handler.handle(message).await.unwrap();
        assert_eq!(decode(&reply).header.response_code, ResponseCode::FormatError);
    }

    #[tokio::test]
    async fn bare_edns0_with_do_unset_still_gets_an_edns0_reply() {
        let handler = build_handler(vec![rule(
            0,
            "static.test",
            Upstream::Ipv4(Ipv4Addr::new(10, 0, 0, 1)),
        )]);
        let packet = DnsPacket::new(Header::question(1))
            .with_question(Question::new("static.test".to_string(), QueryType::A))
            .with_edns0_reply(false);
        let buffer = packet.finalize().create_buffer().unwrap();
        let message = Message {
            address: "127.0.0.1:9".parse().unwrap(),
            buffer: buffer.buf,
            size: buffer.pos(),
        };
        let reply = handler.handle(message).await.unwrap();
        let decoded = decode(&reply);
        assert!(decoded.has_edns0());
        assert!(!decoded.dnssec_requested());
    }

    #[tokio::test]
    async fn undecodable_short_packet_is_dropped_with_no_reply() {
        let handler = build_handler(vec![]);
        let message = Message {
            address: "127.0.0.1:9".parse().unwrap(),
            buffer: [0u8; 512],
            size: 3,
        };
        assert!(handler.handle(message).await.is_none());
    }
}
