use std::net::{Ipv4Addr, Ipv6Addr};

use dnsrelay_parser::{Question, Record};

use crate::prelude::{ResolveError, Resolver};

const STATIC_TTL: u32 = 60;

/// Synthesizes a single A record with a fixed address, ignoring the
/// question's record type beyond what the caller already routed to us.
#[derive(Debug)]
pub struct StaticIpv4 {
    addr: Ipv4Addr,
}

impl StaticIpv4 {
    pub fn new(addr: Ipv4Addr) -> Self {
        Self { addr }
    }
}

#[async_trait::async_trait]
impl Resolver for StaticIpv4 {
    fn kind(&self) -> &'static str {
        "static-ipv4"
    }

    async fn resolve(&self, question: &Question, _dnssec: bool) -> Result<Vec<Record>, ResolveError> {
        Ok(vec![Record::A {
            domain: question.name.clone(),
            addr: self.addr,
            ttl: STATIC_TTL,
        }])
    }
}

/// Synthesizes a single AAAA record with a fixed address.
#[derive(Debug)]
pub struct StaticIpv6 {
    addr: Ipv6Addr,
}

impl StaticIpv6 {
    pub fn new(addr: Ipv6Addr) -> Self {
        Self { addr }
    }
}

#[async_trait::async_trait]
impl Resolver for StaticIpv6 {
    fn kind(&self) -> &'static str {
        "static-ipv6"
    }

    async fn resolve(&self, question: &Question, _dnssec: bool) -> Result<Vec<Record>, ResolveError> {
        Ok(vec![Record::Aaaa {
            domain: question.name.clone(),
            addr: self.addr,
            ttl: STATIC_TTL,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnsrelay_parser::QueryType;

    #[tokio::test]
    async fn synthesizes_an_a_record_owned_by_the_question_name() {
        let resolver = StaticIpv4::new(Ipv4Addr::new(10, 0, 0, 1));
        let question = Question::new("static.test".to_string(), QueryType::A);
        let answers = resolver.resolve(&question, false).await.unwrap();
        assert_eq!(answers.len(), 1);
        match &answers[0] {
            Record::A { domain, addr, ttl } => {
                assert_eq!(domain, "static.test");
                assert_eq!(*addr, Ipv4Addr::new(10, 0, 0, 1));
                assert_eq!(*ttl, 60);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }
}
