use std::net::{Ipv4Addr, Ipv6Addr};

use dnsrelay_parser::{Question, Record, ResponseCode};
use serde::Deserialize;

use crate::prelude::{ResolveError, Resolver};

const RRSIG_TYPE: u16 = 46;

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    kind: u16,
    #[serde(rename = "TTL")]
    ttl: u32,
    data: String,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u8,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

/// Forwards a question as a DNS-over-HTTPS GET request using the
/// Cloudflare-style `application/dns-json` profile.
#[derive(Debug)]
pub struct Doh {
    url: String,
    client: reqwest::Client,
}

impl Doh {
    pub fn new(url: String, proxy: Option<String>) -> Result<Self, String> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(&proxy_url).map_err(|err| err.to_string())?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|err| err.to_string())?;
        Ok(Self { url, client })
    }
}

fn parse_answer(domain: &str, answer: DohAnswer) -> Result<Option<Record>, String> {
    if answer.kind == RRSIG_TYPE {
        return Ok(None);
    }

    match answer.kind {
        1 => {
            let addr: Ipv4Addr = answer
                .data
                .parse()
                .map_err(|_| format!("invalid A data: {}", answer.data))?;
            Ok(Some(Record::A {
                domain: domain.to_string(),
                addr,
                ttl: answer.ttl,
            }))
        }
        28 => {
            let addr: Ipv6Addr = answer
                .data
                .parse()
                .map_err(|_| format!("invalid AAAA data: {}", answer.data))?;
            Ok(Some(Record::Aaaa {
                domain: domain.to_string(),
                addr,
                ttl: answer.ttl,
            }))
        }
        2 => Ok(Some(Record::Ns {
            domain: domain.to_string(),
            host: answer.data.trim_end_matches('.').to_string(),
            ttl: answer.ttl,
        })),
        5 => Ok(Some(Record::Cname {
            domain: domain.to_string(),
            host: answer.data.trim_end_matches('.').to_string(),
            ttl: answer.ttl,
        })),
        15 => {
            let mut parts = answer.data.splitn(2, ' ');
            let priority: u16 = parts
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| format!("invalid MX data: {}", answer.data))?;
            let host = parts
                .next()
                .ok_or_else(|| format!("invalid MX data: {}", answer.data))?
                .trim_end_matches('.')
                .to_string();
            Ok(Some(Record::Mx {
                domain: domain.to_string(),
                priority,
                host,
                ttl: answer.ttl,
            }))
        }
        16 => Ok(Some(Record::Txt {
            domain: domain.to_string(),
            data: vec![answer.data.trim_matches('"').to_string()],
            ttl: answer.ttl,
        })),
        33 => {
            let fields: Vec<&str> = answer.data.split(' ').collect();
            if fields.len() != 4 {
                return Err(format!("invalid SRV data: {}", answer.data));
            }
            let priority: u16 = fields[0]
                .parse()
                .map_err(|_| format!("invalid SRV priority: {}", answer.data))?;
            let weight: u16 = fields[1]
                .parse()
                .map_err(|_| format!("invalid SRV weight: {}", answer.data))?;
            let port: u16 = fields[2]
                .parse()
                .map_err(|_| format!("invalid SRV port: {}", answer.data))?;
            Ok(Some(Record::Srv {
                domain: domain.to_string(),
                priority,
                weight,
                port,
                target: fields[3].trim_end_matches('.').to_string(),
                ttl: answer.ttl,
            }))
        }
        other => {
            tracing::debug!(qtype = other, "skipping unrecognized doh answer type");
            Ok(None)
        }
    }
}

#[async_trait::async_trait]
impl Resolver for Doh {
    fn kind(&self) -> &'static str {
        "doh"
    }

    async fn resolve(&self, question: &Question, dnssec: bool) -> Result<Vec<Record>, ResolveError> {
        let mut query = vec![
            ("name", question.name.clone()),
            ("type", question.kind.as_str().to_string()),
        ];
        if dnssec {
            query.push(("do", "true".to_string()));
        }

        let response = self
            .client
            .get(&self.url)
            .header("accept", "application/dns-json")
            .query(&query)
            .send()
            .await
            .map_err(|err| ResolveError::Transport(to_io_error(err)))?;

        let body: DohResponse = response
            .json()
            .await
            .map_err(|err| ResolveError::Transport(to_io_error(err)))?;

        if body.status != 0 {
            let code = ResponseCode::try_from(body.status)
                .map_err(|_| ResolveError::Transport(io_error_msg("unrecognized doh status code")))?;
            return Err(ResolveError::ProtocolRcode(code));
        }

        let mut answers = Vec::with_capacity(body.answer.len());
        for answer in body.answer {
            match parse_answer(&question.name, answer) {
                Ok(Some(record)) => answers.push(record),
                Ok(None) => {}
                Err(message) => return Err(ResolveError::Transport(io_error_msg(&message))),
            }
        }

        Ok(answers)
    }
}

fn to_io_error(err: reqwest::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

fn io_error_msg(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}
