use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};

use dnsrelay_parser::{BytePacketBuffer, DnsPacket, Header, Question, Record, ResponseCode};
use tokio::net::UdpSocket;

use crate::prelude::{ResolveError, Resolver};

/// Forwards a question to a single upstream DNS server over plaintext UDP,
/// matching each reply to its request via a rolling transaction id.
#[derive(Debug)]
pub struct Udp {
    server: SocketAddr,
    next_id: AtomicU16,
}

impl Udp {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            next_id: AtomicU16::new(1),
        }
    }

    fn build_query(&self, question: &Question, dnssec: bool) -> Result<BytePacketBuffer, ResolveError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut header = Header::question(id);
        header.recursion_desired = true;
        header.question_count = 1;
        if dnssec {
            header.resource_count = 1;
        }

        let mut buffer = BytePacketBuffer::default();
        header
            .write(&mut buffer)
            .map_err(|_| io_error("failed to encode query header"))?;
        question
            .write(&mut buffer)
            .map_err(|_| io_error("failed to encode query question"))?;

        if dnssec {
            // Bare OPT pseudo-record: root name, UDP payload 4096, DO bit set.
            buffer
                .write_u8(0)
                .map_err(|_| io_error("failed to encode edns0 name"))?;
            buffer
                .write_u16(41)
                .map_err(|_| io_error("failed to encode edns0 type"))?;
            buffer
                .write_u16(4096)
                .map_err(|_| io_error("failed to encode edns0 payload size"))?;
            buffer
                .write_u32(0x0000_8000)
                .map_err(|_| io_error("failed to encode edns0 flags"))?;
            buffer
                .write_u16(0)
                .map_err(|_| io_error("failed to encode edns0 rdlength"))?;
        }

        Ok(buffer)
    }
}

fn io_error(message: &str) -> ResolveError {
    ResolveError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string()))
}

#[async_trait::async_trait]
impl Resolver for Udp {
    fn kind(&self) -> &'static str {
        "udp"
    }

    async fn resolve(&self, question: &Question, dnssec: bool) -> Result<Vec<Record>, ResolveError> {
        let query = self.build_query(question, dnssec)?;

        let local: SocketAddr = if self.server.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.server).await?;
        socket.send(&query.buf[..query.pos()]).await?;

        let mut response = BytePacketBuffer::default();
        let size = socket.recv(&mut response.buf).await?;
        let _ = size;

        let packet = DnsPacket::try_from(&mut response)
            .map_err(|err| ResolveError::Transport(err.into()))?;

        if packet.header.response_code != ResponseCode::NoError {
            return Err(ResolveError::ProtocolRcode(packet.header.response_code));
        }

        Ok(packet.answers)
    }
}
