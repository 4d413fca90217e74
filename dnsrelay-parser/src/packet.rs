use crate::buffer::{BytePacketBuffer, ReaderError, WriterError};
use crate::header::Header;
use crate::question::Question;
use crate::record::Record;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsPacket {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub resources: Vec<Record>,
}

impl DnsPacket {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_question(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    pub fn with_answer(mut self, answer: Record) -> Self {
        self.answers.push(answer);
        self
    }

    pub fn with_answers(mut self, answers: impl IntoIterator<Item = Record>) -> Self {
        self.answers.extend(answers);
        self
    }

    /// Builds a packet for a reply to `request`, copying the question
    /// section across so the response mirrors what was asked.
    pub fn response_to(request: &Self) -> Self {
        let mut packet = Self::new(Header::response_from(&request.header));
        packet.questions = request.questions.clone();
        packet
    }

    /// The EDNS0 pseudo-record carried in the resources section, if any.
    pub fn edns0(&self) -> Option<&Record> {
        self.resources.iter().find(|record| record.is_opt())
    }

    /// Whether the packet carries an EDNS0 (OPT) record at all, regardless
    /// of the DO bit. This is what spec.md §4.5 keys EDNS0 propagation and
    /// the resolver's `dnssec` flag on.
    pub fn has_edns0(&self) -> bool {
        self.edns0().is_some()
    }

    /// Whether the packet carries an OPT record with the DO bit set. `false`
    /// if there's no OPT record.
    pub fn dnssec_requested(&self) -> bool {
        matches!(
            self.edns0(),
            Some(Record::Opt {
                dnssec_ok: true,
                ..
            })
        )
    }

    /// Appends an EDNS0 reply record advertising a 4096-byte UDP buffer,
    /// echoing whether DNSSEC data was requested.
    pub fn with_edns0_reply(mut self, dnssec_ok: bool) -> Self {
        self.resources.push(Record::Opt {
            udp_payload_size: 4096,
            extended_rcode: 0,
            version: 0,
            dnssec_ok,
            data: Vec::new(),
        });
        self
    }

    pub fn finalize(mut self) -> Self {
        self.header.question_count = self.questions.len() as u16;
        self.header.answer_count = self.answers.len() as u16;
        self.header.authority_count = self.authorities.len() as u16;
        self.header.resource_count = self.resources.len() as u16;
        self
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        self.header.write(buffer)?;

        for question in &self.questions {
            question.write(buffer)?;
        }
        for record in &self.answers {
            record.write(buffer)?;
        }
        for record in &self.authorities {
            record.write(buffer)?;
        }
        for record in &self.resources {
            record.write(buffer)?;
        }

        Ok(())
    }

    /// Serializes the packet into a fresh 512-byte buffer, updating the
    /// header's section counts to match its contents first.
    pub fn create_buffer(&self) -> Result<BytePacketBuffer, WriterError> {
        let packet = self.clone().finalize();
        let mut buffer = BytePacketBuffer::default();
        packet.write(&mut buffer)?;
        Ok(buffer)
    }
}

impl TryFrom<&mut BytePacketBuffer> for DnsPacket {
    type Error = ReaderError;

    fn try_from(buffer: &mut BytePacketBuffer) -> Result<Self, Self::Error> {
        let header = Header::read(buffer)?;
        let mut packet = DnsPacket::new(header.clone());

        for _ in 0..header.question_count {
            packet.questions.push(Question::read(buffer)?);
        }
        for _ in 0..header.answer_count {
            packet.answers.push(Record::read(buffer)?);
        }
        for _ in 0..header.authority_count {
            packet.authorities.push(Record::read(buffer)?);
        }
        for _ in 0..header.resource_count {
            packet.resources.push(Record::read(buffer)?);
        }

        Ok(packet)
    }
}

impl TryFrom<BytePacketBuffer> for DnsPacket {
    type Error = ReaderError;

    fn try_from(mut buffer: BytePacketBuffer) -> Result<Self, Self::Error> {
        DnsPacket::try_from(&mut buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QueryType;
    use std::net::Ipv4Addr;

    #[test]
    fn round_trips_a_full_packet() {
        let packet = DnsPacket::new(Header::question(42))
            .with_question(Question::new("example.com".to_string(), QueryType::A))
            .finalize();

        let mut buffer = packet.create_buffer().unwrap();
        buffer.pos = 0;
        let parsed = DnsPacket::try_from(&mut buffer).unwrap();
        assert_eq!(parsed.header.id, 42);
        assert_eq!(parsed.questions, packet.questions);
    }

    #[test]
    fn response_to_mirrors_the_question_section() {
        let request = DnsPacket::new(Header::question(7))
            .with_question(Question::new("example.com".to_string(), QueryType::A))
            .finalize();

        let mut response = DnsPacket::response_to(&request)
            .with_answer(Record::A {
                domain: "example.com".to_string(),
                addr: Ipv4Addr::new(1, 1, 1, 1),
                ttl: 30,
            })
            .finalize();
        response.header.id = request.header.id;

        assert_eq!(response.header.id, 7);
        assert!(response.header.response);
        assert_eq!(response.questions, request.questions);
        assert_eq!(response.answers.len(), 1);
    }

    #[test]
    fn round_trips_edns0_through_the_wire() {
        let request = DnsPacket::new(Header::question(9))
            .with_question(Question::new("example.com".to_string(), QueryType::A))
            .with_edns0_reply(true)
            .finalize();

        let mut buffer = request.create_buffer().unwrap();
        buffer.pos = 0;
        let parsed = DnsPacket::try_from(&mut buffer).unwrap();

        assert!(parsed.dnssec_requested());
        assert!(parsed.edns0().is_some());
    }

    #[test]
    fn has_edns0_is_true_with_do_bit_unset() {
        let request = DnsPacket::new(Header::question(9))
            .with_question(Question::new("example.com".to_string(), QueryType::A))
            .with_edns0_reply(false)
            .finalize();
        assert!(request.has_edns0());
        assert!(!request.dnssec_requested());
    }

    #[test]
    fn dnssec_requested_is_false_without_edns0() {
        let request = DnsPacket::new(Header::question(9))
            .with_question(Question::new("example.com".to_string(), QueryType::A))
            .finalize();
        assert!(!request.dnssec_requested());
    }
}
