use crate::buffer::{BytePacketBuffer, ReaderError, WriterError};

/// The DNS class of a question or record. The core only ever constructs
/// `In` (the only class any upstream in this forwarder speaks), but decodes
/// the other well-known mnemonics rather than collapsing them to `Unknown`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DnsClass {
    In,
    Cs,
    Ch,
    Hs,
    Unknown(u16),
}

impl From<u16> for DnsClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DnsClass::In,
            2 => DnsClass::Cs,
            3 => DnsClass::Ch,
            4 => DnsClass::Hs,
            other => DnsClass::Unknown(other),
        }
    }
}

impl From<DnsClass> for u16 {
    fn from(value: DnsClass) -> Self {
        match value {
            DnsClass::In => 1,
            DnsClass::Cs => 2,
            DnsClass::Ch => 3,
            DnsClass::Hs => 4,
            DnsClass::Unknown(other) => other,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Rrsig,
    Any,
    Unknown(u16),
}

impl QueryType {
    pub fn to_num(self) -> u16 {
        match self {
            QueryType::A => 1,
            QueryType::Ns => 2,
            QueryType::Cname => 5,
            QueryType::Soa => 6,
            QueryType::Ptr => 12,
            QueryType::Mx => 15,
            QueryType::Txt => 16,
            QueryType::Aaaa => 28,
            QueryType::Srv => 33,
            QueryType::Rrsig => 46,
            QueryType::Any => 255,
            QueryType::Unknown(num) => num,
        }
    }

    /// The mnemonic used in config files and logs, e.g. "A", "AAAA".
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::A => "A",
            QueryType::Ns => "NS",
            QueryType::Cname => "CNAME",
            QueryType::Soa => "SOA",
            QueryType::Ptr => "PTR",
            QueryType::Mx => "MX",
            QueryType::Txt => "TXT",
            QueryType::Aaaa => "AAAA",
            QueryType::Srv => "SRV",
            QueryType::Rrsig => "RRSIG",
            QueryType::Any => "ANY",
            QueryType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for QueryType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "A" => Ok(QueryType::A),
            "NS" => Ok(QueryType::Ns),
            "CNAME" => Ok(QueryType::Cname),
            "SOA" => Ok(QueryType::Soa),
            "PTR" => Ok(QueryType::Ptr),
            "MX" => Ok(QueryType::Mx),
            "TXT" => Ok(QueryType::Txt),
            "AAAA" => Ok(QueryType::Aaaa),
            "SRV" => Ok(QueryType::Srv),
            "RRSIG" => Ok(QueryType::Rrsig),
            "ANY" => Ok(QueryType::Any),
            other => Err(format!("unrecognized record type mnemonic: {other}")),
        }
    }
}

impl From<u16> for QueryType {
    fn from(num: u16) -> Self {
        match num {
            1 => QueryType::A,
            2 => QueryType::Ns,
            5 => QueryType::Cname,
            6 => QueryType::Soa,
            12 => QueryType::Ptr,
            15 => QueryType::Mx,
            16 => QueryType::Txt,
            28 => QueryType::Aaaa,
            33 => QueryType::Srv,
            46 => QueryType::Rrsig,
            255 => QueryType::Any,
            other => QueryType::Unknown(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: String,
    pub kind: QueryType,
    pub class: DnsClass,
}

impl Question {
    pub fn new(name: String, kind: QueryType) -> Self {
        Self {
            name,
            kind,
            class: DnsClass::In,
        }
    }

    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let mut name = String::new();
        buffer.read_qname(&mut name)?;

        let kind = QueryType::from(buffer.read_u16()?);
        let class = DnsClass::from(buffer.read_u16()?);

        Ok(Self { name, kind, class })
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_qname(&self.name)?;
        buffer.write_u16(self.kind.to_num())?;
        buffer.write_u16(self.class.into())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_question() {
        let question = Question::new("example.com".to_string(), QueryType::A);
        let mut buffer = BytePacketBuffer::default();
        question.write(&mut buffer).unwrap();
        buffer.pos = 0;
        let parsed = Question::read(&mut buffer).unwrap();
        assert_eq!(parsed, question);
    }

    #[test]
    fn parses_mnemonic() {
        assert_eq!("AAAA".parse::<QueryType>().unwrap(), QueryType::Aaaa);
        assert!("BOGUS".parse::<QueryType>().is_err());
    }
}
