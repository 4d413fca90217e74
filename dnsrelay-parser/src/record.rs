use std::net::{Ipv4Addr, Ipv6Addr};

use crate::buffer::{BytePacketBuffer, ReaderError, WriterError};
use crate::question::QueryType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: u32,
    },
    Aaaa {
        domain: String,
        addr: Ipv6Addr,
        ttl: u32,
    },
    Ns {
        domain: String,
        host: String,
        ttl: u32,
    },
    Cname {
        domain: String,
        host: String,
        ttl: u32,
    },
    Mx {
        domain: String,
        priority: u16,
        host: String,
        ttl: u32,
    },
    Soa {
        domain: String,
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
        ttl: u32,
    },
    Txt {
        domain: String,
        data: Vec<String>,
        ttl: u32,
    },
    Srv {
        domain: String,
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
        ttl: u32,
    },
    /// A record type we don't interpret (e.g. RRSIG, CAA). The raw RDATA is
    /// kept verbatim so the record can still be relayed unmodified.
    Other {
        domain: String,
        qtype: u16,
        ttl: u32,
        data: Vec<u8>,
    },
    /// The EDNS0 pseudo-record (type 41), carried in the resources section
    /// rather than the answer section. `class` and `ttl` are repurposed by
    /// the OPT RR to carry the requestor's UDP payload size and the
    /// extended rcode/version/DO-bit flags.
    Opt {
        udp_payload_size: u16,
        extended_rcode: u8,
        version: u8,
        dnssec_ok: bool,
        data: Vec<u8>,
    },
}

impl Record {
    pub fn domain(&self) -> &str {
        match self {
            Record::A { domain, .. }
            | Record::Aaaa { domain, .. }
            | Record::Ns { domain, .. }
            | Record::Cname { domain, .. }
            | Record::Mx { domain, .. }
            | Record::Soa { domain, .. }
            | Record::Txt { domain, .. }
            | Record::Srv { domain, .. }
            | Record::Other { domain, .. } => domain,
            Record::Opt { .. } => "",
        }
    }

    pub fn query_type(&self) -> QueryType {
        match self {
            Record::A { .. } => QueryType::A,
            Record::Aaaa { .. } => QueryType::Aaaa,
            Record::Ns { .. } => QueryType::Ns,
            Record::Cname { .. } => QueryType::Cname,
            Record::Mx { .. } => QueryType::Mx,
            Record::Soa { .. } => QueryType::Soa,
            Record::Txt { .. } => QueryType::Txt,
            Record::Srv { .. } => QueryType::Srv,
            Record::Other { qtype, .. } => QueryType::from(*qtype),
            Record::Opt { .. } => QueryType::Unknown(41),
        }
    }

    pub fn ttl(&self) -> u32 {
        match self {
            Record::A { ttl, .. }
            | Record::Aaaa { ttl, .. }
            | Record::Ns { ttl, .. }
            | Record::Cname { ttl, .. }
            | Record::Mx { ttl, .. }
            | Record::Soa { ttl, .. }
            | Record::Txt { ttl, .. }
            | Record::Srv { ttl, .. }
            | Record::Other { ttl, .. } => *ttl,
            Record::Opt { .. } => 0,
        }
    }

    /// Returns a copy of this record with its TTL header rewritten. Used by
    /// the cache to present the remaining time-to-live on a stored answer.
    /// Never called on an `Opt` record: EDNS0 pseudo-records live in the
    /// resources section, not the cached answer set.
    pub fn with_ttl(&self, ttl: u32) -> Self {
        let mut clone = self.clone();
        match &mut clone {
            Record::A { ttl: t, .. }
            | Record::Aaaa { ttl: t, .. }
            | Record::Ns { ttl: t, .. }
            | Record::Cname { ttl: t, .. }
            | Record::Mx { ttl: t, .. }
            | Record::Soa { ttl: t, .. }
            | Record::Txt { ttl: t, .. }
            | Record::Srv { ttl: t, .. }
            | Record::Other { ttl: t, .. } => *t = ttl,
            Record::Opt { .. } => {}
        }
        clone
    }

    pub fn is_opt(&self) -> bool {
        matches!(self, Record::Opt { .. })
    }

    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let mut domain = String::new();
        buffer.read_qname(&mut domain)?;

        let qtype_num = buffer.read_u16()?;

        // The OPT pseudo-record (EDNS0) repurposes the class/ttl fields to
        // carry the UDP payload size and the extended rcode/version/DO bit,
        // so it can't go through the generic qtype dispatch below.
        const OPT_TYPE: u16 = 41;
        if qtype_num == OPT_TYPE {
            let udp_payload_size = buffer.read_u16()?;
            let ttl_word = buffer.read_u32()?;
            let data_len = buffer.read_u16()? as usize;
            let data = buffer.read_bytes(data_len)?;
            return Ok(Record::Opt {
                udp_payload_size,
                extended_rcode: ((ttl_word >> 24) & 0xFF) as u8,
                version: ((ttl_word >> 16) & 0xFF) as u8,
                dnssec_ok: (ttl_word & 0x0000_8000) != 0,
                data,
            });
        }

        let qtype = QueryType::from(qtype_num);
        let _class = buffer.read_u16()?;
        let ttl = buffer.read_u32()?;
        let data_len = buffer.read_u16()? as usize;

        match qtype {
            QueryType::A => {
                let raw = buffer.read_u32()?;
                let addr = Ipv4Addr::new(
                    ((raw >> 24) & 0xFF) as u8,
                    ((raw >> 16) & 0xFF) as u8,
                    ((raw >> 8) & 0xFF) as u8,
                    (raw & 0xFF) as u8,
                );
                Ok(Record::A { domain, addr, ttl })
            }
            QueryType::Aaaa => {
                let raw = buffer.read_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&raw);
                Ok(Record::Aaaa {
                    domain,
                    addr: Ipv6Addr::from(octets),
                    ttl,
                })
            }
            QueryType::Ns => {
                let mut host = String::new();
                buffer.read_qname(&mut host)?;
                Ok(Record::Ns { domain, host, ttl })
            }
            QueryType::Cname => {
                let mut host = String::new();
                buffer.read_qname(&mut host)?;
                Ok(Record::Cname { domain, host, ttl })
            }
            QueryType::Mx => {
                let priority = buffer.read_u16()?;
                let mut host = String::new();
                buffer.read_qname(&mut host)?;
                Ok(Record::Mx {
                    domain,
                    priority,
                    host,
                    ttl,
                })
            }
            QueryType::Soa => {
                let mut mname = String::new();
                buffer.read_qname(&mut mname)?;
                let mut rname = String::new();
                buffer.read_qname(&mut rname)?;
                let serial = buffer.read_u32()?;
                let refresh = buffer.read_u32()?;
                let retry = buffer.read_u32()?;
                let expire = buffer.read_u32()?;
                let minimum = buffer.read_u32()?;
                Ok(Record::Soa {
                    domain,
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                    ttl,
                })
            }
            QueryType::Txt => {
                let start = buffer.pos();
                let mut data = Vec::new();
                while buffer.pos() - start < data_len {
                    let len = buffer.read_u8_checked()? as usize;
                    let bytes = buffer.read_bytes(len)?;
                    data.push(String::from_utf8_lossy(&bytes).to_string());
                }
                Ok(Record::Txt { domain, data, ttl })
            }
            QueryType::Srv => {
                let priority = buffer.read_u16()?;
                let weight = buffer.read_u16()?;
                let port = buffer.read_u16()?;
                let mut target = String::new();
                buffer.read_qname(&mut target)?;
                Ok(Record::Srv {
                    domain,
                    priority,
                    weight,
                    port,
                    target,
                    ttl,
                })
            }
            QueryType::Ptr | QueryType::Rrsig | QueryType::Any | QueryType::Unknown(_) => {
                let data = buffer.read_bytes(data_len)?;
                Ok(Record::Other {
                    domain,
                    qtype: qtype_num,
                    ttl,
                    data,
                })
            }
        }
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        if let Record::Opt {
            udp_payload_size,
            extended_rcode,
            version,
            dnssec_ok,
            data,
        } = self
        {
            buffer.write_u8(0)?; // root name
            buffer.write_u16(41)?; // OPT
            buffer.write_u16(*udp_payload_size)?;
            let flags: u32 = if *dnssec_ok { 0x0000_8000 } else { 0 };
            let ttl_word = ((*extended_rcode as u32) << 24) | ((*version as u32) << 16) | flags;
            buffer.write_u32(ttl_word)?;
            buffer.write_u16(data.len() as u16)?;
            buffer.write_bytes(data)?;
            return Ok(());
        }

        let start_pos = buffer.pos();

        buffer.write_qname(self.domain())?;
        buffer.write_u16(self.query_type().to_num())?;
        buffer.write_u16(1)?; // IN
        buffer.write_u32(self.ttl())?;

        // placeholder for RDLENGTH, patched below
        let len_pos = buffer.pos();
        buffer.write_u16(0)?;

        match self {
            Record::A { addr, .. } => {
                for octet in addr.octets() {
                    buffer.write_u8(octet)?;
                }
            }
            Record::Aaaa { addr, .. } => {
                buffer.write_bytes(&addr.octets())?;
            }
            Record::Ns { host, .. } | Record::Cname { host, .. } => {
                buffer.write_qname(host)?;
            }
            Record::Mx { priority, host, .. } => {
                buffer.write_u16(*priority)?;
                buffer.write_qname(host)?;
            }
            Record::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
                ..
            } => {
                buffer.write_qname(mname)?;
                buffer.write_qname(rname)?;
                buffer.write_u32(*serial)?;
                buffer.write_u32(*refresh)?;
                buffer.write_u32(*retry)?;
                buffer.write_u32(*expire)?;
                buffer.write_u32(*minimum)?;
            }
            Record::Txt { data, .. } => {
                for entry in data {
                    let bytes = entry.as_bytes();
                    let len = bytes.len().min(0xFF);
                    buffer.write_u8(len as u8)?;
                    buffer.write_bytes(&bytes[..len])?;
                }
            }
            Record::Srv {
                priority,
                weight,
                port,
                target,
                ..
            } => {
                buffer.write_u16(*priority)?;
                buffer.write_u16(*weight)?;
                buffer.write_u16(*port)?;
                buffer.write_qname(target)?;
            }
            Record::Other { data, .. } => {
                buffer.write_bytes(data)?;
            }
        }

        let end_pos = buffer.pos();
        let rdlength = (end_pos - len_pos - 2) as u16;
        buffer.set_u16(len_pos, rdlength)?;

        let _ = start_pos;
        Ok(())
    }
}
