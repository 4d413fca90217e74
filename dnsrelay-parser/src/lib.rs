pub mod buffer;
pub mod header;
pub mod packet;
pub mod question;
pub mod record;

pub use buffer::{BytePacketBuffer, ReaderError, WriterError};
pub use header::{Header, ResponseCode};
pub use packet::DnsPacket;
pub use question::{DnsClass, QueryType, Question};
pub use record::Record;
