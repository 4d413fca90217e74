use dnsrelay_parser::{Question, Record, ResponseCode};

use crate::prelude::{ResolveError, Resolver};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockMode {
    Nodata,
    Nxdomain,
}

impl std::str::FromStr for BlockMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "nodata" => Ok(BlockMode::Nodata),
            "nxdomain" => Ok(BlockMode::Nxdomain),
            other => Err(format!("unknown block mode: {other}")),
        }
    }
}

/// Answers every question with either an empty answer set or NXDOMAIN. Has
/// no per-instance state, so the registry may share a single instance per
/// mode.
#[derive(Debug)]
pub struct Block {
    mode: BlockMode,
}

impl Block {
    pub fn new(mode: BlockMode) -> Self {
        Self { mode }
    }
}

#[async_trait::async_trait]
impl Resolver for Block {
    fn kind(&self) -> &'static str {
        "block"
    }

    async fn resolve(&self, _question: &Question, _dnssec: bool) -> Result<Vec<Record>, ResolveError> {
        match self.mode {
            BlockMode::Nodata => Ok(Vec::new()),
            BlockMode::Nxdomain => Err(ResolveError::ProtocolRcode(ResponseCode::NameError)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnsrelay_parser::QueryType;

    fn question() -> Question {
        Question::new("example.com".to_string(), QueryType::A)
    }

    #[tokio::test]
    async fn nodata_returns_empty_answers() {
        let resolver = Block::new(BlockMode::Nodata);
        let answers = resolver.resolve(&question(), false).await.unwrap();
        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn nxdomain_returns_name_error() {
        let resolver = Block::new(BlockMode::Nxdomain);
        let err = resolver.resolve(&question(), false).await.unwrap_err();
        assert!(matches!(err, ResolveError::ProtocolRcode(ResponseCode::NameError)));
    }
}
