use dnsrelay_parser::{Question, Record, ResponseCode};

/// Outcome of a failed upstream resolution attempt.
#[derive(Debug)]
pub enum ResolveError {
    /// The upstream answered, but with a non-zero response code (NXDOMAIN,
    /// SERVFAIL, REFUSED, ...).
    ProtocolRcode(ResponseCode),
    /// The upstream could not be reached, or its reply could not be
    /// understood (socket error, malformed JSON, unparseable record).
    Transport(std::io::Error),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::ProtocolRcode(code) => write!(f, "upstream returned rcode {code:?}"),
            ResolveError::Transport(err) => write!(f, "upstream transport error: {err}"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<std::io::Error> for ResolveError {
    fn from(value: std::io::Error) -> Self {
        ResolveError::Transport(value)
    }
}

/// An upstream capable of answering a single question. Implementations own
/// whatever per-endpoint state is cheaper to build once (a socket, an HTTP
/// client) and are shared behind the registry as `Arc<dyn Resolver>`.
#[async_trait::async_trait]
pub trait Resolver: std::fmt::Debug + Send + Sync {
    /// Short tag identifying the resolver kind, used only for logging.
    fn kind(&self) -> &'static str;

    async fn resolve(&self, question: &Question, dnssec: bool) -> Result<Vec<Record>, ResolveError>;
}
