use dnsrelay_parser::ResponseCode;
use dnsrelay_resolver::ResolveError;

#[derive(Debug)]
pub enum HandleError {
    Resolve(ResolveError),
    /// No rule in the routing trie matched this question, or the matched
    /// upstream's resolver could not be constructed.
    NoUpstream,
    /// The single-flight retry budget was exhausted without a terminal
    /// cache outcome — only reachable if a leader crashes mid-resolve and
    /// the background sweep hasn't yet reclaimed its entry.
    CacheContention,
}

impl std::fmt::Display for HandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleError::Resolve(err) => write!(f, "resolution failed: {err:?}"),
            HandleError::NoUpstream => write!(f, "no upstream for question"),
            HandleError::CacheContention => write!(f, "single-flight retry budget exhausted"),
        }
    }
}

impl std::error::Error for HandleError {}

impl From<ResolveError> for HandleError {
    fn from(value: ResolveError) -> Self {
        Self::Resolve(value)
    }
}

impl HandleError {
    /// The rcode to send back to the client for this failure, per the
    /// answer-selection rules: upstream protocol rcodes pass through
    /// unchanged, anything this forwarder itself couldn't do maps to
    /// NOTIMP, and transport/io failures map to SERVFAIL.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            HandleError::Resolve(ResolveError::ProtocolRcode(rcode)) => *rcode,
            HandleError::Resolve(ResolveError::Transport(_)) => ResponseCode::ServerFailure,
            HandleError::NoUpstream => ResponseCode::NotImplemented,
            HandleError::CacheContention => ResponseCode::ServerFailure,
        }
    }
}
