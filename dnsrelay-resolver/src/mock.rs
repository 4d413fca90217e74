use std::collections::HashMap;
use std::sync::Mutex;

use dnsrelay_parser::{QueryType, Record};

use crate::prelude::{ResolveError, Resolver};

/// A scriptable resolver for tests: pre-program an answer or error per
/// `(name, qtype)` and count invocations to assert single-flight behavior.
#[derive(Debug)]
pub struct MockResolver {
    identifier: String,
    responses: HashMap<(String, QueryType), Vec<Record>>,
    calls: Mutex<usize>,
}

impl MockResolver {
    pub fn new<I: Into<String>>(identifier: I) -> Self {
        Self {
            identifier: identifier.into(),
            responses: HashMap::new(),
            calls: Mutex::new(0),
        }
    }

    pub fn with_answer(mut self, name: &str, kind: QueryType, answers: Vec<Record>) -> Self {
        self.responses.insert((name.to_string(), kind), answers);
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Resolver for MockResolver {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn resolve(
        &self,
        question: &dnsrelay_parser::Question,
        _dnssec: bool,
    ) -> Result<Vec<Record>, ResolveError> {
        *self.calls.lock().unwrap() += 1;
        match self.responses.get(&(question.name.clone(), question.kind)) {
            Some(found) => Ok(found.clone()),
            None => Err(ResolveError::ProtocolRcode(
                dnsrelay_parser::ResponseCode::NameError,
            )),
        }
    }
}
