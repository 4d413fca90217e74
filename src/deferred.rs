use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::Notify;

#[derive(Debug)]
enum State<T, E> {
    Pending,
    Resolved(T),
    Rejected(E),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Resolved(T),
    Rejected(E),
}

/// A one-shot value shared by every concurrent caller waiting on the same
/// cache key. At most one of `resolve`/`reject` ever takes effect; every
/// call after the first terminal transition is a no-op.
#[derive(Debug)]
pub struct Deferred<T, E> {
    state: Mutex<State<T, E>>,
    notify: Notify,
    created_at: Instant,
}

impl<T: Clone, E: Clone> Deferred<T, E> {
    pub fn pending() -> Self {
        Self {
            state: Mutex::new(State::Pending),
            notify: Notify::new(),
            created_at: Instant::now(),
        }
    }

    /// The instant this was created, if it's still pending. Used to evict a
    /// single-flight leader that crashed before ever settling, which would
    /// otherwise wedge every follower in `wait` forever.
    pub fn pending_since(&self) -> Option<Instant> {
        matches!(*self.state.lock().unwrap(), State::Pending).then_some(self.created_at)
    }

    pub fn resolve(&self, value: T) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, State::Pending) {
            *state = State::Resolved(value);
            drop(state);
            self.notify.notify_waiters();
        }
    }

    pub fn reject(&self, error: E) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, State::Pending) {
            *state = State::Rejected(error);
            drop(state);
            self.notify.notify_waiters();
        }
    }

    /// Returns the terminal value if already settled, without blocking.
    pub fn peek(&self) -> Option<Outcome<T, E>> {
        match &*self.state.lock().unwrap() {
            State::Pending => None,
            State::Resolved(value) => Some(Outcome::Resolved(value.clone())),
            State::Rejected(error) => Some(Outcome::Rejected(error.clone())),
        }
    }

    /// Blocks cooperatively until a terminal state is reached, then returns
    /// an owned copy of it. Safe to call from any number of concurrent
    /// tasks; every call after the transition returns immediately.
    pub async fn wait(&self) -> Outcome<T, E> {
        loop {
            let notified = self.notify.notified();
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn resolve_unblocks_every_waiter_with_the_same_value() {
        let deferred = Arc::new(Deferred::<u32, u8>::pending());

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let deferred = deferred.clone();
            waiters.push(tokio::spawn(async move { deferred.wait().await }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        deferred.resolve(42);

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Outcome::Resolved(42));
        }
    }

    #[tokio::test]
    async fn second_transition_is_a_no_op() {
        let deferred = Deferred::<u32, u8>::pending();
        deferred.resolve(1);
        deferred.reject(9);
        assert_eq!(deferred.peek(), Some(Outcome::Resolved(1)));
    }

    #[tokio::test]
    async fn reject_delivers_the_error_to_waiters() {
        let deferred = Deferred::<u32, u8>::pending();
        deferred.reject(7);
        assert_eq!(deferred.wait().await, Outcome::Rejected(7));
    }
}
