//! Collector readiness gate
//!
//! Resolved exactly once by whoever loads the collector: either opened with
//! the ready value or failed with a reason. Waiters that arrive before
//! resolution are woken when it happens; waiters that arrive later see the
//! result immediately. Later resolutions are ignored.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub enum GateState<T> {
    Pending,
    Ready(T),
    Failed(String),
}

impl<T> GateState<T> {
    fn is_pending(&self) -> bool {
        matches!(self, GateState::Pending)
    }
}

/// Outcome observed by a waiter
#[derive(Debug, Clone)]
pub enum Readiness<T> {
    Ready(T),
    Failed(String),
}

#[derive(Debug)]
pub struct ReadinessGate<T> {
    tx: watch::Sender<GateState<T>>,
}

impl<T: Clone + Send + Sync + 'static> ReadinessGate<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(GateState::Pending);
        Self { tx }
    }

    /// Resolve as ready; returns false if already resolved
    pub fn open(&self, value: T) -> bool {
        self.resolve(GateState::Ready(value))
    }

    /// Resolve as failed; returns false if already resolved
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.resolve(GateState::Failed(reason.into()))
    }

    fn resolve(&self, state: GateState<T>) -> bool {
        let mut next = Some(state);
        self.tx.send_if_modified(|current| {
            if current.is_pending() {
                if let Some(state) = next.take() {
                    *current = state;
                    return true;
                }
            }
            false
        })
    }

    pub fn is_resolved(&self) -> bool {
        !self.tx.borrow().is_pending()
    }

    /// Handle for waiting on the gate
    pub fn waiter(&self) -> GateWaiter<T> {
        GateWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ReadinessGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct GateWaiter<T> {
    rx: watch::Receiver<GateState<T>>,
}

impl<T: Clone> GateWaiter<T> {
    /// Wait until the gate is resolved
    ///
    /// If the gate itself is dropped unresolved, this reports a failure.
    pub async fn wait(mut self) -> Readiness<T> {
        let result = match self.rx.wait_for(|state| !state.is_pending()).await {
            Ok(state) => match &*state {
                GateState::Ready(value) => Readiness::Ready(value.clone()),
                GateState::Failed(reason) => Readiness::Failed(reason.clone()),
                GateState::Pending => Readiness::Failed("gate still pending".to_string()),
            },
            Err(_) => Readiness::Failed("collector loader went away".to_string()),
        };
        result
    }

    /// Current state without waiting
    pub fn peek(&self) -> Option<Readiness<T>> {
        match &*self.rx.borrow() {
            GateState::Pending => None,
            GateState::Ready(value) => Some(Readiness::Ready(value.clone())),
            GateState::Failed(reason) => Some(Readiness::Failed(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_waiter_released_when_opened_later() {
        let gate = ReadinessGate::<u32>::new();
        let waiter = gate.waiter();
        let task = tokio::spawn(waiter.wait());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        assert!(gate.open(7));
        match task.await.unwrap() {
            Readiness::Ready(v) => assert_eq!(v, 7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_late_waiter_sees_result_immediately() {
        let gate = ReadinessGate::<u32>::new();
        gate.open(1);
        assert!(matches!(gate.waiter().wait().await, Readiness::Ready(1)));
    }

    #[tokio::test]
    async fn test_resolves_only_once() {
        let gate = ReadinessGate::<u32>::new();
        assert!(gate.fail("script load failed"));
        assert!(!gate.open(3));
        assert!(!gate.fail("again"));
        match gate.waiter().wait().await {
            Readiness::Failed(reason) => assert_eq!(reason, "script load failed"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_gate_fails_waiters() {
        let gate = ReadinessGate::<u32>::new();
        let waiter = gate.waiter();
        drop(gate);
        assert!(matches!(waiter.wait().await, Readiness::Failed(_)));
    }

    #[test]
    fn test_peek() {
        let gate = ReadinessGate::<&'static str>::new();
        let waiter = gate.waiter();
        assert!(waiter.peek().is_none());
        assert!(!gate.is_resolved());
        gate.open("ok");
        assert!(gate.is_resolved());
        assert!(matches!(waiter.peek(), Some(Readiness::Ready("ok"))));
    }
}
