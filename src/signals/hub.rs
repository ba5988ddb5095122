//! In-process cross-context channel.

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{ChangeSignal, SignalChannel};

/// A broadcast channel shared by several contexts in one process.
///
/// Clone it into each context, the way tabs of one origin share a named
/// broadcast channel.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<ChangeSignal>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Contexts currently listening.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl SignalChannel for BroadcastHub {
    async fn post(&self, signal: ChangeSignal) -> Result<()> {
        // Nobody listening is not an error.
        let _ = self.tx.send(signal);
        Ok(())
    }

    fn listen(&self) -> broadcast::Receiver<ChangeSignal> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::ContextId;

    #[tokio::test]
    async fn test_every_listener_receives() {
        let hub = BroadcastHub::default();
        let mut a = hub.listen();
        let mut b = hub.clone().listen();
        assert_eq!(hub.listener_count(), 2);

        let signal = ChangeSignal {
            origin: ContextId::generate(),
            key: "contacts".into(),
            seq: 1,
        };
        hub.post(signal.clone()).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), signal);
        assert_eq!(b.recv().await.unwrap(), signal);
    }
}
