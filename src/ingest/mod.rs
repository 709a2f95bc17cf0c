//! Shared collaborators handed to every watch: the ingest sink and the
//! system registry.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::call::Call;
use crate::error::IngestError;

/// Registry of known radio systems, keyed by human label.
///
/// Fresh ids handed out by [`SystemRegistry::new_system_id`] are monotonic
/// and never reused. Allocation does not register the label; recording the
/// system is the downstream consumer's job once the call carries its label
/// hint.
#[derive(Debug, Default)]
pub struct SystemRegistry {
    inner: Mutex<SystemsInner>,
}

#[derive(Debug)]
struct SystemsInner {
    labels: HashMap<String, u32>,
    next_id: u32,
}

impl Default for SystemsInner {
    fn default() -> Self {
        Self {
            labels: HashMap::new(),
            next_id: 1,
        }
    }
}

impl SystemRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a system id by label.
    #[must_use]
    pub fn get_system(&self, label: &str) -> Option<u32> {
        self.inner.lock().labels.get(label).copied()
    }

    /// Allocate a fresh system id.
    pub fn new_system_id(&self) -> u32 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// Record a known system label.
    pub fn insert(&self, label: impl Into<String>, id: u32) {
        let mut inner = self.inner.lock();
        inner.labels.insert(label.into(), id);
        inner.next_id = inner.next_id.max(id + 1);
    }
}

/// The fan-in side of the ingest pipeline.
///
/// Watches enqueue validated calls here; the archival/broadcast layer drains
/// the paired receiver.
#[derive(Debug)]
pub struct Ingestor {
    tx: mpsc::UnboundedSender<Call>,
    /// Label lookup consulted by the mask parser and the sdr-trunk dialect.
    pub systems: SystemRegistry,
}

impl Ingestor {
    /// Create the ingest sink, returning the shared handle and the receiver
    /// the downstream pipeline drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Call>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                systems: SystemRegistry::new(),
            },
            rx,
        )
    }

    /// Move a validated call into the sink.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ChannelClosed`] when the receiver is gone.
    pub fn enqueue(&self, call: Call) -> std::result::Result<(), IngestError> {
        self.tx.send(call).map_err(|_| IngestError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_system_ids_are_monotonic() {
        let systems = SystemRegistry::new();
        let a = systems.new_system_id();
        let b = systems.new_system_id();
        assert!(b > a);
    }

    #[test]
    fn test_insert_and_lookup() {
        let systems = SystemRegistry::new();
        systems.insert("County TRS", 7);
        assert_eq!(systems.get_system("County TRS"), Some(7));
        assert_eq!(systems.get_system("Unknown"), None);
    }

    #[test]
    fn test_insert_raises_next_id() {
        let systems = SystemRegistry::new();
        systems.insert("County TRS", 40);
        assert!(systems.new_system_id() > 40);
    }

    #[tokio::test]
    async fn test_enqueue_delivers_call() {
        let (ingestor, mut rx) = Ingestor::new();
        let mut call = Call::new();
        call.audio_name = "tone.wav".to_string();
        ingestor.enqueue(call).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.audio_name, "tone.wav");
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let (ingestor, rx) = Ingestor::new();
        drop(rx);
        let err = ingestor.enqueue(Call::new()).unwrap_err();
        assert!(matches!(err, IngestError::ChannelClosed));
    }
}
