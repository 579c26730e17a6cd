//! Metadata publisher boundary and an in-memory object store.
//!
//! Documents are addressed by the SHA-256 of their canonical JSON, so
//! republishing the same document yields the same URI and is harmless.

use std::collections::HashMap;
#[cfg(any(test, feature = "test-helpers"))]
use std::sync::atomic::AtomicU32;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use seatledger_types::{ExternalError, ExternalResult, TicketMetadata};
use tokio::sync::RwLock;
use tracing::debug;

/// Stores ticket documents at retrievable URIs.
#[async_trait]
pub trait MetadataPublisher: Send + Sync {
    /// Store `document` and return its URI.
    async fn publish(&self, document: &TicketMetadata) -> ExternalResult<String>;

    /// Remove a previously published document. Best-effort, compensation only.
    async fn delete(&self, uri: &str) -> ExternalResult<()>;
}

/// In-memory [`MetadataPublisher`] keyed by URI.
#[derive(Debug)]
pub struct InMemoryMetadataPublisher {
    base_uri: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    deletes: AtomicUsize,
    #[cfg(any(test, feature = "test-helpers"))]
    failing_publishes: AtomicU32,
    #[cfg(any(test, feature = "test-helpers"))]
    failing_deletes: AtomicU32,
}

impl InMemoryMetadataPublisher {
    #[must_use]
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
            deletes: AtomicUsize::new(0),
            #[cfg(any(test, feature = "test-helpers"))]
            failing_publishes: AtomicU32::new(0),
            #[cfg(any(test, feature = "test-helpers"))]
            failing_deletes: AtomicU32::new(0),
        }
    }

    /// URI a document would be published under.
    pub fn uri_for(&self, document: &TicketMetadata) -> ExternalResult<String> {
        let hash = document
            .content_hash_hex()
            .map_err(|e| ExternalError::permanent(e.to_string()))?;
        Ok(format!("{}/tickets/{hash}.json", self.base_uri))
    }

    pub async fn contains(&self, uri: &str) -> bool {
        self.objects.read().await.contains_key(uri)
    }

    /// Stored document bytes.
    pub async fn fetch(&self, uri: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(uri).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Number of `delete` calls received, successful or not.
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Fail the next `n` publishes with a transient error.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn fail_next_publishes(&self, n: u32) {
        self.failing_publishes.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` deletes with a transient error.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn fail_next_deletes(&self, n: u32) {
        self.failing_deletes.store(n, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "test-helpers"))]
    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MetadataPublisher for InMemoryMetadataPublisher {
    async fn publish(&self, document: &TicketMetadata) -> ExternalResult<String> {
        #[cfg(any(test, feature = "test-helpers"))]
        if Self::take_fault(&self.failing_publishes) {
            return Err(ExternalError::transient("object store unavailable"));
        }

        let uri = self.uri_for(document)?;
        let bytes = document
            .to_canonical_json()
            .map_err(|e| ExternalError::permanent(e.to_string()))?;
        self.objects.write().await.insert(uri.clone(), bytes);
        debug!(%uri, "Metadata published");
        Ok(uri)
    }

    async fn delete(&self, uri: &str) -> ExternalResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);

        #[cfg(any(test, feature = "test-helpers"))]
        if Self::take_fault(&self.failing_deletes) {
            return Err(ExternalError::transient("object store unavailable"));
        }

        if self.objects.write().await.remove(uri).is_some() {
            debug!(%uri, "Metadata deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use seatledger_types::{SeatId, WalletAddress};

    use super::*;

    fn doc() -> TicketMetadata {
        TicketMetadata::for_ticket(
            "Midnight Echoes",
            &SeatId::new("A-01"),
            "Ada",
            &WalletAddress::derived_from(b"ada"),
            Decimal::new(50, 0),
        )
    }

    #[tokio::test]
    async fn publish_is_content_addressed() {
        let publisher = InMemoryMetadataPublisher::new("mem://seatledger/");
        let uri = publisher.publish(&doc()).await.unwrap();
        assert!(uri.starts_with("mem://seatledger/tickets/"));
        assert!(uri.ends_with(".json"));
        assert_eq!(publisher.publish(&doc()).await.unwrap(), uri);
        assert_eq!(publisher.len().await, 1);

        let stored = publisher.fetch(&uri).await.unwrap();
        let back: TicketMetadata = serde_json::from_slice(&stored).unwrap();
        assert_eq!(back, doc());
    }

    #[tokio::test]
    async fn delete_removes_and_counts() {
        let publisher = InMemoryMetadataPublisher::new("mem://x");
        let uri = publisher.publish(&doc()).await.unwrap();
        publisher.delete(&uri).await.unwrap();
        assert!(!publisher.contains(&uri).await);
        // Deleting again is harmless.
        publisher.delete(&uri).await.unwrap();
        assert_eq!(publisher.delete_calls(), 2);
    }

    #[tokio::test]
    async fn injected_faults_consume() {
        let publisher = InMemoryMetadataPublisher::new("mem://x");
        publisher.fail_next_publishes(2);
        assert!(publisher.publish(&doc()).await.unwrap_err().retryable);
        assert!(publisher.publish(&doc()).await.is_err());
        assert!(publisher.publish(&doc()).await.is_ok());

        publisher.fail_next_deletes(1);
        let uri = publisher.uri_for(&doc()).unwrap();
        assert!(publisher.delete(&uri).await.is_err());
        assert!(publisher.contains(&uri).await);
    }
}
