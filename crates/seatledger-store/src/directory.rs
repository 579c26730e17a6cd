//! Read-only views of the identity and catalog collaborators.

use std::collections::HashMap;

use async_trait::async_trait;
use seatledger_types::{EventId, ExternalResult, IdentityProof, UserId, WalletAddress};
use tokio::sync::RwLock;

/// Buyer facts owned by the identity collaborator.
#[async_trait]
pub trait BuyerDirectory: Send + Sync {
    /// Registered ledger wallet of `buyer`.
    async fn wallet_of(&self, buyer: UserId) -> ExternalResult<Option<WalletAddress>>;

    /// Name printed on the ticket document.
    async fn display_name(&self, buyer: UserId) -> ExternalResult<Option<String>>;

    /// Latest identity proof on file for `buyer`.
    async fn identity_proof(&self, buyer: UserId) -> ExternalResult<Option<IdentityProof>>;
}

/// Event facts owned by the catalog collaborator.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn event_title(&self, event_id: EventId) -> ExternalResult<Option<String>>;
}

/// One buyer's directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyerProfile {
    pub wallet: WalletAddress,
    pub display_name: String,
    pub identity_proof: Option<IdentityProof>,
}

/// In-memory [`BuyerDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryBuyerDirectory {
    profiles: RwLock<HashMap<UserId, BuyerProfile>>,
}

impl InMemoryBuyerDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a buyer's wallet and name. Any proof on file is kept.
    pub async fn register(
        &self,
        buyer: UserId,
        wallet: WalletAddress,
        display_name: impl Into<String>,
    ) {
        let display_name = display_name.into();
        let mut profiles = self.profiles.write().await;
        match profiles.get_mut(&buyer) {
            Some(profile) => {
                profile.wallet = wallet;
                profile.display_name = display_name;
            }
            None => {
                profiles.insert(
                    buyer,
                    BuyerProfile {
                        wallet,
                        display_name,
                        identity_proof: None,
                    },
                );
            }
        }
    }

    /// Attach an identity proof. Returns `false` if the buyer is unknown.
    pub async fn set_identity_proof(&self, proof: IdentityProof) -> bool {
        let mut profiles = self.profiles.write().await;
        match profiles.get_mut(&proof.buyer_id) {
            Some(profile) => {
                profile.identity_proof = Some(proof);
                true
            }
            None => false,
        }
    }

    pub async fn clear_identity_proof(&self, buyer: UserId) {
        if let Some(profile) = self.profiles.write().await.get_mut(&buyer) {
            profile.identity_proof = None;
        }
    }

    pub async fn profile(&self, buyer: UserId) -> Option<BuyerProfile> {
        self.profiles.read().await.get(&buyer).cloned()
    }
}

#[async_trait]
impl BuyerDirectory for InMemoryBuyerDirectory {
    async fn wallet_of(&self, buyer: UserId) -> ExternalResult<Option<WalletAddress>> {
        Ok(self.profiles.read().await.get(&buyer).map(|p| p.wallet.clone()))
    }

    async fn display_name(&self, buyer: UserId) -> ExternalResult<Option<String>> {
        Ok(self
            .profiles
            .read()
            .await
            .get(&buyer)
            .map(|p| p.display_name.clone()))
    }

    async fn identity_proof(&self, buyer: UserId) -> ExternalResult<Option<IdentityProof>> {
        Ok(self
            .profiles
            .read()
            .await
            .get(&buyer)
            .and_then(|p| p.identity_proof.clone()))
    }
}

/// In-memory [`EventCatalog`].
#[derive(Debug, Default)]
pub struct InMemoryEventCatalog {
    titles: RwLock<HashMap<EventId, String>>,
}

impl InMemoryEventCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_event(&self, event_id: EventId, title: impl Into<String>) {
        self.titles.write().await.insert(event_id, title.into());
    }
}

#[async_trait]
impl EventCatalog for InMemoryEventCatalog {
    async fn event_title(&self, event_id: EventId) -> ExternalResult<Option<String>> {
        Ok(self.titles.read().await.get(&event_id).cloned())
    }
}
