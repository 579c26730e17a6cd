//! In-process soulbound ticket ledger.
//!
//! Models the contract the engine talks to:
//!
//! - tokens are numbered sequentially from 1 and never transfer
//! - one mint per (wallet, event) while the ticket is live
//! - a platform fee in basis points is deducted from every mint price
//! - cancellation returns `reopen_at = now + cooling_off (+ jitter)`
//! - a reopen acknowledgement is accepted only once `reopen_at` has passed;
//!   the token stays cancelled afterwards and the wallet may mint again
//! - admission (`mark_used`) reverts on used or cancelled tokens
//!
//! Every write returns a transaction hash derived from a per-ledger
//! sequence number.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use seatledger_types::{
    Clock, EventId, ExternalError, ExternalResult, LedgerSimConfig, LedgerTicketView,
    LedgerTokenId, MintReceipt, MintRequest, SeatId, TxHash, WalletAddress, constants,
};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::LedgerClient;

#[derive(Debug, Clone)]
struct TokenRecord {
    owner: WalletAddress,
    event_id: EventId,
    seat_id: SeatId,
    metadata_uri: String,
    net_price: Decimal,
    issued_at: i64,
    is_used: bool,
    identity_proof: Option<[u8; 32]>,
    is_cancelled: bool,
    reopen_at: Option<i64>,
    reopened: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    tokens: BTreeMap<LedgerTokenId, TokenRecord>,
    live_mints: HashSet<(WalletAddress, EventId)>,
    last_token: u64,
    tx_seq: u64,
    fees_collected: Decimal,
}

impl LedgerState {
    fn next_tx(&mut self, op: &str, token: LedgerTokenId) -> TxHash {
        self.tx_seq += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.tx_seq.to_le_bytes());
        hasher.update(op.as_bytes());
        hasher.update(token.0.to_le_bytes());
        TxHash::from_digest(&hasher.finalize())
    }

    fn token_mut(&mut self, token: LedgerTokenId) -> ExternalResult<&mut TokenRecord> {
        self.tokens
            .get_mut(&token)
            .ok_or_else(|| ExternalError::permanent(format!("revert: {token} does not exist")))
    }
}

/// Ledger call kinds, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    Mint,
    Read,
    MarkCancelled,
    AcknowledgeReopen,
    MarkUsed,
    RegisterIdentityProof,
}

#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
struct Faults {
    once: std::collections::HashMap<LedgerOp, std::collections::VecDeque<ExternalError>>,
    poisoned: std::collections::HashMap<LedgerTokenId, ExternalError>,
}

/// Simulated ticket contract.
pub struct SimulatedLedger {
    config: LedgerSimConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
    #[cfg(any(test, feature = "test-helpers"))]
    faults: Mutex<Faults>,
}

impl SimulatedLedger {
    #[must_use]
    pub fn new(config: LedgerSimConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(LedgerState::default()),
            #[cfg(any(test, feature = "test-helpers"))]
            faults: Mutex::new(Faults::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &LedgerSimConfig {
        &self.config
    }

    /// Total platform fees deducted so far.
    pub async fn fees_collected(&self) -> Decimal {
        self.state.lock().await.fees_collected
    }

    pub async fn token_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    /// Price recorded on the ledger for `token`, net of the platform fee.
    pub async fn net_price(&self, token: LedgerTokenId) -> Option<Decimal> {
        self.state
            .lock()
            .await
            .tokens
            .get(&token)
            .map(|t| t.net_price)
    }

    fn platform_fee(&self, price: Decimal) -> Decimal {
        price * Decimal::from(self.config.platform_fee_bps)
            / Decimal::from(constants::BPS_DENOMINATOR)
    }

    fn cooling_off(&self) -> i64 {
        let jitter = if self.config.cooling_off_jitter_secs > 0 {
            rand::thread_rng().gen_range(0..self.config.cooling_off_jitter_secs)
        } else {
            0
        };
        self.config.cooling_off_secs + jitter
    }

    #[cfg(any(test, feature = "test-helpers"))]
    async fn injected(&self, op: LedgerOp, token: Option<LedgerTokenId>) -> ExternalResult<()> {
        let mut faults = self.faults.lock().await;
        if let Some(err) = token.and_then(|t| faults.poisoned.get(&t)) {
            if op != LedgerOp::Read {
                return Err(err.clone());
            }
        }
        match faults.once.get_mut(&op).and_then(std::collections::VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[cfg(not(any(test, feature = "test-helpers")))]
    #[allow(clippy::unused_async, clippy::unused_self)]
    async fn injected(&self, _op: LedgerOp, _token: Option<LedgerTokenId>) -> ExternalResult<()> {
        Ok(())
    }
}

/// Fault injection and state forcing for tests.
#[cfg(any(test, feature = "test-helpers"))]
impl SimulatedLedger {
    /// Fail the next call of kind `op` with `err`.
    pub async fn inject_failure(&self, op: LedgerOp, err: ExternalError) {
        self.faults
            .lock()
            .await
            .once
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Fail every write touching `token` until faults are cleared.
    pub async fn poison_token(&self, token: LedgerTokenId, err: ExternalError) {
        self.faults.lock().await.poisoned.insert(token, err);
    }

    pub async fn clear_faults(&self) {
        *self.faults.lock().await = Faults::default();
    }

    pub async fn force_owner(&self, token: LedgerTokenId, owner: WalletAddress) {
        if let Some(t) = self.state.lock().await.tokens.get_mut(&token) {
            t.owner = owner;
        }
    }

    pub async fn force_used(&self, token: LedgerTokenId, used: bool) {
        if let Some(t) = self.state.lock().await.tokens.get_mut(&token) {
            t.is_used = used;
        }
    }

    pub async fn force_cancelled(&self, token: LedgerTokenId, cancelled: bool) {
        if let Some(t) = self.state.lock().await.tokens.get_mut(&token) {
            t.is_cancelled = cancelled;
        }
    }

    pub async fn force_identity_proof(&self, token: LedgerTokenId, proof: Option<[u8; 32]>) {
        if let Some(t) = self.state.lock().await.tokens.get_mut(&token) {
            t.identity_proof = proof;
        }
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn mint(&self, request: &MintRequest) -> ExternalResult<MintReceipt> {
        self.injected(LedgerOp::Mint, None).await?;
        if request.price <= Decimal::ZERO {
            return Err(ExternalError::permanent("revert: price must be positive"));
        }

        let now = self.clock.now_epoch_secs();
        let fee = self.platform_fee(request.price);
        let mut state = self.state.lock().await;
        let slot = (request.owner.clone(), request.event_id);
        if state.live_mints.contains(&slot) {
            return Err(ExternalError::permanent(format!(
                "revert: {} already minted for event {}",
                request.owner, request.event_id
            )));
        }

        state.last_token += 1;
        let token_id = LedgerTokenId(state.last_token);
        state.tokens.insert(
            token_id,
            TokenRecord {
                owner: request.owner.clone(),
                event_id: request.event_id,
                seat_id: request.seat_id.clone(),
                metadata_uri: request.metadata_uri.clone(),
                net_price: request.price - fee,
                issued_at: now,
                is_used: false,
                identity_proof: None,
                is_cancelled: false,
                reopen_at: None,
                reopened: false,
            },
        );
        state.live_mints.insert(slot);
        state.fees_collected += fee;
        let tx_hash = state.next_tx("mint", token_id);

        info!(
            %token_id,
            owner = %request.owner.short(),
            event_id = %request.event_id,
            seat_id = %request.seat_id,
            uri = %request.metadata_uri,
            %fee,
            "Ticket minted on ledger"
        );
        Ok(MintReceipt { tx_hash, token_id })
    }

    async fn owner_of(&self, token: LedgerTokenId) -> ExternalResult<WalletAddress> {
        self.injected(LedgerOp::Read, Some(token)).await?;
        self.state
            .lock()
            .await
            .tokens
            .get(&token)
            .map(|t| t.owner.clone())
            .ok_or_else(|| ExternalError::permanent(format!("revert: {token} does not exist")))
    }

    async fn ticket_view(&self, token: LedgerTokenId) -> ExternalResult<LedgerTicketView> {
        self.injected(LedgerOp::Read, Some(token)).await?;
        let state = self.state.lock().await;
        Ok(match state.tokens.get(&token) {
            Some(t) => LedgerTicketView {
                owner: t.owner.clone(),
                is_used: t.is_used,
                is_face_verified: t.identity_proof.is_some(),
                is_cancelled: t.is_cancelled,
                reopen_at: t.reopen_at,
                issued_at: t.issued_at,
            },
            None => LedgerTicketView {
                owner: WalletAddress::new(format!("0x{}", "0".repeat(40))),
                is_used: false,
                is_face_verified: false,
                is_cancelled: false,
                reopen_at: None,
                issued_at: 0,
            },
        })
    }

    async fn mark_cancelled(&self, token: LedgerTokenId) -> ExternalResult<i64> {
        self.injected(LedgerOp::MarkCancelled, Some(token)).await?;
        let reopen_at = self.clock.now_epoch_secs() + self.cooling_off();
        let mut state = self.state.lock().await;
        let record = state.token_mut(token)?;
        if record.is_used {
            return Err(ExternalError::permanent(format!(
                "revert: {token} already used"
            )));
        }
        if record.is_cancelled {
            return Err(ExternalError::permanent(format!(
                "revert: {token} already cancelled"
            )));
        }
        record.is_cancelled = true;
        record.reopen_at = Some(reopen_at);
        let seat_id = record.seat_id.clone();
        state.next_tx("cancel", token);
        info!(%token, %seat_id, reopen_at, "Ticket cancelled on ledger");
        Ok(reopen_at)
    }

    async fn acknowledge_reopen(&self, token: LedgerTokenId) -> ExternalResult<TxHash> {
        self.injected(LedgerOp::AcknowledgeReopen, Some(token)).await?;
        let now = self.clock.now_epoch_secs();
        let mut state = self.state.lock().await;
        let record = state.token_mut(token)?;
        if !record.is_cancelled {
            return Err(ExternalError::permanent(format!(
                "revert: {token} is not cancelled"
            )));
        }
        let reopen_at = record.reopen_at.unwrap_or(i64::MAX);
        if now < reopen_at {
            return Err(ExternalError::permanent(format!(
                "revert: {token} cooling-off until {reopen_at}, now {now}"
            )));
        }
        let already = record.reopened;
        record.reopened = true;
        let slot = (record.owner.clone(), record.event_id);
        state.live_mints.remove(&slot);
        let tx = state.next_tx("reopen", token);
        if already {
            debug!(%token, "Reopen already acknowledged");
        } else {
            info!(%token, "Reopen acknowledged on ledger");
        }
        Ok(tx)
    }

    async fn mark_used(&self, token: LedgerTokenId) -> ExternalResult<TxHash> {
        self.injected(LedgerOp::MarkUsed, Some(token)).await?;
        let mut state = self.state.lock().await;
        let record = state.token_mut(token)?;
        if record.is_cancelled {
            return Err(ExternalError::permanent(format!(
                "revert: {token} is cancelled"
            )));
        }
        if record.is_used {
            return Err(ExternalError::permanent(format!(
                "revert: {token} already used"
            )));
        }
        record.is_used = true;
        let tx = state.next_tx("use", token);
        info!(%token, "Ticket marked used on ledger");
        Ok(tx)
    }

    async fn has_minted_for_event(
        &self,
        owner: &WalletAddress,
        event_id: EventId,
    ) -> ExternalResult<bool> {
        self.injected(LedgerOp::Read, None).await?;
        Ok(self
            .state
            .lock()
            .await
            .live_mints
            .contains(&(owner.clone(), event_id)))
    }

    async fn register_identity_proof(
        &self,
        token: LedgerTokenId,
        proof_hash: [u8; 32],
    ) -> ExternalResult<TxHash> {
        self.injected(LedgerOp::RegisterIdentityProof, Some(token)).await?;
        let mut state = self.state.lock().await;
        let record = state.token_mut(token)?;
        record.identity_proof = Some(proof_hash);
        let uri = record.metadata_uri.clone();
        let tx = state.next_tx("identity", token);
        debug!(%token, %uri, proof = %hex::encode(proof_hash), "Identity proof registered on ledger");
        Ok(tx)
    }

    async fn minted_tokens(&self, event_id: EventId) -> ExternalResult<Vec<LedgerTokenId>> {
        self.injected(LedgerOp::Read, None).await?;
        Ok(self
            .state
            .lock()
            .await
            .tokens
            .iter()
            .filter(|(_, t)| t.event_id == event_id)
            .map(|(id, _)| *id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use seatledger_types::ManualClock;

    use super::*;

    fn ledger(cooling_off_secs: i64) -> (SimulatedLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let config = LedgerSimConfig {
            cooling_off_secs,
            ..LedgerSimConfig::default()
        };
        (SimulatedLedger::new(config, clock.clone()), clock)
    }

    fn request(owner: &str, event_id: EventId) -> MintRequest {
        MintRequest {
            owner: WalletAddress::derived_from(owner.as_bytes()),
            event_id,
            seat_id: SeatId::new("A-01"),
            metadata_uri: "mem://tickets/x.json".into(),
            price: Decimal::new(100, 0),
        }
    }

    #[tokio::test]
    async fn mint_assigns_sequential_tokens_and_deducts_fee() {
        let (ledger, _) = ledger(3600);
        let event = EventId::new();
        let a = ledger.mint(&request("alice", event)).await.unwrap();
        let b = ledger.mint(&request("bob", event)).await.unwrap();
        assert_eq!(a.token_id, LedgerTokenId(1));
        assert_eq!(b.token_id, LedgerTokenId(2));
        assert_ne!(a.tx_hash, b.tx_hash);
        // 10 bps of 100
        assert_eq!(ledger.fees_collected().await, Decimal::new(2, 1));
        assert_eq!(ledger.net_price(a.token_id).await, Some(Decimal::new(999, 1)));
        assert_eq!(ledger.minted_tokens(event).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn one_live_mint_per_wallet_and_event() {
        let (ledger, _) = ledger(3600);
        let event = EventId::new();
        let req = request("alice", event);
        ledger.mint(&req).await.unwrap();
        assert!(ledger.has_minted_for_event(&req.owner, event).await.unwrap());
        let err = ledger.mint(&req).await.unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("already minted"));
        // A different event is fine.
        ledger.mint(&request("alice", EventId::new())).await.unwrap();
    }

    #[tokio::test]
    async fn zero_price_reverts() {
        let (ledger, _) = ledger(3600);
        let mut req = request("alice", EventId::new());
        req.price = Decimal::ZERO;
        assert!(ledger.mint(&req).await.is_err());
        assert_eq!(ledger.token_count().await, 0);
    }

    #[tokio::test]
    async fn views_reflect_state() {
        let (ledger, clock) = ledger(3600);
        let req = request("alice", EventId::new());
        let receipt = ledger.mint(&req).await.unwrap();
        let view = ledger.ticket_view(receipt.token_id).await.unwrap();
        assert!(view.exists());
        assert_eq!(view.owner, req.owner);
        assert_eq!(view.issued_at, clock.now_epoch_secs());
        assert!(!view.is_used && !view.is_cancelled && !view.is_face_verified);

        let missing = ledger.ticket_view(LedgerTokenId(99)).await.unwrap();
        assert!(!missing.exists());
        assert!(ledger.owner_of(LedgerTokenId(99)).await.is_err());
    }

    #[tokio::test]
    async fn cancel_then_reopen_after_cooling_off() {
        let (ledger, clock) = ledger(3600);
        let req = request("alice", EventId::new());
        let token = ledger.mint(&req).await.unwrap().token_id;

        let reopen_at = ledger.mark_cancelled(token).await.unwrap();
        assert_eq!(reopen_at, clock.now_epoch_secs() + 3600);
        assert!(ledger.mark_cancelled(token).await.is_err());
        let view = ledger.ticket_view(token).await.unwrap();
        assert!(view.is_cancelled);
        assert_eq!(view.reopen_at, Some(reopen_at));
        assert!(ledger.mark_used(token).await.is_err());

        clock.advance_secs(3599);
        assert!(ledger.acknowledge_reopen(token).await.is_err());
        clock.advance_secs(1);
        ledger.acknowledge_reopen(token).await.unwrap();
        // Repeat acknowledgements are accepted.
        ledger.acknowledge_reopen(token).await.unwrap();

        let view = ledger.ticket_view(token).await.unwrap();
        assert!(view.is_cancelled);
        assert!(!ledger.has_minted_for_event(&req.owner, req.event_id).await.unwrap());
    }

    #[tokio::test]
    async fn jittered_cooling_off_stays_in_window() {
        let clock = Arc::new(ManualClock::at_epoch());
        let config = LedgerSimConfig {
            cooling_off_secs: 0,
            cooling_off_jitter_secs: 12 * 3600,
            ..LedgerSimConfig::default()
        };
        let ledger = SimulatedLedger::new(config, clock.clone());
        for i in 0..20u8 {
            let req = request(&format!("user-{i}"), EventId::new());
            let token = ledger.mint(&req).await.unwrap().token_id;
            let reopen_at = ledger.mark_cancelled(token).await.unwrap();
            let now = clock.now_epoch_secs();
            assert!(reopen_at >= now && reopen_at < now + 12 * 3600);
        }
    }

    #[tokio::test]
    async fn mark_used_once() {
        let (ledger, _) = ledger(3600);
        let token = ledger
            .mint(&request("alice", EventId::new()))
            .await
            .unwrap()
            .token_id;
        ledger.mark_used(token).await.unwrap();
        let err = ledger.mark_used(token).await.unwrap_err();
        assert!(err.message.contains("already used"));
        assert!(ledger.mark_cancelled(token).await.is_err());
    }

    #[tokio::test]
    async fn identity_proof_sets_face_verified() {
        let (ledger, _) = ledger(3600);
        let token = ledger
            .mint(&request("alice", EventId::new()))
            .await
            .unwrap()
            .token_id;
        ledger.register_identity_proof(token, [5u8; 32]).await.unwrap();
        assert!(ledger.ticket_view(token).await.unwrap().is_face_verified);
        assert!(
            ledger
                .register_identity_proof(LedgerTokenId(42), [5u8; 32])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn injected_failures_are_one_shot() {
        let (ledger, _) = ledger(3600);
        ledger
            .inject_failure(LedgerOp::Mint, ExternalError::permanent("insufficient funds"))
            .await;
        let req = request("alice", EventId::new());
        let err = ledger.mint(&req).await.unwrap_err();
        assert_eq!(err.message, "insufficient funds");
        assert_eq!(ledger.token_count().await, 0);
        assert!(ledger.mint(&req).await.is_ok());
    }

    #[tokio::test]
    async fn poisoned_token_fails_writes_not_reads() {
        let (ledger, _) = ledger(0);
        let token = ledger
            .mint(&request("alice", EventId::new()))
            .await
            .unwrap()
            .token_id;
        ledger
            .poison_token(token, ExternalError::transient("congested"))
            .await;
        assert!(ledger.mark_cancelled(token).await.unwrap_err().retryable);
        assert!(ledger.ticket_view(token).await.is_ok());
        ledger.clear_faults().await;
        assert!(ledger.mark_cancelled(token).await.is_ok());
    }
}
