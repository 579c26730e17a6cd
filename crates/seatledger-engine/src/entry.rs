//! Entry verification and admission.
//!
//! A scan runs all four checks concurrently and never short-circuits, so
//! the verdict always carries a complete diagnostic. Disagreements between
//! the ticket store and the ledger are reported as inconsistencies and
//! never resolved in favour of either side.
//!
//! Admissions of one token through one reconciler are serialized, so a
//! second scan at the same moment waits for the first and then reports
//! `AlreadyUsed`.

use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use seatledger_ledger::LedgerClient;
use seatledger_store::{BuyerDirectory, TicketStore};
use seatledger_types::{
    AdmissionOutcome, CheckKind, CheckOutcome, EngineConfig, EntryChecks, EntryVerdict,
    LedgerTicketView, LedgerTokenId, Result, SeatLedgerError, Ticket, TxHash, UserId,
};
use tokio::sync::Mutex;

/// Lock stripes guarding admissions; tokens map onto them by id.
const ADMISSION_LOCK_STRIPES: u64 = 64;

#[derive(Clone)]
pub struct EntryReconciler {
    tickets: Arc<dyn TicketStore>,
    buyers: Arc<dyn BuyerDirectory>,
    ledger: Arc<dyn LedgerClient>,
    config: EngineConfig,
    identity_verifier: Option<VerifyingKey>,
    admission_locks: Arc<[Mutex<()>]>,
}

impl EntryReconciler {
    /// `identity_verifier` is the identity provider's public key. Without
    /// one, only the presence of a proof is checked.
    #[must_use]
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        buyers: Arc<dyn BuyerDirectory>,
        ledger: Arc<dyn LedgerClient>,
        config: EngineConfig,
        identity_verifier: Option<VerifyingKey>,
    ) -> Self {
        Self {
            tickets,
            buyers,
            ledger,
            config,
            identity_verifier,
            admission_locks: (0..ADMISSION_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn admission_lock(&self, token_id: LedgerTokenId) -> &Mutex<()> {
        let stripe = usize::try_from(token_id.0 % ADMISSION_LOCK_STRIPES).unwrap_or_default();
        &self.admission_locks[stripe]
    }

    /// Decide whether `buyer` may enter with `token_id`.
    ///
    /// # Errors
    /// Only if the ticket store cannot be read; collaborator failures during
    /// the checks become failed outcomes in the verdict.
    pub async fn verify_for_entry(
        &self,
        token_id: LedgerTokenId,
        buyer: UserId,
    ) -> Result<EntryVerdict> {
        let ticket = self.tickets.find_by_token(token_id).await?;
        let ticket = ticket.as_ref();

        let (ownership, usage, identity, cancellation) = tokio::join!(
            self.check_ownership(ticket, token_id, buyer),
            self.check_usage(ticket, token_id),
            self.check_identity(token_id, buyer),
            self.check_cancellation(ticket, token_id),
        );
        let already_used = !usage.inconsistent && usage.detail.as_deref() == Some(ALREADY_USED);
        let verdict = EntryVerdict::from_checks(
            token_id,
            buyer,
            EntryChecks {
                ownership,
                usage,
                identity,
                cancellation,
            },
            already_used,
        );

        for check in verdict.inconsistencies() {
            tracing::warn!(
                %token_id,
                buyer = %buyer,
                check = %check.kind,
                detail = check.detail.as_deref().unwrap_or_default(),
                "Ledger and ticket store disagree"
            );
        }
        tracing::debug!(%token_id, buyer = %buyer, can_enter = verdict.can_enter, "Entry verified");
        Ok(verdict)
    }

    /// Verify, then mark the ticket used in the store and on the ledger.
    ///
    /// A repeated scan of an admitted ticket returns `AlreadyUsed`, including
    /// one that arrives while the admission is still in flight.
    ///
    /// # Errors
    /// - `VerificationInconsistency` if ledger and store disagree on any check
    /// - `AdmissionFailed` if the ledger rejects `mark_used`; the usage
    ///   claim is released
    pub async fn admit(&self, token_id: LedgerTokenId, buyer: UserId) -> Result<AdmissionOutcome> {
        let _admitting = self.admission_lock(token_id).lock().await;
        let verdict = self.verify_for_entry(token_id, buyer).await?;
        if verdict.already_used {
            return Ok(AdmissionOutcome::AlreadyUsed(verdict));
        }
        if let Some(check) = verdict.inconsistencies().next() {
            return Err(SeatLedgerError::VerificationInconsistency {
                check: check.kind,
                reason: check.detail.clone().unwrap_or_default(),
            });
        }
        if !verdict.can_enter {
            tracing::info!(%token_id, buyer = %buyer, errors = ?verdict.errors, "Entry denied");
            return Ok(AdmissionOutcome::Denied(verdict));
        }

        let ticket = self
            .tickets
            .find_by_token(token_id)
            .await?
            .ok_or_else(|| SeatLedgerError::Internal(format!("{token_id} lost its ticket row")))?;
        if !self.tickets.claim_usage(ticket.ticket_id).await? {
            return Ok(AdmissionOutcome::AlreadyUsed(verdict));
        }

        match self.ledger.mark_used(token_id).await {
            Ok(tx) => {
                tracing::info!(ticket_id = %ticket.ticket_id, %token_id, buyer = %buyer, tx_hash = %tx, "Admitted");
                Ok(AdmissionOutcome::Admitted(verdict))
            }
            Err(e) => {
                if let Err(release) = self.tickets.release_usage_claim(ticket.ticket_id).await {
                    tracing::error!(ticket_id = %ticket.ticket_id, error = %release, "Failed to release usage claim");
                }
                tracing::warn!(ticket_id = %ticket.ticket_id, %token_id, error = %e, "Ledger rejected admission");
                Err(SeatLedgerError::AdmissionFailed { reason: e.message })
            }
        }
    }

    /// Register the buyer's identity proof against their ticket on the ledger.
    ///
    /// # Errors
    /// - `IdentityProofMissing` if the buyer has none on file
    /// - `InvalidIdentityProof` if the signature does not verify
    /// - `TicketMismatch` if the token is not the buyer's ticket
    pub async fn register_identity(&self, token_id: LedgerTokenId, buyer: UserId) -> Result<TxHash> {
        let proof = self
            .buyers
            .identity_proof(buyer)
            .await
            .map_err(SeatLedgerError::Directory)?
            .ok_or(SeatLedgerError::IdentityProofMissing(buyer))?;
        if let Some(key) = &self.identity_verifier {
            proof.verify(key)?;
        }

        let ticket = self
            .tickets
            .find_by_token(token_id)
            .await?
            .ok_or_else(|| SeatLedgerError::InvalidRequest {
                reason: format!("no ticket bound to {token_id}"),
            })?;
        if ticket.buyer_id != buyer {
            return Err(SeatLedgerError::TicketMismatch {
                ticket_id: ticket.ticket_id,
                reason: format!("ticket does not belong to buyer {buyer}"),
            });
        }

        let tx = self
            .ledger
            .register_identity_proof(token_id, proof.proof_hash)
            .await
            .map_err(SeatLedgerError::Ledger)?;
        tracing::info!(%token_id, buyer = %buyer, proof = %proof.proof_hash_hex(), "Identity proof registered");
        Ok(tx)
    }

    // ----- checks -----

    async fn ledger_view(
        &self,
        token_id: LedgerTokenId,
        kind: CheckKind,
    ) -> std::result::Result<LedgerTicketView, CheckOutcome> {
        self.ledger
            .ticket_view(token_id)
            .await
            .map_err(|e| CheckOutcome::fail(kind, format!("ledger unavailable: {e}")))
    }

    async fn check_ownership(
        &self,
        ticket: Option<&Ticket>,
        token_id: LedgerTokenId,
        buyer: UserId,
    ) -> CheckOutcome {
        const KIND: CheckKind = CheckKind::Ownership;

        let (owner, wallet) = tokio::join!(self.ledger.owner_of(token_id), self.buyers.wallet_of(buyer));
        let wallet = match wallet {
            Ok(Some(wallet)) => wallet,
            Ok(None) => return CheckOutcome::fail(KIND, "buyer has no registered wallet"),
            Err(e) => return CheckOutcome::fail(KIND, format!("directory unavailable: {e}")),
        };

        let db_error = match ticket {
            Some(t) if t.buyer_id == buyer => None,
            Some(t) => Some(format!("DB mismatch: ticket belongs to buyer {}", t.buyer_id)),
            None => Some(format!("DB mismatch: no ticket row for {token_id}")),
        };
        let ledger_error = match owner {
            Ok(owner) if owner == wallet => None,
            Ok(owner) => Some(format!(
                "ledger mismatch: {token_id} owned by {owner}, buyer wallet is {wallet}"
            )),
            Err(e) if e.retryable => {
                return CheckOutcome::fail(KIND, format!("ledger unavailable: {e}"));
            }
            Err(e) => Some(format!("ledger mismatch: {e}")),
        };

        match (db_error, ledger_error) {
            (None, None) => CheckOutcome::pass(KIND),
            (Some(reason), None) | (None, Some(reason)) => CheckOutcome::inconsistency(KIND, reason),
            (Some(db), Some(ledger)) => CheckOutcome::fail(KIND, format!("{db}; {ledger}")),
        }
    }

    async fn check_usage(&self, ticket: Option<&Ticket>, token_id: LedgerTokenId) -> CheckOutcome {
        const KIND: CheckKind = CheckKind::Usage;

        let view = match self.ledger_view(token_id, KIND).await {
            Ok(view) => view,
            Err(outcome) => return outcome,
        };
        let Some(ticket) = ticket else {
            return missing_row(KIND, token_id, &view);
        };
        if !view.exists() {
            return CheckOutcome::inconsistency(KIND, format!("{token_id} not found on ledger"));
        }

        match (ticket.is_used, view.is_used) {
            (false, false) => CheckOutcome::pass(KIND),
            (true, true) => CheckOutcome::fail(KIND, ALREADY_USED),
            (db, ledger) => CheckOutcome::inconsistency(
                KIND,
                format!("usage mismatch: DB used={db}, ledger used={ledger}"),
            ),
        }
    }

    async fn check_identity(&self, token_id: LedgerTokenId, buyer: UserId) -> CheckOutcome {
        let outcome = self.identity_outcome(token_id, buyer).await;
        if self.config.enforce_identity_verification {
            outcome
        } else {
            outcome.advisory()
        }
    }

    async fn identity_outcome(&self, token_id: LedgerTokenId, buyer: UserId) -> CheckOutcome {
        const KIND: CheckKind = CheckKind::Identity;

        let (proof, view) = tokio::join!(
            self.buyers.identity_proof(buyer),
            self.ledger_view(token_id, KIND)
        );
        let proof = match proof {
            Ok(Some(proof)) => proof,
            Ok(None) => return CheckOutcome::fail(KIND, "no identity proof on file"),
            Err(e) => return CheckOutcome::fail(KIND, format!("directory unavailable: {e}")),
        };
        if let Some(key) = &self.identity_verifier {
            if let Err(e) = proof.verify(key) {
                return CheckOutcome::fail(KIND, e.to_string());
            }
        }
        match view {
            Ok(view) if view.is_face_verified => CheckOutcome::pass(KIND),
            Ok(_) => CheckOutcome::fail(KIND, "identity proof not acknowledged on ledger"),
            Err(outcome) => outcome,
        }
    }

    async fn check_cancellation(
        &self,
        ticket: Option<&Ticket>,
        token_id: LedgerTokenId,
    ) -> CheckOutcome {
        const KIND: CheckKind = CheckKind::Cancellation;

        let view = match self.ledger_view(token_id, KIND).await {
            Ok(view) => view,
            Err(outcome) => return outcome,
        };
        let Some(ticket) = ticket else {
            return missing_row(KIND, token_id, &view);
        };

        match (ticket.is_cancelled(), view.is_cancelled) {
            (false, false) => CheckOutcome::pass(KIND),
            (true, true) => CheckOutcome::fail(KIND, "ticket cancelled"),
            (db, ledger) => CheckOutcome::inconsistency(
                KIND,
                format!("cancellation mismatch: DB cancelled={db}, ledger cancelled={ledger}"),
            ),
        }
    }
}

const ALREADY_USED: &str = "ticket already used";

/// Outcome for a token with no ticket row: an inconsistency if the ledger
/// knows the token, otherwise an unknown token.
fn missing_row(kind: CheckKind, token_id: LedgerTokenId, view: &LedgerTicketView) -> CheckOutcome {
    if view.exists() {
        CheckOutcome::inconsistency(kind, format!("DB mismatch: no ticket row for {token_id}"))
    } else {
        CheckOutcome::fail(kind, format!("unknown {token_id}"))
    }
}
