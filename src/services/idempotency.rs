use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::gateway::Gateway;
use crate::models::payment::{PaymentRequest, PaymentResult};

/// Aprovações replayáveis por 24h.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Deterministic per (gateway, order): a retried checkout maps to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn derive(gateway: &Gateway, order_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(gateway.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(order_id.as_bytes());
        let digest = hasher.finalize();
        IdempotencyKey(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The charged terms of a request. A replay is only valid when they match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFingerprint {
    amount_cents: i64,
    installments: u32,
}

impl RequestFingerprint {
    pub fn of(request: &PaymentRequest) -> Self {
        Self {
            amount_cents: request.amount.cents(),
            installments: request.installments.unwrap_or(1),
        }
    }
}

enum LedgerEntry {
    InFlight,
    Completed {
        fingerprint: RequestFingerprint,
        result: PaymentResult,
        expires_at: Instant,
    },
}

impl LedgerEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, LedgerEntry::Completed { expires_at, .. } if *expires_at <= now)
    }
}

#[derive(Debug)]
pub enum Begin<'a> {
    Fresh(Claim<'a>),
    InFlight,
    Completed(PaymentResult),
    /// Same order already approved with a different amount or installments.
    Conflict,
}

/// Exclusive hold on a key while its dispatch runs. Dropping it without
/// `complete` (e.g. the caller's future was cancelled) releases the key.
#[derive(Debug)]
pub struct Claim<'a> {
    ledger: &'a IdempotencyLedger,
    key: IdempotencyKey,
    fingerprint: RequestFingerprint,
    settled: bool,
}

impl Claim<'_> {
    /// Aprovações ficam gravadas; falhas liberam a chave para nova tentativa.
    pub fn complete(mut self, result: &PaymentResult) {
        if result.is_success() {
            self.ledger.entries.insert(
                self.key.clone(),
                LedgerEntry::Completed {
                    fingerprint: self.fingerprint,
                    result: result.clone(),
                    expires_at: Instant::now() + self.ledger.ttl,
                },
            );
        } else {
            self.ledger.entries.remove(&self.key);
        }
        self.settled = true;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.ledger
                .entries
                .remove_if(&self.key, |_, entry| matches!(entry, LedgerEntry::InFlight));
        }
    }
}

/// Ledger em memória das cobranças por chave de idempotência.
pub struct IdempotencyLedger {
    entries: DashMap<IdempotencyKey, LedgerEntry>,
    ttl: Duration,
}

impl Default for IdempotencyLedger {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl fmt::Debug for IdempotencyLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotencyLedger")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl IdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn claim(&self, key: &IdempotencyKey, fingerprint: RequestFingerprint) -> Claim<'_> {
        Claim {
            ledger: self,
            key: key.clone(),
            fingerprint,
            settled: false,
        }
    }

    /// Claims the key for a new dispatch unless one is running or an
    /// unexpired approval exists.
    pub fn begin(&self, key: &IdempotencyKey, fingerprint: RequestFingerprint) -> Begin<'_> {
        let now = Instant::now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(LedgerEntry::InFlight);
                    return Begin::Fresh(self.claim(key, fingerprint));
                }
                match entry.get() {
                    LedgerEntry::InFlight => Begin::InFlight,
                    LedgerEntry::Completed {
                        fingerprint: stored,
                        result,
                        ..
                    } => {
                        if *stored == fingerprint {
                            Begin::Completed(result.clone())
                        } else {
                            Begin::Conflict
                        }
                    }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(LedgerEntry::InFlight);
                Begin::Fresh(self.claim(key, fingerprint))
            }
        }
    }

    /// Drops expired approvals; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
