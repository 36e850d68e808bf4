//! In-memory transactional document store with optimistic concurrency.
//!
//! Conflict detection is per-document on the Market and UserBalance
//! version counters. Commitments, resolution records, and log appends are
//! staged in the write set and guarded transitively by the market/balance
//! version checks of the transaction that writes them.

use std::collections::HashMap;

use parking_lot::RwLock;
use poolsettle_types::{
    Commitment, CommitmentId, Market, MarketId, Resolution, ResolutionId, ResolutionLogEntry,
    Result, SettleError, UserBalance, UserId, constants,
};

#[derive(Debug, Clone, Default)]
struct StoreInner {
    markets: HashMap<MarketId, Market>,
    balances: HashMap<UserId, UserBalance>,
    commitments: HashMap<CommitmentId, Commitment>,
    resolutions: HashMap<ResolutionId, Resolution>,
    resolution_log: Vec<ResolutionLogEntry>,
}

/// Transaction handle: snapshot reads with version recording, staged writes.
///
/// Reads are read-your-writes: a document staged earlier in the same
/// transaction is returned in preference to the snapshot.
pub struct Txn {
    snapshot: StoreInner,
    /// Version observed for each market read; `None` means absent.
    market_reads: HashMap<MarketId, Option<u64>>,
    /// Version observed for each balance read; `None` means absent.
    balance_reads: HashMap<UserId, Option<u64>>,
    staged_markets: HashMap<MarketId, Market>,
    staged_balances: HashMap<UserId, UserBalance>,
    staged_commitments: HashMap<CommitmentId, Commitment>,
    staged_resolutions: HashMap<ResolutionId, Resolution>,
    staged_log: Vec<ResolutionLogEntry>,
}

impl Txn {
    fn new(snapshot: StoreInner) -> Self {
        Self {
            snapshot,
            market_reads: HashMap::new(),
            balance_reads: HashMap::new(),
            staged_markets: HashMap::new(),
            staged_balances: HashMap::new(),
            staged_commitments: HashMap::new(),
            staged_resolutions: HashMap::new(),
            staged_log: Vec::new(),
        }
    }

    /// Read a market, recording its observed version for commit validation.
    ///
    /// # Errors
    /// Returns `MarketNotFound` if the market does not exist.
    pub fn market(&mut self, market_id: MarketId) -> Result<Market> {
        if let Some(staged) = self.staged_markets.get(&market_id) {
            return Ok(staged.clone());
        }
        let live = self.snapshot.markets.get(&market_id);
        self.market_reads
            .entry(market_id)
            .or_insert_with(|| live.map(|m| m.version));
        live.cloned().ok_or(SettleError::MarketNotFound(market_id))
    }

    /// Read a user's balance, creating a zero-balance default if absent.
    /// The observed version (or absence) is recorded for commit validation.
    pub fn balance_or_default(&mut self, user_id: UserId) -> UserBalance {
        if let Some(staged) = self.staged_balances.get(&user_id) {
            return staged.clone();
        }
        let live = self.snapshot.balances.get(&user_id);
        self.balance_reads
            .entry(user_id)
            .or_insert_with(|| live.map(|b| b.version));
        live.cloned().unwrap_or_else(|| UserBalance::zero(user_id))
    }

    /// All commitments for a market, staged writes overlaying the snapshot,
    /// ordered by commitment ID (UUIDv7, so effectively by creation time).
    pub fn commitments_for_market(&self, market_id: MarketId) -> Vec<Commitment> {
        let mut out: HashMap<CommitmentId, Commitment> = self
            .snapshot
            .commitments
            .iter()
            .filter(|(_, c)| c.market_id == market_id)
            .map(|(id, c)| (*id, c.clone()))
            .collect();
        for (id, c) in &self.staged_commitments {
            if c.market_id == market_id {
                out.insert(*id, c.clone());
            }
        }
        let mut list: Vec<Commitment> = out.into_values().collect();
        list.sort_by_key(|c| c.id);
        list
    }

    /// Whether `user_id` already holds an active commitment in the market.
    /// Read-before-write guard for the participant counters.
    #[must_use]
    pub fn user_has_active_commitment(&self, market_id: MarketId, user_id: UserId) -> bool {
        self.commitments_for_market(market_id)
            .iter()
            .any(|c| c.user_id == user_id && c.is_active())
    }

    pub fn put_market(&mut self, market: Market) {
        self.staged_markets.insert(market.id, market);
    }

    pub fn put_balance(&mut self, balance: UserBalance) {
        self.staged_balances.insert(balance.user_id, balance);
    }

    pub fn put_commitment(&mut self, commitment: Commitment) {
        self.staged_commitments.insert(commitment.id, commitment);
    }

    pub fn put_resolution(&mut self, resolution: Resolution) {
        self.staged_resolutions.insert(resolution.id, resolution);
    }

    /// Stage an append to the resolution log, applied with the commit.
    pub fn append_log(&mut self, entry: ResolutionLogEntry) {
        self.staged_log.push(entry);
    }
}

/// Outcome of a commit attempt.
enum CommitOutcome {
    Applied,
    Conflict { doc: String },
}

/// In-memory transactional document store.
///
/// The store is the engine's single source of truth; every mutating
/// operation of the ledger and the resolution coordinator runs inside one
/// [`DocumentStore::run_transaction`] call.
pub struct DocumentStore {
    inner: RwLock<StoreInner>,
    max_txn_retries: u32,
}

impl DocumentStore {
    /// Create an empty store with the default retry budget.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retries(constants::MAX_TXN_RETRIES)
    }

    /// Create an empty store with a custom retry budget.
    #[must_use]
    pub fn with_retries(max_txn_retries: u32) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            max_txn_retries,
        }
    }

    // ------------------------------------------------------------------
    // Plain reads
    // ------------------------------------------------------------------

    #[must_use]
    pub fn market(&self, market_id: MarketId) -> Option<Market> {
        self.inner.read().markets.get(&market_id).cloned()
    }

    /// A user's balance; zero-balance default if the user has never held
    /// tokens.
    #[must_use]
    pub fn balance(&self, user_id: UserId) -> UserBalance {
        self.inner
            .read()
            .balances
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserBalance::zero(user_id))
    }

    #[must_use]
    pub fn commitment(&self, commitment_id: CommitmentId) -> Option<Commitment> {
        self.inner.read().commitments.get(&commitment_id).cloned()
    }

    /// All commitments for a market, ordered by commitment ID.
    #[must_use]
    pub fn commitments_for_market(&self, market_id: MarketId) -> Vec<Commitment> {
        let inner = self.inner.read();
        let mut list: Vec<Commitment> = inner
            .commitments
            .values()
            .filter(|c| c.market_id == market_id)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.id);
        list
    }

    #[must_use]
    pub fn resolution(&self, resolution_id: ResolutionId) -> Option<Resolution> {
        self.inner.read().resolutions.get(&resolution_id).cloned()
    }

    /// Number of resolution records persisted for a market. Used to derive
    /// the deterministic attempt sequence for the next resolution ID.
    #[must_use]
    pub fn resolution_count_for_market(&self, market_id: MarketId) -> u64 {
        self.inner
            .read()
            .resolutions
            .values()
            .filter(|r| r.market_id == market_id)
            .count() as u64
    }

    /// The ordered resolution log for one market.
    #[must_use]
    pub fn log_for_market(&self, market_id: MarketId) -> Vec<ResolutionLogEntry> {
        self.inner
            .read()
            .resolution_log
            .iter()
            .filter(|e| e.market_id == market_id)
            .cloned()
            .collect()
    }

    /// Σ (available + committed) over all balances — conservation probe.
    #[must_use]
    pub fn total_supply(&self) -> u64 {
        self.inner.read().balances.values().map(UserBalance::total).sum()
    }

    // ------------------------------------------------------------------
    // Non-transactional writes
    // ------------------------------------------------------------------

    /// Seed a market document. Fails if the market already exists.
    pub fn insert_market(&self, market: Market) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.markets.contains_key(&market.id) {
            return Err(SettleError::ValidationError {
                reason: format!("market {} already exists", market.id),
            });
        }
        inner.markets.insert(market.id, market);
        Ok(())
    }

    /// External funding entry point: credit a user's available balance.
    /// Bumps the balance version, so it participates in conflict detection.
    pub fn deposit(&self, user_id: UserId, amount: u64) {
        let mut inner = self.inner.write();
        let balance = inner
            .balances
            .entry(user_id)
            .or_insert_with(|| UserBalance::zero(user_id));
        balance.available_tokens += amount;
        balance.version += 1;
    }

    /// Write-through log append usable outside a transaction; lifecycle
    /// entries must land even when the surrounding operation fails.
    pub fn append_log(&self, entry: ResolutionLogEntry) {
        self.inner.write().resolution_log.push(entry);
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `body` inside one atomic transaction.
    ///
    /// The body may run more than once: each attempt sees a fresh snapshot,
    /// and commit-time version conflicts re-run it up to the retry budget.
    /// Keep bodies free of external side effects.
    ///
    /// # Errors
    /// - The body's own error, unchanged, with no writes applied.
    /// - [`SettleError::TransactionFailed`] when the retry budget is
    ///   exhausted by write conflicts.
    pub fn run_transaction<T>(
        &self,
        market_id: MarketId,
        mut body: impl FnMut(&mut Txn) -> Result<T>,
    ) -> Result<T> {
        for attempt in 0..=self.max_txn_retries {
            let snapshot = self.inner.read().clone();
            let mut txn = Txn::new(snapshot);
            let value = body(&mut txn)?;
            match self.commit(txn) {
                CommitOutcome::Applied => return Ok(value),
                CommitOutcome::Conflict { doc } => {
                    tracing::debug!(
                        market = %market_id,
                        attempt,
                        conflicting_doc = %doc,
                        "transaction conflict, retrying"
                    );
                }
            }
        }
        Err(SettleError::TransactionFailed {
            market_id,
            reason: format!("write conflict persisted past {} retries", self.max_txn_retries),
        })
    }

    /// Validate read versions and apply staged writes under the write lock.
    fn commit(&self, txn: Txn) -> CommitOutcome {
        let mut inner = self.inner.write();

        for (market_id, observed) in &txn.market_reads {
            let live = inner.markets.get(market_id).map(|m| m.version);
            if live != *observed {
                return CommitOutcome::Conflict {
                    doc: format!("{market_id}"),
                };
            }
        }
        for (user_id, observed) in &txn.balance_reads {
            let live = inner.balances.get(user_id).map(|b| b.version);
            if live != *observed {
                return CommitOutcome::Conflict {
                    doc: format!("balance:{user_id}"),
                };
            }
        }

        for (market_id, mut market) in txn.staged_markets {
            market.version = inner.markets.get(&market_id).map_or(1, |m| m.version + 1);
            inner.markets.insert(market_id, market);
        }
        for (user_id, mut balance) in txn.staged_balances {
            balance.version = inner.balances.get(&user_id).map_or(1, |b| b.version + 1);
            inner.balances.insert(user_id, balance);
        }
        for (commitment_id, commitment) in txn.staged_commitments {
            inner.commitments.insert(commitment_id, commitment);
        }
        for (resolution_id, resolution) in txn.staged_resolutions {
            inner.resolutions.insert(resolution_id, resolution);
        }
        inner.resolution_log.extend(txn.staged_log);

        CommitOutcome::Applied
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
