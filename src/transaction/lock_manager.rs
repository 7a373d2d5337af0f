use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState,
};
use crate::transaction::transaction_manager::TransactionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    wounded: bool,
}

impl LockRequest {
    fn new(txn_id: TxnId, mode: LockMode) -> Self {
        Self {
            txn_id,
            mode,
            wounded: false,
        }
    }
}

#[derive(Default)]
struct QueueState {
    /// Always a mutually-compatible group: all shared, or one exclusive.
    granted: Vec<LockRequest>,
    waiting: VecDeque<LockRequest>,
    /// Transaction currently upgrading shared -> exclusive, if any.
    upgrading: Option<TxnId>,
}

struct LockRequestQueue {
    state: Mutex<QueueState>,
    cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            cv: Condvar::new(),
        }
    }
}

/// Tuple-level two-phase lock manager with wound-wait deadlock prevention.
///
/// Each rid has its own request queue guarded by a mutex + condvar. An older
/// transaction that finds younger conflictors ahead of it wounds them (marks
/// them aborted and wakes the queue); a younger transaction waits behind
/// older holders. Since a transaction can only ever wait for older ones, the
/// wait-for graph cannot form a cycle.
///
/// Wounding resolves transaction ids through the shared registry, so this
/// type has no dependency on the transaction manager.
pub struct LockManager {
    lock_table: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
    registry: Arc<TransactionRegistry>,
}

impl LockManager {
    pub fn new(registry: Arc<TransactionRegistry>) -> Self {
        Self {
            lock_table: Mutex::new(HashMap::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    /// Acquire a shared lock on `rid`, blocking until granted or wounded.
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> Result<(), TransactionError> {
        self.sanity_check(txn, LockMode::Shared)?;
        if txn.is_shared_locked(rid) || txn.is_exclusive_locked(rid) {
            // Re-entry on a same-or-stronger lock.
            return Ok(());
        }
        self.wait_in_queue(&self.request_queue(rid), txn, LockMode::Shared)?;
        txn.add_shared_lock(rid);
        Ok(())
    }

    /// Acquire an exclusive lock on `rid`, blocking until granted or wounded.
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> Result<(), TransactionError> {
        self.sanity_check(txn, LockMode::Exclusive)?;
        if txn.is_exclusive_locked(rid) {
            return Ok(());
        }
        self.wait_in_queue(&self.request_queue(rid), txn, LockMode::Exclusive)?;
        txn.add_exclusive_lock(rid);
        Ok(())
    }

    /// Upgrade a held shared lock to exclusive. Only one upgrade may be in
    /// flight per rid; a second upgrader is aborted immediately.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> Result<(), TransactionError> {
        self.sanity_check(txn, LockMode::Exclusive)?;
        if txn.is_exclusive_locked(rid) {
            // Upgrade re-entry is a no-op success.
            return Ok(());
        }

        let queue = self.request_queue(rid);
        {
            let mut state = queue.state.lock();
            if state.upgrading.is_some() {
                drop(state);
                txn.set_state(TransactionState::Aborted);
                return Err(TransactionError::UpgradeConflict(txn.id()));
            }
            state.upgrading = Some(txn.id());

            // Give up the shared grant before re-entering the wait queue.
            if let Some(pos) = state.granted.iter().position(|r| r.txn_id == txn.id()) {
                debug_assert_eq!(state.granted[pos].mode, LockMode::Shared);
                state.granted.remove(pos);
                if state.granted.is_empty() {
                    queue.cv.notify_all();
                }
            }
        }

        let result = self.wait_in_queue(&queue, txn, LockMode::Exclusive);
        queue.state.lock().upgrading = None;

        result?;
        txn.remove_shared_lock(rid);
        txn.add_exclusive_lock(rid);
        Ok(())
    }

    /// Release the lock held on `rid`. Returns false when no grant exists.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        let queue = self.request_queue(rid);
        let mut released_mode = None;
        {
            let mut state = queue.state.lock();
            if let Some(pos) = state.granted.iter().position(|r| r.txn_id == txn.id()) {
                let request = state.granted.remove(pos);
                released_mode = Some(request.mode);
                if state.granted.is_empty() {
                    // Wake the waiters so the head can re-check.
                    queue.cv.notify_all();
                }
            }
        }

        let released_mode = match released_mode {
            Some(mode) => mode,
            None => {
                warn!("transaction {} unlocked rid {} it does not hold", txn.id(), rid);
                return false;
            }
        };

        match released_mode {
            LockMode::Shared => txn.remove_shared_lock(rid),
            LockMode::Exclusive => txn.remove_exclusive_lock(rid),
        }

        // First release ends the growing phase, except that READ_COMMITTED
        // gives shared locks back eagerly without shrinking.
        if txn.state() == TransactionState::Growing
            && !(released_mode == LockMode::Shared
                && txn.isolation_level() == IsolationLevel::ReadCommitted)
        {
            txn.set_state(TransactionState::Shrinking);
        }
        true
    }

    fn request_queue(&self, rid: Rid) -> Arc<LockRequestQueue> {
        let mut table = self.lock_table.lock();
        Arc::clone(
            table
                .entry(rid)
                .or_insert_with(|| Arc::new(LockRequestQueue::new())),
        )
    }

    /// Reject requests that violate 2PL or the isolation level; a rejected
    /// transaction (other than an already-wounded one) becomes ABORTED.
    fn sanity_check(&self, txn: &Transaction, mode: LockMode) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Aborted => return Err(TransactionError::Deadlock(txn.id())),
            TransactionState::Shrinking => {
                txn.set_state(TransactionState::Aborted);
                return Err(TransactionError::LockOnShrinking(txn.id()));
            }
            _ => {}
        }
        if mode == LockMode::Shared && txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::LockSharedOnReadUncommitted(txn.id()));
        }
        Ok(())
    }

    /// Whether the request can be granted right now. An exclusive request
    /// must sit at the queue head with nothing granted; a shared request
    /// joins the granted group unless an exclusive holder exists or an
    /// exclusive request waits ahead of it (FIFO keeps writers from
    /// starving).
    fn can_grant(state: &QueueState, txn_id: TxnId, mode: LockMode) -> bool {
        match mode {
            LockMode::Exclusive => {
                state.granted.is_empty()
                    && state.waiting.front().map(|r| r.txn_id) == Some(txn_id)
            }
            LockMode::Shared => {
                if state.granted.iter().any(|r| r.mode == LockMode::Exclusive) {
                    return false;
                }
                for request in &state.waiting {
                    if request.txn_id == txn_id {
                        return true;
                    }
                    if request.mode == LockMode::Exclusive {
                        return false;
                    }
                }
                false
            }
        }
    }

    /// Wound (mark aborted) every strictly-younger, not yet wounded request
    /// ahead of `txn_id`. Returns how many *waiting* requests were wounded;
    /// wounded holders find out on their own next step.
    fn wound_younger_requests(&self, state: &mut QueueState, txn_id: TxnId) -> usize {
        for request in state.granted.iter_mut() {
            if !request.wounded && request.txn_id > txn_id {
                self.wound(request.txn_id);
                request.wounded = true;
            }
        }

        let mut wounded_waiting = 0;
        for request in state.waiting.iter_mut() {
            if request.txn_id == txn_id {
                // Requests behind us are none of our business.
                break;
            }
            if !request.wounded && request.txn_id > txn_id {
                self.wound(request.txn_id);
                request.wounded = true;
                wounded_waiting += 1;
            }
        }
        wounded_waiting
    }

    fn wound(&self, txn_id: TxnId) {
        match self.registry.get(txn_id) {
            Some(victim) => victim.set_state(TransactionState::Aborted),
            None => warn!("wounded transaction {} is not registered", txn_id),
        }
    }

    /// Enqueue the request and block until it is granted or the transaction
    /// is wounded.
    fn wait_in_queue(
        &self,
        queue: &LockRequestQueue,
        txn: &Transaction,
        mode: LockMode,
    ) -> Result<(), TransactionError> {
        let txn_id = txn.id();
        let mut state = queue.state.lock();
        state.waiting.push_back(LockRequest::new(txn_id, mode));

        while !Self::can_grant(&state, txn_id, mode) {
            if self.wound_younger_requests(&mut state, txn_id) > 0 {
                // Tell the wounded waiters to abort themselves. We still
                // have to wait for them (and any wounded holders) to leave.
                queue.cv.notify_all();
            }
            queue.cv.wait(&mut state);

            if txn.state() == TransactionState::Aborted {
                // Wounded while waiting. Leaving may expose a new queue
                // head, so wake the others before bailing out.
                if let Some(pos) = state.waiting.iter().position(|r| r.txn_id == txn_id) {
                    state.waiting.remove(pos);
                }
                queue.cv.notify_all();
                drop(state);
                return Err(TransactionError::Deadlock(txn_id));
            }
        }

        let pos = state.waiting.iter().position(|r| r.txn_id == txn_id);
        debug_assert!(pos.is_some(), "granted request vanished from the wait queue");
        if let Some(request) = pos.and_then(|pos| state.waiting.remove(pos)) {
            state.granted.push(request);
        }
        Ok(())
    }
}
