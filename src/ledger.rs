//! The transaction ledger: an append-mostly, newest-first history of submitted
//! chain operations, persisted as one JSON array under a single storage key.
//!
//! Every write is a read-modify-write of the whole array. There is no locking,
//! so when two contexts write concurrently the last one to finish wins. Other
//! contexts learn about a write only through a [`ChangeFeed`] event naming the
//! key, after which they call [`TransactionLedger::list`] again.
//!
//! Records are never dropped by a write. Stored elements that this version
//! cannot read are kept as they are and written back unchanged, and a status
//! update only touches the `status` field of the matching elements.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::notify::{ChangeFeed, ContextId};
use crate::storage::{Storage, StorageError};
use crate::transaction::{Chain, NewTransaction, Status, Token, Transaction, TxType};

/// Key the dashboard has always stored its history under.
pub const DEFAULT_STORAGE_KEY: &str = "cross_chain_transactions";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("could not serialize the transaction history")]
    Serialize(#[from] serde_json::Error),
    #[error("amount must be a finite number that is not negative, got {0}")]
    InvalidAmount(f64),
    #[error("stored transaction history {key:?} is not a JSON array, refusing to overwrite it")]
    Unreadable {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One element of the stored array together with its decoded form, if any.
#[derive(Debug)]
struct Entry {
    raw: Value,
    record: Option<Transaction>,
}

impl Entry {
    fn decode(key: &str, index: usize, raw: Value) -> Self {
        let record = match raw {
            Value::Object(_) => match serde_json::from_value(raw.clone()) {
                Ok(record) => Some(record),
                Err(err) => {
                    log::warn!("keeping unreadable entry {index} of transaction history {key:?}: {err}");
                    None
                }
            },
            _ => {
                log::warn!("keeping entry {index} of transaction history {key:?}, it is not an object");
                None
            }
        };
        Self { raw, record }
    }
}

#[derive(Debug)]
pub struct TransactionLedger<S> {
    storage: S,
    key: String,
    feed: Option<(Arc<ChangeFeed>, ContextId)>,
}

impl<S: Storage> TransactionLedger<S> {
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            feed: None,
        }
    }

    /// Publish a change event on `feed` after every write, on behalf of `origin`.
    pub fn with_feed(mut self, feed: Arc<ChangeFeed>, origin: ContextId) -> Self {
        self.feed = Some((feed, origin));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Stores `new` in front of the history with a fresh id and the current
    /// time and returns the stored record.
    pub fn append(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        if !new.amount.is_finite() || new.amount < 0.0 {
            return Err(LedgerError::InvalidAmount(new.amount));
        }

        let mut entries = self.load()?;
        let record = new.into_transaction(Uuid::new_v4().to_string(), Utc::now().trunc_subsecs(3));
        entries.insert(
            0,
            Entry {
                raw: serde_json::to_value(&record)?,
                record: Some(record.clone()),
            },
        );
        self.persist(&entries)?;
        log::debug!(
            "appended {} {} {} ({}) as {}",
            record.kind,
            record.amount,
            record.token,
            record.tx_hash,
            record.id
        );
        Ok(record)
    }

    /// The whole history, newest first. Missing or unreadable data yields an
    /// empty history rather than an error.
    pub fn list(&self) -> Vec<Transaction> {
        match self.load() {
            Ok(entries) => entries.into_iter().filter_map(|e| e.record).collect(),
            Err(err) => {
                log::warn!("could not read transaction history {:?}: {}", self.key, err);
                Vec::new()
            }
        }
    }

    /// Sets `status` on every record with the given hash. Nothing is written when
    /// no record matches, since the update may simply have arrived before the
    /// record itself.
    pub fn update_status(&self, tx_hash: &str, status: Status) -> Result<(), LedgerError> {
        let mut entries = self.load()?;
        let status_value = serde_json::to_value(status)?;
        let mut matched = 0;
        for entry in &mut entries {
            let (Some(record), Value::Object(fields)) = (&mut entry.record, &mut entry.raw) else {
                continue;
            };
            if record.tx_hash != tx_hash {
                continue;
            }
            record.status = status;
            fields.insert("status".to_string(), status_value.clone());
            matched += 1;
        }
        if matched == 0 {
            log::debug!("no transaction with hash {tx_hash}, status update to {status} ignored");
            return Ok(());
        }
        self.persist(&entries)?;
        log::debug!("set status of {matched} transaction(s) with hash {tx_hash} to {status}");
        Ok(())
    }

    pub fn find_by_hash(&self, tx_hash: &str) -> Vec<Transaction> {
        self.list().into_iter().filter(|r| r.tx_hash == tx_hash).collect()
    }

    /// Records the result of a contract call the way the dashboard does: a
    /// confirmed call is stored as completed, a failed call that still got a
    /// hash is stored as pending so it stays visible, anything else is dropped.
    pub fn record_submission(
        &self,
        submission: NewSubmission,
        outcome: SubmissionOutcome,
    ) -> Result<Option<Transaction>, LedgerError> {
        let (status, tx_hash) = match outcome {
            SubmissionOutcome::Confirmed { tx_hash } => (Status::Completed, tx_hash),
            SubmissionOutcome::Failed {
                tx_hash: Some(tx_hash),
                reason,
            } => {
                log::warn!("{} {} failed after broadcast ({}): {}", submission.kind, submission.token, tx_hash, reason);
                (Status::Pending, tx_hash)
            }
            SubmissionOutcome::Failed { tx_hash: None, reason } => {
                log::warn!("{} {} failed before broadcast: {}", submission.kind, submission.token, reason);
                return Ok(None);
            }
        };
        self.append(submission.into_new_transaction(status, tx_hash)).map(Some)
    }

    /// Reads and decodes the stored array. A stored value that is not a JSON
    /// array is an error, single elements that do not decode are not.
    fn load(&self) -> Result<Vec<Entry>, LedgerError> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(Vec::new());
        };
        let values: Vec<Value> = serde_json::from_str(&raw).map_err(|source| LedgerError::Unreadable {
            key: self.key.clone(),
            source,
        })?;
        Ok(values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Entry::decode(&self.key, i, value))
            .collect())
    }

    fn persist(&self, entries: &[Entry]) -> Result<(), LedgerError> {
        let raw = serde_json::to_string(&entries.iter().map(|e| &e.raw).collect::<Vec<_>>())?;
        self.storage.set(&self.key, &raw)?;
        if let Some((feed, origin)) = &self.feed {
            feed.publish(*origin, &self.key);
        }
        Ok(())
    }
}

/// An operation about to be sent to a contract.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub chain: Chain,
    pub kind: TxType,
    pub amount: f64,
    pub token: Token,
}

impl NewSubmission {
    fn into_new_transaction(self, status: Status, tx_hash: String) -> NewTransaction {
        NewTransaction {
            chain: self.chain,
            kind: self.kind,
            amount: self.amount,
            token: self.token,
            status,
            tx_hash,
        }
    }
}

/// What the wallet reported back for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Confirmed { tx_hash: String },
    Failed { tx_hash: Option<String>, reason: String },
}
