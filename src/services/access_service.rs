//! Access service - the per (evaluator, test) gate
//!
//! Redeeming a code creates or re-opens an access record. Only finalize
//! closes one again (see the response services).

use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::db::access::{self, AccessWithTest};
use crate::db::{design_tests, users, AccessRow, SurveyDb};
use crate::error::StorageError;

use super::events::{EventBus, SurveyEvent};

/// Outcome of a code redemption
#[derive(Debug, Clone)]
pub struct Redemption {
    pub access: AccessRow,
    /// True when the record did not exist before
    pub created: bool,
}

/// Access gate service
pub struct AccessService {
    db: Arc<SurveyDb>,
    events: Arc<EventBus>,
}

impl AccessService {
    /// Create a new access service
    pub fn new(db: Arc<SurveyDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Redeem a test code for an evaluator
    ///
    /// Creates an unlocked record on first redemption and unlocks a locked one
    /// on later redemptions. Redeeming an open record changes nothing.
    pub fn grant_or_unlock(&self, evaluator_id: i64, code: &str) -> Result<Redemption, StorageError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(StorageError::InvalidInput("'code' is required".to_string()));
        }

        let (redemption, unlocked) = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_evaluator(&tx, evaluator_id)?;

            let test = design_tests::get_design_test_by_code(&tx, code)?
                .ok_or_else(|| StorageError::NotFound(format!("No design test with code {}", code)))?;

            let outcome = match access::find_access(&tx, evaluator_id, test.id)? {
                None => {
                    let access = access::insert_unlocked(&tx, evaluator_id, test.id)?;
                    (Redemption { access, created: true }, false)
                }
                Some(existing) if existing.locked => {
                    access::unlock(&tx, existing.id)?;
                    let access = access::find_access(&tx, evaluator_id, test.id)?
                        .ok_or_else(|| StorageError::Internal("Access vanished during unlock".to_string()))?;
                    (Redemption { access, created: false }, true)
                }
                Some(existing) => (Redemption { access: existing, created: false }, false),
            };

            tx.commit()?;
            Ok(outcome)
        })?;

        let test_id = redemption.access.test_id;
        if redemption.created {
            info!(evaluator_id, test_id, created = true, "Access granted");
            self.events.emit(SurveyEvent::AccessGranted { evaluator_id, test_id });
        } else if unlocked {
            info!(evaluator_id, test_id, "Access unlocked");
            self.events.emit(SurveyEvent::AccessUnlocked { evaluator_id, test_id });
        }

        Ok(redemption)
    }

    /// Non-hidden tests of an evaluator with their completion state
    pub fn list_accessible(&self, evaluator_id: i64) -> Result<Vec<AccessWithTest>, StorageError> {
        self.db.with_conn(|conn| {
            if users::get_user(conn, evaluator_id)?.is_none() {
                return Err(StorageError::NotFound(format!("User {} not found", evaluator_id)));
            }
            access::list_visible(conn, evaluator_id)
        })
    }

    /// Hide or show a test in the evaluator's list; never touches the lock
    pub fn set_hidden(&self, test_id: i64, evaluator_id: i64, hidden: bool) -> Result<AccessRow, StorageError> {
        let access = self.db.with_conn(|conn| {
            if !access::set_hidden(conn, evaluator_id, test_id, hidden)? {
                return Err(StorageError::NotFound(format!(
                    "No access for evaluator {} to test {}",
                    evaluator_id, test_id
                )));
            }
            access::find_access(conn, evaluator_id, test_id)?
                .ok_or_else(|| StorageError::Internal("Access vanished after update".to_string()))
        })?;

        info!(evaluator_id, test_id, hidden, "Access visibility changed");
        self.events.emit(SurveyEvent::AccessVisibilityChanged { evaluator_id, test_id, hidden });

        Ok(access)
    }
}

fn require_evaluator(conn: &Connection, evaluator_id: i64) -> Result<(), StorageError> {
    let user = users::get_user(conn, evaluator_id)?
        .ok_or_else(|| StorageError::NotFound(format!("User {} not found", evaluator_id)))?;
    if !user.is_evaluator() {
        return Err(StorageError::Forbidden(format!(
            "User {} is not an evaluator",
            evaluator_id
        )));
    }
    Ok(())
}

/// Access record that allows writes, checked inside the caller's transaction
pub(crate) fn require_writable(conn: &Connection, evaluator_id: i64, test_id: i64) -> Result<AccessRow, StorageError> {
    let access = require_access(conn, evaluator_id, test_id)?;
    if access.locked {
        return Err(StorageError::Forbidden(format!(
            "Access of evaluator {} to test {} is locked",
            evaluator_id, test_id
        )));
    }
    Ok(access)
}

/// Any access record for the pair
pub(crate) fn require_access(conn: &Connection, evaluator_id: i64, test_id: i64) -> Result<AccessRow, StorageError> {
    access::find_access(conn, evaluator_id, test_id)?.ok_or_else(|| {
        StorageError::Forbidden(format!(
            "Evaluator {} has no access to test {}",
            evaluator_id, test_id
        ))
    })
}
