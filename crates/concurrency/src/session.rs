//! Backend transaction bindings
//!
//! A unit of work owns exactly one [`BackendSession`]. The two variants bind
//! the unit-of-work lifecycle to the respective engine:
//!
//! | Binding | commit | rollback |
//! |---------|--------|----------|
//! | Relational | transaction commit | transaction rollback |
//! | Document | `commit_transaction` | `abort_transaction` |

use steadfast_core::{Error, Result};
use steadfast_storage::{DocumentSession, RelationalTransaction};

/// The storage transaction owned by a unit of work
#[derive(Debug)]
pub enum BackendSession {
    /// Relational engine transaction
    Relational(RelationalTransaction),
    /// Document store session with a running transaction
    Document(DocumentSession),
}

impl BackendSession {
    /// Name used in logs and mismatch errors
    pub fn name(&self) -> &'static str {
        match self {
            BackendSession::Relational(_) => "relational",
            BackendSession::Document(_) => "document",
        }
    }

    /// True while the underlying transaction can still commit or roll back
    pub fn is_open(&self) -> bool {
        match self {
            BackendSession::Relational(txn) => txn.is_active(),
            BackendSession::Document(session) => session.in_transaction(),
        }
    }

    /// The relational transaction, or `BackendMismatch`
    pub fn relational_mut(&mut self) -> Result<&mut RelationalTransaction> {
        match self {
            BackendSession::Relational(txn) => Ok(txn),
            other => Err(Error::BackendMismatch {
                expected: "relational",
                actual: other.name(),
            }),
        }
    }

    /// The document session, or `BackendMismatch`
    pub fn document_mut(&mut self) -> Result<&mut DocumentSession> {
        match self {
            BackendSession::Document(session) => Ok(session),
            other => Err(Error::BackendMismatch {
                expected: "document",
                actual: other.name(),
            }),
        }
    }

    /// Commit the underlying transaction
    pub async fn commit(&mut self) -> Result<()> {
        match self {
            BackendSession::Relational(txn) => txn.commit().await?,
            BackendSession::Document(session) => session.commit_transaction().await?,
        }
        Ok(())
    }

    /// Abort the underlying transaction
    ///
    /// A transaction that already ended is left alone.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        match self {
            BackendSession::Relational(txn) => txn.rollback().await?,
            BackendSession::Document(session) => session.abort_transaction().await?,
        }
        Ok(())
    }
}

impl From<RelationalTransaction> for BackendSession {
    fn from(txn: RelationalTransaction) -> Self {
        BackendSession::Relational(txn)
    }
}

impl From<DocumentSession> for BackendSession {
    fn from(session: DocumentSession) -> Self {
        BackendSession::Document(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steadfast_core::IsolationLevel;
    use steadfast_storage::{DocumentStore, RelationalEngine};

    #[tokio::test]
    async fn test_relational_binding_lifecycle() {
        let engine = RelationalEngine::new();
        let mut session = BackendSession::from(engine.begin(IsolationLevel::RepeatableRead).await);
        assert_eq!(session.name(), "relational");
        assert!(session.is_open());
        assert!(session.relational_mut().is_ok());
        assert!(matches!(session.document_mut(), Err(Error::BackendMismatch { .. })));

        session.commit().await.unwrap();
        assert!(!session.is_open());
        // Rolling back after commit is a no-op
        session.rollback().await.unwrap();
        assert!(session.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_document_binding_lifecycle() {
        let store = DocumentStore::new();
        let mut raw = store.start_session().await;
        raw.start_transaction().unwrap();
        let mut session = BackendSession::from(raw);
        assert_eq!(session.name(), "document");
        assert!(matches!(session.relational_mut(), Err(Error::BackendMismatch { .. })));

        session.rollback().await.unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.commit().await, Err(Error::Storage(_))));
    }
}
