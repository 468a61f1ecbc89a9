use crate::error::AppResult;
use crate::store::{Store, StoreTxn};

/// Scoped unit-of-work boundary over a [`Store`].
///
/// Mutations go through [`UnitOfWork::txn`]; [`UnitOfWork::commit`] makes
/// them durable together. Dropping the value without committing rolls back
/// everything performed since [`UnitOfWork::begin`], whether the exit was an
/// early `?` return or a panic, and releases the underlying connection or
/// lock. Failed units of work are reported to the caller as-is; there are no
/// retries.
pub struct UnitOfWork {
    txn: Box<dyn StoreTxn>,
}

impl UnitOfWork {
    pub async fn begin(store: &dyn Store) -> AppResult<Self> {
        Ok(Self {
            txn: store.begin().await?,
        })
    }

    pub fn txn(&mut self) -> &mut dyn StoreTxn {
        &mut *self.txn
    }

    pub async fn commit(self) -> AppResult<()> {
        self.txn.commit().await
    }
}
