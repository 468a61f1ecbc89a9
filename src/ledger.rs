//! Stock reservation and release across a set of order lines.

use uuid::Uuid;

use crate::error::AppResult;
use crate::models::OrderLine;
use crate::store::{PricedLine, StoreTxn};

/// Reserve stock for every line. On the first failure, reservations already
/// applied by this call are released again before the failing line's error
/// is returned. (Inside a unit of work the rollback subsumes this; the
/// compensation keeps the helper correct standalone as well.)
pub async fn reserve_all(txn: &mut dyn StoreTxn, lines: &[PricedLine]) -> AppResult<()> {
    let mut applied: Vec<(Uuid, i32)> = Vec::new();
    for line in lines {
        match txn.reserve(line.product_id, line.quantity).await {
            Ok(()) => applied.push((line.product_id, line.quantity)),
            Err(err) => {
                for (product_id, quantity) in applied.into_iter().rev() {
                    txn.release(product_id, quantity).await?;
                }
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Return the stock held by committed order lines to the shelf.
pub async fn release_all(txn: &mut dyn StoreTxn, lines: &[OrderLine]) -> AppResult<()> {
    for line in lines {
        txn.release(line.product_id, line.quantity).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::store::memory::MemoryStore;
    use crate::store::Store;

    fn priced(product_id: Uuid, quantity: i32) -> PricedLine {
        PricedLine {
            product_id,
            name: String::new(),
            price: 0,
            quantity,
        }
    }

    #[tokio::test]
    async fn failed_reserve_all_compensates_earlier_lines() {
        let store = MemoryStore::new();
        let cement = store.insert_product("Cement M400", 38_000, 10).await;
        let sand = store.insert_product("Quarry sand, 1 t", 90_000, 1).await;

        let mut txn = store.begin().await.unwrap();
        let lines = vec![priced(cement.id, 4), priced(sand.id, 2)];
        let err = reserve_all(&mut *txn, &lines).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { .. }));
        // commit anyway: the compensation itself must have restored cement
        txn.commit().await.unwrap();

        let cement = store.product(cement.id).await.unwrap().unwrap();
        let sand = store.product(sand.id).await.unwrap().unwrap();
        assert_eq!(cement.available_quantity, 10);
        assert_eq!(sand.available_quantity, 1);
    }

    #[tokio::test]
    async fn reserve_all_then_release_all_round_trips() {
        let store = MemoryStore::new();
        let brick = store.insert_product("Facing brick, pallet", 540_000, 6).await;

        let mut txn = store.begin().await.unwrap();
        reserve_all(&mut *txn, &[priced(brick.id, 5)]).await.unwrap();
        txn.commit().await.unwrap();

        let order_line = OrderLine {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: brick.id,
            quantity: 5,
            price: 540_000,
            created_at: chrono::Utc::now(),
        };
        let mut txn = store.begin().await.unwrap();
        release_all(&mut *txn, &[order_line]).await.unwrap();
        txn.commit().await.unwrap();

        let brick = store.product(brick.id).await.unwrap().unwrap();
        assert_eq!(brick.available_quantity, 6);
    }
}
