use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::model::order::Order;

/// Durable order set: one flat JSON list on disk, overwritten atomically
/// under a process-wide lock.
///
/// Writers never blind-write a stale snapshot. `commit_touched` re-reads the
/// file under the lock and overwrites only the orders the caller actually
/// mutated, so a sell created mid-tick survives a concurrent progress-loop
/// commit.
pub struct OrderStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OrderStore {
    pub fn new(path: PathBuf) -> Self {
        OrderStore { path, lock: Mutex::new(()) }
    }

    /// Read the full order set. The snapshot is immediately stale; treat it
    /// as read-only except for orders this caller owns this tick.
    pub fn snapshot(&self) -> Result<Vec<Order>> {
        let _guard = self.lock.lock().unwrap();
        self.read_unlocked()
    }

    pub fn get(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.snapshot()?.into_iter().find(|o| o.id == id))
    }

    pub fn append(&self, order: &Order) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut orders = self.read_unlocked()?;
        orders.push(order.clone());
        self.write_unlocked(&orders)
    }

    /// Mutate one order in place under the lock. Returns the updated order,
    /// or None if the id is unknown.
    pub fn update<F>(&self, id: &str, mutate: F) -> Result<Option<Order>>
    where
        F: FnOnce(&mut Order),
    {
        let _guard = self.lock.lock().unwrap();
        let mut orders = self.read_unlocked()?;
        let Some(order) = orders.iter_mut().find(|o| o.id == id) else {
            return Ok(None);
        };
        mutate(order);
        let updated = order.clone();
        self.write_unlocked(&orders)?;
        Ok(Some(updated))
    }

    /// Merge-commit: for each touched order the caller's copy wins; every
    /// other order keeps whatever is on disk right now.
    pub fn commit_touched(&self, touched: &[Order]) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut orders = self.read_unlocked()?;
        for updated in touched {
            match orders.iter_mut().find(|o| o.id == updated.id) {
                Some(existing) => *existing = updated.clone(),
                None => orders.push(updated.clone()),
            }
        }
        self.write_unlocked(&orders)
    }

    fn read_unlocked(&self) -> Result<Vec<Order>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading order store {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).context("parsing order store")
    }

    /// Atomic replace: write a sibling temp file, then rename over the
    /// original so readers never observe a half-written list.
    fn write_unlocked(&self, orders: &[Order]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(orders)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;
    use crate::model::book::Side;
    use crate::model::order::OrderStatus;
    use std::collections::BTreeMap;

    fn buy(wallet: &str) -> Order {
        Order::new_buy(
            wallet.into(),
            "ev".into(),
            "home".into(),
            Side::Yes,
            10.0,
            8453,
            BTreeMap::new(),
        )
    }

    fn store() -> (tempfile::TempDir, OrderStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = OrderStore::new(dir.path().join("orders.json"));
        (dir, store)
    }

    #[test]
    fn append_and_get_round_trip() {
        let (_dir, store) = store();
        assert!(store.snapshot().unwrap().is_empty());

        let order = buy("0xaaa");
        store.append(&order).unwrap();
        let loaded = store.get(&order.id).unwrap().unwrap();
        assert_eq!(loaded.wallet, "0xaaa");
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn update_mutates_in_place() {
        let (_dir, store) = store();
        let order = buy("0xaaa");
        store.append(&order).unwrap();

        let updated = store
            .update(&order.id, |o| o.kill())
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Killed);
        assert_eq!(store.get(&order.id).unwrap().unwrap().status, OrderStatus::Killed);
        assert!(store.update("nope", |_| {}).unwrap().is_none());
    }

    #[test]
    fn commit_touched_preserves_concurrent_writes() {
        let (_dir, store) = store();
        let mut a = buy("0xaaa");
        let b = buy("0xbbb");
        store.append(&a).unwrap();
        store.append(&b).unwrap();

        // tick snapshots, then a sell gets created and b gets killed on disk
        let _snapshot = store.snapshot().unwrap();
        let sell = buy("0xccc");
        store.append(&sell).unwrap();
        store.update(&b.id, |o| o.kill()).unwrap();

        // the tick commits only the order it touched
        a.status = OrderStatus::Sent;
        store.commit_touched(std::slice::from_ref(&a)).unwrap();

        let after = store.snapshot().unwrap();
        assert_eq!(after.len(), 3);
        let by_id = |id: &str| after.iter().find(|o| o.id == id).unwrap();
        // touched order took the tick's value
        assert_eq!(by_id(&a.id).status, OrderStatus::Sent);
        // concurrent kill and concurrent append both survive
        assert_eq!(by_id(&b.id).status, OrderStatus::Killed);
        assert_eq!(by_id(&sell.id).wallet, "0xccc");
    }

    #[test]
    fn commit_touched_appends_unknown_orders() {
        let (_dir, store) = store();
        let a = buy("0xaaa");
        store.commit_touched(std::slice::from_ref(&a)).unwrap();
        assert_eq!(store.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn platforms_survive_persistence() {
        let (_dir, store) = store();
        let mut order = buy("0xaaa");
        order.platforms.insert(
            Platform::Opinion,
            crate::model::order::PlatformPlan {
                market: Some("42".into()),
                token: Some("901".into()),
                spent: 5.5,
                qty: 11.0,
            },
        );
        store.append(&order).unwrap();
        let loaded = store.get(&order.id).unwrap().unwrap();
        assert_eq!(loaded.platforms[&Platform::Opinion].token.as_deref(), Some("901"));
    }
}
