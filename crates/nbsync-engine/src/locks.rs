//! Per-member async locks.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// A keyed set of async mutexes. Holding the guard for a member serializes
/// every other sync of that member within this process.
#[derive(Debug, Default)]
pub struct MemberLocks {
  inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl MemberLocks {
  pub async fn lock(&self, member_id: Uuid) -> OwnedMutexGuard<()> {
    let lock = {
      let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
      // Entries nobody holds or waits on.
      map.retain(|_, l| Arc::strong_count(l) > 1);
      map.entry(member_id).or_default().clone()
    };
    lock.lock_owned().await
  }

  /// Number of members currently locked or waited on.
  pub fn len(&self) -> usize {
    let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    map.values().filter(|l| Arc::strong_count(l) > 1).count()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn same_member_waits() {
    let locks = Arc::new(MemberLocks::default());
    let id = Uuid::new_v4();

    let guard = locks.lock(id).await;
    assert_eq!(locks.len(), 1);

    let waiter = {
      let locks = locks.clone();
      tokio::spawn(async move {
        let _g = locks.lock(id).await;
      })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    drop(guard);
    waiter.await.unwrap();
    assert!(locks.is_empty());
  }

  #[tokio::test]
  async fn different_members_do_not_block() {
    let locks = MemberLocks::default();
    let _a = locks.lock(Uuid::new_v4()).await;
    let _b = locks.lock(Uuid::new_v4()).await;
    assert_eq!(locks.len(), 2);
  }
}
