use std::sync::Arc;
use std::time::Duration;

use k1s0_redisync::{CancellationToken, InMemoryLockStore, LockError, LockStore, RedisMutex};

fn shared_store() -> Arc<dyn LockStore> {
    Arc::new(InMemoryLockStore::new())
}

fn mutex(store: &Arc<dyn LockStore>, ttl: Duration) -> RedisMutex {
    RedisMutex::new("redisync.test.1", ttl, store.clone()).unwrap()
}

#[tokio::test]
async fn test_lock_locked_by_other_handle() {
    let store = shared_store();
    let ttl = Duration::from_secs(1);
    let m1 = mutex(&store, ttl);
    let m2 = mutex(&store, ttl);

    assert!(m1.try_lock().await.unwrap());
    assert!(!m2.try_lock().await.unwrap());

    tokio::time::sleep(ttl).await;
    assert!(m2.try_lock().await.unwrap());
    assert!(m2.unlock().await.unwrap());
}

#[tokio::test]
async fn test_unlock_then_other_handle_acquires_immediately() {
    let store = shared_store();
    let ttl = Duration::from_secs(10);
    let m1 = mutex(&store, ttl);
    let m2 = mutex(&store, ttl);

    assert!(m1.try_lock().await.unwrap());
    assert!(m1.unlock().await.unwrap());
    assert!(m2.try_lock().await.unwrap());
}

#[tokio::test]
async fn test_unlock_by_other_handle_is_rejected() {
    let store = shared_store();
    let ttl = Duration::from_secs(10);
    let m1 = mutex(&store, ttl);
    let m2 = mutex(&store, ttl);

    assert!(m1.try_lock().await.unwrap());
    assert!(!m2.unlock().await.unwrap());
    assert!(m1.is_held().await.unwrap());
    assert!(m1.unlock().await.unwrap());
}

#[tokio::test]
async fn test_double_unlock_second_returns_false() {
    let store = shared_store();
    let m1 = mutex(&store, Duration::from_secs(10));

    assert!(m1.try_lock().await.unwrap());
    assert!(m1.unlock().await.unwrap());
    assert!(!m1.unlock().await.unwrap());
}

#[tokio::test]
async fn test_renewal_keeps_ownership_past_original_ttl() {
    let store = shared_store();
    let ttl = Duration::from_millis(200);
    let m1 = mutex(&store, ttl);
    let m2 = mutex(&store, ttl);

    assert!(m1.try_lock().await.unwrap());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(m1.try_lock().await.unwrap());
    tokio::time::sleep(Duration::from_millis(120)).await;

    // 最初の取得から TTL を超えているが、更新により m1 が保持し続けている
    assert!(!m2.try_lock().await.unwrap());
    assert!(m1.is_held().await.unwrap());
}

#[tokio::test]
async fn test_lock_waits_for_expiry() {
    let store = shared_store();
    let m1 = mutex(&store, Duration::from_millis(100));
    let m2 = mutex(&store, Duration::from_secs(10))
        .with_backoff(Duration::from_millis(20))
        .unwrap();

    assert!(m1.try_lock().await.unwrap());
    tokio::time::timeout(Duration::from_secs(2), m2.lock())
        .await
        .expect("lock should be acquired after the holder's TTL")
        .unwrap();
    assert!(m2.is_held().await.unwrap());
}

#[tokio::test]
async fn test_lock_waits_for_unlock() {
    let store = shared_store();
    let m1 = Arc::new(mutex(&store, Duration::from_secs(10)));
    let m2 = mutex(&store, Duration::from_secs(10))
        .with_backoff(Duration::from_millis(10))
        .unwrap();

    assert!(m1.try_lock().await.unwrap());
    let holder = m1.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        holder.unlock().await.unwrap();
    });

    m2.lock_with_timeout(Duration::from_secs(2)).await.unwrap();
    assert!(m2.is_held().await.unwrap());
}

#[tokio::test]
async fn test_lock_with_cancel_returns_cancelled() {
    let store = shared_store();
    let m1 = mutex(&store, Duration::from_secs(10));
    let m2 = mutex(&store, Duration::from_secs(10))
        .with_backoff(Duration::from_millis(20))
        .unwrap();
    assert!(m1.try_lock().await.unwrap());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        trigger.cancel();
    });

    let result = m2.lock_with_cancel(&cancel).await;
    assert!(matches!(result, Err(LockError::Cancelled(name)) if name == "redisync.test.1"));
    assert!(m1.is_held().await.unwrap());
}

#[tokio::test]
async fn test_lock_with_cancel_acquires_when_free() {
    let store = shared_store();
    let m1 = mutex(&store, Duration::from_secs(10));
    let cancel = CancellationToken::new();
    m1.lock_with_cancel(&cancel).await.unwrap();
    assert!(m1.is_held().await.unwrap());
}

#[tokio::test]
async fn test_only_one_of_many_handles_acquires() {
    let store = shared_store();
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let m = mutex(&store, Duration::from_secs(10));
        tasks.push(tokio::spawn(async move { m.try_lock().await.unwrap() }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_shared_handle_concurrent_calls_all_succeed() {
    let store = shared_store();
    let m = Arc::new(mutex(&store, Duration::from_secs(10)));
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let m = m.clone();
        tasks.push(tokio::spawn(async move { m.try_lock().await.unwrap() }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert!(m.unlock().await.unwrap());
}

#[tokio::test]
async fn test_different_names_do_not_contend() {
    let store = shared_store();
    let a = RedisMutex::new("resource-a", Duration::from_secs(10), store.clone()).unwrap();
    let b = RedisMutex::new("resource-b", Duration::from_secs(10), store).unwrap();
    assert!(a.try_lock().await.unwrap());
    assert!(b.try_lock().await.unwrap());
}

#[tokio::test]
async fn test_waiting_lock_does_not_block_same_handle_callers() {
    let store = shared_store();
    let holder = mutex(&store, Duration::from_secs(10));
    let waiter = Arc::new(
        mutex(&store, Duration::from_secs(10))
            .with_backoff(Duration::from_secs(5))
            .unwrap(),
    );
    assert!(holder.try_lock().await.unwrap());

    let parked = waiter.clone();
    let wait_task =
        tokio::spawn(async move { parked.lock_with_timeout(Duration::from_secs(30)).await });
    // 1 回目の取得試行が終わり、バックオフ待機に入るまで待つ
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let released = tokio::time::timeout(Duration::from_millis(500), waiter.unlock())
        .await
        .expect("unlock must not wait for the backoff of a parked lock call")
        .unwrap();
    assert!(!released);
    let attempted = tokio::time::timeout(Duration::from_millis(500), waiter.try_lock())
        .await
        .expect("try_lock must not wait for the backoff of a parked lock call")
        .unwrap();
    assert!(!attempted);
    assert!(started.elapsed() < Duration::from_secs(1));

    wait_task.abort();
}
