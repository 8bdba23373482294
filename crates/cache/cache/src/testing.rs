use std::time::Duration;

use crate::error::StoreError;
use crate::store::Store;

/// Run the store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
/// [`Store::flush`] is covered separately by [`run_flush_conformance_test`]
/// because it wipes the whole backend.
///
/// # Errors
///
/// Returns an error if the backend fails an operation.
pub async fn run_store_conformance_tests(store: &dyn Store) -> Result<(), StoreError> {
    test_get_missing(store).await?;
    test_put_and_get(store).await?;
    test_forever(store).await?;
    test_add_new(store).await?;
    test_add_existing(store).await?;
    test_forget(store).await?;
    test_increment_existing(store).await?;
    test_many_preserves_order(store).await?;
    test_put_many(store).await?;
    test_ttl_put(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn Store) -> Result<(), StoreError> {
    let val = store.get("conformance/missing").await?;
    assert!(val.is_none(), "get on missing key should return None");
    Ok(())
}

async fn test_put_and_get(store: &dyn Store) -> Result<(), StoreError> {
    assert!(store.put("conformance/put-get", "hello", None).await?);
    let val = store.get("conformance/put-get").await?;
    assert_eq!(val.as_deref(), Some("hello"));

    store.put("conformance/put-get", "again", None).await?;
    let val = store.get("conformance/put-get").await?;
    assert_eq!(val.as_deref(), Some("again"), "put should overwrite");
    Ok(())
}

async fn test_forever(store: &dyn Store) -> Result<(), StoreError> {
    assert!(store.forever("conformance/forever", "stays").await?);
    let val = store.get("conformance/forever").await?;
    assert_eq!(val.as_deref(), Some("stays"));
    Ok(())
}

async fn test_add_new(store: &dyn Store) -> Result<(), StoreError> {
    let created = store
        .add("conformance/add-new", "v1", Some(Duration::from_secs(60)))
        .await?;
    assert!(created, "add on new key should return true");
    let val = store.get("conformance/add-new").await?;
    assert_eq!(val.as_deref(), Some("v1"));
    Ok(())
}

async fn test_add_existing(store: &dyn Store) -> Result<(), StoreError> {
    store.put("conformance/add-existing", "v1", None).await?;
    let created = store
        .add("conformance/add-existing", "v2", Some(Duration::from_secs(60)))
        .await?;
    assert!(!created, "add on existing key should return false");
    let val = store.get("conformance/add-existing").await?;
    assert_eq!(val.as_deref(), Some("v1"), "original value should remain");
    Ok(())
}

async fn test_forget(store: &dyn Store) -> Result<(), StoreError> {
    store.put("conformance/forget", "bye", None).await?;
    assert!(store.forget("conformance/forget").await?);
    let val = store.get("conformance/forget").await?;
    assert!(val.is_none(), "get after forget should return None");
    Ok(())
}

async fn test_increment_existing(store: &dyn Store) -> Result<(), StoreError> {
    store.put("conformance/counter", "10", None).await?;

    let val = store.increment("conformance/counter", 5).await?;
    assert_eq!(val, 15, "increment should add to the stored value");

    let val = store.decrement("conformance/counter", 3).await?;
    assert_eq!(val, 12, "decrement should subtract from the stored value");
    Ok(())
}

async fn test_many_preserves_order(store: &dyn Store) -> Result<(), StoreError> {
    store.put("conformance/many-b", "b", None).await?;
    store.put("conformance/many-a", "a", None).await?;

    let found = store
        .many(&["conformance/many-a", "conformance/many-none", "conformance/many-b"])
        .await?;
    assert_eq!(
        found,
        vec![
            ("conformance/many-a".to_owned(), Some("a".to_owned())),
            ("conformance/many-none".to_owned(), None),
            ("conformance/many-b".to_owned(), Some("b".to_owned())),
        ]
    );
    Ok(())
}

async fn test_put_many(store: &dyn Store) -> Result<(), StoreError> {
    let stored = store
        .put_many(
            &[("conformance/pm-1", "one"), ("conformance/pm-2", "two")],
            Some(Duration::from_secs(60)),
        )
        .await?;
    assert!(stored);
    assert_eq!(store.get("conformance/pm-1").await?.as_deref(), Some("one"));
    assert_eq!(store.get("conformance/pm-2").await?.as_deref(), Some("two"));
    Ok(())
}

async fn test_ttl_put(store: &dyn Store) -> Result<(), StoreError> {
    store
        .put("conformance/ttl", "ephemeral", Some(Duration::from_secs(3600)))
        .await?;
    let val = store.get("conformance/ttl").await?;
    assert_eq!(val.as_deref(), Some("ephemeral"));
    Ok(())
}

/// Check that [`Store::flush`] removes every entry.
///
/// # Errors
///
/// Returns an error if the backend fails an operation.
pub async fn run_flush_conformance_test(store: &dyn Store) -> Result<(), StoreError> {
    store.put("conformance/flush-1", "x", None).await?;
    store
        .put("conformance/flush-2", "y", Some(Duration::from_secs(60)))
        .await?;

    assert!(store.flush().await?, "flush should report success");
    assert!(store.get("conformance/flush-1").await?.is_none());
    assert!(store.get("conformance/flush-2").await?.is_none());
    Ok(())
}

/// Run the lock conformance test suite against the locks a store hands out.
///
/// # Errors
///
/// Returns an error if the backend fails an operation.
pub async fn run_lock_conformance_tests(store: &dyn Store) -> Result<(), StoreError> {
    test_acquire_and_release(store).await?;
    test_acquire_contention(store).await?;
    test_release_requires_owner(store).await?;
    test_force_release(store).await?;
    test_restore_lock(store).await?;
    test_no_expiry_lock(store).await?;
    test_job_scenario(store).await?;
    Ok(())
}

async fn test_acquire_and_release(store: &dyn Store) -> Result<(), StoreError> {
    let lock = store.lock("conformance-lock-1", 10, None);
    assert!(lock.acquire().await?, "should acquire uncontested lock");
    assert_eq!(lock.current_owner().await?.as_deref(), Some(lock.owner()));
    assert!(lock.is_owned_by_current_process().await?);

    assert!(lock.release().await?, "owner should be able to release");
    assert!(lock.current_owner().await?.is_none());
    Ok(())
}

async fn test_acquire_contention(store: &dyn Store) -> Result<(), StoreError> {
    let held = store.lock("conformance-lock-2", 10, None);
    assert!(held.acquire().await?);

    let second = store.lock("conformance-lock-2", 10, None);
    assert!(
        !second.acquire().await?,
        "second acquire should fail while lock is held"
    );

    held.release().await?;
    assert!(second.acquire().await?, "should acquire after release");
    second.release().await?;
    Ok(())
}

async fn test_release_requires_owner(store: &dyn Store) -> Result<(), StoreError> {
    let a = store.lock("conformance-lock-3", 10, Some("owner-a".into()));
    let b = store.lock("conformance-lock-3", 10, Some("owner-b".into()));
    assert!(a.acquire().await?);

    assert!(!b.release().await?, "non-owner release must fail");
    assert_eq!(
        b.current_owner().await?.as_deref(),
        Some("owner-a"),
        "non-owner release must not remove the record"
    );

    assert!(a.release().await?);
    Ok(())
}

async fn test_force_release(store: &dyn Store) -> Result<(), StoreError> {
    let a = store.lock("conformance-lock-4", 10, Some("owner-a".into()));
    let b = store.lock("conformance-lock-4", 10, Some("owner-b".into()));
    assert!(a.acquire().await?);

    b.force_release().await?;
    assert!(b.current_owner().await?.is_none());
    assert!(b.acquire().await?, "any owner may acquire after force release");

    b.release().await?;
    Ok(())
}

async fn test_restore_lock(store: &dyn Store) -> Result<(), StoreError> {
    let original = store.lock("conformance-lock-5", 10, None);
    assert!(original.acquire().await?);

    let restored = store.restore_lock("conformance-lock-5", original.owner());
    assert_eq!(restored.owner(), original.owner());
    assert!(restored.is_owned_by_current_process().await?);
    assert!(restored.release().await?, "restored lock should release");
    assert!(original.current_owner().await?.is_none());
    Ok(())
}

async fn test_no_expiry_lock(store: &dyn Store) -> Result<(), StoreError> {
    let a = store.lock("conformance-lock-6", 0, None);
    assert!(a.acquire().await?);

    let b = store.lock("conformance-lock-6", 0, None);
    assert!(!b.acquire().await?);

    a.release().await?;
    Ok(())
}

async fn test_job_scenario(store: &dyn Store) -> Result<(), StoreError> {
    assert!(
        store
            .lock("job:42", 10, Some("worker-1".into()))
            .acquire()
            .await?
    );
    assert!(
        !store
            .lock("job:42", 10, Some("worker-2".into()))
            .acquire()
            .await?
    );

    store
        .lock("job:42", 10, Some("worker-2".into()))
        .force_release()
        .await?;
    let worker2 = store.lock("job:42", 10, Some("worker-2".into()));
    assert!(worker2.acquire().await?);

    worker2.release().await?;
    Ok(())
}
