use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_lock::Barrier;
use async_slru::{AsyncCacheValue, AsyncSlruCache, Error, ValueBase};

const NUM_TASKS: usize = 16;

#[derive(Debug)]
struct Chunk {
    base: ValueBase<String>,
    payload: Vec<u8>,
}

impl Chunk {
    fn new(key: &str, len: usize) -> Arc<Self> {
        Arc::new(Self {
            base: ValueBase::new(key.to_string()),
            payload: vec![0u8; len],
        })
    }
}

impl AsyncCacheValue for Chunk {
    type Key = String;

    fn value_base(&self) -> &ValueBase<String> {
        &self.base
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_with() {
    const ONE_MIB: usize = 1024 * 1024;
    init_logger();

    let cache = AsyncSlruCache::builder()
        .capacity(100 * ONE_MIB as i64)
        .weigher(|c: &Chunk| c.payload.len() as i64)
        .name("get-with")
        .build();
    let call_counter = Arc::new(AtomicUsize::default());
    let barrier = Arc::new(Barrier::new(NUM_TASKS));

    let tasks: Vec<_> = (0..NUM_TASKS)
        .map(|task_id| {
            let my_cache = cache.clone();
            let my_call_counter = Arc::clone(&call_counter);
            let my_barrier = Arc::clone(&barrier);

            tokio::spawn(async move {
                my_barrier.wait().await;

                println!("Task {task_id} started.");

                let value = my_cache
                    .get_with("key1".to_string(), async move {
                        println!("Task {task_id} producing the value.");
                        my_call_counter.fetch_add(1, Ordering::AcqRel);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Chunk::new("key1", ONE_MIB)
                    })
                    .await
                    .unwrap();

                assert_eq!(value.payload.len(), ONE_MIB);
                assert!(my_cache.find(&"key1".to_string()).is_some());
                value
            })
        })
        .collect();

    let mut values = Vec::with_capacity(NUM_TASKS);
    for task in tasks {
        values.push(task.await.unwrap());
    }

    assert_eq!(call_counter.load(Ordering::Acquire), 1);
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));

    let stats = cache.stats();
    assert_eq!(stats.missed_count(), 1);
    assert_eq!(stats.missed_weight(), ONE_MIB as u64);
    assert_eq!(
        stats.sync_hit_count() + stats.async_hit_count(),
        NUM_TASKS as u64 - 1 + NUM_TASKS as u64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_active_cookie() {
    init_logger();

    let cache: AsyncSlruCache<Chunk> = AsyncSlruCache::new(100);
    let active_count = Arc::new(AtomicUsize::default());
    let barrier = Arc::new(Barrier::new(NUM_TASKS));

    let tasks: Vec<_> = (0..NUM_TASKS)
        .map(|_| {
            let my_cache = cache.clone();
            let my_active_count = Arc::clone(&active_count);
            let my_barrier = Arc::clone(&barrier);

            tokio::spawn(async move {
                my_barrier.wait().await;

                let cookie = my_cache.begin_insert("x".to_string());
                if cookie.is_active() {
                    my_active_count.fetch_add(1, Ordering::AcqRel);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    cookie.end_insert(Chunk::new("x", 42));
                }
                cookie.value().await.unwrap()
            })
        })
        .collect();

    let mut values = Vec::with_capacity(NUM_TASKS);
    for task in tasks {
        values.push(task.await.unwrap());
    }

    assert_eq!(active_count.load(Ordering::Acquire), 1);
    assert!(values.iter().all(|v| v.payload.len() == 42));
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    assert_eq!(cache.entry_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropped_cookie_cancels_all_waiters() {
    init_logger();

    let cache: AsyncSlruCache<Chunk> = AsyncSlruCache::new(100);
    let key = "k".to_string();

    let cookie = cache.begin_insert(key.clone());
    assert!(cookie.is_active());

    let waiters: Vec<_> = (0..NUM_TASKS)
        .map(|_| {
            let future = cache.lookup(&key).unwrap();
            tokio::spawn(async move { future.await })
        })
        .collect();

    // The producer gives up without producing anything.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(cookie);
    })
    .await
    .unwrap();

    for waiter in waiters {
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(Error::Canceled)));
    }
    assert_eq!(cache.entry_count(), 0);
    assert!(cache.lookup(&key).is_none());

    // Nobody retries automatically, but a new producer may.
    assert!(cache.begin_insert(key).is_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_try_get_with_shares_the_error() {
    init_logger();

    let cache: AsyncSlruCache<Chunk> = AsyncSlruCache::builder().capacity(10).build();
    let call_counter = Arc::new(AtomicUsize::default());
    let barrier = Arc::new(Barrier::new(NUM_TASKS));

    let tasks: Vec<_> = (0..NUM_TASKS)
        .map(|_| {
            let my_cache = cache.clone();
            let my_call_counter = Arc::clone(&call_counter);
            let my_barrier = Arc::clone(&barrier);

            tokio::spawn(async move {
                my_barrier.wait().await;
                my_cache
                    .try_get_with("broken".to_string(), async move {
                        my_call_counter.fetch_add(1, Ordering::AcqRel);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(anyhow::anyhow!("chunk is corrupted"))
                    })
                    .await
            })
        })
        .collect();

    let mut errors = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Err(Error::Insert(e)) => errors.push(e),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    // Tasks that came after the failure produced (and failed) again. Those that
    // joined an in-flight attempt share its error.
    let producers = call_counter.load(Ordering::Acquire);
    assert!(producers >= 1);
    let distinct = errors
        .iter()
        .enumerate()
        .filter(|(i, e)| errors[..*i].iter().all(|prev| !Arc::ptr_eq(prev, e)))
        .count();
    assert_eq!(distinct, producers);
    assert!(errors.iter().all(|e| e.to_string() == "chunk is corrupted"));
    assert_eq!(cache.entry_count(), 0);
}

#[tokio::test]
async fn test_custom_hasher() {
    init_logger();

    let cache = AsyncSlruCache::builder()
        .capacity(3)
        .shard_count(2)
        .build_with_hasher(ahash::RandomState::default());

    for key in ["a", "b", "c"] {
        let value = cache
            .get_with(key.to_string(), async move { Chunk::new(key, 1) })
            .await
            .unwrap();
        assert_eq!(value.key(), key);
    }

    for key in ["a", "b", "c"] {
        let future = cache.lookup(&key.to_string());
        if let Some(future) = future {
            assert_eq!(future.await.unwrap().key(), key);
        }
    }
    let stats = cache.stats();
    assert!(stats.younger_weight() + stats.older_weight() <= 3);
}
