//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Pool lifecycle: eviction clocks, capacity accounting, quiescent close.

use sessionwire::connection::ConnectionError;
use sessionwire::pool::{
    EndpointPool, PoolConfig, PoolError, PooledConnection, TakeResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct TestConn {
    closed: Arc<AtomicBool>,
    aborted: Arc<AtomicBool>,
}

impl TestConn {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PooledConnection for TestConn {
    async fn close(&mut self, _timeout: Duration) -> Result<(), ConnectionError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

fn test_config() -> PoolConfig {
    PoolConfig {
        max_pool_size: 3,
        idle_timeout: Some(Duration::from_secs(120)),
        lease_timeout: Some(Duration::from_secs(300)),
    }
}

/// Checks out a connection, creating one if the pool grants a permit.
fn checkout(
    pool: &EndpointPool<&'static str, TestConn>,
    key: &'static str,
) -> sessionwire::pool::PooledHandle<TestConn> {
    let take = pool.take(&key).unwrap();
    assert!(take.stale.is_empty());
    match take.result {
        TakeResult::Reuse(handle) => handle,
        TakeResult::Create => pool.register_created(&key, TestConn::default()).unwrap(),
        TakeResult::AtCapacity => panic!("unexpected capacity exhaustion"),
    }
}

#[tokio::test]
async fn test_connection_reused_across_checkouts() {
    let pool = EndpointPool::new(test_config()).unwrap();

    let handle = checkout(&pool, "dest");
    let first_state = Arc::clone(&handle.item().closed);
    pool.return_to_pool(&"dest", handle, true).unwrap();

    let handle = checkout(&pool, "dest");
    assert!(Arc::ptr_eq(&first_state, &handle.item().closed));
    pool.return_to_pool(&"dest", handle, true).unwrap();
}

#[tokio::test]
async fn test_capacity_limits_concurrent_checkouts() {
    let pool = EndpointPool::new(test_config()).unwrap();

    let h1 = checkout(&pool, "dest");
    let h2 = checkout(&pool, "dest");
    let h3 = checkout(&pool, "dest");
    assert_eq!(pool.checked_out_count(), 3);

    let take = pool.take(&"dest").unwrap();
    assert!(matches!(take.result, TakeResult::AtCapacity));

    pool.return_to_pool(&"dest", h1, true).unwrap();
    let take = pool.take(&"dest").unwrap();
    assert!(matches!(take.result, TakeResult::Reuse(_)));

    // Idle plus checked out still caps at three.
    if let TakeResult::Reuse(h) = take.result {
        pool.return_to_pool(&"dest", h, true).unwrap();
    }
    pool.return_to_pool(&"dest", h2, true).unwrap();
    pool.return_to_pool(&"dest", h3, true).unwrap();
    assert_eq!(pool.idle_count(&"dest"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_idle_clock_evicts_unused_connections() {
    let pool = EndpointPool::new(test_config()).unwrap();

    // Two idle connections arm the sweep timer.
    let h1 = checkout(&pool, "dest");
    let h2 = checkout(&pool, "dest");
    let c1 = h1.item().clone();
    let c2 = h2.item().clone();
    pool.return_to_pool(&"dest", h1, true).unwrap();
    pool.return_to_pool(&"dest", h2, true).unwrap();
    assert_eq!(pool.idle_count(&"dest"), 2);

    tokio::time::sleep(Duration::from_secs(121)).await;
    tokio::task::yield_now().await;

    assert_eq!(pool.idle_count(&"dest"), 0);
    assert!(c1.is_closed());
    assert!(c2.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_lease_clock_refuses_long_lived_connection() {
    let pool = EndpointPool::new(test_config()).unwrap();
    let handle = checkout(&pool, "dest");

    // Held (busy the whole time) past the lease; never idle.
    tokio::time::advance(Duration::from_secs(301)).await;

    let refused = pool.return_to_pool(&"dest", handle, true).unwrap();
    assert!(refused.is_some(), "leased-out connection must not re-pool");
    assert_eq!(pool.idle_count(&"dest"), 0);
}

#[tokio::test]
async fn test_error_path_return_is_not_pooled() {
    let pool = EndpointPool::new(test_config()).unwrap();
    let handle = checkout(&pool, "dest");

    let dead = pool.return_to_pool(&"dest", handle, false).unwrap();
    assert!(dead.is_some());
    assert_eq!(pool.idle_count(&"dest"), 0);
    assert_eq!(pool.checked_out_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_graceful_close_waits_then_drains_idle() {
    let pool = Arc::new(EndpointPool::new(test_config()).unwrap());

    let idle_handle = checkout(&pool, "dest");
    let idle_conn = idle_handle.item().clone();
    pool.return_to_pool(&"dest", idle_handle, true).unwrap();

    let out_handle = checkout(&pool, "dest");
    let out_conn = out_handle.item().clone();

    let returner = Arc::clone(&pool);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The pool is closing by now; the connection comes back to us.
        let refused = returner
            .return_to_pool(&"dest", out_handle, true)
            .unwrap();
        let mut conn = refused.expect("closing pool must refuse the return");
        conn.close(Duration::from_secs(1)).await.unwrap();
    });

    pool.close(Duration::from_secs(5)).await.unwrap();
    assert!(idle_conn.is_closed());
    assert!(out_conn.is_closed());

    assert!(matches!(
        pool.take(&"dest"),
        Err(PoolError::Lifetime(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_close_timeout_when_connection_never_returns() {
    let pool = EndpointPool::new(test_config()).unwrap();
    let _held = checkout(&pool, "dest");

    let result = pool.close(Duration::from_millis(100)).await;
    assert!(matches!(result, Err(PoolError::Lifetime(_))));
}

#[tokio::test]
async fn test_abort_tears_down_idle_immediately() {
    let pool = EndpointPool::new(test_config()).unwrap();

    let handle = checkout(&pool, "dest");
    let conn = handle.item().clone();
    pool.return_to_pool(&"dest", handle, true).unwrap();

    pool.abort();
    assert!(conn.aborted.load(Ordering::SeqCst));
    assert!(pool.take(&"dest").is_err());
}

#[tokio::test(start_paused = true)]
async fn test_stale_connection_closed_by_caller_on_take() {
    let pool = EndpointPool::new(test_config()).unwrap();

    let handle = checkout(&pool, "dest");
    let conn = handle.item().clone();
    pool.return_to_pool(&"dest", handle, true).unwrap();

    // Single idle connection: no sweep timer, caught at take time.
    tokio::time::advance(Duration::from_secs(121)).await;
    let take = pool.take(&"dest").unwrap();
    assert_eq!(take.stale.len(), 1);
    assert!(matches!(take.result, TakeResult::Create));

    for mut stale in take.stale {
        stale.close(Duration::from_secs(1)).await.unwrap();
    }
    assert!(conn.is_closed());
    pool.create_failed(&"dest");
}
