#[cfg(test)]
mod tests {
    use crate::client::LockClient;
    use crate::config::ClientConfig;
    use crate::error::{LockError, Result};
    use crate::events::EventSource;
    use crate::listener::ListenerState;
    use crate::manager::LockManager;
    use crate::transport::{LocalTransport, LockTransport};
    use crate::types::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::Instant;

    struct CountingTransport {
        inner: LocalTransport,
        lock_calls: AtomicUsize,
    }

    impl CountingTransport {
        fn lock_calls(&self) -> usize {
            self.lock_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LockTransport for CountingTransport {
        async fn send_lock_requests(&self, message: LockRequestsMessage) -> Result<LockResponsesMessage> {
            self.lock_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.send_lock_requests(message).await
        }

        async fn send_unlock_requests(&self, message: UnlockRequestsMessage) -> Result<UnlockedObjectsMessage> {
            self.inner.send_unlock_requests(message).await
        }
    }

    /// Never answers.
    struct StalledTransport;

    #[async_trait]
    impl LockTransport for StalledTransport {
        async fn send_lock_requests(&self, _message: LockRequestsMessage) -> Result<LockResponsesMessage> {
            std::future::pending().await
        }

        async fn send_unlock_requests(&self, _message: UnlockRequestsMessage) -> Result<UnlockedObjectsMessage> {
            std::future::pending().await
        }
    }

    /// Answers every lock request with nothing.
    struct EmptyTransport;

    #[async_trait]
    impl LockTransport for EmptyTransport {
        async fn send_lock_requests(&self, _message: LockRequestsMessage) -> Result<LockResponsesMessage> {
            Ok(LockResponsesMessage { responses: vec![] })
        }

        async fn send_unlock_requests(&self, _message: UnlockRequestsMessage) -> Result<UnlockedObjectsMessage> {
            Err(LockError::Remote("unlock refused".to_string()))
        }
    }

    /// Answers the first lock request right away and every later one after `delay`.
    struct SlowTransport {
        inner: LocalTransport,
        lock_calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl LockTransport for SlowTransport {
        async fn send_lock_requests(&self, message: LockRequestsMessage) -> Result<LockResponsesMessage> {
            if self.lock_calls.fetch_add(1, Ordering::SeqCst) > 0 {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.send_lock_requests(message).await
        }

        async fn send_unlock_requests(&self, message: UnlockRequestsMessage) -> Result<UnlockedObjectsMessage> {
            self.inner.send_unlock_requests(message).await
        }
    }

    /// Answers the first lock request and panics on the next.
    struct PanickingTransport {
        inner: LocalTransport,
        lock_calls: AtomicUsize,
    }

    #[async_trait]
    impl LockTransport for PanickingTransport {
        async fn send_lock_requests(&self, message: LockRequestsMessage) -> Result<LockResponsesMessage> {
            if self.lock_calls.fetch_add(1, Ordering::SeqCst) > 0 {
                panic!("transport blew up");
            }
            self.inner.send_lock_requests(message).await
        }

        async fn send_unlock_requests(&self, message: UnlockRequestsMessage) -> Result<UnlockedObjectsMessage> {
            self.inner.send_unlock_requests(message).await
        }
    }

    /// Event source whose streams never finish opening.
    struct StalledEvents;

    #[async_trait]
    impl EventSource for StalledEvents {
        async fn open_unlock_stream(&self) -> Result<broadcast::Receiver<Vec<String>>> {
            std::future::pending().await
        }

        async fn open_lock_request_stream(&self) -> Result<broadcast::Receiver<LockRequest>> {
            std::future::pending().await
        }
    }

    async fn hold(manager: &Arc<LockManager>, object_id: &str) {
        let holder = LockClient::local(manager.clone());
        let held = holder
            .lock_object(LockRequest::new(object_id).with_requester("holder"), None)
            .await
            .unwrap();
        assert!(held.all_granted());
    }

    fn counting(manager: &Arc<LockManager>) -> Arc<CountingTransport> {
        Arc::new(CountingTransport {
            inner: LocalTransport::new(manager.clone()),
            lock_calls: AtomicUsize::new(0),
        })
    }

    fn client_with(manager: &Arc<LockManager>, transport: Arc<dyn LockTransport>) -> LockClient {
        let events: Arc<dyn EventSource> = Arc::new(manager.events().clone());
        LockClient::new(transport, events)
    }

    fn secs(secs: u64) -> Option<Duration> {
        Some(Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_object_granted_without_waiting() {
        let manager = Arc::new(LockManager::new());
        let client = LockClient::local(manager.clone());

        let request = LockRequest::new("A")
            .with_description("invoice")
            .with_requester("alice")
            .with_priority(Priority::High);
        let result = client.lock_object(request, secs(10)).await.unwrap();

        let info = result.get("A").unwrap();
        assert!(info.is_granted);
        assert_eq!(info.holder, "alice");
        assert_eq!(info.description, "invoice");
        assert_eq!(info.priority, Priority::High);
        assert!(info.auto_unlock_at.is_some());
        assert_eq!(result.total_waiting_time, Duration::ZERO);
        assert_eq!(client.unlock_listener().monitor_starts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_holder_unlocks() {
        let manager = Arc::new(LockManager::new());
        let holder = LockClient::local(manager.clone());
        let waiter = Arc::new(LockClient::local(manager.clone()));

        let held = holder
            .lock_object(LockRequest::new("A").with_requester("holder"), None)
            .await
            .unwrap();
        assert!(held.all_granted());

        let pending = {
            let waiter = waiter.clone();
            tokio::spawn(async move {
                waiter
                    .lock_object(LockRequest::new("A").with_requester("waiter"), secs(10))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.events().unlock_receivers(), 1);
        holder.unlock_object(UnlockRequest::new("A")).await.unwrap();

        let result = pending.await.unwrap().unwrap();
        let info = result.get("A").unwrap();
        assert!(info.is_granted);
        assert_eq!(info.holder, "waiter");
        assert!(result.total_waiting_time >= Duration::from_secs(2));
        assert!(result.total_waiting_time < Duration::from_secs(3));

        // One monitor for the whole wait, gone afterwards
        assert_eq!(waiter.unlock_listener().monitor_starts(), 1);
        assert_eq!(waiter.unlock_listener().monitor_stops(), 1);
        assert!(waiter.unlock_listener().pending_object_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_granted_within_wait_time() {
        let manager = Arc::new(LockManager::new());
        let holder = LockClient::local(manager.clone());
        let waiter = LockClient::local(manager.clone());

        holder
            .lock_object(LockRequest::new("A").with_requester("holder"), None)
            .await
            .unwrap();

        let started = Instant::now();
        let result = waiter.lock_object(LockRequest::new("A"), secs(5)).await.unwrap();

        let info = result.get("A").unwrap();
        assert!(!info.is_granted);
        assert_eq!(info.holder, "holder");
        assert!(result.total_waiting_time >= Duration::from_secs(5));
        assert!(result.total_waiting_time < Duration::from_millis(5_100));
        assert!(started.elapsed() < Duration::from_millis(5_100));
        assert_eq!(waiter.unlock_listener().monitor_stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_of_several_waiters_wins() {
        let manager = Arc::new(LockManager::new());
        let transport = counting(&manager);
        let holder = client_with(&manager, transport.clone());

        holder.lock_object(LockRequest::new("A"), None).await.unwrap();

        let mut pending = Vec::new();
        for i in 0..3 {
            let waiter = client_with(&manager, transport.clone());
            pending.push(tokio::spawn(async move {
                waiter
                    .lock_object(LockRequest::new("A").with_requester(format!("waiter-{}", i)), secs(10))
                    .await
            }));
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        holder.unlock_object(UnlockRequest::new("A")).await.unwrap();

        let mut granted = 0;
        for handle in pending {
            let result = handle.await.unwrap().unwrap();
            if result.is_granted("A") {
                granted += 1;
                assert!(result.total_waiting_time < Duration::from_secs(2));
            } else {
                assert!(result.total_waiting_time >= Duration::from_secs(10));
                assert!(result.total_waiting_time < Duration::from_millis(10_100));
            }
        }

        assert_eq!(granted, 1);
        // Holder once, then per waiter: first try, confirmation, retry after the unlock
        assert_eq!(transport.lock_calls(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_linked_object() {
        let manager = Arc::new(LockManager::new());
        let holder = LockClient::local(manager.clone());
        let waiter = Arc::new(LockClient::local(manager.clone()));

        holder.lock_object(LockRequest::new("B"), None).await.unwrap();

        let pending = {
            let waiter = waiter.clone();
            tokio::spawn(async move {
                let tree = LockRequest::new("A").with_linked(LockRequest::new("B"));
                waiter.lock_object(tree, secs(10)).await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!manager.is_locked("A"), "nothing is locked while B is held");
        holder.unlock_object(UnlockRequest::new("B")).await.unwrap();

        let result = pending.await.unwrap().unwrap();
        assert!(result.all_granted());
        assert_eq!(result.infos.len(), 2);
        assert!(manager.is_locked("A") && manager.is_locked("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trees_in_one_call_are_granted_independently() {
        let manager = Arc::new(LockManager::new());
        let holder = LockClient::local(manager.clone());
        let client = LockClient::local(manager.clone());

        holder.lock_object(LockRequest::new("B"), None).await.unwrap();

        let result = client
            .lock_objects(vec![LockRequest::new("A"), LockRequest::new("B")], secs(3))
            .await
            .unwrap();

        assert!(result.is_granted("A"));
        assert!(!result.is_granted("B"));
        assert!(result.total_waiting_time >= Duration::from_secs(3));
        assert!(result.total_waiting_time < Duration::from_millis(3_100));
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected_before_sending() {
        let manager = Arc::new(LockManager::new());
        let transport = counting(&manager);
        let client = client_with(&manager, transport.clone());

        let err = client
            .lock_objects(
                vec![
                    LockRequest::new("A").with_linked(LockRequest::new("B")),
                    LockRequest::new("B"),
                ],
                secs(1),
            )
            .await
            .unwrap_err();

        assert_eq!(err, LockError::DuplicateObjectIds(vec!["B".to_string()]));
        assert_eq!(transport.lock_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_wait_time_rejected() {
        let manager = Arc::new(LockManager::new());
        let transport = counting(&manager);
        let client = client_with(&manager, transport.clone());

        let err = client
            .lock_object(LockRequest::new("A"), Some(Duration::ZERO))
            .await
            .unwrap_err();

        assert_eq!(err, LockError::InvalidWaitTime(Duration::ZERO));
        assert_eq!(transport.lock_calls(), 0);
    }

    #[tokio::test]
    async fn test_without_wait_asks_once() {
        let manager = Arc::new(LockManager::new());
        let transport = counting(&manager);
        let holder = LockClient::local(manager.clone());
        let client = client_with(&manager, transport.clone());

        holder.lock_object(LockRequest::new("A"), None).await.unwrap();
        let result = client.lock_object(LockRequest::new("A"), None).await.unwrap();

        assert!(!result.is_granted("A"));
        assert_eq!(result.total_waiting_time, Duration::ZERO);
        assert_eq!(transport.lock_calls(), 1);
        assert_eq!(client.unlock_listener().monitor_starts(), 0);
    }

    #[tokio::test]
    async fn test_empty_request_list() {
        let manager = Arc::new(LockManager::new());
        let transport = counting(&manager);
        let client = client_with(&manager, transport.clone());

        let result = client.lock_objects(vec![], secs(1)).await.unwrap();

        assert!(result.infos.is_empty());
        assert_eq!(transport.lock_calls(), 0);
        assert!(client.unlock_objects(vec![]).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let manager = Arc::new(LockManager::new());
        let events: Arc<dyn EventSource> = Arc::new(manager.events().clone());
        let client = LockClient::with_config(
            Arc::new(StalledTransport),
            events,
            ClientConfig::default().with_request_timeout(Duration::from_secs(1)),
        );

        assert_eq!(client.config().request_timeout, Duration::from_secs(1));
        let err = client.lock_object(LockRequest::new("A"), None).await.unwrap_err();

        assert_eq!(err, LockError::RequestTimedOut(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_mismatched_response_rejected() {
        let manager = Arc::new(LockManager::new());
        let client = client_with(&manager, Arc::new(EmptyTransport));

        let err = client.lock_object(LockRequest::new("A"), None).await.unwrap_err();
        assert!(matches!(err, LockError::UnexpectedResponse(_)));

        let err = client.unlock_object(UnlockRequest::new("A")).await.unwrap_err();
        assert!(matches!(err, LockError::Remote(_)));
    }

    #[tokio::test]
    async fn test_unlock_with_linked_returns_released_ids() {
        let manager = Arc::new(LockManager::new());
        let client = LockClient::local(manager.clone());
        let tree = LockRequest::new("A").with_linked(LockRequest::new("B"));

        client.lock_object(tree, None).await.unwrap();
        let unlocked = client.unlock_object(UnlockRequest::with_linked("A")).await.unwrap();

        assert_eq!(unlocked, vec!["A".to_string(), "B".to_string()]);
        assert!(manager.locked_objects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_pending_wait() {
        let manager = Arc::new(LockManager::new());
        let holder = LockClient::local(manager.clone());
        let waiter = Arc::new(LockClient::local(manager.clone()));

        holder.lock_object(LockRequest::new("A"), None).await.unwrap();

        let pending = {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.lock_object(LockRequest::new("A"), secs(30)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        waiter.shutdown();

        let result = pending.await.unwrap().unwrap();
        assert!(!result.is_granted("A"));
        assert!(result.total_waiting_time < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_higher_priority_request_reaches_holder() {
        let manager = Arc::new(LockManager::new());
        let holder = LockClient::local(manager.clone());
        let other = LockClient::local(manager.clone());
        let mut notifications = holder.higher_priority_requests();

        holder
            .lock_object(LockRequest::new("A").with_priority(Priority::Low), None)
            .await
            .unwrap();
        holder.listen_for_higher_priority("A", Priority::Low).await.unwrap();
        assert_eq!(manager.events().lock_request_receivers(), 1);

        other
            .lock_object(LockRequest::new("A").with_priority(Priority::Lowest), None)
            .await
            .unwrap();
        other
            .lock_object(
                LockRequest::new("A").with_requester("urgent").with_priority(Priority::Highest),
                None,
            )
            .await
            .unwrap();

        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.priority, Priority::Highest);
        assert_eq!(notification.request.requester, "urgent");

        holder.stop_listening_for_higher_priority("A", Priority::Low);
        assert_eq!(holder.preemption_listener().monitor_stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_resend_does_not_outlast_wait_time() {
        let manager = Arc::new(LockManager::new());
        hold(&manager, "A").await;

        let transport = Arc::new(SlowTransport {
            inner: LocalTransport::new(manager.clone()),
            lock_calls: AtomicUsize::new(0),
            delay: Duration::from_secs(20),
        });
        let client = client_with(&manager, transport.clone());

        let started = Instant::now();
        let result = client.lock_object(LockRequest::new("A"), secs(5)).await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(5_500));
        assert!(!result.get("A").unwrap().is_granted);
        assert_eq!(result.total_waiting_time, Duration::from_secs(5));
        assert_eq!(transport.lock_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscription_does_not_outlast_wait_time() {
        let manager = Arc::new(LockManager::new());
        hold(&manager, "A").await;

        let client = LockClient::new(
            Arc::new(LocalTransport::new(manager.clone())),
            Arc::new(StalledEvents),
        );

        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(60),
            client.lock_object(LockRequest::new("A"), secs(1)),
        )
        .await
        .expect("wait must end at its deadline")
        .unwrap();

        assert!(started.elapsed() < Duration::from_millis(1_500));
        let info = result.get("A").unwrap();
        assert!(!info.is_granted);
        assert_eq!(info.holder, "holder");
        assert_eq!(result.total_waiting_time, Duration::from_secs(1));
        // The abandoned start leaves the listener ready for the next attempt
        assert_eq!(client.unlock_listener().state(), ListenerState::Idle);
        assert!(client.unlock_listener().pending_object_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_wait_task_is_reported() {
        let manager = Arc::new(LockManager::new());
        hold(&manager, "A").await;

        let transport = Arc::new(PanickingTransport {
            inner: LocalTransport::new(manager.clone()),
            lock_calls: AtomicUsize::new(0),
        });
        let client = client_with(&manager, transport);

        let err = client.lock_object(LockRequest::new("A"), secs(5)).await.unwrap_err();

        assert!(matches!(err, LockError::Transport(_)), "{:?}", err);
    }
}
