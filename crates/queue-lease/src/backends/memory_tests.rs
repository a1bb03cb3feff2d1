//! Tests for the in-memory backend.

use super::*;
use crate::clock::ManualClock;
use crate::message::Timestamp;
use chrono::Duration;
use std::collections::HashSet;

fn queue_name(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

fn secs(seconds: i64) -> VisibilityTimeout {
    VisibilityTimeout::from_secs(seconds).unwrap()
}

async fn backend_with_queue(name: &str) -> (InMemoryBackend, ManualClock, QueueName) {
    let clock = ManualClock::new(Timestamp::now());
    let backend = InMemoryBackend::with_clock(Arc::new(clock.clone()));
    let queue = queue_name(name);
    assert!(backend.create_queue(&queue, secs(30)).await.unwrap());
    (backend, clock, queue)
}

// ============================================================================
// Queue Management Tests
// ============================================================================

mod queue_management {
    use super::*;

    /// Verify that creating an existing queue reports false instead of failing.
    #[tokio::test]
    async fn test_create_existing_queue_returns_false() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;

        assert!(!backend.create_queue(&queue, secs(10)).await.unwrap());
        let record = backend.queue_record(&queue).await.unwrap().unwrap();
        assert_eq!(record.default_timeout_seconds, 30);
    }

    /// Verify that queues are listed and checked for existence.
    #[tokio::test]
    async fn test_get_queues_and_is_exists() {
        let (backend, _clock, orders) = backend_with_queue("orders").await;
        let invoices = queue_name("invoices");
        backend.create_queue(&invoices, secs(5)).await.unwrap();

        let queues = backend.get_queues().await.unwrap();
        assert_eq!(queues, BTreeSet::from([invoices.clone(), orders.clone()]));
        assert!(backend.is_exists(&orders).await.unwrap());
        assert!(!backend.is_exists(&queue_name("missing")).await.unwrap());
    }

    /// Verify that deleting a queue removes its messages.
    #[tokio::test]
    async fn test_delete_queue_cascades() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;
        backend.send(&queue, Bytes::from("a")).await.unwrap();
        let claimed = backend.claim(&queue, 1, secs(30)).await.unwrap();
        let token = claimed[0].lease_token.clone().unwrap();

        assert!(backend.delete_queue(&queue).await.unwrap());
        assert!(!backend.delete_queue(&queue).await.unwrap());
        assert!(!backend.is_exists(&queue).await.unwrap());
        assert!(!backend.delete_message(&token).await.unwrap());

        // Recreating the name starts from an empty queue
        backend.create_queue(&queue, secs(30)).await.unwrap();
        assert_eq!(backend.count(&queue).await.unwrap(), 0);
    }

    /// Verify that operations on unknown queues fail with QueueNotFound.
    #[tokio::test]
    async fn test_unknown_queue_is_not_found() {
        let backend = InMemoryBackend::new();
        let missing = queue_name("missing");

        assert!(matches!(
            backend.send(&missing, Bytes::from("x")).await,
            Err(QueueError::QueueNotFound { .. })
        ));
        assert!(matches!(
            backend.count(&missing).await,
            Err(QueueError::QueueNotFound { .. })
        ));
        assert!(matches!(
            backend.claim(&missing, 1, secs(30)).await,
            Err(QueueError::QueueNotFound { .. })
        ));
    }
}

// ============================================================================
// Lease Protocol Tests
// ============================================================================

mod lease_protocol {
    use super::*;

    /// Verify that send stores an unleased message with a checksum.
    #[tokio::test]
    async fn test_send_returns_unleased_record() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;

        let record = backend.send(&queue, Bytes::from("hello")).await.unwrap();
        assert!(record.lease_token.is_none());
        assert!(record.lease_expires_at.is_none());
        assert!(record.verify_checksum());
        assert_eq!(backend.count(&queue).await.unwrap(), 1);
    }

    /// Verify that a zero-sized claim leaves every message untouched.
    #[tokio::test]
    async fn test_claim_zero_has_no_side_effects() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;
        backend.send(&queue, Bytes::from("a")).await.unwrap();

        assert!(backend.claim(&queue, 0, secs(30)).await.unwrap().is_empty());

        let claimed = backend.claim(&queue, 1, secs(30)).await.unwrap();
        assert_eq!(claimed.len(), 1, "zero claim must not have leased anything");
    }

    /// Verify that a zero-sized claim does not even require the queue to exist.
    #[tokio::test]
    async fn test_claim_zero_does_not_touch_store() {
        let backend = InMemoryBackend::new();
        let result = backend.claim(&queue_name("missing"), 0, secs(30)).await;
        assert!(result.unwrap().is_empty());
    }

    /// Verify that negative batch sizes are invalid arguments.
    #[tokio::test]
    async fn test_claim_negative_is_invalid() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;
        assert!(matches!(
            backend.claim(&queue, -1, secs(30)).await,
            Err(QueueError::InvalidArgument(_))
        ));
    }

    /// Verify the send/claim/delete/claim scenario.
    #[tokio::test]
    async fn test_claim_delete_then_claim_other() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;
        backend.send(&queue, Bytes::from("A")).await.unwrap();
        backend.send(&queue, Bytes::from("B")).await.unwrap();

        let first = backend.claim(&queue, 1, secs(30)).await.unwrap();
        assert_eq!(first.len(), 1);
        let first_body = first[0].body.clone();
        assert!(first_body == "A" || first_body == "B");
        let token = first[0].lease_token.clone().unwrap();

        assert!(backend.delete_message(&token).await.unwrap());

        let rest = backend.claim(&queue, 5, secs(30)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_ne!(rest[0].body, first_body);
    }

    /// Verify that leased messages are hidden until their lease expires.
    #[tokio::test]
    async fn test_lease_expiry_makes_message_claimable_again() {
        let (backend, clock, queue) = backend_with_queue("orders").await;
        backend.send(&queue, Bytes::from("A")).await.unwrap();

        let first = backend.claim(&queue, 1, secs(1)).await.unwrap();
        let first_token = first[0].lease_token.clone().unwrap();

        assert!(backend.claim(&queue, 1, secs(1)).await.unwrap().is_empty());

        // Exactly at expiry the lease still holds
        clock.advance(Duration::seconds(1));
        assert!(backend.claim(&queue, 1, secs(1)).await.unwrap().is_empty());

        clock.advance(Duration::milliseconds(1));
        let second = backend.claim(&queue, 1, secs(1)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
        assert_ne!(second[0].lease_token.clone().unwrap(), first_token);
    }

    /// Verify that the longest accepted timeout leases without overflowing.
    #[tokio::test]
    async fn test_claim_with_longest_timeout() {
        let (backend, clock, queue) = backend_with_queue("orders").await;
        backend.send(&queue, Bytes::from("A")).await.unwrap();

        let timeout = secs(VisibilityTimeout::MAX_SECONDS);
        let claimed = backend.claim(&queue, 1, timeout).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(
            claimed[0].lease_expires_at,
            Some(clock.now().plus(timeout.as_duration()))
        );
    }

    /// Verify that a stale token cannot delete a re-leased message.
    #[tokio::test]
    async fn test_stale_token_after_release_returns_false() {
        let (backend, clock, queue) = backend_with_queue("orders").await;
        backend.send(&queue, Bytes::from("A")).await.unwrap();

        let stale = backend.claim(&queue, 1, secs(1)).await.unwrap()[0]
            .lease_token
            .clone()
            .unwrap();
        clock.advance(Duration::seconds(2));
        let fresh = backend.claim(&queue, 1, secs(30)).await.unwrap()[0]
            .lease_token
            .clone()
            .unwrap();

        assert!(!backend.delete_message(&stale).await.unwrap());
        assert!(backend.delete_message(&fresh).await.unwrap());
    }

    /// Verify that an expired but unreassigned lease can still be acknowledged.
    #[tokio::test]
    async fn test_late_ack_of_expired_lease_succeeds() {
        let (backend, clock, queue) = backend_with_queue("orders").await;
        backend.send(&queue, Bytes::from("A")).await.unwrap();

        let token = backend.claim(&queue, 1, secs(1)).await.unwrap()[0]
            .lease_token
            .clone()
            .unwrap();
        clock.advance(Duration::seconds(5));

        assert!(backend.delete_message(&token).await.unwrap());
        assert_eq!(backend.count(&queue).await.unwrap(), 0);
    }

    /// Verify that deleting twice with the same token is idempotent.
    #[tokio::test]
    async fn test_delete_message_is_idempotent() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;
        backend.send(&queue, Bytes::from("A")).await.unwrap();
        let token = backend.claim(&queue, 1, secs(30)).await.unwrap()[0]
            .lease_token
            .clone()
            .unwrap();

        assert!(backend.delete_message(&token).await.unwrap());
        assert!(!backend.delete_message(&token).await.unwrap());
    }

    /// Verify that count includes leased messages.
    #[tokio::test]
    async fn test_count_includes_leased_messages() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;
        for i in 0..5 {
            backend.send(&queue, Bytes::from(format!("m{i}"))).await.unwrap();
        }

        let claimed = backend.claim(&queue, 3, secs(30)).await.unwrap();
        assert_eq!(claimed.len(), 3);
        assert!(backend
            .delete_message(claimed[0].lease_token.as_ref().unwrap())
            .await
            .unwrap());

        assert_eq!(backend.count(&queue).await.unwrap(), 4);
    }

    /// Verify that claims are scoped to their queue.
    #[tokio::test]
    async fn test_claim_is_scoped_to_queue() {
        let (backend, _clock, orders) = backend_with_queue("orders").await;
        let invoices = queue_name("invoices");
        backend.create_queue(&invoices, secs(30)).await.unwrap();
        backend.send(&invoices, Bytes::from("invoice")).await.unwrap();

        assert!(backend.claim(&orders, 10, secs(30)).await.unwrap().is_empty());
        assert_eq!(backend.claim(&invoices, 10, secs(30)).await.unwrap().len(), 1);
    }
}

// ============================================================================
// Concurrent Access Tests
// ============================================================================

mod concurrent_access {
    use super::*;

    /// Verify that concurrent claimers never receive the same message.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_are_mutually_exclusive() {
        let (backend, _clock, queue) = backend_with_queue("orders").await;
        for i in 0..200 {
            backend.send(&queue, Bytes::from(format!("m{i}"))).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let backend = backend.clone();
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                loop {
                    let batch = backend.claim(&queue, 7, secs(60)).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    ids.extend(batch.into_iter().map(|m| m.id));
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "message {id} claimed twice");
            }
        }
        assert_eq!(seen.len(), 200);
    }
}
