//! Tests for the queue facade.

use super::*;
use crate::backends::InMemoryBackend;

fn queue_name(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

async fn memory_queue(name: &str) -> Queue {
    let backend: Arc<dyn QueueBackend> = Arc::new(InMemoryBackend::new());
    Queue::open(backend, queue_name(name), None).await.unwrap()
}

// ============================================================================
// Binding Tests
// ============================================================================

mod binding {
    use super::*;

    /// Verify that opening a missing queue creates it with the given timeout.
    #[tokio::test]
    async fn test_open_creates_missing_queue() {
        let backend = Arc::new(InMemoryBackend::new());
        let timeout = VisibilityTimeout::from_secs(12).unwrap();

        let queue = Queue::open(backend.clone(), queue_name("orders"), Some(timeout))
            .await
            .unwrap();

        assert!(backend.is_exists(&queue_name("orders")).await.unwrap());
        assert_eq!(queue.default_timeout(), timeout);
    }

    /// Verify that opening an existing queue adopts its stored timeout.
    #[tokio::test]
    async fn test_open_existing_queue_uses_stored_timeout() {
        let backend = Arc::new(InMemoryBackend::new());
        backend
            .create_queue(&queue_name("orders"), VisibilityTimeout::from_secs(90).unwrap())
            .await
            .unwrap();

        let queue = Queue::open(backend, queue_name("orders"), None).await.unwrap();
        assert_eq!(queue.default_timeout().whole_seconds(), 90);
    }

    /// Verify that binding to a backend without create falls back to the default timeout.
    #[tokio::test]
    async fn test_open_on_null_backend_uses_default_timeout() {
        let queue = Queue::open(Arc::new(NullBackend::new()), queue_name("orders"), None)
            .await
            .unwrap();
        assert_eq!(queue.default_timeout(), VisibilityTimeout::default());
        assert_eq!(queue.backend_kind(), BackendKind::Null);
    }
}

// ============================================================================
// Capability Tests
// ============================================================================

mod capabilities {
    use super::*;

    /// Verify is_supported by canonical name and alias.
    #[tokio::test]
    async fn test_is_supported_accepts_aliases() {
        let queue = memory_queue("orders").await;
        assert!(queue.is_supported("create"));
        assert!(queue.is_supported("createQueue"));
        assert!(queue.is_supported("deleteQueue"));
        assert!(queue.is_supported("getQueues"));
        assert!(!queue.is_supported("purge"));
    }

    /// Verify that unsupported operations fail instead of degrading silently.
    #[tokio::test]
    async fn test_unsupported_operations_fail() {
        let queue = Queue::open(Arc::new(NullBackend::new()), queue_name("orders"), None)
            .await
            .unwrap();

        assert!(!queue.is_supported("count"));
        assert!(matches!(
            queue.count().await,
            Err(QueueError::UnsupportedOperation {
                operation: Operation::Count,
                ..
            })
        ));
        assert!(matches!(
            queue.get_queues().await,
            Err(QueueError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            queue.create_queue(&queue_name("other"), None).await,
            Err(QueueError::UnsupportedOperation { .. })
        ));
    }

    /// Verify that debug info reports capabilities and hides the connection.
    #[tokio::test]
    async fn test_debug_info_hides_connection() {
        let queue = memory_queue("orders").await;
        let info = queue.debug_info();

        assert_eq!(info.backend, BackendKind::InMemory);
        assert_eq!(info.queue, queue_name("orders"));
        assert_eq!(info.connection, "[hidden]");
        assert_eq!(info.capabilities.len(), 8);
        assert_eq!(info.capabilities["deleteMessage"], "yes");
    }
}

// ============================================================================
// Message Flow Tests
// ============================================================================

mod message_flow {
    use super::*;

    /// Verify the send, receive, acknowledge, receive flow.
    #[tokio::test]
    async fn test_send_receive_ack() {
        let queue = memory_queue("orders").await;
        queue.send("A").await.unwrap();
        queue.send("B").await.unwrap();

        let batch = queue.receive(ReceiveOptions::default()).await.unwrap();
        assert_eq!(batch.len(), 1);
        let first = batch.first().unwrap().clone();
        assert!(first.lease_token.is_some());

        assert!(queue
            .delete_message(first.lease_token.as_ref().unwrap())
            .await
            .unwrap());

        let rest = queue
            .receive(ReceiveOptions::new().with_max_messages(5))
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_ne!(rest.first().unwrap().body, first.body);
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    /// Verify that receiving zero messages is an empty probe.
    #[tokio::test]
    async fn test_receive_zero_is_empty() {
        let queue = memory_queue("orders").await;
        queue.send("A").await.unwrap();

        let batch = queue
            .receive(ReceiveOptions::new().with_max_messages(0))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.queue(), queue.name());

        let batch = queue.receive(ReceiveOptions::new()).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    /// Verify that a negative receive size is rejected.
    #[tokio::test]
    async fn test_receive_negative_is_invalid() {
        let queue = memory_queue("orders").await;
        let result = queue
            .receive(ReceiveOptions::new().with_max_messages(-3))
            .await;
        assert!(matches!(result, Err(QueueError::InvalidArgument(_))));
    }

    /// Verify that create_queue and get_queues go to the shared backend.
    #[tokio::test]
    async fn test_create_and_list_queues() {
        let queue = memory_queue("orders").await;

        assert!(queue.create_queue(&queue_name("invoices"), None).await.unwrap());
        assert!(!queue.create_queue(&queue_name("invoices"), None).await.unwrap());
        assert!(queue.is_exists(&queue_name("invoices")).await.unwrap());

        let names = queue.get_queues().await.unwrap();
        assert_eq!(names.len(), 2);
    }
}

// ============================================================================
// Deletion Tests
// ============================================================================

mod deletion {
    use super::*;

    /// Verify that deleting rebinds the handle so later calls degrade gracefully.
    #[tokio::test]
    async fn test_delete_queue_rebinds_to_null() {
        let mut queue = memory_queue("orders").await;
        queue.send("A").await.unwrap();

        assert!(queue.delete_queue().await.unwrap());
        assert_eq!(queue.backend_kind(), BackendKind::Null);

        assert!(queue.receive(ReceiveOptions::new()).await.unwrap().is_empty());
        assert!(!queue.is_exists(&queue_name("orders")).await.unwrap());
        assert!(!queue
            .delete_message(&LeaseToken::generate())
            .await
            .unwrap());
        assert!(matches!(
            queue.send("B").await,
            Err(QueueError::QueueNotFound { .. })
        ));
    }

    /// Verify that deleting on a backend without delete support is a successful no-op.
    #[tokio::test]
    async fn test_delete_queue_without_support_succeeds() {
        let mut queue = Queue::open(Arc::new(NullBackend::new()), queue_name("orders"), None)
            .await
            .unwrap();
        assert!(queue.delete_queue().await.unwrap());
    }
}

// ============================================================================
// Descriptor Tests
// ============================================================================

mod descriptor {
    use super::*;

    /// Verify that a descriptor is plain data that survives JSON.
    #[tokio::test]
    async fn test_descriptor_round_trips_through_json() {
        let queue = memory_queue("orders").await;
        let descriptor = queue.descriptor();

        assert_eq!(descriptor.name, queue_name("orders"));
        assert_eq!(descriptor.backend, BackendConfig::InMemory);

        let restored = QueueDescriptor::from_json(&descriptor.to_json().unwrap()).unwrap();
        assert_eq!(restored, descriptor);
    }

    /// Verify that reconnecting a SQLite descriptor reaches the same data.
    #[tokio::test]
    async fn test_reconnect_sqlite_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let backend = connect(&BackendConfig::sqlite(dir.path().join("queue.db")))
            .await
            .unwrap();
        let queue = Queue::open(
            backend,
            queue_name("orders"),
            Some(VisibilityTimeout::from_secs(15).unwrap()),
        )
        .await
        .unwrap();
        queue.send("persisted").await.unwrap();

        let json = queue.descriptor().to_json().unwrap();
        drop(queue);

        let reconnected = Queue::reconnect(&QueueDescriptor::from_json(&json).unwrap())
            .await
            .unwrap();
        assert_eq!(reconnected.default_timeout().whole_seconds(), 15);
        assert_eq!(reconnected.count().await.unwrap(), 1);
    }

    /// Verify that malformed descriptors are invalid arguments.
    #[test]
    fn test_malformed_descriptor_is_rejected() {
        let result = QueueDescriptor::from_json(r#"{"name":"bad--name"}"#);
        assert!(matches!(result, Err(QueueError::InvalidArgument(_))));
    }
}
