//! Tests for in-memory queue provider.

use super::*;

const LEASE: Duration = Duration::from_secs(60);

// ============================================================================
// Receive Tests
// ============================================================================

mod receive {
    use super::*;

    /// Verify that an empty queue yields an empty batch rather than an error.
    #[tokio::test]
    async fn test_receive_from_empty_queue() {
        let queue = InMemoryQueue::new();

        let batch = queue.receive(32, LEASE).await.unwrap();

        assert!(batch.is_empty());
        assert!(queue.is_empty());
    }

    /// Verify that messages come back in FIFO order with their bodies intact.
    #[tokio::test]
    async fn test_receive_returns_messages_in_order() {
        let queue = InMemoryQueue::new();
        let first = queue.enqueue("one");
        let second = queue.enqueue("two");

        let batch = queue.receive(32, LEASE).await.unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, first);
        assert_eq!(batch[0].body, "one");
        assert_eq!(batch[1].id, second);
        assert_eq!(batch[1].body, "two");
        assert!(batch.iter().all(|m| m.delivery_attempt_count == 1));
        assert!(batch.iter().all(|m| m.inserted_at.is_some()));
    }

    /// Verify that the batch size caps the number of leased messages.
    #[tokio::test]
    async fn test_receive_honors_batch_size() {
        let queue = InMemoryQueue::new();
        for i in 0..5 {
            queue.enqueue(format!("message-{}", i));
        }

        let batch = queue.receive(3, LEASE).await.unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(queue.visible_len(), 2);
        assert_eq!(queue.len(), 5);
    }

    /// Verify that leased messages are hidden from other consumers.
    #[tokio::test]
    async fn test_leased_messages_are_invisible() {
        let queue = InMemoryQueue::new();
        queue.enqueue("payload");

        let first = queue.receive(32, LEASE).await.unwrap();
        let second = queue.receive(32, LEASE).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    /// Verify that an expired lease makes the message visible again with an
    /// incremented delivery count and a new lease handle.
    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_redelivers_message() {
        let queue = InMemoryQueue::new();
        let id = queue.enqueue("payload");

        let first = queue.receive(32, LEASE).await.unwrap();
        tokio::time::advance(LEASE + Duration::from_millis(1)).await;
        let second = queue.receive(32, LEASE).await.unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].delivery_attempt_count, 2);
        assert_ne!(second[0].lease.handle(), first[0].lease.handle());
        assert_eq!(queue.delivery_count(&id), Some(2));
    }
}

// ============================================================================
// Delete Tests
// ============================================================================

mod delete {
    use super::*;

    /// Verify that deleting with the current lease removes the message.
    #[tokio::test]
    async fn test_delete_with_current_lease() {
        let queue = InMemoryQueue::new();
        queue.enqueue("payload");
        let batch = queue.receive(32, LEASE).await.unwrap();

        queue.delete(&batch[0]).await.unwrap();

        assert!(queue.is_empty());
    }

    /// Verify that a second delete of the same message reports NotFound.
    #[tokio::test]
    async fn test_double_delete_reports_not_found() {
        let queue = InMemoryQueue::new();
        queue.enqueue("payload");
        let batch = queue.receive(32, LEASE).await.unwrap();
        queue.delete(&batch[0]).await.unwrap();

        let result = queue.delete(&batch[0]).await;

        match result {
            Err(error) => assert!(error.is_not_found()),
            Ok(()) => panic!("Second delete should fail"),
        }
    }

    /// Verify that a delete after lease expiry is rejected and the message stays.
    #[tokio::test(start_paused = true)]
    async fn test_delete_after_lease_expiry_is_rejected() {
        let queue = InMemoryQueue::new();
        queue.enqueue("payload");
        let batch = queue.receive(32, Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        let result = queue.delete(&batch[0]).await;

        assert!(matches!(result, Err(QueueError::MessageNotFound { .. })));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.visible_len(), 1);
    }

    /// Verify that a stale lease cannot delete a message re-leased by someone else.
    #[tokio::test(start_paused = true)]
    async fn test_stale_lease_cannot_delete_redelivered_message() {
        let queue = InMemoryQueue::new();
        queue.enqueue("payload");
        let stale = queue.receive(32, Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        let fresh = queue.receive(32, LEASE).await.unwrap();

        assert!(queue.delete(&stale[0]).await.is_err());
        queue.delete(&fresh[0]).await.unwrap();

        assert!(queue.is_empty());
    }

    /// Verify that clones share the same underlying queue.
    #[tokio::test]
    async fn test_clones_share_storage() {
        let producer = InMemoryQueue::new();
        let consumer = producer.clone();
        producer.enqueue("shared");

        let batch = consumer.receive(32, LEASE).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(producer.provider_type(), ProviderType::InMemory);
    }
}
