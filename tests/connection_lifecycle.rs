mod common;

use common::{assert_conflict, seed_user, seed_user_with_status, setup_pool};
use linkup_core::error::{AppError, ConflictReason};
use linkup_core::models::connections::RequestStatus;
use linkup_core::models::users::AccountStatus;
use linkup_core::queries::connections as connection_queries;
use linkup_core::services::connections::{ConnectionService, CreateRequestData};
use uuid::Uuid;

fn payload(receiver: impl Into<String>) -> CreateRequestData {
    CreateRequestData {
        receiver: receiver.into(),
    }
}

#[tokio::test]
async fn create_request_stores_pending_request() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();

    assert_eq!(request.sender_id, alice);
    assert_eq!(request.receiver_id, bob);
    assert_eq!(request.status, RequestStatus::Pending);
}

#[tokio::test]
async fn create_request_resolves_receiver_by_email() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload("bob@example.com"))
        .await
        .unwrap();

    assert_eq!(request.receiver_id, bob);
}

#[tokio::test]
async fn create_request_to_self_is_rejected() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let service = ConnectionService::new(pool);

    let err = service
        .create_request(alice, payload(alice.to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)), "got: {err}");
}

#[tokio::test]
async fn create_request_to_unknown_receiver_is_not_found() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let service = ConnectionService::new(pool);

    let err = service
        .create_request(alice, payload(Uuid::new_v4().to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");
}

#[tokio::test]
async fn create_request_to_unverified_receiver_is_not_found() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user_with_status(
        &pool,
        "bob@example.com",
        AccountStatus::PendingVerification,
    )
    .await;
    let service = ConnectionService::new(pool);

    let err = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");
}

#[tokio::test]
async fn duplicate_request_conflicts() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    let err = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap_err();

    assert_conflict(err, ConflictReason::RequestExists);

    let pending = service.list_pending_requests_sent(alice).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn reverse_direction_request_conflicts() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    let err = service
        .create_request(bob, payload(alice.to_string()))
        .await
        .unwrap_err();

    assert_conflict(err, ConflictReason::RequestExists);
}

#[tokio::test]
async fn accept_creates_canonically_ordered_conversation() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    let request = service.accept_request(request.id, bob).await.unwrap();

    assert_eq!(request.status, RequestStatus::Accepted);

    let conversations = service.list_conversations(alice).await.unwrap();
    assert_eq!(conversations.len(), 1);

    let conversation = &conversations[0];
    assert!(conversation.user1_id < conversation.user2_id);
    assert!(conversation.involves(alice));
    assert!(conversation.involves(bob));
    assert!(service.conversation_exists_between(alice, bob).await.unwrap());
}

#[tokio::test]
async fn accept_by_sender_is_forbidden() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    let err = service.accept_request(request.id, alice).await.unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)), "got: {err}");

    // Nothing was committed
    assert!(!service.conversation_exists_between(alice, bob).await.unwrap());
}

#[tokio::test]
async fn accept_of_unknown_request_is_not_found() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let service = ConnectionService::new(pool);

    let err = service.accept_request(4242, alice).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");
}

#[tokio::test]
async fn resolved_request_cannot_transition_again() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    service.accept_request(request.id, bob).await.unwrap();

    let err = service.reject_request(request.id, bob).await.unwrap_err();
    assert_conflict(err, ConflictReason::AlreadyResolved);

    let err = service.accept_request(request.id, bob).await.unwrap_err();
    assert_conflict(err, ConflictReason::AlreadyResolved);
}

#[tokio::test]
async fn reject_leaves_no_conversation() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    let request = service.reject_request(request.id, bob).await.unwrap();

    assert_eq!(request.status, RequestStatus::Rejected);
    assert!(!service.conversation_exists_between(alice, bob).await.unwrap());
    assert!(service.list_conversations(bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_request_does_not_block_a_new_attempt() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    service.reject_request(request.id, bob).await.unwrap();

    let retry = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    assert_eq!(retry.status, RequestStatus::Pending);
    assert_ne!(retry.id, request.id);
}

#[tokio::test]
async fn existing_conversation_blocks_new_requests_in_both_directions() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    service.accept_request(request.id, bob).await.unwrap();

    let err = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap_err();
    assert_conflict(err, ConflictReason::ConversationExists);

    let err = service
        .create_request(bob, payload(alice.to_string()))
        .await
        .unwrap_err();
    assert_conflict(err, ConflictReason::ConversationExists);
}

#[tokio::test]
async fn get_conversation_is_participant_gated() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let mallory = seed_user(&pool, "mallory@example.com").await;
    let service = ConnectionService::new(pool);

    let request = service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    service.accept_request(request.id, bob).await.unwrap();
    let conversation_id = service.list_conversations(alice).await.unwrap()[0].id;

    service.get_conversation(conversation_id, alice).await.unwrap();
    service.get_conversation(conversation_id, bob).await.unwrap();

    // Outsiders cannot tell the conversation exists at all
    let err = service
        .get_conversation(conversation_id, mallory)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got: {err}");
}

#[tokio::test]
async fn pending_request_listings_track_both_sides() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let carol = seed_user(&pool, "carol@example.com").await;
    let service = ConnectionService::new(pool);

    service
        .create_request(alice, payload(bob.to_string()))
        .await
        .unwrap();
    service
        .create_request(carol, payload(bob.to_string()))
        .await
        .unwrap();

    let received = service.list_pending_requests_received(bob).await.unwrap();
    assert_eq!(received.len(), 2);

    let sent = service.list_pending_requests_sent(alice).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].receiver_id, bob);

    assert!(service
        .list_pending_requests_received(alice)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn conversation_uniqueness_is_enforced_by_the_store() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;

    let mut conn = pool.acquire().await.unwrap();
    connection_queries::insert_conversation(&mut conn, Uuid::new_v4(), alice, bob)
        .await
        .unwrap();

    // Same pair in the opposite order hits the unique key after
    // canonicalization, bypassing every service-level check.
    let err = connection_queries::insert_conversation(&mut conn, Uuid::new_v4(), bob, alice)
        .await
        .unwrap_err();
    assert_conflict(err, ConflictReason::ConversationExists);
}

#[tokio::test]
async fn concurrent_duplicate_requests_leave_one_row() {
    let pool = setup_pool().await;
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;
    let service = ConnectionService::new(pool);
    let other = service.clone();

    let (first, second) = tokio::join!(
        service.create_request(alice, payload(bob.to_string())),
        other.create_request(alice, payload(bob.to_string()))
    );

    assert!(
        first.is_ok() != second.is_ok(),
        "exactly one request must win"
    );
    let err = if first.is_ok() {
        second.unwrap_err()
    } else {
        first.unwrap_err()
    };
    assert_conflict(err, ConflictReason::RequestExists);

    let pending = service.list_pending_requests_received(bob).await.unwrap();
    assert_eq!(pending.len(), 1);
}
