// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests over in-process replicas.
use std::sync::Arc;

use tokio_stream::StreamExt;

use rhizome_store::traits::EventStore;

use rhizome_auth::{CapabilityError, Resource, ResourceKind, Right};
use rhizome_core::{ConversationPayload, Domain, EventType, Payload, PrivateKey, Scope};
use rhizome_discovery::DhtState;
use rhizome_engine::{Acceptance, EngineError, EventDraft, Node, NodeConfig, NodeEvent};
use rhizome_net::test_utils::MemoryTransport;
use rhizome_net::{Topic, Transport};

fn test_node(transport: Arc<dyn Transport>) -> Node {
    Node::new(
        PrivateKey::new(),
        NodeConfig::default(),
        transport,
        DhtState::Unconfigured,
    )
}

fn conversation_draft(title: &str) -> EventDraft {
    EventDraft::new(
        EventType::create(Domain::Conversation),
        Payload::Conversation(ConversationPayload {
            title: Some(title.to_string()),
            participants: vec![],
        }),
    )
}

fn update_draft(conversation: &str, text: &str) -> EventDraft {
    EventDraft::new(
        EventType::update(Domain::Conversation),
        Payload::Conversation(ConversationPayload {
            title: Some(text.to_string()),
            participants: vec![],
        }),
    )
    .for_entity(conversation)
    .with_tags(vec![conversation.to_string()])
}

/// Grant an author write access to one entity on the given replica.
fn grant_entity_write(node: &mut Node, author: &rhizome_core::Did, entity_id: &str) {
    node.issue_capability(
        author.clone(),
        Resource::new(ResourceKind::Conversation, entity_id),
        [Right::Write],
        None,
    )
    .unwrap();
}

#[tokio::test]
async fn local_create_is_applied_and_delivered() {
    let transport = Arc::new(MemoryTransport::default());
    let mut node = test_node(transport);
    let mut conversations = node.subscribe(Domain::Conversation);

    let event = node.create_event(conversation_draft("hello")).unwrap();
    let id = event.id;

    let acceptance = node.submit_event(event).await.unwrap();
    assert_eq!(acceptance, Acceptance::Applied(id));

    let delivered = conversations.recv().await.unwrap();
    assert_eq!(delivered.id, id);

    // Resubmission of an indexed event is a no-op, not an error.
    let event = node.store().get_event(&id).unwrap().unwrap();
    assert_eq!(
        node.submit_event(event).await.unwrap(),
        Acceptance::Applied(id)
    );
}

#[tokio::test]
async fn accepted_events_travel_over_gossip() {
    let transport = Arc::new(MemoryTransport::default());
    let mut alice = test_node(transport.clone());
    let mut bob = test_node(transport);

    bob.authorize_author(&alice.did().clone()).unwrap();
    let mut incoming = bob.gossip().subscribe(&Topic::General).await.unwrap();

    let event = alice
        .create_event(conversation_draft("for everyone").with_scope(Scope::Public))
        .unwrap();
    let id = event.id;
    alice.submit_event(event).await.unwrap();

    let bytes = incoming.next().await.unwrap();
    let acceptance = bob.receive_wire(&bytes).await.unwrap();
    assert_eq!(acceptance, Acceptance::Applied(id));
    assert!(bob.store().has_event(&id).unwrap());
}

#[tokio::test]
async fn unauthorized_authors_are_rejected() {
    let transport = Arc::new(MemoryTransport::default());
    let mut alice = test_node(transport.clone());
    let mut bob = test_node(transport);

    let event = alice.create_event(conversation_draft("psst")).unwrap();

    // Bob never authorized Alice.
    let result = bob.submit_event(event).await;
    match result {
        Err(EngineError::Authorization { right, source, .. }) => {
            assert_eq!(right, Right::Write);
            assert_eq!(source, CapabilityError::NotFound);
        }
        other => panic!("expected authorization failure, got {other:?}"),
    }
}

#[tokio::test]
async fn revoked_grant_denies_further_events() {
    let transport = Arc::new(MemoryTransport::default());
    let mut alice = test_node(transport.clone());
    let mut bob = test_node(transport);

    let grant = bob.authorize_author(&alice.did().clone()).unwrap();

    let first = alice.create_event(conversation_draft("one")).unwrap();
    bob.submit_event(first).await.unwrap();

    // Revocation between issuance and use is an authorization failure.
    assert!(bob.revoke_capability(&grant.id));
    let second = alice.create_event(conversation_draft("two")).unwrap();
    match bob.submit_event(second).await {
        Err(EngineError::Authorization { source, .. }) => {
            assert_eq!(source, CapabilityError::NotFound);
        }
        other => panic!("expected authorization failure, got {other:?}"),
    }
}

#[tokio::test]
async fn tampered_events_are_rejected() {
    let transport = Arc::new(MemoryTransport::default());
    let mut alice = test_node(transport.clone());
    let mut bob = test_node(transport);
    bob.authorize_author(&alice.did().clone()).unwrap();

    let mut event = alice.create_event(conversation_draft("honest")).unwrap();
    event.payload = Payload::Conversation(ConversationPayload {
        title: Some("dishonest".to_string()),
        participants: vec![],
    });

    let result = bob.submit_event(event).await;
    assert!(matches!(result, Err(EngineError::Integrity(_))));
}

#[tokio::test]
async fn out_of_order_delivery_buffers_until_parents_arrive() {
    let transport = Arc::new(MemoryTransport::default());
    let mut alice = test_node(transport.clone());
    let mut bob = test_node(transport);
    bob.authorize_author(&alice.did().clone()).unwrap();

    let create = alice.create_event(conversation_draft("thread")).unwrap();
    let entity_id = create.entity_id.clone().unwrap();
    alice.submit_event(create.clone()).await.unwrap();

    let update = alice
        .create_event(update_draft(&entity_id, "first reply"))
        .unwrap();
    alice.submit_event(update.clone()).await.unwrap();

    grant_entity_write(&mut bob, &alice.did().clone(), &entity_id);

    // The child arrives first and has to wait.
    let acceptance = bob.submit_event(update.clone()).await.unwrap();
    assert_eq!(acceptance, Acceptance::Buffered(update.id));
    assert_eq!(bob.pending_events(), 1);
    assert!(bob.entity(&entity_id).unwrap().is_none());

    // The parent arriving releases it; both fold in causal order.
    bob.submit_event(create).await.unwrap();
    assert_eq!(bob.pending_events(), 0);

    let entity = bob.entity(&entity_id).unwrap().unwrap();
    assert_eq!(entity.applied_events(), 2);
    assert_eq!(entity.head_ids(), vec![update.id]);
}

#[tokio::test]
async fn orphaned_events_surface_as_unresolvable() {
    let transport = Arc::new(MemoryTransport::default());
    let config = NodeConfig {
        max_buffer_attempts: 3,
        base_backoff_ms: 10,
        ..Default::default()
    };
    let mut alice = test_node(transport.clone());
    let mut bob = Node::new(PrivateKey::new(), config, transport, DhtState::Unconfigured);
    bob.authorize_author(&alice.did().clone()).unwrap();
    let mut notices = bob.subscribe_all();

    // Alice's create never reaches Bob.
    let create = alice.create_event(conversation_draft("lost")).unwrap();
    let entity_id = create.entity_id.clone().unwrap();
    alice.submit_event(create.clone()).await.unwrap();

    let orphan = alice
        .create_event(update_draft(&entity_id, "reply to nothing"))
        .unwrap();
    alice.submit_event(orphan.clone()).await.unwrap();

    grant_entity_write(&mut bob, &alice.did().clone(), &entity_id);
    bob.submit_event(orphan.clone()).await.unwrap();
    assert_eq!(bob.pending_events(), 1);

    // Drive the backoff schedule until the retry budget is spent.
    let mut now_ms = rhizome_core::unix_now_ms();
    for _ in 0..3 {
        now_ms += 3_600_000;
        bob.sweep_pending_at(now_ms).await.unwrap();
    }

    assert_eq!(bob.pending_events(), 0);
    assert!(!bob.store().has_event(&orphan.id).unwrap());

    // Skip acceptance notices from earlier in the test.
    loop {
        match notices.recv().await.unwrap() {
            NodeEvent::Unresolvable { id, missing, .. } => {
                assert_eq!(id, orphan.id);
                assert_eq!(missing, vec![create.id]);
                break;
            }
            NodeEvent::Accepted(_) => continue,
        }
    }
}

#[tokio::test]
async fn sealed_blocks_anchor_accepted_events() {
    let transport = Arc::new(MemoryTransport::default());
    let mut node = test_node(transport);

    let mut ids = Vec::new();
    for title in ["one", "two", "three"] {
        let event = node.create_event(conversation_draft(title)).unwrap();
        ids.push(event.id);
        node.submit_event(event).await.unwrap();
    }

    let genesis = node.seal_block(ids.clone(), 0, None);
    assert!(genesis.verify().is_ok());
    assert!(genesis.contains(&ids[1]));

    let next = node.seal_block(vec![], 1, Some(genesis.id()));
    assert!(next.verify().is_ok());
    assert_eq!(next.previous, Some(genesis.id()));
}

#[tokio::test]
async fn announce_failure_does_not_unaccept() {
    let transport = Arc::new(MemoryTransport::default());
    let mut node = test_node(transport);

    // Circle scope without membership: the announce is refused by the topic
    // gate, the event stays accepted locally.
    let event = node
        .create_event(conversation_draft("circle talk").with_scope(Scope::Circle))
        .unwrap();
    let id = event.id;

    let acceptance = node.submit_event(event).await.unwrap();
    assert_eq!(acceptance, Acceptance::Applied(id));
    assert!(node.store().has_event(&id).unwrap());
}

#[tokio::test]
async fn single_use_grants_gate_a_second_event() {
    let transport = Arc::new(MemoryTransport::default());
    let mut alice = test_node(transport.clone());
    let mut bob = test_node(transport);

    bob.issue_capability(
        alice.did().clone(),
        Resource::new(ResourceKind::User, alice.did().as_str()),
        [Right::Write],
        Some(rhizome_auth::Constraints::default().with_max_uses(1)),
    )
    .unwrap();

    let first = alice.create_event(conversation_draft("one")).unwrap();
    assert!(bob.submit_event(first).await.is_ok());

    let second = alice.create_event(conversation_draft("two")).unwrap();
    match bob.submit_event(second).await {
        Err(EngineError::Authorization { source, .. }) => {
            assert_eq!(source, CapabilityError::ExhaustedUses);
        }
        other => panic!("expected exhausted grant, got {other:?}"),
    }
}

/// The four-node convergence scenario: concurrent updates folded in
/// different orders yield the same head membership.
#[tokio::test]
async fn concurrent_folds_converge_across_replicas() {
    let transport = Arc::new(MemoryTransport::default());
    let mut alice = test_node(transport.clone());
    let mut bob = test_node(transport.clone());
    let mut carol = test_node(transport.clone());

    let alice_did = alice.did().clone();
    let bob_did = bob.did().clone();
    let carol_did = carol.did().clone();

    // E1: Alice creates the conversation.
    let e1 = alice.create_event(conversation_draft("shared")).unwrap();
    let entity_id = e1.entity_id.clone().unwrap();
    alice.submit_event(e1.clone()).await.unwrap();

    // Bob and Carol both know E1 but not each other's update.
    for node in [&mut bob, &mut carol] {
        node.authorize_author(&alice_did).unwrap();
        node.submit_event(e1.clone()).await.unwrap();
    }

    let e2 = bob
        .create_event(update_draft(&entity_id, "from bob"))
        .unwrap();
    {
        grant_entity_write(&mut bob, &bob_did, &entity_id);
        bob.submit_event(e2.clone()).await.unwrap();
    }

    let e3 = carol
        .create_event(update_draft(&entity_id, "from carol"))
        .unwrap();
    {
        grant_entity_write(&mut carol, &carol_did, &entity_id);
        carol.submit_event(e3.clone()).await.unwrap();
    }

    assert_eq!(e2.parents, vec![e1.id]);
    assert_eq!(e3.parents, vec![e1.id]);

    // Two fresh replicas fold the events in different orders.
    let mut dave = test_node(transport.clone());
    let mut erin = test_node(transport);
    for node in [&mut dave, &mut erin] {
        for did in [&alice_did, &bob_did, &carol_did] {
            node.authorize_author(did).unwrap();
        }
    }
    for (node, order) in [(&mut dave, [&e1, &e2, &e3]), (&mut erin, [&e1, &e3, &e2])] {
        grant_entity_write(node, &bob_did, &entity_id);
        grant_entity_write(node, &carol_did, &entity_id);
        for event in order {
            node.submit_event((*event).clone()).await.unwrap();
        }
    }

    let dave_entity = dave.entity(&entity_id).unwrap().unwrap();
    let erin_entity = erin.entity(&entity_id).unwrap().unwrap();

    // Both concurrent updates are retained, in the same head set.
    assert_eq!(dave_entity.head_ids(), erin_entity.head_ids());
    assert_eq!(dave_entity.head_ids().len(), 2);
    assert!(dave_entity.head_ids().contains(&e2.id));
    assert!(dave_entity.head_ids().contains(&e3.id));
    assert_eq!(dave_entity.vector_clock, erin_entity.vector_clock);
}
