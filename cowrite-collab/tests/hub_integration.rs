//! End-to-end tests for the collaboration hub.
//!
//! Each test starts a real hub on an ephemeral port with in-memory
//! stores and connects real WebSocket clients, exercising the full
//! handshake → join → broadcast → disconnect pipeline.

use std::sync::Arc;

use cowrite_auth::{AuthConfig, CredentialAuthority, MemoryRefreshTokenStore};
use cowrite_collab::client::{CollabClient, SessionEvent};
use cowrite_collab::presence::PresenceRegistry;
use cowrite_collab::protocol::{CursorPosition, ServerEvent};
use cowrite_collab::server::{CollabHub, HubConfig, HubServices};
use cowrite_core::{
    Grant, GrantStore, MemoryGrantStore, MemoryNoteStore, MemoryUserStore, Note, NoteStore,
    Permission, Role, User, UserStore,
};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

struct TestHub {
    url: String,
    authority: Arc<CredentialAuthority>,
    users: Arc<MemoryUserStore>,
    notes: Arc<MemoryNoteStore>,
    grants: Arc<MemoryGrantStore>,
    presence: Arc<PresenceRegistry>,
}

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a hub on a free port with fresh in-memory stores.
async fn start_hub() -> TestHub {
    let port = free_port().await;

    let users = Arc::new(MemoryUserStore::new());
    let notes = Arc::new(MemoryNoteStore::new());
    let grants = Arc::new(MemoryGrantStore::new());
    let presence = Arc::new(PresenceRegistry::new());

    let auth_config = AuthConfig::new("integration-secret", 900, 7 * 24 * 60 * 60);
    let authority = Arc::new(CredentialAuthority::new(
        &auth_config,
        Arc::new(MemoryRefreshTokenStore::new()),
    ));

    let hub = CollabHub::new(
        HubConfig {
            bind_addr: format!("127.0.0.1:{port}"),
            max_room_participants: 10,
            broadcast_capacity: 64,
        },
        HubServices {
            authority: authority.clone(),
            users: users.clone(),
            notes: notes.clone(),
            grants: grants.clone(),
            presence: presence.clone(),
        },
    );
    tokio::spawn(async move {
        hub.run().await.unwrap();
    });
    // Give the hub time to bind.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestHub {
        url: format!("ws://127.0.0.1:{port}"),
        authority,
        users,
        notes,
        grants,
        presence,
    }
}

async fn register(env: &TestHub, name: &str, email: &str) -> User {
    let user = User::new(name, email, Role::Editor, "");
    env.users.insert(user.clone()).await.unwrap();
    user
}

async fn create_note(env: &TestHub, owner: &User, title: &str, content: &str) -> Note {
    let note = Note::new(owner.id, title, content);
    env.notes.insert(note.clone()).await.unwrap();
    note
}

/// Connect a client for `user` and wait for the handshake ack.
async fn connect(env: &TestHub, user: &User) -> (CollabClient, mpsc::Receiver<SessionEvent>) {
    let pair = env.authority.issue(user.id).await.unwrap();
    let mut client = CollabClient::new(&env.url, pair.access_token);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    let ack = wait_for(&mut events, |e| {
        matches!(e, ServerEvent::Authenticated { .. })
    })
    .await;
    assert!(ack.is_some(), "handshake was not acknowledged");
    (client, events)
}

/// Wait up to 2s for a hub event matching the predicate.
async fn wait_for(
    events: &mut mpsc::Receiver<SessionEvent>,
    pred: impl Fn(&ServerEvent) -> bool,
) -> Option<ServerEvent> {
    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(SessionEvent::Server(event)) if pred(&event) => return Some(event),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Assert that no matching hub event arrives within the window.
async fn expect_none(
    events: &mut mpsc::Receiver<SessionEvent>,
    pred: impl Fn(&ServerEvent) -> bool,
    window_ms: u64,
) {
    let hit = timeout(Duration::from_millis(window_ms), async {
        loop {
            match events.recv().await {
                Some(SessionEvent::Server(event)) if pred(&event) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await;
    assert!(
        matches!(hit, Err(_) | Ok(false)),
        "unexpected event arrived"
    );
}

/// Drain anything already queued.
async fn drain(events: &mut mpsc::Receiver<SessionEvent>) {
    while let Ok(Some(_)) = timeout(Duration::from_millis(50), events.recv()).await {}
}

// ─── Handshake ───────────────────────────────────────────────────

#[tokio::test]
async fn bad_token_is_rejected_before_any_state() {
    let env = start_hub().await;

    let mut client = CollabClient::new(&env.url, "not-a-real-token");
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    let rejection = wait_for(&mut events, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        Some(ServerEvent::Error { reason }) => assert_eq!(reason, "Invalid token"),
        other => panic!("expected rejection, got {other:?}"),
    }

    assert_eq!(env.presence.room_count().await, 0);
}

#[tokio::test]
async fn valid_token_for_deleted_user_is_rejected() {
    let env = start_hub().await;
    // Signed for an identity that is not in the user store.
    let pair = env.authority.issue(Uuid::new_v4()).await.unwrap();

    let mut client = CollabClient::new(&env.url, pair.access_token);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    let rejection = wait_for(&mut events, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        Some(ServerEvent::Error { reason }) => assert_eq!(reason, "User not found"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

// ─── Join ────────────────────────────────────────────────────────

#[tokio::test]
async fn join_delivers_snapshot_and_presence() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let note = create_note(&env, &owner, "Minutes", "agenda items").await;

    let (client, mut events) = connect(&env, &owner).await;
    client.join_note(note.id).await.unwrap();

    let joined = wait_for(&mut events, |e| matches!(e, ServerEvent::Joined { .. })).await;
    match joined {
        Some(ServerEvent::Joined { note_id, note: snapshot }) => {
            assert_eq!(note_id, note.id);
            assert_eq!(snapshot.content, "agenda items");
        }
        other => panic!("expected Joined, got {other:?}"),
    }

    let presence = wait_for(&mut events, |e| matches!(e, ServerEvent::ActiveUsers { .. })).await;
    match presence {
        Some(ServerEvent::ActiveUsers { users, .. }) => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].user_id, owner.id);
            assert_eq!(users[0].name, "Alice");
        }
        other => panic!("expected ActiveUsers, got {other:?}"),
    }
}

#[tokio::test]
async fn join_missing_note_fails_without_presence() {
    let env = start_hub().await;
    let user = register(&env, "Alice", "alice@example.com").await;

    let (client, mut events) = connect(&env, &user).await;
    client.join_note(Uuid::new_v4()).await.unwrap();

    let err = wait_for(&mut events, |e| matches!(e, ServerEvent::Error { .. })).await;
    match err {
        Some(ServerEvent::Error { reason }) => assert_eq!(reason, "Note not found"),
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(env.presence.room_count().await, 0);
}

#[tokio::test]
async fn join_without_grant_is_denied() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let stranger = register(&env, "Mallory", "mallory@example.com").await;
    let note = create_note(&env, &owner, "Private", "secret").await;

    let (client, mut events) = connect(&env, &stranger).await;
    client.join_note(note.id).await.unwrap();

    let err = wait_for(&mut events, |e| matches!(e, ServerEvent::Error { .. })).await;
    match err {
        Some(ServerEvent::Error { reason }) => assert_eq!(reason, "Access denied"),
        other => panic!("expected Error, got {other:?}"),
    }
    assert!(env.presence.list(note.id).await.is_empty());
}

// ─── Edits ───────────────────────────────────────────────────────

#[tokio::test]
async fn edit_before_join_is_structurally_rejected() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let note = create_note(&env, &owner, "Minutes", "original").await;

    let (client, mut events) = connect(&env, &owner).await;
    client
        .update_note(note.id, None, Some("sneaky".into()))
        .await
        .unwrap();

    let err = wait_for(&mut events, |e| matches!(e, ServerEvent::Error { .. })).await;
    assert!(err.is_some());

    let stored = env.notes.get(note.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "original");
}

#[tokio::test]
async fn viewer_update_is_rejected_with_no_broadcast() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let viewer = register(&env, "Bob", "bob@example.com").await;
    let note = create_note(&env, &owner, "Minutes", "original").await;
    env.grants
        .upsert(Grant::new(note.id, viewer.id, Permission::Viewer))
        .await
        .unwrap();

    let (owner_client, mut owner_events) = connect(&env, &owner).await;
    owner_client.join_note(note.id).await.unwrap();
    wait_for(&mut owner_events, |e| matches!(e, ServerEvent::Joined { .. })).await;

    let (viewer_client, mut viewer_events) = connect(&env, &viewer).await;
    viewer_client.join_note(note.id).await.unwrap();
    // The viewer is present in the room before attempting the edit.
    wait_for(&mut viewer_events, |e| matches!(e, ServerEvent::Joined { .. })).await;
    drain(&mut owner_events).await;

    viewer_client
        .update_note(note.id, None, Some("defaced".into()))
        .await
        .unwrap();

    let err = wait_for(&mut viewer_events, |e| matches!(e, ServerEvent::Error { .. })).await;
    match err {
        Some(ServerEvent::Error { reason }) => assert_eq!(reason, "No edit permission"),
        other => panic!("expected Error, got {other:?}"),
    }

    // No storage mutation, no fan-out.
    let stored = env.notes.get(note.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "original");
    expect_none(
        &mut owner_events,
        |e| matches!(e, ServerEvent::NoteUpdated { .. }),
        200,
    )
    .await;
}

#[tokio::test]
async fn grant_upgrade_unlocks_editing() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let collaborator = register(&env, "Bob", "bob@example.com").await;
    let note = create_note(&env, &owner, "Minutes", "original").await;
    env.grants
        .upsert(Grant::new(note.id, collaborator.id, Permission::Viewer))
        .await
        .unwrap();

    let (owner_client, mut owner_events) = connect(&env, &owner).await;
    owner_client.join_note(note.id).await.unwrap();
    wait_for(&mut owner_events, |e| matches!(e, ServerEvent::Joined { .. })).await;

    let (collab_client, mut collab_events) = connect(&env, &collaborator).await;
    collab_client.join_note(note.id).await.unwrap();
    wait_for(&mut collab_events, |e| matches!(e, ServerEvent::Joined { .. })).await;

    // Still a viewer: rejected.
    collab_client
        .update_note(note.id, None, Some("too early".into()))
        .await
        .unwrap();
    let err = wait_for(&mut collab_events, |e| matches!(e, ServerEvent::Error { .. })).await;
    assert!(err.is_some());

    // The owner upgrades the grant; the next edit is re-checked and
    // goes through without rejoining.
    env.grants
        .upsert(Grant::new(note.id, collaborator.id, Permission::Editor))
        .await
        .unwrap();
    drain(&mut owner_events).await;
    drain(&mut collab_events).await;

    collab_client
        .update_note(note.id, None, Some("approved edit".into()))
        .await
        .unwrap();

    let update = wait_for(&mut owner_events, |e| {
        matches!(e, ServerEvent::NoteUpdated { .. })
    })
    .await;
    match update {
        Some(ServerEvent::NoteUpdated {
            content,
            updated_by,
            ..
        }) => {
            assert_eq!(content.as_deref(), Some("approved edit"));
            assert_eq!(updated_by.id, collaborator.id);
        }
        other => panic!("expected NoteUpdated, got {other:?}"),
    }

    // Last writer wins at the store.
    let stored = env.notes.get(note.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "approved edit");

    // The sender does not receive its own broadcast.
    expect_none(
        &mut collab_events,
        |e| matches!(e, ServerEvent::NoteUpdated { .. }),
        200,
    )
    .await;
}

// ─── Cursors ─────────────────────────────────────────────────────

#[tokio::test]
async fn cursor_moves_reach_other_members_only() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let editor = register(&env, "Bob", "bob@example.com").await;
    let note = create_note(&env, &owner, "Minutes", "text").await;
    env.grants
        .upsert(Grant::new(note.id, editor.id, Permission::Editor))
        .await
        .unwrap();

    let (owner_client, mut owner_events) = connect(&env, &owner).await;
    owner_client.join_note(note.id).await.unwrap();
    wait_for(&mut owner_events, |e| matches!(e, ServerEvent::Joined { .. })).await;

    let (editor_client, mut editor_events) = connect(&env, &editor).await;
    editor_client.join_note(note.id).await.unwrap();
    wait_for(&mut editor_events, |e| matches!(e, ServerEvent::Joined { .. })).await;
    drain(&mut owner_events).await;
    drain(&mut editor_events).await;

    editor_client
        .cursor_move(note.id, CursorPosition::caret(17))
        .await
        .unwrap();

    let moved = wait_for(&mut owner_events, |e| {
        matches!(e, ServerEvent::CursorMoved { .. })
    })
    .await;
    match moved {
        Some(ServerEvent::CursorMoved { name, position, .. }) => {
            assert_eq!(name, "Bob");
            assert_eq!(position.anchor, 17);
        }
        other => panic!("expected CursorMoved, got {other:?}"),
    }

    expect_none(
        &mut editor_events,
        |e| matches!(e, ServerEvent::CursorMoved { .. }),
        200,
    )
    .await;
}

// ─── Presence lifecycle ──────────────────────────────────────────

#[tokio::test]
async fn disconnect_without_leave_cleans_presence() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let editor = register(&env, "Bob", "bob@example.com").await;
    let note = create_note(&env, &owner, "Minutes", "text").await;
    env.grants
        .upsert(Grant::new(note.id, editor.id, Permission::Editor))
        .await
        .unwrap();

    let (mut owner_client, mut owner_events) = connect(&env, &owner).await;
    owner_client.join_note(note.id).await.unwrap();
    wait_for(&mut owner_events, |e| matches!(e, ServerEvent::Joined { .. })).await;

    let (editor_client, mut editor_events) = connect(&env, &editor).await;
    editor_client.join_note(note.id).await.unwrap();
    wait_for(&mut editor_events, |e| matches!(e, ServerEvent::Joined { .. })).await;
    drain(&mut editor_events).await;

    // Drop the connection without an explicit leave.
    owner_client.disconnect();

    let shrunk = wait_for(&mut editor_events, |e| {
        matches!(e, ServerEvent::ActiveUsers { users, .. } if users.len() == 1)
    })
    .await;
    match shrunk {
        Some(ServerEvent::ActiveUsers { users, .. }) => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].user_id, editor.id);
        }
        other => panic!("expected shrunk ActiveUsers, got {other:?}"),
    }

    let remaining = env.presence.list(note.id).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_id, editor.id);
}

#[tokio::test]
async fn explicit_leave_updates_room_and_allows_rejoin() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let editor = register(&env, "Bob", "bob@example.com").await;
    let note = create_note(&env, &owner, "Minutes", "text").await;
    env.grants
        .upsert(Grant::new(note.id, editor.id, Permission::Editor))
        .await
        .unwrap();

    let (owner_client, mut owner_events) = connect(&env, &owner).await;
    owner_client.join_note(note.id).await.unwrap();
    wait_for(&mut owner_events, |e| matches!(e, ServerEvent::Joined { .. })).await;

    let (editor_client, mut editor_events) = connect(&env, &editor).await;
    editor_client.join_note(note.id).await.unwrap();
    wait_for(&mut editor_events, |e| matches!(e, ServerEvent::Joined { .. })).await;

    owner_client.leave_note(note.id).await.unwrap();

    let shrunk = wait_for(&mut editor_events, |e| {
        matches!(e, ServerEvent::ActiveUsers { users, .. } if users.len() == 1)
    })
    .await;
    assert!(shrunk.is_some());
    assert_eq!(env.presence.count(note.id).await, 1);

    // The connection is back in RoomIdle and may join again.
    drain(&mut owner_events).await;
    owner_client.join_note(note.id).await.unwrap();
    let rejoined = wait_for(&mut owner_events, |e| matches!(e, ServerEvent::Joined { .. })).await;
    assert!(rejoined.is_some());
    assert_eq!(env.presence.count(note.id).await, 2);
}

#[tokio::test]
async fn second_join_on_same_connection_is_rejected() {
    let env = start_hub().await;
    let owner = register(&env, "Alice", "alice@example.com").await;
    let note_a = create_note(&env, &owner, "First", "a").await;
    let note_b = create_note(&env, &owner, "Second", "b").await;

    let (client, mut events) = connect(&env, &owner).await;
    client.join_note(note_a.id).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ServerEvent::Joined { .. })).await;

    client.join_note(note_b.id).await.unwrap();
    let err = wait_for(&mut events, |e| matches!(e, ServerEvent::Error { .. })).await;
    match err {
        Some(ServerEvent::Error { reason }) => assert_eq!(reason, "Already in a note room"),
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(env.presence.count(note_b.id).await, 0);
}
