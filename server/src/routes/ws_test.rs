use super::*;
use crate::state::test_helpers;
use events::{CodeLesson, DirectionLesson, ExplorationState, Role, VarBinding};
use serde_json::json;
use tokio::time::{Duration, timeout};

// =============================================================================
// HELPERS
// =============================================================================

fn code_push(code: &str) -> Event {
    Event::TeacherBroadcast {
        activity: ActivityKey::A2,
        data: CodeLesson {
            code: code.to_owned(),
            code_info: vec![VarBinding { name: "answer_found".to_owned(), value: json!(true) }],
            total_heads: 35,
            total_legs: 94,
        },
    }
}

fn directions_push() -> Event {
    Event::TeacherDirectionsBroadcast {
        activity: ActivityKey::A3,
        data: DirectionLesson {
            directions: vec!["start from legs".to_owned(), "halve the range".to_owned()],
            timestamp: 1_700_000_000_000,
        },
    }
}

async fn process(state: &AppState, conn_id: Uuid, event: &Event) -> Vec<Event> {
    let text = events::encode(event).expect("encode inbound");
    process_inbound_text(state, conn_id, &text)
        .await
        .into_iter()
        .map(|frame| events::decode(&frame).expect("sender frame should decode"))
        .collect()
}

async fn recv_event(rx: &mut tokio::sync::mpsc::Receiver<String>) -> Event {
    let text = timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("relayed frame timed out")
        .expect("outbox closed unexpectedly");
    events::decode(&text).expect("relayed frame should decode")
}

async fn assert_no_event(rx: &mut tokio::sync::mpsc::Receiver<String>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no relayed frame"
    );
}

// =============================================================================
// SESSION EVENTS
// =============================================================================

#[tokio::test]
async fn login_records_session_and_relays_to_peers_only() {
    let state = test_helpers::test_app_state();
    let (sender_id, mut sender_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    let login = Event::SessionLogin { group_id: 7, role: Some(Role::Recorder) };
    let replies = process(&state, sender_id, &login).await;

    assert!(replies.is_empty());
    assert_eq!(recv_event(&mut peer_rx).await, login);
    assert_no_event(&mut sender_rx).await;

    let sessions = state.sessions.read().await;
    let session = sessions.get(&sender_id).expect("session recorded");
    assert_eq!(session.group_id, 7);
    assert_eq!(session.role, Some(Role::Recorder));
}

#[tokio::test]
async fn logout_erases_session_and_relays_to_peers() {
    let state = test_helpers::test_app_state();
    let (sender_id, _sender_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    process(&state, sender_id, &Event::SessionLogin { group_id: 7, role: Some(Role::Recorder) }).await;
    let _ = recv_event(&mut peer_rx).await;

    let logout = Event::SessionLogout { group_id: 7, role: Some(Role::Recorder) };
    process(&state, sender_id, &logout).await;

    assert_eq!(recv_event(&mut peer_rx).await, logout);
    assert!(state.sessions.read().await.is_empty());
}

#[tokio::test]
async fn student_update_takes_the_generic_relay_path() {
    let state = test_helpers::test_app_state();
    let (sender_id, mut sender_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    let update = Event::StudentUpdate {
        group_id: 7,
        activity: ActivityKey::A1,
        stars: 3,
        payload: Some(json!({"solved": true})),
    };
    process(&state, sender_id, &update).await;

    assert_eq!(recv_event(&mut peer_rx).await, update);
    assert_no_event(&mut sender_rx).await;
}

#[tokio::test]
async fn exploration_sync_is_relayed_opaquely() {
    let state = test_helpers::test_app_state();
    let (sender_id, _sender_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    let sync = Event::ExplorationSync {
        group_id: 2,
        data: ExplorationState {
            optimization_direction: "binary search over heads".to_owned(),
            python_code: "print(17, 18)".to_owned(),
            run_output: "17 18".to_owned(),
            has_error: false,
            stars: 2,
        },
    };
    process(&state, sender_id, &sync).await;
    assert_eq!(recv_event(&mut peer_rx).await, sync);
    assert!(state.broadcasts.read().await.is_empty());
}

// =============================================================================
// RETENTION + REPLAY
// =============================================================================

#[tokio::test]
async fn teacher_broadcast_is_retained_and_relayed_to_peers() {
    let state = test_helpers::test_app_state();
    let (teacher_id, mut teacher_rx) = test_helpers::register_client(&state).await;
    let (_student_id, mut student_rx) = test_helpers::register_client(&state).await;

    let push = code_push("total = 35");
    let replies = process(&state, teacher_id, &push).await;

    assert!(replies.is_empty());
    assert_eq!(recv_event(&mut student_rx).await, push);
    assert_no_event(&mut teacher_rx).await;
    assert!(state.broadcasts.read().await.contains_key(&RetentionSlot::Activity2));
}

#[tokio::test]
async fn late_joiner_request_replays_exactly_the_last_push() {
    let state = test_helpers::test_app_state();
    let (teacher_id, _teacher_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    process(&state, teacher_id, &code_push("v1")).await;
    process(&state, teacher_id, &code_push("v2")).await;
    let _ = recv_event(&mut peer_rx).await;
    let _ = recv_event(&mut peer_rx).await;

    // A client that connects after both pushes asks for the latest.
    let (late_id, mut late_rx) = test_helpers::register_client(&state).await;
    let replies = process(
        &state,
        late_id,
        &Event::RequestBroadcast { activity: ActivityKey::A2, group_id: 9 },
    )
    .await;

    assert_eq!(replies.len(), 1);
    let Event::TeacherBroadcast { data, .. } = &replies[0] else {
        panic!("expected teacher:broadcast replay");
    };
    assert_eq!(data.code, "v2");

    // The replay goes to the requester only.
    assert_no_event(&mut late_rx).await;
    assert_no_event(&mut peer_rx).await;
}

#[tokio::test]
async fn request_without_retention_yields_no_reply() {
    let state = test_helpers::test_app_state();
    let (conn_id, mut rx) = test_helpers::register_client(&state).await;

    let replies = process(
        &state,
        conn_id,
        &Event::RequestBroadcast { activity: ActivityKey::A3, group_id: 1 },
    )
    .await;
    assert!(replies.is_empty());
    assert_no_event(&mut rx).await;
}

#[tokio::test]
async fn request_for_the_first_activity_is_a_no_op() {
    let state = test_helpers::test_app_state();
    let (conn_id, _rx) = test_helpers::register_client(&state).await;

    let replies = process(
        &state,
        conn_id,
        &Event::RequestBroadcast { activity: ActivityKey::A1, group_id: 1 },
    )
    .await;
    assert!(replies.is_empty());
}

#[tokio::test]
async fn directions_broadcast_fills_the_activity3_slot() {
    let state = test_helpers::test_app_state();
    let (teacher_id, _teacher_rx) = test_helpers::register_client(&state).await;

    process(&state, teacher_id, &directions_push()).await;

    let (late_id, _late_rx) = test_helpers::register_client(&state).await;
    let replies = process(
        &state,
        late_id,
        &Event::RequestBroadcast { activity: ActivityKey::A3, group_id: 4 },
    )
    .await;
    assert_eq!(replies, vec![directions_push()]);
}

#[tokio::test]
async fn mismatched_broadcast_activity_is_relayed_but_not_retained() {
    let state = test_helpers::test_app_state();
    let (teacher_id, _teacher_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    // A code push claiming to be for a3 takes the generic path.
    let odd = Event::TeacherBroadcast {
        activity: ActivityKey::A3,
        data: CodeLesson {
            code: "x = 1".to_owned(),
            code_info: vec![],
            total_heads: 0,
            total_legs: 0,
        },
    };
    process(&state, teacher_id, &odd).await;

    assert_eq!(recv_event(&mut peer_rx).await, odd);
    assert!(state.broadcasts.read().await.is_empty());
}

// =============================================================================
// CLEAR / LOGOUT / PING
// =============================================================================

#[tokio::test]
async fn clear_broadcasts_wipes_retention_and_notifies_everyone() {
    let state = test_helpers::test_app_state();
    let (teacher_id, mut teacher_rx) = test_helpers::register_client(&state).await;
    let (_student_id, mut student_rx) = test_helpers::register_client(&state).await;

    process(&state, teacher_id, &code_push("v1")).await;
    let _ = recv_event(&mut student_rx).await;

    process(&state, teacher_id, &Event::ClearBroadcasts).await;

    // Cleared-ack reaches ALL connections, sender included.
    assert_eq!(recv_event(&mut teacher_rx).await, Event::BroadcastsCleared);
    assert_eq!(recv_event(&mut student_rx).await, Event::BroadcastsCleared);
    assert!(state.broadcasts.read().await.is_empty());

    // A later request finds nothing.
    let replies = process(
        &state,
        teacher_id,
        &Event::RequestBroadcast { activity: ActivityKey::A2, group_id: 3 },
    )
    .await;
    assert!(replies.is_empty());
}

#[tokio::test]
async fn teacher_logout_also_wipes_retention_and_notifies_everyone() {
    let state = test_helpers::test_app_state();
    let (teacher_id, mut teacher_rx) = test_helpers::register_client(&state).await;
    let (_student_id, mut student_rx) = test_helpers::register_client(&state).await;

    process(&state, teacher_id, &directions_push()).await;
    let _ = recv_event(&mut student_rx).await;

    process(&state, teacher_id, &Event::TeacherLogout).await;

    assert_eq!(recv_event(&mut teacher_rx).await, Event::BroadcastsCleared);
    assert_eq!(recv_event(&mut student_rx).await, Event::BroadcastsCleared);
    assert!(state.broadcasts.read().await.is_empty());

    // The logout event itself is absorbed, not relayed.
    assert_no_event(&mut student_rx).await;
}

#[tokio::test]
async fn teacher_ping_reaches_all_connections_including_sender() {
    let state = test_helpers::test_app_state();
    let (teacher_id, mut teacher_rx) = test_helpers::register_client(&state).await;
    let (_a, mut rx_a) = test_helpers::register_client(&state).await;
    let (_b, mut rx_b) = test_helpers::register_client(&state).await;

    process(&state, teacher_id, &Event::TeacherPing).await;

    assert_eq!(recv_event(&mut teacher_rx).await, Event::TeacherPing);
    assert_eq!(recv_event(&mut rx_a).await, Event::TeacherPing);
    assert_eq!(recv_event(&mut rx_b).await, Event::TeacherPing);
}

// =============================================================================
// MALFORMED / UNKNOWN INBOUND
// =============================================================================

#[tokio::test]
async fn unknown_tagged_event_passes_through_to_peers() {
    let state = test_helpers::test_app_state();
    let (sender_id, mut sender_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    let raw = r#"{"type":"teacher:confetti","groupId":5}"#;
    let replies = process_inbound_text(&state, sender_id, raw).await;

    assert!(replies.is_empty());
    let text = timeout(Duration::from_millis(500), peer_rx.recv())
        .await
        .expect("passthrough timed out")
        .expect("outbox closed");
    assert_eq!(text, raw);
    assert_no_event(&mut sender_rx).await;
}

#[tokio::test]
async fn invalid_json_is_dropped() {
    let state = test_helpers::test_app_state();
    let (sender_id, _sender_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    let replies = process_inbound_text(&state, sender_id, "{not json").await;
    assert!(replies.is_empty());
    assert_no_event(&mut peer_rx).await;

    let replies = process_inbound_text(&state, sender_id, r#"{"no_tag":1}"#).await;
    assert!(replies.is_empty());
    assert_no_event(&mut peer_rx).await;
}

// =============================================================================
// REAL SOCKETS
// =============================================================================

mod live {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    type LiveSocket = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn spawn_relay() -> (std::net::SocketAddr, AppState) {
        let state = test_helpers::test_app_state();
        let app = crate::routes::app(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (addr, state)
    }

    async fn connect(addr: std::net::SocketAddr) -> LiveSocket {
        let (socket, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("ws connect");
        socket
    }

    async fn send(socket: &mut LiveSocket, event: &Event) {
        let text = events::encode(event).expect("encode");
        socket
            .send(WsMessage::Text(text.into()))
            .await
            .expect("ws send");
    }

    async fn recv(socket: &mut LiveSocket) -> Event {
        loop {
            let msg = timeout(Duration::from_secs(2), socket.next())
                .await
                .expect("ws recv timed out")
                .expect("ws closed")
                .expect("ws error");
            match msg {
                WsMessage::Text(text) => return events::decode(&text).expect("decode"),
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                other => panic!("unexpected ws message: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn late_joiner_catches_up_over_a_real_socket() {
        let (addr, _state) = spawn_relay().await;

        let mut teacher = connect(addr).await;
        send(&mut teacher, &code_push("total_heads = 35")).await;

        // Give the relay a beat to retain before the student connects.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut student = connect(addr).await;
        send(
            &mut student,
            &Event::RequestBroadcast { activity: ActivityKey::A2, group_id: 6 },
        )
        .await;

        let replayed = recv(&mut student).await;
        let Event::TeacherBroadcast { data, .. } = replayed else {
            panic!("expected teacher:broadcast replay");
        };
        assert_eq!(data.code, "total_heads = 35");
    }

    #[tokio::test]
    async fn clear_notifies_every_live_socket() {
        let (addr, _state) = spawn_relay().await;

        let mut teacher = connect(addr).await;
        let mut student = connect(addr).await;

        send(&mut teacher, &code_push("x = 1")).await;
        assert!(matches!(recv(&mut student).await, Event::TeacherBroadcast { .. }));

        send(&mut teacher, &Event::ClearBroadcasts).await;
        assert_eq!(recv(&mut teacher).await, Event::BroadcastsCleared);
        assert_eq!(recv(&mut student).await, Event::BroadcastsCleared);
    }

    #[tokio::test]
    async fn disconnect_cleans_up_the_connection_registry() {
        let (addr, state) = spawn_relay().await;

        let mut socket = connect(addr).await;
        send(
            &mut socket,
            &Event::SessionLogin { group_id: 2, role: Some(Role::Recorder) },
        )
        .await;

        // Wait for the login to land.
        timeout(Duration::from_secs(2), async {
            loop {
                if state.sessions.read().await.len() == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session record should appear");

        socket.close(None).await.expect("close");

        timeout(Duration::from_secs(2), async {
            loop {
                if state.sessions.read().await.is_empty() && state.clients.read().await.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("disconnect should clean up");
    }
}
