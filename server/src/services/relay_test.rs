use super::*;
use crate::state::test_helpers;
use events::{Event, Role};
use tokio::time::{Duration, timeout};

async fn recv_frame(rx: &mut tokio::sync::mpsc::Receiver<String>) -> Event {
    let text = timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("frame receive timed out")
        .expect("outbox closed unexpectedly");
    events::decode(&text).expect("relayed frame should decode")
}

async fn assert_no_frame(rx: &mut tokio::sync::mpsc::Receiver<String>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no relayed frame"
    );
}

#[tokio::test]
async fn broadcast_others_skips_the_sender() {
    let state = test_helpers::test_app_state();
    let (sender_id, mut sender_rx) = test_helpers::register_client(&state).await;
    let (_peer_id, mut peer_rx) = test_helpers::register_client(&state).await;

    let event = Event::SessionLogin { group_id: 4, role: Some(Role::Recorder) };
    broadcast_others(&state, &event, sender_id).await;

    assert_eq!(recv_frame(&mut peer_rx).await, event);
    assert_no_frame(&mut sender_rx).await;
}

#[tokio::test]
async fn broadcast_all_reaches_every_connection() {
    let state = test_helpers::test_app_state();
    let (_a, mut rx_a) = test_helpers::register_client(&state).await;
    let (_b, mut rx_b) = test_helpers::register_client(&state).await;

    broadcast_all(&state, &Event::TeacherPing).await;

    assert_eq!(recv_frame(&mut rx_a).await, Event::TeacherPing);
    assert_eq!(recv_frame(&mut rx_b).await, Event::TeacherPing);
}

#[tokio::test]
async fn full_outbox_does_not_block_other_clients() {
    let state = test_helpers::test_app_state();

    // A one-slot outbox that is already full.
    let stuck_id = uuid::Uuid::new_v4();
    let (stuck_tx, _stuck_rx) = tokio::sync::mpsc::channel(1);
    stuck_tx.try_send("occupied".to_owned()).expect("fill outbox");
    state.clients.write().await.insert(stuck_id, stuck_tx);

    let (_healthy_id, mut healthy_rx) = test_helpers::register_client(&state).await;

    broadcast_all(&state, &Event::BroadcastsCleared).await;
    assert_eq!(recv_frame(&mut healthy_rx).await, Event::BroadcastsCleared);
}
