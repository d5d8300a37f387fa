use super::*;
use crate::frame::Data;
use tokio::time::{Duration, timeout};

fn participant(user_id: &str) -> Participant {
    Participant {
        connection_id: Uuid::new_v4(),
        user_id: user_id.into(),
        display_name: user_id.to_uppercase(),
        joined_at: 1,
    }
}

async fn assert_channel_has_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("frame receive timed out")
        .expect("channel closed")
}

fn assert_channel_empty(rx: &mut mpsc::Receiver<Frame>) {
    assert!(rx.try_recv().is_err(), "expected channel to remain empty");
}

#[test]
fn join_preserves_join_order() {
    let mut presence = Presence::new();
    let (tx, _rx) = mpsc::channel(8);
    let a = participant("a");
    let b = participant("b");
    let c = participant("c");

    presence.join(a.clone(), tx.clone());
    presence.join(b.clone(), tx.clone());
    let list = presence.join(c.clone(), tx);

    let ids: Vec<_> = list.iter().map(|p| p.connection_id).collect();
    assert_eq!(ids, vec![a.connection_id, b.connection_id, c.connection_id]);
}

#[test]
fn rejoin_same_connection_replaces_in_place() {
    let mut presence = Presence::new();
    let (tx, _rx) = mpsc::channel(8);
    let a = participant("a");
    let b = participant("b");
    presence.join(a.clone(), tx.clone());
    presence.join(b.clone(), tx.clone());

    let renamed = Participant { display_name: "Renamed".into(), ..a.clone() };
    let list = presence.join(renamed, tx);

    assert_eq!(list.len(), 2);
    assert_eq!(list[0].connection_id, a.connection_id);
    assert_eq!(list[0].display_name, "Renamed");
}

#[test]
fn same_user_in_two_tabs_holds_two_entries() {
    let mut presence = Presence::new();
    let (tx, _rx) = mpsc::channel(8);
    presence.join(participant("same"), tx.clone());
    presence.join(participant("same"), tx);
    assert_eq!(presence.len(), 2);
}

#[test]
fn leave_returns_removed_and_ignores_unknown() {
    let mut presence = Presence::new();
    let (tx, _rx) = mpsc::channel(8);
    let a = participant("a");
    presence.join(a.clone(), tx);

    assert!(presence.leave(Uuid::new_v4()).is_none());
    assert_eq!(presence.len(), 1);

    let removed = presence.leave(a.connection_id).expect("a was present");
    assert_eq!(removed.user_id, "a");
    assert!(presence.is_empty());
    assert!(presence.leave(a.connection_id).is_none());
}

#[test]
fn count_tracks_joins_minus_leaves() {
    let mut presence = Presence::new();
    let (tx, _rx) = mpsc::channel(8);
    let people: Vec<_> = (0..5).map(|i| participant(&format!("u{i}"))).collect();
    for p in &people {
        presence.join(p.clone(), tx.clone());
    }
    presence.leave(people[1].connection_id);
    presence.leave(people[3].connection_id);
    presence.leave(people[3].connection_id);
    assert_eq!(presence.len(), 3);
}

#[tokio::test]
async fn broadcast_skips_excluded_connection() {
    let mut presence = Presence::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let a = participant("a");
    let b = participant("b");
    presence.join(a.clone(), tx_a);
    presence.join(b, tx_b);

    presence.broadcast(&Frame::event("user-joined", Data::new()), Some(a.connection_id));

    let got = assert_channel_has_frame(&mut rx_b).await;
    assert_eq!(got.event, "user-joined");
    assert_channel_empty(&mut rx_a);
}

#[tokio::test]
async fn send_to_targets_single_connection() {
    let mut presence = Presence::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let a = participant("a");
    let b = participant("b");
    presence.join(a, tx_a);
    presence.join(b.clone(), tx_b);

    assert!(presence.send_to(b.connection_id, Frame::event("video-offer", Data::new())));
    assert!(!presence.send_to(Uuid::new_v4(), Frame::event("video-offer", Data::new())));

    assert_eq!(assert_channel_has_frame(&mut rx_b).await.event, "video-offer");
    assert_channel_empty(&mut rx_a);
}

#[test]
fn full_queue_drops_frame_without_blocking() {
    let mut presence = Presence::new();
    let (tx, mut rx) = mpsc::channel(1);
    presence.join(participant("a"), tx);

    presence.broadcast(&Frame::event("first", Data::new()), None);
    presence.broadcast(&Frame::event("second", Data::new()), None);

    assert_eq!(rx.try_recv().expect("first frame queued").event, "first");
    assert!(rx.try_recv().is_err(), "second frame should have been dropped");
}
