use super::*;
use serde_json::json;
use tokio::sync::mpsc;

struct Member {
    participant: Participant,
    rx: mpsc::Receiver<Frame>,
}

fn room_of(n: usize) -> (Presence, Vec<Member>) {
    let mut presence = Presence::new();
    let mut members = Vec::new();
    for i in 0..n {
        let (tx, rx) = mpsc::channel(8);
        let participant = Participant {
            connection_id: Uuid::new_v4(),
            user_id: format!("u{i}"),
            display_name: format!("User {i}"),
            joined_at: 0,
        };
        presence.join(participant.clone(), tx);
        members.push(Member { participant, rx });
    }
    (presence, members)
}

fn offer_payload(target: Uuid) -> Data {
    let mut data = Data::new();
    data.insert(TARGET_KEY.into(), json!(target));
    data.insert("offer".into(), json!({"type": "offer", "sdp": "v=0..."}));
    data
}

#[test]
fn event_names_map_to_kinds() {
    assert_eq!(SignalKind::from_event("video-offer"), Some(SignalKind::Offer));
    assert_eq!(SignalKind::from_event("video-ice-candidate"), Some(SignalKind::Candidate));
    assert_eq!(SignalKind::from_event("video-leave"), Some(SignalKind::Leave));
    assert_eq!(SignalKind::from_event("send-message"), None);
    assert_eq!(SignalKind::Ready.outbound_event(), "video-user-ready");
    assert_eq!(SignalKind::Leave.outbound_event(), "video-user-left");
}

#[test]
fn offer_reaches_only_the_target() {
    let (presence, mut members) = room_of(3);
    let from = members[0].participant.clone();
    let target = members[1].participant.connection_id;

    let delivered = relay(&presence, "R1", SignalKind::Offer, &from, &offer_payload(target)).expect("relay ok");
    assert_eq!(delivered, 1);

    let got = members[1].rx.try_recv().expect("target receives offer");
    assert_eq!(got.event, "video-offer");
    assert_eq!(got.data.get(FROM_KEY), Some(&json!(from.connection_id)));
    assert!(got.data.get(TARGET_KEY).is_none());
    assert_eq!(got.data["offer"]["sdp"], "v=0...");

    assert!(members[0].rx.try_recv().is_err());
    assert!(members[2].rx.try_recv().is_err());
}

#[test]
fn malformed_payload_is_forwarded_untouched() {
    let (presence, mut members) = room_of(2);
    let from = members[0].participant.clone();
    let mut payload = Data::new();
    payload.insert(TARGET_KEY.into(), json!(members[1].participant.connection_id));
    payload.insert("candidate".into(), json!(42));

    relay(&presence, "R1", SignalKind::Candidate, &from, &payload).expect("relay ok");

    let got = members[1].rx.try_recv().expect("delivered");
    assert_eq!(got.event, "video-ice-candidate");
    assert_eq!(got.data["candidate"], 42);
}

#[test]
fn point_to_point_requires_target() {
    let (presence, members) = room_of(2);
    let from = members[0].participant.clone();

    let err = relay(&presence, "R1", SignalKind::Answer, &from, &Data::new()).unwrap_err();
    assert!(matches!(err, SignalError::MissingTarget));

    let mut bad = Data::new();
    bad.insert(TARGET_KEY.into(), json!("not-a-uuid"));
    assert!(relay(&presence, "R1", SignalKind::Answer, &from, &bad).is_err());
}

#[test]
fn unknown_target_is_dropped_silently() {
    let (presence, mut members) = room_of(2);
    let from = members[0].participant.clone();

    let delivered =
        relay(&presence, "R1", SignalKind::Offer, &from, &offer_payload(Uuid::new_v4())).expect("relay ok");
    assert_eq!(delivered, 0);
    assert!(members[1].rx.try_recv().is_err());
}

#[test]
fn ready_and_leave_announce_to_everyone_else() {
    let (presence, mut members) = room_of(3);
    let from = members[0].participant.clone();

    relay(&presence, "R1", SignalKind::Ready, &from, &Data::new()).expect("relay ok");
    relay(&presence, "R1", SignalKind::Leave, &from, &Data::new()).expect("relay ok");

    for member in &mut members[1..] {
        let ready = member.rx.try_recv().expect("ready delivered");
        assert_eq!(ready.event, "video-user-ready");
        assert_eq!(ready.data["connectionId"], json!(from.connection_id));
        assert_eq!(ready.data["displayName"], "User 0");

        let left = member.rx.try_recv().expect("leave delivered");
        assert_eq!(left.event, "video-user-left");
        assert_eq!(left.data["connectionId"], json!(from.connection_id));
    }
    assert!(members[0].rx.try_recv().is_err());
}

#[test]
fn per_sender_order_is_preserved() {
    let (presence, mut members) = room_of(2);
    let from = members[0].participant.clone();
    let target = members[1].participant.connection_id;

    relay(&presence, "R1", SignalKind::Offer, &from, &offer_payload(target)).expect("relay ok");
    for i in 0..3 {
        let mut payload = Data::new();
        payload.insert(TARGET_KEY.into(), json!(target));
        payload.insert("candidate".into(), json!(i));
        relay(&presence, "R1", SignalKind::Candidate, &from, &payload).expect("relay ok");
    }

    assert_eq!(members[1].rx.try_recv().expect("offer").event, "video-offer");
    for i in 0..3 {
        let got = members[1].rx.try_recv().expect("candidate");
        assert_eq!(got.data["candidate"], i);
    }
}
