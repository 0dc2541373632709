use std::sync::Arc;

use mkt_schemas::ServiceError;
use mkt_testkit::Harness;

#[tokio::test]
async fn n_messages_come_back_exactly_in_send_order() {
    let h = Harness::new();
    let cid = h.conversation("B", &["B", "V"]).await.unwrap();

    let sent: Vec<String> = (0..40).map(|n| format!("msg {n:02}")).collect();
    for (i, text) in sent.iter().enumerate() {
        let who = if i % 2 == 0 { "B" } else { "V" };
        h.messages.send_message(who, cid, text).await.unwrap();
    }

    let got: Vec<String> = h
        .messages
        .list_messages("V", cid)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.record.text)
        .collect();
    assert_eq!(got, sent);
}

/// Concurrent senders: every message is kept and all readers see one order.
#[tokio::test]
async fn concurrent_sends_are_all_kept_in_a_stable_order() {
    let h = Arc::new(Harness::new());
    let cid = h.conversation("B", &["B", "V", "C"]).await.unwrap();

    let mut tasks = Vec::new();
    for sender in ["B", "V", "C"] {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            for n in 0..10 {
                h.messages
                    .send_message(sender, cid, &format!("{sender}-{n}"))
                    .await
                    .unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    let as_b = h.messages.list_messages("B", cid).await.unwrap();
    let as_c = h.messages.list_messages("C", cid).await.unwrap();
    assert_eq!(as_b.len(), 30);
    let ids_b: Vec<_> = as_b.iter().map(|m| m.record.id).collect();
    let ids_c: Vec<_> = as_c.iter().map(|m| m.record.id).collect();
    assert_eq!(ids_b, ids_c);

    // Each sender's own messages stay in the order that sender sent them.
    for sender in ["B", "V", "C"] {
        let mine: Vec<String> = as_b
            .iter()
            .filter(|m| m.record.sender_id == sender)
            .map(|m| m.record.text.clone())
            .collect();
        let expected: Vec<String> = (0..10).map(|n| format!("{sender}-{n}")).collect();
        assert_eq!(mine, expected);
    }
    assert!(as_b
        .windows(2)
        .all(|w| (w[0].created_at, w[0].seq) < (w[1].created_at, w[1].seq)));
}

#[tokio::test]
async fn non_participants_are_always_forbidden() {
    let h = Harness::new();
    let cid = h.conversation("B", &["B", "V"]).await.unwrap();
    h.messages.send_message("B", cid, "hi").await.unwrap();

    for outsider in ["X", "b", "", "V "] {
        assert!(matches!(
            h.messages.send_message(outsider, cid, "let me in").await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            h.messages.list_messages(outsider, cid).await,
            Err(ServiceError::Forbidden(_))
        ));
    }
    assert_eq!(h.messages.list_messages("B", cid).await.unwrap().len(), 1);
}
