use mkt_testkit::Harness;
use uuid::Uuid;

#[tokio::test]
async fn inbox_lists_exactly_member_conversations_newest_first() {
    let h = Harness::new();
    let memberships: [&[&str]; 6] = [
        &["A", "B"],
        &["B", "C"],
        &["A", "C", "D"],
        &["D", "A"],
        &["C", "D"],
        &["B", "A", "C"],
    ];

    let mut created: Vec<(Uuid, &[&str])> = Vec::new();
    for members in memberships {
        let id = h.conversation(members[0], members).await.unwrap();
        created.push((id, members));
    }

    for user in ["A", "B", "C", "D", "E"] {
        let expected: Vec<Uuid> = created
            .iter()
            .rev()
            .filter(|(_, m)| m.contains(&user))
            .map(|(id, _)| *id)
            .collect();
        let got: Vec<Uuid> = h
            .conversations
            .list_conversations(user, None, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.record.id)
            .collect();
        assert_eq!(got, expected, "inbox of {user}");
    }
}
