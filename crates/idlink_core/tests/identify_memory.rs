use idlink_core::{
    Contact, ContactRepository, IdentifyResponse, IdentityService, InMemoryContactRepository,
    LinkPrecedence,
};

fn primary(id: i64, email: Option<&str>, phone: Option<&str>, created_at: i64) -> Contact {
    Contact {
        id,
        email: email.map(str::to_string),
        phone_number: phone.map(str::to_string),
        linked_id: None,
        link_precedence: LinkPrecedence::Primary,
        created_at,
        updated_at: created_at,
        deleted_at: None,
    }
}

fn secondary(
    id: i64,
    email: Option<&str>,
    phone: Option<&str>,
    linked_id: i64,
    created_at: i64,
) -> Contact {
    Contact {
        linked_id: Some(linked_id),
        link_precedence: LinkPrecedence::Secondary,
        ..primary(id, email, phone, created_at)
    }
}

fn seeded() -> IdentityService<InMemoryContactRepository> {
    let repo = InMemoryContactRepository::new();
    repo.seed(primary(1, Some("a@x.com"), Some("111"), 1_000))
        .unwrap();
    repo.seed(primary(2, Some("b@x.com"), None, 2_000)).unwrap();
    repo.seed(secondary(3, Some("b@x.com"), Some("333"), 2, 2_500))
        .unwrap();
    IdentityService::new(repo)
}

#[test]
fn known_primary_gains_a_secondary() {
    let service = seeded();

    let response = service.identify(Some("a@x.com"), Some("222")).unwrap();
    assert_eq!(
        response,
        IdentifyResponse {
            primary_contact_id: 1,
            emails: vec!["a@x.com".to_string()],
            phone_numbers: vec!["111".to_string(), "222".to_string()],
            secondary_contact_ids: vec![4],
        }
    );
}

#[test]
fn merging_chains_reparents_every_dependent() {
    let service = seeded();

    let response = service.identify(Some("a@x.com"), Some("333")).unwrap();
    assert_eq!(response.primary_contact_id, 1);
    assert_eq!(response.emails, vec!["a@x.com", "b@x.com"]);
    assert_eq!(response.phone_numbers, vec!["111", "333"]);
    assert_eq!(response.secondary_contact_ids, vec![2, 3]);

    let contacts = service.repository().snapshot().unwrap();
    let primaries: Vec<i64> = contacts
        .iter()
        .filter(|contact| contact.is_primary())
        .map(|contact| contact.id)
        .collect();
    assert_eq!(primaries, vec![1]);
    assert!(contacts
        .iter()
        .filter(|contact| !contact.is_primary())
        .all(|contact| contact.linked_id == Some(1)));
}

#[test]
fn same_sequence_gives_same_responses() {
    let sequence = [
        (Some("c@x.com"), None),
        (None, Some("111")),
        (Some("c@x.com"), Some("333")),
        (Some("d@x.com"), Some("444")),
        (Some("d@x.com"), Some("111")),
    ];

    let run = || -> Vec<IdentifyResponse> {
        let service = seeded();
        sequence
            .iter()
            .map(|(email, phone)| service.identify(*email, *phone).unwrap())
            .collect()
    };

    assert_eq!(run(), run());
}

#[test]
fn equal_timestamps_break_ties_by_id() {
    let repo = InMemoryContactRepository::new();
    repo.seed(primary(8, Some("a@x.com"), None, 500)).unwrap();
    repo.seed(primary(5, None, Some("222"), 500)).unwrap();
    let service = IdentityService::new(repo);

    let response = service.identify(Some("a@x.com"), Some("222")).unwrap();
    assert_eq!(response.primary_contact_id, 5);
    assert_eq!(response.emails, vec!["a@x.com"]);
    assert_eq!(response.secondary_contact_ids, vec![8]);
    assert_eq!(
        service.repository().get_contact(8).unwrap().unwrap().linked_id,
        Some(5)
    );
}
