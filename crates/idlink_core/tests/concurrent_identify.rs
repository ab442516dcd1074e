use idlink_core::db::open_db;
use idlink_core::{IdentityService, SqliteContactRepository};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

const WORKERS: usize = 4;

#[test]
fn concurrent_first_observations_create_one_primary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.db");
    let setup = open_db(&path).unwrap();

    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let path: PathBuf = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
                barrier.wait();
                service.identify(Some("race@x.com"), Some("555")).unwrap()
            })
        })
        .collect();

    let responses: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let rows: i64 = setup
        .query_row("SELECT COUNT(*) FROM contacts;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
    assert!(responses.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn concurrent_bridging_observations_leave_one_primary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.db");
    let setup = open_db(&path).unwrap();
    {
        let service = IdentityService::new(SqliteContactRepository::try_new(&setup).unwrap());
        service.identify(Some("a@x.com"), None).unwrap();
        service.identify(None, Some("222")).unwrap();
        service.identify(Some("c@x.com"), None).unwrap();
    }

    let observations = [
        (Some("a@x.com"), Some("222")),
        (Some("c@x.com"), Some("222")),
        (Some("a@x.com"), Some("999")),
        (Some("c@x.com"), Some("999")),
    ];
    let barrier = Arc::new(Barrier::new(observations.len()));
    let handles: Vec<_> = observations
        .into_iter()
        .map(|(email, phone)| {
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = IdentityService::new(SqliteContactRepository::try_new(&conn).unwrap());
                barrier.wait();
                service.identify(email, phone).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let primaries: i64 = setup
        .query_row(
            "SELECT COUNT(*) FROM contacts WHERE link_precedence = 'primary';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(primaries, 1);

    let deep_links: i64 = setup
        .query_row(
            "SELECT COUNT(*)
             FROM contacts child
             INNER JOIN contacts parent ON parent.id = child.linked_id
             WHERE parent.link_precedence = 'secondary';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(deep_links, 0);
}
