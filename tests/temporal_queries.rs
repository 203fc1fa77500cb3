//! As-of queries and diffs over a tag log that only ever grows.

use entitydb::{EntityDb, EntityDbConfig, Tag, Timestamp};
use tempfile::tempdir;

#[test]
fn get_as_of_reconstructs_latest_wins_snapshot_per_namespace() {
    let dir = tempdir().unwrap();
    let config = EntityDbConfig::builder(dir.path().join("db.edb")).build().unwrap();
    let mut db = EntityDb::open(config).unwrap();
    let repo = db.repository();

    let entity = repo
        .create(
            None,
            vec![Tag::parse("type:doc").unwrap(), Tag::parse("status:draft").unwrap()],
            Vec::new(),
            Timestamp::from_nanos(1000),
        )
        .unwrap();

    repo.update(entity.id(), vec![Tag::parse("status:review").unwrap()], None, Timestamp::from_nanos(2000))
        .unwrap();
    repo.update(entity.id(), vec![Tag::parse("status:published").unwrap()], None, Timestamp::from_nanos(3000))
        .unwrap();

    let at_1500 = repo.get_as_of(entity.id(), Timestamp::from_nanos(1500)).unwrap();
    assert_eq!(at_1500.get("status").unwrap(), "draft");

    let at_2500 = repo.get_as_of(entity.id(), Timestamp::from_nanos(2500)).unwrap();
    assert_eq!(at_2500.get("status").unwrap(), "review");

    let at_3500 = repo.get_as_of(entity.id(), Timestamp::from_nanos(3500)).unwrap();
    assert_eq!(at_3500.get("status").unwrap(), "published");

    let diff = repo.get_diff(entity.id(), Timestamp::from_nanos(1500), Timestamp::from_nanos(3500)).unwrap();
    assert!(diff.removed_tags.iter().any(|t| t.as_str() == "status:draft"));
    assert!(diff.removed_tags.iter().any(|t| t.as_str() == "status:review"));
    assert!(diff.added_tags.iter().any(|t| t.as_str() == "status:published"));

    db.shutdown();
}

#[test]
fn get_as_of_before_creation_is_not_found() {
    let dir = tempdir().unwrap();
    let config = EntityDbConfig::builder(dir.path().join("db.edb")).build().unwrap();
    let mut db = EntityDb::open(config).unwrap();
    let repo = db.repository();

    let entity = repo
        .create(None, vec![Tag::parse("type:doc").unwrap()], Vec::new(), Timestamp::from_nanos(1000))
        .unwrap();

    let result = repo.get_as_of(entity.id(), Timestamp::from_nanos(1));
    assert!(result.is_err());

    db.shutdown();
}

#[test]
fn get_history_orders_events_by_timestamp() {
    let dir = tempdir().unwrap();
    let config = EntityDbConfig::builder(dir.path().join("db.edb")).build().unwrap();
    let mut db = EntityDb::open(config).unwrap();
    let repo = db.repository();

    let entity = repo
        .create(None, vec![Tag::parse("status:draft").unwrap()], Vec::new(), Timestamp::from_nanos(100))
        .unwrap();
    repo.update(entity.id(), vec![Tag::parse("status:published").unwrap()], None, Timestamp::from_nanos(200))
        .unwrap();

    let history = repo.get_history(entity.id(), Timestamp::from_nanos(0), Timestamp::from_nanos(1000)).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].timestamp < history[1].timestamp);

    db.shutdown();
}
