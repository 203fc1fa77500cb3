//! Restart-time recovery: WAL replay after an unclean shutdown, and reindex
//! when no index section survived.

use entitydb::{EntityDb, EntityDbConfig, Tag, TagQuery, Timestamp};
use tempfile::tempdir;

#[test]
fn uncheckpointed_writes_survive_a_restart_via_wal_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.edb");

    let id = {
        let config = EntityDbConfig::builder(&path).build().unwrap();
        let mut db = EntityDb::open(config).unwrap();
        let repo = db.repository();
        let created = repo
            .create(None, vec![Tag::parse("type:doc").unwrap()], b"payload".to_vec(), Timestamp::now())
            .unwrap();
        db.shutdown();
        created.id().clone()
    };

    let config = EntityDbConfig::builder(&path).build().unwrap();
    let mut db = EntityDb::open(config).unwrap();
    let repo = db.repository();
    let view = repo
        .get_by_id(&id, &entitydb::GetOptions { include_content: true, ..Default::default() })
        .unwrap();
    assert_eq!(view.content, b"payload");

    db.shutdown();
}

#[test]
fn a_fresh_file_with_no_index_section_reindexes_once_and_serves_correct_queries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.edb");

    {
        let config = EntityDbConfig::builder(&path).build().unwrap();
        let mut db = EntityDb::open(config).unwrap();
        let repo = db.repository();
        repo.create(None, vec![Tag::parse("type:doc").unwrap()], Vec::new(), Timestamp::now()).unwrap();
        repo.create(None, vec![Tag::parse("type:image").unwrap()], Vec::new(), Timestamp::now()).unwrap();
        db.shutdown();
    }

    let config = EntityDbConfig::builder(&path).build().unwrap();
    let mut db = EntityDb::open(config).unwrap();
    let repo = db.repository();
    let docs = repo.list_by_tag(&TagQuery::Exact(Tag::parse("type:doc").unwrap()), false);
    assert_eq!(docs.len(), 1);

    db.shutdown();
}

#[test]
fn a_checkpointed_database_reopens_with_a_persisted_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.edb");

    {
        let config = EntityDbConfig::builder(&path).build().unwrap();
        let mut db = EntityDb::open(config).unwrap();
        let repo = db.repository();
        repo.create(None, vec![Tag::parse("type:doc").unwrap()], Vec::new(), Timestamp::now()).unwrap();
        repo.checkpoint();
        db.shutdown();
    }

    let config = EntityDbConfig::builder(&path).build().unwrap();
    let mut db = EntityDb::open(config).unwrap();
    let repo = db.repository();
    let docs = repo.list_by_tag(&TagQuery::Exact(Tag::parse("type:doc").unwrap()), false);
    assert_eq!(docs.len(), 1);

    db.shutdown();
}
