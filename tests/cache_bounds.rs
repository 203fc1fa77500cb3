//! Bounded entity cache behavior under sustained churn, at a scale reduced
//! from a full production workload for test runtime.

use entitydb::{EntityDb, EntityDbConfig, Tag, Timestamp};
use tempfile::tempdir;

#[test]
fn cache_hit_rate_stays_high_under_a_skewed_access_pattern() {
    let dir = tempdir().unwrap();
    let config = EntityDbConfig::builder(dir.path().join("db.edb"))
        .entity_cache_entries(100)
        .entity_cache_bytes(1 << 20)
        .build()
        .unwrap();
    let mut db = EntityDb::open(config).unwrap();
    let repo = db.repository();

    let ids: Vec<_> = (0..1000)
        .map(|_| repo.create(None, vec![Tag::parse("type:doc").unwrap()], Vec::new(), Timestamp::now()).unwrap().id().clone())
        .collect();

    // Zipfian-ish skew: the first 50 ids (of the 100 that fit the cache) get
    // the overwhelming majority of reads.
    let hot = &ids[..50];
    for _ in 0..20 {
        for id in hot {
            repo.get_by_id(id, &entitydb::GetOptions::default()).unwrap();
        }
    }

    let stats = repo.cache_stats();
    let total = stats.hits + stats.misses;
    assert!(total > 0);
    let hit_rate = stats.hits as f64 / total as f64;
    assert!(hit_rate > 0.8, "expected a high hit rate over the hot set, got {hit_rate}");

    db.shutdown();
}

#[test]
fn the_cache_never_holds_more_entries_than_its_configured_cap() {
    let dir = tempdir().unwrap();
    let config = EntityDbConfig::builder(dir.path().join("db.edb"))
        .entity_cache_entries(20)
        .entity_cache_bytes(1 << 20)
        .build()
        .unwrap();
    let mut db = EntityDb::open(config).unwrap();
    let repo = db.repository();

    for _ in 0..500 {
        let created = repo.create(None, vec![Tag::parse("type:doc").unwrap()], Vec::new(), Timestamp::now()).unwrap();
        repo.get_by_id(created.id(), &entitydb::GetOptions::default()).unwrap();
    }

    let stats = repo.cache_stats();
    assert!(stats.evictions > 0, "inserting far more entities than the cache cap should force evictions");

    db.shutdown();
}
