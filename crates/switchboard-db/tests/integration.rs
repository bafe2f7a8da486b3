use switchboard_db::{create_pool, run_migrations, PoolSettings};

#[test]
fn db_initialization_works() {
    let pool = create_pool(":memory:", PoolSettings::default()).expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    let applied = run_migrations(&conn).expect("failed to run migrations");
    assert_eq!(applied.len(), 4);

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
        .expect("failed to prepare table list query");
    let mut tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table list query")
        .map(|r| r.expect("failed to read table name"))
        .collect();
    tables.sort();

    assert_eq!(
        tables,
        vec![
            "_switchboard_migrations",
            "agent_usage",
            "cache_entries",
            "intents",
            "segments",
            "templates",
        ]
    );
}

#[test]
fn file_backed_pool_shares_state_across_connections() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let pool = create_pool(dir.path().join("switchboard.db"), PoolSettings::default())
        .expect("failed to create pool");

    {
        let conn = pool.get().expect("failed to get connection");
        run_migrations(&conn).expect("failed to run migrations");
        switchboard_db::repo::add_cost_saved(&conn, "agent-1", 0.25)
            .expect("failed to write usage");
    }

    let conn = pool.get().expect("failed to get second connection");
    let (saved, _) = switchboard_db::repo::get_usage(&conn, "agent-1").expect("failed to read");
    assert!((saved - 0.25).abs() < 1e-9);
}
