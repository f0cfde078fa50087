use locker_db::{open_database, open_memory};

#[test]
fn open_memory_creates_schema() {
    let conn = open_memory().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='items'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn open_database_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");

    {
        let conn = open_database(&path).unwrap();
        conn.execute_batch(
            "INSERT INTO qualities (id, name) VALUES ('q-rare', 'Rare')",
        )
        .unwrap();
    }

    // Re-opening an existing database must not recreate or wipe tables.
    let conn = open_database(&path).unwrap();
    let name: String = conn
        .query_row("SELECT name FROM qualities WHERE id = 'q-rare'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(name, "Rare");
}
