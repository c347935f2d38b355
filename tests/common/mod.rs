use quizhub::db::Db;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};

const TEST_DB_PREFIX: &str = "quizhub_test_";

/// Connection options for the server named by `TEST_DATABASE_URL`.
pub fn admin_options() -> Option<PgConnectOptions> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL is not set, skipping database test");
        return None;
    };
    Some(url.parse().expect("TEST_DATABASE_URL should be a postgres url"))
}

/// A fresh, migrated database per test, created on the server named by
/// `TEST_DATABASE_URL`. Returns `None` when the variable is unset so the
/// calling test can skip.
///
/// Databases left behind by earlier test processes are dropped first.
pub async fn create_test_db() -> Option<Db> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let admin = admin_options()?;
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let name = format!("{TEST_DB_PREFIX}{}_{}", std::process::id(), id);

    let mut conn = PgConnection::connect_with(&admin)
        .await
        .expect("failed to reach test database server");

    drop_stale_databases(&mut conn).await;

    let drop_sql = format!("DROP DATABASE IF EXISTS {name}");
    sqlx::raw_sql(&drop_sql).execute(&mut conn).await.unwrap();
    let create_sql = format!("CREATE DATABASE {name}");
    sqlx::raw_sql(&create_sql).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();

    let db = Db::new(admin.database(&name), 5)
        .await
        .expect("failed to create test database");
    Some(db)
}

/// Drop test databases that belong to other processes. Tests of this process
/// may be racing for the same names, so failures are only reported.
async fn drop_stale_databases(conn: &mut PgConnection) {
    let own = format!("{TEST_DB_PREFIX}{}_", std::process::id());
    let names: Vec<String> =
        sqlx::query_scalar("SELECT datname FROM pg_database WHERE starts_with(datname, $1)")
            .bind(TEST_DB_PREFIX)
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    for name in names.into_iter().filter(|name| !name.starts_with(&own)) {
        let sql = format!("DROP DATABASE IF EXISTS {name} WITH (FORCE)");
        if let Err(e) = sqlx::raw_sql(&sql).execute(&mut *conn).await {
            eprintln!("could not drop stale test database {name}: {e}");
        }
    }
}

#[allow(dead_code)]
pub async fn database_exists(name: &str) -> bool {
    let admin = admin_options().expect("TEST_DATABASE_URL should be set");
    let mut conn = PgConnection::connect_with(&admin).await.unwrap();
    let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(name)
        .fetch_one(&mut conn)
        .await
        .unwrap();
    conn.close().await.unwrap();
    exists
}

#[allow(dead_code)]
pub async fn table_count(db: &Db, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(db.pool())
        .await
        .unwrap()
}
