use sqlx::{Postgres, Transaction};

pub mod m000001;
pub mod m000002;

pub struct PgqMigration {
    name: &'static str,
    is_breaking: bool,
    pub(crate) stmts: &'static [&'static str],
}

impl PgqMigration {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_breaking(&self) -> bool {
        self.is_breaking
    }

    /// Migration number parsed from its name (`m000002` is migration 2).
    pub fn migration_number(&self) -> u32 {
        self.name
            .trim_start_matches('m')
            .parse()
            .unwrap_or_default()
    }

    pub async fn execute(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        escaped_schema: &str,
    ) -> Result<(), sqlx::Error> {
        for stmt in self.stmts {
            let stmt = stmt.replace(":PGQ_SCHEMA", escaped_schema);
            sqlx::query(&stmt).execute(tx.as_mut()).await?;
        }

        Ok(())
    }
}

pub const PGQ_MIGRATIONS: &[PgqMigration] = &[m000001::M000001_MIGRATION, m000002::M000002_MIGRATION];
