use indoc::indoc;

use super::PgqMigration;

pub const M000002_MIGRATION: PgqMigration = PgqMigration {
    name: "m000002",
    is_breaking: false,
    stmts: &[
        indoc! {r#"
            alter table :PGQ_SCHEMA.jobs
                add column heartbeat_at timestamptz,
                add column heartbeat_by text;
        "#},
        indoc! {r#"
            create index jobs_locked_at_idx
                on :PGQ_SCHEMA.jobs (locked_at)
                where locked_at is not null;
        "#},
    ],
};
