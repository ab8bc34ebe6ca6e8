use indoc::indoc;

use super::PgqMigration;

pub const M000001_MIGRATION: PgqMigration = PgqMigration {
    name: "m000001",
    is_breaking: false,
    stmts: &[
        indoc! {r#"
            create table :PGQ_SCHEMA.jobs (
                id bigserial primary key,
                q_name text not null check (length(q_name) between 1 and 63),
                method text not null check (length(method) > 0),
                args jsonb not null default '[]'::jsonb,
                locked_at timestamptz,
                locked_by text,
                created_at timestamptz not null default now()
            );
        "#},
        indoc! {r#"
            create index jobs_q_name_id_unlocked_idx
                on :PGQ_SCHEMA.jobs (q_name, id)
                where locked_at is null;
        "#},
        indoc! {r#"
            create function :PGQ_SCHEMA.notify_job_inserted() returns trigger as $$
            begin
                perform pg_notify(new.q_name, '');
                return null;
            end;
            $$ language plpgsql;
        "#},
        indoc! {r#"
            create trigger notify_job_inserted
                after insert on :PGQ_SCHEMA.jobs
                for each row
                execute procedure :PGQ_SCHEMA.notify_job_inserted();
        "#},
    ],
};
