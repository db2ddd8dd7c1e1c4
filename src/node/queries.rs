//! SQL issued against cluster members
//!
//! Every output column is text; see `connection::Row`.

pub const PING: &str = "SELECT '1'::text AS ok";

pub const IS_IN_RECOVERY: &str = "SELECT pg_is_in_recovery()::text AS in_recovery";

pub const REPLICA_POSITIONS: &str = "SELECT pg_last_wal_receive_lsn()::text AS receive_lsn, \
     pg_last_wal_replay_lsn()::text AS replay_lsn, \
     extract(epoch FROM pg_last_xact_replay_timestamp())::text AS replay_ts";

pub const PRIMARY_POSITION: &str = "SELECT extract(epoch FROM now())::text AS now_ts, \
     pg_current_wal_lsn()::text AS current_lsn";

pub const SETTING: &str = "SELECT current_setting($1) AS value";

pub const CONNECTION_COUNT: &str = "SELECT count(*)::text AS connections FROM pg_stat_activity";

pub const BUFFER_CACHE: &str = "SELECT \
     count(*) FILTER (WHERE relfilenode IS NULL)::text AS free, \
     count(*) FILTER (WHERE relfilenode IS NOT NULL)::text AS used \
     FROM pg_buffercache";

pub const START_TIME: &str =
    "SELECT to_char(pg_postmaster_start_time(), 'YYYY-MM-DD\"T\"HH24:MI:SSOF') AS start_time";

pub const CREATE_HEARTBEAT_TABLE: &str = "CREATE TABLE IF NOT EXISTS cluster_logger_heartbeat (\
     node_name text PRIMARY KEY, \
     beat_at timestamptz NOT NULL DEFAULT now())";

pub const UPSERT_HEARTBEAT: &str = "INSERT INTO cluster_logger_heartbeat (node_name, beat_at) \
     VALUES ($1, now()) \
     ON CONFLICT (node_name) DO UPDATE SET beat_at = excluded.beat_at";

pub const MEMBERSHIP: &str = "SELECT node_id::text AS node_id, node_name, conninfo \
     FROM repmgr.nodes WHERE active ORDER BY node_id";
