use std::time::Duration;

// Script resources
pub const SCRIPT_EXTENSION: &str = "sql";
pub const NAMESPACE_SEPARATOR: char = '.';

// Ordinal prefixes keep lexicographic order equal to numeric order up to 99999 scripts
pub const ORDINAL_WIDTH: usize = 5;

// Snapshot naming
pub const SNAPSHOT_PREFIX: &str = "Snapshot-";
pub const SNAPSHOT_EXTENSION: &str = "snapshot";

// PostgreSQL identifiers are truncated past 63 bytes; leave room for the snapshot prefix
pub const MAX_IDENTIFIER_BYTES: usize = 63;
pub const MAX_DATABASE_NAME_BYTES: usize = MAX_IDENTIFIER_BYTES - SNAPSHOT_PREFIX.len();

// Connection setup
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

// Journal table used by the migration runner
pub const DEFAULT_JOURNAL_SCHEMA: &str = "public";
pub const DEFAULT_JOURNAL_TABLE: &str = "schema_versions";

// Configuration file name
pub const CONFIG_FILENAME: &str = "pgfixture.yaml";
