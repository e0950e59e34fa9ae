//! Redb table definitions for persistent path metadata.

use redb::TableDefinition;

// Key: StorePath::key(), Value: bincode-encoded FileInfo
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
