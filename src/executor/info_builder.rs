//! Binds comparator output to the clients and parameters of the command

use crate::config::Parameters;
use crate::store::ObjectStore;
use crate::types::{FileInfo, FileStats, Operation, SyncError};
use std::sync::Arc;

/// Turns [`FileStats`] into [`FileInfo`].
pub struct FileInfoBuilder {
    client: Arc<dyn ObjectStore>,
    source_client: Arc<dyn ObjectStore>,
    parameters: Arc<Parameters>,
    is_stream: bool,
}

impl FileInfoBuilder {
    /// `source_client` defaults to `client`.
    pub fn new(
        client: Arc<dyn ObjectStore>,
        source_client: Option<Arc<dyn ObjectStore>>,
        parameters: Arc<Parameters>,
        is_stream: bool,
    ) -> Self {
        let source_client = source_client.unwrap_or_else(|| Arc::clone(&client));
        Self {
            client,
            source_client,
            parameters,
            is_stream,
        }
    }

    /// Wrap one entry. A delete performed as part of a move targets the
    /// store the entry came from, so the two clients trade places.
    pub fn build(&self, stats: FileStats) -> FileInfo {
        let swap = stats.operation == Some(Operation::Delete) && self.parameters.is_move;
        let (client, source_client) = if swap {
            (Arc::clone(&self.source_client), Arc::clone(&self.client))
        } else {
            (Arc::clone(&self.client), Arc::clone(&self.source_client))
        };
        FileInfo {
            stats,
            client,
            source_client,
            is_stream: self.is_stream,
            parameters: Arc::clone(&self.parameters),
        }
    }

    pub fn call<I>(self, entries: I) -> impl Iterator<Item = Result<FileInfo, SyncError>>
    where
        I: Iterator<Item = Result<FileStats, SyncError>>,
    {
        entries.map(move |entry| entry.map(|stats| self.build(stats)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Command, SyncOptions};
    use crate::store::{MemoryObjectStore, SeedObject};
    use crate::types::PathKind;

    fn stats(operation: Operation) -> FileStats {
        FileStats {
            src: "bucket/k".to_string(),
            dest: "other/k".to_string(),
            compare_key: "k".to_string(),
            src_type: PathKind::Remote,
            dest_type: PathKind::Remote,
            size: Some(1),
            last_update: None,
            operation: Some(operation),
            remote_metadata: None,
        }
    }

    fn stores() -> (Arc<MemoryObjectStore>, Arc<MemoryObjectStore>) {
        let dest = MemoryObjectStore::new();
        dest.seed("marker", "dest", SeedObject::new(Vec::new()));
        let source = MemoryObjectStore::new();
        source.seed("marker", "source", SeedObject::new(Vec::new()));
        (Arc::new(dest), Arc::new(source))
    }

    fn is_dest_store(store: &Arc<dyn ObjectStore>) -> bool {
        store.head_object("marker", "dest").is_ok()
    }

    fn params(command: Command) -> Arc<Parameters> {
        Arc::new(
            Parameters::new(command, "s3://bucket/k", Some("s3://other/k"), SyncOptions::default())
                .expect("valid params"),
        )
    }

    #[test]
    fn test_clients_kept_in_order() {
        let (dest, source) = stores();
        let builder = FileInfoBuilder::new(dest, Some(source), params(Command::Cp), false);
        let info = builder.build(stats(Operation::Copy));
        assert!(is_dest_store(&info.client));
        assert!(!is_dest_store(&info.source_client));
    }

    #[test]
    fn test_move_delete_swaps_clients() {
        let (dest, source) = stores();
        let builder = FileInfoBuilder::new(dest, Some(source), params(Command::Mv), false);
        let info = builder.build(stats(Operation::Delete));
        assert!(!is_dest_store(&info.client));
        assert!(is_dest_store(&info.source_client));
    }

    #[test]
    fn test_source_client_defaults_to_client() {
        let (dest, _) = stores();
        let builder = FileInfoBuilder::new(dest, None, params(Command::Cp), true);
        let info = builder.build(stats(Operation::Copy));
        assert!(is_dest_store(&info.source_client));
        assert!(info.is_stream);
    }
}
