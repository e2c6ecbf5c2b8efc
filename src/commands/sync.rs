//! Command orchestration
//!
//! [`ActionArchitecture`] turns validated [`Parameters`] into a lazy
//! pipeline and runs it:
//!
//! ```text
//! Setup -> FileGenerator -> [Filter] -> [Comparator] -> FileInfoBuilder -> TransferHandler
//! ```
//!
//! `sync` adds the comparator and a second, reverse generator listing the
//! destination. Streams skip discovery: one synthesized entry goes straight
//! to the transfer handler.

use crate::config::Parameters;
use crate::diff::{Comparator, SyncStrategies};
use crate::executor::{FileInfoBuilder, TransferHandler, TransferRequestSubmitter};
use crate::filter::Filter;
use crate::paths::{find_dest_path_comp_key, FormattedPaths, PathFormatter};
use crate::results::{CommandResult, CommandResultRecorder, ResultQueue};
use crate::scanner::{FileGenerator, StatsStream};
use crate::store::ObjectStore;
use crate::transfer::TransferManager;
use crate::types::{FileInfo, FileStats, SyncError};
use crate::ui::{PrinterMode, ResultPrinter, SharedOutput};
use std::fmt;
use std::iter;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Lazy stream of entries ready for submission.
pub type InfoStream = Box<dyn Iterator<Item = Result<FileInfo, SyncError>>>;

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    FileGenerator,
    Filter,
    Comparator,
    FileInfoBuilder,
    TransferHandler,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::FileGenerator => "file_generator",
            Stage::Filter => "filter",
            Stage::Comparator => "comparator",
            Stage::FileInfoBuilder => "file_info_builder",
            Stage::TransferHandler => "transfer_handler",
        };
        f.write_str(name)
    }
}

/// What flows between stages.
enum Flow {
    Start,
    Paths(FormattedPaths),
    Listings {
        forward: StatsStream,
        reverse: Option<StatsStream>,
    },
    Stats(StatsStream),
    Infos(InfoStream),
}

impl Flow {
    fn name(&self) -> &'static str {
        match self {
            Flow::Start => "nothing",
            Flow::Paths(_) => "paths",
            Flow::Listings { .. } => "listings",
            Flow::Stats(_) => "entries",
            Flow::Infos(_) => "file infos",
        }
    }
}

/// Runs one command end to end.
pub struct ActionArchitecture {
    client: Arc<dyn ObjectStore>,
    source_client: Arc<dyn ObjectStore>,
    transfer_manager: Arc<dyn TransferManager>,
    params: Arc<Parameters>,
    cancelled: Arc<AtomicBool>,
    out: SharedOutput,
    err: SharedOutput,
}

impl ActionArchitecture {
    /// # Arguments
    /// * `params` - Validated command parameters
    /// * `client` - Store written to (and the only store for `rm`)
    /// * `transfer_manager` - Runs the transfers
    pub fn new(
        params: Parameters,
        client: Arc<dyn ObjectStore>,
        transfer_manager: Arc<dyn TransferManager>,
    ) -> Self {
        Self {
            source_client: Arc::clone(&client),
            client,
            transfer_manager,
            params: Arc::new(params),
            cancelled: Arc::new(AtomicBool::new(false)),
            out: SharedOutput::stdout(),
            err: SharedOutput::stderr(),
        }
    }

    /// Read sources through a different store than the one written to.
    pub fn with_source_client(mut self, source_client: Arc<dyn ObjectStore>) -> Self {
        self.source_client = source_client;
        self
    }

    /// Redirect result lines and streamed downloads.
    pub fn with_output(mut self, out: SharedOutput, err: SharedOutput) -> Self {
        self.out = out;
        self.err = err;
        self
    }

    /// Share the flag that is set on ctrl-c.
    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Stages this command runs, in order.
    pub fn stages(&self) -> Vec<Stage> {
        if self.params.is_stream {
            return vec![Stage::Setup, Stage::TransferHandler];
        }
        let mut stages = vec![Stage::Setup, Stage::FileGenerator];
        if !self.params.filters.is_empty() {
            stages.push(Stage::Filter);
        }
        if self.params.is_sync() {
            stages.push(Stage::Comparator);
        }
        stages.push(Stage::FileInfoBuilder);
        stages.push(Stage::TransferHandler);
        stages
    }

    /// Run the command and report what happened.
    ///
    /// Never fails: setup and listing errors are printed as `fatal error:`
    /// lines and counted as failed tasks.
    pub fn run(&self) -> CommandResult {
        let (queue, receiver) = ResultQueue::new();
        let printer = ResultPrinter::new(
            PrinterMode::from_parameters(&self.params),
            self.out.clone(),
            self.err.clone(),
        );
        let recorder = CommandResultRecorder::new(queue.clone(), receiver, Some(printer));
        let submitters = TransferRequestSubmitter::all(
            Arc::clone(&self.transfer_manager),
            queue.clone(),
            Arc::clone(&self.params),
            self.out.clone(),
        );

        let infos: InfoStream = match self.build(&queue) {
            Ok(infos) => infos,
            Err(err) => Box::new(iter::once(Err(err))),
        };

        let handler = TransferHandler::new(
            Arc::clone(&self.transfer_manager),
            submitters,
            recorder,
            queue,
            Arc::clone(&self.cancelled),
        );
        let result = handler.call(infos);
        tracing::debug!(
            failed = result.num_tasks_failed,
            warned = result.num_tasks_warned,
            "command finished"
        );
        result
    }

    /// Chain every stage up to the transfer handler.
    fn build(&self, queue: &ResultQueue) -> Result<InfoStream, SyncError> {
        let mut flow = Flow::Start;
        for stage in self.stages() {
            if stage == Stage::TransferHandler {
                break;
            }
            tracing::debug!(%stage, "building stage");
            flow = self.apply(stage, flow, queue)?;
        }
        match flow {
            Flow::Infos(infos) => Ok(infos),
            other => Err(misplaced(Stage::TransferHandler, &other)),
        }
    }

    fn apply(&self, stage: Stage, flow: Flow, queue: &ResultQueue) -> Result<Flow, SyncError> {
        let params = &self.params;
        match (stage, flow) {
            (Stage::Setup, Flow::Start) => {
                let files = PathFormatter::format(&params.src, &params.dest, params.dir_op)?;
                if params.is_stream {
                    let builder = self.info_builder(true);
                    let stats = stream_entry(&files, params);
                    Ok(Flow::Infos(Box::new(builder.call(iter::once(Ok(stats))))))
                } else {
                    Ok(Flow::Paths(files))
                }
            }
            (Stage::FileGenerator, Flow::Paths(files)) => {
                let forward = FileGenerator::new(
                    Arc::clone(&self.source_client),
                    Some(params.operation()),
                    params.follow_symlinks,
                    params.page_size,
                    Some(queue.clone()),
                )
                .call(&files);
                let reverse = params.is_sync().then(|| {
                    FileGenerator::new(
                        Arc::clone(&self.client),
                        None,
                        params.follow_symlinks,
                        params.page_size,
                        Some(queue.clone()),
                    )
                    .call(&files.reversed())
                });
                Ok(Flow::Listings { forward, reverse })
            }
            (Stage::Filter, Flow::Listings { forward, reverse }) => {
                let Some(filter) = Filter::from_parameters(params)? else {
                    return Ok(Flow::Listings { forward, reverse });
                };
                let reverse = reverse.map(|reverse| -> StatsStream { Box::new(filter.clone().apply(reverse)) });
                let forward: StatsStream = Box::new(filter.apply(forward));
                Ok(Flow::Listings { forward, reverse })
            }
            (Stage::Comparator, Flow::Listings { forward, reverse }) => {
                let reverse = reverse.unwrap_or_else(|| Box::new(iter::empty()));
                let comparator = Comparator::new(SyncStrategies::resolve(params));
                Ok(Flow::Stats(Box::new(comparator.call(forward, reverse))))
            }
            (Stage::FileInfoBuilder, Flow::Listings { forward, .. }) | (Stage::FileInfoBuilder, Flow::Stats(forward)) => {
                Ok(Flow::Infos(Box::new(self.info_builder(false).call(forward))))
            }
            (stage, flow) => Err(misplaced(stage, &flow)),
        }
    }

    fn info_builder(&self, is_stream: bool) -> FileInfoBuilder {
        FileInfoBuilder::new(
            Arc::clone(&self.client),
            Some(Arc::clone(&self.source_client)),
            Arc::clone(&self.params),
            is_stream,
        )
    }
}

/// The single entry of a streamed `cp`; size and time are unknown.
fn stream_entry(files: &FormattedPaths, params: &Parameters) -> FileStats {
    let (dest, compare_key) = find_dest_path_comp_key(files, &files.src.path);
    FileStats {
        src: files.src.path.clone(),
        dest,
        compare_key,
        src_type: files.src.kind,
        dest_type: files.dest.kind,
        size: None,
        last_update: None,
        operation: Some(params.operation()),
        remote_metadata: None,
    }
}

fn misplaced(stage: Stage, flow: &Flow) -> SyncError {
    SyncError::Config(format!("stage {} cannot consume {}", stage, flow.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Command, SyncOptions};
    use crate::filter::FilterPattern;
    use crate::store::{MemoryObjectStore, SeedObject};
    use crate::transfer::{PooledTransferManager, TransferConfig};
    use std::fs;
    use tempfile::TempDir;

    fn tm() -> Arc<dyn TransferManager> {
        Arc::new(PooledTransferManager::new(TransferConfig::default()).expect("create transfer manager"))
    }

    fn architecture(params: Parameters, store: &Arc<MemoryObjectStore>) -> ActionArchitecture {
        ActionArchitecture::new(params, store.clone(), tm()).with_output(SharedOutput::sink(), SharedOutput::sink())
    }

    fn sync_options() -> SyncOptions {
        SyncOptions {
            filters: vec![FilterPattern::exclude("*.tmp")],
            ..SyncOptions::default()
        }
    }

    #[test]
    fn test_stage_lists() {
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        let temp = TempDir::new().expect("create temp dir");
        let src = temp.path().display().to_string();

        let sync = Parameters::new(Command::Sync, &src, Some("s3://bucket/"), sync_options()).expect("valid sync");
        assert_eq!(
            architecture(sync, &store).stages(),
            vec![
                Stage::Setup,
                Stage::FileGenerator,
                Stage::Filter,
                Stage::Comparator,
                Stage::FileInfoBuilder,
                Stage::TransferHandler,
            ]
        );

        let cp = Parameters::new(Command::Cp, &src, Some("s3://bucket/"), SyncOptions {
            recursive: true,
            ..SyncOptions::default()
        })
        .expect("valid cp");
        assert_eq!(
            architecture(cp, &store).stages(),
            vec![Stage::Setup, Stage::FileGenerator, Stage::FileInfoBuilder, Stage::TransferHandler]
        );

        let stream = Parameters::new(Command::Cp, "s3://bucket/k", Some("-"), SyncOptions::default())
            .expect("valid stream");
        assert_eq!(architecture(stream, &store).stages(), vec![Stage::Setup, Stage::TransferHandler]);
    }

    #[test]
    fn test_sync_uploads_and_filters() {
        let temp = TempDir::new().expect("create temp dir");
        fs::write(temp.path().join("keep.txt"), b"keep").expect("write keep");
        fs::write(temp.path().join("skip.tmp"), b"skip").expect("write skip");
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        let src = temp.path().display().to_string();

        let params = Parameters::new(Command::Sync, &src, Some("s3://bucket/"), sync_options()).expect("valid sync");
        let result = architecture(params, &store).run();

        assert_eq!(result, CommandResult::default());
        assert_eq!(store.keys("bucket"), vec!["keep.txt"]);
    }

    #[test]
    fn test_sync_delete_removes_extra_objects() {
        let temp = TempDir::new().expect("create temp dir");
        fs::write(temp.path().join("a.txt"), b"a").expect("write a");
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        store.seed("bucket", "p/stale.txt", SeedObject::new(b"old".to_vec()));
        let src = temp.path().display().to_string();

        let params = Parameters::new(
            Command::Sync,
            &src,
            Some("s3://bucket/p/"),
            SyncOptions {
                delete: true,
                ..SyncOptions::default()
            },
        )
        .expect("valid sync");
        let result = architecture(params, &store).run();

        assert_eq!(result, CommandResult::default());
        assert_eq!(store.keys("bucket"), vec!["p/a.txt"]);
    }

    #[test]
    fn test_missing_key_is_fatal_error() {
        let temp = TempDir::new().expect("create temp dir");
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        let dest = temp.path().join("out.txt").display().to_string();
        let (err, captured) = SharedOutput::capture();

        let params = Parameters::new(Command::Cp, "s3://bucket/missing", Some(&dest), SyncOptions::default())
            .expect("valid cp");
        let result = ActionArchitecture::new(params, store.clone(), tm())
            .with_output(SharedOutput::sink(), err)
            .run();

        assert_eq!(result.num_tasks_failed, 1);
        assert!(captured
            .contents()
            .contains("fatal error: Key \"missing\" does not exist"));
    }

    #[test]
    fn test_stream_download_to_stdout() {
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        store.seed("bucket", "k", SeedObject::new(b"payload".to_vec()));
        let (out, captured) = SharedOutput::capture();

        let params = Parameters::new(Command::Cp, "s3://bucket/k", Some("-"), SyncOptions::default()).expect("valid stream");
        let result = ActionArchitecture::new(params, store.clone(), tm())
            .with_output(out, SharedOutput::sink())
            .run();

        assert_eq!(result, CommandResult::default());
        assert_eq!(captured.bytes(), b"payload".to_vec());
    }
}
