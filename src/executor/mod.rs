//! Executor: binds entries to clients and submits them as transfers

mod handler;
mod info_builder;
mod submitter;

pub use handler::TransferHandler;
pub use info_builder::FileInfoBuilder;
pub use submitter::{Submission, SubmitterKind, TransferRequestSubmitter, MAX_UPLOAD_SIZE};
