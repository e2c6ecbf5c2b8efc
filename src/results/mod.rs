//! Result pipeline: the queue, its consumer, and the statistics it keeps

mod command;
mod processor;
mod queue;
mod record;
mod recorder;

pub use command::CommandResultRecorder;
pub use processor::ResultProcessor;
pub use queue::{ResultQueue, ResultReceiver};
pub use record::{create_warning, CommandResult, ResultRecord, TransferTarget, TransferType};
pub use recorder::ResultRecorder;
