//! Terminal output

mod output;
mod printer;

pub use output::{CapturedOutput, SharedOutput};
pub use printer::{dry_run_line, progress_statement, PrinterMode, ResultPrinter};
