//! Result printing
//!
//! Completed transfers, failures, and warnings are printed as whole lines;
//! between them a single status line is redrawn in place with `\r`.

use super::output::SharedOutput;
use crate::config::Parameters;
use crate::results::{ResultRecord, ResultRecorder, TransferTarget};
use indicatif::HumanBytes;
use std::io;

const STILL_CALCULATING: &str = " (calculating...)";
const CTRL_C_MESSAGE: &str = "cancelled: ctrl-c received";

/// How much the printer shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterMode {
    /// Results plus a live progress line
    Normal,
    /// Results without the progress line
    NoProgress,
    /// Failures, warnings, and fatal errors only
    OnlyShowErrors,
    /// Nothing at all
    Quiet,
}

impl PrinterMode {
    /// Pick the mode implied by the command options.
    ///
    /// Streaming to stdout must not mix status lines into the data, so
    /// streams behave like `--only-show-errors`.
    pub fn from_parameters(params: &Parameters) -> Self {
        if params.quiet {
            PrinterMode::Quiet
        } else if params.only_show_errors || params.is_stream {
            PrinterMode::OnlyShowErrors
        } else if params.no_progress {
            PrinterMode::NoProgress
        } else {
            PrinterMode::Normal
        }
    }

    fn shows_progress(self) -> bool {
        self == PrinterMode::Normal
    }

    fn shows_success(self) -> bool {
        matches!(self, PrinterMode::Normal | PrinterMode::NoProgress)
    }
}

/// Formats result records for the terminal.
pub struct ResultPrinter {
    mode: PrinterMode,
    out: SharedOutput,
    err: SharedOutput,
    /// Width of the status line currently on screen (0 when none)
    progress_length: usize,
}

impl ResultPrinter {
    pub fn new(mode: PrinterMode, out: SharedOutput, err: SharedOutput) -> Self {
        Self {
            mode,
            out,
            err,
            progress_length: 0,
        }
    }

    pub fn mode(&self) -> PrinterMode {
        self.mode
    }

    /// Print whatever `record` calls for, given the statistics after it
    /// was recorded.
    pub fn print(&mut self, record: &ResultRecord, stats: &ResultRecorder) -> io::Result<()> {
        if self.mode == PrinterMode::Quiet {
            return Ok(());
        }

        match record {
            ResultRecord::Progress { .. } => self.print_progress(stats),
            ResultRecord::Success { target } => {
                if !self.mode.shows_success() {
                    return Ok(());
                }
                let line = format!("{}: {}", target.transfer_type, target.location());
                self.print_line_to_out(&line)?;
                self.redisplay_progress(stats)
            }
            ResultRecord::Failure { target, error } => {
                let line = format!(
                    "{} failed: {} {}",
                    target.transfer_type,
                    target.location(),
                    error
                );
                self.print_line_to_err(&line)?;
                self.redisplay_progress(stats)
            }
            ResultRecord::Warning { message } => {
                self.print_line_to_err(message)?;
                self.redisplay_progress(stats)
            }
            ResultRecord::Error { error } => {
                self.print_line_to_err(&format!("fatal error: {}", error))
            }
            ResultRecord::CtrlC { .. } => self.print_line_to_err(CTRL_C_MESSAGE),
            ResultRecord::DryRun { target } => {
                let line = dry_run_line(target);
                self.print_line_to_out(&line)
            }
            ResultRecord::FinalTotalSubmissions { .. } => self.clear_progress_if_done(stats),
            ResultRecord::Queued { .. } => Ok(()),
        }
    }

    fn print_progress(&mut self, stats: &ResultRecorder) -> io::Result<()> {
        if !self.mode.shows_progress() {
            return Ok(());
        }
        let statement = progress_statement(stats);
        let padded = pad(&statement, self.progress_length);
        self.progress_length = padded.chars().count();
        self.out.write_str(&format!("{}\r", padded))
    }

    fn redisplay_progress(&mut self, stats: &ResultRecorder) -> io::Result<()> {
        // The line just printed ended with '\n', nothing left to overwrite.
        self.progress_length = 0;
        if has_remaining_progress(stats) {
            self.print_progress(stats)?;
        }
        Ok(())
    }

    fn clear_progress_if_done(&mut self, stats: &ResultRecorder) -> io::Result<()> {
        if self.progress_length > 0 && !has_remaining_progress(stats) {
            let blank = pad("", self.progress_length);
            self.out.write_str(&format!("{}\r", blank))?;
        }
        Ok(())
    }

    fn print_line_to_out(&self, line: &str) -> io::Result<()> {
        self.out
            .write_str(&format!("{}\n", pad(line, self.progress_length)))
    }

    fn print_line_to_err(&self, line: &str) -> io::Result<()> {
        self.err
            .write_str(&format!("{}\n", pad(line, self.progress_length)))
    }
}

/// `(dryrun) type: location`
pub fn dry_run_line(target: &TransferTarget) -> String {
    format!("(dryrun) {}: {}", target.transfer_type, target.location())
}

/// Status line for the current statistics.
pub fn progress_statement(stats: &ResultRecorder) -> String {
    let remaining = estimated(stats, stats.remaining_files().to_string());
    let mut statement = if stats.expected_bytes_transferred > 0 {
        let completed = stats.bytes_transferred + stats.bytes_failed_to_transfer;
        format!(
            "Completed {}/{} ({}/s) with {} file(s) remaining",
            HumanBytes(completed),
            estimated(stats, HumanBytes(stats.expected_bytes_transferred).to_string()),
            HumanBytes(stats.bytes_transfer_speed as u64),
            remaining
        )
    } else {
        format!(
            "Completed {} file(s) with {} file(s) remaining",
            stats.files_transferred, remaining
        )
    };
    if !stats.expected_totals_are_final() {
        statement.push_str(STILL_CALCULATING);
    }
    statement
}

fn estimated(stats: &ResultRecorder, total: String) -> String {
    if stats.expected_totals_are_final() {
        total
    } else {
        format!("~{}", total)
    }
}

fn has_remaining_progress(stats: &ResultRecorder) -> bool {
    !stats.expected_totals_are_final() || stats.files_transferred != stats.expected_files_transferred
}

fn pad(text: &str, width: usize) -> String {
    format!("{:<width$}", text, width = width)
}
