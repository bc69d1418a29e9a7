//! Decoupled logging pipeline.
//!
//! ```text
//! log::info!() / log_parsed!() / shell output
//!     |
//! [LogCollector] (Log impl, never blocks)
//!     | crossbeam unbounded channel
//!     v
//! [persister thread] ---> <log_dir>/rootmod_<ts>.log   (every line)
//!     |
//!     +---> optional tokio sink (target "parsed" lines only, try_send)
//! ```
//!
//! The persister is an OS thread, so logging works from any runtime or none.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A log line with metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
    /// High-level milestone rather than detail.
    pub parsed: bool,
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: Level, message: String) -> Self {
        LogLine {
            level,
            message,
            parsed: false,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(mut self) -> Self {
        self.parsed = true;
        self
    }

    fn format(&self) -> String {
        format!("[{}] [{}] {}\n", self.timestamp, self.level, self.message)
    }
}

enum LogMessage {
    Line(LogLine),
    Flush(crossbeam_channel::Sender<()>),
}

#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_path: PathBuf,
    level: LevelFilter,
}

impl LogCollector {
    /// Create the log file under `log_dir` and start the persister thread.
    pub fn new(
        log_dir: &Path,
        level: LevelFilter,
        ui_tx: Option<tokio::sync::mpsc::Sender<LogLine>>,
    ) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(format!(
            "rootmod_{}.log",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let mut file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let (tx, rx) = unbounded::<LogMessage>();

        std::thread::Builder::new()
            .name("rootmod-log".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => {
                            let _ = file.write_all(line.format().as_bytes());
                            if line.parsed {
                                if let Some(ui_tx) = &ui_tx {
                                    let _ = ui_tx.try_send(line);
                                }
                            }
                        }
                        LogMessage::Flush(ack) => {
                            let _ = file.flush();
                            let _ = file.sync_data();
                            let _ = ack.send(());
                        }
                    }
                }
            })?;

        Ok(LogCollector {
            tx,
            log_path,
            level,
        })
    }

    /// Register a clone as the global `log` backend.
    pub fn init_global_logger(&self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(self.level);
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Block until every line sent so far is on disk.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(LogMessage::Flush(ack_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        ack_rx
            .recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = LogLine::new(record.level(), record.args().to_string());
        if record.target() == "parsed" {
            self.log_line(line.parsed());
        } else {
            self.log_line(line);
        }
    }

    fn flush(&self) {
        let _ = self.wait_for_empty();
    }
}
