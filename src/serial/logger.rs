//! Duration-bounded NMEA sentence capture
//!
//! Reads lines from a GNSS receiver for a fixed wall-clock budget and writes
//! them to a plain-text log file:
//! - Lines starting with the `$` delimiter are written exactly as received
//! - Anything else on the wire is discarded
//! - Every failure is recorded to the error log and swallowed, so a run
//!   always completes its connect/read/disconnect sequence

use crate::serial::{PortConfig, SerialConnection};
use colored::Colorize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur during a logging run
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Serial error: {0}")]
    Connection(#[from] serialport::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A source of newline-terminated lines
///
/// `SerialConnection` is the production implementation; tests substitute a
/// scripted source.
pub trait SentenceSource {
    /// Read one line, including its terminator as received
    ///
    /// Returns `Ok(None)` when the read timed out with no data.
    fn read_sentence(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Flush any buffered state before the source is dropped
    fn shutdown(&mut self) -> io::Result<()>;
}

impl SentenceSource for SerialConnection {
    fn read_sentence(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.read_line()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Configuration for one logging run
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Port configuration
    pub port_config: PortConfig,
    /// Output file path
    pub output_path: PathBuf,
    /// Total logging duration
    pub duration: Duration,
    /// Echo logged sentences to the console
    pub echo_sentences: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            port_config: PortConfig::default(),
            output_path: PathBuf::from("gnss_log.txt"),
            duration: Duration::from_secs(5),
            echo_sentences: false,
        }
    }
}

/// Duration-bounded NMEA sentence logger
pub struct GnssLogger {
    config: LogConfig,
    connection: Option<Box<dyn SentenceSource>>,
    sentence_count: usize,
    discarded_count: usize,
}

impl GnssLogger {
    /// Create a new logger with the given configuration
    pub fn new(config: LogConfig) -> Self {
        Self {
            config,
            connection: None,
            sentence_count: 0,
            discarded_count: 0,
        }
    }

    /// Open the serial connection
    ///
    /// On failure the error is recorded and the handle stays unset; there is
    /// no retry.
    pub fn connect(&mut self) {
        match SerialConnection::open(self.config.port_config.clone()) {
            Ok(conn) => {
                println!(
                    "{} Connected to {} at {} baud",
                    "[OK]".green().bold(),
                    self.config.port_config.port_path.white().bold(),
                    self.config.port_config.baud_rate
                );
                self.connection = Some(Box::new(conn));
            }
            Err(e) => {
                let e = CaptureError::from(e);
                eprintln!("{} {}", "[ERROR]".red().bold(), e);
                log::error!("{}", e);
            }
        }
    }

    /// Read sentences for the configured duration and write them to the
    /// output file
    ///
    /// Returns immediately when no connection is open. File I/O failures
    /// abort the capture; decode failures discard the offending line and the
    /// loop keeps going until the deadline.
    pub fn read_for_duration(&mut self) {
        if self.connection.is_none() {
            eprintln!(
                "{} Serial connection is not available",
                "[ERROR]".red().bold()
            );
            return;
        }

        if let Err(e) = self.capture() {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            log::error!("{}", e);
        }
    }

    /// Close the serial connection if one is open
    ///
    /// Errors are recorded, never propagated.
    pub fn disconnect(&mut self) {
        if let Some(mut source) = self.connection.take() {
            if let Err(e) = source.shutdown() {
                log::error!("Serial error: failed to close connection: {}", e);
            }
            println!("{} Serial connection closed", "[OK]".green().bold());
        }
    }

    /// Execute a full logging run: connect, capture, disconnect
    ///
    /// Each step runs regardless of the outcome of the previous one.
    pub fn run(&mut self) {
        self.connect();
        self.read_for_duration();
        self.disconnect();
    }

    /// Print summary statistics for the run
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60).dimmed());
        println!("{}", "--- Logging Summary ---".cyan().bold());
        println!("Sentences logged: {}", self.sentence_count);
        println!("Lines discarded: {}", self.discarded_count);
        println!("Output file: {}", self.config.output_path.display());
        println!("{}", "=".repeat(60).dimmed());
    }

    /// Main capture loop
    ///
    /// The elapsed-time baseline is the start of the loop, so the loop exits
    /// within one read-iteration of the deadline whether or not any sentence
    /// arrived. One in-flight line whose read straddles the deadline may
    /// still be written.
    fn capture(&mut self) -> Result<(), CaptureError> {
        if let Some(parent) = self.config.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&self.config.output_path)?;
        let mut writer = BufWriter::new(file);

        println!(
            "{} Logging to {} for {} seconds",
            "[LOG]".cyan().bold(),
            self.config.output_path.display().to_string().white(),
            self.config.duration.as_secs()
        );

        let deadline = Instant::now() + self.config.duration;

        while Instant::now() < deadline {
            let read = match self.connection.as_mut() {
                Some(source) => source.read_sentence(),
                None => break,
            };

            match read {
                Ok(Some(raw)) => self.write_sentence(raw, &mut writer)?,
                Ok(None) => continue,
                Err(e) => {
                    log::error!("Serial error: {}", e);
                    break;
                }
            }
        }

        writer.flush()?;
        Ok(())
    }

    /// Decode one raw line and write it through the `$` filter
    fn write_sentence(
        &mut self,
        raw: Vec<u8>,
        writer: &mut BufWriter<File>,
    ) -> Result<(), CaptureError> {
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                log::error!("Decode error: {}", e);
                self.discarded_count += 1;
                return Ok(());
            }
        };

        if line.starts_with('$') {
            writer.write_all(line.as_bytes())?;
            writer.flush()?;
            self.sentence_count += 1;
            if self.config.echo_sentences {
                println!("{}", line.trim_end());
            }
        } else {
            self.discarded_count += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    const GGA: &str = "$GNGGA,123519.00,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
    const RMC: &str = "$GNRMC,123519.00,A,4807.038,N,01131.000,E,0.004,77.52,091202,,,A*57\r\n";

    /// Yields its scripted lines, then times out on every later read
    struct ScriptedSource {
        lines: VecDeque<Vec<u8>>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(lines: &[&[u8]]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_vec()).collect(),
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl SentenceSource for ScriptedSource {
        fn read_sentence(&mut self) -> io::Result<Option<Vec<u8>>> {
            match self.lines.pop_front() {
                Some(line) => Ok(Some(line)),
                None => {
                    // Pace empty reads like a live port timing out
                    std::thread::sleep(Duration::from_millis(5));
                    Ok(None)
                }
            }
        }

        fn shutdown(&mut self) -> io::Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Yields the same sentence on every read, paced like a live receiver
    struct RepeatingSource {
        line: Vec<u8>,
        interval: Duration,
    }

    impl SentenceSource for RepeatingSource {
        fn read_sentence(&mut self) -> io::Result<Option<Vec<u8>>> {
            std::thread::sleep(self.interval);
            Ok(Some(self.line.clone()))
        }

        fn shutdown(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn test_config(dir: &Path, duration: Duration) -> LogConfig {
        LogConfig {
            output_path: dir.join("out.txt"),
            duration,
            ..Default::default()
        }
    }

    #[test]
    fn writes_only_sentences_with_delimiter() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), Duration::from_millis(200));
        let mut logger = GnssLogger::new(config);
        logger.connection = Some(Box::new(ScriptedSource::new(&[
            GGA.as_bytes(),
            b"garbage line\r\n".as_slice(),
            RMC.as_bytes(),
        ])));

        logger.read_for_duration();
        logger.disconnect();

        let contents = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(contents, format!("{}{}", GGA, RMC));
        assert!(contents.lines().all(|l| l.starts_with('$')));
        assert_eq!(logger.sentence_count, 2);
        assert_eq!(logger.discarded_count, 1);
    }

    #[test]
    fn run_completes_when_port_cannot_be_opened() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path(), Duration::from_millis(100));
        config.port_config = PortConfig::new("/definitely/not/a/port");
        let mut logger = GnssLogger::new(config);

        logger.run();

        assert!(!dir.path().join("out.txt").exists());
        assert_eq!(logger.sentence_count, 0);
    }

    #[test]
    fn read_is_a_no_op_without_a_connection() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), Duration::from_millis(100));
        let mut logger = GnssLogger::new(config);

        logger.read_for_duration();

        assert!(!dir.path().join("out.txt").exists());
    }

    #[test]
    fn zero_duration_writes_nothing() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), Duration::ZERO);
        let mut logger = GnssLogger::new(config);
        logger.connection = Some(Box::new(ScriptedSource::new(&[GGA.as_bytes()])));

        logger.read_for_duration();

        let contents = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn terminates_shortly_after_duration_elapses() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), Duration::from_millis(50));
        let mut logger = GnssLogger::new(config);
        logger.connection = Some(Box::new(RepeatingSource {
            line: GGA.as_bytes().to_vec(),
            interval: Duration::from_millis(5),
        }));

        let started = Instant::now();
        logger.read_for_duration();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(logger.sentence_count > 0);
    }

    #[test]
    fn disconnects_exactly_once_per_run() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path(), Duration::from_millis(50));
        config.port_config = PortConfig::new("/definitely/not/a/port");
        let mut logger = GnssLogger::new(config);

        let source = ScriptedSource::new(&[GGA.as_bytes()]);
        let shutdowns = Arc::clone(&source.shutdowns);
        logger.connection = Some(Box::new(source));

        logger.run();
        logger.disconnect();

        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(logger.sentence_count, 1);
    }

    #[test]
    fn creates_missing_parent_directory() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path(), Duration::from_millis(100));
        config.output_path = dir.path().join("logs").join("run.txt");
        let mut logger = GnssLogger::new(config);
        logger.connection = Some(Box::new(ScriptedSource::new(&[GGA.as_bytes()])));

        logger.read_for_duration();

        assert!(dir.path().join("logs").join("run.txt").exists());
    }

    #[test]
    fn discards_malformed_bytes_without_aborting() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), Duration::from_millis(200));
        let mut logger = GnssLogger::new(config);
        logger.connection = Some(Box::new(ScriptedSource::new(&[
            &[0x24, 0xff, 0xfe, 0x0a][..],
            GGA.as_bytes(),
        ])));

        logger.read_for_duration();

        let contents = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(contents, GGA);
        assert_eq!(logger.discarded_count, 1);
    }

    #[test]
    fn capture_aborts_cleanly_when_output_path_is_a_directory() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path(), Duration::from_millis(100));
        config.output_path = dir.path().to_path_buf();
        let mut logger = GnssLogger::new(config);
        logger.connection = Some(Box::new(ScriptedSource::new(&[GGA.as_bytes()])));

        logger.read_for_duration();
        logger.disconnect();

        assert_eq!(logger.sentence_count, 0);
    }

    #[test]
    fn partial_line_is_written_as_received() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), Duration::from_millis(200));
        let mut logger = GnssLogger::new(config);
        // A timeout mid-sentence yields a fragment with no terminator
        logger.connection = Some(Box::new(ScriptedSource::new(&[
            b"$GNGGA,123519.00".as_slice(),
        ])));

        logger.read_for_duration();

        let contents = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(contents, "$GNGGA,123519.00");
    }
}
