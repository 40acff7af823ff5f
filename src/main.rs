//! GNSS NMEA Serial Logger
//!
//! A command-line utility that captures NMEA sentences from a GNSS receiver
//! attached to a serial port and writes them to a plain-text log file.
//!
//! # Features
//!
//! - **Port Discovery**: List available serial ports and auto-detect likely
//!   GNSS receivers (u-blox and common USB-to-serial bridges)
//! - **Duration-Bounded Capture**: Read serial output for a fixed number of
//!   seconds and stop on its own
//! - **Sentence Filtering**: Only lines starting with the `$` delimiter are
//!   written; everything else on the wire is discarded
//! - **Error Log**: Connection and I/O failures are appended to an error log
//!   file and never abort the run sequence
//!
//! # Usage
//!
//! ```bash
//! # List available serial ports
//! gnss-logger list
//!
//! # Show ports that look like GNSS receivers
//! gnss-logger detect
//!
//! # Log for 30 seconds from an explicit port
//! gnss-logger log -p /dev/ttyUSB0 -b 115200 -d 30
//!
//! # Auto-detect the receiver and echo sentences while logging
//! gnss-logger -v log -o logs/drive-test.txt -d 120
//! ```

mod serial;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serial::{GnssLogger, LogConfig, PortConfig};

/// GNSS NMEA Serial Logger
#[derive(Parser)]
#[command(name = "gnss-logger")]
#[command(version = "0.1.0")]
#[command(about = "Log NMEA sentences from a GNSS receiver to a text file")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Echo logged sentences to the console
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Error log file (append mode)
    #[arg(long, global = true, default_value = "errors.log")]
    error_log: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    List,

    /// Detect ports that look like GNSS receivers
    Detect,

    /// Log NMEA sentences to a file for a fixed duration
    Log {
        /// Serial port path (e.g., /dev/ttyUSB0); auto-detected when omitted
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long, default_value_t = 115200)]
        baud: u32,

        /// Serial read timeout in seconds
        #[arg(short, long, default_value_t = 1.0)]
        timeout: f64,

        /// Output file (default: logs/<timestamp>_gnss_log.txt)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Logging duration in seconds
        #[arg(short, long, default_value_t = 5)]
        duration: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_error_log(&cli.error_log);

    match cli.command {
        Commands::List => serial::port::print_ports(),

        Commands::Detect => handle_detect(),

        Commands::Log {
            port,
            baud,
            timeout,
            output,
            duration,
        } => handle_log(port, baud, timeout, output, duration, cli.verbose),
    }
}

/// Route `log` records to an append-mode error log file
///
/// Defaults to severity `error`; `RUST_LOG` overrides. Falls back to stderr
/// when the file cannot be opened.
fn init_error_log(path: &Path) {
    let env = env_logger::Env::default().default_filter_or("error");
    let mut builder = env_logger::Builder::from_env(env);

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(e) => {
            eprintln!(
                "{} Cannot open error log {}: {}",
                "[WARNING]".yellow().bold(),
                path.display(),
                e
            );
        }
    }

    builder.init();
}

fn handle_detect() -> Result<()> {
    println!("{} Detecting GNSS receivers...", "[*]".cyan().bold());

    let ports = serial::port::detect_gnss_ports()?;

    if ports.is_empty() {
        println!("{}", "No likely GNSS receivers detected".yellow());
        println!("\n{}", "Troubleshooting:".white().bold());
        println!("  1. Connect the receiver or its USB-to-serial adapter");
        println!("  2. Check permissions: sudo usermod -aG dialout $USER");
        println!("  3. Check dmesg for connection events");
    } else {
        println!("\n{}", "Detected GNSS receiver candidates:".green().bold());
        for port in &ports {
            println!("\n  {}", port.path.white().bold());
            if let Some(ref prod) = port.product {
                println!("    Product: {}", prod);
            }
            if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                println!("    VID:PID: {:04x}:{:04x}", vid, pid);
            }
        }
        println!("\n{}", "To start logging:".cyan());
        println!("  gnss-logger log -p {}", ports[0].path.white());
    }

    Ok(())
}

fn handle_log(
    port: Option<String>,
    baud: u32,
    timeout: f64,
    output: Option<PathBuf>,
    duration: u64,
    verbose: bool,
) -> Result<()> {
    if !timeout.is_finite() || timeout <= 0.0 {
        eprintln!(
            "{} Timeout must be a positive number of seconds",
            "[ERROR]".red().bold()
        );
        std::process::exit(1);
    }

    // Try to auto-detect the receiver if no port was given
    let port_path = if let Some(p) = port {
        p
    } else {
        let detected = serial::port::detect_gnss_ports()?;
        if detected.is_empty() {
            eprintln!("{} No GNSS receiver detected", "[ERROR]".red().bold());
            eprintln!("Use -p to specify the port manually");
            std::process::exit(1);
        }
        println!(
            "{} Auto-detected: {}",
            "[OK]".green().bold(),
            detected[0].path.white()
        );
        detected[0].path.clone()
    };

    let output_path = output.unwrap_or_else(|| {
        PathBuf::from(format!("logs/{}_gnss_log.txt", Utc::now().timestamp()))
    });

    let port_config = PortConfig::new(&port_path)
        .with_baud_rate(baud)
        .with_timeout(Duration::from_secs_f64(timeout));

    let config = LogConfig {
        port_config,
        output_path,
        duration: Duration::from_secs(duration),
        echo_sentences: verbose,
    };

    let mut logger = GnssLogger::new(config);
    logger.run();
    logger.print_summary();

    Ok(())
}
