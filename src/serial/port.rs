//! Serial port configuration and connection management
//!
//! Handles serial port discovery and connection for GNSS receivers attached
//! over USB-to-serial adapters or native UARTs.

use anyhow::{Context, Result};
use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Default baud rate for modern GNSS receivers
pub const DEFAULT_GNSS_BAUD: u32 = 115200;

/// Configuration for a serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, /dev/ttyACM0)
    pub port_path: String,
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_GNSS_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_secs(1),
        }
    }
}

impl PortConfig {
    /// Create a new configuration with default GNSS settings
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open serial connection to a GNSS receiver
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> std::result::Result<Self, serialport::Error> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()?;

        Ok(Self { port })
    }

    /// Read one line from the serial port, up to and including the newline
    ///
    /// The returned bytes keep their line terminator exactly as received.
    /// A timeout with an empty buffer yields `Ok(None)`; a timeout mid-line
    /// yields the partial buffer.
    pub fn read_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(1) => {
                    buffer.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Ok(_) => {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Some(buffer))
    }

    /// Flush buffered serial state
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// List all available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;

    let port_infos: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    PortType::UsbSerial,
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::PciPort => {
                    (PortType::PciSerial, None, None, None, None, None)
                }
                serialport::SerialPortType::BluetoothPort => {
                    (PortType::Bluetooth, None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    (PortType::Unknown, None, None, None, None, None)
                }
            };

            PortInfo {
                path: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect();

    Ok(port_infos)
}

/// Print formatted list of available serial ports
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Connect the receiver or its USB-to-serial adapter");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyUSB* /dev/ttyACM*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        println!("  4. Check dmesg for connection events: dmesg | tail -20");
        return Ok(());
    }

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in ports {
        println!("\n{}: {}", "Port".cyan(), port.path.white().bold());
        println!("  Type: {}", port.port_type);

        if let Some(ref mfg) = port.manufacturer {
            println!("  Manufacturer: {}", mfg);
        }
        if let Some(ref prod) = port.product {
            println!("  Product: {}", prod);
        }
        if let Some(ref sn) = port.serial_number {
            println!("  Serial: {}", sn);
        }
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            println!("  VID:PID: {:04x}:{:04x}", vid, pid);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "{}",
        "Use: gnss-logger log -p <PORT> to start logging".yellow()
    );

    Ok(())
}

/// Auto-detect serial ports that look like GNSS receivers
pub fn detect_gnss_ports() -> Result<Vec<PortInfo>> {
    let ports = list_ports()?;

    let gnss_ports: Vec<PortInfo> = ports.into_iter().filter(is_gnss_candidate).collect();

    Ok(gnss_ports)
}

/// Check whether a port plausibly belongs to a GNSS receiver
///
/// Receivers either enumerate with their own vendor ID (u-blox) or sit
/// behind a common USB-to-serial bridge: FTDI, CP210x, CH340, PL2303.
fn is_gnss_candidate(port: &PortInfo) -> bool {
    if port.port_type != PortType::UsbSerial {
        return false;
    }

    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        // u-blox
        if vid == 0x1546 {
            return true;
        }
        // FTDI
        if vid == 0x0403 {
            return true;
        }
        // Silicon Labs CP210x
        if vid == 0x10c4 && (pid == 0xea60 || pid == 0xea70) {
            return true;
        }
        // WCH CH340/CH341
        if vid == 0x1a86 && (pid == 0x7523 || pid == 0x5523) {
            return true;
        }
        // Prolific PL2303
        if vid == 0x067b && pid == 0x2303 {
            return true;
        }
    }

    // Fallback: check product name for receiver keywords
    if let Some(ref prod) = port.product {
        let prod_lower = prod.to_lowercase();
        return prod_lower.contains("gps")
            || prod_lower.contains("gnss")
            || prod_lower.contains("u-blox")
            || prod_lower.contains("ublox")
            || prod_lower.contains("nmea");
    }

    false
}
