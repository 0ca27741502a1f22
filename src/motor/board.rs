// Serial protocol for the two-channel motor board
//
// Packet format: [0xFF, 0xFF, Channel, Length, Instruction, Params..., Checksum]
// Every instruction is answered with a status packet:
// [0xFF, 0xFF, Channel, Length, Error, Params..., Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for the motor board
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Ping = 0x01,
    StartDuty = 0x10,
    UpdateDuty = 0x11,
    SetDirection = 0x12,
    StopDuty = 0x13,
}

/// Error types for motor board communication
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response on channel {channel}: {reason}")]
    InvalidResponse { channel: u8, reason: String },

    #[error("Checksum mismatch on channel {channel}")]
    ChecksumMismatch { channel: u8 },

    #[error("Channel {channel} returned error status: 0x{status:02X}")]
    Fault { channel: u8, status: u8 },

    #[error("Timeout waiting for response on channel {channel}")]
    Timeout { channel: u8 },
}

pub type Result<T> = std::result::Result<T, BoardError>;

/// Motor board link - handles serial communication with the H-bridge controller
pub struct MotorBoard<P = Box<dyn SerialPort>> {
    port: P,
}

impl MotorBoard<Box<dyn SerialPort>> {
    /// Open a new connection to the motor board
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }
}

impl<P: Read + Write> MotorBoard<P> {
    /// Wrap an already opened byte stream
    pub fn from_port(port: P) -> Self {
        Self { port }
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(channel: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(channel);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], channel: u8) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::UnexpectedEof => {
                BoardError::Timeout { channel }
            }
            _ => BoardError::Io(e),
        })
    }

    /// Read a status packet, returning its parameters
    fn read_response(&mut self, expected_channel: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.read_exact(&mut header, expected_channel)?;

        if header != HEADER {
            return Err(BoardError::InvalidResponse {
                channel: expected_channel,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut channel_length = [0u8; 2];
        self.read_exact(&mut channel_length, expected_channel)?;
        let channel = channel_length[0];
        let length = channel_length[1] as usize;

        if channel != expected_channel {
            return Err(BoardError::InvalidResponse {
                channel: expected_channel,
                reason: format!("Channel mismatch: expected {}, got {}", expected_channel, channel),
            });
        }
        if length < 2 {
            return Err(BoardError::InvalidResponse {
                channel,
                reason: format!("Length {} too short for a status packet", length),
            });
        }

        // error + params + checksum
        let mut remaining = vec![0u8; length];
        self.read_exact(&mut remaining, expected_channel)?;

        let mut checksum_data = vec![channel, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        if Self::checksum(&checksum_data) != remaining[remaining.len() - 1] {
            return Err(BoardError::ChecksumMismatch { channel });
        }

        let status = remaining[0];
        if status != 0 {
            return Err(BoardError::Fault { channel, status });
        }

        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    fn command(&mut self, channel: u8, instruction: Instruction, params: &[u8]) -> Result<()> {
        let packet = Self::build_packet(channel, instruction, params);
        debug!("{:?} on channel {}: params={:02X?}", instruction, channel, params);
        self.send_packet(&packet)?;
        self.read_response(channel)?;
        Ok(())
    }

    /// Check whether a channel answers
    pub fn ping(&mut self, channel: u8) -> Result<bool> {
        let packet = Self::build_packet(channel, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(channel) {
            Ok(_) => Ok(true),
            Err(BoardError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Initialize the duty-cycle generator of a channel at `pct` percent
    pub fn start_duty(&mut self, channel: u8, pct: f32) -> Result<()> {
        let raw = encode_duty(pct).to_le_bytes();
        self.command(channel, Instruction::StartDuty, &raw)
    }

    /// Change the duty cycle of an already started channel
    pub fn update_duty(&mut self, channel: u8, pct: f32) -> Result<()> {
        let raw = encode_duty(pct).to_le_bytes();
        self.command(channel, Instruction::UpdateDuty, &raw)
    }

    pub fn set_direction(&mut self, channel: u8, forward: bool) -> Result<()> {
        self.command(channel, Instruction::SetDirection, &[forward as u8])
    }

    /// Stop the duty-cycle generator; the channel must be started again afterwards
    pub fn stop_duty(&mut self, channel: u8) -> Result<()> {
        self.command(channel, Instruction::StopDuty, &[])
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}

/// Encode a duty percentage as tenths of a percent (0..=1000)
fn encode_duty(pct: f32) -> u16 {
    (pct.clamp(0.0, 100.0) * 10.0).round() as u16
}
