//! RoboClaw packet-serial protocol.
//!
//! Every packet starts with the controller address and a command byte and
//! is protected by a CRC16 (polynomial 0x1021, init 0). Reads return the
//! payload followed by the CRC of address, command and payload. Writes
//! append the CRC and expect a single `0xFF` acknowledge byte.

use std::io::{Read, Write};
use tracing::debug;

use super::{Motor, RoboClawDriver};

/// Accel-limited speed, motor 1.
pub const CMD_SPEED_ACCEL_M1: u8 = 38;
/// Accel-limited speed, motor 2.
pub const CMD_SPEED_ACCEL_M2: u8 = 39;
/// Accel/speed/decel-limited position, motor 1.
pub const CMD_SPEED_ACCEL_DECCEL_POSITION_M1: u8 = 65;
/// Accel/speed/decel-limited position, motor 2.
pub const CMD_SPEED_ACCEL_DECCEL_POSITION_M2: u8 = 66;
/// Read both encoders.
pub const CMD_GET_ENCODERS: u8 = 78;
/// Read both instantaneous speeds.
pub const CMD_GET_ISPEEDS: u8 = 79;
/// Read error flags.
pub const CMD_GET_ERROR: u8 = 90;

/// Write acknowledge byte.
pub const ACK: u8 = 0xFF;

/// Largest write packet: address, command, 4×u32, flag, CRC.
const MAX_PACKET: usize = 2 + 16 + 1 + 2;

/// CRC16-CCITT (XMODEM variant) over `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in bytes {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Packet-serial driver over any byte link.
///
/// The link's own read timeout bounds every transaction.
pub struct PacketSerial<L> {
    link: L,
}

impl<L: Read + Write + Send> PacketSerial<L> {
    /// Wrap an opened link.
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Release the underlying link.
    pub fn into_inner(self) -> L {
        self.link
    }

    fn read_words<const N: usize>(&mut self, address: u8, command: u8) -> Option<[u32; N]> {
        let header = [address, command];
        if let Err(e) = self.link.write_all(&header) {
            debug!("SER: addr 0x{address:02X} cmd {command} write failed: {e}");
            return None;
        }

        let mut payload = [[0u8; 4]; N];
        for word in payload.iter_mut() {
            self.link.read_exact(word).ok()?;
        }
        let mut crc_bytes = [0u8; 2];
        self.link.read_exact(&mut crc_bytes).ok()?;

        let mut crc_input = heapless::Vec::<u8, 18>::new();
        crc_input.extend_from_slice(&header).ok()?;
        for word in &payload {
            crc_input.extend_from_slice(word).ok()?;
        }
        if crc16(&crc_input) != u16::from_be_bytes(crc_bytes) {
            debug!("SER: addr 0x{address:02X} cmd {command} CRC mismatch");
            return None;
        }

        Some(payload.map(u32::from_be_bytes))
    }

    fn write_packet(&mut self, address: u8, command: u8, words: &[u32], flag: Option<u8>) -> bool {
        let mut packet = heapless::Vec::<u8, MAX_PACKET>::new();
        let built = packet.extend_from_slice(&[address, command]).is_ok()
            && words
                .iter()
                .all(|w| packet.extend_from_slice(&w.to_be_bytes()).is_ok())
            && flag.is_none_or(|f| packet.push(f).is_ok());
        if !built {
            return false;
        }
        let crc = crc16(&packet);
        if packet.extend_from_slice(&crc.to_be_bytes()).is_err() {
            return false;
        }

        if let Err(e) = self.link.write_all(&packet) {
            debug!("SER: addr 0x{address:02X} cmd {command} write failed: {e}");
            return false;
        }
        let mut ack = [0u8; 1];
        matches!(self.link.read_exact(&mut ack), Ok(()) if ack[0] == ACK)
    }
}

impl<L: Read + Write + Send> RoboClawDriver for PacketSerial<L> {
    fn name(&self) -> &'static str {
        "packet_serial"
    }

    fn read_error(&mut self, address: u8) -> Option<u32> {
        self.read_words::<1>(address, CMD_GET_ERROR).map(|[e]| e)
    }

    fn read_encoders(&mut self, address: u8) -> Option<(u32, u32)> {
        self.read_words::<2>(address, CMD_GET_ENCODERS)
            .map(|[e1, e2]| (e1, e2))
    }

    fn read_speeds(&mut self, address: u8) -> Option<(u32, u32)> {
        self.read_words::<2>(address, CMD_GET_ISPEEDS)
            .map(|[s1, s2]| (s1, s2))
    }

    fn speed_accel_deccel_position(
        &mut self,
        address: u8,
        motor: Motor,
        accel: u32,
        speed: u32,
        deccel: u32,
        position: u32,
        immediate: bool,
    ) -> bool {
        let command = match motor {
            Motor::M1 => CMD_SPEED_ACCEL_DECCEL_POSITION_M1,
            Motor::M2 => CMD_SPEED_ACCEL_DECCEL_POSITION_M2,
        };
        self.write_packet(
            address,
            command,
            &[accel, speed, deccel, position],
            Some(u8::from(immediate)),
        )
    }

    fn speed_accel(&mut self, address: u8, motor: Motor, accel: u32, speed: u32) -> bool {
        let command = match motor {
            Motor::M1 => CMD_SPEED_ACCEL_M1,
            Motor::M2 => CMD_SPEED_ACCEL_M2,
        };
        self.write_packet(address, command, &[accel, speed], None)
    }
}
