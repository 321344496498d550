//! MKS SERVO42/57D CAN codec.
//!
//! Stateless pack/unpack over fixed-size frames. Every command frame ends
//! with a checksum byte: the low byte of the CAN id plus all preceding
//! payload bytes, modulo 256.
//!
//! ```text
//! position (0xF5): F5 | spd_hi | spd_lo | acc | pos[23:16] | pos[15:8] | pos[7:0] | crc
//! velocity (0xF6): F6 | dir<<7 | spd[11:8] | spd_lo | acc | crc
//! read pos (0x30): 30
//! response (0x30): 30 | pos[23:16] | pos[15:8] | pos[7:0] | ...
//! ```

use thiserror::Error;

use crate::consts::MAX_STANDARD_CAN_ID;

/// Absolute position move.
pub const CMD_POSITION: u8 = 0xF5;
/// Continuous speed move.
pub const CMD_VELOCITY: u8 = 0xF6;
/// Read encoder position.
pub const CMD_READ_POSITION: u8 = 0x30;

/// Largest magnitude representable in the 24-bit position field.
pub const MAX_POSITION: i32 = 0x7F_FFFF;
/// Speed ceiling [RPM].
pub const MAX_SPEED_RPM: u16 = 3000;
/// Acceleration ceiling (device scale).
pub const MAX_ACCEL: u8 = 255;
/// Encoder pulses per revolution at the default 16× microstep.
pub const DEFAULT_PULSES_PER_REV: u32 = 16_384;

/// Codec failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// CAN id does not fit the 11-bit standard identifier.
    #[error("CAN id 0x{0:X} exceeds 0x7FF")]
    IdOutOfRange(u32),
    /// Response frame shorter than 4 bytes.
    #[error("response too short: {0} bytes")]
    ShortFrame(usize),
    /// Response does not carry the expected command byte.
    #[error("unexpected command byte 0x{0:02X}")]
    WrongCommand(u8),
}

/// Checksum over a frame prefix.
pub fn checksum(can_id: u32, bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold((can_id & 0xFF) as u8, |acc, &b| acc.wrapping_add(b))
}

/// Clamp to ±0x7FFFFF and pack as 24-bit two's complement.
pub fn encode_int24(value: i32) -> u32 {
    let v = value.clamp(-MAX_POSITION, MAX_POSITION);
    (v as u32) & 0x00FF_FFFF
}

/// Sign-extend a 24-bit two's-complement field.
pub fn decode_int24(raw: u32) -> i32 {
    (((raw & 0x00FF_FFFF) << 8) as i32) >> 8
}

fn check_id(can_id: u32) -> Result<(), CodecError> {
    if can_id > MAX_STANDARD_CAN_ID {
        return Err(CodecError::IdOutOfRange(can_id));
    }
    Ok(())
}

/// Build an absolute position frame.
pub fn pack_position(
    can_id: u32,
    speed: u16,
    accel: u8,
    position: i32,
) -> Result<[u8; 8], CodecError> {
    check_id(can_id)?;
    let speed = speed.min(MAX_SPEED_RPM);
    let axis = encode_int24(position);
    let mut frame = [
        CMD_POSITION,
        (speed >> 8) as u8,
        speed as u8,
        accel,
        (axis >> 16) as u8,
        (axis >> 8) as u8,
        axis as u8,
        0,
    ];
    frame[7] = checksum(can_id, &frame[..7]);
    Ok(frame)
}

/// Build a speed-mode frame.
pub fn pack_velocity(
    can_id: u32,
    speed: u16,
    accel: u8,
    reverse: bool,
) -> Result<[u8; 5], CodecError> {
    check_id(can_id)?;
    let speed = speed.min(MAX_SPEED_RPM);
    let dir = if reverse { 0x80 } else { 0x00 };
    let mut frame = [
        CMD_VELOCITY,
        dir | ((speed >> 8) as u8 & 0x0F),
        speed as u8,
        accel,
        0,
    ];
    frame[4] = checksum(can_id, &frame[..4]);
    Ok(frame)
}

/// One-byte read-position request.
pub const fn read_position_request() -> [u8; 1] {
    [CMD_READ_POSITION]
}

/// Encode a read-position response payload (servo side).
pub fn pack_position_response(position: i32) -> [u8; 4] {
    let axis = encode_int24(position);
    [
        CMD_READ_POSITION,
        (axis >> 16) as u8,
        (axis >> 8) as u8,
        axis as u8,
    ]
}

/// Decode a read-position response.
pub fn parse_position_response(bytes: &[u8]) -> Result<i32, CodecError> {
    if bytes.len() < 4 {
        return Err(CodecError::ShortFrame(bytes.len()));
    }
    if bytes[0] != CMD_READ_POSITION {
        return Err(CodecError::WrongCommand(bytes[0]));
    }
    let raw = u32::from(bytes[1]) << 16 | u32::from(bytes[2]) << 8 | u32::from(bytes[3]);
    Ok(decode_int24(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_known_vector() {
        let bytes = [0xF5, 0x01, 0x2C, 0x32, 0x00, 0x03, 0xE8];
        assert_eq!(checksum(0x01, &bytes), 0x02);
        assert_eq!(checksum(0x01, &bytes), checksum(0x01, &bytes));
    }

    #[test]
    fn checksum_uses_low_id_byte_only() {
        assert_eq!(checksum(0x1FF, &[0x01]), 0x00);
        assert_eq!(checksum(0x0FF, &[0x01]), 0x00);
    }

    #[test]
    fn int24_clamps_and_wraps() {
        assert_eq!(encode_int24(1000), 0x0003E8);
        assert_eq!(encode_int24(-1), 0xFF_FFFF);
        assert_eq!(encode_int24(i32::MAX), 0x7F_FFFF);
        assert_eq!(encode_int24(i32::MIN), 0x80_0001);
        assert_eq!(decode_int24(0x80_0001), -MAX_POSITION);
    }

    #[test]
    fn position_frame_layout() {
        let frame = pack_position(0x01, 300, 0x32, 1000).unwrap();
        assert_eq!(frame, [0xF5, 0x01, 0x2C, 0x32, 0x00, 0x03, 0xE8, 0x02]);
    }

    #[test]
    fn position_frame_rejects_extended_id() {
        assert_eq!(
            pack_position(0x800, 100, 10, 0),
            Err(CodecError::IdOutOfRange(0x800))
        );
        assert!(pack_position(0x7FF, 100, 10, 0).is_ok());
    }

    #[test]
    fn position_frame_clamps_speed() {
        let frame = pack_position(0x01, 9000, 0, 0).unwrap();
        assert_eq!(u16::from_be_bytes([frame[1], frame[2]]), MAX_SPEED_RPM);
    }

    #[test]
    fn velocity_frame_layout() {
        let fwd = pack_velocity(0x05, 3000, 255, false).unwrap();
        assert_eq!(fwd[0], CMD_VELOCITY);
        assert_eq!(fwd[1], 0x0B);
        assert_eq!(fwd[2], 0xB8);
        assert_eq!(fwd[3], 0xFF);
        assert_eq!(fwd[4], checksum(0x05, &fwd[..4]));

        let rev = pack_velocity(0x05, 3000, 255, true).unwrap();
        assert_eq!(rev[1], 0x8B);
    }

    #[test]
    fn position_response_round_trip_edges() {
        for p in [-MAX_POSITION, -1000, -1, 0, 1, 1000, MAX_POSITION] {
            assert_eq!(parse_position_response(&pack_position_response(p)), Ok(p));
        }
    }

    #[test]
    fn parse_rejects_short_or_wrong_command() {
        assert_eq!(
            parse_position_response(&[0x30, 0x00, 0x03]),
            Err(CodecError::ShortFrame(3))
        );
        assert_eq!(
            parse_position_response(&[0x31, 0x00, 0x03, 0xE8]),
            Err(CodecError::WrongCommand(0x31))
        );
        assert_eq!(parse_position_response(&[0x30, 0x00, 0x03, 0xE8]), Ok(1000));
        assert_eq!(parse_position_response(&[0x30, 0xFF, 0xFC, 0x18]), Ok(-1000));
    }
}
