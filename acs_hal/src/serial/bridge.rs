//! TCP serial bridge link.
//!
//! Each RS422 port is exposed by a serial-to-TCP bridge; the raw byte stream
//! carries packet-serial traffic unchanged.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::info;

use super::protocol::PacketSerial;
use crate::error::BusError;

/// Connect to a bridge and return a packet-serial driver on it.
///
/// `timeout_ms` bounds connect, every read and every write.
///
/// # Errors
///
/// `BusError::InitFailed` when the address does not resolve or the
/// connection cannot be established.
pub fn connect(addr: &str, timeout_ms: u32) -> Result<PacketSerial<TcpStream>, BusError> {
    let timeout = Duration::from_millis(u64::from(timeout_ms.max(1)));
    let target = addr
        .to_socket_addrs()
        .map_err(|e| BusError::InitFailed(format!("resolve {addr}: {e}")))?
        .next()
        .ok_or_else(|| BusError::InitFailed(format!("resolve {addr}: no address")))?;

    let stream = TcpStream::connect_timeout(&target, timeout)
        .map_err(|e| BusError::InitFailed(format!("connect {addr}: {e}")))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|()| stream.set_write_timeout(Some(timeout)))
        .and_then(|()| stream.set_nodelay(true))
        .map_err(|e| BusError::InitFailed(format!("configure {addr}: {e}")))?;

    info!("SER: bridge {addr} connected");
    Ok(PacketSerial::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::protocol::{crc16, ACK, CMD_GET_ERROR};
    use crate::serial::RoboClawDriver;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn bridge_carries_packet_serial() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut req = [0u8; 2];
            sock.read_exact(&mut req).unwrap();
            assert_eq!(req, [0x80, CMD_GET_ERROR]);
            let mut body = req.to_vec();
            body.extend_from_slice(&0x0000_0004u32.to_be_bytes());
            let crc = crc16(&body);
            sock.write_all(&body[2..]).unwrap();
            sock.write_all(&crc.to_be_bytes()).unwrap();

            let mut cmd = [0u8; 12];
            sock.read_exact(&mut cmd).unwrap();
            sock.write_all(&[ACK]).unwrap();
        });

        let mut rc = connect(&addr, 500).unwrap();
        assert_eq!(rc.read_error(0x80), Some(4));
        assert!(rc.speed_accel(0x80, crate::serial::Motor::M1, 1, 2));
        server.join().unwrap();
    }

    #[test]
    fn unreachable_bridge_is_init_error() {
        let err = connect("not-a-host-name.invalid:1", 10).err();
        assert!(matches!(err, Some(BusError::InitFailed(_))));
    }
}
