//! Serial access to the firmware's debug console.
//!
//! The device under test prints its log to a UART and accepts newline
//! terminated commands on the same port. [`SerialDevice`] assembles the byte
//! stream into lines and implements the bounded substring waits the harness
//! correlates against.

use serial2_tokio::SerialPort;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace};
use transport::{ChannelError, DeviceLink};

/// How long the DTR reset line is held active
const RESET_PULSE: Duration = Duration::from_millis(100);

/// A smart-switch dev board attached to a serial port
pub struct SerialDevice {
    port: SerialPort,
    // bytes of a line that has not seen its terminator yet
    carry: Vec<u8>,
    timeout: Duration,
}

impl SerialDevice {
    /// Open the port at `path` with the given baud rate. `wait` bounds every
    /// [`wait_str`](DeviceLink::wait_str) call.
    pub fn open(path: impl AsRef<Path>, baud: u32, wait: Duration) -> Result<Self, ChannelError> {
        let port = SerialPort::open(path, baud)?;
        Ok(Self {
            port,
            carry: Vec::new(),
            timeout: wait,
        })
    }

    async fn next_line(&mut self) -> Result<String, ChannelError> {
        loop {
            if let Some(pos) = self.carry.iter().position(|&byte| byte == b'\n') {
                let raw: Vec<u8> = self.carry.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&raw).trim_end().to_string());
            }
            let mut buf = [0u8; 256];
            let n = self.port.read(&mut buf).await?;
            if n == 0 {
                return Err(ChannelError::Closed);
            }
            self.carry.extend_from_slice(&buf[..n]);
        }
    }
}

impl DeviceLink for SerialDevice {
    async fn send_str(&mut self, command: &str) -> Result<(), ChannelError> {
        debug!(command, "sending command");
        let mut line = command.as_bytes().to_vec();
        line.push(b'\n');
        let mut rest: &[u8] = &line;
        while !rest.is_empty() {
            let n = self.port.write(rest).await?;
            if n == 0 {
                return Err(ChannelError::Closed);
            }
            rest = &rest[n..];
        }
        Ok(())
    }

    async fn wait_str(&mut self, pattern: &str) -> Result<String, ChannelError> {
        debug!(pattern, "waiting for log line");
        timeout(self.timeout, async {
            loop {
                let line = self.next_line().await?;
                trace!(line, "uart");
                if line.contains(pattern) {
                    return Ok(line);
                }
            }
        })
        .await
        .map_err(|_| ChannelError::timeout(format!("log line containing {pattern:?}"), self.timeout))?
    }

    async fn reset(&mut self) -> Result<(), ChannelError> {
        debug!("resetting device");
        self.port.set_dtr(true)?;
        sleep(RESET_PULSE).await;
        self.port.set_dtr(false)?;
        // output produced before the reset must not satisfy a later wait
        self.carry.clear();
        Ok(())
    }
}
