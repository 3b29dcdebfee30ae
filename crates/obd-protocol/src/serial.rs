//! Serial Command Channel
//!
//! Talks to an ELM327 over a serial device (USB adapters, or Bluetooth
//! adapters bound to an RFCOMM tty).

use crate::channel::{CommandChannel, DEFAULT_COMMAND_TIMEOUT, RESPONSE_SENTINEL};
use crate::error::ObdError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Default baud rate for ELM327 clones
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// How long to wait for the tail of a reply that arrived after its command timed out
pub const RESYNC_WINDOW: Duration = Duration::from_millis(500);

/// Command channel over a serial port.
///
/// The port lives behind an async mutex which doubles as the
/// one-command-in-flight guard. A timed-out command leaves its late reply
/// on the wire, so the next command first discards it.
pub struct SerialChannel {
    port: Mutex<Option<SerialStream>>,
    open: AtomicBool,
    needs_resync: AtomicBool,
    timeout: Duration,
}

impl SerialChannel {
    /// Create a detached channel; call [`SerialChannel::attach`] to open a port
    pub fn new(timeout: Duration) -> Self {
        Self {
            port: Mutex::new(None),
            open: AtomicBool::new(false),
            needs_resync: AtomicBool::new(false),
            timeout,
        }
    }

    /// Open `path` and use it for subsequent commands
    pub async fn attach(&self, path: &str, baud_rate: u32) -> Result<(), ObdError> {
        info!("Opening serial port {} at {} baud", path, baud_rate);
        let stream = tokio_serial::new(path, baud_rate).open_native_async()?;
        *self.port.lock().await = Some(stream);
        self.needs_resync.store(false, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Close the port; further commands fail with [`ObdError::NotConnected`]
    pub async fn detach(&self) {
        if self.port.lock().await.take().is_some() {
            info!("Serial port closed");
        }
        self.open.store(false, Ordering::SeqCst);
    }

    /// Configured response timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SerialChannel {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl CommandChannel for SerialChannel {
    async fn send_command(&self, command: &str) -> Result<String, ObdError> {
        let mut guard = self.port.lock().await;
        let port = guard.as_mut().ok_or(ObdError::NotConnected)?;

        let resync = self.needs_resync.swap(false, Ordering::SeqCst);
        let result = async {
            if resync {
                if let Err(e) = port.clear(ClearBuffer::Input) {
                    warn!("Could not clear serial input buffer: {}", e);
                }
                discard_stale_reply(port, RESYNC_WINDOW).await?;
            }
            exchange(port, command, self.timeout).await
        }
        .await;

        match result {
            Ok(response) => Ok(response),
            Err(err @ ObdError::Timeout(_)) => {
                self.needs_resync.store(true, Ordering::SeqCst);
                Err(err)
            }
            Err(err) => {
                warn!("Serial link failed during {:?}: {}", command, err);
                *guard = None;
                self.open.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Write one command and read until the prompt, bounded by `timeout`
pub(crate) async fn exchange<S>(
    stream: &mut S,
    command: &str,
    timeout: Duration,
) -> Result<String, ObdError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("-> {}", command);
    stream.write_all(format!("{command}\r").as_bytes()).await?;
    stream.flush().await?;

    let response = tokio::time::timeout(timeout, read_until_sentinel(stream))
        .await
        .map_err(|_| ObdError::Timeout(timeout.as_millis() as u64))??;

    debug!("<- {:?}", response);
    Ok(response)
}

/// Drop a late reply up to its prompt, waiting at most `window` for it.
///
/// Nothing pending within the window is not an error.
pub(crate) async fn discard_stale_reply<S>(stream: &mut S, window: Duration) -> Result<(), ObdError>
where
    S: AsyncRead + Unpin,
{
    match tokio::time::timeout(window, read_until_sentinel(stream)).await {
        Ok(Ok(stale)) => {
            debug!("Discarded late reply {:?}", stale);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(()),
    }
}

async fn read_until_sentinel<S>(stream: &mut S) -> Result<String, ObdError>
where
    S: AsyncRead + Unpin,
{
    let mut response = String::new();
    let mut buf = [0u8; 64];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ObdError::ChannelClosed);
        }
        response.push_str(&String::from_utf8_lossy(&buf[..n]));
        if response.contains(RESPONSE_SENTINEL) {
            return Ok(response);
        }
    }
}
