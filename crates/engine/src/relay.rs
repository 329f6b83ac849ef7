//! Relay do atuador (ESP32): abre → escreve → fecha, a cada envio.
//!
//! Nenhuma conexão fica aberta entre envios. O handle sai de escopo no fim
//! de [`ActuatorRelay::send`] em qualquer caminho, inclusive em erro.

use polygraph_core::config::RelayConfig;
use polygraph_core::protocol::{ProtocolError, encode_relay_line};
use serialport::SerialPort;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::debug;

/// Erros de um envio ao atuador. Nunca saem da thread de ingestão.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Falha ao abrir {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: io::Error,
    },

    #[error("Falha ao escrever em {device}: {source}")]
    Write {
        device: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Destino dos percentuais.
pub trait Relay {
    fn send(&mut self, percent: u8) -> Result<(), RelayError>;
}

/// Sabe abrir uma conexão curta com o dispositivo de saída.
pub trait DeviceOpener {
    type Handle: Write;

    fn device(&self) -> &str;
    fn open(&self) -> io::Result<Self::Handle>;
}

/// Abre a porta serial do ESP32.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    port: String,
    baud: u32,
    timeout: Duration,
}

impl SerialOpener {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            port: config.port.clone(),
            baud: config.baud,
            timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }
}

impl DeviceOpener for SerialOpener {
    type Handle = Box<dyn SerialPort>;

    fn device(&self) -> &str {
        &self.port
    }

    fn open(&self) -> io::Result<Self::Handle> {
        Ok(serialport::new(&self.port, self.baud).timeout(self.timeout).open()?)
    }
}

/// Relay com conexão de vida curta.
pub struct ActuatorRelay<O> {
    opener: O,
    enabled: bool,
}

impl<O: DeviceOpener> ActuatorRelay<O> {
    pub fn new(opener: O, enabled: bool) -> Self {
        Self { opener, enabled }
    }

    pub fn device(&self) -> &str {
        self.opener.device()
    }
}

impl<O: DeviceOpener> Relay for ActuatorRelay<O> {
    fn send(&mut self, percent: u8) -> Result<(), RelayError> {
        let line = encode_relay_line(percent)?;
        if !self.enabled {
            debug!("Relay desabilitado, ignorando {percent}%");
            return Ok(());
        }

        let device = self.opener.device();
        let mut handle = self.opener.open().map_err(|source| RelayError::Open {
            device: device.to_string(),
            source,
        })?;

        handle
            .write_all(&line)
            .and_then(|()| handle.flush())
            .map_err(|source| RelayError::Write {
                device: device.to_string(),
                source,
            })
    }
}

/// Portão de cooldown: no máximo uma passagem por intervalo.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    cooldown: Duration,
    last: Option<Instant>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last: None }
    }

    /// Libera se o intervalo já passou desde a última liberação e reinicia o
    /// relógio. A primeira chamada sempre libera.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Wire {
        bytes: Mutex<Vec<u8>>,
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct WireHandle {
        wire: Arc<Wire>,
        fail_write: bool,
    }

    impl Write for WireHandle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_write {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.wire.bytes.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for WireHandle {
        fn drop(&mut self) {
            self.wire.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct WireOpener {
        wire: Arc<Wire>,
        absent: bool,
        fail_write: bool,
    }

    impl WireOpener {
        fn new(wire: &Arc<Wire>) -> Self {
            Self {
                wire: Arc::clone(wire),
                absent: false,
                fail_write: false,
            }
        }
    }

    impl DeviceOpener for WireOpener {
        type Handle = WireHandle;

        fn device(&self) -> &str {
            "wire0"
        }

        fn open(&self) -> io::Result<WireHandle> {
            if self.absent {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            self.wire.opened.fetch_add(1, Ordering::SeqCst);
            Ok(WireHandle {
                wire: Arc::clone(&self.wire),
                fail_write: self.fail_write,
            })
        }
    }

    #[test]
    fn each_send_opens_writes_and_closes() {
        let wire = Arc::new(Wire::default());
        let mut relay = ActuatorRelay::new(WireOpener::new(&wire), true);
        relay.send(42).unwrap();
        relay.send(7).unwrap();

        assert_eq!(&*wire.bytes.lock().unwrap(), b"42\n7\n");
        assert_eq!(wire.opened.load(Ordering::SeqCst), 2);
        assert_eq!(wire.closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn absent_device_reports_open_error() {
        let wire = Arc::new(Wire::default());
        let mut opener = WireOpener::new(&wire);
        opener.absent = true;
        let mut relay = ActuatorRelay::new(opener, true);
        assert!(matches!(relay.send(10), Err(RelayError::Open { .. })));
    }

    #[test]
    fn write_failure_still_releases_handle() {
        let wire = Arc::new(Wire::default());
        let mut opener = WireOpener::new(&wire);
        opener.fail_write = true;
        let mut relay = ActuatorRelay::new(opener, true);
        assert!(matches!(relay.send(10), Err(RelayError::Write { .. })));
        assert_eq!(wire.opened.load(Ordering::SeqCst), 1);
        assert_eq!(wire.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_relay_never_opens() {
        let wire = Arc::new(Wire::default());
        let mut relay = ActuatorRelay::new(WireOpener::new(&wire), false);
        relay.send(50).unwrap();
        assert_eq!(wire.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn out_of_range_percent_is_rejected() {
        let wire = Arc::new(Wire::default());
        let mut relay = ActuatorRelay::new(WireOpener::new(&wire), true);
        assert!(matches!(relay.send(150), Err(RelayError::Protocol(_))));
        assert_eq!(wire.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn gate_blocks_inside_cooldown() {
        let t0 = Instant::now();
        let mut gate = CooldownGate::new(Duration::from_secs(10));
        assert!(gate.try_pass(t0));
        assert!(!gate.try_pass(t0 + Duration::from_secs(2)));
        assert!(!gate.try_pass(t0 + Duration::from_secs(9)));
        assert!(gate.try_pass(t0 + Duration::from_secs(10)));
        assert!(!gate.try_pass(t0 + Duration::from_secs(11)));
        assert!(gate.try_pass(t0 + Duration::from_secs(21)));
    }
}
