//! Fontes de linha: porta serial do Arduino ou arquivo de captura.

use polygraph_core::config::InputConfig;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::time::Duration;
use tracing::info;

/// Resultado de uma tentativa de leitura.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Linha completa (ou resto final sem `\n`), sem decodificação estrita
    Line(String),
    /// Timeout da porta, nada para processar
    Idle,
    /// Fim definitivo (só em fontes finitas)
    Exhausted,
}

/// Erros das fontes de entrada.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Falha ao abrir porta {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Falha ao abrir captura {path}: {source}")]
    Replay {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Erro de leitura: {0}")]
    Read(#[from] io::Error),
}

/// Fonte bloqueante de linhas de texto.
pub trait LineSource {
    fn next_line(&mut self) -> Result<SourceEvent, SourceError>;
}

/// Fonte sobre qualquer [`BufRead`].
pub struct ReaderSource<R> {
    reader: R,
    buf: Vec<u8>,
    pacing: Duration,
    stop_at_eof: bool,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(128),
            pacing: Duration::ZERO,
            stop_at_eof: true,
        }
    }

    /// Espera entre linhas (reprodução em tempo real).
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Porta serial não tem fim: EOF vira `Idle`.
    pub fn endless(mut self) -> Self {
        self.stop_at_eof = false;
        self
    }

    /// Bytes UTF-8 inválidos (ruído de reset do Arduino) são descartados.
    fn take_line(&mut self) -> SourceEvent {
        let line: String = self.buf.utf8_chunks().map(|chunk| chunk.valid()).collect();
        self.buf.clear();
        SourceEvent::Line(line)
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn next_line(&mut self) -> Result<SourceEvent, SourceError> {
        // Bytes parciais de um timeout anterior continuam em `buf`
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) if self.buf.is_empty() => Ok(if self.stop_at_eof {
                SourceEvent::Exhausted
            } else {
                SourceEvent::Idle
            }),
            Ok(_) => {
                if !self.pacing.is_zero() {
                    std::thread::sleep(self.pacing);
                }
                Ok(self.take_line())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => {
                Ok(SourceEvent::Idle)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Abre a fonte configurada: captura se `replay_file` estiver preenchido,
/// senão a porta serial.
pub fn open_source(config: &InputConfig) -> Result<Box<dyn LineSource>, SourceError> {
    if config.replay_file.is_empty() {
        open_serial(config)
    } else {
        open_replay(config)
    }
}

fn open_serial(config: &InputConfig) -> Result<Box<dyn LineSource>, SourceError> {
    let port = serialport::new(&config.port, config.baud)
        .timeout(Duration::from_millis(config.read_timeout_ms))
        .open()
        .map_err(|source| SourceError::Open {
            port: config.port.clone(),
            source,
        })?;

    // Arduino reinicia ao abrir a porta
    std::thread::sleep(Duration::from_millis(config.settle_ms));
    info!("Conectado ao Arduino em {} ({} baud)", config.port, config.baud);

    Ok(Box::new(ReaderSource::new(BufReader::new(port)).endless()))
}

fn open_replay(config: &InputConfig) -> Result<Box<dyn LineSource>, SourceError> {
    let file = File::open(&config.replay_file).map_err(|source| SourceError::Replay {
        path: config.replay_file.clone(),
        source,
    })?;
    info!("Reproduzindo captura {}", config.replay_file);

    Ok(Box::new(
        ReaderSource::new(BufReader::new(file))
            .with_pacing(Duration::from_millis(config.replay_interval_ms)),
    ))
}
