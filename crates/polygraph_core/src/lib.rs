//! # Polygraph Core
//!
//! Crate compartilhada com os tipos de leitura, o parser do protocolo de
//! linha, o motor de calibração/scoring, os protocolos de saída e a
//! configuração TOML do pipeline do polígrafo.
//!
//! ## Módulos
//! - [`types`] – Reading, Baseline, ScoredReading
//! - [`parser`] – Linha `chave:valor|...` → [`Reading`]
//! - [`calibration`] – Estimador de baseline e máquina de estados da sessão
//! - [`scoring`] – Comparação por canal e razão acumulada
//! - [`protocol`] – Eventos JSON dos assinantes e linha do atuador
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod parser;
pub mod calibration;
pub mod scoring;
pub mod protocol;
pub mod config;

// Re-exports convenientes
pub use types::{Reading, ScoredReading};
pub use parser::{parse_line, ParseError};
pub use calibration::{CalibrationSession, Phase};
pub use protocol::{encode_event, HubEvent};
pub use config::AppConfig;
