//! Protocolos de saída.
//!
//! **Assinantes** recebem um evento JSON por linha:
//!
//! ```text
//! {"type":"message","data":{"data":"Connected to server"}}
//! {"type":"sensor_data","data":{"ekg":512,"gsr":340,"sound":88,"maybe_lying":null}}
//! ```
//!
//! **Atuador** recebe uma única linha com o percentual inteiro:
//!
//! ```text
//! 42\n
//! ```

use crate::types::ScoredReading;
use serde::{Deserialize, Serialize};

/// Maior percentual aceito pelo atuador.
pub const MAX_PERCENT: u8 = 100;

/// Texto da saudação enviada a cada assinante novo.
pub const GREETING: &str = "Connected to server";

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),

    #[error("Percentual fora de 0–{MAX_PERCENT}: {0}")]
    InvalidPercent(f64),
}

/// Mensagem livre para o assinante.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub data: String,
}

/// Eventos publicados para os assinantes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubEvent {
    Message(TextMessage),
    SensorData(ScoredReading),
}

impl HubEvent {
    pub fn greeting() -> Self {
        HubEvent::Message(TextMessage {
            data: GREETING.into(),
        })
    }
}

/// Codifica um evento como uma linha JSON terminada em `\n`.
pub fn encode_event(event: &HubEvent) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(event).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Decodifica uma linha recebida por um assinante.
pub fn decode_event(line: &str) -> Result<HubEvent, ProtocolError> {
    serde_json::from_str(line.trim_end()).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

/// Razão bruta (sem arredondar) → percentual inteiro do atuador (truncado).
pub fn percent_from_score(score: f64) -> Result<u8, ProtocolError> {
    if !(0.0..=f64::from(MAX_PERCENT)).contains(&score) {
        return Err(ProtocolError::InvalidPercent(score));
    }
    Ok(score.trunc() as u8)
}

/// Linha enviada ao atuador: decimal + `\n`.
pub fn encode_relay_line(percent: u8) -> Result<Vec<u8>, ProtocolError> {
    if percent > MAX_PERCENT {
        return Err(ProtocolError::InvalidPercent(f64::from(percent)));
    }
    Ok(format!("{percent}\n").into_bytes())
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;

    #[test]
    fn sensor_event_wire_format() {
        let event = HubEvent::SensorData(ScoredReading {
            reading: parse_line("ekg:512|gsr:340|sound:88").unwrap(),
            maybe_lying: None,
        });
        let line = encode_event(&event).unwrap();
        assert_eq!(
            line,
            "{\"type\":\"sensor_data\",\"data\":{\"ekg\":512,\"gsr\":340,\"sound\":88,\"maybe_lying\":null}}\n"
        );
    }

    #[test]
    fn greeting_wire_format() {
        let line = encode_event(&HubEvent::greeting()).unwrap();
        assert_eq!(line, "{\"type\":\"message\",\"data\":{\"data\":\"Connected to server\"}}\n");
    }

    #[test]
    fn decode_reads_scored_event() {
        let event =
            decode_event("{\"type\":\"sensor_data\",\"data\":{\"ekg\":1,\"maybe_lying\":12.5}}\n").unwrap();
        match event {
            HubEvent::SensorData(scored) => {
                assert_eq!(scored.maybe_lying, Some(12.5));
                assert_eq!(scored.reading.iter().count(), 1);
            }
            other => panic!("evento inesperado: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_event("nope"), Err(ProtocolError::Deserialize(_))));
    }

    #[test]
    fn percent_truncates() {
        assert_eq!(percent_from_score(66.7).unwrap(), 66);
        assert_eq!(percent_from_score(100.0).unwrap(), 100);
        assert_eq!(percent_from_score(0.0).unwrap(), 0);
        assert!(matches!(percent_from_score(100.5), Err(ProtocolError::InvalidPercent(_))));
        assert!(percent_from_score(f64::NAN).is_err());
    }

    #[test]
    fn relay_line_is_newline_terminated() {
        assert_eq!(encode_relay_line(42).unwrap(), b"42\n");
        assert_eq!(encode_relay_line(0).unwrap(), b"0\n");
        assert!(encode_relay_line(101).is_err());
    }
}
