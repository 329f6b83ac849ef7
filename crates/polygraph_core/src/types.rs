//! Definição de tipos/structs do pipeline do polígrafo.
//!
//! Uma [`Reading`] é o resultado de uma linha do Arduino, com os campos na
//! ordem em que chegaram. O payload publicado para os assinantes é a
//! [`ScoredReading`], que serializa como um objeto JSON plano com todos os
//! campos originais mais `maybe_lying`.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Nome do campo de score no payload publicado.
pub const SCORE_FIELD: &str = "maybe_lying";

// ──────────────────────────────────────────────
// Valores de campo
// ──────────────────────────────────────────────

/// Valor tipado de um campo `key:value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Só dígitos ASCII (ex: `512`)
    Integer(i64),
    /// `true`/`false` em qualquer caixa
    Boolean(bool),
    /// Qualquer outra coisa, já sem espaços nas bordas
    Text(String),
}

impl FieldValue {
    /// Valor numérico usado pelo scoring. Só inteiros contam como amostra.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

// ──────────────────────────────────────────────
// Canais monitorados
// ──────────────────────────────────────────────

/// Canais fisiológicos que entram na baseline e no scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Ekg,
    Gsr,
    Sound,
}

impl Channel {
    /// Todos os canais, na ordem do protocolo.
    pub const ALL: [Channel; 3] = [Channel::Ekg, Channel::Gsr, Channel::Sound];

    /// Chave do canal na linha serial (já normalizada em minúsculas).
    pub fn key(self) -> &'static str {
        match self {
            Self::Ekg => "ekg",
            Self::Gsr => "gsr",
            Self::Sound => "sound",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Ekg => 0,
            Self::Gsr => 1,
            Self::Sound => 2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ──────────────────────────────────────────────
// Reading
// ──────────────────────────────────────────────

/// Uma leitura completa vinda de uma linha do dispositivo de entrada.
///
/// Mantém a ordem de chegada dos campos. Uma chave repetida substitui o
/// valor anterior sem mudar a posição.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    fields: Vec<(String, FieldValue)>,
}

impl Reading {
    pub(crate) fn insert(&mut self, key: String, value: FieldValue) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Valor bruto de um campo.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Valor numérico de um canal monitorado, se presente e inteiro.
    pub fn channel(&self, channel: Channel) -> Option<f64> {
        self.get(channel.key()).and_then(FieldValue::as_number)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for Reading {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        let mut reading = Reading::default();
        for (key, value) in iter {
            reading.insert(key.into(), value);
        }
        reading
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_map(ScoredVisitor)
            .map(|scored| scored.reading)
    }
}

// ──────────────────────────────────────────────
// Baseline
// ──────────────────────────────────────────────

/// Estatística de referência de um canal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelBaseline {
    pub mean: f64,
    /// Desvio padrão populacional. Guardado, mas fora da comparação ao vivo.
    pub std_dev: f64,
}

/// Baseline por canal, calculada uma única vez no fim da calibração.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub ekg: ChannelBaseline,
    pub gsr: ChannelBaseline,
    pub sound: ChannelBaseline,
}

impl Baseline {
    pub fn get(&self, channel: Channel) -> &ChannelBaseline {
        match channel {
            Channel::Ekg => &self.ekg,
            Channel::Gsr => &self.gsr,
            Channel::Sound => &self.sound,
        }
    }

    pub(crate) fn set(&mut self, channel: Channel, value: ChannelBaseline) {
        match channel {
            Channel::Ekg => self.ekg = value,
            Channel::Gsr => self.gsr = value,
            Channel::Sound => self.sound = value,
        }
    }
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for channel in Channel::ALL {
            let b = self.get(channel);
            if !first {
                f.write_str(" | ")?;
            }
            first = false;
            write!(f, "{channel}: média {:.2} σ {:.2}", b.mean, b.std_dev)?;
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// ScoredReading
// ──────────────────────────────────────────────

/// Leitura + score de desvio. Unidade publicada no hub e no relay.
///
/// `maybe_lying` é `None` enquanto a sessão calibra.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredReading {
    pub reading: Reading,
    pub maybe_lying: Option<f64>,
}

impl Serialize for ScoredReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let own = self.reading.iter().filter(|(k, _)| *k != SCORE_FIELD);
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in own {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(SCORE_FIELD, &self.maybe_lying)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScoredReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ScoredVisitor)
    }
}

struct ScoredVisitor;

impl<'de> Visitor<'de> for ScoredVisitor {
    type Value = ScoredReading;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("um objeto com campos de leitura")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut scored = ScoredReading::default();
        while let Some(key) = access.next_key::<String>()? {
            if key == SCORE_FIELD {
                scored.maybe_lying = access.next_value()?;
            } else {
                let value: FieldValue = access.next_value()?;
                scored.reading.insert(key, value);
            }
        }
        Ok(scored)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
