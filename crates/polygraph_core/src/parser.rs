//! Parser do protocolo de linha do Arduino.
//!
//! Formato:
//!
//! ```text
//! ekg:512|gsr:340|sound:88|leadsOff:false
//! ```
//!
//! - Campos separados por `|`, cada campo `chave:valor`
//! - Chave normalizada (trim + minúsculas), valor com trim
//! - Só dígitos → inteiro; `true`/`false` → booleano; o resto fica texto
//!
//! Qualquer campo malformado invalida a linha inteira: nunca existe leitura
//! parcial.

use crate::types::{FieldValue, Reading};

/// Separador entre campos.
pub const FIELD_SEPARATOR: char = '|';

/// Separador entre chave e valor.
pub const PAIR_SEPARATOR: char = ':';

/// Erros de parsing de linha. A linha é descartada, o loop continua.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Linha vazia")]
    EmptyLine,

    #[error("Campo sem exatamente um '{PAIR_SEPARATOR}': {0:?}")]
    MissingSeparator(String),

    #[error("Inteiro fora do intervalo: {0}")]
    InvalidInteger(String),
}

/// Converte uma linha crua em [`Reading`].
pub fn parse_line(line: &str) -> Result<Reading, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::EmptyLine);
    }

    let mut reading = Reading::default();
    for field in line.split(FIELD_SEPARATOR) {
        let (key, value) = split_pair(field)?;
        reading.insert(key.trim().to_lowercase(), parse_value(value.trim())?);
    }
    Ok(reading)
}

fn split_pair(field: &str) -> Result<(&str, &str), ParseError> {
    let mut parts = field.split(PAIR_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(value), None) => Ok((key, value)),
        _ => Err(ParseError::MissingSeparator(field.to_string())),
    }
}

fn parse_value(value: &str) -> Result<FieldValue, ParseError> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse()
            .map(FieldValue::Integer)
            .map_err(|_| ParseError::InvalidInteger(value.to_string()));
    }
    if value.eq_ignore_ascii_case("true") {
        return Ok(FieldValue::Boolean(true));
    }
    if value.eq_ignore_ascii_case("false") {
        return Ok(FieldValue::Boolean(false));
    }
    Ok(FieldValue::Text(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Channel;

    #[test]
    fn parses_all_integer_channels() {
        let r = parse_line("ekg:512|gsr:340|sound:88").unwrap();
        assert_eq!(r.iter().count(), 3);
        assert_eq!(r.get("ekg"), Some(&FieldValue::Integer(512)));
        assert_eq!(r.get("gsr"), Some(&FieldValue::Integer(340)));
        assert_eq!(r.get("sound"), Some(&FieldValue::Integer(88)));
    }

    #[test]
    fn normalizes_keys_and_types_values() {
        let r = parse_line("  EKG : 100 | LeadsOff:TRUE|auth: False |card: SIM-1 \r\n").unwrap();
        assert_eq!(r.channel(Channel::Ekg), Some(100.0));
        assert_eq!(r.get("leadsoff"), Some(&FieldValue::Boolean(true)));
        assert_eq!(r.get("auth"), Some(&FieldValue::Boolean(false)));
        assert_eq!(r.get("card"), Some(&FieldValue::Text("SIM-1".into())));
    }

    #[test]
    fn signed_and_decimal_values_stay_text() {
        let r = parse_line("ekg:-5|gsr:1.5|sound:").unwrap();
        assert_eq!(r.get("ekg"), Some(&FieldValue::Text("-5".into())));
        assert_eq!(r.get("gsr"), Some(&FieldValue::Text("1.5".into())));
        assert_eq!(r.get("sound"), Some(&FieldValue::Text(String::new())));
        assert_eq!(r.channel(Channel::Gsr), None);
    }

    #[test]
    fn field_without_separator_rejects_whole_line() {
        assert_eq!(
            parse_line("ekg512|gsr:340"),
            Err(ParseError::MissingSeparator("ekg512".into()))
        );
    }

    #[test]
    fn field_with_two_separators_is_rejected() {
        assert!(matches!(
            parse_line("ekg:1|time:12:30"),
            Err(ParseError::MissingSeparator(_))
        ));
    }

    #[test]
    fn trailing_pipe_is_rejected() {
        assert!(parse_line("ekg:1|").is_err());
    }

    #[test]
    fn blank_line_is_rejected() {
        assert_eq!(parse_line("   \r\n"), Err(ParseError::EmptyLine));
    }

    #[test]
    fn huge_integer_is_rejected() {
        assert!(matches!(
            parse_line("ekg:99999999999999999999999"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn parsing_is_deterministic() {
        let line = "ekg:512|gsr:340|sound:88|flag:true";
        assert_eq!(parse_line(line).unwrap(), parse_line(line).unwrap());
    }
}
