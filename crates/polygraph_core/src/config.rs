//! Configuração unificada via TOML.
//!
//! Um único `config.toml` cobre as duas portas seriais, a calibração e o
//! servidor de assinantes. Seções ausentes usam os valores padrão.

use crate::types::Channel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[cfg(windows)]
const DEFAULT_INPUT_PORT: &str = "COM10";
#[cfg(not(windows))]
const DEFAULT_INPUT_PORT: &str = "/dev/ttyACM0";

#[cfg(windows)]
const DEFAULT_RELAY_PORT: &str = "COM16";
#[cfg(not(windows))]
const DEFAULT_RELAY_PORT: &str = "/dev/ttyUSB0";

/// Converte segundos da config em [`Duration`] sem pânico em valor inválido.
fn secs(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

/// Dispositivo de entrada (Arduino com os sensores).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Porta serial (ex: "COM10", "/dev/ttyACM0")
    pub port: String,
    pub baud: u32,
    /// Timeout de leitura da porta (ms)
    pub read_timeout_ms: u64,
    /// Espera após abrir a porta, enquanto o Arduino reinicia (ms)
    pub settle_ms: u64,
    /// Arquivo de captura para reprodução (vazio = porta serial)
    pub replay_file: String,
    /// Intervalo entre linhas na reprodução (ms)
    pub replay_interval_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_INPUT_PORT.into(),
            baud: 9600,
            read_timeout_ms: 1000,
            settle_ms: 2000,
            replay_file: String::new(),
            replay_interval_ms: 100,
        }
    }
}

/// Dispositivo atuador (ESP32) que recebe o percentual.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    pub port: String,
    pub baud: u32,
    /// Timeout de escrita (ms)
    pub write_timeout_ms: u64,
    /// Intervalo mínimo entre escritas (s)
    pub cooldown_secs: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_RELAY_PORT.into(),
            baud: 9600,
            write_timeout_ms: 1000,
            cooldown_secs: 10.0,
        }
    }
}

impl RelayConfig {
    pub fn cooldown(&self) -> Duration {
        secs(self.cooldown_secs, 10.0)
    }
}

/// Multiplicadores aplicados à média da baseline de cada canal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelThresholds {
    pub ekg: f64,
    pub gsr: f64,
    pub sound: f64,
}

impl Default for ChannelThresholds {
    fn default() -> Self {
        Self {
            ekg: 1.2,
            gsr: 1.2,
            sound: 1.3,
        }
    }
}

impl ChannelThresholds {
    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Ekg => self.ekg,
            Channel::Gsr => self.gsr,
            Channel::Sound => self.sound,
        }
    }
}

/// Calibração e scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Janela de calibração (s)
    pub window_secs: f64,
    /// Quantas leituras pontuadas manter em memória
    pub history_len: usize,
    pub thresholds: ChannelThresholds,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_secs: 15.0,
            history_len: 1000,
            thresholds: ChannelThresholds::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn window(&self) -> Duration {
        secs(self.window_secs, 15.0)
    }
}

/// Servidor de assinantes em tempo real.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP local para bind
    pub bind_ip: String,
    /// Porta TCP
    pub port: u16,
    /// Fila por assinante; cheia = descarta o evento novo
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            port: 5000,
            queue_capacity: 64,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub relay: RelayConfig,
    pub calibration: CalibrationConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.input.baud == 0 {
            errors.push("Baud da entrada não pode ser 0".into());
        }
        if self.relay.baud == 0 {
            errors.push("Baud do relay não pode ser 0".into());
        }
        if !(self.calibration.window_secs.is_finite() && self.calibration.window_secs > 0.0) {
            errors.push(format!(
                "Janela de calibração inválida: {} (> 0)",
                self.calibration.window_secs
            ));
        }
        if !(self.relay.cooldown_secs.is_finite() && self.relay.cooldown_secs >= 0.0) {
            errors.push(format!(
                "Cooldown do relay inválido: {} (>= 0)",
                self.relay.cooldown_secs
            ));
        }
        for channel in Channel::ALL {
            let t = self.calibration.thresholds.get(channel);
            if !(t.is_finite() && t > 0.0) {
                errors.push(format!("Multiplicador de {channel} inválido: {t}"));
            }
        }
        if self.server.port == 0 {
            errors.push("Porta do servidor não pode ser 0".into());
        }
        if self.server.queue_capacity == 0 {
            errors.push("Fila de assinante não pode ter capacidade 0".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.calibration.window(), Duration::from_secs(15));
        assert_eq!(config.relay.cooldown(), Duration::from_secs(10));
        assert_eq!(config.calibration.thresholds.get(Channel::Sound), 1.3);
        assert_eq!(config.input.baud, 9600);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.input.port, parsed.input.port);
        assert_eq!(config.calibration.thresholds, parsed.calibration.thresholds);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[calibration.thresholds]
ekg = 1.5

[relay]
cooldown_secs = 3.0
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.calibration.thresholds.ekg, 1.5);
        assert_eq!(config.calibration.thresholds.gsr, 1.2);
        assert_eq!(config.relay.cooldown(), Duration::from_secs(3));
        assert_eq!(config.calibration.window_secs, 15.0);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = AppConfig::default();
        config.calibration.window_secs = -1.0;
        config.calibration.thresholds.gsr = 0.0;
        config.server.queue_capacity = 0;
        let errors = config.validate();
        assert_eq!(errors.len(), 3, "Erros: {:?}", errors);
        assert_eq!(config.calibration.window(), Duration::from_secs(15));
    }
}
