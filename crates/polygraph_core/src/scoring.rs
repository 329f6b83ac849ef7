//! Scoring de desvio – comparação por canal e razão acumulada.

use crate::config::ChannelThresholds;
use crate::types::{Baseline, Channel, Reading};

/// Resultado da comparação de um canal contra a baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelVerdict {
    pub channel: Channel,
    pub value: f64,
    /// `média × multiplicador` do canal
    pub limit: f64,
    pub exceeded: bool,
}

/// Compara cada canal monitorado da leitura contra a baseline.
///
/// Canais ausentes ou não numéricos ficam de fora do resultado e não contam
/// como excedidos neste ciclo.
pub fn evaluate_channels(
    reading: &Reading,
    baseline: &Baseline,
    thresholds: &ChannelThresholds,
) -> Vec<ChannelVerdict> {
    Channel::ALL
        .into_iter()
        .filter_map(|channel| {
            let value = reading.channel(channel)?;
            let limit = baseline.get(channel).mean * thresholds.get(channel);
            Some(ChannelVerdict {
                channel,
                value,
                limit,
                exceeded: exceeds(value, limit),
            })
        })
        .collect()
}

/// Comparação unilateral: só acima do limite conta.
pub fn exceeds(value: f64, limit: f64) -> bool {
    value > limit
}

/// Uma leitura excede se pelo menos um canal excedeu.
pub fn any_exceeded(verdicts: &[ChannelVerdict]) -> bool {
    verdicts.iter().any(|v| v.exceeded)
}

/// Contadores da fase de scoring. Só crescem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviationCounter {
    pub exceed_count: u64,
    pub total_count: u64,
}

impl DeviationCounter {
    /// Registra uma leitura pontuada e devolve o score atualizado.
    pub fn record(&mut self, exceeded: bool) -> f64 {
        self.total_count += 1;
        if exceeded {
            self.exceed_count += 1;
        }
        self.percent()
    }

    /// `exceed / total × 100`, arredondado em uma casa decimal.
    pub fn percent(&self) -> f64 {
        round_one_decimal(self.raw_percent())
    }

    /// Mesma razão sem arredondar. É esta que o atuador trunca.
    pub fn raw_percent(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.exceed_count as f64 / self.total_count as f64 * 100.0
    }
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
