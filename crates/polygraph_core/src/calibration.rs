//! Calibração da baseline e máquina de estados da sessão.
//!
//! ```text
//! WarmingUp ──(1ª leitura)──▶ Calibrating ──(janela expirou)──▶ Scoring
//! ```
//!
//! A transição para `Scoring` é única e irreversível. A sessão tem um único
//! dono (a thread de ingestão), então nenhum estado aqui é sincronizado.

use crate::config::{CalibrationConfig, ChannelThresholds};
use crate::scoring::{DeviationCounter, any_exceeded, evaluate_channels};
use crate::types::{Baseline, Channel, ChannelBaseline, Reading};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info};

// ──────────────────────────────────────────────
// Estimador de baseline
// ──────────────────────────────────────────────

/// Acumula amostras por canal durante a janela de calibração.
#[derive(Debug, Clone, Default)]
pub struct BaselineEstimator {
    samples: [Vec<f64>; 3],
}

impl BaselineEstimator {
    /// Guarda os valores numéricos dos canais presentes na leitura.
    pub fn accumulate(&mut self, reading: &Reading) {
        for channel in Channel::ALL {
            if let Some(value) = reading.channel(channel) {
                self.samples[channel.index()].push(value);
            }
        }
    }

    pub fn sample_count(&self, channel: Channel) -> usize {
        self.samples[channel.index()].len()
    }

    /// Média e desvio padrão populacional por canal. Consome as amostras.
    ///
    /// Canal sem nenhuma amostra vira `{ mean: 0, std_dev: 0 }`.
    pub fn finalize(self) -> Baseline {
        let mut baseline = Baseline::default();
        for channel in Channel::ALL {
            baseline.set(channel, channel_stats(&self.samples[channel.index()]));
        }
        baseline
    }
}

fn channel_stats(samples: &[f64]) -> ChannelBaseline {
    // Lista vazia conta como uma única amostra zero
    const ZERO_FALLBACK: &[f64] = &[0.0];
    let samples = if samples.is_empty() { ZERO_FALLBACK } else { samples };

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    ChannelBaseline {
        mean,
        std_dev: variance.sqrt(),
    }
}

// ──────────────────────────────────────────────
// Sessão de calibração
// ──────────────────────────────────────────────

/// Fase observável da sessão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WarmingUp,
    Calibrating,
    Scoring,
}

#[derive(Debug)]
enum State {
    Calibrating(BaselineEstimator),
    Scoring {
        baseline: Baseline,
        counter: DeviationCounter,
    },
}

/// Sessão única de calibração + scoring por execução do processo.
#[derive(Debug)]
pub struct CalibrationSession {
    window: Duration,
    thresholds: ChannelThresholds,
    started_at: Option<Instant>,
    state: State,
    last_score: Option<f64>,
    history: VecDeque<Reading>,
    history_len: usize,
}

impl CalibrationSession {
    pub fn new(window: Duration, thresholds: ChannelThresholds) -> Self {
        Self {
            window,
            thresholds,
            started_at: None,
            state: State::Calibrating(BaselineEstimator::default()),
            last_score: None,
            history: VecDeque::new(),
            history_len: CalibrationConfig::default().history_len,
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        let mut session = Self::new(config.window(), config.thresholds.clone());
        session.history_len = config.history_len;
        session
    }

    /// Processa uma leitura. Devolve o score (0–100, uma casa decimal) ou
    /// `None` enquanto calibra.
    pub fn update(&mut self, reading: &Reading, now: Instant) -> Option<f64> {
        let started_at = match self.started_at {
            Some(t) => t,
            None => {
                info!("Iniciando calibração ({:.1}s)...", self.window.as_secs_f64());
                self.started_at = Some(now);
                now
            }
        };

        match &mut self.state {
            State::Calibrating(estimator) => {
                estimator.accumulate(reading);
                if now.saturating_duration_since(started_at) >= self.window {
                    let baseline = std::mem::take(estimator).finalize();
                    info!("Calibração concluída: {baseline}");
                    self.state = State::Scoring {
                        baseline,
                        counter: DeviationCounter::default(),
                    };
                }
                None
            }
            State::Scoring { baseline, counter } => {
                let verdicts = evaluate_channels(reading, baseline, &self.thresholds);
                let exceeded = any_exceeded(&verdicts);
                let score = counter.record(exceeded);
                if exceeded {
                    for v in verdicts.iter().filter(|v| v.exceeded) {
                        debug!("{} excedeu: {:.1} > {:.1}", v.channel, v.value, v.limit);
                    }
                }

                if self.history_len > 0 {
                    if self.history.len() >= self.history_len {
                        self.history.pop_front();
                    }
                    self.history.push_back(reading.clone());
                }

                self.last_score = Some(score);
                Some(score)
            }
        }
    }

    pub fn phase(&self) -> Phase {
        match (&self.state, self.started_at) {
            (State::Scoring { .. }, _) => Phase::Scoring,
            (State::Calibrating(_), None) => Phase::WarmingUp,
            (State::Calibrating(_), Some(_)) => Phase::Calibrating,
        }
    }

    /// Baseline fixada, disponível só depois da calibração.
    pub fn baseline(&self) -> Option<&Baseline> {
        match &self.state {
            State::Scoring { baseline, .. } => Some(baseline),
            State::Calibrating(_) => None,
        }
    }

    /// Contadores acumulados da fase de scoring.
    pub fn counts(&self) -> DeviationCounter {
        match &self.state {
            State::Scoring { counter, .. } => *counter,
            State::Calibrating(_) => DeviationCounter::default(),
        }
    }

    pub fn last_score(&self) -> Option<f64> {
        self.last_score
    }

    /// Tempo restante de calibração; `None` depois que a baseline fixou.
    pub fn calibration_remaining(&self, now: Instant) -> Option<Duration> {
        match (&self.state, self.started_at) {
            (State::Scoring { .. }, _) => None,
            (_, None) => Some(self.window),
            (_, Some(start)) => Some(self.window.saturating_sub(now.saturating_duration_since(start))),
        }
    }

    /// Leituras pontuadas mais recentes, da mais antiga para a mais nova.
    pub fn history(&self) -> impl Iterator<Item = &Reading> {
        self.history.iter()
    }
}
