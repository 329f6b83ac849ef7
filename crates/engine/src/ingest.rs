//! Thread de ingestão: lê linhas, pontua e distribui.
//!
//! É a única dona da [`CalibrationSession`]. Nenhum erro de uma iteração
//! encerra o loop; só uma fonte finita esgotada o faz.

use crate::hub::BroadcastHub;
use crate::relay::{ActuatorRelay, CooldownGate, Relay, SerialOpener};
use crate::source::{LineSource, SourceEvent, open_source};
use polygraph_core::calibration::CalibrationSession;
use polygraph_core::config::AppConfig;
use polygraph_core::parser::parse_line;
use polygraph_core::protocol::{HubEvent, encode_event, percent_from_score};
use polygraph_core::types::{Channel, ScoredReading};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Item distribuído aos assinantes: uma linha JSON já codificada.
pub type EventLine = Arc<str>;

/// Orquestra parser → sessão → hub/relay para cada linha.
pub struct Ingestor<R> {
    session: CalibrationSession,
    hub: BroadcastHub<EventLine>,
    relay: R,
    gate: CooldownGate,
    error_pause: Duration,
}

impl<R: Relay> Ingestor<R> {
    pub fn new(
        session: CalibrationSession,
        hub: BroadcastHub<EventLine>,
        relay: R,
        cooldown: Duration,
    ) -> Self {
        Self {
            session,
            hub,
            relay,
            gate: CooldownGate::new(cooldown),
            error_pause: Duration::ZERO,
        }
    }

    /// Pausa após um erro de leitura, antes de tentar de novo.
    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    #[cfg(test)]
    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    #[cfg(test)]
    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// Processa uma linha crua. Devolve a leitura pontuada publicada, ou
    /// `None` se a linha foi descartada.
    pub fn process_line(&mut self, line: &str, now: Instant) -> Option<ScoredReading> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let reading = match parse_line(line) {
            Ok(reading) => reading,
            Err(e) => {
                debug!("Linha descartada ({e}): {line:?}");
                return None;
            }
        };

        let maybe_lying = self.session.update(&reading, now);
        let scored = ScoredReading { reading, maybe_lying };
        self.publish(&scored);

        // Atuador trunca a razão bruta, não o score arredondado
        if maybe_lying.is_some() && self.gate.try_pass(now) {
            self.relay_score(self.session.counts().raw_percent());
        }

        Some(scored)
    }

    fn publish(&self, scored: &ScoredReading) {
        match encode_event(&HubEvent::SensorData(scored.clone())) {
            Ok(line) => {
                let stats = self.hub.publish(Arc::from(line));
                if stats.pruned > 0 {
                    debug!("{} assinante(s) removido(s)", stats.pruned);
                }
            }
            Err(e) => error!("Erro ao serializar evento: {e}"),
        }
    }

    fn relay_score(&mut self, score: f64) {
        let percent = match percent_from_score(score) {
            Ok(p) => p,
            Err(e) => {
                warn!("Score não enviado ao atuador: {e}");
                return;
            }
        };
        match self.relay.send(percent) {
            Ok(()) => info!("Enviado {percent}% ao atuador"),
            Err(e) => warn!("Erro ao escrever no atuador: {e}"),
        }
    }

    /// Resumo da sessão ao fim de uma fonte finita.
    fn log_summary(&self) {
        let counts = self.session.counts();
        info!(
            "Fonte de entrada encerrada ({} de {} leituras acima da baseline, score final {:?})",
            counts.exceed_count,
            counts.total_count,
            self.session.last_score()
        );

        let recent: Vec<_> = self.session.history().collect();
        if recent.is_empty() {
            return;
        }
        for channel in Channel::ALL {
            let values: Vec<f64> = recent.iter().filter_map(|r| r.channel(channel)).collect();
            if values.is_empty() {
                continue;
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            info!("Média recente de {channel}: {mean:.1} ({} leituras)", values.len());
        }
    }

    /// Loop principal. Só retorna quando a fonte se esgota.
    pub fn run<S: LineSource + ?Sized>(&mut self, source: &mut S) {
        loop {
            match source.next_line() {
                Ok(SourceEvent::Line(line)) => {
                    self.process_line(&line, Instant::now());
                }
                Ok(SourceEvent::Idle) => {}
                Ok(SourceEvent::Exhausted) => {
                    self.log_summary();
                    return;
                }
                Err(e) => {
                    warn!("Erro no loop serial: {e}");
                    if !self.error_pause.is_zero() {
                        std::thread::sleep(self.error_pause);
                    }
                }
            }
        }
    }
}

/// Inicia a thread de ingestão com o relay serial configurado.
pub fn spawn_ingest_thread(
    config: AppConfig,
    hub: BroadcastHub<EventLine>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("serial-ingest".into())
        .spawn(move || {
            let mut source = match open_source(&config.input) {
                Ok(source) => source,
                Err(e) => {
                    error!("Erro ao conectar ao Arduino: {e}");
                    return;
                }
            };

            let relay = ActuatorRelay::new(SerialOpener::from_config(&config.relay), config.relay.enabled);
            info!(
                "Atuador em {} (cooldown {:.1}s)",
                relay.device(),
                config.relay.cooldown_secs
            );

            let session = CalibrationSession::from_config(&config.calibration);
            Ingestor::new(session, hub, relay, config.relay.cooldown())
                .with_error_pause(Duration::from_millis(config.input.read_timeout_ms))
                .run(source.as_mut());
        })
}
