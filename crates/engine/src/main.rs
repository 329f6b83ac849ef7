//! # Polygraph Engine
//!
//! Lê os sensores (EKG, GSR, som) do Arduino via serial, calibra uma
//! baseline por sessão, pontua cada leitura e distribui o resultado para os
//! assinantes em tempo real. O percentual também vai, no máximo uma vez por
//! cooldown, para o ESP32 atuador.
//!
//! ## Uso
//! ```bash
//! polygraph_engine                 # config.toml ao lado do executável
//! polygraph_engine minha.toml      # config explícita
//! ```

mod hub;
mod ingest;
mod relay;
mod server;
mod source;

use hub::BroadcastHub;
use ingest::EventLine;
use polygraph_core::config::AppConfig;
use std::path::PathBuf;
use tracing::{error, info, warn};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            warn!("Config inválida: {e}");
        }
        warn!("Usando configuração padrão");
        config = AppConfig::default();
    }

    let hub = BroadcastHub::<EventLine>::new(config.server.queue_capacity);
    let bind_addr = config.server.bind_addr();

    // ── Banner ──
    let input = if config.input.replay_file.is_empty() {
        format!("{} @ {} baud", config.input.port, config.input.baud)
    } else {
        format!("captura {}", config.input.replay_file)
    };
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ POLYGRAPH ENGINE – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Entrada:    {input}");
    println!("  Atuador:    {} @ {} baud", config.relay.port, config.relay.baud);
    println!("  Calibração: {:.1}s", config.calibration.window_secs);
    println!("  Cooldown:   {:.1}s", config.relay.cooldown_secs);
    println!("  Assinantes: tcp://{bind_addr}");
    println!("══════════════════════════════════════════════");
    println!();

    // ── Thread de ingestão (serial bloqueante) ──
    match ingest::spawn_ingest_thread(config.clone(), hub.clone()) {
        Ok(_) => info!("Thread de ingestão iniciada"),
        Err(e) => error!("Falha ao criar thread de ingestão: {e}"),
    }

    // ── Servidor de assinantes (contexto principal) ──
    let listener = server::bind_with_retry(&bind_addr);
    server::accept_loop(&listener, &hub);
}
