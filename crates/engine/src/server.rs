//! Servidor de assinantes em tempo real (TCP, uma linha JSON por evento).
//!
//! Roda no contexto principal. Cada conexão aceita vira uma assinatura do
//! hub e ganha uma thread de escrita própria; cliente lento só enche a
//! própria fila.

use crate::hub::{BroadcastHub, Subscription};
use crate::ingest::EventLine;
use polygraph_core::protocol::{HubEvent, encode_event};
use crossbeam_channel::RecvTimeoutError;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timeout de escrita para cada cliente.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sem eventos por este tempo, verifica se o cliente ainda está lá.
const IDLE_CHECK: Duration = Duration::from_millis(500);

/// Espera entre tentativas de bind.
const BIND_RETRY: Duration = Duration::from_secs(2);

/// Faz bind na porta, tentando de novo até conseguir.
pub fn bind_with_retry(addr: &str) -> TcpListener {
    loop {
        match TcpListener::bind(addr) {
            Ok(listener) => {
                info!("Servidor de assinantes escutando em {addr}");
                return listener;
            }
            Err(e) => {
                error!("Falha ao bind {addr}: {e}. Tentando novamente em 2s...");
                std::thread::sleep(BIND_RETRY);
            }
        }
    }
}

/// Aceita conexões para sempre.
pub fn accept_loop(listener: &TcpListener, hub: &BroadcastHub<EventLine>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => spawn_subscriber(stream, hub),
            Err(e) => warn!("Erro ao aceitar conexão: {e}"),
        }
    }
}

fn spawn_subscriber(stream: TcpStream, hub: &BroadcastHub<EventLine>) {
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(e) => {
            debug!("Conexão descartada antes do registro: {e}");
            return;
        }
    };

    // Registrar antes da thread: nada publicado após o accept se perde
    let subscription = hub.subscribe();
    let name = format!("subscriber-{}", subscription.id());

    if let Err(e) = std::thread::Builder::new()
        .name(name)
        .spawn(move || serve_subscriber(stream, &subscription, peer))
    {
        error!("Falha ao criar thread para {peer}: {e}");
    }
}

fn serve_subscriber(mut stream: TcpStream, subscription: &Subscription<EventLine>, peer: SocketAddr) {
    stream.set_nodelay(true).ok();
    stream.set_write_timeout(Some(WRITE_TIMEOUT)).ok();
    info!("Cliente conectado: {peer}");

    let greeting = match encode_event(&HubEvent::greeting()) {
        Ok(line) => line,
        Err(e) => {
            error!("Erro ao serializar saudação: {e}");
            return;
        }
    };

    if stream.write_all(greeting.as_bytes()).is_ok() {
        loop {
            match subscription.recv_timeout(IDLE_CHECK) {
                Ok(line) => {
                    if let Err(e) = stream.write_all(line.as_bytes()) {
                        debug!("Escrita para {peer} falhou: {e}");
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if peer_closed(&stream) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    info!("Cliente desconectado: {peer}");
}

/// Espia o socket sem bloquear: EOF ou erro significa cliente fechado.
/// Dados pendentes do cliente ficam no buffer e são ignorados.
fn peer_closed(stream: &TcpStream) -> bool {
    if stream.set_nonblocking(true).is_err() {
        return true;
    }
    let mut byte = [0u8; 1];
    let closed = match stream.peek(&mut byte) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => e.kind() != io::ErrorKind::WouldBlock,
    };
    stream.set_nonblocking(false).is_err() || closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use polygraph_core::protocol::{GREETING, decode_event};
    use std::io::{BufRead, BufReader};
    use std::sync::Arc;
    use std::time::Instant;

    fn wait_for_subscribers(hub: &BroadcastHub<EventLine>, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while hub.subscriber_count() < n {
            assert!(Instant::now() < deadline, "assinante não registrou");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn client_gets_greeting_then_events() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = BroadcastHub::<EventLine>::new(8);
        let server_hub = hub.clone();
        std::thread::spawn(move || accept_loop(&listener, &server_hub));

        let client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut reader = BufReader::new(client);

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        match decode_event(&line).unwrap() {
            HubEvent::Message(msg) => assert_eq!(msg.data, GREETING),
            other => panic!("esperava saudação, veio {other:?}"),
        }

        wait_for_subscribers(&hub, 1);
        hub.publish(Arc::from("{\"type\":\"sensor_data\",\"data\":{\"ekg\":1,\"maybe_lying\":null}}\n"));

        line.clear();
        reader.read_line(&mut line).unwrap();
        match decode_event(&line).unwrap() {
            HubEvent::SensorData(scored) => assert_eq!(scored.maybe_lying, None),
            other => panic!("esperava sensor_data, veio {other:?}"),
        }
    }

    #[test]
    fn disconnected_client_is_pruned() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = BroadcastHub::<EventLine>::new(8);
        let server_hub = hub.clone();
        std::thread::spawn(move || accept_loop(&listener, &server_hub));

        let client = TcpStream::connect(addr).unwrap();
        wait_for_subscribers(&hub, 1);
        drop(client);

        // Escritas num socket fechado acabam falhando e encerram a thread
        let deadline = Instant::now() + Duration::from_secs(5);
        while hub.subscriber_count() > 0 {
            assert!(Instant::now() < deadline, "assinante não saiu");
            hub.publish(Arc::from("{}\n"));
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn idle_disconnects_are_noticed_without_events() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = BroadcastHub::<EventLine>::new(8);
        let server_hub = hub.clone();
        std::thread::spawn(move || accept_loop(&listener, &server_hub));

        let clients: Vec<_> = (0..5).map(|_| TcpStream::connect(addr).unwrap()).collect();
        wait_for_subscribers(&hub, 5);
        drop(clients);

        // Nenhum publish: só a verificação ociosa pode liberar as assinaturas
        let deadline = Instant::now() + Duration::from_secs(5);
        while hub.subscriber_count() > 0 {
            assert!(Instant::now() < deadline, "assinantes ociosos não saíram");
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}
