//! Hub de broadcast: um produtor (thread de ingestão), N assinantes.
//!
//! Cada assinante tem sua própria fila limitada. `publish` usa `try_send`:
//! fila cheia descarta o item novo daquele assinante e o produtor nunca
//! bloqueia. Assinante novo só recebe o que for publicado depois do
//! `subscribe` (sem replay).

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::debug;

struct Registry<T> {
    next_id: u64,
    subscribers: Vec<(u64, Sender<T>)>,
}

type Shared<T> = Arc<Mutex<Registry<T>>>;

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resultado de uma publicação.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub delivered: usize,
    /// Filas cheias neste ciclo
    pub dropped: usize,
    /// Assinantes que sumiram e foram removidos
    pub pruned: usize,
}

/// Hub de fan-out. Clonar é barato e compartilha o mesmo registro.
pub struct BroadcastHub<T> {
    registry: Shared<T>,
    capacity: usize,
}

impl<T> Clone for BroadcastHub<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone> BroadcastHub<T> {
    /// `capacity` é o tamanho da fila de cada assinante (mínimo 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    /// Registra um assinante novo.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = bounded(self.capacity);
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, tx));

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Entrega o item a todos os assinantes atuais sem bloquear.
    pub fn publish(&self, item: T) -> PublishStats {
        let mut stats = PublishStats::default();
        let mut registry = lock(&self.registry);

        registry.subscribers.retain(|(id, tx)| match tx.try_send(item.clone()) {
            Ok(()) => {
                stats.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Fila do assinante {id} cheia, descartando evento");
                stats.dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                stats.pruned += 1;
                false
            }
        });

        stats
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

/// Lado do assinante. Ao ser dropado, sai do hub.
pub struct Subscription<T> {
    id: u64,
    rx: Receiver<T>,
    registry: Weak<Mutex<Registry<T>>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bloqueia até o próximo item. `None` se o hub não existe mais.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Como [`recv`](Self::recv), mas desiste após `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    #[cfg(test)]
    pub fn try_recv(&self) -> Result<T, crossbeam_channel::TryRecvError> {
        self.rx.try_recv()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
