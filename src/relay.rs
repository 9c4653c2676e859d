// src/relay.rs
use crate::models::JobEvent;
use actix::Recipient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fans job events out to the push-channel clients listening to each job.
///
/// Delivery is fire-and-forget: a client only sees events broadcast while it
/// is registered, and nothing is buffered for late joiners.
#[derive(Clone, Default)]
pub struct WsBroker {
    clients: Arc<RwLock<HashMap<String, Vec<Recipient<JobEvent>>>>>,
}

impl WsBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job_id: &str, client: Recipient<JobEvent>) {
        let mut clients = self.clients.write().await;
        clients.entry(job_id.to_string()).or_default().push(client);
    }

    /// Remove `client` and return how many listeners the job still has.
    pub async fn unregister(&self, job_id: &str, client: &Recipient<JobEvent>) -> usize {
        let mut clients = self.clients.write().await;
        let Some(listeners) = clients.get_mut(job_id) else {
            return 0;
        };
        listeners.retain(|c| c != client);
        let remaining = listeners.len();
        if remaining == 0 {
            clients.remove(job_id);
        }
        remaining
    }

    pub async fn listeners(&self, job_id: &str) -> usize {
        let clients = self.clients.read().await;
        clients.get(job_id).map_or(0, Vec::len)
    }

    pub async fn broadcast(&self, job_id: &str, event: JobEvent) {
        let clients = self.clients.read().await;
        if let Some(listeners) = clients.get(job_id) {
            for client in listeners {
                client.do_send(event.clone());
            }
        }
    }
}
