//! Many writers, one reader.
//!
//! Producers push through cloned [`CollectorSink`]s into an unbounded channel
//! that a single consumer task keeps emptying, so a write never waits on a
//! slow reader. [`Collector::drain`] queues a marker behind everything already
//! sent and gets the accumulated items back once the consumer reaches it.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

enum Message<T> {
    Item(T),
    Drain(oneshot::Sender<Vec<T>>),
}

pub struct Collector<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
    consumer: JoinHandle<()>,
}

pub struct CollectorSink<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
}

impl<T> Clone for CollectorSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> Collector<T> {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message<T>>();

        let consumer = tokio::spawn(async move {
            let mut items: Vec<T> = Vec::new();
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Item(item) => items.push(item),
                    Message::Drain(reply) => {
                        let _ = reply.send(items);
                        break;
                    }
                }
            }
            // drops the receiver, so later sends fail
        });

        Self { tx, consumer }
    }

    pub fn sink(&self) -> CollectorSink<T> {
        CollectorSink {
            tx: self.tx.clone(),
        }
    }

    /// Returns every item sent before this call.
    pub async fn drain(self) -> Vec<T> {
        let (reply_tx, reply_rx) = oneshot::channel::<Vec<T>>();
        if self.tx.send(Message::Drain(reply_tx)).is_err() {
            warn!("collector consumer stopped before drain");
            return Vec::new();
        }
        let items: Vec<T> = reply_rx.await.unwrap_or_default();
        if let Err(e) = self.consumer.await {
            warn!("collector consumer failed: {e}");
        }
        items
    }
}

impl<T: Send + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CollectorSink<T> {
    /// `false` once the collector has been drained.
    pub fn send(&self, item: T) -> bool {
        self.tx.send(Message::Item(item)).is_ok()
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
