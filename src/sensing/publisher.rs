use std::sync::Arc;

use tokio::sync::{mpsc, watch};

enum Target<T> {
    Queue(mpsc::UnboundedSender<T>),
    Latest(Arc<watch::Sender<Option<T>>>),
}

/// Handle native callbacks use to hand samples to the core. Publishing never
/// blocks and may happen from any thread.
pub struct SamplePublisher<T> {
    target: Target<T>,
}

impl<T> Clone for SamplePublisher<T> {
    fn clone(&self) -> Self {
        let target = match &self.target {
            Target::Queue(sender) => Target::Queue(sender.clone()),
            Target::Latest(sender) => Target::Latest(Arc::clone(sender)),
        };
        Self { target }
    }
}

impl<T> SamplePublisher<T> {
    /// Every sample is queued for the consumer.
    pub fn queue() -> (Self, mpsc::UnboundedReceiver<T>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                target: Target::Queue(sender),
            },
            receiver,
        )
    }

    /// Only the most recent sample is kept.
    pub fn latest() -> (Self, watch::Receiver<Option<T>>) {
        let (sender, receiver) = watch::channel(None);
        (
            Self {
                target: Target::Latest(Arc::new(sender)),
            },
            receiver,
        )
    }

    /// Returns false once the consumer is gone.
    pub fn publish(&self, sample: T) -> bool {
        match &self.target {
            Target::Queue(sender) => sender.send(sample).is_ok(),
            Target::Latest(sender) => {
                sender.send_replace(Some(sample));
                !sender.is_closed()
            }
        }
    }

    /// Forgets the cached sample. No effect on queue publishers.
    pub fn clear(&self) {
        if let Target::Latest(sender) = &self.target {
            sender.send_replace(None);
        }
    }
}
