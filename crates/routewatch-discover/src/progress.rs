//! Per-job progress fan-out.
//!
//! A job is registered when it is created and retired after its terminal
//! event. Each subscriber gets its own unbounded channel, so a slow reader
//! never holds up the scan and a dropped reader is simply pruned on the
//! next publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use routewatch_core::{ScanJobId, ScanProgress};

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<ScanProgress>,
}

/// Stream of progress events for one job.
///
/// Ends after the job's terminal event, or immediately if the job was
/// never registered or has already finished.
pub struct ProgressSubscription {
    pub job_id: ScanJobId,
    pub subscriber_id: u64,
    receiver: mpsc::UnboundedReceiver<ScanProgress>,
}

impl ProgressSubscription {
    pub async fn next(&mut self) -> Option<ScanProgress> {
        self.receiver.recv().await
    }

    /// Drain every remaining event, waiting for the stream to end.
    pub async fn collect(mut self) -> Vec<ScanProgress> {
        let mut events = Vec::new();
        while let Some(event) = self.receiver.recv().await {
            events.push(event);
        }
        events
    }
}

#[derive(Default)]
pub struct ProgressHub {
    jobs: Mutex<HashMap<ScanJobId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<ScanJobId, Vec<Subscriber>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the job's fan-out set. Called once when the job is created.
    pub fn register(&self, job_id: ScanJobId) {
        self.jobs().entry(job_id).or_default();
    }

    pub fn is_active(&self, job_id: &ScanJobId) -> bool {
        self.jobs().contains_key(job_id)
    }

    pub fn subscribe(&self, job_id: ScanJobId) -> ProgressSubscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let subscriber_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Unknown or finished job: `tx` drops here and the stream is closed.
        if let Some(subscribers) = self.jobs().get_mut(&job_id) {
            subscribers.push(Subscriber {
                id: subscriber_id,
                tx,
            });
        }

        ProgressSubscription {
            job_id,
            subscriber_id,
            receiver,
        }
    }

    pub fn unsubscribe(&self, job_id: &ScanJobId, subscriber_id: u64) {
        if let Some(subscribers) = self.jobs().get_mut(job_id) {
            subscribers.retain(|s| s.id != subscriber_id);
        }
    }

    /// Deliver `event` to every live subscriber of its job, in call order.
    ///
    /// A terminal event retires the job; its subscribers' streams end.
    pub fn publish(&self, event: &ScanProgress) {
        let mut jobs = self.jobs();
        let Some(subscribers) = jobs.get_mut(&event.job_id) else {
            return;
        };
        subscribers.retain(|s| s.tx.send(event.clone()).is_ok());

        if event.is_terminal() {
            jobs.remove(&event.job_id);
        }
    }

    pub fn subscriber_count(&self, job_id: &ScanJobId) -> usize {
        self.jobs().get(job_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub_with_job() -> (ProgressHub, ScanJobId) {
        let hub = ProgressHub::new();
        let job_id = ScanJobId::new();
        hub.register(job_id);
        (hub, job_id)
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_full_sequence() {
        let (hub, job) = hub_with_job();
        let a = hub.subscribe(job);
        let b = hub.subscribe(job);
        assert_ne!(a.subscriber_id, b.subscriber_id);

        hub.publish(&ScanProgress::probing(job, 0, 2, "10.0.0.1", 0));
        hub.publish(&ScanProgress::probing(job, 1, 2, "10.0.0.2", 1));
        hub.publish(&ScanProgress::completed(job, 2));

        for sub in [a, b] {
            let events = sub.collect().await;
            let addresses: Vec<_> = events.iter().map(|e| e.current_address.clone()).collect();
            assert_eq!(
                addresses,
                vec![Some("10.0.0.1".to_string()), Some("10.0.0.2".to_string()), None]
            );
            assert!(events.last().unwrap().is_terminal());
        }
        assert!(!hub.is_active(&job));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_pruned() {
        let (hub, job) = hub_with_job();
        let keep = hub.subscribe(job);
        let gone = hub.subscribe(job);
        assert_eq!(hub.subscriber_count(&job), 2);

        drop(gone);
        hub.publish(&ScanProgress::probing(job, 0, 1, "10.0.0.1", 0));
        assert_eq!(hub.subscriber_count(&job), 1);

        hub.publish(&ScanProgress::failed(job, 0, 0, "tunnel down"));
        let events = keep.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].error.as_deref(), Some("tunnel down"));
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_only_that_stream() {
        let (hub, job) = hub_with_job();
        let first = hub.subscribe(job);
        let second = hub.subscribe(job);

        hub.unsubscribe(&job, first.subscriber_id);
        hub.publish(&ScanProgress::completed(job, 0));

        assert!(first.collect().await.is_empty());
        assert_eq!(second.collect().await.len(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_closed_stream() {
        let (hub, job) = hub_with_job();
        hub.publish(&ScanProgress::completed(job, 0));

        let mut late = hub.subscribe(job);
        assert!(late.next().await.is_none());

        let mut unknown = hub.subscribe(ScanJobId::new());
        assert!(unknown.next().await.is_none());
    }

    #[test]
    fn test_publish_to_unknown_job_is_noop() {
        let hub = ProgressHub::new();
        hub.publish(&ScanProgress::completed(ScanJobId::new(), 0));
    }
}
