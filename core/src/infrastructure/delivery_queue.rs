// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Delivery Queue
//!
//! In-process job queue for [`DeliveryJob`]s: a bounded tokio mpsc channel
//! drained by one worker task that runs each job concurrently.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Background execution and delayed retry of delivery jobs
//!
//! Retries go through [`JobQueue::schedule_retry`]: they sleep in their own
//! task and re-enter the channel through a weak sender, so pending retries do
//! not keep the queue alive at shutdown. Once every [`DeliveryQueue`] handle
//! is dropped the worker drains in-flight jobs and exits.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender, WeakSender};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::application::delivery::{DeliveryOutcome, DeliveryService};
use crate::domain::delivery::{DeliveryJob, JobQueue, QueueError};

#[derive(Clone)]
pub struct DeliveryQueue {
    sender: Sender<DeliveryJob>,
}

impl DeliveryQueue {
    /// Queue handle plus the receiving end, for callers that run their own
    /// worker.
    pub fn channel(capacity: usize) -> (Self, Receiver<DeliveryJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Create the queue and spawn its worker.
    pub fn start(service: Arc<DeliveryService>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = Self::channel(capacity);
        let handle = spawn_worker(service, receiver, queue.sender.downgrade());
        (queue, handle)
    }
}

fn schedule(sender: WeakSender<DeliveryJob>, job: DeliveryJob, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(sender) = sender.upgrade() else {
            warn!(lead_id = %job.lead_id, channel = job.channel().as_str(), "Queue closed, dropping retry");
            return;
        };
        if sender.send(job).await.is_err() {
            warn!("Queue closed while scheduling retry");
        }
    });
}

#[async_trait]
impl JobQueue for DeliveryQueue {
    async fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError> {
        self.sender.send(job).await.map_err(|_| QueueError::Closed)
    }

    async fn schedule_retry(&self, job: DeliveryJob, delay: Duration) -> Result<(), QueueError> {
        if self.sender.is_closed() {
            return Err(QueueError::Closed);
        }
        schedule(self.sender.downgrade(), job, delay);
        Ok(())
    }
}

async fn process(service: Arc<DeliveryService>, retry: WeakSender<DeliveryJob>, job: DeliveryJob) {
    match service.run(&job).await {
        Ok(DeliveryOutcome::Retry(delay)) => {
            info!(
                lead_id = %job.lead_id,
                channel = job.channel().as_str(),
                retry = job.retries + 1,
                delay_secs = delay.as_secs(),
                "Scheduling delivery retry"
            );
            let Some(sender) = retry.upgrade() else {
                warn!(lead_id = %job.lead_id, channel = job.channel().as_str(), "Queue closed, dropping retry");
                return;
            };
            let queue = DeliveryQueue { sender };
            if let Err(e) = queue.schedule_retry(job.next_retry(), delay).await {
                warn!(lead_id = %job.lead_id, error = %e, "Failed to schedule delivery retry");
            }
        }
        Ok(outcome) => {
            debug!(lead_id = %job.lead_id, channel = job.channel().as_str(), outcome = ?outcome, "Delivery job finished");
        }
        Err(e) => {
            error!(
                lead_id = %job.lead_id,
                channel = job.channel().as_str(),
                error = %e,
                "Delivery job aborted by storage error"
            );
        }
    }
}

/// Start the background delivery worker.
pub fn spawn_worker(
    service: Arc<DeliveryService>,
    mut receiver: Receiver<DeliveryJob>,
    retry: WeakSender<DeliveryJob>,
) -> JoinHandle<()> {
    info!("Starting delivery worker");

    tokio::spawn(async move {
        let mut in_flight = JoinSet::new();
        let mut processed = 0u64;

        loop {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(job) => {
                        processed += 1;
                        in_flight.spawn(process(service.clone(), retry.clone(), job));
                    }
                    None => break,
                },
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "Delivery task panicked");
                    }
                }
            }
        }

        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Delivery task panicked");
            }
        }
        info!(processed, "Delivery queue closed, worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::delivery::DeliverySettings;
    use crate::application::notifications::EmailRenderer;
    use crate::domain::delivery::{JobKind, RetryPolicy};
    use crate::domain::lead::{Attribution, DeliveryChannel, DeliveryStatus, Lead};
    use crate::domain::repository::LeadRepository;
    use crate::infrastructure::mailer::InMemoryMailer;
    use crate::infrastructure::repositories::{
        InMemoryFormConfigurationRepository, InMemoryFormDefinitionRepository,
        InMemoryLeadRepository, InMemorySiteRepository,
    };
    use crate::infrastructure::webhook_client::HttpWebhookTransport;

    #[tokio::test]
    async fn test_enqueue_fails_when_worker_gone() {
        let (queue, receiver) = DeliveryQueue::channel(4);
        drop(receiver);
        let job = DeliveryJob::new(crate::domain::lead::LeadId::new(), JobKind::LeadWebhook, None);
        assert!(matches!(queue.enqueue(job.clone()).await, Err(QueueError::Closed)));
        assert!(matches!(
            queue.schedule_retry(job, Duration::from_secs(1)).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_failed_attempt_is_retried_through_queue() {
        let mut server = mockito::Server::new_async().await;
        let hook = server
            .mock("POST", "/leads")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let leads = Arc::new(InMemoryLeadRepository::new());
        let service = Arc::new(DeliveryService::new(
            leads.clone(),
            Arc::new(InMemorySiteRepository::new(Vec::new())),
            Arc::new(InMemoryFormDefinitionRepository::new()),
            Arc::new(InMemoryFormConfigurationRepository::new()),
            Arc::new(HttpWebhookTransport::new(Duration::from_secs(5)).unwrap()),
            Arc::new(InMemoryMailer::new()),
            EmailRenderer::new().unwrap(),
            DeliverySettings {
                lead_webhook_url: Some(format!("{}/leads", server.url())),
                allow_private_webhook_hosts: true,
                standard_policy: RetryPolicy {
                    max_retries: 1,
                    base_delay_secs: 0,
                    max_delay_secs: 0,
                },
                ..Default::default()
            },
        ));

        let lead = Lead::new(
            None,
            "Jane".into(),
            "jane@example.com".into(),
            String::new(),
            "Hi".into(),
            "contact".into(),
            Default::default(),
            None,
            Attribution::default(),
        );
        leads.insert(&lead).await.unwrap();

        let (queue, handle) = DeliveryQueue::start(service, 8);
        queue
            .enqueue(DeliveryJob::new(lead.id, JobKind::LeadWebhook, None))
            .await
            .unwrap();

        let mut state = None;
        for _ in 0..100 {
            let stored = leads.find_by_id(lead.id).await.unwrap().unwrap();
            let current = stored.delivery(DeliveryChannel::Webhook);
            if current.status == DeliveryStatus::Failed {
                state = Some(current);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        drop(queue);
        handle.await.unwrap();

        let state = state.expect("webhook should fail after its retry");
        assert_eq!(state.attempts, 2);
        assert_eq!(state.last_status_code, Some(503));
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_worker_runs_jobs_and_stops_when_dropped() {
        let leads = Arc::new(InMemoryLeadRepository::new());
        let mailer = Arc::new(InMemoryMailer::new());
        let service = Arc::new(DeliveryService::new(
            leads.clone(),
            Arc::new(InMemorySiteRepository::new(Vec::new())),
            Arc::new(InMemoryFormDefinitionRepository::new()),
            Arc::new(InMemoryFormConfigurationRepository::new()),
            Arc::new(HttpWebhookTransport::new(Duration::from_secs(1)).unwrap()),
            mailer.clone(),
            EmailRenderer::new().unwrap(),
            DeliverySettings {
                lead_notification_email: Some("staff@example.com".into()),
                ..Default::default()
            },
        ));

        let lead = Lead::new(
            None,
            "Jane".into(),
            "jane@example.com".into(),
            String::new(),
            "Hi".into(),
            "contact".into(),
            Default::default(),
            None,
            Attribution::default(),
        );
        leads.insert(&lead).await.unwrap();

        let (queue, handle) = DeliveryQueue::start(service, 8);
        queue
            .enqueue(DeliveryJob::new(lead.id, JobKind::LeadNotification { site_id: None }, None))
            .await
            .unwrap();
        queue
            .enqueue(DeliveryJob::new(lead.id, JobKind::LeadWebhook, None))
            .await
            .unwrap();
        drop(queue);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker should stop once the queue is dropped")
            .unwrap();

        assert_eq!(mailer.sent().len(), 1);
        let stored = leads.find_by_id(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.delivery(DeliveryChannel::Notification).status, DeliveryStatus::Sent);
        assert_eq!(stored.delivery(DeliveryChannel::Webhook).status, DeliveryStatus::Disabled);
    }
}
