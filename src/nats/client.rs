use anyhow::{Context, Result};
use async_nats::Client;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::messages::RecordCommitMessage;
use crate::session::RecordCommitted;

pub struct NatsClient {
    client: Client,
    session_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, session_id })
    }

    /// Publish one record commit to `subject`
    pub async fn publish_commit(&self, subject: &str, commit: &RecordCommitted) -> Result<()> {
        let message = RecordCommitMessage::new(&self.session_id, commit);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .context("Failed to publish record commit")?;

        info!(
            "Published {:?} commit for record {} to {}",
            commit.kind, commit.record_id, subject
        );

        Ok(())
    }
}

/// Forwards session commits to NATS until the session goes away
pub struct CommitForwarder;

impl CommitForwarder {
    pub fn spawn(
        client: NatsClient,
        subject: String,
        mut commits: broadcast::Receiver<RecordCommitted>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match commits.recv().await {
                    Ok(commit) => {
                        if let Err(e) = client.publish_commit(&subject, &commit).await {
                            warn!("Dropping commit notification: {:#}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Commit forwarder lagged, {} commits skipped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            info!("Commit forwarder stopped");
        })
    }
}
