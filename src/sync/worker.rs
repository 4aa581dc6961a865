//! Background sync worker
//!
//! One tokio task owns the event loop: lifecycle events are handled in the
//! order they arrive and armed timers (periodic push, resume pull) fire from
//! the same loop. Only a background pull prompt outlives its event: the
//! question waits on its own task so the loop keeps serving events.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::lifecycle::LifecycleEvent;
use super::orchestrator::SyncOrchestrator;
use crate::error::{Result, SyncError};

/// Commands for the sync worker
#[derive(Debug)]
pub enum SyncCommand {
    /// Forward a lifecycle event
    Event(LifecycleEvent),
    /// Switch auto sync on/off
    SetAutoSync(bool),
    /// Drop armed timers and stop the loop
    Stop,
}

/// Background sync worker
pub struct SyncWorker {
    sender: mpsc::Sender<SyncCommand>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Spawn the event loop for `orchestrator`
    pub fn start(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<SyncCommand>(100);

        let handle = tokio::spawn(async move {
            loop {
                let deadline = orchestrator.next_deadline();

                tokio::select! {
                    cmd = receiver.recv() => {
                        match cmd {
                            Some(SyncCommand::Event(event)) => {
                                let outcome = orchestrator.handle_event(event).await;
                                tracing::debug!("{:?} -> {:?}", event, outcome);
                            }
                            Some(SyncCommand::SetAutoSync(enabled)) => {
                                orchestrator.set_auto_sync(enabled);
                            }
                            Some(SyncCommand::Stop) | None => {
                                orchestrator.shutdown();
                                break;
                            }
                        }
                    }
                    _ = wait_for(deadline) => {
                        for outcome in orchestrator.run_due_timers().await {
                            tracing::debug!("Timer -> {:?}", outcome);
                        }
                    }
                }
            }

            tracing::info!("Sync worker stopped");
        });

        Self { sender, handle }
    }

    /// Forward a lifecycle event
    pub async fn send(&self, event: LifecycleEvent) -> Result<()> {
        self.command(SyncCommand::Event(event)).await
    }

    /// Switch auto sync on/off
    pub async fn set_auto_sync(&self, enabled: bool) -> Result<()> {
        self.command(SyncCommand::SetAutoSync(enabled)).await
    }

    /// Stop the worker and wait for the loop to exit
    pub async fn stop(self) -> Result<()> {
        self.command(SyncCommand::Stop).await?;
        self.handle
            .await
            .map_err(|e| SyncError::Internal(format!("Sync worker panicked: {}", e)))
    }

    async fn command(&self, cmd: SyncCommand) -> Result<()> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| SyncError::Internal("Worker channel closed".to_string()))
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
