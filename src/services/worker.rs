use super::grouping::{GroupingOrchestrator, GroupingStatus, PassOutcome};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Queued,
    /// A pass is already pending; it will observe this change too.
    Coalesced,
    Stopped,
}

/// Background task that serializes grouping passes. Library change
/// notifications arriving while a pass is pending collapse into it.
pub struct GroupingWorker {
    orchestrator: Arc<GroupingOrchestrator>,
    requests: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl GroupingWorker {
    pub fn spawn(orchestrator: Arc<GroupingOrchestrator>, runtime: &Handle) -> Self {
        let (requests, mut pending) = mpsc::channel::<()>(1);
        let runner = orchestrator.clone();

        let handle = runtime.spawn(async move {
            while pending.recv().await.is_some() {
                let orchestrator = runner.clone();
                match tokio::task::spawn_blocking(move || orchestrator.run_pass()).await {
                    Ok(Ok(PassOutcome::Completed(summary))) => {
                        log::debug!(
                            "Worker pass finished with {} report(s)",
                            summary.reports.len()
                        );
                    }
                    Ok(Ok(PassOutcome::Coalesced)) => {}
                    Ok(Err(e)) => log::warn!("Worker pass failed: {}", e),
                    Err(e) => log::error!("Grouping pass panicked: {}", e),
                }
            }
            log::debug!("Grouping worker stopped");
        });

        Self {
            orchestrator,
            requests,
            handle,
        }
    }

    /// Signals that the external library changed.
    pub fn trigger(&self) -> TriggerOutcome {
        match self.requests.try_send(()) {
            Ok(()) => TriggerOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(())) => TriggerOutcome::Coalesced,
            Err(mpsc::error::TrySendError::Closed(())) => TriggerOutcome::Stopped,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GroupingStatus> {
        self.orchestrator.subscribe()
    }

    /// Stops accepting triggers and waits for queued passes to drain.
    pub async fn shutdown(self) {
        drop(self.requests);
        if let Err(e) = self.handle.await {
            log::error!("Grouping worker task failed: {}", e);
        }
    }
}
