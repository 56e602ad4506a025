// Copyright (C) 2025 The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::binder::SessionUpdate;
use crate::common::{CreateReply, IdentityResolver, SessionId, SessionPolicy, SessionRuntime};
use crate::config::PolicyDirConfig;
use crate::coordinator::ReloadCoordinator;
use crate::error::PolicyError;
use anyhow::Result;
use dirwatch::inotify::InotifyDirWatcher;
use dirwatch::{AsyncDirWatcher, WatchEvent};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Event sent to the SessionPolicyTask, either by the public handle or by the
/// asynchronous operations it started. Creations and destructions are requests
/// that must never be lost, so the channel is unbounded.
enum PolicyServiceEvent {
    Create { session: SessionId, reply: oneshot::Sender<CreateReply> },
    Destroy(SessionId),
    IdentityResolved {
        session: SessionId,
        ticket: u64,
        context: std::result::Result<Vec<u8>, PolicyError>,
    },
    ConfigPushRejected { session: SessionId, reason: anyhow::Error },
    Shutdown,
}

/// A creation waiting for its identity resolution.
struct PendingCreate {
    /// Tells a late completion of an earlier creation of the same session apart.
    ticket: u64,
    reply: oneshot::Sender<CreateReply>,
}

/// Internal service owning all policy state. Every mutation happens on this task.
struct SessionPolicyTask {
    watcher: Arc<dyn AsyncDirWatcher>,
    event_receiver: mpsc::UnboundedReceiver<PolicyServiceEvent>,
    /// Handed to spawned operations so their results come back here. Weak so the
    /// task still stops once every handle is gone.
    event_sender: mpsc::WeakUnboundedSender<PolicyServiceEvent>,
    update_sender: mpsc::UnboundedSender<SessionUpdate>,
    session_runtime: Arc<dyn SessionRuntime>,
    resolver: Arc<dyn IdentityResolver>,
    coordinator: ReloadCoordinator,
    pending: HashMap<SessionId, PendingCreate>,
    next_ticket: u64,
}

impl SessionPolicyTask {
    /// Handles a batch of directory events.
    fn handle_watch_result(&mut self, watch_result: Result<Vec<WatchEvent>>) {
        match watch_result {
            Ok(events) => {
                for event in events {
                    let updates = self.coordinator.handle_event(&event);
                    self.push_updates(updates);
                }
            }
            Err(e) => {
                error!("Error reading policy directory events: {:#}", e);
            }
        }
    }

    /// Queues configuration pushes. They are delivered in order by the push worker.
    fn push_updates(&self, updates: Vec<SessionUpdate>) {
        for update in updates {
            debug!("Pushing configuration to session {}", update.session);
            if self.update_sender.send(update).is_err() {
                error!("Configuration push worker is gone.");
            }
        }
    }

    fn start_create(&mut self, session: SessionId, reply: oneshot::Sender<CreateReply>) {
        let Some(owner) = self.session_runtime.get_owner(session) else {
            let error = PolicyError::UnknownOwner(session);
            let result = self.coordinator.complete_session(session, Err(error));
            let _ = reply.send(result);
            return;
        };
        let Some(sender) = self.event_sender.upgrade() else {
            error!("Event channel closed, dropping creation of session {}", session);
            return;
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        if self.pending.insert(session, PendingCreate { ticket, reply }).is_some() {
            debug!("session {} created again while resolving", session);
        }

        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let context = resolver
                .resolve(&owner)
                .await
                .map_err(|e| PolicyError::IdentityResolution(format!("{:#}", e)));
            let event = PolicyServiceEvent::IdentityResolved { session, ticket, context };
            if sender.send(event).is_err() {
                debug!("Identity of session {} resolved after shutdown", session);
            }
        });
    }

    fn finish_create(
        &mut self,
        session: SessionId,
        ticket: u64,
        context: std::result::Result<Vec<u8>, PolicyError>,
    ) {
        match self.pending.remove(&session) {
            Some(pending) if pending.ticket == ticket => {
                let result = self.coordinator.complete_session(session, context);
                if pending.reply.send(result).is_err() {
                    debug!("Creator of session {} stopped waiting", session);
                }
            }
            Some(pending) => {
                self.pending.insert(session, pending);
            }
            None => {
                debug!("session {} went away before its identity was resolved", session);
            }
        }
    }

    /// Handles a received service event. Returns true if the service should continue running.
    fn handle_service_event(&mut self, service_event: PolicyServiceEvent) -> bool {
        match service_event {
            PolicyServiceEvent::Create { session, reply } => {
                self.start_create(session, reply);
            }
            PolicyServiceEvent::Destroy(session) => {
                self.pending.remove(&session);
                self.coordinator.destroy_session(session);
            }
            PolicyServiceEvent::IdentityResolved { session, ticket, context } => {
                self.finish_create(session, ticket, context);
            }
            PolicyServiceEvent::ConfigPushRejected { session, reason } => {
                error!("{}: {:#}", PolicyError::ConfigPushRejected(session), reason);
                if self.coordinator.destroy_session(session) {
                    self.session_runtime.destroy(session);
                }
            }
            PolicyServiceEvent::Shutdown => {
                return false; // Signal to stop the loop
            }
        }
        true // Keep running
    }

    /// Runs the event loop.
    async fn run(mut self) {
        info!("SessionPolicyTask started.");
        loop {
            tokio::select! {
                watch_result = self.watcher.read() => {
                    self.handle_watch_result(watch_result);
                }
                service_event = self.event_receiver.recv() => {
                    let Some(service_event) = service_event else {
                        info!("Event channel closed. Shutting down.");
                        break;
                    };
                    if !self.handle_service_event(service_event) {
                        info!("Shutdown event received.");
                        break;
                    }
                }
            }
        }
        self.coordinator.shutdown();
    }
}

/// Delivers configuration pushes one at a time, in the order they were queued.
async fn run_push_worker(
    session_runtime: Arc<dyn SessionRuntime>,
    mut updates: mpsc::UnboundedReceiver<SessionUpdate>,
    events: mpsc::WeakUnboundedSender<PolicyServiceEvent>,
) {
    while let Some(SessionUpdate { session, config }) = updates.recv().await {
        let Err(reason) = session_runtime.config_update(session, &config).await else {
            continue;
        };
        let Some(sender) = events.upgrade() else {
            break;
        };
        if sender.send(PolicyServiceEvent::ConfigPushRejected { session, reason }).is_err() {
            break;
        }
    }
}

/// Local file based session policy. Implements [`SessionPolicy`] for the host
/// and forwards every request to the SessionPolicyTask.
pub struct SessionPolicyLocal {
    event_sender: mpsc::UnboundedSender<PolicyServiceEvent>,
    service_task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SessionPolicyLocal {
    /// Creates the policy directory if needed, watches it with inotify and loads
    /// the policies in it. Must be called from within a Tokio runtime.
    pub fn new(
        config: PolicyDirConfig,
        session_runtime: Arc<dyn SessionRuntime>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self> {
        config.ensure_directory()?;
        let watcher = InotifyDirWatcher::create(config.policy_dir())?;
        Self::with_watcher(config, Arc::new(watcher), session_runtime, resolver)
    }

    /// Same as [`SessionPolicyLocal::new`] with a caller supplied watcher for the
    /// policy directory.
    pub fn with_watcher(
        config: PolicyDirConfig,
        watcher: Arc<dyn AsyncDirWatcher>,
        session_runtime: Arc<dyn SessionRuntime>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self> {
        let mut coordinator =
            ReloadCoordinator::new(config, session_runtime.create_default_config());
        coordinator.start()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_push_worker(session_runtime.clone(), update_rx, tx.downgrade()));

        let service = SessionPolicyTask {
            watcher,
            event_receiver: rx,
            event_sender: tx.downgrade(),
            update_sender: update_tx,
            session_runtime,
            resolver,
            coordinator,
            pending: HashMap::new(),
            next_ticket: 0,
        };
        let service_task_handle = tokio::spawn(service.run());

        Ok(Self { event_sender: tx, service_task_handle: Some(service_task_handle) })
    }

    fn send_event(&mut self, event: PolicyServiceEvent) {
        if self.event_sender.send(event).is_err() {
            error!("Event channel closed. Service might have crashed.");
        }
    }
}

impl SessionPolicy for SessionPolicyLocal {
    fn create(&mut self, session: SessionId) -> oneshot::Receiver<CreateReply> {
        let (reply, receiver) = oneshot::channel();
        self.send_event(PolicyServiceEvent::Create { session, reply });
        receiver
    }

    fn destroy(&mut self, session: SessionId) {
        self.send_event(PolicyServiceEvent::Destroy(session));
    }
}

impl Drop for SessionPolicyLocal {
    fn drop(&mut self) {
        info!("SessionPolicyLocal dropping. Shutting down SessionPolicyTask.");

        if self.event_sender.send(PolicyServiceEvent::Shutdown).is_err() {
            error!("Failed to send shutdown signal to SessionPolicyTask or channel already closed.");
        }

        if let Some(_handle) = self.service_task_handle.take() {
            info!("SessionPolicyTask shutdown initiated. The task will be managed by the Tokio runtime.");
        }
    }
}
