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

//! # Reload Coordinator
//!
//! Applies directory watch events to the registry and keeps session bindings
//! in step. Every operation runs to completion and returns the configuration
//! pushes it caused, in the order they have to be delivered.

use crate::binder::{SessionBinder, SessionUpdate};
use crate::common::{Config, CreateReply, SessionId};
use crate::config::PolicyDirConfig;
use crate::error::{PolicyError, Result};
use crate::registry::PolicyRegistry;
use dirwatch::{WatchEvent, WatchEventKind};
use log::{debug, error, info};

/// Owns the policy registry and the session binder.
pub struct ReloadCoordinator {
    registry: PolicyRegistry,
    binder: SessionBinder,
}

impl ReloadCoordinator {
    /// Creates a coordinator with nothing loaded.
    pub fn new(config: PolicyDirConfig, default_config: Config) -> Self {
        Self { registry: PolicyRegistry::new(config), binder: SessionBinder::new(default_config) }
    }

    /// Creates the policy directory if needed and loads the policies in it.
    /// Returns the number of files loaded.
    pub fn start(&mut self) -> Result<usize> {
        self.registry.config().ensure_directory()?;
        Ok(self.registry.scan_directory())
    }

    /// The policy registry.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// The session binder.
    pub fn binder(&self) -> &SessionBinder {
        &self.binder
    }

    /// Handles one directory watch event.
    pub fn handle_event(&mut self, event: &WatchEvent) -> Vec<SessionUpdate> {
        debug!("event {:?} file {}", event.kind, event.filename);

        if !PolicyDirConfig::is_filename_valid(&event.filename) {
            return Vec::new();
        }

        match event.kind {
            // The file may still be incomplete, wait for the modify.
            WatchEventKind::Create => Vec::new(),
            WatchEventKind::Delete | WatchEventKind::MovedFrom => {
                self.unload_file(&event.filename)
            }
            WatchEventKind::Modify | WatchEventKind::MovedTo => self.reload_file(&event.filename),
        }
    }

    /// Removes `filename` and moves its sessions to the default configuration.
    ///
    /// A group of another file shadowed by the removed one may become visible,
    /// so unmatched sessions are rechecked as well.
    pub fn unload_file(&mut self, filename: &str) -> Vec<SessionUpdate> {
        if !self.registry.is_loaded(filename) {
            return Vec::new();
        }
        info!("Policy '{}' removed", filename);
        let mut updates = self.remove_file(filename);
        updates.extend(self.binder.recheck_unmatched(&mut self.registry));
        updates
    }

    fn remove_file(&mut self, filename: &str) -> Vec<SessionUpdate> {
        let removed = self.registry.remove_file(filename);
        self.binder.detach(removed)
    }

    /// Replaces `filename` with its current content on disk.
    ///
    /// The old groups are removed and their sessions detached before the new
    /// content is parsed, so no session ever sees both versions. Unmatched
    /// sessions are rechecked even when the new content fails to load, since
    /// the removal may have exposed a shadowed group.
    pub fn reload_file(&mut self, filename: &str) -> Vec<SessionUpdate> {
        let mut updates = self.remove_file(filename);

        info!("Policy update for '{}'", filename);
        if let Err(e) = self.registry.load_file(filename) {
            error!("Failed to load policy '{}': {}", filename, e);
        }
        updates.extend(self.binder.recheck_unmatched(&mut self.registry));
        updates
    }

    /// Completes the creation of `session` with the result of its identity
    /// resolution.
    pub fn complete_session(
        &mut self,
        session: SessionId,
        context: std::result::Result<Vec<u8>, PolicyError>,
    ) -> CreateReply {
        self.binder.attach(&mut self.registry, session, context)
    }

    /// Forgets `session`. Returns whether it was known.
    pub fn destroy_session(&mut self, session: SessionId) -> bool {
        self.binder.destroy_session(&mut self.registry, session)
    }

    /// Drops all sessions and unloads every policy file.
    pub fn shutdown(&mut self) {
        self.binder.clear(&mut self.registry);
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Bearer;
    use std::fs;
    use tempfile::TempDir;

    const APP_CONTEXT: &[u8] = b"unconfined_u:object_r:app_t:s0";
    const APP_POLICY: &str = "[app]\nselinux=unconfined_u:object_r:app_t:s0\n\
                              AllowedBearers=wifi ethernet\n";

    fn setup() -> (TempDir, ReloadCoordinator) {
        let _ = env_logger::try_init();
        let root = TempDir::new().unwrap();
        let config = PolicyDirConfig::with_root_path(root.path().to_path_buf());
        let mut coordinator = ReloadCoordinator::new(config, Config::default());
        coordinator.start().unwrap();
        (root, coordinator)
    }

    fn write_policy(coordinator: &ReloadCoordinator, name: &str, contents: &str) {
        fs::write(coordinator.registry().config().file_path(name), contents).unwrap();
    }

    fn event(kind: WatchEventKind, filename: &str) -> WatchEvent {
        WatchEvent::new(kind, filename)
    }

    #[test]
    fn start_creates_directory_and_scans() {
        let root = TempDir::new().unwrap();
        let config = PolicyDirConfig::with_root_path(root.path().to_path_buf());
        config.ensure_directory().unwrap();
        fs::write(config.file_path("app.policy"), APP_POLICY).unwrap();

        let mut coordinator = ReloadCoordinator::new(config, Config::default());
        assert_eq!(coordinator.start().unwrap(), 1);
        assert!(coordinator.registry().lookup("app_t").is_some());
    }

    #[test]
    fn create_event_is_ignored() {
        let (_root, mut coordinator) = setup();
        write_policy(&coordinator, "app.policy", APP_POLICY);
        assert!(coordinator.handle_event(&event(WatchEventKind::Create, "app.policy")).is_empty());
        assert!(!coordinator.registry().is_loaded("app.policy"));
    }

    #[test]
    fn invalid_filenames_are_ignored() {
        let (_root, mut coordinator) = setup();
        write_policy(&coordinator, ".app.policy", APP_POLICY);
        write_policy(&coordinator, "app.conf", APP_POLICY);
        coordinator.handle_event(&event(WatchEventKind::Modify, ".app.policy"));
        coordinator.handle_event(&event(WatchEventKind::MovedTo, "app.conf"));
        assert_eq!(coordinator.registry().file_count(), 0);
    }

    #[test]
    fn delete_of_unknown_file_is_noop() {
        let (_root, mut coordinator) = setup();
        assert!(coordinator.handle_event(&event(WatchEventKind::Delete, "x.policy")).is_empty());
    }

    #[test]
    fn policy_scenario_bind_then_delete() {
        let (_root, mut coordinator) = setup();
        write_policy(&coordinator, "app.policy", APP_POLICY);
        coordinator.handle_event(&event(WatchEventKind::Modify, "app.policy"));

        let reply = coordinator.complete_session(SessionId(1), Ok(APP_CONTEXT.to_vec()));
        assert!(reply.error.is_none());
        assert_eq!(reply.config.allowed_bearers, vec![Bearer::Wifi, Bearer::Ethernet]);

        let updates = coordinator.handle_event(&event(WatchEventKind::Delete, "app.policy"));
        let detached = SessionUpdate { session: SessionId(1), config: Config::default() };
        assert_eq!(updates, vec![detached]);
        assert!(!coordinator.registry().is_loaded("app.policy"));
    }

    #[test]
    fn moved_to_rebinds_waiting_session() {
        let (_root, mut coordinator) = setup();
        let reply = coordinator.complete_session(SessionId(3), Ok(APP_CONTEXT.to_vec()));
        assert_eq!(reply.config, Config::default());

        write_policy(&coordinator, "app.policy", APP_POLICY);
        let updates = coordinator.handle_event(&event(WatchEventKind::MovedTo, "app.policy"));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].session, SessionId(3));
        assert_eq!(updates[0].config.allowed_bearers, vec![Bearer::Wifi, Bearer::Ethernet]);
    }

    #[test]
    fn modify_detaches_before_rebinding() {
        let (_root, mut coordinator) = setup();
        write_policy(&coordinator, "app.policy", APP_POLICY);
        coordinator.handle_event(&event(WatchEventKind::Modify, "app.policy"));
        coordinator.complete_session(SessionId(1), Ok(APP_CONTEXT.to_vec()));
        let old_group = coordinator.binder().bound_group(SessionId(1)).unwrap();

        write_policy(&coordinator, "app.policy", "[app]\nselinux=app_t\nAllowedBearers=vpn\n");
        let updates = coordinator.handle_event(&event(WatchEventKind::Modify, "app.policy"));

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].config, Config::default());
        assert_eq!(updates[1].config.allowed_bearers, vec![Bearer::Vpn]);
        assert!(coordinator.registry().group(old_group).is_none());
        let new_group = coordinator.binder().bound_group(SessionId(1)).unwrap();
        assert_ne!(new_group, old_group);
        assert_eq!(
            coordinator.registry().group(new_group).unwrap().bound_sessions().collect::<Vec<_>>(),
            vec![SessionId(1)]
        );
    }

    #[test]
    fn broken_update_leaves_sessions_on_default() {
        let (_root, mut coordinator) = setup();
        write_policy(&coordinator, "app.policy", APP_POLICY);
        coordinator.handle_event(&event(WatchEventKind::Modify, "app.policy"));
        coordinator.complete_session(SessionId(1), Ok(APP_CONTEXT.to_vec()));

        write_policy(&coordinator, "app.policy", "[app]\nAllowedBearers=wifi\n");
        let updates = coordinator.handle_event(&event(WatchEventKind::Modify, "app.policy"));
        let detached = SessionUpdate { session: SessionId(1), config: Config::default() };
        assert_eq!(updates, vec![detached]);
        assert!(!coordinator.registry().is_loaded("app.policy"));
        assert_eq!(coordinator.registry().lookup("app_t"), None);
    }

    #[test]
    fn removing_file_detaches_every_bound_session() {
        let (_root, mut coordinator) = setup();
        write_policy(
            &coordinator,
            "multi.policy",
            "[a]\nselinux=a_t\nAllowedBearers=wifi\n[b]\nselinux=b_t\nAllowedBearers=vpn\n",
        );
        write_policy(&coordinator, "other.policy", "[c]\nselinux=c_t\n");
        coordinator.handle_event(&event(WatchEventKind::MovedTo, "multi.policy"));
        coordinator.handle_event(&event(WatchEventKind::MovedTo, "other.policy"));

        for (n, ty) in [(1, "a_t"), (2, "a_t"), (3, "b_t"), (4, "c_t")] {
            let context = format!("u:r:{}:s0", ty).into_bytes();
            coordinator.complete_session(SessionId(n), Ok(context));
        }

        let updates = coordinator.handle_event(&event(WatchEventKind::MovedFrom, "multi.policy"));
        let mut detached: Vec<_> = updates.iter().map(|u| u.session).collect();
        detached.sort();
        assert_eq!(detached, vec![SessionId(1), SessionId(2), SessionId(3)]);
        assert!(updates.iter().all(|u| u.config == Config::default()));

        let survivor = coordinator.registry().lookup("c_t").unwrap();
        let bound: Vec<_> =
            coordinator.registry().group(survivor).unwrap().bound_sessions().collect();
        assert_eq!(bound, vec![SessionId(4)]);
    }

    #[test]
    fn deleting_winner_rebinds_to_shadowed_group() {
        let (_root, mut coordinator) = setup();
        write_policy(&coordinator, "a.policy", "[a]\nselinux=app_t\nAllowedBearers=wifi\n");
        write_policy(&coordinator, "b.policy", "[b]\nselinux=app_t\nAllowedBearers=vpn\n");
        coordinator.handle_event(&event(WatchEventKind::Modify, "a.policy"));
        coordinator.handle_event(&event(WatchEventKind::Modify, "b.policy"));

        let reply = coordinator.complete_session(SessionId(1), Ok(APP_CONTEXT.to_vec()));
        assert_eq!(reply.config.allowed_bearers, vec![Bearer::Vpn]);

        let updates = coordinator.handle_event(&event(WatchEventKind::Delete, "b.policy"));
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].config, Config::default());
        assert_eq!(updates[1].config.allowed_bearers, vec![Bearer::Wifi]);
    }

    #[test]
    fn broken_winner_rebinds_to_shadowed_group() {
        let (_root, mut coordinator) = setup();
        write_policy(&coordinator, "a.policy", "[a]\nselinux=app_t\nAllowedBearers=wifi\n");
        write_policy(&coordinator, "b.policy", "[b]\nselinux=app_t\nAllowedBearers=vpn\n");
        coordinator.handle_event(&event(WatchEventKind::Modify, "a.policy"));
        coordinator.handle_event(&event(WatchEventKind::Modify, "b.policy"));
        coordinator.complete_session(SessionId(1), Ok(APP_CONTEXT.to_vec()));

        write_policy(&coordinator, "b.policy", "[b]\nAllowedBearers=vpn\n");
        let updates = coordinator.handle_event(&event(WatchEventKind::Modify, "b.policy"));
        assert!(!coordinator.registry().is_loaded("b.policy"));
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].config, Config::default());
        assert_eq!(updates[1].config.allowed_bearers, vec![Bearer::Wifi]);

        let winner = coordinator.registry().lookup("app_t");
        assert!(winner.is_some());
        assert_eq!(coordinator.binder().bound_group(SessionId(1)), winner);
    }

    #[test]
    fn shutdown_clears_state() {
        let (_root, mut coordinator) = setup();
        write_policy(&coordinator, "app.policy", APP_POLICY);
        coordinator.handle_event(&event(WatchEventKind::Modify, "app.policy"));
        coordinator.complete_session(SessionId(1), Ok(APP_CONTEXT.to_vec()));

        coordinator.shutdown();
        assert!(coordinator.binder().is_empty());
        assert_eq!(coordinator.registry().file_count(), 0);
        assert!(!coordinator.destroy_session(SessionId(1)));
    }
}
