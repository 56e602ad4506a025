// Copyright (C) 2025 The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Watch a directory for file changes.
//!
//! Consumers receive discrete per-filename events through the [`AsyncDirWatcher`]
//! trait. The Linux implementation lives in [`inotify`].

use anyhow::Result;
use async_trait::async_trait;

/// Inotify based directory watcher.
pub mod inotify;

/// Kind of change reported for a file inside the watched directory.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WatchEventKind {
    /// A file was created. Its content may not be complete yet.
    Create,
    /// A file was written to.
    Modify,
    /// A file was deleted.
    Delete,
    /// A file was renamed out of the directory.
    MovedFrom,
    /// A file was renamed into the directory.
    MovedTo,
}

/// A single change to a named entry of the watched directory.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct WatchEvent {
    /// What happened to the entry.
    pub kind: WatchEventKind,
    /// Name of the entry relative to the watched directory.
    pub filename: String,
}

impl WatchEvent {
    /// Creates a new event for `filename`.
    pub fn new(kind: WatchEventKind, filename: impl Into<String>) -> Self {
        Self { kind, filename: filename.into() }
    }
}

/// Asynchronous directory watch operations.
#[async_trait]
pub trait AsyncDirWatcher: Send + Sync {
    /// Waits until the directory changes and returns the batch of events read.
    async fn read(&self) -> Result<Vec<WatchEvent>>;
}
