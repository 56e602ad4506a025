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

//! Read directory change notifications through inotify
//!

use crate::{AsyncDirWatcher, WatchEvent, WatchEventKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, warn};
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, InotifyEvent, WatchDescriptor};
use std::io;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tokio::io::unix::AsyncFd;

fn watch_mask() -> AddWatchFlags {
    AddWatchFlags::IN_CREATE
        | AddWatchFlags::IN_MODIFY
        | AddWatchFlags::IN_DELETE
        | AddWatchFlags::IN_MOVED_FROM
        | AddWatchFlags::IN_MOVED_TO
}

/// Maps a raw inotify event to a [`WatchEvent`]. Events without a name refer to the
/// directory itself and are dropped.
fn to_watch_event(event: InotifyEvent) -> Option<WatchEvent> {
    let mask = event.mask;
    if mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
        warn!("inotify queue overflow, some policy updates were lost");
        return None;
    }
    let filename = event.name?.to_string_lossy().into_owned();
    let kind = if mask.contains(AddWatchFlags::IN_CREATE) {
        WatchEventKind::Create
    } else if mask.contains(AddWatchFlags::IN_DELETE) {
        WatchEventKind::Delete
    } else if mask.contains(AddWatchFlags::IN_MOVED_FROM) {
        WatchEventKind::MovedFrom
    } else if mask.contains(AddWatchFlags::IN_MOVED_TO) {
        WatchEventKind::MovedTo
    } else if mask.contains(AddWatchFlags::IN_MODIFY) {
        WatchEventKind::Modify
    } else {
        debug!("Ignoring inotify event {:?} for {}", mask, filename);
        return None;
    };
    Some(WatchEvent { kind, filename })
}

// AsyncFd needs AsRawFd on the wrapped value.
struct InotifyFd(Inotify);

impl AsRawFd for InotifyFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_fd().as_raw_fd()
    }
}

/// Asynchronous inotify watcher for a single directory.
///
/// The watch is registered on creation and removed when the watcher is dropped.
pub struct InotifyDirWatcher {
    afd: AsyncFd<InotifyFd>,
    wd: WatchDescriptor,
    path: PathBuf,
}

impl InotifyDirWatcher {
    /// Registers a watch on `path`. The directory must already exist.
    pub fn create(path: &Path) -> Result<Self> {
        let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)
            .context("Failed to initialize inotify")?;
        let wd = inotify
            .add_watch(path, watch_mask())
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        let afd = AsyncFd::new(InotifyFd(inotify))?;

        Ok(Self { afd, wd, path: path.to_path_buf() })
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AsyncDirWatcher for InotifyDirWatcher {
    async fn read(&self) -> Result<Vec<WatchEvent>> {
        loop {
            let mut guard = self.afd.readable().await?;

            if let Ok(result) =
                guard.try_io(|inner| inner.get_ref().0.read_events().map_err(io::Error::from))
            {
                let events = result.context("Failed to read inotify events")?;
                return Ok(events.into_iter().filter_map(to_watch_event).collect());
            }
        }
    }
}

impl Drop for InotifyDirWatcher {
    fn drop(&mut self) {
        if let Err(e) = self.afd.get_ref().0.rm_watch(self.wd) {
            error!("Failed to remove inotify watch on {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const READ_TIMEOUT: Duration = Duration::from_secs(5);

    async fn read_until(watcher: &InotifyDirWatcher, wanted: &WatchEvent) -> Vec<WatchEvent> {
        let mut seen = Vec::new();
        while !seen.contains(wanted) {
            let batch = tokio::time::timeout(READ_TIMEOUT, watcher.read())
                .await
                .expect("timed out waiting for inotify event")
                .expect("inotify read failed");
            seen.extend(batch);
        }
        seen
    }

    #[tokio::test]
    async fn reports_create_modify_and_delete() {
        let _ = env_logger::try_init();
        let dir = TempDir::new().unwrap();
        let watcher = InotifyDirWatcher::create(dir.path()).unwrap();
        assert_eq!(watcher.path(), dir.path());

        let file = dir.path().join("a.policy");
        fs::write(&file, "[a]\n").unwrap();
        let seen = read_until(&watcher, &WatchEvent::new(WatchEventKind::Modify, "a.policy")).await;
        assert_eq!(seen[0], WatchEvent::new(WatchEventKind::Create, "a.policy"));

        fs::remove_file(&file).unwrap();
        read_until(&watcher, &WatchEvent::new(WatchEventKind::Delete, "a.policy")).await;
    }

    #[tokio::test]
    async fn reports_renames_in_and_out() {
        let _ = env_logger::try_init();
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new_in(dir.path().parent().unwrap()).unwrap();
        let watcher = InotifyDirWatcher::create(dir.path()).unwrap();

        let staged = outside.path().join("b.policy");
        fs::write(&staged, "[b]\n").unwrap();
        fs::rename(&staged, dir.path().join("b.policy")).unwrap();
        read_until(&watcher, &WatchEvent::new(WatchEventKind::MovedTo, "b.policy")).await;

        fs::rename(dir.path().join("b.policy"), &staged).unwrap();
        read_until(&watcher, &WatchEvent::new(WatchEventKind::MovedFrom, "b.policy")).await;
    }

    #[test]
    fn create_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        // Constructing AsyncFd needs a runtime, but add_watch fails before that.
        assert!(InotifyDirWatcher::create(&missing).is_err());
    }
}
