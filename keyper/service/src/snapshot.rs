// This file is part of Gear.
//
// Copyright (C) 2025 Gear Technologies Inc.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Crash-safe persistence of the keyper state.

use anyhow::{Context, Result, anyhow};
use keyper_decider::KeyperState;
use keyper_observer::{MainChainObserver, ShutterObserver};
use parity_scale_codec::{Decode, DecodeAll, Encode};
use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

/// Everything needed to resume after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Snapshot {
    pub state: KeyperState,
    pub shutter: ShutterObserver,
    pub main_chain: MainChainObserver,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file means a fresh start.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read snapshot {}", self.path.display()));
            }
        };

        let snapshot = Snapshot::decode_all(&mut &bytes[..])
            .map_err(|err| anyhow!("corrupted snapshot {}: {err}", self.path.display()))?;

        Ok(Some(snapshot))
    }

    /// Write to a temporary file, sync it and rename it over the snapshot,
    /// so a crash leaves either the old or the new snapshot in place.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        file.write_all(&snapshot.encode())
            .and_then(|()| file.sync_all())
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        drop(file);

        fs::rename(&tmp, &self.path).with_context(|| {
            format!(
                "failed to move {} to {}",
                tmp.display(),
                self.path.display()
            )
        })?;

        tracing::trace!(path = %self.path.display(), "snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyper_common::{ShutterEvent, mock::batch_config};
    use keyper_observer::ShutterUpdate;

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.shutter.apply(ShutterUpdate {
            head: 3,
            events: vec![(
                2,
                ShutterEvent::BatchConfig(batch_config(0, 1, &[1, 2])).to_raw(),
            )],
        });
        snapshot
    }

    #[test]
    fn missing_file_is_a_fresh_start() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SnapshotStore::new(dir.path().join("state.bin"));
        assert_eq!(store.load().expect("readable"), None);
    }

    #[test]
    fn saved_snapshot_is_loaded_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SnapshotStore::new(dir.path().join("db").join("state.bin"));

        store.save(&Snapshot::default()).expect("writable");
        store.save(&snapshot()).expect("writable");

        assert_eq!(store.load().expect("readable"), Some(snapshot()));
        assert!(!dir.path().join("db").join("state.tmp").exists());
    }

    #[test]
    fn corrupted_snapshot_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.bin");
        fs::write(&path, [1, 2, 3]).expect("writable");

        let err = SnapshotStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("corrupted snapshot"));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.bin");
        let mut bytes = snapshot().encode();
        bytes.push(0);
        fs::write(&path, bytes).expect("writable");

        assert!(SnapshotStore::new(&path).load().is_err());
    }
}
