// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
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

//! Backup-then-overwrite file replacement.
//!
//! Installing a certificate never creates files: the chain and key must
//! already exist at their target paths. The previous content is copied to
//! `<path>.bak` (replacing an older backup) before the new content is
//! written. The two steps are not atomic; after a crash in between, the
//! previous content can be recovered from the backup by hand.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{RenewError, Result};

/// Permission bits of an installed certificate chain.
pub const CHAIN_MODE: u32 = 0o644;

/// Permission bits of an installed private key.
pub const KEY_MODE: u32 = 0o600;

/// Suffix appended to the backup copy.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Path of the backup copy for `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Copy `path` to its backup location.
///
/// Fails with [`RenewError::Backup`] if `path` does not exist.
pub async fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup = backup_path(path);
    tokio::fs::copy(path, &backup)
        .await
        .map_err(|e| RenewError::backup(path, e))?;
    Ok(backup)
}

/// Back up `path`, then overwrite it with `content` and set `mode`.
///
/// `mode` is applied on Unix only.
pub async fn replace(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let backup = backup_file(path).await?;
    debug!(path = %path.display(), backup = %backup.display(), "backup written");

    write_with_mode(path, content, mode)
        .await
        .map_err(|e| RenewError::write(path, e))?;

    debug!(path = %path.display(), bytes = content.len(), "file replaced");
    Ok(())
}

async fn write_with_mode(path: &Path, content: &[u8], mode: u32) -> std::io::Result<()> {
    let mut file = open_with_mode(path, mode).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
}

/// Open an existing file truncated, with its permissions already set to
/// `mode`.
async fn open_with_mode(path: &Path, mode: u32) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    let file = options.open(path).await?;

    // open() only applies the mode to newly created files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(mode))
            .await?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(file)
}
