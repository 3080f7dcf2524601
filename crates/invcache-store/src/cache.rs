//! The per-process cache handle.
//!
//! `InvCache` binds one resolved backing file. Every operation takes the
//! file's advisory lock, re-reads the document from disk, applies its rule
//! from [`crate::ops`], persists when it mutated, and releases the lock.
//! Nothing is cached between calls except the open descriptor.

use std::path::{Path, PathBuf};

use invcache_config::{log_cache_debug, log_cache_info, log_cache_warn, CacheLocation};
use invcache_lock::{LockMode, LockedFile};

use crate::document::{HostVars, InventoryDocument};
use crate::ops::HostEntry;
use crate::persist::{load_or_default, store};
use crate::template::{Template, LOCALHOST, RESERVED_KEYS};
use crate::{Result, StoreError};

/// Handle on one inventory cache file
#[derive(Debug)]
pub struct InvCache {
    path: PathBuf,
    template: Template,
    file: Option<LockedFile>,
}

impl InvCache {
    /// Bind to `location`, creating or repairing the backing file.
    ///
    /// A file holding valid JSON of another shape, or lacking localhost's
    /// reserved hostvars, belongs to an incompatible cache and is rejected.
    pub fn open(location: &CacheLocation) -> Result<Self> {
        let path = location.path();
        let mut cache = Self {
            template: Template::new(&path),
            path,
            file: None,
        };

        cache.with_lock(LockMode::Exclusive, |document, _| {
            let localhost = document.meta.hostvars.get(LOCALHOST).ok_or_else(|| {
                StoreError::IncompatibleCache {
                    path: location.path(),
                    reason: "no localhost hostvars".to_string(),
                }
            })?;
            if let Some(missing) = RESERVED_KEYS.iter().find(|k| !localhost.contains_key(**k)) {
                return Err(StoreError::IncompatibleCache {
                    path: location.path(),
                    reason: format!("localhost lacks reserved key '{}'", missing),
                });
            }
            Ok(())
        })?;

        log_cache_debug!("Cache opened", path = cache.path.display().to_string());
        Ok(cache)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Run `body` against the freshly loaded document under a `mode` lock.
    ///
    /// Exclusive scopes persist the document after `body` succeeds; shared
    /// scopes never write (except to recover an unreadable file). The lock is
    /// released on every path, and an error from `body` leaves the file as it
    /// was.
    pub fn with_lock<T, F>(&mut self, mode: LockMode, body: F) -> Result<T>
    where
        F: FnOnce(&mut InventoryDocument, &Template) -> Result<T>,
    {
        let file = ensure_open(&mut self.file, &self.path)?;
        let guard = file.lock(mode)?;

        let mut document = load_or_default(&guard, &self.template)?.into_document();
        let value = body(&mut document, &self.template)?;
        if mode.is_exclusive() {
            store(&guard, &mut document, &self.template)?;
        }
        Ok(value)
    }

    /// Look up `hostname`; `None` if it is unknown
    pub fn gethost(&mut self, hostname: &str) -> Result<Option<HostEntry>> {
        self.with_lock(LockMode::Shared, |document, _| Ok(document.get_host(hostname)))
    }

    /// Add `hostname`, replacing anything previously stored for it
    pub fn addhost(
        &mut self,
        hostname: &str,
        hostvars: Option<HostVars>,
        groups: Option<Vec<String>>,
    ) -> Result<HostEntry> {
        let entry = self.with_lock(LockMode::Exclusive, |document, template| {
            document.add_host(template, hostname, hostvars.unwrap_or_default(), groups)
        })?;
        log_cache_info!("Host added", hostname = hostname, groups = entry.groups.len());
        Ok(entry)
    }

    /// Merge into `hostname`, adding it if unknown
    pub fn updatehost(
        &mut self,
        hostname: &str,
        hostvars: Option<HostVars>,
        groups: Option<Vec<String>>,
    ) -> Result<HostEntry> {
        let entry = self.with_lock(LockMode::Exclusive, |document, template| {
            document.update_host(template, hostname, hostvars.unwrap_or_default(), groups)
        })?;
        log_cache_info!("Host updated", hostname = hostname, groups = entry.groups.len());
        Ok(entry)
    }

    /// Remove `hostname` and return what it held.
    ///
    /// Unless `keep_empty` is set, removing the last host other than
    /// localhost deletes the backing file; the handle stays bound to the path
    /// and the next call starts a fresh inventory.
    pub fn delhost(&mut self, hostname: &str, keep_empty: bool) -> Result<Option<HostEntry>> {
        let file = ensure_open(&mut self.file, &self.path)?;
        let guard = file.lock(LockMode::Exclusive)?;

        let mut document = load_or_default(&guard, &self.template)?.into_document();
        let removed = document.delete_host(hostname);
        let remaining = document.host_count();

        if !keep_empty && remaining == 0 {
            // Unlink while still holding the lock: waiters notice the path no
            // longer matches their descriptor and reopen a fresh file.
            remove_backing_file(&self.path);
            drop(guard);
            self.file = None;
            log_cache_info!("Last host removed, cache torn down", hostname = hostname);
        } else {
            store(&guard, &mut document, &self.template)?;
            log_cache_info!("Host deleted", hostname = hostname, remaining = remaining);
        }

        Ok(removed)
    }

    /// The whole inventory, as the automation runtime lists it
    pub fn list(&mut self) -> Result<InventoryDocument> {
        self.with_lock(LockMode::Shared, |document, _| Ok(document.clone()))
    }

    /// Close the backing file and delete it.
    ///
    /// Best effort: failures are logged, a missing file is fine. The handle
    /// stays usable and recreates the file on its next call.
    pub fn reset(&mut self) {
        match ensure_open(&mut self.file, &self.path) {
            Ok(file) => match file.lock(LockMode::Exclusive) {
                Ok(_guard) => remove_backing_file(&self.path),
                Err(e) => {
                    log_cache_warn!("Reset without lock", error = e.to_string());
                    remove_backing_file(&self.path);
                }
            },
            Err(e) => {
                log_cache_warn!("Reset without lock", error = e.to_string());
                remove_backing_file(&self.path);
            }
        }
        self.file = None;
    }
}

fn ensure_open<'a>(slot: &'a mut Option<LockedFile>, path: &Path) -> Result<&'a mut LockedFile> {
    let file = match slot.take() {
        Some(file) => file,
        None => LockedFile::open(path)?,
    };
    Ok(slot.insert(file))
}

fn remove_backing_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log_cache_debug!("Backing file removed", path = path.display().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log_cache_warn!(
            "Failed to remove backing file",
            path = path.display().to_string(),
            error = e.to_string()
        ),
    }
}
