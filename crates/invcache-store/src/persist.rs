//! Load and store the document through a held lock.

use invcache_config::{log_cache_debug, log_cache_info};
use invcache_lock::LockGuard;

use crate::document::{decode, render, DecodeError, InventoryDocument, META_KEY};
use crate::template::Template;
use crate::{Result, StoreError};

/// Outcome of [`load_or_default`]
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// The backing file decoded as-is
    Intact(InventoryDocument),
    /// The backing file was unreadable and has been replaced by the template
    Recovered(InventoryDocument),
}

impl Loaded {
    pub fn is_recovered(&self) -> bool {
        matches!(self, Loaded::Recovered(_))
    }

    pub fn into_document(self) -> InventoryDocument {
        match self {
            Loaded::Intact(document) | Loaded::Recovered(document) => document,
        }
    }
}

/// Read the document, replacing an unparseable file with the template.
///
/// Recovery is attempted once. A file that still does not decode after the
/// template was written is [`StoreError::RecoveryFailed`]. Well-formed JSON
/// with the wrong structure is never replaced.
pub fn load_or_default(guard: &LockGuard<'_>, template: &Template) -> Result<Loaded> {
    match decode(&guard.read_contents()?) {
        Ok(document) => return Ok(Loaded::Intact(document)),
        Err(DecodeError::Schema(e)) => {
            return Err(StoreError::InvalidDocument {
                path: guard.path().to_path_buf(),
                reason: e.to_string(),
            })
        }
        Err(DecodeError::Corrupt(e)) if e.is_eof() => {
            log_cache_debug!("Backing file empty, seeding default inventory");
        }
        Err(DecodeError::Corrupt(e)) => {
            log_cache_info!(
                "Backing file unparseable, replacing with default inventory",
                error = e.to_string()
            );
        }
    }

    guard.replace_contents(render(&template.document())?.as_bytes())?;
    match decode(&guard.read_contents()?) {
        Ok(document) => Ok(Loaded::Recovered(document)),
        Err(e) => Err(StoreError::RecoveryFailed {
            path: guard.path().to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// Write `document` and return what reading it back yields.
///
/// Structural invariants are restored first, and the rendered text must
/// decode back to the same document before anything is written, so a
/// document that cannot round-trip leaves the file as it was.
pub fn store(
    guard: &LockGuard<'_>,
    document: &mut InventoryDocument,
    template: &Template,
) -> Result<InventoryDocument> {
    document.enforce_invariants(template);
    if document.groups.contains_key(META_KEY) {
        return Err(StoreError::ReservedGroupName {
            name: META_KEY.to_string(),
        });
    }

    let text = render(document)?;
    match decode(&text) {
        Ok(rendered) if rendered == *document => {}
        Ok(_) => {
            return Err(StoreError::InvalidDocument {
                path: guard.path().to_path_buf(),
                reason: "rendered document does not decode to itself".to_string(),
            })
        }
        Err(e) => {
            return Err(StoreError::InvalidDocument {
                path: guard.path().to_path_buf(),
                reason: e.to_string(),
            })
        }
    }

    guard.replace_contents(text.as_bytes())?;
    decode(guard.read_contents()?).map_err(|e| StoreError::InvalidDocument {
        path: guard.path().to_path_buf(),
        reason: e.to_string(),
    })
}
