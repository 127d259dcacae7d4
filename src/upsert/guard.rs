use anyhow::Result;

use crate::store::{CommitError, SheetStore};

/// Decides what happens when a commit fails because another process holds the file.
///
/// Returning `Ok` means "try again", an error aborts the upsert.
pub trait ConflictResolver {
    fn resolve_conflict(&mut self, location: &str) -> Result<()>;
}

/// Commit the store, retrying as long as the target is locked and the resolver agrees.
pub fn commit(store: &mut impl SheetStore, resolver: &mut impl ConflictResolver) -> Result<()> {
    let mut attempt = 1;
    loop {
        match store.commit() {
            Ok(()) => return Ok(()),
            Err(CommitError::Locked { location }) => {
                log::warn!("{location} is opened by another process (attempt {attempt})");
                resolver.resolve_conflict(&location)?;
                attempt += 1;
            }
            Err(CommitError::Other(err)) => return Err(err),
        }
    }
}

/// Retries right away. Only useful if the lock goes away by itself, e.g. in tests.
#[derive(Debug, Default)]
pub struct RetryImmediately {
    pub conflicts: usize,
}

impl ConflictResolver for RetryImmediately {
    fn resolve_conflict(&mut self, _location: &str) -> Result<()> {
        self.conflicts += 1;
        Ok(())
    }
}
