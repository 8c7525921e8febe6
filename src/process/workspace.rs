//! Scoped exclusive access to the scene host.

use crate::host::{BodyActors, SceneHost};

/// The live scene, borrowed by one processing attempt.
///
/// Dropping the workspace removes every transient object and resets the
/// retained body actors, on success and failure alike.
pub struct Workspace<'h> {
    host: &'h mut dyn SceneHost,
    actors: BodyActors,
}

impl<'h> Workspace<'h> {
    pub fn acquire(host: &'h mut dyn SceneHost, actors: BodyActors) -> Self {
        Self { host, actors }
    }

    #[inline]
    pub fn host(&mut self) -> &mut dyn SceneHost {
        &mut *self.host
    }

    #[inline]
    pub fn actors(&self) -> BodyActors {
        self.actors
    }
}

impl Drop for Workspace<'_> {
    fn drop(&mut self) {
        match self.host.clear_transient(&self.actors) {
            Ok(()) => tracing::debug!("scene cleaned"),
            Err(e) => tracing::warn!("scene cleanup failed: {}", e),
        }
    }
}
