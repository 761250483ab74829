use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Guards the one-live-session-per-subject invariant across controllers.
///
/// Cloned handles share the same underlying set, so every controller in a
/// process can be constructed over one registry.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the subject's session slot. Returns `None` while another live
    /// session holds it.
    pub fn claim(&self, subject_id: &str) -> Option<SubjectClaim> {
        let mut active = lock(&self.active);
        if !active.insert(subject_id.to_string()) {
            return None;
        }
        debug!(subject_id, "subject session slot claimed");
        Some(SubjectClaim {
            subject_id: subject_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, subject_id: &str) -> bool {
        lock(&self.active).contains(subject_id)
    }
}

fn lock(active: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the subject slot on drop.
#[derive(Debug)]
pub struct SubjectClaim {
    subject_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for SubjectClaim {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.subject_id);
        debug!(subject_id = %self.subject_id, "subject session slot released");
    }
}
