//! Progress reporting for UI collaborators.

use std::sync::Arc;

/// Callbacks invoked while a brew runs.
///
/// All methods default to doing nothing. Callbacks run on the coordinating
/// task and should return quickly.
pub trait ProgressHook: Send + Sync {
    /// A recipe started evaluating. `total` is the number of elements a
    /// foreach recipe has to run.
    fn on_start(&self, _name: &str, _total: Option<usize>) {}

    /// A foreach recipe finished another element.
    fn on_progress(&self, _name: &str, _done: usize, _total: usize) {}

    /// A recipe finished evaluating, or was found up to date.
    fn on_done(&self, _name: &str) {}
}

/// Fan-out over the installed hooks, plus the structured event stream.
#[derive(Clone, Default)]
pub(crate) struct Progress {
    hooks: Vec<Arc<dyn ProgressHook>>,
}

impl Progress {
    pub(crate) fn push(&mut self, hook: Arc<dyn ProgressHook>) {
        self.hooks.push(hook);
    }

    pub(crate) fn start(&self, name: &str, total: Option<usize>) {
        match total {
            Some(total) => simmer_events::emit_recipe_started!(name, total),
            None => simmer_events::emit_recipe_started!(name),
        }
        for hook in &self.hooks {
            hook.on_start(name, total);
        }
    }

    pub(crate) fn progress(&self, name: &str, done: usize, total: usize) {
        simmer_events::emit_recipe_progress!(name, done, total);
        for hook in &self.hooks {
            hook.on_progress(name, done, total);
        }
    }

    pub(crate) fn cached(&self, name: &str) {
        simmer_events::emit_recipe_cached!(name);
        for hook in &self.hooks {
            hook.on_done(name);
        }
    }

    pub(crate) fn done(&self, name: &str, success: bool, duration_ms: u64) {
        simmer_events::emit_recipe_completed!(name, success, duration_ms);
        if success {
            for hook in &self.hooks {
                hook.on_done(name);
            }
        }
    }
}
