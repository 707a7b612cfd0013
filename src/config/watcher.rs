//! Rules file watcher for cache invalidation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use notify::{Watcher, RecursiveMode, Event, RecommendedWatcher, Config};
use crate::rules::RuleCache;

/// Which cache a watched file feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watched {
    Rules,
    Exceptions,
}

/// A watcher that clears the rule cache when its source files change.
pub struct RulesWatcher {
    files: Vec<(PathBuf, Watched)>,
    cache: Arc<RuleCache>,
}

impl RulesWatcher {
    /// Create a new RulesWatcher for the given rule and exception files.
    pub fn new(
        rules_location: Option<&Path>,
        exceptions_location: Option<&Path>,
        cache: Arc<RuleCache>,
    ) -> Self {
        let files = rules_location
            .map(|p| (p.to_path_buf(), Watched::Rules))
            .into_iter()
            .chain(exceptions_location.map(|p| (p.to_path_buf(), Watched::Exceptions)))
            .collect();

        Self { files, cache }
    }

    /// Start watching the files in a background thread.
    ///
    /// The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let files = self.files.clone();
        let cache = self.cache.clone();

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        for kind in affected(&files, &event.paths) {
                            tracing::info!(kind = ?kind, paths = ?event.paths, "Rule source change detected, clearing cache");
                            match kind {
                                Watched::Rules => cache.clear(),
                                Watched::Exceptions => cache.clear_exceptions(),
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        for (path, _) in &self.files {
            // Editors often replace files, so the parent directory is watched.
            let target = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(path.as_path());
            watcher.watch(target, RecursiveMode::NonRecursive)?;
            tracing::info!(path = ?path, "Rules watcher started");
        }

        Ok(watcher)
    }
}

/// Distinct cache kinds touched by the changed paths.
fn affected(files: &[(PathBuf, Watched)], changed: &[PathBuf]) -> Vec<Watched> {
    let mut kinds = Vec::new();
    for (path, kind) in files {
        // The parent directory is watched non-recursively, so the file name identifies the file.
        let hit = changed.iter().any(|c| c.file_name().is_some() && c.file_name() == path.file_name());
        if hit && !kinds.contains(kind) {
            kinds.push(*kind);
        }
    }
    kinds
}
