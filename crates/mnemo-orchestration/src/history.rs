//! Bounded per-project conversation history.
//!
//! Two tiers of bounding keep the map from growing without limit: a hard
//! cap on tracked projects (least-recently-used project evicted first) and
//! an idle-TTL sweep that drops projects with no recent activity. Access
//! times use the monotonic clock.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Messages retained per project.
    pub max_len: usize,
    /// Projects tracked before LRU eviction kicks in.
    pub max_projects: usize,
    /// Idle time after which a project's history is dropped.
    pub idle_ttl: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_len: 5,
            max_projects: 64,
            idle_ttl: Duration::from_secs(900),
        }
    }
}

#[derive(Debug)]
struct ProjectHistory {
    entries: VecDeque<String>,
    last_seen: Instant,
}

/// Map from project id to its bounded recent-message queue.
#[derive(Debug)]
pub struct RecentHistory {
    config: HistoryConfig,
    projects: Mutex<HashMap<String, ProjectHistory>>,
}

impl RecentHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            projects: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot a project's history oldest-first, refreshing its access
    /// time. Returns an empty vec for unknown projects.
    pub fn snapshot(&self, project_id: &str) -> Vec<String> {
        let mut projects = self.projects.lock().expect("history lock");
        match projects.get_mut(project_id) {
            Some(history) => {
                history.last_seen = Instant::now();
                history.entries.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Append one message to a project's history, enforcing all bounds.
    pub fn record(&self, project_id: &str, content: &str) {
        let now = Instant::now();
        let mut projects = self.projects.lock().expect("history lock");

        Self::sweep_locked(&mut projects, self.config.idle_ttl, now);

        let history = projects
            .entry(project_id.to_string())
            .or_insert_with(|| ProjectHistory {
                entries: VecDeque::with_capacity(self.config.max_len),
                last_seen: now,
            });
        history.last_seen = now;
        if history.entries.len() == self.config.max_len {
            history.entries.pop_front();
        }
        history.entries.push_back(content.to_string());

        // LRU eviction above the project cap. The entry just touched has
        // the freshest access time and is never the victim.
        while projects.len() > self.config.max_projects {
            let Some(victim) = projects
                .iter()
                .min_by_key(|(_, h)| h.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            projects.remove(&victim);
            debug!(project_id = %victim, "history.evict_lru");
        }
    }

    /// Drop projects idle longer than the configured TTL. Called from the
    /// orchestrator's idle tick in addition to the inline sweep on record.
    pub fn sweep_idle(&self) {
        let mut projects = self.projects.lock().expect("history lock");
        Self::sweep_locked(&mut projects, self.config.idle_ttl, Instant::now());
    }

    fn sweep_locked(
        projects: &mut HashMap<String, ProjectHistory>,
        idle_ttl: Duration,
        now: Instant,
    ) {
        projects.retain(|id, history| {
            let keep = now.duration_since(history.last_seen) < idle_ttl;
            if !keep {
                debug!(project_id = %id, "history.evict_idle");
            }
            keep
        });
    }

    pub fn tracked_projects(&self) -> usize {
        self.projects.lock().expect("history lock").len()
    }

    pub fn contains(&self, project_id: &str) -> bool {
        self.projects
            .lock()
            .expect("history lock")
            .contains_key(project_id)
    }
}
