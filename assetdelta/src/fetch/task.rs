//! Download task construction.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::error::{FetchError, FetchResult};
use super::state::TaskOutcome;

/// One object to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    /// Normalized relative object id (forward slashes).
    pub object_id: String,
    /// Fully resolved source URL.
    pub url: String,
    /// Final destination, always inside the destination root.
    pub destination: PathBuf,
}

impl FetchTask {
    /// Build a task for `object_id` served under `base_url`.
    ///
    /// Rejects ids that are absolute, carry a drive prefix or contain `..`;
    /// `.` and empty segments are dropped.
    pub fn new(object_id: &str, base_url: &str, dest_root: &Path) -> FetchResult<Self> {
        let segments = normalize_object_id(object_id)?;
        let relative = segments.join("/");

        let mut destination = dest_root.to_path_buf();
        destination.extend(&segments);

        Ok(Self {
            url: format!("{}/{}", base_url.trim_end_matches('/'), relative),
            object_id: relative,
            destination,
        })
    }

    /// Build tasks for a batch of ids, failing on the first invalid one.
    pub fn batch<I, S>(ids: I, base_url: &str, dest_root: &Path) -> FetchResult<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .map(|id| Self::new(id.as_ref(), base_url, dest_root))
            .collect()
    }

    /// Build tasks for a batch of ids, setting aside the invalid ones.
    pub fn partition<I, S>(ids: I, base_url: &str, dest_root: &Path) -> TaskBatch
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batch = TaskBatch::default();
        for id in ids {
            let id = id.as_ref();
            match Self::new(id, base_url, dest_root) {
                Ok(task) => batch.tasks.push(task),
                Err(e) => batch.rejected.push((id.to_string(), e)),
            }
        }
        batch
    }
}

/// Tasks ready to run plus the ids that could not become tasks.
#[derive(Debug, Default)]
pub struct TaskBatch {
    pub tasks: Vec<FetchTask>,
    pub rejected: Vec<(String, FetchError)>,
}

impl TaskBatch {
    /// Append another batch.
    pub fn extend(&mut self, other: TaskBatch) {
        self.tasks.extend(other.tasks);
        self.rejected.extend(other.rejected);
    }

    /// Keep only the tasks and rejections whose id is listed.
    pub fn retain_listed(&mut self, listed: &HashSet<String>) {
        self.tasks.retain(|t| listed.contains(&t.object_id));
        self.rejected.retain(|(id, _)| listed.contains(id));
    }

    /// Number of ids in the batch, valid or not.
    pub fn len(&self) -> usize {
        self.tasks.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejected ids as terminal failures that never reached the network.
    pub fn rejected_outcomes(&self) -> Vec<(String, TaskOutcome)> {
        self.rejected
            .iter()
            .map(|(id, e)| {
                (
                    id.clone(),
                    TaskOutcome::Failed {
                        reason: e.to_string(),
                        attempts: 0,
                    },
                )
            })
            .collect()
    }
}

/// Split an object id into safe path segments.
fn normalize_object_id(id: &str) -> FetchResult<Vec<&str>> {
    let invalid = |reason: &str| FetchError::InvalidObjectId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.starts_with('/') || id.starts_with('\\') {
        return Err(invalid("absolute path"));
    }

    let segments: Vec<&str> = id
        .split(&['/', '\\'][..])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if let Some(first) = segments.first() {
        if first.len() >= 2 && first.as_bytes()[1] == b':' {
            return Err(invalid("drive prefix"));
        }
    }
    if segments.iter().any(|s| *s == "..") {
        return Err(invalid("parent directory reference"));
    }
    if segments.is_empty() {
        return Err(invalid("empty path"));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_resolves_url_and_destination() {
        let task = FetchTask::new(
            "assets/audio/bgm.acb",
            "https://cdn.example.com/v1/",
            Path::new("/work/raw"),
        )
        .unwrap();

        assert_eq!(task.url, "https://cdn.example.com/v1/assets/audio/bgm.acb");
        assert_eq!(
            task.destination,
            PathBuf::from("/work/raw/assets/audio/bgm.acb")
        );
    }

    #[test]
    fn test_task_normalizes_dot_and_empty_segments() {
        let task = FetchTask::new("./a//b/./c.bin", "https://h", Path::new("/d")).unwrap();
        assert_eq!(task.object_id, "a/b/c.bin");
        assert_eq!(task.url, "https://h/a/b/c.bin");
    }

    #[test]
    fn test_task_rejects_traversal() {
        for id in ["../etc/passwd", "a/../../b", "/abs/path", "C:/win", "\\\\share\\x", ""] {
            let result = FetchTask::new(id, "https://h", Path::new("/d"));
            assert!(
                matches!(result, Err(FetchError::InvalidObjectId { .. })),
                "{} should be rejected",
                id
            );
        }
    }

    #[test]
    fn test_batch_stops_on_invalid_id() {
        let ok = FetchTask::batch(["a", "b/c"], "https://h", Path::new("/d")).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(FetchTask::batch(["a", ".."], "https://h", Path::new("/d")).is_err());
    }

    #[test]
    fn test_partition_sets_aside_invalid_ids() {
        let batch = FetchTask::partition(["a", "../evil", "b/c"], "https://h", Path::new("/d"));

        let ids: Vec<_> = batch.tasks.iter().map(|t| t.object_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b/c"]);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].0, "../evil");
        assert_eq!(batch.len(), 3);

        let outcomes = batch.rejected_outcomes();
        assert!(matches!(
            outcomes[0].1,
            TaskOutcome::Failed { attempts: 0, .. }
        ));
    }

    #[test]
    fn test_retain_listed_filters_tasks_and_rejections() {
        let mut batch =
            FetchTask::partition(["a", "b", "../x", "../y"], "https://h", Path::new("/d"));
        let listed: HashSet<String> = ["b", "../y"].iter().map(|s| s.to_string()).collect();

        batch.retain_listed(&listed);

        assert_eq!(batch.tasks.len(), 1);
        assert_eq!(batch.tasks[0].object_id, "b");
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].0, "../y");
    }
}
