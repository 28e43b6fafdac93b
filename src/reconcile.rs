//! Local/remote file set reconciliation.
//!
//! A pure set difference keyed on relative path: no content hashing and no
//! rename detection, so a moved file shows up as one removal plus one
//! addition.

use std::collections::HashSet;

use crate::models::{FileRecord, FileSet};

/// The add/remove operations that make the remote file set match the local
/// folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Local paths with no remote record, in scan order.
    pub to_add: Vec<String>,
    /// Remote records with no local file, in the file set's stored order.
    pub to_remove: Vec<FileRecord>,
    /// Paths present on both sides.
    pub unchanged: usize,
}

impl ReconciliationPlan {
    /// Nothing to add and nothing to remove.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Remote ids scheduled for removal.
    pub fn removed_ids(&self) -> Vec<&str> {
        self.to_remove.iter().map(|r| r.file_id.as_str()).collect()
    }
}

/// Compare the freshly scanned `local_paths` against the recorded `remote`
/// file set.
///
/// Duplicate local paths are counted once.
pub fn reconcile<S: AsRef<str>>(local_paths: &[S], remote: &FileSet) -> ReconciliationPlan {
    let mut seen: HashSet<&str> = HashSet::with_capacity(local_paths.len());
    let mut plan = ReconciliationPlan::default();

    for path in local_paths {
        let path = path.as_ref();
        if !seen.insert(path) {
            continue;
        }
        if remote.contains_key(path) {
            plan.unchanged += 1;
        } else {
            plan.to_add.push(path.to_string());
        }
    }

    plan.to_remove = remote
        .iter()
        .filter(|(path, _)| !seen.contains(path.as_str()))
        .map(|(path, file_id)| FileRecord {
            path: path.clone(),
            file_id: file_id.clone(),
        })
        .collect();

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file_set(entries: &[(&str, &str)]) -> FileSet {
        entries
            .iter()
            .map(|(p, id)| (p.to_string(), id.to_string()))
            .collect()
    }

    #[test]
    fn test_add_and_remove() {
        let remote = file_set(&[("a.txt", "id1"), ("old.txt", "id2")]);
        let plan = reconcile(&["a.txt", "new.txt"], &remote);

        assert_eq!(plan.to_add, vec!["new.txt".to_string()]);
        assert_eq!(plan.removed_ids(), vec!["id2"]);
        assert_eq!(plan.to_remove[0].path, "old.txt");
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn test_identical_sets_need_nothing() {
        let remote = file_set(&[("a.md", "1"), ("b/c.md", "2")]);
        let plan = reconcile(&["a.md", "b/c.md"], &remote);

        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 2);
    }

    #[test]
    fn test_empty_remote_adds_everything_in_order() {
        let plan = reconcile(&["b.md", "a.md", "c.md"], &FileSet::new());
        assert_eq!(plan.to_add, vec!["b.md", "a.md", "c.md"]);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_empty_local_removes_everything() {
        let remote = file_set(&[("z.md", "9"), ("a.md", "1")]);
        let plan = reconcile::<&str>(&[], &remote);
        // stored order of the file set is path order
        assert_eq!(plan.removed_ids(), vec!["1", "9"]);
        assert_eq!(plan.unchanged, 0);
    }

    #[test]
    fn test_move_is_remove_plus_add() {
        let remote = file_set(&[("old/name.md", "id7")]);
        let plan = reconcile(&["new/name.md"], &remote);
        assert_eq!(plan.to_add, vec!["new/name.md"]);
        assert_eq!(plan.removed_ids(), vec!["id7"]);
    }

    #[test]
    fn test_duplicate_local_paths_counted_once() {
        let remote = file_set(&[("a.md", "1")]);
        let plan = reconcile(&["a.md", "a.md", "b.md", "b.md"], &remote);
        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.to_add, vec!["b.md"]);
    }

    #[test]
    fn test_input_order_does_not_change_sets() {
        let remote = file_set(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let forward = reconcile(&["b", "d", "e"], &remote);
        let backward = reconcile(&["e", "d", "b"], &remote);

        let as_set = |v: &[String]| v.iter().cloned().collect::<HashSet<_>>();
        assert_eq!(as_set(&forward.to_add), as_set(&backward.to_add));
        assert_eq!(forward.to_remove, backward.to_remove);
        assert_eq!(forward.unchanged, backward.unchanged);
    }

    #[test]
    fn test_applying_plan_converges() {
        let mut remote = file_set(&[("keep.md", "1"), ("gone.md", "2")]);
        let local = ["keep.md", "fresh.md", "sub/also.md"];

        let plan = reconcile(&local, &remote);
        for record in &plan.to_remove {
            remote.remove(&record.path);
        }
        for (i, path) in plan.to_add.iter().enumerate() {
            remote.insert(path.clone(), format!("new-{i}"));
        }

        let again = reconcile(&local, &remote);
        assert!(again.is_empty());
        assert_eq!(again.unchanged, local.len());
    }
}
