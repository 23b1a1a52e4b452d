use crate::storage::store::Store;
use crate::storage::RunRow;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct ParentRun {
    pub run: RunRow,
    pub children: Vec<RunRow>,
}

/// Runs grouped for display: parents with their children (sorted by name),
/// then runs that belong to no batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTree {
    pub parents: Vec<ParentRun>,
    pub standalone: Vec<RunRow>,
}

pub fn build_hierarchy(store: &Store, experiment: Option<&str>) -> anyhow::Result<RunTree> {
    Ok(group_runs(store.list_runs(experiment)?))
}

pub(crate) fn group_runs(runs: Vec<RunRow>) -> RunTree {
    let ids: HashSet<String> = runs.iter().map(|r| r.id.clone()).collect();
    let mut children: BTreeMap<String, Vec<RunRow>> = BTreeMap::new();
    let mut roots = Vec::new();

    for run in runs {
        match &run.parent_id {
            Some(pid) if ids.contains(pid) => children.entry(pid.clone()).or_default().push(run),
            _ => roots.push(run),
        }
    }

    let mut tree = RunTree::default();
    for run in roots {
        match children.remove(&run.id) {
            Some(mut kids) => {
                kids.sort_by(|a, b| a.name.cmp(&b.name));
                tree.parents.push(ParentRun {
                    run,
                    children: kids,
                });
            }
            None => tree.standalone.push(run),
        }
    }
    tree
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

impl fmt::Display for RunTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parents.is_empty() && self.standalone.is_empty() {
            return writeln!(f, "No runs found.");
        }
        for p in &self.parents {
            writeln!(
                f,
                "{} [{}] {} ({})",
                p.run.name,
                p.run.experiment,
                short(&p.run.id),
                p.run.status
            )?;
            for c in &p.children {
                writeln!(f, "  └─ {} {} ({})", c.name, short(&c.id), c.status)?;
            }
        }
        if !self.standalone.is_empty() {
            writeln!(f, "Standalone runs:")?;
            for r in &self.standalone {
                writeln!(f, "  {} [{}] {} ({})", r.name, r.experiment, short(&r.id), r.status)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: &str, parent: Option<&str>, name: &str) -> RunRow {
        RunRow {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            experiment: "exp".into(),
            name: name.into(),
            status: "finished".into(),
            started_at: "2024-01-01T00:00:00.000Z".into(),
            finished_at: None,
        }
    }

    #[test]
    fn groups_children_under_parents() {
        let tree = group_runs(vec![
            run("p1", None, "batch"),
            run("c2", Some("p1"), "z_child"),
            run("c1", Some("p1"), "a_child"),
            run("s1", None, "lonely"),
            run("o1", Some("gone"), "orphan"),
        ]);
        assert_eq!(tree.parents.len(), 1);
        let names: Vec<_> = tree.parents[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a_child", "z_child"]);
        assert_eq!(tree.standalone.len(), 2);

        let text = tree.to_string();
        assert!(text.contains("batch [exp]"));
        assert!(text.contains("Standalone runs:"));
    }

    #[test]
    fn empty_tree_says_so() {
        assert_eq!(RunTree::default().to_string(), "No runs found.\n");
    }
}
