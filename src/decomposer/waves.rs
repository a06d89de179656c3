//! Wave partitioning: layered topological sort over subtask dependencies.

use crate::decomposer::SubTask;
use crate::error::{ForemanError, Result};
use std::collections::{HashMap, HashSet};

/// Partition subtasks into waves where wave k holds every subtask whose
/// dependencies all completed in waves 0..k. Subtasks without dependencies
/// land in the first wave; within a wave, plan order is preserved.
///
/// Malformed inputs (duplicate ids, unknown / duplicated / self
/// dependencies, cycles) are template bugs and fail fast.
pub fn partition(subtasks: &[SubTask]) -> Result<Vec<Vec<String>>> {
    validate(subtasks)?;

    // wave(s) = 1 + max(wave(d) for d in depends_on), computed iteratively.
    let mut wave_of: HashMap<&str, usize> = HashMap::new();
    let mut remaining: Vec<&SubTask> = subtasks.iter().collect();

    while !remaining.is_empty() {
        let mut progressed = false;
        let mut still_blocked = Vec::new();

        for subtask in remaining {
            let deps_ready = subtask
                .depends_on
                .iter()
                .all(|dep| wave_of.contains_key(dep.as_str()));

            if deps_ready {
                let wave = 1 + subtask
                    .depends_on
                    .iter()
                    .map(|dep| wave_of[dep.as_str()])
                    .max()
                    .unwrap_or(0);
                wave_of.insert(&subtask.id, wave);
                progressed = true;
            } else {
                still_blocked.push(subtask);
            }
        }

        if !progressed {
            let stuck: Vec<&str> = still_blocked.iter().map(|s| s.id.as_str()).collect();
            return Err(ForemanError::InvalidPlan(format!(
                "dependency cycle among subtasks: {:?}",
                stuck
            )));
        }
        remaining = still_blocked;
    }

    let total_waves = wave_of.values().copied().max().unwrap_or(0);
    let mut waves = vec![Vec::new(); total_waves];
    for subtask in subtasks {
        waves[wave_of[subtask.id.as_str()] - 1].push(subtask.id.clone());
    }

    Ok(waves)
}

/// Display estimate: the critical path through the wave structure, taking
/// the slowest subtask of each wave.
pub fn estimate_total_seconds(subtasks: &[SubTask], waves: &[Vec<String>]) -> u64 {
    let est: HashMap<&str, u64> = subtasks
        .iter()
        .map(|s| (s.id.as_str(), s.est_seconds))
        .collect();

    waves
        .iter()
        .map(|wave| {
            wave.iter()
                .map(|id| est.get(id.as_str()).copied().unwrap_or(0))
                .max()
                .unwrap_or(0)
        })
        .sum()
}

fn validate(subtasks: &[SubTask]) -> Result<()> {
    if subtasks.is_empty() {
        return Err(ForemanError::InvalidPlan("plan has no subtasks".to_string()));
    }

    let mut ids = HashSet::new();
    for subtask in subtasks {
        if !ids.insert(subtask.id.as_str()) {
            return Err(ForemanError::InvalidPlan(format!(
                "duplicate subtask id: {}",
                subtask.id
            )));
        }
    }

    for subtask in subtasks {
        let mut seen = HashSet::new();
        for dep in &subtask.depends_on {
            if dep == &subtask.id {
                return Err(ForemanError::InvalidPlan(format!(
                    "subtask {} depends on itself",
                    subtask.id
                )));
            }
            if !ids.contains(dep.as_str()) {
                return Err(ForemanError::InvalidPlan(format!(
                    "subtask {} has unknown dependency: {}",
                    subtask.id, dep
                )));
            }
            if !seen.insert(dep.as_str()) {
                return Err(ForemanError::InvalidPlan(format!(
                    "subtask {} lists dependency {} twice",
                    subtask.id, dep
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtask(id: &str, deps: &[&str], est: u64) -> SubTask {
        SubTask {
            id: id.to_string(),
            description: format!("step {}", id),
            priority: 5,
            worker_hint: None,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            parallelizable: deps.is_empty(),
            est_seconds: est,
        }
    }

    #[test]
    fn independent_subtasks_share_the_first_wave() {
        let tasks = vec![subtask("a", &[], 5), subtask("b", &[], 5)];
        let waves = partition(&tasks).unwrap();
        assert_eq!(waves, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn dependencies_push_subtasks_into_later_waves() {
        let tasks = vec![
            subtask("a", &[], 5),
            subtask("b", &["a"], 5),
            subtask("c", &["a"], 5),
            subtask("d", &["b", "c"], 5),
        ];
        let waves = partition(&tasks).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["a".to_string()]);
        assert_eq!(waves[1], vec!["b".to_string(), "c".to_string()]);
        assert_eq!(waves[2], vec!["d".to_string()]);
    }

    #[test]
    fn every_dependency_lies_in_an_earlier_wave() {
        let tasks = vec![
            subtask("a", &[], 2),
            subtask("b", &["a"], 2),
            subtask("c", &[], 2),
            subtask("d", &["b", "c"], 2),
            subtask("e", &["a"], 2),
        ];
        let waves = partition(&tasks).unwrap();

        let wave_of = |id: &str| waves.iter().position(|w| w.iter().any(|x| x == id)).unwrap();
        for task in &tasks {
            for dep in &task.depends_on {
                assert!(wave_of(dep) < wave_of(&task.id));
            }
        }
    }

    #[test]
    fn cycle_is_rejected() {
        let tasks = vec![subtask("a", &["b"], 5), subtask("b", &["a"], 5)];
        let err = partition(&tasks).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn duplicate_dependency_is_rejected() {
        let tasks = vec![subtask("a", &[], 5), subtask("b", &["a", "a"], 5)];
        let err = partition(&tasks).unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let tasks = vec![subtask("a", &["ghost"], 5)];
        let err = partition(&tasks).unwrap_err();
        assert!(err.to_string().contains("unknown dependency"));
    }

    #[test]
    fn estimate_sums_the_slowest_subtask_per_wave() {
        let tasks = vec![
            subtask("a", &[], 5),
            subtask("b", &[], 8),
            subtask("c", &["a", "b"], 10),
        ];
        let waves = partition(&tasks).unwrap();
        assert_eq!(estimate_total_seconds(&tasks, &waves), 18);
    }
}
