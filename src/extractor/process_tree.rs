use crate::error::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Platform seam for terminating a process and everything it spawned.
pub trait ProcessTreeKiller: Send + Sync {
    /// Kill `pid` and all of its descendants. A process that has already
    /// exited is not an error. Returns how many processes were signalled.
    fn kill_process_tree(&self, pid: u32) -> Result<usize>;
}

/// Walks the OS process table through `sysinfo` parent links.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTreeKiller;

impl ProcessTreeKiller for SystemTreeKiller {
    fn kill_process_tree(&self, pid: u32) -> Result<usize> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let links: Vec<(u32, Option<u32>)> = system
            .processes()
            .iter()
            .map(|(child, process)| (child.as_u32(), process.parent().map(|p| p.as_u32())))
            .collect();

        let mut killed = 0;

        // Deepest descendants first so nothing gets a chance to respawn.
        for descendant in descendants(&links, pid).into_iter().rev() {
            if let Some(process) = system.process(Pid::from_u32(descendant)) {
                if process.kill() {
                    killed += 1;
                }
            }
        }

        match system.process(Pid::from_u32(pid)) {
            Some(process) => {
                if process.kill() {
                    killed += 1;
                }
            }
            None => tracing::debug!("Process {} already terminated", pid),
        }

        tracing::info!("Killed process tree for PID {} ({} processes)", pid, killed);
        Ok(killed)
    }
}

/// Breadth-first descendants of `root` given `(pid, parent)` pairs.
pub fn descendants(links: &[(u32, Option<u32>)], root: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for &(pid, parent) in links {
        if let Some(parent) = parent {
            if parent != pid {
                children.entry(parent).or_default().push(pid);
            }
        }
    }

    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut found = Vec::new();

    while let Some(current) = queue.pop_front() {
        if let Some(kids) = children.get(&current) {
            for &kid in kids {
                if seen.insert(kid) {
                    found.push(kid);
                    queue.push_back(kid);
                }
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descendants_walks_whole_tree() {
        let links = vec![
            (1, None),
            (10, Some(1)),
            (11, Some(10)),
            (12, Some(10)),
            (13, Some(12)),
            (20, Some(1)),
        ];

        let mut found = descendants(&links, 10);
        found.sort();
        assert_eq!(found, vec![11, 12, 13]);
        assert!(descendants(&links, 13).is_empty());
    }

    #[test]
    fn test_descendants_tolerates_cycles() {
        let links = vec![(5, Some(6)), (6, Some(5)), (7, Some(7))];
        let mut found = descendants(&links, 5);
        found.sort();
        assert_eq!(found, vec![6]);
    }

    #[test]
    fn test_missing_process_is_not_an_error() {
        // pid far above any default pid_max
        let killed = SystemTreeKiller.kill_process_tree(u32::MAX - 7).unwrap();
        assert_eq!(killed, 0);
    }
}
