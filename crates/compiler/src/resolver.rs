//! Threaded `find_program` resolution (spec's concurrency model: a fixed
//! worker pool sharing a mutex-guarded job queue; the only concurrent
//! region in an otherwise single-threaded pipeline).
//!
//! The collect/schedule/replace split lives in `passes::resolve_programs`;
//! this module only owns the pool mechanics and the PATH probe so they can
//! be unit-tested without a CFG.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::thread;

use buildgraph_core::state::MachineKind;

/// One `find_program(name)` request for one machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveJob {
    pub machine: MachineKind,
    pub name: String,
}

/// What a worker produced for one job: the resolved path, or empty if the
/// name was not found on any `PATH` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub machine: MachineKind,
    pub name: String,
    pub path: String,
}

/// Probes `dir/name` for each `dir` in `path_env` (platform path-list
/// separator), left to right, returning the first hit. Pure function of
/// its inputs so tests don't need a real `PATH`.
pub fn probe_path(name: &str, path_env: &str) -> String {
    for dir in path_env.split(':').filter(|d| !d.is_empty()) {
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            return candidate.to_string_lossy().into_owned();
        }
    }
    String::new()
}

/// Runs `jobs` across a fixed-size pool of OS threads sharing one
/// mutex-guarded queue. Ordering within a job's own probe is deterministic
/// (`probe_path`'s left-to-right scan); ordering across jobs is not, which
/// matches the single-writer-per-key discipline the caller applies when
/// folding the results back into `PersistentState::programs`.
pub fn resolve_all(jobs: Vec<ResolveJob>, path_env: &str, pool_size: usize) -> Vec<Resolved> {
    if jobs.is_empty() {
        return Vec::new();
    }
    let queue: Mutex<VecDeque<ResolveJob>> = Mutex::new(jobs.into());
    let results: Mutex<Vec<Resolved>> = Mutex::new(Vec::new());
    let workers = pool_size.max(1);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let job = {
                    let mut q = queue.lock().expect("resolver queue mutex poisoned");
                    q.pop_front()
                };
                let Some(job) = job else { break };
                let path = probe_path(&job.name, path_env);
                let found = !path.is_empty();
                tracing::debug!(name = %job.name, found, "resolved program");
                results
                    .lock()
                    .expect("resolver results mutex poisoned")
                    .push(Resolved {
                        machine: job.machine,
                        name: job.name,
                        path,
                    });
            });
        }
    });

    results.into_inner().expect("resolver results mutex poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn probe_path_finds_first_hit_left_to_right() {
        let dir = tempfile::tempdir().unwrap();
        let bin_dir = dir.path().join("bin");
        fs::create_dir(&bin_dir).unwrap();
        fs::write(bin_dir.join("cc"), b"").unwrap();

        let path_env = format!("/nonexistent:{}", bin_dir.display());
        let found = probe_path("cc", &path_env);
        assert_eq!(found, bin_dir.join("cc").to_string_lossy());
    }

    #[test]
    fn probe_path_returns_empty_when_not_found() {
        assert_eq!(probe_path("definitely-not-a-real-binary", ""), "");
    }

    #[test]
    fn resolve_all_resolves_every_job() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cc"), b"").unwrap();
        fs::write(dir.path().join("ld"), b"").unwrap();
        let path_env = dir.path().to_string_lossy().into_owned();

        let jobs = vec![
            ResolveJob {
                machine: MachineKind::Host,
                name: "cc".to_string(),
            },
            ResolveJob {
                machine: MachineKind::Host,
                name: "ld".to_string(),
            },
            ResolveJob {
                machine: MachineKind::Host,
                name: "nonexistent".to_string(),
            },
        ];
        let mut results = resolve_all(jobs, &path_env, 4);
        results.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(results.len(), 3);
        assert!(!results[0].path.is_empty()); // cc
        assert!(results[1].path.is_empty()); // nonexistent
        assert!(!results[2].path.is_empty()); // ld
    }

    #[test]
    fn resolve_all_with_no_jobs_returns_empty() {
        assert!(resolve_all(Vec::new(), "", 4).is_empty());
    }
}
