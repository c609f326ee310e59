use crate::extractor::cancel::CancellationToken;
use crate::extractor::job::{ExtractionJob, JobOutcome};
use crate::extractor::process_runner::ProcessRunner;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PoolProgress {
    pub jobs_finished: usize,
    pub jobs_succeeded: usize,
    pub total_jobs: usize,
    pub start_time: Instant,
}

impl PoolProgress {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            jobs_finished: 0,
            jobs_succeeded: 0,
            total_jobs,
            start_time: Instant::now(),
        }
    }

    pub fn record(&mut self, outcome: &JobOutcome) {
        self.jobs_finished += 1;
        if outcome.is_success() {
            self.jobs_succeeded += 1;
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total_jobs == 0 {
            0.0
        } else {
            (self.jobs_finished as f64 / self.total_jobs as f64) * 100.0
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn estimated_remaining(&self) -> Duration {
        if self.jobs_finished == 0 {
            return Duration::from_secs(0);
        }

        let rate = self.jobs_finished as f64 / self.elapsed().as_secs_f64();
        let remaining = self.total_jobs.saturating_sub(self.jobs_finished);

        if rate > 0.0 {
            Duration::from_secs_f64(remaining as f64 / rate)
        } else {
            Duration::from_secs(0)
        }
    }
}

/// Bounded set of worker threads draining a shared job queue. At most
/// `max_workers` extractor processes are alive at any instant.
pub struct WorkerPool {
    runner: ProcessRunner,
    max_workers: usize,
    token: CancellationToken,
}

impl WorkerPool {
    pub fn new(runner: ProcessRunner, max_workers: usize) -> Self {
        Self {
            runner,
            max_workers: max_workers.max(1),
            token: CancellationToken::new(),
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Run every job and return one outcome per job, in completion order.
    pub fn run_all(&self, jobs: Vec<ExtractionJob>) -> Vec<JobOutcome> {
        self.run_all_with_progress(jobs, |_, _| {})
    }

    /// Like [`run_all`](Self::run_all), calling `on_outcome` on the calling
    /// thread as each job reaches a terminal state.
    pub fn run_all_with_progress<F>(&self, jobs: Vec<ExtractionJob>, mut on_outcome: F) -> Vec<JobOutcome>
    where
        F: FnMut(&JobOutcome, &PoolProgress),
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.max_workers.min(total);
        tracing::info!("Running {} extraction jobs on {} workers", total, workers);

        let queue = Mutex::new(jobs.into_iter().collect::<VecDeque<_>>());
        let (sender, receiver) = mpsc::channel::<JobOutcome>();
        let mut progress = PoolProgress::new(total);
        let mut outcomes = Vec::with_capacity(total);

        std::thread::scope(|scope| {
            for worker in 0..workers {
                let sender = sender.clone();
                let queue = &queue;
                scope.spawn(move || {
                    tracing::debug!("Worker {} started", worker);
                    loop {
                        // Hold the lock only for the pop.
                        let next = queue.lock().pop_front();
                        let Some(job) = next else { break };

                        let outcome = if self.token.is_cancelled() {
                            job.into_cancelled()
                        } else {
                            job.run(&self.runner, &self.token)
                        };

                        if sender.send(outcome).is_err() {
                            break;
                        }
                    }
                    tracing::debug!("Worker {} finished", worker);
                });
            }
            drop(sender);

            for outcome in receiver {
                progress.record(&outcome);
                on_outcome(&outcome, &progress);
                outcomes.push(outcome);
            }
        });

        outcomes
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::extractor::command::ExtractorCommand;
    use crate::extractor::job::JobState;
    use crate::test_support::{window, write_script};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn jobs_for(dir: &Path, tool: &Path, count: usize) -> Vec<ExtractionJob> {
        (0..count)
            .map(|i| {
                let source = dir.join(format!("src{}.dt", i));
                std::fs::write(&source, b"raw").unwrap();
                let output = dir.join(format!("src{}.rtu", i));
                let command = ExtractorCommand::new(tool).path_arg(&source);
                ExtractionJob::new(i, source, output, command, window(1, 2))
            })
            .collect()
    }

    #[test]
    fn test_every_job_gets_one_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let tool = write_script(temp_dir.path(), "tool.sh", "sleep 0.05\necho \"$1\"\n");
        let jobs = jobs_for(temp_dir.path(), &tool, 7);

        let pool = WorkerPool::new(ProcessRunner::new(Duration::from_millis(5)), 3);
        let mut seen = 0;
        let outcomes = pool.run_all_with_progress(jobs, |_, progress| {
            seen += 1;
            assert_eq!(progress.jobs_finished, seen);
        });

        assert_eq!(outcomes.len(), 7);
        assert_eq!(seen, 7);
        assert!(outcomes.iter().all(|o| o.state == JobState::Succeeded));

        let mut ids: Vec<usize> = outcomes.iter().map(|o| o.job_id).collect();
        ids.sort();
        assert_eq!(ids, (0..7).collect::<Vec<_>>());
        assert!(pool.runner().peak_processes() <= 3);
        assert_eq!(pool.runner().active_processes(), 0);
    }

    #[test]
    fn test_concurrency_never_exceeds_limit() {
        let temp_dir = TempDir::new().unwrap();
        let tool = write_script(temp_dir.path(), "tool.sh", "sleep 0.2\necho done\n");
        let jobs = jobs_for(temp_dir.path(), &tool, 6);

        let pool = WorkerPool::new(ProcessRunner::new(Duration::from_millis(5)), 2);
        let outcomes = pool.run_all(jobs);

        assert_eq!(outcomes.len(), 6);
        assert_eq!(pool.runner().peak_processes(), 2);
    }

    #[test]
    fn test_cancel_mid_run_reaches_terminal_states_quickly() {
        let temp_dir = TempDir::new().unwrap();
        let tool = write_script(temp_dir.path(), "slow.sh", "sleep 30\necho late\n");
        let jobs = jobs_for(temp_dir.path(), &tool, 10);

        let pool = Arc::new(WorkerPool::new(ProcessRunner::new(Duration::from_millis(10)), 4));
        let token = pool.cancellation_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            token.cancel();
        });

        let start = Instant::now();
        let outcomes = pool.run_all(jobs);
        canceller.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(outcomes.len(), 10);
        assert!(outcomes.iter().all(|o| o.state == JobState::Cancelled));
        assert_eq!(pool.runner().active_processes(), 0);

        for i in 0..10 {
            assert!(!temp_dir.path().join(format!("src{}.rtu", i)).exists());
        }
    }

    #[test]
    fn test_progress_estimates() {
        let mut progress = PoolProgress::new(4);
        assert_eq!(progress.percentage(), 0.0);
        assert_eq!(progress.estimated_remaining(), Duration::from_secs(0));

        progress.jobs_finished = 2;
        assert_eq!(progress.percentage(), 50.0);

        progress.start_time = Instant::now() - Duration::from_secs(10);
        let eta = progress.estimated_remaining();
        assert!(eta >= Duration::from_secs(9) && eta <= Duration::from_secs(11));
    }
}
