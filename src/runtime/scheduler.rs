use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::EffectId;
use crate::error::ReactiveError;

/// A unit of deferred work, deduplicated by the id of the effect it belongs to.
#[derive(Clone)]
pub struct Job {
    id: EffectId,
    run: Rc<dyn Fn()>,
}

impl Job {
    pub(crate) fn new(id: EffectId, run: impl Fn() + 'static) -> Self {
        Self {
            id,
            run: Rc::new(run),
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn run(&self) {
        (self.run)();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

/// Pending jobs for the next flush.
///
/// Pre jobs (effect reruns, default watchers) always drain before post jobs.
#[derive(Default)]
pub(crate) struct JobQueue {
    pre: IndexMap<EffectId, Job>,
    post: IndexMap<EffectId, Job>,
    pub flushing: bool,
}

impl JobQueue {
    /// Hands the job back if an entry for the same effect is already pending.
    pub fn enqueue(&mut self, job: Job) -> Option<Job> {
        insert_new(&mut self.pre, job)
    }

    pub fn enqueue_post(&mut self, job: Job) -> Option<Job> {
        insert_new(&mut self.post, job)
    }

    pub fn next(&mut self) -> Option<Job> {
        self.pre
            .shift_remove_index(0)
            .or_else(|| self.post.shift_remove_index(0))
            .map(|(_, job)| job)
    }

    pub fn remove(&mut self, id: EffectId) -> Vec<Job> {
        [self.pre.shift_remove(&id), self.post.shift_remove(&id)]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pre.len() + self.post.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }
}

fn insert_new(queue: &mut IndexMap<EffectId, Job>, job: Job) -> Option<Job> {
    if queue.contains_key(&job.id) {
        return Some(job);
    }
    queue.insert(job.id, job);
    None
}

/// Outcome of one flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Jobs that ran to completion.
    pub ran: usize,
    /// Jobs that panicked or were dropped, in the order it happened.
    pub failures: Vec<ReactiveError>,
}

impl FlushReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}
