//! Whole-window planning and folder-parallel execution.

use std::{collections::HashMap, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};

use super::{
    assembler::{Clip, ClipAssembler},
    cursor::{ClipPlan, Step, TraversalState},
};
use crate::{
    archive::{PlaylistSource, Segment},
    error::ClipError,
};

/// Every clip of a window, in traversal order.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    items: Vec<ClipPlan>,
}

impl BatchPlan {
    pub fn items(&self) -> &[ClipPlan] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Groups plans by folder, keeping first-seen folder order and the
    /// traversal order within each folder.
    pub fn into_folder_groups(self) -> Vec<(i64, Vec<ClipPlan>)> {
        let mut groups: Vec<(i64, Vec<ClipPlan>)> = Vec::new();
        let mut slots: HashMap<i64, usize> = HashMap::new();
        for plan in self.items {
            let slot = *slots.entry(plan.folder).or_insert_with(|| {
                groups.push((plan.folder, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(plan);
        }
        groups
    }
}

/// Walks a private copy of the traversal state without fetching any segment.
pub struct BatchPlanner {
    playlists: Arc<dyn PlaylistSource>,
}

impl BatchPlanner {
    pub fn new(playlists: Arc<dyn PlaylistSource>) -> Self {
        Self { playlists }
    }

    pub async fn plan(&self, snapshot: TraversalState) -> BatchPlan {
        let mut state = snapshot;
        let mut cache: HashMap<i64, Option<Arc<[Segment]>>> = HashMap::new();
        let mut items = Vec::new();

        while let Some(folder) = state.pending_folder() {
            let segments = match cache.get(&folder) {
                Some(cached) => cached.clone(),
                None => {
                    let loaded = match self.playlists.load(folder).await {
                        Ok(segments) => Some(segments),
                        Err(e) => {
                            warn!(folder, error = %e, "Failed to load folder playlist");
                            None
                        }
                    };
                    cache.insert(folder, loaded.clone());
                    loaded
                }
            };

            if let Step::Emit(plan) = state.apply(folder, segments) {
                items.push(plan);
            }
        }

        debug!(
            clips = items.len(),
            folders = cache.len(),
            "Planned batch"
        );
        BatchPlan { items }
    }
}

#[derive(Debug)]
pub struct ClipFailure {
    pub folder: i64,
    pub clip_start_time: i64,
    pub error: ClipError,
}

/// Outcome of a batch run. Entries arrive in completion order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub clips: Vec<Clip>,
    pub failures: Vec<ClipFailure>,
}

impl BatchReport {
    pub fn into_sorted(mut self) -> Self {
        self.clips.sort_by_key(|c| c.clip_start_time);
        self.failures.sort_by_key(|f| f.clip_start_time);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs one task per folder, at most `concurrency` at once. Clips inside a
/// folder are assembled one after another.
pub async fn execute(
    plan: BatchPlan,
    assembler: Arc<ClipAssembler>,
    concurrency: usize,
) -> BatchReport {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set: JoinSet<Vec<Result<Clip, ClipFailure>>> = JoinSet::new();

    for (folder, plans) in plan.into_folder_groups() {
        let semaphore = semaphore.clone();
        let assembler = assembler.clone();
        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return plans
                        .iter()
                        .map(|p| {
                            Err(ClipFailure {
                                folder,
                                clip_start_time: p.clip_start_time,
                                error: ClipError::internal("batch semaphore closed"),
                            })
                        })
                        .collect();
                }
            };

            let mut results = Vec::with_capacity(plans.len());
            for plan in &plans {
                results.push(assembler.assemble(plan).await.map_err(|error| ClipFailure {
                    folder,
                    clip_start_time: plan.clip_start_time,
                    error,
                }));
            }
            results
        });
    }

    let mut report = BatchReport::default();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(clip) => report.clips.push(clip),
                        Err(failure) => report.failures.push(failure),
                    }
                }
            }
            Err(e) => error!(error = %e, "Batch folder task did not complete"),
        }
    }

    info!(
        clips = report.clips.len(),
        failures = report.failures.len(),
        "Batch finished"
    );
    report
}
