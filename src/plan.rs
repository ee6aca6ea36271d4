//! Learning plan and personalization refresh.
//!
//! The plan is a short list of generated tasks the learner can tick off;
//! regeneration replaces it wholesale. Persona refreshes re-infer the
//! learner's interests and dashboard recommendations from recent activity
//! and merge only those two fields back, so a slow refresh never clobbers
//! anything else.

use crate::notify::Notifier;
use crate::sync::{ProfileSync, SyncError};
use crate::tutor::{TutorCapability, TutorError};
use crate::types::{PlanTask, Persona};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Tutor(#[from] TutorError),
}

pub struct PlanManager {
    sync: ProfileSync,
    tutor: Arc<dyn TutorCapability>,
    notifier: Notifier,
}

impl PlanManager {
    pub fn new(sync: ProfileSync, tutor: Arc<dyn TutorCapability>, notifier: Notifier) -> Self {
        Self {
            sync,
            tutor,
            notifier,
        }
    }

    /// Generate a fresh plan and replace the current one wholesale. An empty
    /// generation is a failure; the existing plan stays untouched.
    pub async fn generate(&self) -> Result<(), PlanError> {
        let snapshot = self.sync.snapshot()?;
        let seeds = match self.tutor.learning_plan(&snapshot).await {
            Ok(seeds) if !seeds.is_empty() => seeds,
            Ok(_) => {
                self.notifier
                    .error("Could not generate a learning plan. Please try again.");
                return Err(TutorError::Empty.into());
            }
            Err(error) => {
                self.notifier
                    .error("Could not generate a learning plan. Please try again.");
                return Err(error.into());
            }
        };

        let tasks: Vec<PlanTask> = seeds
            .into_iter()
            .map(|seed| PlanTask {
                id: Uuid::new_v4().to_string(),
                kind: seed.kind,
                title: seed.title,
                description: seed.description,
                completed: false,
            })
            .collect();
        self.sync.mutate(|doc| doc.learning_plan = tasks)?;
        Ok(())
    }

    /// Mark the task with `id` complete. Returns false for an unknown id,
    /// which is a no-op.
    pub fn complete_task(&self, id: &str) -> Result<bool, SyncError> {
        let mut found = false;
        self.sync.mutate(|doc| {
            if let Some(task) = doc.learning_plan.iter_mut().find(|t| t.id == id) {
                task.completed = true;
                found = true;
            }
        })?;
        Ok(found)
    }

    /// Foreground persona refresh, for an explicit "refresh my
    /// recommendations" action.
    pub async fn refresh_recommendations(&self) -> Result<(), PlanError> {
        let snapshot = self.sync.snapshot()?;
        match self.tutor.refresh_persona(&snapshot).await {
            Ok(update) => {
                apply_persona_update(&self.sync, update.persona, update.recommendations)?;
                Ok(())
            }
            Err(error) => {
                self.notifier
                    .error("Could not refresh your recommendations. Please try again.");
                Err(error.into())
            }
        }
    }
}

/// Merge a persona refresh result into the document. Only the persona and
/// the recommendation list move; concurrent refreshes are
/// last-resolved-wins through the serialized mutation path.
pub(crate) fn apply_persona_update(
    sync: &ProfileSync,
    persona: Persona,
    recommendations: Vec<String>,
) -> Result<(), SyncError> {
    sync.mutate(|doc| {
        doc.profile.persona = persona;
        doc.recommendations = recommendations;
    })
}

/// Detached persona refresh over the current snapshot. Failures are logged
/// and otherwise invisible; the interactive path never waits on this.
pub(crate) fn spawn_persona_refresh(sync: ProfileSync, tutor: Arc<dyn TutorCapability>) {
    tokio::spawn(async move {
        let snapshot = match sync.snapshot() {
            Ok(snapshot) => snapshot,
            // Session ended between trigger and run.
            Err(_) => return,
        };
        match tutor.refresh_persona(&snapshot).await {
            Ok(update) => {
                if let Err(error) =
                    apply_persona_update(&sync, update.persona, update.recommendations)
                {
                    tracing::warn!(%error, "persona refresh result dropped");
                } else {
                    tracing::debug!("persona refreshed in background");
                }
            }
            Err(error) => {
                tracing::warn!(%error, "background persona refresh failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::tests::ready_sync;
    use crate::tutor::mock::MockTutor;
    use crate::tutor::{PersonaUpdate, PlanSeed};
    use crate::types::PlanTaskKind;

    fn manager(tutor: Arc<MockTutor>, sync: ProfileSync) -> PlanManager {
        PlanManager::new(sync, tutor, Notifier::disconnected())
    }

    fn seeds() -> Vec<PlanSeed> {
        vec![
            PlanSeed {
                kind: PlanTaskKind::Quiz,
                title: "Phrasal verbs".into(),
                description: "A quick quiz on phrasal verbs.".into(),
            },
            PlanSeed {
                kind: PlanTaskKind::Spelling,
                title: "necessary".into(),
                description: "needed; essential".into(),
            },
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn generate_replaces_the_plan_wholesale() {
        let sync = ready_sync().await;
        let tutor = Arc::new(MockTutor::default());
        *tutor.plan.lock().unwrap() = Some(seeds());
        let manager = manager(Arc::clone(&tutor), sync.clone());

        manager.generate().await.unwrap();
        let first: Vec<String> = sync
            .read(|doc| doc.learning_plan.iter().map(|t| t.id.clone()).collect())
            .unwrap();
        assert_eq!(first.len(), 2);
        assert!(sync
            .read(|doc| doc.learning_plan.iter().all(|t| !t.completed))
            .unwrap());

        // Regeneration replaces everything, including ids.
        manager.generate().await.unwrap();
        let second: Vec<String> = sync
            .read(|doc| doc.learning_plan.iter().map(|t| t.id.clone()).collect())
            .unwrap();
        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|id| !second.contains(id)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_generation_leaves_the_plan_untouched() {
        let sync = ready_sync().await;
        let tutor = Arc::new(MockTutor::default());
        *tutor.plan.lock().unwrap() = Some(seeds());
        let manager = manager(Arc::clone(&tutor), sync.clone());
        manager.generate().await.unwrap();

        *tutor.plan.lock().unwrap() = Some(Vec::new());
        assert!(manager.generate().await.is_err());
        assert_eq!(sync.read(|doc| doc.learning_plan.len()).unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_task_marks_only_the_matching_id() {
        let sync = ready_sync().await;
        let tutor = Arc::new(MockTutor::default());
        *tutor.plan.lock().unwrap() = Some(seeds());
        let manager = manager(tutor, sync.clone());
        manager.generate().await.unwrap();

        let id = sync.read(|doc| doc.learning_plan[0].id.clone()).unwrap();
        assert!(manager.complete_task(&id).unwrap());
        assert!(!manager.complete_task("no-such-task").unwrap());

        let completed: Vec<bool> = sync
            .read(|doc| doc.learning_plan.iter().map(|t| t.completed).collect())
            .unwrap();
        assert_eq!(completed, vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_merges_only_persona_and_recommendations() {
        let sync = ready_sync().await;
        sync.mutate(|doc| doc.stats.words_learned = 9).unwrap();
        let tutor = Arc::new(MockTutor::default());
        *tutor.persona.lock().unwrap() = Some(PersonaUpdate {
            persona: Persona {
                interests: vec!["astronomy".into()],
                summary: "Curious about the stars.".into(),
            },
            recommendations: vec!["Quiz yourself on space vocabulary.".into()],
        });
        let manager = manager(tutor, sync.clone());

        manager.refresh_recommendations().await.unwrap();
        let doc = sync.snapshot().unwrap();
        assert_eq!(doc.profile.persona.interests, vec!["astronomy"]);
        assert_eq!(doc.recommendations.len(), 1);
        assert_eq!(doc.stats.words_learned, 9);
    }
}
