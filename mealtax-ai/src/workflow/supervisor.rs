//! Background classification tasks
//!
//! Saving a meal never waits for classification. [`MealRecorder`] stores the
//! meal, then hands the run to a [`TaskSupervisor`], which keeps every
//! spawned task accounted for: failures and panics are logged, counted, and
//! never propagate into the caller. `drain` lets a CLI or test wait for all
//! outstanding runs before exiting.

use super::pipeline::ClassificationPipeline;
use super::storage::{AuditSink, MealStore};
use crate::models::Meal;
use mealtax_common::events::{AuditEvent, AuditRecord};
use mealtax_common::Result;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

struct Inner {
    in_flight: watch::Sender<usize>,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Tracks spawned background tasks
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(Inner {
                in_flight,
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Spawn `fut` on the runtime. The outcome is logged here; callers never
    /// see it.
    pub fn spawn<F>(&self, label: impl Into<String>, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        let inner = Arc::clone(&self.inner);
        inner.in_flight.send_modify(|n| *n += 1);

        let work = tokio::spawn(fut);
        tokio::spawn(async move {
            match work.await {
                Ok(Ok(())) => {
                    inner.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    inner.failed.fetch_add(1, Ordering::Relaxed);
                    error!(task = %label, error = %e, "Background task failed");
                }
                Err(join_err) => {
                    inner.failed.fetch_add(1, Ordering::Relaxed);
                    if join_err.is_panic() {
                        error!(task = %label, "Background task panicked");
                    } else {
                        warn!(task = %label, "Background task cancelled");
                    }
                }
            }
            inner.in_flight.send_modify(|n| *n = n.saturating_sub(1));
        });
    }

    /// Wait until no task is in flight
    pub async fn drain(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        // Sender lives in `inner`, which we hold, so the channel cannot close
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// [`drain`](Self::drain) with a deadline; false if tasks were still running
    pub async fn drain_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.drain()).await.is_ok()
    }

    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }
}

/// Stores meals and schedules their classification
pub struct MealRecorder {
    meals: Arc<dyn MealStore>,
    audit: Arc<dyn AuditSink>,
    pipeline: Arc<ClassificationPipeline>,
    supervisor: TaskSupervisor,
}

impl MealRecorder {
    pub fn new(
        meals: Arc<dyn MealStore>,
        audit: Arc<dyn AuditSink>,
        pipeline: Arc<ClassificationPipeline>,
        supervisor: TaskSupervisor,
    ) -> Self {
        Self {
            meals,
            audit,
            pipeline,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Store a meal and start classifying it in the background.
    ///
    /// Returns as soon as the meal row is written.
    pub async fn record_meal(&self, user_id: &str, notes_text: &str, lang: &str) -> Result<Meal> {
        let meal = Meal::new(user_id, notes_text, lang);
        self.meals.insert_meal(&meal).await?;
        info!(meal_id = %meal.id, "Meal stored");

        let created = AuditRecord::new(
            user_id,
            AuditEvent::MealCreated {
                meal_id: meal.id.clone(),
            },
        );
        if let Err(e) = self.audit.record(created).await {
            warn!(meal_id = %meal.id, error = %e, "Failed to write audit record");
        }

        let pipeline = Arc::clone(&self.pipeline);
        let task_meal = meal.clone();
        self.supervisor
            .spawn(format!("classify meal {}", meal.id), async move {
                pipeline
                    .try_process_meal(
                        &task_meal.user_id,
                        &task_meal.id,
                        &task_meal.notes_text,
                        &task_meal.language,
                    )
                    .await?;
                Ok(())
            });

        Ok(meal)
    }
}
