//! Snapshot-on-read storage for scheduling constraints.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

use super::types::{
    parse_time_of_day, ConstraintUpdate, SchedulingConstraints, WeeklySchedule,
};

/// Persistence seam for constraint configuration.
///
/// The engine reads constraints through this trait so an application can
/// back it with whatever row or key-value store it already has.
#[async_trait]
pub trait ConstraintRepository: Send + Sync {
    async fn load_constraints(&self) -> Result<SchedulingConstraints>;
    async fn load_schedule(&self) -> Result<WeeklySchedule>;
    async fn load_vacations(&self) -> Result<HashSet<NaiveDate>>;
    async fn save_constraints(&self, constraints: &SchedulingConstraints) -> Result<()>;
    async fn save_vacations(&self, vacations: &HashSet<NaiveDate>) -> Result<()>;
}

/// In-memory constraint repository for tests and embedded use.
#[derive(Default)]
pub struct MemoryConstraintRepository {
    constraints: RwLock<SchedulingConstraints>,
    schedule: RwLock<WeeklySchedule>,
    vacations: RwLock<HashSet<NaiveDate>>,
}

impl MemoryConstraintRepository {
    pub fn new(constraints: SchedulingConstraints, schedule: WeeklySchedule) -> Self {
        Self {
            constraints: RwLock::new(constraints),
            schedule: RwLock::new(schedule),
            vacations: RwLock::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl ConstraintRepository for MemoryConstraintRepository {
    async fn load_constraints(&self) -> Result<SchedulingConstraints> {
        Ok(self.constraints.read().await.clone())
    }

    async fn load_schedule(&self) -> Result<WeeklySchedule> {
        Ok(self.schedule.read().await.clone())
    }

    async fn load_vacations(&self) -> Result<HashSet<NaiveDate>> {
        Ok(self.vacations.read().await.clone())
    }

    async fn save_constraints(&self, constraints: &SchedulingConstraints) -> Result<()> {
        *self.constraints.write().await = constraints.clone();
        Ok(())
    }

    async fn save_vacations(&self, vacations: &HashSet<NaiveDate>) -> Result<()> {
        *self.vacations.write().await = vacations.clone();
        Ok(())
    }
}

/// A copy of the full constraint state handed to a calculation.
///
/// Callers receive a snapshot, never a live reference, so a concurrent
/// configuration reload cannot change the rules halfway through a day.
#[derive(Debug, Clone)]
pub struct ConstraintSnapshot {
    pub constraints: SchedulingConstraints,
    pub schedule: WeeklySchedule,
    pub vacations: HashSet<NaiveDate>,
}

impl ConstraintSnapshot {
    /// Resolve the bookable window for a date.
    ///
    /// Returns `None` for vacation days and disabled weekdays. A weekday
    /// override supersedes the flat operating-hours fields.
    pub fn window_for(&self, date: NaiveDate) -> Option<(NaiveTime, NaiveTime)> {
        if self.vacations.contains(&date) {
            return None;
        }
        match self.schedule.for_weekday(date.weekday()) {
            Some(hours) if !hours.enabled => None,
            Some(hours) => Some((parse_time_of_day(&hours.start), parse_time_of_day(&hours.end))),
            None => Some(self.constraints.operating_window()),
        }
    }
}

struct Loaded {
    constraints: SchedulingConstraints,
    schedule: WeeklySchedule,
    vacations: HashSet<NaiveDate>,
}

/// Lazily loaded, explicitly invalidated constraint store.
///
/// Configuration is fetched from the repository on first use and kept in
/// memory until [`ConstraintStore::invalidate`] is called. It is never
/// silently re-fetched mid-calculation.
pub struct ConstraintStore {
    repository: Arc<dyn ConstraintRepository>,
    loaded: RwLock<Option<Loaded>>,
}

impl ConstraintStore {
    pub fn new(repository: Arc<dyn ConstraintRepository>) -> Self {
        Self {
            repository,
            loaded: RwLock::new(None),
        }
    }

    /// A snapshot copy of the full constraint state, loading it on first use.
    pub async fn snapshot(&self) -> Result<ConstraintSnapshot> {
        {
            let loaded = self.loaded.read().await;
            if let Some(ref l) = *loaded {
                return Ok(ConstraintSnapshot {
                    constraints: l.constraints.clone(),
                    schedule: l.schedule.clone(),
                    vacations: l.vacations.clone(),
                });
            }
        }

        let mut loaded = self.loaded.write().await;
        // Another task may have loaded while we waited for the write lock.
        if loaded.is_none() {
            debug!("Loading scheduling constraints from repository");
            *loaded = Some(Loaded {
                constraints: self.repository.load_constraints().await?,
                schedule: self.repository.load_schedule().await?,
                vacations: self.repository.load_vacations().await?,
            });
        }
        let l = loaded.as_ref().unwrap();
        Ok(ConstraintSnapshot {
            constraints: l.constraints.clone(),
            schedule: l.schedule.clone(),
            vacations: l.vacations.clone(),
        })
    }

    /// Current scheduling constraints (snapshot copy).
    pub async fn constraints(&self) -> Result<SchedulingConstraints> {
        Ok(self.snapshot().await?.constraints)
    }

    /// Apply a partial update, persist it, and swap the cached copy.
    ///
    /// Snapshots already handed out are unaffected.
    pub async fn update_constraints(
        &self,
        update: ConstraintUpdate,
    ) -> Result<SchedulingConstraints> {
        let mut constraints = self.snapshot().await?.constraints;
        update.validate(&constraints)?;
        update.apply_to(&mut constraints);
        self.repository.save_constraints(&constraints).await?;

        let mut loaded = self.loaded.write().await;
        if let Some(ref mut l) = *loaded {
            l.constraints = constraints.clone();
        }
        debug!("Updated scheduling constraints");
        Ok(constraints)
    }

    /// Mark a date as vacation.
    pub async fn add_vacation(&self, date: NaiveDate) -> Result<()> {
        let mut vacations = self.snapshot().await?.vacations;
        if vacations.insert(date) {
            self.repository.save_vacations(&vacations).await?;
            let mut loaded = self.loaded.write().await;
            if let Some(ref mut l) = *loaded {
                l.vacations = vacations;
            }
            debug!("Added vacation date: {}", date);
        }
        Ok(())
    }

    /// Remove a vacation date.
    pub async fn remove_vacation(&self, date: NaiveDate) -> Result<()> {
        let mut vacations = self.snapshot().await?.vacations;
        if vacations.remove(&date) {
            self.repository.save_vacations(&vacations).await?;
            let mut loaded = self.loaded.write().await;
            if let Some(ref mut l) = *loaded {
                l.vacations = vacations;
            }
            debug!("Removed vacation date: {}", date);
        }
        Ok(())
    }

    /// Drop the cached configuration; the next read reloads it.
    pub async fn invalidate(&self) {
        *self.loaded.write().await = None;
        debug!("Invalidated cached constraint configuration");
    }
}
