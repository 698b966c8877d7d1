use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use liftlog_domain::{
    CreateError, DeleteError, Movement, MovementID, MovementRepository, Name, Page, ReadError,
    Reps, StorageError, SyncStatus, TemplateExercise, TemplateExerciseID, TemplateExercisePatch,
    TemplateID, TemplateRepository, Time, UpdateError, Weight, WeightRecord, WeightRecordID,
    Workout, WorkoutExercise, WorkoutExerciseID, WorkoutID, WorkoutRepository, WorkoutSet,
    WorkoutSetID, WorkoutSetPatch, WorkoutTemplate,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::record::{
    Document, MovementDoc, Snapshot, TemplateDoc, TemplateExerciseDoc, WeightRecordDoc,
    WorkoutDoc, WorkoutExerciseDoc, WorkoutSetDoc,
};

/// One flat document collection, preserving insertion order.
struct Collection<D> {
    docs: Mutex<Vec<D>>,
}

impl<D: Document + Clone> Collection<D> {
    fn new() -> Self {
        Self {
            docs: Mutex::new(Vec::new()),
        }
    }

    async fn all(&self) -> Vec<D> {
        self.docs.lock().await.clone()
    }

    async fn get(&self, id: Uuid) -> Option<D> {
        self.docs.lock().await.iter().find(|d| d.id() == id).cloned()
    }

    async fn list(&self, page: usize, limit: usize) -> Page<D> {
        let docs = self.docs.lock().await;
        let limit = limit.max(1);
        let total_items = docs.len();
        Page {
            items: docs
                .iter()
                .skip(page.saturating_sub(1) * limit)
                .take(limit)
                .cloned()
                .collect(),
            total_items,
            total_pages: total_items.div_ceil(limit),
        }
    }

    async fn insert(&self, doc: D) {
        self.docs.lock().await.push(doc);
    }

    async fn update(&self, id: Uuid, f: impl FnOnce(&mut D)) -> Result<D, StorageError> {
        let mut docs = self.docs.lock().await;
        let doc = docs
            .iter_mut()
            .find(|d| d.id() == id)
            .ok_or(StorageError::NotFound)?;
        f(doc);
        Ok(doc.clone())
    }

    async fn remove(&self, id: Uuid) -> Result<(), StorageError> {
        let mut docs = self.docs.lock().await;
        let index = docs
            .iter()
            .position(|d| d.id() == id)
            .ok_or(StorageError::NotFound)?;
        docs.remove(index);
        Ok(())
    }

    async fn replace_all(&self, docs: Vec<D>) {
        *self.docs.lock().await = docs;
    }
}

struct Inner {
    movements: Collection<MovementDoc>,
    weight_records: Collection<WeightRecordDoc>,
    templates: Collection<TemplateDoc>,
    template_exercises: Collection<TemplateExerciseDoc>,
    workouts: Collection<WorkoutDoc>,
    workout_exercises: Collection<WorkoutExerciseDoc>,
    workout_sets: Collection<WorkoutSetDoc>,
    fail_writes: AtomicBool,
}

/// In-memory backend holding all collections behind one shared handle.
///
/// Writes can be made to fail with [`StorageError::NoConnection`] via
/// [`set_fail_writes`](InMemory::set_fail_writes) to exercise the
/// offline behavior of the stores.
#[derive(Clone)]
pub struct InMemory {
    inner: Arc<Inner>,
}

impl InMemory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                movements: Collection::new(),
                weight_records: Collection::new(),
                templates: Collection::new(),
                template_exercises: Collection::new(),
                workouts: Collection::new(),
                workout_exercises: Collection::new(),
                workout_sets: Collection::new(),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.inner.fail_writes.load(Ordering::Relaxed) {
            Err(StorageError::NoConnection)
        } else {
            Ok(())
        }
    }

    /// JSON snapshot of all collections.
    pub async fn dump(&self) -> Result<String, serde_json::Error> {
        let snapshot = Snapshot {
            movements: self.inner.movements.all().await,
            weight_records: self.inner.weight_records.all().await,
            templates: self.inner.templates.all().await,
            template_exercises: self.inner.template_exercises.all().await,
            workouts: self.inner.workouts.all().await,
            workout_exercises: self.inner.workout_exercises.all().await,
            workout_sets: self.inner.workout_sets.all().await,
        };
        serde_json::to_string(&snapshot)
    }

    /// Replaces all collections with the contents of a JSON snapshot.
    pub async fn restore(&self, json: &str) -> Result<(), serde_json::Error> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        self.inner.movements.replace_all(snapshot.movements).await;
        self.inner
            .weight_records
            .replace_all(snapshot.weight_records)
            .await;
        self.inner.templates.replace_all(snapshot.templates).await;
        self.inner
            .template_exercises
            .replace_all(snapshot.template_exercises)
            .await;
        self.inner.workouts.replace_all(snapshot.workouts).await;
        self.inner
            .workout_exercises
            .replace_all(snapshot.workout_exercises)
            .await;
        self.inner
            .workout_sets
            .replace_all(snapshot.workout_sets)
            .await;
        Ok(())
    }
}

impl Default for InMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn corrupt<E: std::error::Error + Send + Sync + 'static>(err: E) -> StorageError {
    StorageError::Other(Box::new(err))
}

fn movement(doc: &MovementDoc, records: &[WeightRecordDoc]) -> Result<Movement, StorageError> {
    Ok(Movement {
        id: doc.id.into(),
        name: Name::new(&doc.name).map_err(corrupt)?,
        description: doc.description.clone(),
        category: doc.category.clone(),
        records: records
            .iter()
            .filter(|r| r.movement == doc.id)
            .map(weight_record)
            .collect::<Result<_, _>>()?,
        sync: SyncStatus::Synced,
    })
}

fn weight_record(doc: &WeightRecordDoc) -> Result<WeightRecord, StorageError> {
    Ok(WeightRecord {
        id: doc.id.into(),
        weight: Weight::new(doc.weight).map_err(corrupt)?,
        date: doc.date,
        reps: Reps::new(doc.reps).map_err(corrupt)?,
        sets: doc.sets,
        workout_id: doc.workout.map(WorkoutID::from),
    })
}

fn template(
    doc: &TemplateDoc,
    exercises: &[TemplateExerciseDoc],
) -> Result<WorkoutTemplate, StorageError> {
    Ok(WorkoutTemplate {
        id: doc.id.into(),
        name: Name::new(&doc.name).map_err(corrupt)?,
        description: doc.description.clone(),
        exercises: exercises
            .iter()
            .filter(|e| e.template == doc.id)
            .map(template_exercise)
            .collect::<Result<_, _>>()?,
        last_used: doc.last_used,
        sync: SyncStatus::Synced,
    })
}

fn template_exercise(doc: &TemplateExerciseDoc) -> Result<TemplateExercise, StorageError> {
    Ok(TemplateExercise {
        id: doc.id.into(),
        movement_id: doc.movement.into(),
        sets: doc.sets,
        reps_per_set: doc.reps_per_set.map(Reps::new).transpose().map_err(corrupt)?,
        rest_time: doc.rest_time.map(Time::new).transpose().map_err(corrupt)?,
        notes: doc.notes.clone(),
    })
}

fn workout(
    doc: &WorkoutDoc,
    exercises: &[WorkoutExerciseDoc],
    sets: &[WorkoutSetDoc],
) -> Result<Workout, StorageError> {
    Ok(Workout {
        id: doc.id.into(),
        name: Name::new(&doc.name).map_err(corrupt)?,
        exercises: exercises
            .iter()
            .filter(|e| e.workout == doc.id)
            .map(|e| workout_exercise(e, sets))
            .collect::<Result<_, _>>()?,
        start_time: doc.start_time,
        end_time: doc.end_time,
        completed: doc.completed,
        notes: doc.notes.clone(),
        sync: SyncStatus::Synced,
    })
}

fn workout_exercise(
    doc: &WorkoutExerciseDoc,
    sets: &[WorkoutSetDoc],
) -> Result<WorkoutExercise, StorageError> {
    Ok(WorkoutExercise {
        id: doc.id.into(),
        movement_id: doc.movement.into(),
        sets: sets
            .iter()
            .filter(|s| s.exercise == doc.id)
            .map(workout_set)
            .collect::<Result<_, _>>()?,
        notes: doc.notes.clone(),
    })
}

fn workout_set(doc: &WorkoutSetDoc) -> Result<WorkoutSet, StorageError> {
    Ok(WorkoutSet {
        id: doc.id.into(),
        movement_id: doc.movement.into(),
        weight: Weight::new(doc.weight).map_err(corrupt)?,
        reps: Reps::new(doc.reps).map_err(corrupt)?,
        completed: doc.completed,
        rest_time: doc.rest_time.map(Time::new).transpose().map_err(corrupt)?,
    })
}

impl MovementRepository for InMemory {
    async fn read_movements(&self) -> Result<Vec<Movement>, ReadError> {
        let docs = self.inner.movements.all().await;
        let records = self.inner.weight_records.all().await;
        Ok(docs
            .iter()
            .map(|d| movement(d, &records))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create_movement(
        &self,
        name: Name,
        description: Option<String>,
        category: Option<String>,
    ) -> Result<Movement, CreateError> {
        self.check_writable()?;
        let now = Utc::now();
        let doc = MovementDoc {
            id: Uuid::new_v4(),
            name: name.as_str().to_string(),
            description,
            category,
            created: now,
            updated: now,
        };
        self.inner.movements.insert(doc.clone()).await;
        Ok(movement(&doc, &[])?)
    }

    async fn modify_movement(
        &self,
        id: MovementID,
        name: Option<Name>,
        description: Option<String>,
        category: Option<String>,
    ) -> Result<Movement, UpdateError> {
        self.check_writable()?;
        let doc = self
            .inner
            .movements
            .update(*id, |doc| {
                if let Some(name) = name {
                    doc.name = name.as_str().to_string();
                }
                if let Some(description) = description {
                    doc.description = Some(description);
                }
                if let Some(category) = category {
                    doc.category = Some(category);
                }
                doc.updated = Utc::now();
            })
            .await?;
        let records = self.inner.weight_records.all().await;
        Ok(movement(&doc, &records)?)
    }

    async fn delete_movement(&self, id: MovementID) -> Result<MovementID, DeleteError> {
        self.check_writable()?;
        self.inner.movements.remove(*id).await?;
        Ok(id)
    }

    async fn create_weight_record(
        &self,
        movement_id: MovementID,
        record: WeightRecord,
    ) -> Result<WeightRecord, CreateError> {
        self.check_writable()?;
        self.inner
            .movements
            .get(*movement_id)
            .await
            .ok_or(StorageError::NotFound)?;
        let now = Utc::now();
        let doc = WeightRecordDoc {
            id: Uuid::new_v4(),
            movement: *movement_id,
            weight: record.weight.into(),
            date: record.date,
            reps: record.reps.into(),
            sets: record.sets,
            workout: record.workout_id.map(|id| *id),
            created: now,
            updated: now,
        };
        self.inner.weight_records.insert(doc.clone()).await;
        Ok(weight_record(&doc)?)
    }

    async fn delete_weight_record(
        &self,
        id: WeightRecordID,
    ) -> Result<WeightRecordID, DeleteError> {
        self.check_writable()?;
        self.inner.weight_records.remove(*id).await?;
        Ok(id)
    }
}

impl TemplateRepository for InMemory {
    async fn read_templates(&self) -> Result<Vec<WorkoutTemplate>, ReadError> {
        let docs = self.inner.templates.all().await;
        let exercises = self.inner.template_exercises.all().await;
        Ok(docs
            .iter()
            .map(|d| template(d, &exercises))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create_template(
        &self,
        name: Name,
        description: Option<String>,
    ) -> Result<WorkoutTemplate, CreateError> {
        self.check_writable()?;
        let now = Utc::now();
        let doc = TemplateDoc {
            id: Uuid::new_v4(),
            name: name.as_str().to_string(),
            description,
            last_used: None,
            created: now,
            updated: now,
        };
        self.inner.templates.insert(doc.clone()).await;
        Ok(template(&doc, &[])?)
    }

    async fn modify_template(
        &self,
        id: TemplateID,
        name: Option<Name>,
        description: Option<String>,
        last_used: Option<DateTime<Utc>>,
    ) -> Result<WorkoutTemplate, UpdateError> {
        self.check_writable()?;
        let doc = self
            .inner
            .templates
            .update(*id, |doc| {
                if let Some(name) = name {
                    doc.name = name.as_str().to_string();
                }
                if let Some(description) = description {
                    doc.description = Some(description);
                }
                if let Some(last_used) = last_used {
                    doc.last_used = Some(last_used);
                }
                doc.updated = Utc::now();
            })
            .await?;
        let exercises = self.inner.template_exercises.all().await;
        Ok(template(&doc, &exercises)?)
    }

    async fn delete_template(&self, id: TemplateID) -> Result<TemplateID, DeleteError> {
        self.check_writable()?;
        self.inner.templates.remove(*id).await?;
        Ok(id)
    }

    async fn create_template_exercise(
        &self,
        template_id: TemplateID,
        exercise: TemplateExercise,
    ) -> Result<TemplateExercise, CreateError> {
        self.check_writable()?;
        self.inner
            .templates
            .get(*template_id)
            .await
            .ok_or(StorageError::NotFound)?;
        self.inner
            .movements
            .get(*exercise.movement_id)
            .await
            .ok_or(StorageError::NotFound)?;
        let now = Utc::now();
        let doc = TemplateExerciseDoc {
            id: Uuid::new_v4(),
            template: *template_id,
            movement: *exercise.movement_id,
            sets: exercise.sets,
            reps_per_set: exercise.reps_per_set.map(Into::into),
            rest_time: exercise.rest_time.map(Into::into),
            notes: exercise.notes,
            created: now,
            updated: now,
        };
        self.inner.template_exercises.insert(doc.clone()).await;
        Ok(template_exercise(&doc)?)
    }

    async fn update_template_exercise(
        &self,
        id: TemplateExerciseID,
        patch: TemplateExercisePatch,
    ) -> Result<TemplateExercise, UpdateError> {
        self.check_writable()?;
        let doc = self
            .inner
            .template_exercises
            .update(*id, |doc| {
                if let Some(sets) = patch.sets {
                    doc.sets = sets;
                }
                if let Some(reps_per_set) = patch.reps_per_set {
                    doc.reps_per_set = Some(reps_per_set.into());
                }
                if let Some(rest_time) = patch.rest_time {
                    doc.rest_time = Some(rest_time.into());
                }
                if let Some(notes) = patch.notes {
                    doc.notes = Some(notes);
                }
                doc.updated = Utc::now();
            })
            .await?;
        Ok(template_exercise(&doc)?)
    }

    async fn delete_template_exercise(
        &self,
        id: TemplateExerciseID,
    ) -> Result<TemplateExerciseID, DeleteError> {
        self.check_writable()?;
        self.inner.template_exercises.remove(*id).await?;
        Ok(id)
    }
}

impl WorkoutRepository for InMemory {
    async fn read_workouts(&self) -> Result<Vec<Workout>, ReadError> {
        let docs = self.inner.workouts.all().await;
        let exercises = self.inner.workout_exercises.all().await;
        let sets = self.inner.workout_sets.all().await;
        Ok(docs
            .iter()
            .map(|d| workout(d, &exercises, &sets))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn read_workouts_page(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<Page<Workout>, ReadError> {
        let page = self.inner.workouts.list(page, limit).await;
        let exercises = self.inner.workout_exercises.all().await;
        let sets = self.inner.workout_sets.all().await;
        Ok(Page {
            items: page
                .items
                .iter()
                .map(|d| workout(d, &exercises, &sets))
                .collect::<Result<Vec<_>, StorageError>>()?,
            total_items: page.total_items,
            total_pages: page.total_pages,
        })
    }

    async fn create_workout(
        &self,
        name: Name,
        start_time: DateTime<Utc>,
    ) -> Result<Workout, CreateError> {
        self.check_writable()?;
        let now = Utc::now();
        let doc = WorkoutDoc {
            id: Uuid::new_v4(),
            name: name.as_str().to_string(),
            start_time,
            end_time: None,
            completed: false,
            notes: None,
            created: now,
            updated: now,
        };
        self.inner.workouts.insert(doc.clone()).await;
        Ok(workout(&doc, &[], &[])?)
    }

    async fn modify_workout(
        &self,
        id: WorkoutID,
        completed: Option<bool>,
        end_time: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<Workout, UpdateError> {
        self.check_writable()?;
        let doc = self
            .inner
            .workouts
            .update(*id, |doc| {
                if let Some(completed) = completed {
                    doc.completed = completed;
                }
                if let Some(end_time) = end_time {
                    doc.end_time = Some(end_time);
                }
                if let Some(notes) = notes {
                    doc.notes = Some(notes);
                }
                doc.updated = Utc::now();
            })
            .await?;
        let exercises = self.inner.workout_exercises.all().await;
        let sets = self.inner.workout_sets.all().await;
        Ok(workout(&doc, &exercises, &sets)?)
    }

    async fn delete_workout(&self, id: WorkoutID) -> Result<WorkoutID, DeleteError> {
        self.check_writable()?;
        self.inner.workouts.remove(*id).await?;
        Ok(id)
    }

    async fn create_workout_exercise(
        &self,
        workout_id: WorkoutID,
        movement_id: MovementID,
        notes: Option<String>,
    ) -> Result<WorkoutExercise, CreateError> {
        self.check_writable()?;
        self.inner
            .workouts
            .get(*workout_id)
            .await
            .ok_or(StorageError::NotFound)?;
        self.inner
            .movements
            .get(*movement_id)
            .await
            .ok_or(StorageError::NotFound)?;
        let now = Utc::now();
        let doc = WorkoutExerciseDoc {
            id: Uuid::new_v4(),
            workout: *workout_id,
            movement: *movement_id,
            notes,
            created: now,
            updated: now,
        };
        self.inner.workout_exercises.insert(doc.clone()).await;
        Ok(workout_exercise(&doc, &[])?)
    }

    async fn delete_workout_exercise(
        &self,
        id: WorkoutExerciseID,
    ) -> Result<WorkoutExerciseID, DeleteError> {
        self.check_writable()?;
        self.inner.workout_exercises.remove(*id).await?;
        Ok(id)
    }

    async fn create_workout_set(
        &self,
        exercise_id: WorkoutExerciseID,
        set: WorkoutSet,
    ) -> Result<WorkoutSet, CreateError> {
        self.check_writable()?;
        self.inner
            .workout_exercises
            .get(*exercise_id)
            .await
            .ok_or(StorageError::NotFound)?;
        let now = Utc::now();
        let doc = WorkoutSetDoc {
            id: Uuid::new_v4(),
            exercise: *exercise_id,
            movement: *set.movement_id,
            weight: set.weight.into(),
            reps: set.reps.into(),
            completed: set.completed,
            rest_time: set.rest_time.map(Into::into),
            created: now,
            updated: now,
        };
        self.inner.workout_sets.insert(doc.clone()).await;
        Ok(workout_set(&doc)?)
    }

    async fn update_workout_set(
        &self,
        id: WorkoutSetID,
        patch: WorkoutSetPatch,
    ) -> Result<WorkoutSet, UpdateError> {
        self.check_writable()?;
        let doc = self
            .inner
            .workout_sets
            .update(*id, |doc| {
                if let Some(weight) = patch.weight {
                    doc.weight = weight.into();
                }
                if let Some(reps) = patch.reps {
                    doc.reps = reps.into();
                }
                if let Some(completed) = patch.completed {
                    doc.completed = completed;
                }
                if let Some(rest_time) = patch.rest_time {
                    doc.rest_time = Some(rest_time.into());
                }
                doc.updated = Utc::now();
            })
            .await?;
        Ok(workout_set(&doc)?)
    }

    async fn delete_workout_set(&self, id: WorkoutSetID) -> Result<WorkoutSetID, DeleteError> {
        self.check_writable()?;
        self.inner.workout_sets.remove(*id).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let storage = InMemory::new();
        let movement = storage
            .create_movement(Name::new("Bench Press").unwrap(), None, None)
            .await
            .unwrap();

        let json = storage.dump().await.unwrap();
        let restored = InMemory::new();
        restored.restore(&json).await.unwrap();

        assert_eq!(restored.read_movements().await.unwrap(), vec![movement]);
    }

    #[tokio::test]
    async fn test_fail_writes_keeps_reads_working() {
        let storage = InMemory::new();
        storage
            .create_movement(Name::new("Squat").unwrap(), None, None)
            .await
            .unwrap();
        storage.set_fail_writes(true);

        assert!(matches!(
            storage.create_movement(Name::new("Deadlift").unwrap(), None, None).await,
            Err(CreateError::Storage(StorageError::NoConnection))
        ));
        assert_eq!(storage.read_movements().await.unwrap().len(), 1);
    }

    #[rstest]
    #[case(1, 2, 2, 2)]
    #[case(2, 2, 1, 2)]
    #[case(3, 2, 0, 2)]
    #[case(1, 10, 3, 1)]
    #[tokio::test]
    async fn test_read_workouts_page(
        #[case] page: usize,
        #[case] limit: usize,
        #[case] items: usize,
        #[case] total_pages: usize,
    ) {
        let storage = InMemory::new();
        for name in ["A", "B", "C"] {
            storage
                .create_workout(Name::new(name).unwrap(), Utc::now())
                .await
                .unwrap();
        }

        let result = storage.read_workouts_page(page, limit).await.unwrap();
        assert_eq!(result.items.len(), items);
        assert_eq!(result.total_items, 3);
        assert_eq!(result.total_pages, total_pages);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let storage = InMemory::new();
        assert!(matches!(
            storage
                .modify_movement(MovementID::nil(), None, None, None)
                .await,
            Err(UpdateError::Storage(StorageError::NotFound))
        ));
    }
}
