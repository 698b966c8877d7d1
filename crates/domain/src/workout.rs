use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Local, Utc};

use crate::{
    CreateError, DeleteError, EventBus, MovementID, MovementRepository, MovementStore, Name, Page,
    ReadError, Reps, RestTimer, StoreEvent, SyncStatus, TemplateID, TemplateRepository,
    TemplateStore, Time, UpdateError, Weight, entity_id, persist,
};

const DEFAULT_REPS: u32 = 8;
const DEFAULT_REST_TIME: u32 = 60;

#[allow(async_fn_in_trait)]
pub trait WorkoutRepository {
    async fn read_workouts(&self) -> Result<Vec<Workout>, ReadError>;
    async fn read_workouts_page(&self, page: usize, limit: usize)
    -> Result<Page<Workout>, ReadError>;
    async fn create_workout(
        &self,
        name: Name,
        start_time: DateTime<Utc>,
    ) -> Result<Workout, CreateError>;
    async fn modify_workout(
        &self,
        id: WorkoutID,
        completed: Option<bool>,
        end_time: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<Workout, UpdateError>;
    async fn delete_workout(&self, id: WorkoutID) -> Result<WorkoutID, DeleteError>;
    async fn create_workout_exercise(
        &self,
        workout_id: WorkoutID,
        movement_id: MovementID,
        notes: Option<String>,
    ) -> Result<WorkoutExercise, CreateError>;
    async fn delete_workout_exercise(
        &self,
        id: WorkoutExerciseID,
    ) -> Result<WorkoutExerciseID, DeleteError>;
    async fn create_workout_set(
        &self,
        exercise_id: WorkoutExerciseID,
        set: WorkoutSet,
    ) -> Result<WorkoutSet, CreateError>;
    async fn update_workout_set(
        &self,
        id: WorkoutSetID,
        patch: WorkoutSetPatch,
    ) -> Result<WorkoutSet, UpdateError>;
    async fn delete_workout_set(&self, id: WorkoutSetID) -> Result<WorkoutSetID, DeleteError>;
}

/// One concrete, time-bounded workout session.
///
/// Created in progress and completed exactly once; sets are not meant to be
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Workout {
    pub id: WorkoutID,
    pub name: Name,
    pub exercises: Vec<WorkoutExercise>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub notes: Option<String>,
    pub sync: SyncStatus,
}

impl Workout {
    #[must_use]
    pub fn movements(&self) -> BTreeSet<MovementID> {
        self.exercises.iter().map(|e| e.movement_id).collect()
    }

    pub fn completed_sets(&self) -> impl Iterator<Item = &WorkoutSet> {
        self.exercises
            .iter()
            .flat_map(|e| e.sets.iter())
            .filter(|s| s.completed)
    }

    /// Total weight moved across completed sets (weight × reps, summed).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn volume_load(&self) -> u32 {
        self.completed_sets()
            .map(|s| (u32::from(s.reps) as f32 * f32::from(s.weight)).round() as u32)
            .sum()
    }

    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

entity_id!(WorkoutID);

/// One exercise slot within a workout, holding its performed sets in order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutExercise {
    pub id: WorkoutExerciseID,
    pub movement_id: MovementID,
    pub sets: Vec<WorkoutSet>,
    pub notes: Option<String>,
}

entity_id!(WorkoutExerciseID);

/// One performed unit: a weight/reps pair with a completion flag.
///
/// The movement id is denormalized from the owning exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSet {
    pub id: WorkoutSetID,
    pub movement_id: MovementID,
    pub weight: Weight,
    pub reps: Reps,
    pub completed: bool,
    pub rest_time: Option<Time>,
}

entity_id!(WorkoutSetID);

/// Partial field update for a workout set.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkoutSetPatch {
    pub weight: Option<Weight>,
    pub reps: Option<Reps>,
    pub completed: Option<bool>,
    pub rest_time: Option<Time>,
}

impl WorkoutSetPatch {
    fn apply(&self, set: &mut WorkoutSet) {
        if let Some(weight) = self.weight {
            set.weight = weight;
        }
        if let Some(reps) = self.reps {
            set.reps = reps;
        }
        if let Some(completed) = self.completed {
            set.completed = completed;
        }
        if let Some(rest_time) = self.rest_time {
            set.rest_time = Some(rest_time);
        }
    }
}

/// The workout session engine.
///
/// Owns the workout list, the single active-workout pointer and the shared
/// rest timer. At most one workout is in progress at any time; starting a
/// new one forces completion of the previous one.
pub struct WorkoutStore<R> {
    repository: R,
    workouts: Vec<Workout>,
    active_workout: Option<WorkoutID>,
    rest_timer: RestTimer,
    events: EventBus,
}

impl<R> WorkoutStore<R> {
    pub fn new(repository: R, events: EventBus) -> Self {
        Self {
            repository,
            workouts: Vec::new(),
            active_workout: None,
            rest_timer: RestTimer::new(),
            events,
        }
    }

    #[must_use]
    pub fn workout(&self, id: WorkoutID) -> Option<&Workout> {
        self.workouts.iter().find(|w| w.id == id)
    }

    #[must_use]
    pub fn workouts(&self) -> &[Workout] {
        &self.workouts
    }

    #[must_use]
    pub fn active_workout(&self) -> Option<&Workout> {
        self.active_workout.and_then(|id| self.workout(id))
    }

    /// Completed workouts, most recently started first.
    #[must_use]
    pub fn workout_history(&self) -> Vec<Workout> {
        let mut history = self
            .workouts
            .iter()
            .filter(|w| w.completed)
            .cloned()
            .collect::<Vec<_>>();
        history.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        history
    }

    #[must_use]
    pub fn rest_timer_active(&self) -> bool {
        self.rest_timer.is_active()
    }

    #[must_use]
    pub fn rest_time_remaining(&self) -> u32 {
        self.rest_timer.remaining()
    }

    /// Starts the shared rest countdown, pre-empting a running one.
    pub fn start_rest_timer(&mut self, seconds: u32) {
        self.rest_timer.start(seconds);
        self.events.publish(StoreEvent::RestTimerStarted { seconds });
    }

    /// Cancels the rest countdown. Safe to call when none is running.
    pub fn stop_rest_timer(&mut self) {
        self.rest_timer.stop();
        self.events.publish(StoreEvent::RestTimerStopped);
    }
}

impl<R: WorkoutRepository> WorkoutStore<R> {
    /// Replaces the in-memory mirror with the repository contents and
    /// re-derives the active-workout pointer.
    pub async fn load(&mut self) -> Result<(), ReadError> {
        self.workouts = self.repository.read_workouts().await?;
        self.active_workout = self.workouts.iter().find(|w| !w.completed).map(|w| w.id);
        self.events.publish(StoreEvent::WorkoutsChanged);
        Ok(())
    }

    /// One page of the persisted workout list, straight from the
    /// repository.
    pub async fn workout_page(&self, page: usize, limit: usize) -> Result<Page<Workout>, ReadError> {
        persist!(
            self.repository.read_workouts_page(page, limit),
            ReadError,
            "read",
            "workout page"
        )
    }

    /// Starts a new workout session, forcing completion of any session
    /// still in progress. Without a name, the session is named after the
    /// current date.
    pub async fn start_workout<M: MovementRepository>(
        &mut self,
        movements: &mut MovementStore<M>,
        name: Option<&str>,
    ) -> Result<Workout, CreateError> {
        if let Some(active_id) = self.active_workout {
            let _ = self.complete_workout(movements, active_id).await;
        }

        let name = match name {
            Some(name) => Name::new(name)?,
            None => Name::new(&format!("Workout {}", Local::now().format("%Y-%m-%d")))?,
        };

        let workout = persist!(
            self.repository.create_workout(name, Utc::now()),
            CreateError,
            "create",
            "workout"
        )?;
        self.active_workout = Some(workout.id);
        self.workouts.push(workout.clone());
        self.events.publish(StoreEvent::WorkoutsChanged);
        Ok(workout)
    }

    /// Materializes a workout from a template, in template order, skipping
    /// prescriptions whose movement no longer exists. `None` if the
    /// template is unknown.
    pub async fn start_workout_from_template<M, T>(
        &mut self,
        templates: &mut TemplateStore<T>,
        movements: &mut MovementStore<M>,
        template_id: TemplateID,
    ) -> Result<Option<Workout>, CreateError>
    where
        M: MovementRepository,
        T: TemplateRepository,
    {
        let Some(template) = templates.template(template_id).cloned() else {
            return Ok(None);
        };

        let workout = self
            .start_workout(movements, Some(template.name.as_str()))
            .await?;

        for prescription in &template.exercises {
            if movements.movement(prescription.movement_id).is_none() {
                continue;
            }
            let _ = self
                .materialize_exercise(
                    workout.id,
                    prescription.movement_id,
                    prescription.sets,
                    prescription.reps_per_set,
                    prescription.rest_time,
                )
                .await;
        }

        templates.mark_template_as_used(template_id).await;

        Ok(self.workout(workout.id).cloned())
    }

    /// Appends an exercise with `default_sets` empty sets to a workout.
    /// `None` if the workout or movement is unknown.
    pub async fn add_exercise_to_workout<M>(
        &mut self,
        movements: &MovementStore<M>,
        workout_id: WorkoutID,
        movement_id: MovementID,
        default_sets: u32,
    ) -> Option<WorkoutExercise> {
        self.workout(workout_id)?;
        movements.movement(movement_id)?;
        self.materialize_exercise(workout_id, movement_id, default_sets, None, None)
            .await
    }

    async fn materialize_exercise(
        &mut self,
        workout_id: WorkoutID,
        movement_id: MovementID,
        sets: u32,
        reps: Option<Reps>,
        rest_time: Option<Time>,
    ) -> Option<WorkoutExercise> {
        let index = self.workouts.iter().position(|w| w.id == workout_id)?;

        let result = persist!(
            self.repository
                .create_workout_exercise(workout_id, movement_id, None),
            CreateError,
            "create",
            "workout exercise"
        );
        let Ok(mut exercise) = result else {
            self.workouts[index].sync = SyncStatus::Failed;
            return None;
        };

        let reps = reps.unwrap_or_else(|| Reps::new(DEFAULT_REPS).unwrap_or_default());
        let rest_time =
            rest_time.unwrap_or_else(|| Time::new(DEFAULT_REST_TIME).unwrap_or_default());

        for _ in 0..sets {
            let set = WorkoutSet {
                id: WorkoutSetID::nil(),
                movement_id,
                weight: Weight::ZERO,
                reps,
                completed: false,
                rest_time: Some(rest_time),
            };
            let result = persist!(
                self.repository.create_workout_set(exercise.id, set),
                CreateError,
                "create",
                "workout set"
            );
            let Ok(set) = result else {
                self.workouts[index].sync = SyncStatus::Failed;
                return None;
            };
            exercise.sets.push(set);
        }

        self.workouts[index].exercises.push(exercise.clone());
        self.events.publish(StoreEvent::WorkoutsChanged);
        Some(exercise)
    }

    /// Removes an exercise and all its sets, remotely and locally. `false`
    /// if the workout or exercise is unknown.
    pub async fn remove_exercise_from_workout(
        &mut self,
        workout_id: WorkoutID,
        exercise_id: WorkoutExerciseID,
    ) -> bool {
        let Some(workout) = self.workouts.iter_mut().find(|w| w.id == workout_id) else {
            return false;
        };
        let Some(index) = workout.exercises.iter().position(|e| e.id == exercise_id) else {
            return false;
        };
        let exercise = workout.exercises.remove(index);
        let sync = workout.sync;
        workout.sync = SyncStatus::Pending;

        let mut synced = true;
        for set in &exercise.sets {
            synced &= persist!(
                self.repository.delete_workout_set(set.id),
                DeleteError,
                "delete",
                "workout set"
            )
            .is_ok();
        }
        synced &= persist!(
            self.repository.delete_workout_exercise(exercise_id),
            DeleteError,
            "delete",
            "workout exercise"
        )
        .is_ok();
        workout.sync = sync.after_write(synced);

        self.events.publish(StoreEvent::WorkoutsChanged);
        true
    }

    /// Marks a set as completed and starts the rest timer with the set's
    /// rest time. No-op if any id is unresolved.
    pub async fn complete_set(
        &mut self,
        workout_id: WorkoutID,
        exercise_id: WorkoutExerciseID,
        set_id: WorkoutSetID,
    ) {
        let Some(workout) = self.workouts.iter_mut().find(|w| w.id == workout_id) else {
            return;
        };
        let Some(exercise) = workout.exercises.iter_mut().find(|e| e.id == exercise_id) else {
            return;
        };
        let Some(set) = exercise.sets.iter_mut().find(|s| s.id == set_id) else {
            return;
        };

        set.completed = true;
        let rest_time = set.rest_time.map_or(DEFAULT_REST_TIME, u32::from);
        let sync = workout.sync;
        workout.sync = SyncStatus::Pending;

        let result = persist!(
            self.repository.update_workout_set(
                set_id,
                WorkoutSetPatch {
                    completed: Some(true),
                    ..WorkoutSetPatch::default()
                }
            ),
            UpdateError,
            "update",
            "workout set"
        );
        workout.sync = sync.after_write(result.is_ok());

        self.start_rest_timer(rest_time);
        self.events.publish(StoreEvent::WorkoutsChanged);
    }

    /// Applies a partial field update to a set. `None` if any id is
    /// unresolved.
    pub async fn update_set(
        &mut self,
        workout_id: WorkoutID,
        exercise_id: WorkoutExerciseID,
        set_id: WorkoutSetID,
        patch: WorkoutSetPatch,
    ) -> Option<WorkoutSet> {
        let workout = self.workouts.iter_mut().find(|w| w.id == workout_id)?;
        let exercise = workout.exercises.iter_mut().find(|e| e.id == exercise_id)?;
        let set = exercise.sets.iter_mut().find(|s| s.id == set_id)?;
        patch.apply(set);
        let set = set.clone();
        let sync = workout.sync;
        workout.sync = SyncStatus::Pending;

        let result = persist!(
            self.repository.update_workout_set(set_id, patch),
            UpdateError,
            "update",
            "workout set"
        );
        workout.sync = sync.after_write(result.is_ok());

        self.events.publish(StoreEvent::WorkoutsChanged);
        Some(set)
    }

    /// Completes a workout and runs the derivation pipeline: every
    /// completed set becomes one weight record on its movement. Completing
    /// an already-completed workout returns it unchanged without deriving
    /// records again.
    pub async fn complete_workout<M: MovementRepository>(
        &mut self,
        movements: &mut MovementStore<M>,
        workout_id: WorkoutID,
    ) -> Option<Workout> {
        let index = self.workouts.iter().position(|w| w.id == workout_id)?;
        if self.workouts[index].completed {
            return Some(self.workouts[index].clone());
        }

        let end_time = Utc::now();
        let sync = self.workouts[index].sync;
        {
            let workout = &mut self.workouts[index];
            workout.completed = true;
            workout.end_time = Some(end_time);
            workout.sync = SyncStatus::Pending;
        }
        if self.active_workout == Some(workout_id) {
            self.active_workout = None;
        }

        let result = persist!(
            self.repository
                .modify_workout(workout_id, Some(true), Some(end_time), None),
            UpdateError,
            "modify",
            "workout"
        );
        self.workouts[index].sync = sync.after_write(result.is_ok());

        let workout = self.workouts[index].clone();
        for exercise in &workout.exercises {
            for set in exercise.sets.iter().filter(|s| s.completed) {
                let _ = movements
                    .add_weight_record(
                        exercise.movement_id,
                        set.weight,
                        set.reps,
                        1,
                        Some(workout_id),
                    )
                    .await;
            }
        }

        self.events.publish(StoreEvent::WorkoutsChanged);
        Some(workout)
    }

    /// Deletes a workout and all its exercises and sets, remotely and
    /// locally.
    pub async fn delete_workout(&mut self, id: WorkoutID) -> bool {
        let Some(index) = self.workouts.iter().position(|w| w.id == id) else {
            return false;
        };
        let workout = self.workouts.remove(index);
        if self.active_workout == Some(id) {
            self.active_workout = None;
        }

        for exercise in &workout.exercises {
            for set in &exercise.sets {
                let _ = persist!(
                    self.repository.delete_workout_set(set.id),
                    DeleteError,
                    "delete",
                    "workout set"
                );
            }
            let _ = persist!(
                self.repository.delete_workout_exercise(exercise.id),
                DeleteError,
                "delete",
                "workout exercise"
            );
        }
        let _ = persist!(
            self.repository.delete_workout(id),
            DeleteError,
            "delete",
            "workout"
        );

        self.events.publish(StoreEvent::WorkoutsChanged);
        true
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    static WORKOUT: std::sync::LazyLock<Workout> = std::sync::LazyLock::new(|| Workout {
        id: 1.into(),
        name: Name::new("Push Day").unwrap(),
        exercises: vec![
            WorkoutExercise {
                id: 1.into(),
                movement_id: 1.into(),
                sets: vec![
                    set(1, 1, 50.0, 8, true),
                    set(2, 1, 60.0, 5, true),
                    set(3, 1, 60.0, 5, false),
                ],
                notes: None,
            },
            WorkoutExercise {
                id: 2.into(),
                movement_id: 2.into(),
                sets: vec![set(4, 2, 20.0, 12, true)],
                notes: None,
            },
        ],
        start_time: Utc::now() - Duration::minutes(45),
        end_time: Some(Utc::now()),
        completed: true,
        notes: None,
        sync: SyncStatus::Synced,
    });

    fn set(id: u128, movement_id: u128, weight: f32, reps: u32, completed: bool) -> WorkoutSet {
        WorkoutSet {
            id: id.into(),
            movement_id: movement_id.into(),
            weight: Weight::new(weight).unwrap(),
            reps: Reps::new(reps).unwrap(),
            completed,
            rest_time: Some(Time::new(60).unwrap()),
        }
    }

    #[test]
    fn test_workout_movements() {
        assert_eq!(WORKOUT.movements(), BTreeSet::from([1.into(), 2.into()]));
    }

    #[test]
    fn test_workout_completed_sets() {
        assert_eq!(
            WORKOUT
                .completed_sets()
                .map(|s| s.id)
                .collect::<Vec<WorkoutSetID>>(),
            vec![1.into(), 2.into(), 4.into()]
        );
    }

    #[test]
    fn test_workout_volume_load() {
        assert_eq!(WORKOUT.volume_load(), 400 + 300 + 240);
    }

    #[test]
    fn test_workout_duration() {
        let workout = WORKOUT.clone();
        assert!(workout.duration().is_some());

        let in_progress = Workout {
            end_time: None,
            completed: false,
            ..workout
        };
        assert_eq!(in_progress.duration(), None);
    }

    #[rstest]
    #[case(
        WorkoutSetPatch { weight: Some(Weight::new(70.0).unwrap()), ..WorkoutSetPatch::default() },
        Weight::new(70.0).unwrap(),
        Reps::new(8).unwrap(),
        false
    )]
    #[case(
        WorkoutSetPatch {
            reps: Some(Reps::new(5).unwrap()),
            completed: Some(true),
            ..WorkoutSetPatch::default()
        },
        Weight::new(50.0).unwrap(),
        Reps::new(5).unwrap(),
        true
    )]
    fn test_workout_set_patch_apply(
        #[case] patch: WorkoutSetPatch,
        #[case] weight: Weight,
        #[case] reps: Reps,
        #[case] completed: bool,
    ) {
        let mut s = set(1, 1, 50.0, 8, false);
        patch.apply(&mut s);
        assert_eq!(s.weight, weight);
        assert_eq!(s.reps, reps);
        assert_eq!(s.completed, completed);
    }

    #[test]
    fn test_workout_id_nil() {
        assert!(WorkoutID::nil().is_nil());
        assert_eq!(WorkoutID::nil(), WorkoutID::default());
    }
}
