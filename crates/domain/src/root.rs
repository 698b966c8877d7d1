use tokio::sync::broadcast;

use crate::{
    CreateError, EventBus, MovementID, MovementRepository, MovementStore, ReadError, Reps,
    StoreEvent, TemplateExercise, TemplateID, TemplateRepository, TemplateStore, Time, Workout,
    WorkoutExercise, WorkoutID, WorkoutRepository, WorkoutStore,
};

/// Composition root wiring the three stores to one shared repository and
/// one shared event bus.
///
/// Cross-store operations live here so callers never have to thread one
/// store into another themselves.
pub struct RootStore<R> {
    pub movements: MovementStore<R>,
    pub templates: TemplateStore<R>,
    pub workouts: WorkoutStore<R>,
    events: EventBus,
}

impl<R: Clone> RootStore<R> {
    pub fn new(repository: R) -> Self {
        let events = EventBus::new();
        Self {
            movements: MovementStore::new(repository.clone(), events.clone()),
            templates: TemplateStore::new(repository.clone(), events.clone()),
            workouts: WorkoutStore::new(repository, events.clone()),
            events,
        }
    }
}

impl<R> RootStore<R> {
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl<R> RootStore<R>
where
    R: MovementRepository + TemplateRepository + WorkoutRepository,
{
    /// Loads all three mirrors. Movements first, as templates and
    /// workouts refer to them.
    pub async fn load(&mut self) -> Result<(), ReadError> {
        self.movements.load().await?;
        self.templates.load().await?;
        self.workouts.load().await?;
        Ok(())
    }

    pub async fn start_workout(&mut self, name: Option<&str>) -> Result<Workout, CreateError> {
        self.workouts.start_workout(&mut self.movements, name).await
    }

    pub async fn start_workout_from_template(
        &mut self,
        template_id: TemplateID,
    ) -> Result<Option<Workout>, CreateError> {
        self.workouts
            .start_workout_from_template(&mut self.templates, &mut self.movements, template_id)
            .await
    }

    pub async fn complete_workout(&mut self, workout_id: WorkoutID) -> Option<Workout> {
        self.workouts
            .complete_workout(&mut self.movements, workout_id)
            .await
    }

    pub async fn add_exercise_to_workout(
        &mut self,
        workout_id: WorkoutID,
        movement_id: MovementID,
        default_sets: u32,
    ) -> Option<WorkoutExercise> {
        self.workouts
            .add_exercise_to_workout(&self.movements, workout_id, movement_id, default_sets)
            .await
    }

    pub async fn add_exercise_to_template(
        &mut self,
        template_id: TemplateID,
        movement_id: MovementID,
        sets: u32,
        reps_per_set: Option<Reps>,
        rest_time: Option<Time>,
    ) -> Option<TemplateExercise> {
        self.templates
            .add_exercise_to_template(
                &self.movements,
                template_id,
                movement_id,
                sets,
                reps_per_set,
                rest_time,
            )
            .await
    }
}
