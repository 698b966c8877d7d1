use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::{
    CreateError, DeleteError, EventBus, MovementID, MovementStore, Name, ReadError, Reps,
    StoreEvent, SyncStatus, Time, UpdateError, entity_id, persist,
};

#[allow(async_fn_in_trait)]
pub trait TemplateRepository {
    async fn read_templates(&self) -> Result<Vec<WorkoutTemplate>, ReadError>;
    async fn create_template(
        &self,
        name: Name,
        description: Option<String>,
    ) -> Result<WorkoutTemplate, CreateError>;
    async fn modify_template(
        &self,
        id: TemplateID,
        name: Option<Name>,
        description: Option<String>,
        last_used: Option<DateTime<Utc>>,
    ) -> Result<WorkoutTemplate, UpdateError>;
    async fn delete_template(&self, id: TemplateID) -> Result<TemplateID, DeleteError>;
    async fn create_template_exercise(
        &self,
        template_id: TemplateID,
        exercise: TemplateExercise,
    ) -> Result<TemplateExercise, CreateError>;
    async fn update_template_exercise(
        &self,
        id: TemplateExerciseID,
        patch: TemplateExercisePatch,
    ) -> Result<TemplateExercise, UpdateError>;
    async fn delete_template_exercise(
        &self,
        id: TemplateExerciseID,
    ) -> Result<TemplateExerciseID, DeleteError>;
}

/// A reusable workout blueprint: an ordered sequence of prescriptions.
///
/// The exercise order is the execution order when the template is
/// materialized into a workout.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutTemplate {
    pub id: TemplateID,
    pub name: Name,
    pub description: Option<String>,
    pub exercises: Vec<TemplateExercise>,
    pub last_used: Option<DateTime<Utc>>,
    pub sync: SyncStatus,
}

impl WorkoutTemplate {
    #[must_use]
    pub fn num_sets(&self) -> u32 {
        self.exercises.iter().map(|e| e.sets).sum()
    }

    #[must_use]
    pub fn movements(&self) -> BTreeSet<MovementID> {
        self.exercises.iter().map(|e| e.movement_id).collect()
    }
}

entity_id!(TemplateID);

/// One prescribed exercise within a template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateExercise {
    pub id: TemplateExerciseID,
    pub movement_id: MovementID,
    pub sets: u32,
    pub reps_per_set: Option<Reps>,
    pub rest_time: Option<Time>,
    pub notes: Option<String>,
}

entity_id!(TemplateExerciseID);

/// Partial field update for a template exercise.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TemplateExercisePatch {
    pub sets: Option<u32>,
    pub reps_per_set: Option<Reps>,
    pub rest_time: Option<Time>,
    pub notes: Option<String>,
}

impl TemplateExercisePatch {
    fn apply(&self, exercise: &mut TemplateExercise) {
        if let Some(sets) = self.sets {
            exercise.sets = sets;
        }
        if let Some(reps_per_set) = self.reps_per_set {
            exercise.reps_per_set = Some(reps_per_set);
        }
        if let Some(rest_time) = self.rest_time {
            exercise.rest_time = Some(rest_time);
        }
        if let Some(ref notes) = self.notes {
            exercise.notes = Some(notes.clone());
        }
    }
}

/// Catalog of reusable workout blueprints.
pub struct TemplateStore<R> {
    repository: R,
    templates: Vec<WorkoutTemplate>,
    events: EventBus,
}

impl<R> TemplateStore<R> {
    pub fn new(repository: R, events: EventBus) -> Self {
        Self {
            repository,
            templates: Vec::new(),
            events,
        }
    }

    #[must_use]
    pub fn template(&self, id: TemplateID) -> Option<&WorkoutTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn templates(&self) -> &[WorkoutTemplate] {
        &self.templates
    }

    /// Templates that have been used at least once, most recently used
    /// first, truncated to `limit`.
    #[must_use]
    pub fn frequent_templates(&self, limit: usize) -> Vec<WorkoutTemplate> {
        let mut templates = self
            .templates
            .iter()
            .filter(|t| t.last_used.is_some())
            .cloned()
            .collect::<Vec<_>>();
        templates.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        templates.truncate(limit);
        templates
    }
}

impl<R: TemplateRepository> TemplateStore<R> {
    /// Replaces the in-memory mirror with the repository contents.
    pub async fn load(&mut self) -> Result<(), ReadError> {
        self.templates = self.repository.read_templates().await?;
        self.events.publish(StoreEvent::TemplatesChanged);
        Ok(())
    }

    pub async fn create_template(
        &mut self,
        name: &str,
        description: Option<String>,
    ) -> Result<WorkoutTemplate, CreateError> {
        let name = Name::new(name)?;
        let template = persist!(
            self.repository.create_template(name, description),
            CreateError,
            "create",
            "template"
        )?;
        self.templates.push(template.clone());
        self.events.publish(StoreEvent::TemplatesChanged);
        Ok(template)
    }

    pub async fn update_template(
        &mut self,
        id: TemplateID,
        name: Option<Name>,
        description: Option<String>,
    ) -> Option<WorkoutTemplate> {
        let template = self.templates.iter_mut().find(|t| t.id == id)?;
        if let Some(name) = name.clone() {
            template.name = name;
        }
        if let Some(description) = description.clone() {
            template.description = Some(description);
        }
        let sync = template.sync;
        template.sync = SyncStatus::Pending;

        let result = persist!(
            self.repository.modify_template(id, name, description, None),
            UpdateError,
            "modify",
            "template"
        );
        template.sync = sync.after_write(result.is_ok());

        let template = template.clone();
        self.events.publish(StoreEvent::TemplatesChanged);
        Some(template)
    }

    /// Appends a prescription to a template. Rejects unknown template or
    /// movement ids by returning `None`.
    pub async fn add_exercise_to_template<M>(
        &mut self,
        movements: &MovementStore<M>,
        template_id: TemplateID,
        movement_id: MovementID,
        sets: u32,
        reps_per_set: Option<Reps>,
        rest_time: Option<Time>,
    ) -> Option<TemplateExercise> {
        let index = self.templates.iter().position(|t| t.id == template_id)?;
        movements.movement(movement_id)?;

        let exercise = TemplateExercise {
            id: TemplateExerciseID::nil(),
            movement_id,
            sets,
            reps_per_set,
            rest_time,
            notes: None,
        };
        let result = persist!(
            self.repository
                .create_template_exercise(template_id, exercise.clone()),
            CreateError,
            "create",
            "template exercise"
        );

        let template = &mut self.templates[index];
        let exercise = match result {
            Ok(created) => {
                template.sync = template.sync.after_write(true);
                created
            }
            Err(_) => {
                template.sync = SyncStatus::Failed;
                exercise
            }
        };
        template.exercises.push(exercise.clone());

        self.events.publish(StoreEvent::TemplatesChanged);
        Some(exercise)
    }

    /// Removes a prescription, remotely and locally. `false` if the
    /// template or exercise is unknown.
    pub async fn remove_exercise_from_template(
        &mut self,
        template_id: TemplateID,
        exercise_id: TemplateExerciseID,
    ) -> bool {
        let Some(template) = self.templates.iter_mut().find(|t| t.id == template_id) else {
            return false;
        };
        let Some(index) = template.exercises.iter().position(|e| e.id == exercise_id) else {
            return false;
        };
        template.exercises.remove(index);
        let sync = template.sync;
        template.sync = SyncStatus::Pending;

        let result = persist!(
            self.repository.delete_template_exercise(exercise_id),
            DeleteError,
            "delete",
            "template exercise"
        );
        template.sync = sync.after_write(result.is_ok());

        self.events.publish(StoreEvent::TemplatesChanged);
        true
    }

    /// Applies a partial field update to a prescription.
    pub async fn update_template_exercise(
        &mut self,
        template_id: TemplateID,
        exercise_id: TemplateExerciseID,
        patch: TemplateExercisePatch,
    ) -> Option<TemplateExercise> {
        let template = self.templates.iter_mut().find(|t| t.id == template_id)?;
        let exercise = template.exercises.iter_mut().find(|e| e.id == exercise_id)?;
        patch.apply(exercise);
        let exercise = exercise.clone();
        let sync = template.sync;
        template.sync = SyncStatus::Pending;

        let result = persist!(
            self.repository.update_template_exercise(exercise_id, patch),
            UpdateError,
            "update",
            "template exercise"
        );
        template.sync = sync.after_write(result.is_ok());

        self.events.publish(StoreEvent::TemplatesChanged);
        Some(exercise)
    }

    /// Stamps the template with the current time as its last use.
    pub async fn mark_template_as_used(&mut self, id: TemplateID) {
        let Some(template) = self.templates.iter_mut().find(|t| t.id == id) else {
            return;
        };
        let last_used = Utc::now();
        template.last_used = Some(last_used);
        let sync = template.sync;
        template.sync = SyncStatus::Pending;

        let result = persist!(
            self.repository
                .modify_template(id, None, None, Some(last_used)),
            UpdateError,
            "modify",
            "template"
        );
        template.sync = sync.after_write(result.is_ok());

        self.events.publish(StoreEvent::TemplatesChanged);
    }

    /// Deletes a template and all its prescriptions, remotely and locally.
    pub async fn delete_template(&mut self, id: TemplateID) -> bool {
        let Some(index) = self.templates.iter().position(|t| t.id == id) else {
            return false;
        };
        let template = self.templates.remove(index);

        for exercise in &template.exercises {
            let _ = persist!(
                self.repository.delete_template_exercise(exercise.id),
                DeleteError,
                "delete",
                "template exercise"
            );
        }
        let _ = persist!(
            self.repository.delete_template(id),
            DeleteError,
            "delete",
            "template"
        );

        self.events.publish(StoreEvent::TemplatesChanged);
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;

    fn template(id: u128, last_used: Option<DateTime<Utc>>) -> WorkoutTemplate {
        WorkoutTemplate {
            id: id.into(),
            name: Name::new("Push Day").unwrap(),
            description: None,
            exercises: vec![
                TemplateExercise {
                    id: 1.into(),
                    movement_id: 1.into(),
                    sets: 3,
                    reps_per_set: Some(Reps::new(8).unwrap()),
                    rest_time: Some(Time::new(90).unwrap()),
                    notes: None,
                },
                TemplateExercise {
                    id: 2.into(),
                    movement_id: 2.into(),
                    sets: 4,
                    reps_per_set: None,
                    rest_time: None,
                    notes: None,
                },
            ],
            last_used,
            sync: SyncStatus::Synced,
        }
    }

    #[test]
    fn test_template_num_sets() {
        assert_eq!(template(1, None).num_sets(), 7);
    }

    #[test]
    fn test_template_movements() {
        assert_eq!(
            template(1, None).movements(),
            BTreeSet::from([1.into(), 2.into()])
        );
    }

    #[test]
    fn test_template_exercise_patch_apply() {
        let mut exercise = template(1, None).exercises[1].clone();
        TemplateExercisePatch {
            sets: Some(5),
            reps_per_set: Some(Reps::new(10).unwrap()),
            rest_time: None,
            notes: Some(String::from("pause at the bottom")),
        }
        .apply(&mut exercise);

        assert_eq!(exercise.sets, 5);
        assert_eq!(exercise.reps_per_set, Some(Reps::new(10).unwrap()));
        assert_eq!(exercise.rest_time, None);
        assert_eq!(exercise.notes, Some(String::from("pause at the bottom")));
    }

    #[test]
    fn test_template_id_nil() {
        assert!(TemplateID::nil().is_nil());
        assert_eq!(TemplateID::nil(), TemplateID::default());
    }

    #[test]
    fn test_frequent_templates_sorted_and_truncated() {
        let now = Utc::now();
        let events = EventBus::new();
        let mut store: TemplateStore<()> = TemplateStore::new((), events);
        store.templates = vec![
            template(1, None),
            template(2, Some(now - Duration::days(2))),
            template(3, Some(now)),
            template(4, Some(now - Duration::days(1))),
        ];

        assert_eq!(
            store
                .frequent_templates(2)
                .iter()
                .map(|t| t.id)
                .collect::<Vec<TemplateID>>(),
            vec![3.into(), 4.into()]
        );
    }
}
