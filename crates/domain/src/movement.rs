use chrono::{DateTime, Utc};

use crate::{
    CreateError, DeleteError, EventBus, Name, ReadError, Reps, StoreEvent, SyncStatus, UpdateError,
    Weight, WorkoutID, entity_id, persist,
};

#[allow(async_fn_in_trait)]
pub trait MovementRepository {
    async fn read_movements(&self) -> Result<Vec<Movement>, ReadError>;
    async fn create_movement(
        &self,
        name: Name,
        description: Option<String>,
        category: Option<String>,
    ) -> Result<Movement, CreateError>;
    async fn modify_movement(
        &self,
        id: MovementID,
        name: Option<Name>,
        description: Option<String>,
        category: Option<String>,
    ) -> Result<Movement, UpdateError>;
    async fn delete_movement(&self, id: MovementID) -> Result<MovementID, DeleteError>;
    async fn create_weight_record(
        &self,
        movement_id: MovementID,
        record: WeightRecord,
    ) -> Result<WeightRecord, CreateError>;
    async fn delete_weight_record(
        &self,
        id: WeightRecordID,
    ) -> Result<WeightRecordID, DeleteError>;
}

/// A named exercise definition, e.g. "Bench Press".
#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    pub id: MovementID,
    pub name: Name,
    pub description: Option<String>,
    pub category: Option<String>,
    pub records: Vec<WeightRecord>,
    pub sync: SyncStatus,
}

impl Movement {
    /// Weight records of this movement, most recent first.
    #[must_use]
    pub fn history(&self) -> Vec<WeightRecord> {
        let mut records = self.records.clone();
        records.sort_by(|a, b| b.date.cmp(&a.date));
        records
    }
}

entity_id!(MovementID);

/// One long-term progress data point, derived from a completed set.
///
/// Immutable once created and owned exclusively by its movement.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightRecord {
    pub id: WeightRecordID,
    pub weight: Weight,
    pub date: DateTime<Utc>,
    pub reps: Reps,
    pub sets: u32,
    pub workout_id: Option<WorkoutID>,
}

entity_id!(WeightRecordID);

/// Catalog of movements and their weight-record history.
///
/// Holds the in-memory mirror; every mutation is applied to the mirror
/// first and then persisted through the repository.
pub struct MovementStore<R> {
    repository: R,
    movements: Vec<Movement>,
    events: EventBus,
}

impl<R> MovementStore<R> {
    pub fn new(repository: R, events: EventBus) -> Self {
        Self {
            repository,
            movements: Vec::new(),
            events,
        }
    }

    #[must_use]
    pub fn movement(&self, id: MovementID) -> Option<&Movement> {
        self.movements.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    /// Weight records of the given movement, most recent first. Empty if
    /// the movement is unknown.
    #[must_use]
    pub fn movement_history(&self, id: MovementID) -> Vec<WeightRecord> {
        self.movement(id).map(Movement::history).unwrap_or_default()
    }
}

impl<R: MovementRepository> MovementStore<R> {
    /// Replaces the in-memory mirror with the repository contents.
    pub async fn load(&mut self) -> Result<(), ReadError> {
        self.movements = self.repository.read_movements().await?;
        self.events.publish(StoreEvent::MovementsChanged);
        Ok(())
    }

    /// Creates a movement, failing with a validation error before any
    /// persistence attempt if the name is empty.
    pub async fn create_movement(
        &mut self,
        name: &str,
        description: Option<String>,
        category: Option<String>,
    ) -> Result<Movement, CreateError> {
        let name = Name::new(name)?;
        let movement = persist!(
            self.repository.create_movement(name, description, category),
            CreateError,
            "create",
            "movement"
        )?;
        self.movements.push(movement.clone());
        self.events.publish(StoreEvent::MovementsChanged);
        Ok(movement)
    }

    pub async fn update_movement(
        &mut self,
        id: MovementID,
        name: Option<Name>,
        description: Option<String>,
        category: Option<String>,
    ) -> Option<Movement> {
        let movement = self.movements.iter_mut().find(|m| m.id == id)?;
        if let Some(name) = name.clone() {
            movement.name = name;
        }
        if let Some(description) = description.clone() {
            movement.description = Some(description);
        }
        if let Some(category) = category.clone() {
            movement.category = Some(category);
        }
        let sync = movement.sync;
        movement.sync = SyncStatus::Pending;

        let result = persist!(
            self.repository
                .modify_movement(id, name, description, category),
            UpdateError,
            "modify",
            "movement"
        );
        movement.sync = sync.after_write(result.is_ok());

        let movement = movement.clone();
        self.events.publish(StoreEvent::MovementsChanged);
        Some(movement)
    }

    /// Appends a weight record stamped with the current time.
    ///
    /// Silently skips unknown movement ids: this runs in bulk during
    /// workout completion and one dangling reference must not abort the
    /// batch.
    pub async fn add_weight_record(
        &mut self,
        movement_id: MovementID,
        weight: Weight,
        reps: Reps,
        sets: u32,
        workout_id: Option<WorkoutID>,
    ) -> Option<WeightRecord> {
        let index = self.movements.iter().position(|m| m.id == movement_id)?;

        let record = WeightRecord {
            id: WeightRecordID::nil(),
            weight,
            date: Utc::now(),
            reps,
            sets,
            workout_id,
        };

        let result = persist!(
            self.repository
                .create_weight_record(movement_id, record.clone()),
            CreateError,
            "create",
            "weight record"
        );

        let movement = &mut self.movements[index];
        let record = match result {
            Ok(created) => {
                movement.sync = movement.sync.after_write(true);
                created
            }
            Err(_) => {
                movement.sync = SyncStatus::Failed;
                record
            }
        };
        movement.records.push(record.clone());

        self.events.publish(StoreEvent::MovementsChanged);
        Some(record)
    }

    /// Deletes a movement and all its weight records, remotely and locally.
    pub async fn delete_movement(&mut self, id: MovementID) -> bool {
        let Some(index) = self.movements.iter().position(|m| m.id == id) else {
            return false;
        };
        let movement = self.movements.remove(index);

        for record in &movement.records {
            let _ = persist!(
                self.repository.delete_weight_record(record.id),
                DeleteError,
                "delete",
                "weight record"
            );
        }
        let _ = persist!(
            self.repository.delete_movement(id),
            DeleteError,
            "delete",
            "movement"
        );

        self.events.publish(StoreEvent::MovementsChanged);
        true
    }
}
