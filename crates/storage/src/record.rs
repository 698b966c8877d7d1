use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A flat persisted document with a stable id.
///
/// Aggregates are stored disassembled into one document per entity and
/// linked by foreign-key ids, matching the flat collection layout of the
/// backing store.
pub trait Document {
    fn id(&self) -> Uuid;
}

macro_rules! document {
    ($name:ident) => {
        impl Document for $name {
            fn id(&self) -> Uuid {
                self.id
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementDoc {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

document!(MovementDoc);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightRecordDoc {
    pub id: Uuid,
    pub movement: Uuid,
    pub weight: f32,
    pub date: DateTime<Utc>,
    pub reps: u32,
    pub sets: u32,
    pub workout: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

document!(WeightRecordDoc);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateDoc {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub last_used: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

document!(TemplateDoc);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateExerciseDoc {
    pub id: Uuid,
    pub template: Uuid,
    pub movement: Uuid,
    pub sets: u32,
    pub reps_per_set: Option<u32>,
    pub rest_time: Option<u32>,
    pub notes: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

document!(TemplateExerciseDoc);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutDoc {
    pub id: Uuid,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub notes: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

document!(WorkoutDoc);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutExerciseDoc {
    pub id: Uuid,
    pub workout: Uuid,
    pub movement: Uuid,
    pub notes: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

document!(WorkoutExerciseDoc);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSetDoc {
    pub id: Uuid,
    pub exercise: Uuid,
    pub movement: Uuid,
    pub weight: f32,
    pub reps: u32,
    pub completed: bool,
    pub rest_time: Option<u32>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

document!(WorkoutSetDoc);

/// Serializable snapshot of all collections, in insertion order.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub movements: Vec<MovementDoc>,
    pub weight_records: Vec<WeightRecordDoc>,
    pub templates: Vec<TemplateDoc>,
    pub template_exercises: Vec<TemplateExerciseDoc>,
    pub workouts: Vec<WorkoutDoc>,
    pub workout_exercises: Vec<WorkoutExerciseDoc>,
    pub workout_sets: Vec<WorkoutSetDoc>,
}
