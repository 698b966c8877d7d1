#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod error;
mod event;
mod measures;
mod movement;
mod name;
mod root;
mod template;
mod timer;
mod workout;

pub use error::{CreateError, DeleteError, ReadError, StorageError, SyncError, UpdateError};
pub use event::{EventBus, StoreEvent};
pub use measures::{Reps, RepsError, Time, TimeError, Weight, WeightError};
pub use movement::{
    Movement, MovementID, MovementRepository, MovementStore, WeightRecord, WeightRecordID,
};
pub use name::{Name, NameError};
pub use root::RootStore;
pub use template::{
    TemplateExercise, TemplateExerciseID, TemplateExercisePatch, TemplateID, TemplateRepository,
    TemplateStore, WorkoutTemplate,
};
pub use timer::RestTimer;
pub use workout::{
    Workout, WorkoutExercise, WorkoutExerciseID, WorkoutID, WorkoutRepository, WorkoutSet,
    WorkoutSetID, WorkoutSetPatch, WorkoutStore,
};

/// Persistence state of an aggregate held in an in-memory mirror.
///
/// Mutations are applied locally first and persisted best-effort afterwards,
/// so a mirror entry can be ahead of the remote store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Synced,
    Pending,
    Failed,
}

impl SyncStatus {
    /// Status of an aggregate after a best-effort write.
    ///
    /// A failed write marks the aggregate `Failed`. `Failed` is sticky: a
    /// later successful write does not re-send the data that diverged, so
    /// only reloading the mirror clears it.
    #[must_use]
    pub fn after_write(self, ok: bool) -> Self {
        if ok && self != Self::Failed {
            Self::Synced
        } else {
            Self::Failed
        }
    }
}

/// One page of a paginated repository read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: usize,
    pub total_pages: usize,
}

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            ::derive_more::Deref,
            Debug,
            Default,
            Clone,
            Copy,
            Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
        )]
        pub struct $name(::uuid::Uuid);

        impl $name {
            #[must_use]
            pub fn nil() -> Self {
                Self(::uuid::Uuid::nil())
            }

            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(value: ::uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<u128> for $name {
            fn from(value: u128) -> Self {
                Self(::uuid::Uuid::from_bytes(value.to_be_bytes()))
            }
        }
    };
}

macro_rules! persist {
    ($func:expr, $error:ident, $action:literal, $entity:literal) => {{
        let result = $func.await;
        if let Err(ref err) = result {
            match err {
                $error::Storage(crate::StorageError::NoConnection) => {
                    log::debug!("failed to {} {}: {err}", $action, $entity);
                }
                _ => {
                    log::error!("failed to {} {}: {err}", $action, $entity);
                }
            }
        }
        result
    }};
}

pub(crate) use entity_id;
pub(crate) use persist;
