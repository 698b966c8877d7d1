use crate::NameError;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<ReadError> for SyncError {
    fn from(value: ReadError) -> Self {
        match value {
            ReadError::Storage(storage) => SyncError::Storage(storage),
            ReadError::Other(other) => SyncError::Other(other),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(thiserror::Error, Debug)]
pub enum CreateError {
    #[error(transparent)]
    Validation(#[from] NameError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(thiserror::Error, Debug)]
pub enum DeleteError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("no connection")]
    NoConnection,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_from_read_error() {
        assert!(matches!(
            SyncError::from(ReadError::Storage(StorageError::NoConnection)),
            SyncError::Storage(StorageError::NoConnection)
        ));
        assert!(matches!(
            SyncError::from(ReadError::Other("foo".into())),
            SyncError::Other(error) if error.to_string() == "foo"
        ));
    }

    #[test]
    fn test_create_error_from_name_error() {
        assert!(matches!(
            CreateError::from(NameError::Empty),
            CreateError::Validation(NameError::Empty)
        ));
    }

    #[test]
    fn test_storage_error_display() {
        assert_eq!(StorageError::NoConnection.to_string(), "no connection");
        assert_eq!(StorageError::NotFound.to_string(), "not found");
    }
}
