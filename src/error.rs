use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    /// A required compose field is missing or unusable.
    #[snafu(display("Validation failed: {message}"))]
    Validation { message: String },

    /// The caller is neither sender nor recipient of the targeted message.
    #[snafu(display("Unauthorized"))]
    Unauthorized,

    /// The resource does not exist, or is hidden from the caller.
    #[snafu(display("Resource not found: {resource}"))]
    NotFound { resource: String },

    #[snafu(display("Message store unavailable"))]
    StorageUnavailable {
        #[snafu(source)]
        source: sqlx::Error,
    },

    #[snafu(display("Object store unavailable: {message}"))]
    ObjectStorage { message: String },

    #[snafu(display("Error running migrations"))]
    Migration {
        #[snafu(source)]
        source: sqlx::migrate::MigrateError,
    },

    #[snafu(display("Invalid configuration"))]
    Config {
        #[snafu(source)]
        source: envy::Error,
    },
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::StorageUnavailable { source }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::Migration { source }
    }
}

impl From<envy::Error> for Error {
    fn from(source: envy::Error) -> Self {
        Self::Config { source }
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn message_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: format!("message {id}"),
        }
    }

    pub fn object_storage(message: impl Into<String>) -> Self {
        Self::ObjectStorage {
            message: message.into(),
        }
    }
}
