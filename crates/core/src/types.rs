/// Users are identified by the UUID issued by the auth service.
pub type UserId = uuid::Uuid;

/// Books are identified by the UUID assigned at upload time.
pub type BookId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
