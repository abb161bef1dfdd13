pub mod database;
pub mod domain;
pub mod error;
pub mod events;
pub mod http;
pub mod rpc;
pub mod settings;
pub mod telemetry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Column names shared by the content and metrics tables

pub const ARTICLE_ID_FIELD_NAME: &str = "article_id";
pub const USER_ID_FIELD_NAME: &str = "user_id";
pub const CREATED_FIELD_NAME: &str = "created_at";
pub const UPDATED_FIELD_NAME: &str = "updated_at";

// expose domain module

pub use domain::*;
pub use error::ServiceError;
