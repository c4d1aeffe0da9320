pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod logging;
pub mod models;
pub mod repository;
pub mod service;

pub use error::{AppError, AppResult};
pub use identity::{Claims, IdentityContext, UserType};
pub use service::MessageService;
