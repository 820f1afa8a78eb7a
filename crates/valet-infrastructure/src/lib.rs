//! File-backed storage, configuration, and built-in operation handlers.

pub mod config_service;
pub mod file_memory_store;
pub mod file_profile_repository;
pub mod file_session_repository;
pub mod handlers;
pub mod paths;
pub mod secret_storage;

pub use config_service::ConfigService;
pub use file_memory_store::FileMemoryStore;
pub use file_profile_repository::FileProfileRepository;
pub use file_session_repository::FileSessionRepository;
pub use handlers::{built_in_definitions, built_in_handlers};
pub use paths::ValetPaths;
pub use secret_storage::SecretStorage;
