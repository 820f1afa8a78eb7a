pub mod handler;
pub mod model;
pub mod registry;

pub use handler::OperationHandler;
pub use model::{
    CallerIdentity, OperationDefinition, OperationRecord, OperationRequest, OperationStatus,
};
pub use registry::{NormalizedParams, OperationRegistry, ValidationError};
