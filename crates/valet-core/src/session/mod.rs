pub mod model;
pub mod repository;

pub use model::{ChatTurn, Session, TurnRole};
pub use repository::SessionRepository;
