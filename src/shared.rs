pub mod types;
pub mod settings;
pub mod errors;
pub mod events;
pub mod emit;

pub use errors::{AppError, AppResult};
