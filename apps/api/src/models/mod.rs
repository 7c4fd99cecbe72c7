pub mod evaluation;
pub mod identity;
pub mod setup;
pub mod transcript;
