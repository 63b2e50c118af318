pub mod chat;
pub mod exam;
pub mod models;
pub mod runs;
