pub mod actions;
pub mod health;
pub mod node;
pub mod processes;
