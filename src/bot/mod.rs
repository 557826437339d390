pub mod action;
pub mod commands;
pub mod context;
pub mod controller;
pub mod handlers;
pub mod render;
pub mod state;

pub type HandlerResult = anyhow::Result<()>;

pub use commands::Command;
pub use context::AppContext;
pub use handlers::build_schema;
