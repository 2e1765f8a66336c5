pub mod app;

pub use app::commands;
pub use app::state::AppState;
