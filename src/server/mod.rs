mod handlers;
mod models;
mod state;
mod util;

pub use handlers::run_server;
pub use util::resolve_work_dir;
