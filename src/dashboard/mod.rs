pub mod filter;
pub mod history;
pub mod hub;
pub mod session;

pub use hub::DashboardHub;
pub use session::run_dashboard_session;
