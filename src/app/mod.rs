pub mod model;

pub use model::{DashboardCommand, DashboardModel, DashboardMsg, Focus};
