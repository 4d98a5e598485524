pub mod page_handler;

pub use page_handler::{
    __path_dashboard, __path_ping, about, dashboard, index, not_found, ping, DashboardState,
};
