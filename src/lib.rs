pub mod agent;
pub mod app;
pub mod config;
pub mod logging;
pub mod prompt;
pub mod runner;
pub mod runtime;
pub mod session;
pub mod state;
pub mod store;
pub mod terminal;
#[cfg(test)]
mod test_support;
pub mod types;
pub mod ui {
    pub mod input_metrics;
    pub mod layout;
    pub mod markdown;
    pub mod render;
    pub mod theme;
}
pub mod util;
