pub mod api;
pub mod chain;
pub mod config;
pub mod faction;
pub mod interval;
pub mod notify;
pub mod poller;
pub mod selfwatch;
pub mod state;
pub mod store;
pub mod travel;
pub mod types;
pub mod watch;

/// Torn REST API base URL (key passed as a query parameter).
pub const TORN_API_BASE: &str = "https://api.torn.com";

/// Default on-disk state file path.
pub const STATE_PATH: &str = "sentry-state.json";
