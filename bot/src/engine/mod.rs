pub mod commands;
pub mod directory;
pub mod events;
pub mod membership;
pub mod permissions;
pub mod rate_limiter;
pub mod snapshot;
pub mod tracker;
pub mod validation;
