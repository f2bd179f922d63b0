pub mod attendance;
pub mod audit;
pub mod health;
pub mod me;
pub mod overrides;
pub mod webhooks;
