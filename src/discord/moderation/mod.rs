// Discord adapter for the moderation engine.

pub mod commands;
pub mod events;
pub mod executor;
