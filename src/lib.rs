pub mod action_sampler;
pub mod agent;
pub mod algorithms;
pub mod config;
pub mod error;
pub mod gym_env;
pub mod memory;
pub mod models;
pub mod plotting;
pub mod skill_policy;
