// src/groupchat/mod.rs

pub mod agent;
pub mod bridge;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod console;
pub mod error;
pub mod event;
pub mod history;
pub mod message;
pub mod selector;
pub mod team;
pub mod telemetry;
pub mod termination;
pub mod tool_protocol;
pub mod tool_protocols;
