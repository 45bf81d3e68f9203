pub mod commands;
pub mod loopback;
