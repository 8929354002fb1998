pub mod cli;
pub mod configuration;
pub mod consumer;
pub mod domain;
pub mod ports;
pub mod processors;
pub mod repositories;
pub mod startup;
