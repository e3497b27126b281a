#![forbid(unsafe_code)]

pub mod aggregate;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod form;
pub mod logging;
pub mod model;
pub mod parser;
pub mod poll;
pub mod table;
