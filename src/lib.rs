// Library for tests to access modules

pub mod cascade;
pub mod cli;
pub mod collector;
pub mod config;
pub mod models;
pub mod report_writer;
pub mod ring_buffer;
pub mod scheduler;
pub mod version;
