pub mod cli;
pub mod config;
pub mod controller;
pub mod db;
pub mod dictation;
pub mod llm;
