pub mod client;
pub mod rest;
