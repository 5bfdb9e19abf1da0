pub mod bench;
pub mod client;
pub mod history;
pub mod sweep;
