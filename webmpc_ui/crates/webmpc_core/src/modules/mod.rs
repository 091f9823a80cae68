pub mod config;
pub mod connection;
pub mod db;
pub mod debounce;
pub mod dispatcher;
pub mod duration;
pub mod error;
pub mod player;
pub mod playlist;
pub mod queue;
pub mod status_watcher;
pub mod store;
pub mod transport;

pub(crate) mod timer;

#[cfg(test)]
pub(crate) mod testing;
