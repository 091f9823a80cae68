mod modules;

pub use modules::{
    config, connection, db, debounce, dispatcher, duration, error, player, playlist, queue,
    status_watcher, store, transport,
};

pub(crate) use modules::timer;
#[cfg(test)]
pub(crate) use modules::testing;

pub use webmpc_protocol as protocol;
