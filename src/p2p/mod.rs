pub mod ban_list;
pub mod close_connection_reason;
pub mod connection;
pub mod connection_config;
pub mod connection_set;
pub mod connection_state;
pub mod listener;
pub mod network_node;
pub mod prelude;
pub mod rule_violation;
pub mod shutdown;
pub mod statistic;
pub mod statistic_reporter;
pub mod throttle;

// the reader owns the violation and throttle state of a connection, the writer owns the socket
// write half. Both are spawned by `Connection` and reachable only through it.
mod input_handler;
mod writer;
