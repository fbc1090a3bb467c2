//! Keep-alive messages. They do not refresh the activity timestamp of a connection.

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub nonce: u32,
    /// Round trip time of the previous ping in milliseconds.
    pub last_round_trip_time: u64,
}

impl Ping {
    pub fn new(nonce: u32, last_round_trip_time: u64) -> Self {
        Ping { nonce, last_round_trip_time }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub request_nonce: u32,
}

impl Pong {
    pub fn new(request_nonce: u32) -> Self {
        Pong { request_nonce }
    }
}
