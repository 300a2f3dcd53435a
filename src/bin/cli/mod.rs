pub mod args;
pub mod plain;

/// Exit codes for different error conditions
pub mod exit_codes {
    /// Clean shutdown (ctrl-c)
    pub const SUCCESS: u8 = 0;
    /// Queue manager unreachable (host down, connection refused, timeout)
    pub const NETWORK_ERROR: u8 = 1;
    /// Credentials or certificate rejected
    pub const AUTH_ERROR: u8 = 2;
    /// Invalid command line or channel configuration
    pub const CONFIG_ERROR: u8 = 3;
    /// Queue could not be opened
    pub const QUEUE_ERROR: u8 = 4;
    /// Connection lost while consuming
    pub const CONNECTION_LOST: u8 = 5;
}
