pub mod connection;

pub use connection::{classify_response, test_connection, ConnectionResult};
