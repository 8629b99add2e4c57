//! Test doubles for code that drives the host.

mod mock_host;

pub use mock_host::MockHost;
