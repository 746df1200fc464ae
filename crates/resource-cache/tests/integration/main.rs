// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod cancellation;
pub mod coalescing;
pub mod config;
pub mod utils;
