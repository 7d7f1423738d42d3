//! Common test utilities for Pact integration tests
//!
//! Provides shared initialization code for all Pact tests, including
//! rustls crypto provider setup and mock server URL handling.

use std::sync::Once;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` so it is installed a single time across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // ring, matching the controller binary
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Mock server base URL without the trailing slash, usable as a Doppler host
pub fn host_from_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
