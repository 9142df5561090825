//! Fuzz target for the TOML configuration parser and host resolution.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = dockline_config::AppConfig::parse(s) {
            // A validated config always resolves to a host.
            assert!(config.docker_host().is_ok());
        }
        let _ = dockline_config::DockerHost::parse(s);
    }
});
