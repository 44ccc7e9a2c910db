#![no_main]

use libfuzzer_sys::fuzz_target;
use probecore::config::ProbeConfig;
use probecore::probe::ProbeSetup;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(config) = ProbeConfig::from_toml_str(input) {
            // Huge capacities would only measure the allocator
            if config.counter_capacity <= 1 << 16
                && config.dispatch_slots <= 1 << 16
                && config.ring_capacity <= 1 << 16
            {
                let _ = ProbeSetup::initialize(config);
            }
        }
    }
});
