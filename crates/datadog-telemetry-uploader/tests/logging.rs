// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

// Installs the global subscriber, so it lives in its own test binary.

use datadog_telemetry_uploader::logger::init_logging;
use datadog_telemetry_uploader::ConfigError;

#[test]
fn test_init_logging_rejects_garbage_level() {
    assert!(matches!(
        init_logging("telemetry=chatty"),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn test_init_logging_twice_is_fine() {
    assert!(init_logging("debug").is_ok());
    assert!(init_logging("info").is_ok());
    tracing::info!("LOGGER | still logging after a second install");
}
