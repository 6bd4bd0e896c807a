/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use serde::{Deserialize, Serialize};
use stream_bridge::BridgeConfig;

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub(crate) bridge: BridgeConfig,
    pub(crate) demo: DemoConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DemoConfig {
    pub(crate) service_address: String,
    pub(crate) items: u32,
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn bridge_section_is_optional() {
        let config: Config = json5::from_str(
            r#"{
                // only the demo section is required
                demo: { service_address: "org.example.Numbers", items: 5 },
            }"#,
        )
        .expect("valid config");

        assert_eq!(config.bridge.credit_window, 100);
        assert_eq!(config.demo.items, 5);
    }

    #[test]
    fn unknown_bridge_field_is_rejected() {
        let parsed = json5::from_str::<Config>(
            r#"{
                bridge: { credit_windw: 10 },
                demo: { service_address: "org.example.Numbers", items: 5 },
            }"#,
        );

        assert!(parsed.is_err());
    }
}
