// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Prometheus text exposition.

use crate::error::Error;
use prometheus::{Encoder, Registry, TextEncoder};

/// Renders the registry in the Prometheus text exposition format 0.0.4.
pub fn render(registry: &Registry) -> Result<String, Error> {
    let encoder = TextEncoder::new();
    let families = registry.gather();
    let mut buf = Vec::new();
    encoder
        .encode(&families, &mut buf)
        .map_err(|e| Error::Exposition {
            details: e.to_string(),
        })?;
    String::from_utf8(buf).map_err(|e| Error::Exposition {
        details: e.to_string(),
    })
}
