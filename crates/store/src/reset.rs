// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-algorithm state reset, run on algorithm switches.
//!
//! Deletion is best effort: a failed reset only means the first decisions
//! under the new algorithm may see residual state, which the admission
//! arithmetic tolerates. The caller logs and proceeds with the swap either
//! way.

use crate::error::Error;
use crate::handle::StoreHandle;
use crate::keys;
use redis::aio::ConnectionManager;

/// Upper bound on keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// Deletes all three algorithm key families.
pub async fn reset_algorithm_state(handle: &StoreHandle) -> Result<(), Error> {
    let mut conn = handle.connection()?;
    for pattern in keys::ALGORITHM_PATTERNS {
        scan_delete(&mut conn, pattern).await?;
    }
    Ok(())
}

/// Cursored SCAN over `pattern` with pipelined deletion per batch.
async fn scan_delete(conn: &mut ConnectionManager, pattern: &str) -> Result<(), Error> {
    let mut cursor: u64 = 0;
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await?;

        if !batch.is_empty() {
            let mut pipe = redis::pipe();
            for key in &batch {
                let _ = pipe.del(key).ignore();
            }
            let _: () = pipe.query_async(conn).await?;
        }

        cursor = next;
        if cursor == 0 {
            return Ok(());
        }
    }
}
