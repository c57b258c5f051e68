// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Connection handle for the shared store.
//!
//! The handle wraps a rebuildable [`ConnectionManager`]. A service must come
//! up even when the store is down (the limiter fails open in that state), so
//! a failed initial connection leaves the slot empty and the availability
//! probe keeps trying to rebuild it.

use crate::error::Error;
use crate::keys;
use arc_swap::ArcSwapOption;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::Arc;

/// Shared handle to the store. Cheap to clone through an `Arc`.
pub struct StoreHandle {
    client: Client,
    manager: ArcSwapOption<ConnectionManager>,
}

impl StoreHandle {
    /// Builds a handle for the given redis URL and attempts the initial
    /// connection. A connection failure is not fatal: the handle starts
    /// disconnected and the probe rebuilds it.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = Client::open(url).map_err(|e| Error::InvalidEndpoint {
            details: e.to_string(),
        })?;
        let handle = Self {
            client,
            manager: ArcSwapOption::empty(),
        };
        if let Err(e) = handle.rebuild_connection().await {
            tracing::warn!(error = %e, url, "store unreachable at startup, starting disconnected");
        }
        Ok(handle)
    }

    /// Current connection, or [`Error::NotConnected`] when the initial
    /// connection never succeeded and has not been rebuilt yet.
    pub fn connection(&self) -> Result<ConnectionManager, Error> {
        match self.manager.load_full() {
            Some(manager) => Ok(manager.as_ref().clone()),
            None => Err(Error::NotConnected),
        }
    }

    /// Drops the current connection manager and establishes a fresh one.
    pub async fn rebuild_connection(&self) -> Result<(), Error> {
        let manager = self.client.get_connection_manager().await?;
        self.manager.store(Some(Arc::new(manager)));
        Ok(())
    }

    /// Lightweight liveness check.
    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Persists the limiter config as an opaque JSON value.
    pub async fn persist_config(&self, json: &str) -> Result<(), Error> {
        let mut conn = self.connection()?;
        let _: () = conn.set(keys::CONFIG_KEY, json).await?;
        Ok(())
    }

    /// Reads the persisted limiter config, if any.
    pub async fn fetch_config(&self) -> Result<Option<String>, Error> {
        let mut conn = self.connection()?;
        let value: Option<String> = conn.get(keys::CONFIG_KEY).await?;
        Ok(value)
    }
}
