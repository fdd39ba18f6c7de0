//! Lifecycle of the single privileged driver connection.

use crate::constants::GRAPHICS_CONTROL;
use crate::driver::MuxDriver;
use crate::error::ConnectError;
use crate::selector::{DispatchSelector, MuxClient};

/// Owner of the connection token. The slot is either empty (closed) or
/// holds the one open user-client session.
pub struct DriverHandle<D: MuxDriver> {
    driver: D,
    slot: Option<D::Connection>,
}

impl<D: MuxDriver> DriverHandle<D> {
    pub fn new(driver: D) -> Self {
        Self { driver, slot: None }
    }

    pub fn is_open(&self) -> bool {
        self.slot.is_some()
    }

    /// Selector access through the open connection, if there is one.
    pub fn client(&self) -> Option<MuxClient<'_, D>> {
        self.slot
            .as_ref()
            .map(|connection| MuxClient::new(&self.driver, connection))
    }

    /// Find the graphics control service, open a user client on it and
    /// perform the open handshake.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        if self.slot.is_some() {
            log::warn!("Refusing to open a second driver connection");
            return Err(ConnectError::AlreadyConnected);
        }

        let service = self
            .driver
            .matching_service(GRAPHICS_CONTROL)
            .map_err(|status| ConnectError::ServiceNotFound(Some(status)))?
            .ok_or(ConnectError::ServiceNotFound(None))?;

        let connection = self
            .driver
            .open_service(service)
            .map_err(ConnectError::ServiceOpenFailed)?;

        let client = MuxClient::new(&self.driver, &connection);
        if let Err(status) = client.call(DispatchSelector::Open) {
            if let Err(close_status) = self.driver.close_service(&connection) {
                log::error!("Releasing half-open connection returned {close_status}");
            }
            return Err(ConnectError::ClientOpenFailed(status));
        }

        self.slot = Some(connection);
        log::info!("Successfully connected");
        Ok(())
    }

    /// Close handshake, then release the service connection.
    ///
    /// Returns true without touching the driver when nothing is open. On
    /// failure the token stays in the slot so the close can be retried.
    pub fn close(&mut self) -> bool {
        let Some(connection) = self.slot.as_ref() else {
            return true;
        };

        let client = MuxClient::new(&self.driver, connection);
        if let Err(status) = client.call(DispatchSelector::Close) {
            log::error!("Close selector returned {status}");
            return false;
        }
        if let Err(status) = self.driver.close_service(connection) {
            log::error!("Releasing service connection returned {status}");
            return false;
        }

        self.slot = None;
        log::info!("Driver connection closed");
        true
    }
}

impl<D: MuxDriver> Drop for DriverHandle<D> {
    fn drop(&mut self) {
        if self.is_open() && !self.close() {
            log::warn!("Driver connection could not be closed on drop");
        }
    }
}
