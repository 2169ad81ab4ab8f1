//! Companion-side registry of connected devices.
//!
//! The registry owns one [`DeviceHandle`] per connection, keyed by [`DeviceId`],
//! and remembers which device is selected. Anything that needs a device later
//! keeps its id and looks it up again; a removed device simply stops resolving.

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::engine::ProtocolEngine;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

/// A connected device: its display name and the engine talking to it
#[derive(Clone)]
pub struct DeviceHandle {
    id: DeviceId,
    name: String,
    engine: ProtocolEngine,
}

impl DeviceHandle {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.engine.state())
            .finish()
    }
}

#[derive(Default)]
struct Devices {
    handles: BTreeMap<DeviceId, DeviceHandle>,
    selected: Option<DeviceId>,
}

#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<Devices>,
    next_id: AtomicU64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Devices>> {
        self.devices
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_LOCK.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Devices>> {
        self.devices
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_LOCK.to_string()))
    }

    /// Take ownership of a new connection. The first device added becomes selected.
    pub fn add(&self, name: impl Into<String>, engine: ProtocolEngine) -> Result<DeviceId> {
        let id = DeviceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = DeviceHandle {
            id,
            name: name.into(),
            engine,
        };

        let mut devices = self.write()?;
        info!(%id, name = %handle.name, "Device added");
        devices.handles.insert(id, handle);
        if devices.selected.is_none() {
            devices.selected = Some(id);
        }
        Ok(id)
    }

    /// Drop a device, closing its connection. Clears the selection if it pointed here.
    pub fn remove(&self, id: DeviceId) -> Result<Option<DeviceHandle>> {
        let removed = {
            let mut devices = self.write()?;
            let removed = devices.handles.remove(&id);
            if devices.selected == Some(id) {
                devices.selected = None;
            }
            removed
        };

        if let Some(handle) = &removed {
            info!(%id, name = %handle.name, "Device removed");
            handle.engine.close()?;
        }
        Ok(removed)
    }

    pub fn get(&self, id: DeviceId) -> Result<Option<DeviceHandle>> {
        Ok(self.read()?.handles.get(&id).cloned())
    }

    pub fn select(&self, id: DeviceId) -> Result<()> {
        let mut devices = self.write()?;
        if !devices.handles.contains_key(&id) {
            return Err(ProtocolError::Custom(format!("Unknown device: {id}")));
        }
        debug!(%id, "Device selected");
        devices.selected = Some(id);
        Ok(())
    }

    pub fn selected(&self) -> Result<Option<DeviceHandle>> {
        let devices = self.read()?;
        Ok(devices
            .selected
            .and_then(|id| devices.handles.get(&id).cloned()))
    }

    /// Ids in the order devices were added
    pub fn ids(&self) -> Result<Vec<DeviceId>> {
        Ok(self.read()?.handles.keys().copied().collect())
    }

    pub fn len(&self) -> usize {
        self.read().map(|d| d.handles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
