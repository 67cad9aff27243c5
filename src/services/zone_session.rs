//! Zone editing session
//!
//! Holds the single active zone between creation and persistence. A new
//! zone replaces any unsaved one; `save` writes it to the store and
//! `delete` clears both.

use crate::domain::error::{GeofenceError, Result};
use crate::domain::zone::{RadiusUnit, Zone};
use crate::io::geocoder::Geocoder;
use crate::io::store::ZoneStore;
use anyhow::Context;
use tracing::{debug, info};

pub struct ZoneSession {
    store: ZoneStore,
    active: Option<Zone>,
    dirty: bool,
}

impl ZoneSession {
    /// Open a session on `store`, starting from the persisted zone
    pub fn open(store: ZoneStore) -> Self {
        let active = store.load();
        debug!(loaded = %active.is_some(), path = %store.path().display(), "zone_session_opened");
        Self { store, active, dirty: false }
    }

    pub fn active(&self) -> Option<&Zone> {
        self.active.as_ref()
    }

    /// True when the active zone differs from what was last saved or loaded
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Make `zone` the active zone, discarding any unsaved one
    pub fn create(&mut self, zone: Zone) -> &Zone {
        if self.dirty {
            debug!("zone_session_discarded_unsaved");
        }
        self.dirty = true;
        self.active.insert(zone)
    }

    /// Geocode `address` and make a circle around it the active zone
    pub async fn create_circle_from_address(
        &mut self,
        geocoder: &dyn Geocoder,
        address: &str,
        radius: f64,
        unit: RadiusUnit,
    ) -> Result<&Zone> {
        let address = address.trim();
        if address.is_empty() {
            return Err(GeofenceError::AddressNotFound(String::new()));
        }

        let radius_meters = unit.to_meters(radius);
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(GeofenceError::InvalidRadius(radius_meters));
        }

        let Some(center) = geocoder.geocode(address).await? else {
            return Err(GeofenceError::AddressNotFound(address.to_string()));
        };
        info!(address = %address, center = %center, radius_meters = %radius_meters, "address_geocoded");

        let zone = Zone::circle(center, radius_meters)?;
        Ok(self.create(zone))
    }

    /// Replace the active zone with an edited version
    pub fn edit(&mut self, zone: Zone) -> &Zone {
        if self.active.as_ref() != Some(&zone) {
            self.dirty = true;
        }
        self.active.insert(zone)
    }

    /// Persist the active zone and return it
    pub fn save(&mut self) -> anyhow::Result<&Zone> {
        let Some(zone) = self.active.as_ref() else {
            anyhow::bail!("no active zone to save");
        };
        self.store
            .save(zone)
            .with_context(|| format!("Failed to save zone to {}", self.store.path().display()))?;
        self.dirty = false;
        Ok(zone)
    }

    /// Drop the active zone and clear the store
    pub fn delete(&mut self) -> anyhow::Result<()> {
        self.store
            .clear()
            .with_context(|| format!("Failed to clear zone at {}", self.store.path().display()))?;
        self.active = None;
        self.dirty = false;
        Ok(())
    }
}
