//! Typed client for a clustered deployment.
//!
//! Thin facade over the [`ClusterHandler`]: validates requests against
//! the cached codec registry, builds command payloads, routes writes to
//! the leader and reads to followers, and parses responses into typed
//! results. The registry cache is invalidated whenever the leader
//! connection is replaced.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::command;
use crate::config::ClusterConfig;
use crate::error::{Result, RoomzinError};
use crate::protocol::RawResult;
use crate::types::request::verify_prop_day;
use crate::types::{
    Codecs, PropertyAvailability, RoomDay, RoomDayKey, SearchAvailRequest, SearchPropRequest,
    SegmentInfo, SetPropRequest, SetRoomPkgRequest, UpdRoomAvlRequest,
};

use super::handler::ClusterHandler;

/// Typed cluster client.
pub struct Client {
    handler: Arc<ClusterHandler>,
    codecs: Arc<Mutex<Option<Codecs>>>,
}

impl Client {
    /// Build the router, wire the registry-invalidation callback and
    /// prefetch the codec registry.
    pub async fn connect(cfg: ClusterConfig) -> Result<Self> {
        let handler = ClusterHandler::new(cfg)?;
        let codecs = Arc::new(Mutex::new(None));

        let cache = codecs.clone();
        handler.set_topology_callback(Arc::new(move || {
            *lock(&cache) = None;
        }));

        let client = Self { handler, codecs };
        let initial = client.fetch_codecs().await?;
        *lock(&client.codecs) = Some(initial);
        Ok(client)
    }

    /// Current codec registry, fetching it when the cache is cold.
    pub async fn get_codecs(&self) -> Result<Codecs> {
        self.codecs().await
    }

    /// Register or replace a property.
    pub async fn set_prop(&self, req: &SetPropRequest) -> Result<()> {
        let codecs = self.codecs().await?;
        req.verify(&codecs)?;
        let result = self.write(command::build_set_prop(req)).await?;
        command::ensure_success(&result)
    }

    /// Search property identifiers by filters.
    pub async fn search_prop(&self, req: &SearchPropRequest) -> Result<Vec<String>> {
        let codecs = self.codecs().await?;
        req.verify(&codecs)?;
        let result = self.read(command::build_search_prop(req)).await?;
        command::parse_search_prop(&result)
    }

    /// Search availability across properties and dates.
    pub async fn search_avail(&self, req: &SearchAvailRequest) -> Result<Vec<PropertyAvailability>> {
        let codecs = self.codecs().await?;
        req.verify(&codecs)?;
        let result = self.read(command::build_search_avail(req)).await?;
        command::parse_search_avail(Some(&codecs), &result)
    }

    /// Assign availability, pricing and rate features to a room and date.
    pub async fn set_room_pkg(&self, req: &SetRoomPkgRequest) -> Result<()> {
        let codecs = self.codecs().await?;
        req.verify(&codecs)?;
        let result = self.write(command::build_set_room_pkg(req)).await?;
        command::ensure_success(&result)
    }

    /// Absolute set of room availability; returns the stored count.
    pub async fn set_room_avl(&self, req: &UpdRoomAvlRequest) -> Result<u8> {
        req.verify()?;
        let result = self.write(command::build_set_room_avl(req)).await?;
        command::parse_room_avl(&result)
    }

    /// Increment room availability; returns the resulting count.
    pub async fn inc_room_avl(&self, req: &UpdRoomAvlRequest) -> Result<u8> {
        req.verify()?;
        let result = self.write(command::build_inc_room_avl(req)).await?;
        command::parse_room_avl(&result)
    }

    /// Decrement room availability; returns the resulting count.
    pub async fn dec_room_avl(&self, req: &UpdRoomAvlRequest) -> Result<u8> {
        req.verify()?;
        let result = self.write(command::build_dec_room_avl(req)).await?;
        command::parse_room_avl(&result)
    }

    /// Whether a property exists.
    pub async fn prop_exist(&self, property_id: &str) -> Result<bool> {
        let property_id = required(property_id, "propertyID")?;
        let result = self.read(command::build_prop_exist(property_id)).await?;
        command::parse_prop_exist(&result)
    }

    /// Whether a property has a specific room type.
    pub async fn prop_room_exist(&self, property_id: &str, room_type: &str) -> Result<bool> {
        let property_id = required(property_id, "propertyID")?;
        let room_type = required(room_type, "roomType")?;
        let result = self
            .read(command::build_prop_room_exist(property_id, room_type))
            .await?;
        command::parse_prop_room_exist(&result)
    }

    /// Room types of a property.
    pub async fn prop_room_list(&self, property_id: &str) -> Result<Vec<String>> {
        let property_id = required(property_id, "propertyID")?;
        let result = self.read(command::build_prop_room_list(property_id)).await?;
        command::parse_prop_room_list(&result)
    }

    /// Dates holding availability data for a property and room type.
    pub async fn prop_room_date_list(
        &self,
        property_id: &str,
        room_type: &str,
    ) -> Result<Vec<String>> {
        let property_id = required(property_id, "propertyID")?;
        let room_type = required(room_type, "roomType")?;
        let result = self
            .read(command::build_prop_room_date_list(property_id, room_type))
            .await?;
        command::parse_prop_room_date_list(&result)
    }

    /// Delete an entire property.
    pub async fn del_prop(&self, property_id: &str) -> Result<()> {
        let property_id = required(property_id, "propertyID")?;
        let result = self.write(command::build_del_prop(property_id)).await?;
        command::ensure_success(&result)
    }

    /// Delete a segment and everything under it.
    pub async fn del_segment(&self, segment: &str) -> Result<()> {
        let segment = required(segment, "segment")?;
        let result = self.write(command::build_del_segment(segment)).await?;
        command::ensure_success(&result)
    }

    /// Delete all room data for a property on one date.
    pub async fn del_prop_day(&self, property_id: &str, date: &str) -> Result<()> {
        verify_prop_day(property_id, date)?;
        let result = self
            .write(command::build_del_prop_day(property_id, date))
            .await?;
        command::ensure_success(&result)
    }

    /// Delete a room type from a property.
    pub async fn del_prop_room(&self, property_id: &str, room_type: &str) -> Result<()> {
        let property_id = required(property_id, "propertyID")?;
        let room_type = required(room_type, "roomType")?;
        let result = self
            .write(command::build_del_prop_room(property_id, room_type))
            .await?;
        command::ensure_success(&result)
    }

    /// Delete availability for one room and date.
    pub async fn del_room_day(&self, key: &RoomDayKey) -> Result<()> {
        key.verify()?;
        let result = self.write(command::build_del_room_day(key)).await?;
        command::ensure_success(&result)
    }

    /// Availability and pricing for one room and date.
    pub async fn get_prop_room_day(&self, key: &RoomDayKey) -> Result<RoomDay> {
        key.verify()?;
        let result = self.read(command::build_get_prop_room_day(key)).await?;
        let codecs = self.codecs().await?;
        command::parse_get_prop_room_day(Some(&codecs), &result)
    }

    /// All active segments with their property counts.
    pub async fn get_segments(&self) -> Result<Vec<SegmentInfo>> {
        let result = self.read(command::build_get_segments()).await?;
        command::parse_get_segments(&result)
    }

    /// Shut down the router and fail everything in flight.
    pub fn close(&self) {
        self.handler.close();
    }

    async fn read(&self, payload: Bytes) -> Result<RawResult> {
        self.handler.execute(false, payload).await
    }

    async fn write(&self, payload: Bytes) -> Result<RawResult> {
        self.handler.execute(true, payload).await
    }

    async fn codecs(&self) -> Result<Codecs> {
        if let Some(codecs) = lock(&self.codecs).clone() {
            return Ok(codecs);
        }
        let fetched = self.fetch_codecs().await?;
        *lock(&self.codecs) = Some(fetched.clone());
        Ok(fetched)
    }

    async fn fetch_codecs(&self) -> Result<Codecs> {
        let result = self.read(command::build_get_codecs()).await?;
        command::parse_get_codecs(&result)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.handler.close();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RoomzinError::Validation(format!("{name} is required")))
    } else {
        Ok(trimmed)
    }
}
