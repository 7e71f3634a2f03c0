//! Typed request/response payloads and the server codec registry.

pub mod codecs;
pub mod request;
pub mod response;

pub use codecs::Codecs;
pub use request::{
    RoomDayKey, SearchAvailRequest, SearchPropRequest, SetPropRequest, SetRoomPkgRequest,
    UpdRoomAvlRequest,
};
pub use response::{DayAvailability, PropertyAvailability, RoomDay, SegmentInfo};
