//! Fixed room directory for kiosks that show a handful of known rooms.

use roomboard_core::Room;

use crate::error::{ProviderError, ProviderResult};
use crate::source::{BoxFuture, DirectorySource};

/// A [`DirectorySource`] backed by a room list supplied at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    rooms: Vec<Room>,
}

impl StaticDirectory {
    /// Creates a directory from `rooms`.
    ///
    /// Rooms with an empty id are rejected; duplicate ids keep the first entry.
    pub fn new(rooms: Vec<Room>) -> ProviderResult<Self> {
        let mut kept: Vec<Room> = Vec::with_capacity(rooms.len());
        for room in rooms {
            if room.room_id.trim().is_empty() {
                return Err(ProviderError::configuration(format!(
                    "static room '{}' has an empty room_id",
                    room.room_name
                ))
                .with_provider("static"));
            }
            if kept.iter().any(|r| r.room_id == room.room_id) {
                tracing::warn!(room_id = %room.room_id, "duplicate static room ignored");
                continue;
            }
            kept.push(room);
        }
        Ok(Self { rooms: kept })
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl DirectorySource for StaticDirectory {
    fn name(&self) -> &str {
        "static"
    }

    fn list_rooms(&self) -> BoxFuture<'_, ProviderResult<Vec<Room>>> {
        Box::pin(async move { Ok(self.rooms.clone()) })
    }
}
