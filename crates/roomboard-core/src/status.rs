//! Occupancy derivation from raw busy intervals.
//!
//! Everything here is pure: the same `(now, intervals)` always yields the same
//! [`RoomStatus`], so callers can recompute freely on every refresh.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::room::{BusyInterval, Room, RoomStatus};
use crate::time::saturating_add;

/// Maximum number of blocks reported in [`RoomStatus::upcoming_blocks`].
pub const MAX_UPCOMING_BLOCKS: usize = 4;

/// Blocks that ended less than this many minutes ago are still reported.
pub const RECENT_END_GRACE_MINUTES: i64 = 5;

/// Derives the occupancy of `room` at `now` from its busy intervals.
///
/// Intervals may be unsorted and may overlap.
pub fn derive_status(
    room: &Room,
    intervals: &[BusyInterval],
    now: DateTime<Utc>,
    soon: Duration,
) -> RoomStatus {
    let soon_cutoff = saturating_add(now, soon);

    let current_end = intervals
        .iter()
        .filter(|block| block.covers(now))
        .map(|block| block.end)
        .min();
    let is_busy_now = current_end.is_some();

    let is_soon = !is_busy_now
        && intervals
            .iter()
            .any(|block| now <= block.start && block.start <= soon_cutoff);

    let next_change_time = if is_busy_now {
        current_end
    } else {
        intervals
            .iter()
            .filter(|block| block.start >= now)
            .map(|block| block.start)
            .min()
    };

    let grace = now - Duration::minutes(RECENT_END_GRACE_MINUTES);
    let mut upcoming_blocks: Vec<BusyInterval> = intervals
        .iter()
        .filter(|block| block.end > grace)
        .copied()
        .collect();
    upcoming_blocks.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    upcoming_blocks.truncate(MAX_UPCOMING_BLOCKS);

    let room_name = if room.room_name.trim().is_empty() {
        room.resolvable_calendar()
            .unwrap_or(room.room_id.as_str())
            .to_string()
    } else {
        room.room_name.clone()
    };

    RoomStatus {
        room_id: room.room_id.clone(),
        room_name,
        building_id: room.building_id.clone(),
        floor_name: room.floor_name.clone(),
        capacity: room.capacity,
        is_busy_now,
        is_soon,
        next_change_time,
        upcoming_blocks,
    }
}

/// Derives the status of every room that has a resolvable calendar address.
///
/// Rooms whose address is missing from `busy` are treated as free. The result
/// is ordered by [`compare_statuses`].
pub fn derive_all(
    rooms: &[Room],
    busy: &HashMap<String, Vec<BusyInterval>>,
    now: DateTime<Utc>,
    soon: Duration,
) -> Vec<RoomStatus> {
    let mut statuses: Vec<RoomStatus> = rooms
        .iter()
        .filter_map(|room| {
            let address = room.resolvable_calendar()?;
            let intervals = busy.get(address).map(Vec::as_slice).unwrap_or(&[]);
            Some(derive_status(room, intervals, now, soon))
        })
        .collect();
    statuses.sort_by(compare_statuses);
    statuses
}

/// Display ordering: building, floor, then room name (case-insensitive).
///
/// Missing building or floor sorts as the empty string.
pub fn compare_statuses(a: &RoomStatus, b: &RoomStatus) -> Ordering {
    let building = |s: &RoomStatus| s.building_id.clone().unwrap_or_default();
    let floor = |s: &RoomStatus| s.floor_name.clone().unwrap_or_default();

    building(a)
        .cmp(&building(b))
        .then_with(|| floor(a).cmp(&floor(b)))
        .then_with(|| a.room_name.to_lowercase().cmp(&b.room_name.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap()
    }

    fn mins(m: i64) -> Duration {
        Duration::minutes(m)
    }

    fn block(from: i64, to: i64) -> BusyInterval {
        BusyInterval::new(now() + mins(from), now() + mins(to))
    }

    fn room() -> Room {
        Room::new("r-1", "Aurora").with_calendar("aurora@example.com")
    }

    #[test]
    fn busy_now_reports_end_of_current_block() {
        let status = derive_status(&room(), &[block(-10, 5)], now(), mins(10));

        assert!(status.is_busy_now);
        assert!(!status.is_soon);
        assert_eq!(status.next_change_time, Some(now() + mins(5)));
    }

    #[test]
    fn booking_within_horizon_is_soon() {
        let status = derive_status(&room(), &[block(3, 20)], now(), mins(10));

        assert!(!status.is_busy_now);
        assert!(status.is_soon);
        assert_eq!(status.next_change_time, Some(now() + mins(3)));
    }

    #[test]
    fn no_intervals_means_free() {
        let status = derive_status(&room(), &[], now(), mins(10));

        assert!(!status.is_busy_now);
        assert!(!status.is_soon);
        assert_eq!(status.next_change_time, None);
        assert!(status.upcoming_blocks.is_empty());
    }

    #[test]
    fn booking_beyond_horizon_is_free_with_next_change() {
        let status = derive_status(&room(), &[block(45, 60)], now(), mins(10));

        assert!(!status.is_busy_now);
        assert!(!status.is_soon);
        assert_eq!(status.next_change_time, Some(now() + mins(45)));
    }

    #[test]
    fn soon_horizon_is_inclusive() {
        let status = derive_status(&room(), &[block(10, 30)], now(), mins(10));
        assert!(status.is_soon);

        let status = derive_status(&room(), &[block(0, 30)], now(), mins(10));
        assert!(status.is_busy_now);
        assert!(!status.is_soon);
    }

    #[test]
    fn oversized_horizon_does_not_overflow() {
        let status = derive_status(&room(), &[block(45, 60)], now(), mins(1_000_000_000_000));
        assert!(status.is_soon);
    }

    #[test]
    fn block_ending_now_is_not_busy() {
        let status = derive_status(&room(), &[block(-30, 0)], now(), mins(10));

        assert!(!status.is_busy_now);
        assert_eq!(status.next_change_time, None);
        // Ended less than five minutes ago, so still listed.
        assert_eq!(status.upcoming_blocks, vec![block(-30, 0)]);
    }

    #[test]
    fn overlapping_blocks_use_earliest_covering_end() {
        let status = derive_status(
            &room(),
            &[block(-20, 40), block(-5, 15), block(50, 60)],
            now(),
            mins(10),
        );

        assert!(status.is_busy_now);
        assert_eq!(status.next_change_time, Some(now() + mins(15)));
    }

    #[test]
    fn upcoming_blocks_are_sorted_truncated_and_drop_old_blocks() {
        let intervals = vec![
            block(120, 150),
            block(-60, -6),
            block(30, 60),
            block(-4, 10),
            block(200, 230),
            block(90, 100),
            block(15, 20),
        ];
        let status = derive_status(&room(), &intervals, now(), mins(10));

        assert_eq!(
            status.upcoming_blocks,
            vec![block(-4, 10), block(15, 20), block(30, 60), block(90, 100)]
        );
    }

    #[test]
    fn invariants_hold_across_instants() {
        let intervals = vec![
            block(-45, -20),
            block(-10, 5),
            block(3, 12),
            block(8, 25),
            block(40, 41),
            block(60, 120),
            block(90, 95),
            block(180, 240),
        ];

        for offset in (-60..=200).step_by(7) {
            let at = now() + mins(offset);
            for soon in [0, 5, 10, 30] {
                let status = derive_status(&room(), &intervals, at, mins(soon));

                assert!(!(status.is_busy_now && status.is_soon), "at {offset}");
                assert!(status.upcoming_blocks.len() <= MAX_UPCOMING_BLOCKS);
                assert!(
                    status
                        .upcoming_blocks
                        .windows(2)
                        .all(|pair| pair[0].start <= pair[1].start)
                );
            }
        }
    }

    #[test]
    fn derivation_is_idempotent() {
        let intervals = vec![block(20, 30), block(-10, 5)];
        let first = derive_status(&room(), &intervals, now(), mins(10));
        let second = derive_status(&room(), &intervals, now(), mins(10));
        assert_eq!(first, second);
    }

    #[test]
    fn blank_room_name_falls_back_to_calendar() {
        let room = Room::new("r-9", " ").with_calendar("spare@example.com");
        let status = derive_status(&room, &[], now(), mins(10));
        assert_eq!(status.room_name, "spare@example.com");
    }

    #[test]
    fn derive_all_skips_rooms_without_calendar_and_sorts() {
        let rooms = vec![
            Room::new("1", "zeta").with_building("B").with_calendar("z@x"),
            Room::new("2", "Alpha").with_building("B").with_calendar("a@x"),
            Room::new("3", "beta").with_building("B").with_calendar("b@x"),
            Room::new("4", "Lobby").with_calendar("l@x"),
            Room::new("5", "No calendar").with_building("A"),
            Room::new("6", "Gamma")
                .with_building("B")
                .with_floor("1")
                .with_calendar("g@x"),
        ];
        let mut busy = HashMap::new();
        busy.insert("a@x".to_string(), vec![block(-10, 5)]);

        let statuses = derive_all(&rooms, &busy, now(), mins(10));
        let names: Vec<&str> = statuses.iter().map(|s| s.room_name.as_str()).collect();

        assert_eq!(names, vec!["Lobby", "Alpha", "beta", "zeta", "Gamma"]);
        assert!(statuses[1].is_busy_now);
        assert!(!statuses[0].is_busy_now);
    }
}
