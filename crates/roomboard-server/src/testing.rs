//! In-memory sources for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use roomboard_core::{BusyInterval, Room, TimeWindow, query_window};
use roomboard_providers::{
    BoxFuture, BusyMap, DirectorySource, FreeBusySource, ProviderError, ProviderResult,
};

/// Fixed instant the fetcher tests are anchored on.
pub fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap()
}

/// A block `[anchor + from, anchor + to)` in minutes.
pub fn block(from: i64, to: i64) -> BusyInterval {
    BusyInterval::new(
        anchor() + chrono::Duration::minutes(from),
        anchor() + chrono::Duration::minutes(to),
    )
}

/// The query window of a refresh at [`anchor`].
pub fn test_window() -> TimeWindow {
    query_window(anchor(), chrono::Duration::minutes(10))
}

/// A directory returning a fixed room list, or scripted failures.
#[derive(Default)]
pub struct FakeDirectory {
    rooms: Mutex<Vec<Room>>,
    scripted: Mutex<VecDeque<ProviderError>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self {
            rooms: Mutex::new(rooms),
            ..Self::default()
        }
    }

    pub fn push_error(&self, err: ProviderError) {
        self.scripted.lock().unwrap().push_back(err);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_rooms(&self, rooms: Vec<Room>) {
        *self.rooms.lock().unwrap() = rooms;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DirectorySource for FakeDirectory {
    fn name(&self) -> &str {
        "fake"
    }

    fn list_rooms(&self) -> BoxFuture<'_, ProviderResult<Vec<Room>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.scripted.lock().unwrap().pop_front();
        let unavailable = self.unavailable.load(Ordering::SeqCst);
        let rooms = self.rooms.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(err) = scripted {
                return Err(err);
            }
            if unavailable {
                return Err(ProviderError::server("HTTP 503: directory unavailable"));
            }
            Ok(rooms)
        })
    }
}

/// A free/busy source with busy blocks given as minute offsets from the
/// refresh instant (`window.start + 1 minute`).
pub struct FakeFreeBusy {
    busy: Mutex<HashMap<String, Vec<(i64, i64)>>>,
    scripted: Mutex<VecDeque<ProviderError>>,
    failing: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    max_batch_size: usize,
    latency: Option<Duration>,
}

impl FakeFreeBusy {
    pub fn new() -> Self {
        Self {
            busy: Mutex::default(),
            scripted: Mutex::default(),
            failing: Mutex::default(),
            unavailable: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::default(),
            max_batch_size: 50,
            latency: None,
        }
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Every query sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_busy(&self, address: &str, offsets: &[(i64, i64)]) {
        self.busy
            .lock()
            .unwrap()
            .insert(address.to_string(), offsets.to_vec());
    }

    /// The next query fails with `err`.
    pub fn push_error(&self, err: ProviderError) {
        self.scripted.lock().unwrap().push_back(err);
    }

    /// Batches containing `address` fail permanently.
    pub fn fail_address(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    /// While set, every query fails with HTTP 503.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

impl FreeBusySource for FakeFreeBusy {
    fn name(&self) -> &str {
        "fake"
    }

    fn query_free_busy<'a>(
        &'a self,
        addresses: &'a [String],
        window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<BusyMap>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(addresses.len());

        let scripted = self.scripted.lock().unwrap().pop_front();
        let unavailable = self.unavailable.load(Ordering::SeqCst);
        let failing = {
            let failing = self.failing.lock().unwrap();
            addresses.iter().any(|a| failing.contains(a))
        };

        let now = window.start + chrono::Duration::minutes(1);
        let busy = self.busy.lock().unwrap();
        let map: BusyMap = addresses
            .iter()
            .filter_map(|address| {
                let offsets = busy.get(address)?;
                let blocks = offsets
                    .iter()
                    .map(|&(from, to)| {
                        BusyInterval::new(
                            now + chrono::Duration::minutes(from),
                            now + chrono::Duration::minutes(to),
                        )
                    })
                    .collect();
                Some((address.clone(), blocks))
            })
            .collect();
        drop(busy);

        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if let Some(err) = scripted {
                return Err(err);
            }
            if unavailable {
                return Err(ProviderError::server("HTTP 503: backend error"));
            }
            if failing {
                return Err(ProviderError::bad_request("HTTP 400: invalid calendar id"));
            }
            Ok(map)
        })
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
