//! In-process backends for hosts without sensor hardware and for tests.
//!
//! They record how the feeds drive them and let the caller push samples as
//! if the OS had delivered them.

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use super::feeds::{AccelerometerBackend, LocationBackend, MotionActivityBackend};
use super::publisher::SamplePublisher;
use super::samples::{
    AccelerometerSample, AuthorizationStatus, CircularRegion, LocationMode, LocationSample,
    MotionActivitySample, RegionEvent,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct AccelerometerState {
    publisher: Option<SamplePublisher<AccelerometerSample>>,
    interval: Option<Duration>,
    start_count: usize,
    stop_count: usize,
}

pub struct SimulatedAccelerometer {
    available: bool,
    state: Mutex<AccelerometerState>,
}

impl SimulatedAccelerometer {
    pub fn new() -> Self {
        Self::with_availability(true)
    }

    pub fn unavailable() -> Self {
        Self::with_availability(false)
    }

    fn with_availability(available: bool) -> Self {
        Self {
            available,
            state: Mutex::new(AccelerometerState {
                publisher: None,
                interval: None,
                start_count: 0,
                stop_count: 0,
            }),
        }
    }

    /// Delivers a sample if the accelerometer is running.
    pub fn emit(&self, sample: AccelerometerSample) -> bool {
        let state = lock(&self.state);
        match (&state.publisher, state.interval) {
            (Some(publisher), Some(_)) => publisher.publish(sample),
            _ => false,
        }
    }

    /// Sampling interval while running.
    pub fn interval(&self) -> Option<Duration> {
        lock(&self.state).interval
    }

    pub fn start_count(&self) -> usize {
        lock(&self.state).start_count
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stop_count
    }
}

impl Default for SimulatedAccelerometer {
    fn default() -> Self {
        Self::new()
    }
}

impl AccelerometerBackend for SimulatedAccelerometer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&self, interval: Duration, publisher: SamplePublisher<AccelerometerSample>) {
        let mut state = lock(&self.state);
        state.publisher = Some(publisher);
        state.interval = Some(interval);
        state.start_count += 1;
    }

    fn stop(&self) {
        let mut state = lock(&self.state);
        state.interval = None;
        state.stop_count += 1;
    }
}

struct LocationState {
    authorization: AuthorizationStatus,
    authorization_requests: usize,
    mode: Option<LocationMode>,
    updates: Option<SamplePublisher<Vec<LocationSample>>>,
    regions: Option<SamplePublisher<RegionEvent>>,
    monitored: Vec<CircularRegion>,
    stop_count: usize,
}

pub struct SimulatedLocation {
    state: Mutex<LocationState>,
}

impl SimulatedLocation {
    pub fn new(authorization: AuthorizationStatus) -> Self {
        Self {
            state: Mutex::new(LocationState {
                authorization,
                authorization_requests: 0,
                mode: None,
                updates: None,
                regions: None,
                monitored: Vec::new(),
                stop_count: 0,
            }),
        }
    }

    pub fn set_authorization(&self, authorization: AuthorizationStatus) {
        lock(&self.state).authorization = authorization;
    }

    /// Delivers a batch if updates are running.
    pub fn emit(&self, batch: Vec<LocationSample>) -> bool {
        let state = lock(&self.state);
        match (&state.updates, state.mode) {
            (Some(publisher), Some(_)) => publisher.publish(batch),
            _ => false,
        }
    }

    /// Delivers a batch whether or not updates are running, as a callback
    /// the OS queued before updates stopped would arrive.
    pub fn deliver_late(&self, batch: Vec<LocationSample>) -> bool {
        lock(&self.state)
            .updates
            .as_ref()
            .is_some_and(|publisher| publisher.publish(batch))
    }

    /// Reports a boundary crossing if the region is monitored.
    pub fn cross(&self, event: RegionEvent) -> bool {
        let state = lock(&self.state);
        let monitored = state
            .monitored
            .iter()
            .any(|region| region.identifier == event.region.identifier());
        match (&state.regions, monitored) {
            (Some(publisher), true) => publisher.publish(event),
            _ => false,
        }
    }

    pub fn mode(&self) -> Option<LocationMode> {
        lock(&self.state).mode
    }

    pub fn authorization_requests(&self) -> usize {
        lock(&self.state).authorization_requests
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stop_count
    }

    /// Identifiers of monitored regions, sorted.
    pub fn monitored(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = lock(&self.state)
            .monitored
            .iter()
            .map(|region| region.identifier.clone())
            .collect();
        identifiers.sort();
        identifiers
    }
}

impl LocationBackend for SimulatedLocation {
    fn authorization_status(&self) -> AuthorizationStatus {
        lock(&self.state).authorization
    }

    fn request_always_authorization(&self) {
        lock(&self.state).authorization_requests += 1;
    }

    fn start_updating(&self, mode: LocationMode, publisher: SamplePublisher<Vec<LocationSample>>) {
        let mut state = lock(&self.state);
        state.mode = Some(mode);
        state.updates = Some(publisher);
    }

    fn stop_updating(&self) {
        let mut state = lock(&self.state);
        state.mode = None;
        state.stop_count += 1;
    }

    fn start_monitoring(&self, region: &CircularRegion, publisher: SamplePublisher<RegionEvent>) {
        let mut state = lock(&self.state);
        state.monitored.retain(|existing| existing.identifier != region.identifier);
        state.monitored.push(region.clone());
        state.regions = Some(publisher);
    }

    fn stop_monitoring(&self, identifier: &str) {
        lock(&self.state)
            .monitored
            .retain(|region| region.identifier != identifier);
    }
}

struct MotionState {
    publisher: Option<SamplePublisher<MotionActivitySample>>,
    running: bool,
    start_count: usize,
    stop_count: usize,
}

pub struct SimulatedMotionActivity {
    available: bool,
    state: Mutex<MotionState>,
}

impl SimulatedMotionActivity {
    pub fn new() -> Self {
        Self::with_availability(true)
    }

    pub fn unavailable() -> Self {
        Self::with_availability(false)
    }

    fn with_availability(available: bool) -> Self {
        Self {
            available,
            state: Mutex::new(MotionState {
                publisher: None,
                running: false,
                start_count: 0,
                stop_count: 0,
            }),
        }
    }

    pub fn emit(&self, sample: MotionActivitySample) -> bool {
        let state = lock(&self.state);
        match (&state.publisher, state.running) {
            (Some(publisher), true) => publisher.publish(sample),
            _ => false,
        }
    }

    pub fn deliver_late(&self, sample: MotionActivitySample) -> bool {
        lock(&self.state)
            .publisher
            .as_ref()
            .is_some_and(|publisher| publisher.publish(sample))
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn start_count(&self) -> usize {
        lock(&self.state).start_count
    }

    pub fn stop_count(&self) -> usize {
        lock(&self.state).stop_count
    }
}

impl Default for SimulatedMotionActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionActivityBackend for SimulatedMotionActivity {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&self, publisher: SamplePublisher<MotionActivitySample>) {
        let mut state = lock(&self.state);
        state.publisher = Some(publisher);
        state.running = true;
        state.start_count += 1;
    }

    fn stop(&self) {
        let mut state = lock(&self.state);
        state.running = false;
        state.stop_count += 1;
    }
}
