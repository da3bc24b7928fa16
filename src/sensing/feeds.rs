//! Sensor feeds.
//!
//! Each feed wraps a native backend, owns the channel the backend publishes
//! into, and turns the backend's "do nothing" failure modes into
//! [`FeedError`]s.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};

use crate::error::FeedError;

use super::publisher::SamplePublisher;
use super::samples::{
    AccelerometerSample, AuthorizationStatus, CircularRegion, LocationMode, LocationSample,
    MotionActivitySample, RegionEvent,
};

const ACCELEROMETER: &str = "accelerometer";
const LOCATION: &str = "location";
const MOTION_ACTIVITY: &str = "motion activity";

pub trait AccelerometerBackend: Send + Sync + 'static {
    fn is_available(&self) -> bool;
    fn start(&self, interval: Duration, publisher: SamplePublisher<AccelerometerSample>);
    fn stop(&self);
}

pub trait LocationBackend: Send + Sync + 'static {
    fn authorization_status(&self) -> AuthorizationStatus;
    fn request_always_authorization(&self);
    /// Batches of one or more locations, oldest first.
    fn start_updating(&self, mode: LocationMode, publisher: SamplePublisher<Vec<LocationSample>>);
    /// Stops whichever update mode is running.
    fn stop_updating(&self);
    fn start_monitoring(&self, region: &CircularRegion, publisher: SamplePublisher<RegionEvent>);
    fn stop_monitoring(&self, identifier: &str);
}

pub trait MotionActivityBackend: Send + Sync + 'static {
    fn is_available(&self) -> bool;
    fn start(&self, publisher: SamplePublisher<MotionActivitySample>);
    fn stop(&self);
}

pub struct AccelerometerFeed {
    backend: Arc<dyn AccelerometerBackend>,
    publisher: SamplePublisher<AccelerometerSample>,
    latest: watch::Receiver<Option<AccelerometerSample>>,
    interval: Option<Duration>,
}

impl AccelerometerFeed {
    pub fn new(backend: Arc<dyn AccelerometerBackend>) -> Self {
        let (publisher, latest) = SamplePublisher::latest();
        Self {
            backend,
            publisher,
            latest,
            interval: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Starts sampling every `interval`. Restarts the backend if it is
    /// already running at a different interval.
    pub fn start(&mut self, interval: Duration) -> Result<(), FeedError> {
        if !self.backend.is_available() {
            return Err(FeedError::Unavailable(ACCELEROMETER));
        }
        match self.interval {
            Some(current) if current == interval => return Ok(()),
            Some(_) => self.backend.stop(),
            None => {}
        }
        self.backend.start(interval, self.publisher.clone());
        self.interval = Some(interval);
        Ok(())
    }

    /// Stops sampling and forgets the cached sample.
    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            self.backend.stop();
        }
        self.publisher.clear();
    }

    /// Most recent sample, if one arrived since the feed started.
    pub fn latest(&self) -> Option<AccelerometerSample> {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AccelerometerSample>> {
        self.latest.clone()
    }
}

pub struct LocationFeed {
    backend: Arc<dyn LocationBackend>,
    updates: SamplePublisher<Vec<LocationSample>>,
    updates_rx: Option<mpsc::UnboundedReceiver<Vec<LocationSample>>>,
    regions: SamplePublisher<RegionEvent>,
    regions_rx: Option<mpsc::UnboundedReceiver<RegionEvent>>,
    mode: Option<LocationMode>,
    monitored: HashMap<String, CircularRegion>,
}

impl LocationFeed {
    pub fn new(backend: Arc<dyn LocationBackend>) -> Self {
        let (updates, updates_rx) = SamplePublisher::queue();
        let (regions, regions_rx) = SamplePublisher::queue();
        Self {
            backend,
            updates,
            updates_rx: Some(updates_rx),
            regions,
            regions_rx: Some(regions_rx),
            mode: None,
            monitored: HashMap::new(),
        }
    }

    /// The location batch stream. Can be taken once.
    pub fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<LocationSample>>> {
        self.updates_rx.take()
    }

    /// The region crossing stream. Can be taken once.
    pub fn subscribe_regions(&mut self) -> Option<mpsc::UnboundedReceiver<RegionEvent>> {
        self.regions_rx.take()
    }

    pub fn mode(&self) -> Option<LocationMode> {
        self.mode
    }

    fn ensure_authorized(&self) -> Result<(), FeedError> {
        match self.backend.authorization_status() {
            AuthorizationStatus::AuthorizedAlways | AuthorizationStatus::AuthorizedWhenInUse => {
                Ok(())
            }
            AuthorizationStatus::NotDetermined => {
                self.backend.request_always_authorization();
                Ok(())
            }
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                Err(FeedError::PermissionDenied(LOCATION))
            }
        }
    }

    /// Starts updates in `mode`, switching modes if another one is running.
    pub fn start(&mut self, mode: LocationMode) -> Result<(), FeedError> {
        self.ensure_authorized()?;
        match self.mode {
            Some(current) if current == mode => return Ok(()),
            Some(_) => self.backend.stop_updating(),
            None => {}
        }
        self.backend.start_updating(mode, self.updates.clone());
        self.mode = Some(mode);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.mode.take().is_some() {
            self.backend.stop_updating();
        }
    }

    /// Starts (or replaces) monitoring of a circular region. Monitoring is
    /// independent of location updates.
    pub fn start_monitoring(&mut self, region: CircularRegion) -> Result<(), FeedError> {
        self.ensure_authorized()?;
        self.backend.start_monitoring(&region, self.regions.clone());
        self.monitored.insert(region.identifier.clone(), region);
        Ok(())
    }

    pub fn stop_monitoring(&mut self, identifier: &str) -> bool {
        if self.monitored.remove(identifier).is_some() {
            self.backend.stop_monitoring(identifier);
            true
        } else {
            false
        }
    }

    pub fn monitored_region(&self, identifier: &str) -> Option<&CircularRegion> {
        self.monitored.get(identifier)
    }

    pub fn monitored_regions(&self) -> impl Iterator<Item = &CircularRegion> {
        self.monitored.values()
    }
}

pub struct MotionActivityFeed {
    backend: Arc<dyn MotionActivityBackend>,
    publisher: SamplePublisher<MotionActivitySample>,
    receiver: Option<mpsc::UnboundedReceiver<MotionActivitySample>>,
    running: bool,
}

impl MotionActivityFeed {
    pub fn new(backend: Arc<dyn MotionActivityBackend>) -> Self {
        let (publisher, receiver) = SamplePublisher::queue();
        Self {
            backend,
            publisher,
            receiver: Some(receiver),
            running: false,
        }
    }

    pub fn subscribe(&mut self) -> Option<mpsc::UnboundedReceiver<MotionActivitySample>> {
        self.receiver.take()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) -> Result<(), FeedError> {
        if !self.backend.is_available() {
            return Err(FeedError::Unavailable(MOTION_ACTIVITY));
        }
        if !self.running {
            self.backend.start(self.publisher.clone());
            self.running = true;
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.running {
            self.backend.stop();
            self.running = false;
        }
    }
}
