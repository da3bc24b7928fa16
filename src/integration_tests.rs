//! End-to-end scenarios over the simulated backends and a file-backed store.

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;

use crate::bluetooth::{CentralBackend, SimulatedCentral};
use crate::config::HermesConfig;
use crate::db::{ActivityFlags, Confidence, EntryKind, Geofence, GeofenceEvent};
use crate::error::HermesError;
use crate::export::Table;
use crate::recording::{LaunchOptions, RecordingContext};
use crate::sensing::simulated::{SimulatedAccelerometer, SimulatedLocation, SimulatedMotionActivity};
use crate::sensing::{
    AccelerometerSample, AuthorizationStatus, CircularRegion, Crossing, LocationMode,
    LocationSample, MonitoredRegion, MotionActivitySample, RegionEvent, SensorBackends,
    SessionState,
};

struct Device {
    accelerometer: Arc<SimulatedAccelerometer>,
    location: Arc<SimulatedLocation>,
    motion: Arc<SimulatedMotionActivity>,
    central: Arc<SimulatedCentral>,
}

impl Device {
    fn new(authorization: AuthorizationStatus) -> Self {
        Self {
            accelerometer: Arc::new(SimulatedAccelerometer::new()),
            location: Arc::new(SimulatedLocation::new(authorization)),
            motion: Arc::new(SimulatedMotionActivity::new()),
            central: Arc::new(SimulatedCentral::new()),
        }
    }

    fn backends(&self) -> SensorBackends {
        SensorBackends {
            accelerometer: self.accelerometer.clone(),
            location: self.location.clone(),
            motion: self.motion.clone(),
        }
    }

    fn open(&self, config: &HermesConfig) -> RecordingContext {
        let central: Arc<dyn CentralBackend> = self.central.clone();
        RecordingContext::open(config.clone(), self.backends(), Some(central)).unwrap()
    }
}

fn scratch_config() -> HermesConfig {
    HermesConfig {
        data_dir: std::env::temp_dir().join(format!("hermes-it-{}", uuid::Uuid::new_v4())),
        ..HermesConfig::default()
    }
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn fix(latitude: f64) -> LocationSample {
    LocationSample {
        latitude,
        longitude: -122.03,
        course: 180.0,
        altitude: 30.0,
        speed: 1.4,
        timestamp: Utc::now(),
    }
}

fn motion(flags: ActivityFlags) -> MotionActivitySample {
    MotionActivitySample {
        flags,
        confidence: Confidence::High,
        start_date: Utc::now(),
    }
}

#[tokio::test]
async fn record_stop_and_export_a_session() {
    let config = scratch_config();
    let device = Device::new(AuthorizationStatus::AuthorizedAlways);
    let mut ctx = device.open(&config);

    let report = ctx.launch(LaunchOptions::default()).await.unwrap();
    assert!(report.session.is_none());
    assert!(report.location.is_ok());
    assert_eq!(device.location.mode(), Some(LocationMode::SignificantChanges));

    let session = ctx.start_session("Commute").await.unwrap();
    assert_eq!(ctx.current_session(), Some(session.clone()));
    assert_eq!(device.location.mode(), Some(LocationMode::Continuous));
    assert_eq!(device.motion.start_count(), 1);

    device.accelerometer.emit(AccelerometerSample {
        x: 0.25,
        y: -0.5,
        z: -0.75,
        timestamp: Utc::now(),
    });
    assert!(device.location.emit(vec![fix(37.33), fix(99.0)]));
    assert!(device.motion.emit(motion(ActivityFlags {
        walking: true,
        ..ActivityFlags::default()
    })));

    let ctx_ref = &ctx;
    eventually(|| async move {
        ctx_ref.entries("Commute", None).await.unwrap().len() == 3
    })
    .await;

    let locations = ctx.entries("Commute", Some(EntryKind::Location)).await.unwrap();
    assert_eq!(locations.len(), 1);

    assert_eq!(ctx.stop_session().await.unwrap(), Some(session));
    assert_eq!(ctx.current_session(), None);
    assert_eq!(
        ctx.session_control().state().await.unwrap(),
        SessionState::Idle
    );

    let export_dir = config.data_dir.join("exports");
    let report = ctx.export("Commute", &export_dir).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.files().len(), 3);

    let paired = std::fs::read_to_string(
        export_dir.join(Table::LocationAccelerometer.file_name("Commute")),
    )
    .unwrap();
    let row = paired.lines().nth(1).unwrap();
    assert!(row.ends_with(",37.33,-122.03,180,30,1.4,0.25,-0.5,-0.75"));

    assert!(matches!(
        ctx.export("Nope", &export_dir).await,
        Err(HermesError::SessionNotFound(_))
    ));

    assert_eq!(ctx.shutdown().await.unwrap(), 0);
    std::fs::remove_dir_all(&config.data_dir).ok();
}

#[tokio::test]
async fn denied_location_leaves_no_session_behind() {
    let config = scratch_config();
    let device = Device::new(AuthorizationStatus::Denied);
    let mut ctx = device.open(&config);

    let report = ctx.launch(LaunchOptions::default()).await.unwrap();
    assert!(matches!(report.location, Err(HermesError::PermissionDenied(_))));

    let err = ctx.start_session("Blocked").await.unwrap_err();
    assert_eq!(err, HermesError::PermissionDenied("location".into()));
    assert_eq!(ctx.current_session(), None);
    assert!(ctx.sessions().await.unwrap().is_empty());
    assert!(!device.motion.is_running());

    ctx.shutdown().await.unwrap();
    std::fs::remove_dir_all(&config.data_dir).ok();
}

#[tokio::test]
async fn relaunch_opens_generated_sessions_and_restores_bluetooth() {
    let config = scratch_config();
    let device = Device::new(AuthorizationStatus::AuthorizedAlways);
    let mut ctx = device.open(&config);

    let report = ctx
        .launch(LaunchOptions {
            location_relaunch: true,
            bluetooth_centrals: vec![config.bluetooth_restore_identifier.clone()],
        })
        .await
        .unwrap();

    assert!(report.bluetooth_restored);
    let current = report.session.unwrap();
    assert!(current.name.ends_with(" BT Background Mode"));
    assert_eq!(ctx.current_session(), Some(current));

    let names: Vec<String> = ctx
        .sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|session| session.name)
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|name| name.ends_with(" Background Mode")
        && !name.ends_with(" BT Background Mode")));

    assert!(ctx.bluetooth().is_some());
    assert_eq!(
        device.central.restore_identifier(),
        Some(config.bluetooth_restore_identifier.clone())
    );
    assert!(ctx.launch(LaunchOptions::default()).await.is_err());

    ctx.shutdown().await.unwrap();
    std::fs::remove_dir_all(&config.data_dir).ok();
}

#[tokio::test]
async fn unknown_central_identifier_is_not_restored() {
    let config = scratch_config();
    let device = Device::new(AuthorizationStatus::AuthorizedAlways);
    let mut ctx = device.open(&config);

    let report = ctx
        .launch(LaunchOptions {
            location_relaunch: false,
            bluetooth_centrals: vec!["com.other.central".into()],
        })
        .await
        .unwrap();
    assert!(!report.bluetooth_restored);
    assert!(report.session.is_none());
    assert!(ctx.bluetooth().is_none());
    assert!(!device.central.is_attached());

    ctx.shutdown().await.unwrap();
    std::fs::remove_dir_all(&config.data_dir).ok();
}

fn office() -> Geofence {
    Geofence {
        identifier: uuid::Uuid::new_v4().to_string(),
        latitude: 37.3318,
        longitude: -122.0312,
        radius: 150.0,
        note: "Office".into(),
        event_type: GeofenceEvent::OnEntry,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn geofences_survive_restart_and_crossings_start_sessions() {
    let config = scratch_config();
    let geofence = office();

    {
        let device = Device::new(AuthorizationStatus::AuthorizedAlways);
        let mut ctx = device.open(&config);
        ctx.launch(LaunchOptions::default()).await.unwrap();
        ctx.add_geofence(geofence.clone()).await.unwrap();
        assert_eq!(device.location.monitored(), vec![geofence.identifier.clone()]);
        ctx.shutdown().await.unwrap();
    }

    let device = Device::new(AuthorizationStatus::AuthorizedAlways);
    let mut ctx = device.open(&config);
    let report = ctx.launch(LaunchOptions::default()).await.unwrap();
    assert_eq!(report.geofences_armed, 1);
    assert_eq!(device.location.monitored(), vec![geofence.identifier.clone()]);

    let region = CircularRegion::from(&geofence);
    // Exits are not reported for an on-entry geofence.
    device.location.cross(RegionEvent {
        region: MonitoredRegion::Circular(region.clone()),
        crossing: Crossing::Exited,
        timestamp: Utc::now(),
    });
    assert!(device.location.cross(RegionEvent {
        region: MonitoredRegion::Circular(region),
        crossing: Crossing::Entered,
        timestamp: Utc::now(),
    }));

    let location = Arc::clone(&device.location);
    eventually(|| {
        let location = Arc::clone(&location);
        async move { location.mode() == Some(LocationMode::Continuous) }
    })
    .await;
    let current = ctx.current_session().unwrap();
    assert!(current.name.ends_with(" Geofence"));
    assert_eq!(ctx.sessions().await.unwrap().len(), 1);

    assert!(ctx.remove_geofence(&geofence.identifier).await.unwrap());
    assert!(device.location.monitored().is_empty());
    assert!(ctx.geofences().await.unwrap().is_empty());

    ctx.shutdown().await.unwrap();
    std::fs::remove_dir_all(&config.data_dir).ok();
}

#[tokio::test]
async fn stationary_timeout_ends_the_current_session() {
    let config = HermesConfig {
        stationary_timeout_ticks: 3,
        stationary_tick: Duration::from_millis(20),
        ..scratch_config()
    };
    let device = Device::new(AuthorizationStatus::AuthorizedAlways);
    let ctx = device.open(&config);

    ctx.start_session("Parked").await.unwrap();
    let mut current = ctx.watch_current_session();
    device.motion.emit(motion(ActivityFlags {
        stationary: true,
        ..ActivityFlags::default()
    }));

    tokio::time::timeout(Duration::from_secs(5), current.wait_for(Option::is_none))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        ctx.session_control().state().await.unwrap(),
        SessionState::Idle
    );
    let stored = ctx.entries("Parked", None).await.unwrap();
    assert_eq!(stored.len(), 1);

    ctx.shutdown().await.unwrap();
    std::fs::remove_dir_all(&config.data_dir).ok();
}

#[tokio::test]
async fn update_interval_applies_to_the_next_recording() {
    let config = scratch_config();
    let device = Device::new(AuthorizationStatus::AuthorizedAlways);
    let ctx = device.open(&config);

    assert!(matches!(
        ctx.set_update_interval(0.0),
        Err(HermesError::InvalidSetting(_))
    ));
    ctx.set_update_interval(0.1).unwrap();

    ctx.start_session("Sampled").await.unwrap();
    assert_eq!(
        device.accelerometer.interval(),
        Some(Duration::from_secs_f64(0.1))
    );
    ctx.delete_session("Sampled").await.unwrap();
    assert_eq!(ctx.current_session(), None);
    assert!(ctx.sessions().await.unwrap().is_empty());

    ctx.shutdown().await.unwrap();
    let reread: PathBuf = config.settings_path();
    assert!(std::fs::read_to_string(reread).unwrap().contains("updateInterval"));
    std::fs::remove_dir_all(&config.data_dir).ok();
}

#[tokio::test]
async fn driving_the_manager_directly_keeps_the_recorder_attached() {
    let config = scratch_config();
    let device = Device::new(AuthorizationStatus::AuthorizedAlways);
    let ctx = device.open(&config);

    ctx.start_session("Errand").await.unwrap();
    let control = ctx.session_control();
    assert!(control.stop_updates().await.unwrap());
    control.start_updating_location().await.unwrap();
    assert!(device.location.emit(vec![fix(48.85)]));

    let ctx_ref = &ctx;
    eventually(|| async move {
        ctx_ref.entries("Errand", None).await.unwrap().len() == 1
    })
    .await;

    ctx.shutdown().await.unwrap();
    std::fs::remove_dir_all(&config.data_dir).ok();
}
