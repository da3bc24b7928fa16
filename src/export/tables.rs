//! The three export table schemas.

use anyhow::Result;

use crate::db::{LocationEntry, MotionActivityEntry};
use crate::utils::time::iso8601;

use super::sink::TabularSink;

pub const LOCATION_COLUMNS: [&str; 6] =
    ["date", "latitude", "longitude", "course", "altitude", "speed"];

pub const LOCATION_ACCELEROMETER_COLUMNS: [&str; 9] = [
    "date", "latitude", "longitude", "course", "altitude", "speed", "x", "y", "z",
];

pub const MOTION_ACTIVITY_COLUMNS: [&str; 3] = ["date", "activity", "confidence"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Location,
    LocationAccelerometer,
    MotionActivity,
}

impl Table {
    pub fn file_name(&self, session_name: &str) -> String {
        let suffix = match self {
            Table::Location => "Location",
            Table::LocationAccelerometer => "Location+Accelerometer",
            Table::MotionActivity => "MotionActivity",
        };
        // Session names are free text; keep them inside the export directory.
        let stem = session_name.replace(['/', '\\'], "-");
        format!("{stem}_{suffix}.csv")
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Location => &LOCATION_COLUMNS,
            Table::LocationAccelerometer => &LOCATION_ACCELEROMETER_COLUMNS,
            Table::MotionActivity => &MOTION_ACTIVITY_COLUMNS,
        }
    }
}

fn location_fields(entry: &LocationEntry) -> Vec<String> {
    vec![
        iso8601(&entry.created_at),
        entry.latitude.to_string(),
        entry.longitude.to_string(),
        entry.course.to_string(),
        entry.altitude.to_string(),
        entry.speed.to_string(),
    ]
}

pub fn location_row(entry: &LocationEntry) -> Vec<String> {
    location_fields(entry)
}

/// A location without a paired reading gets `0` for each axis.
pub fn location_accelerometer_row(entry: &LocationEntry) -> Vec<String> {
    let mut fields = location_fields(entry);
    match &entry.accelerometer {
        Some(reading) => fields.extend([
            reading.x.to_string(),
            reading.y.to_string(),
            reading.z.to_string(),
        ]),
        None => fields.extend(std::iter::repeat("0".to_string()).take(3)),
    }
    fields
}

pub fn motion_activity_row(entry: &MotionActivityEntry) -> Vec<String> {
    vec![
        iso8601(&entry.created_at),
        entry.state_string().to_string(),
        entry.confidence.raw().to_string(),
    ]
}

/// Writes the header and then one row per item, in the given order. The
/// sink is closed whether or not writing succeeded; the first error wins.
pub fn write_table<S, T, F>(sink: &mut S, table: Table, items: &[T], row: F) -> Result<usize>
where
    S: TabularSink,
    F: Fn(&T) -> Vec<String>,
{
    let written = write_rows(sink, table, items, row);
    let closed = sink.close();
    let rows = written?;
    closed?;
    Ok(rows)
}

fn write_rows<S, T, F>(sink: &mut S, table: Table, items: &[T], row: F) -> Result<usize>
where
    S: TabularSink,
    F: Fn(&T) -> Vec<String>,
{
    sink.write_header(table.columns())?;
    for item in items {
        sink.write_row(&row(item))?;
    }
    Ok(items.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AccelerometerEntry, ActivityFlags, Confidence};
    use anyhow::bail;
    use chrono::{TimeZone, Utc};

    #[derive(Default)]
    struct MemorySink {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
        closed: usize,
        fail_after: Option<usize>,
    }

    impl TabularSink for MemorySink {
        fn write_header(&mut self, columns: &[&str]) -> Result<()> {
            self.header = columns.iter().map(|c| c.to_string()).collect();
            Ok(())
        }

        fn write_row(&mut self, fields: &[String]) -> Result<()> {
            if self.fail_after == Some(self.rows.len()) {
                bail!("disk full");
            }
            self.rows.push(fields.to_vec());
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    fn location(accelerometer: Option<AccelerometerEntry>) -> LocationEntry {
        let created_at = Utc.with_ymd_and_hms(2018, 10, 23, 12, 0, 0).unwrap();
        LocationEntry {
            latitude: 37.5,
            longitude: -122.25,
            course: 90.0,
            altitude: 12.5,
            speed: 1.25,
            created_at,
            accelerometer,
        }
    }

    #[test]
    fn file_names_follow_session_name() {
        assert_eq!(Table::Location.file_name("Walk"), "Walk_Location.csv");
        assert_eq!(
            Table::LocationAccelerometer.file_name("Walk"),
            "Walk_Location+Accelerometer.csv"
        );
        assert_eq!(
            Table::MotionActivity.file_name("Walk"),
            "Walk_MotionActivity.csv"
        );
        assert_eq!(Table::Location.file_name("a/b"), "a-b_Location.csv");
    }

    #[test]
    fn missing_pair_renders_zeroes() {
        let row = location_accelerometer_row(&location(None));
        assert_eq!(&row[6..], ["0", "0", "0"]);
        assert_eq!(row[0], "2018-10-23T12:00:00Z");
        assert_eq!(row[1], "37.5");

        let paired = location(Some(AccelerometerEntry {
            x: 0.5,
            y: -0.25,
            z: -1.0,
            created_at: Utc::now(),
        }));
        let row = location_accelerometer_row(&paired);
        assert_eq!(&row[6..], ["0.5", "-0.25", "-1"]);
    }

    #[test]
    fn motion_rows_carry_state_and_raw_confidence() {
        let entry = MotionActivityEntry {
            flags: ActivityFlags {
                walking: true,
                automotive: true,
                ..ActivityFlags::default()
            },
            confidence: Confidence::High,
            started_at: Utc::now(),
            created_at: Utc.with_ymd_and_hms(2018, 10, 23, 12, 0, 0).unwrap(),
        };
        assert_eq!(
            motion_activity_row(&entry),
            vec!["2018-10-23T12:00:00Z", "walking", "2"]
        );
    }

    #[test]
    fn failed_write_still_closes_sink() {
        let mut sink = MemorySink {
            fail_after: Some(1),
            ..MemorySink::default()
        };
        let items = vec![location(None), location(None)];
        let result = write_table(&mut sink, Table::Location, &items, location_row);
        assert!(result.is_err());
        assert_eq!(sink.closed, 1);
        assert_eq!(sink.header, LOCATION_COLUMNS);
        assert_eq!(sink.rows.len(), 1);
    }
}
