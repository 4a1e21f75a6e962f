use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};
use store_uptime::engine::{DiscardTally, EngineOptions, compute_report};
use store_uptime::export::report_to_bytes;
use store_uptime::ingest::{CsvDataSource, load_snapshot};
use store_uptime::jobs::{JobContext, SnapshotMode, run_report};

const STATUS_CSV: &str = "store_id,status,timestamp_utc
1,active,2023-01-25 14:00:00.000000 UTC
1,inactive,2023-01-25 17:30:00.000000 UTC
2,inactive,2023-01-25 17:45:00 UTC
2,sleeping,2023-01-25 17:50:00 UTC
";

const HOURS_CSV: &str = "store_id,dayOfWeek,start_time_local,end_time_local
1,0,09:00:00,17:00:00
1,1,09:00:00,17:00:00
1,2,09:00:00,17:00:00
1,3,09:00:00,17:00:00
1,4,09:00:00,17:00:00
1,zz,09:00:00,17:00:00
";

const ZONES_CSV: &str = "store_id,timezone_str
1,America/New_York
3,America/Denver
,Europe/Paris
";

struct Fixture {
    dir: PathBuf,
}

impl Fixture {
    fn new(label: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let dir = std::env::temp_dir().join(format!("store-uptime-{label}-{unique}"));
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("store_status.csv"), STATUS_CSV)?;
        fs::write(dir.join("menu_hours.csv"), HOURS_CSV)?;
        fs::write(dir.join("timezones.csv"), ZONES_CSV)?;
        Ok(Self { dir })
    }

    fn source(&self) -> CsvDataSource {
        CsvDataSource::new(
            self.dir.join("store_status.csv"),
            self.dir.join("menu_hours.csv"),
            self.dir.join("timezones.csv"),
        )
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn snapshot_instant() -> chrono::DateTime<Utc> {
    // Wednesday, 13:00 in New York.
    Utc.with_ymd_and_hms(2023, 1, 25, 18, 0, 0)
        .single()
        .expect("valid instant")
}

#[test]
fn csv_inputs_produce_expected_report() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new("pipeline")?;

    let input = load_snapshot(&fixture.source())?;
    let run = compute_report(snapshot_instant(), &input, &EngineOptions::default())?;
    let csv = String::from_utf8(report_to_bytes(&run.rows)?)?;

    assert_eq!(
        run.discarded,
        DiscardTally {
            observations: 1,
            schedule_rules: 1,
            timezones: 1,
        }
    );
    assert!(run.warnings.is_empty());
    // Store 3 has a zone but no samples and stays out of the report.
    assert_eq!(
        csv.lines().collect::<Vec<_>>(),
        vec![
            "store_id,uptime_last_hour,uptime_last_day,uptime_last_week,downtime_last_hour,downtime_last_day,downtime_last_week",
            "1,30.00,210.00,210.00,30.00,30.00,30.00",
            "2,0.00,0.00,0.00,60.00,1440.00,10080.00",
        ]
    );
    Ok(())
}

#[test]
fn repeated_runs_are_byte_identical() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new("idempotent")?;
    let context = JobContext {
        source: Arc::new(fixture.source()),
        options: EngineOptions::default(),
        output_dir: fixture.dir.join("reports"),
        snapshot_mode: SnapshotMode::WallClock,
    };
    let cancel = AtomicBool::new(false);

    let first_id = uuid::Uuid::new_v4();
    let second_id = uuid::Uuid::new_v4();
    let (first_path, first_run) = run_report(&context, &first_id, Some(snapshot_instant()), &cancel)?;
    let (second_path, _) = run_report(&context, &second_id, Some(snapshot_instant()), &cancel)?;

    assert_ne!(first_path, second_path);
    assert_eq!(first_run.rows.len(), 2);
    assert_eq!(fs::read(&first_path)?, fs::read(&second_path)?);
    Ok(())
}

#[test]
fn latest_observation_mode_uses_newest_sample() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new("latest")?;
    let context = JobContext {
        source: Arc::new(fixture.source()),
        options: EngineOptions::default(),
        output_dir: fixture.dir.join("reports"),
        snapshot_mode: SnapshotMode::LatestObservation,
    };

    let (_, run) = run_report(&context, &uuid::Uuid::new_v4(), None, &AtomicBool::new(false))?;

    let expected = Utc
        .with_ymd_and_hms(2023, 1, 25, 17, 45, 0)
        .single()
        .expect("valid instant");
    assert_eq!(run.now, expected);
    Ok(())
}
