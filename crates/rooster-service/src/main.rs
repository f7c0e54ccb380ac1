//! Rooster - alarm scheduling daemon and command-line tool.
//!
//! Run with: `cargo run -p rooster-service -- run`

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use time::macros::format_description;
use time::{OffsetDateTime, Time, Weekday};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rooster_core::{Alarm, AlarmId, AlarmMode, Anchor, LocalZone, WeekdayMask, validate_alarm};
use rooster_service::astronomy::{self, AstronomyDataResult};
use rooster_service::{AppState, Config, Runner, config::default_config_path};
use rooster_store::Store;
use rooster_types::{
    MILLIS_PER_HOUR, MILLIS_PER_MINUTE, datetime_from_millis, millis_from_datetime,
};

/// Rooster - sunrise-aware alarm scheduling.
#[derive(Parser, Debug)]
#[command(name = "rooster")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler in the foreground (default behavior).
    Run,

    /// List all alarms.
    List,

    /// Show the alarm that rings next.
    Next,

    /// Add an alarm and compute its first trigger time.
    Add(AddArgs),

    /// Delete an alarm.
    Remove { id: i64 },

    /// Enable an alarm and compute its next trigger time.
    Enable { id: i64 },

    /// Disable an alarm.
    Disable { id: i64 },

    /// Fetch fresh astronomy data now.
    Refresh,

    /// Write all alarms to a JSON backup.
    Export { path: PathBuf },

    /// Add alarms from a JSON backup.
    Import { path: PathBuf },

    /// Write a default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug)]
struct AddArgs {
    /// At, Between, After or Before.
    #[arg(long, default_value = "At")]
    mode: AlarmMode,

    /// First anchor: "Pick Time" or a solar event such as "Civil Dawn".
    #[arg(long, default_value = Anchor::FIXED_STR)]
    relative1: Anchor,

    /// Second anchor. After and Before measure from this one.
    #[arg(long, default_value = Anchor::FIXED_STR)]
    relative2: Anchor,

    /// HH:MM. A local clock time for fixed anchors, the offset for
    /// After/Before.
    #[arg(long, value_parser = parse_hhmm, default_value = "00:00")]
    time1: Time,

    /// HH:MM local clock time for a fixed second anchor.
    #[arg(long, value_parser = parse_hhmm, default_value = "00:00")]
    time2: Time,

    /// Days to repeat on (e.g. mon,wed,fri). Omit for a one-shot alarm.
    #[arg(long, value_delimiter = ',', value_parser = parse_weekday)]
    days: Vec<Weekday>,

    #[arg(long, default_value = "")]
    label: String,

    #[arg(long, default_value_t = Alarm::DEFAULT_SNOOZE_DURATION_MINUTES)]
    snooze_minutes: u32,

    #[arg(long, default_value_t = Alarm::DEFAULT_SNOOZE_COUNT)]
    snooze_count: u32,

    /// Disable snoozing for this alarm.
    #[arg(long)]
    no_snooze: bool,
}

impl AddArgs {
    /// Clock times are stored as today's instant for that local time; only
    /// their time of day matters afterwards.
    fn to_alarm(&self, zone: LocalZone, now: OffsetDateTime) -> Alarm {
        let today = zone.to_local(now).date();
        let clock = |time: Time| millis_from_datetime(zone.resolve_local(today.with_time(time)));
        let time1 = match self.mode {
            AlarmMode::After | AlarmMode::Before => {
                i64::from(self.time1.hour()) * MILLIS_PER_HOUR
                    + i64::from(self.time1.minute()) * MILLIS_PER_MINUTE
            }
            AlarmMode::At | AlarmMode::Between => clock(self.time1),
        };
        Alarm::new(AlarmId(0), self.mode)
            .label(self.label.as_str())
            .relative1(self.relative1)
            .relative2(self.relative2)
            .time1(time1)
            .time2(clock(self.time2))
            .weekdays(WeekdayMask::from_days(self.days.iter().copied()))
            .snooze(!self.no_snooze, self.snooze_minutes, self.snooze_count)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Args {
        command,
        config: config_path,
        database,
    } = Args::parse();
    let command = command.unwrap_or(Command::Run);

    init_logging(matches!(command, Command::Run))?;

    if let Command::InitConfig { force } = command {
        return init_config(config_path, force);
    }

    let mut config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(db_path) = database {
        config.storage.path = db_path;
    }
    config.validate()?;

    let store = Store::open(&config.storage.path)?;
    let zone = config.scheduler.zone();
    let (state, channels) = AppState::new(store, config)?;

    match command {
        Command::Run => {
            let shutdown = CancellationToken::new();
            let token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            });
            Runner::new(state.clone(), channels).run(shutdown).await?;
        }
        Command::List => {
            let alarms = state.store.lock().await.list_alarms()?;
            if alarms.is_empty() {
                println!("No alarms");
            }
            for alarm in &alarms {
                print_alarm(alarm, zone);
            }
        }
        Command::Next => match state.orchestrator.next_alarm().await? {
            Some(alarm) => print_alarm(&alarm, zone),
            None => println!("No upcoming alarms"),
        },
        Command::Add(add) => {
            let alarm = add.to_alarm(zone, OffsetDateTime::now_utc());
            validate_alarm(&alarm)?;
            let alarm = state.store.lock().await.insert_alarm(&alarm)?;
            let outcome = state.orchestrator.schedule_alarm(&alarm).await?;
            println!(
                "Added alarm {}, next at {}{}",
                alarm.id,
                format_instant(millis_from_datetime(outcome.at), zone),
                if outcome.approximate { " (approximate)" } else { "" }
            );
        }
        Command::Remove { id } => {
            if !state.store.lock().await.delete_alarm(AlarmId(id))? {
                bail!("No alarm with id {}", id);
            }
            println!("Removed alarm {}", id);
        }
        Command::Enable { id } => {
            let id = AlarmId(id);
            let alarm = {
                let store = state.store.lock().await;
                store.set_enabled(id, true)?;
                store.get_alarm(id)?.context("alarm vanished")?
            };
            let outcome = state.orchestrator.schedule_alarm(&alarm).await?;
            println!(
                "Enabled alarm {}, next at {}",
                id,
                format_instant(millis_from_datetime(outcome.at), zone)
            );
        }
        Command::Disable { id } => {
            let id = AlarmId(id);
            state.store.lock().await.set_enabled(id, false)?;
            state.orchestrator.cancel_alarm(id).await?;
            println!("Disabled alarm {}", id);
        }
        Command::Refresh => {
            let location = state.orchestrator.location();
            match astronomy::refresh(&state, location).await {
                AstronomyDataResult::Fresh(data) => {
                    println!(
                        "Sunrise {}, sunset {}",
                        format_instant(data.sunrise, zone),
                        format_instant(data.sunset, zone)
                    );
                    let report = state.orchestrator.recompute_approximate().await?;
                    if !report.scheduled.is_empty() {
                        println!("Recomputed {} alarms", report.scheduled.len());
                    }
                }
                AstronomyDataResult::Cached { stale, age, .. } => {
                    println!(
                        "Fetch failed; cached data is {} old{}",
                        age,
                        if stale { " (stale)" } else { "" }
                    );
                }
                AstronomyDataResult::Failure(e) => return Err(e.into()),
            }
        }
        Command::Export { path } => {
            let count = state.store.lock().await.export_to_path(&path)?;
            println!("Exported {} alarms to {}", count, path.display());
        }
        Command::Import { path } => {
            let result = state.store.lock().await.import_from_path(&path)?;
            println!(
                "Imported {} alarms ({} duplicates skipped)",
                result.imported.len(),
                result.skipped
            );
            let report = state.orchestrator.reschedule_all().await?;
            info!("Scheduled {} alarms", report.scheduled.len());
        }
        Command::InitConfig { .. } => unreachable!("handled before the store is opened"),
    }

    state.timer.cancel_all();
    Ok(())
}

fn init_logging(daemon: bool) -> anyhow::Result<()> {
    let level = if daemon { "info" } else { "warn" };
    let mut filter = EnvFilter::from_default_env();
    for target in ["rooster_service", "rooster_core", "rooster_store"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn parse_hhmm(value: &str) -> Result<Time, String> {
    let (hours, minutes) = value
        .split_once(':')
        .ok_or_else(|| format!("'{}' is not HH:MM", value))?;
    let hours: u8 = hours
        .parse()
        .map_err(|_| format!("bad hours in '{}'", value))?;
    let minutes: u8 = minutes
        .parse()
        .map_err(|_| format!("bad minutes in '{}'", value))?;
    Time::from_hms(hours, minutes, 0).map_err(|_| format!("'{}' is out of range", value))
}

fn parse_weekday(value: &str) -> Result<Weekday, String> {
    let day = match value.trim().to_ascii_lowercase().get(..3) {
        Some("mon") => Weekday::Monday,
        Some("tue") => Weekday::Tuesday,
        Some("wed") => Weekday::Wednesday,
        Some("thu") => Weekday::Thursday,
        Some("fri") => Weekday::Friday,
        Some("sat") => Weekday::Saturday,
        Some("sun") => Weekday::Sunday,
        _ => return Err(format!("unknown weekday '{}'", value)),
    };
    Ok(day)
}

fn format_hhmm(ms: i64) -> String {
    format!(
        "{:02}:{:02}",
        ms / MILLIS_PER_HOUR,
        (ms % MILLIS_PER_HOUR) / MILLIS_PER_MINUTE
    )
}

/// Local time of day of a stored clock instant.
fn format_clock(ms: i64, zone: LocalZone) -> String {
    datetime_from_millis(ms)
        .ok()
        .and_then(|dt| {
            zone.to_local(dt)
                .format(format_description!("[hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| ms.to_string())
}

fn format_instant(ms: i64, zone: LocalZone) -> String {
    if ms == 0 {
        return "-".to_string();
    }
    datetime_from_millis(ms)
        .ok()
        .and_then(|dt| {
            zone.to_local(dt)
                .format(format_description!(
                    "[year]-[month]-[day] [weekday repr:short] [hour]:[minute]"
                ))
                .ok()
        })
        .unwrap_or_else(|| ms.to_string())
}

fn bound(anchor: Anchor, ms: i64, zone: LocalZone) -> String {
    match anchor {
        Anchor::Fixed => format_clock(ms, zone),
        solar => solar.to_string(),
    }
}

fn describe(alarm: &Alarm, zone: LocalZone) -> String {
    match alarm.mode {
        AlarmMode::At => format!("at {}", bound(alarm.relative1, alarm.time1, zone)),
        AlarmMode::Between => format!(
            "between {} and {}",
            bound(alarm.relative1, alarm.time1, zone),
            bound(alarm.relative2, alarm.time2, zone)
        ),
        AlarmMode::After => format!("{} after {}", format_hhmm(alarm.time1), alarm.relative2),
        AlarmMode::Before => format!("{} before {}", format_hhmm(alarm.time1), alarm.relative2),
    }
}

fn print_alarm(alarm: &Alarm, zone: LocalZone) {
    println!(
        "{:>4}  {:<3}  {:<32}  {:<9}  {:<28}  {}",
        alarm.id.0,
        if alarm.enabled { "on" } else { "off" },
        describe(alarm, zone),
        alarm.weekdays,
        format!(
            "{}{}",
            format_instant(alarm.calculated_time, zone),
            if alarm.needs_recompute { " ~" } else { "" }
        ),
        alarm.label
    );
}
