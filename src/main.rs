#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use chrono::Local;
use config::Config;
use rocket::serde::json::Json;
use rocket::State;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sunpower_rs::api;
use sunpower_rs::device::{Batch, ClassifyMode};
use sunpower_rs::model::Gateway;
use sunpower_rs::monitor;
use sunpower_rs::report::{human_time_format, EmailNotifier, LogNotifier, Notifier, PollState};
use sunpower_rs::writer::InfluxWriter;

mod metrics;

#[derive(Clone, serde::Deserialize)]
pub struct MonitorConfig {
    gateway_host: String,
    gateway_port: u16,
    http_timeout: u64,
    interval: u64,
    report_interval: u64,
    influx_url: String,
    influx_database: String,
    influx_username: Option<String>,
    influx_password: Option<String>,
    strict_device_types: bool,
    known_inverters: String,
    smtp_server: Option<String>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    smtp_sender: Option<String>,
    smtp_receivers: Option<String>,
}

/// Structure containing state shared by the poll loop and API handlers.
pub struct StateData {
    gateway: Gateway,
    /// Batch assembled by the most recent poll cycle that reached the gateway
    last_batch: Mutex<Option<Batch>>,
}

impl StateData {
    fn store(&self, batch: &Batch) {
        if let Ok(mut last) = self.last_batch.lock() {
            *last = Some(batch.clone());
        } else {
            log::trace!("Unable to lock last batch mutex, will store next cycle")
        }
    }
}

fn comma_separated(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn read_settings() -> Result<MonitorConfig, config::ConfigError> {
    let mut settings = Config::default();
    settings
        .set_default("gateway_host", "localhost")?
        .set_default("gateway_port", 8080_i64)?
        .set_default("http_timeout", 30_i64)?
        .set_default("interval", 60_i64)?
        .set_default("report_interval", 3600_i64)?
        .set_default("influx_url", "http://localhost:8086")?
        .set_default("influx_database", "sunpower")?
        .set_default("strict_device_types", false)?
        .set_default("known_inverters", "")?;
    settings
        .merge(config::File::with_name("sunpower").required(false))?
        .merge(config::Environment::with_prefix("SUNPOWER"))?;

    settings.try_into()
}

fn notifier(settings: &MonitorConfig) -> Result<Box<dyn Notifier>, api::Error> {
    match &settings.smtp_server {
        Some(server) => {
            let notifier = EmailNotifier::new(
                server,
                settings.smtp_user.clone().unwrap_or_default(),
                settings.smtp_password.clone().unwrap_or_default(),
                settings.smtp_sender.as_deref().unwrap_or_default(),
                comma_separated(settings.smtp_receivers.as_deref().unwrap_or_default()),
            )?;
            Ok(Box::new(notifier))
        }
        None => Ok(Box::new(LogNotifier)),
    }
}

async fn poll_loop(
    state: Arc<StateData>,
    writer: InfluxWriter,
    notifier: Box<dyn Notifier>,
    mode: ClassifyMode,
    mut poll_state: PollState,
    interval: Duration,
) {
    loop {
        let outcome =
            monitor::run_cycle(&state.gateway, &writer, mode, &mut poll_state).await;
        metrics::record(&outcome);
        if let Some(batch) = outcome.batch() {
            state.store(batch);
        }

        monitor::close_cycle(&mut poll_state, notifier.as_ref(), Local::now()).await;
        tokio::time::sleep(interval).await;
    }
}

#[get("/metrics")]
fn metrics_route() -> Result<String, api::Error> {
    metrics::read()
}

#[get("/dump-devices")]
async fn dump_devices_route(state: &State<Arc<StateData>>) -> Result<String, api::Error> {
    let dump = api::dump_devices(&state.gateway).await?;

    Ok(format!("{:#?}", dump))
}

#[get("/last-batch")]
fn last_batch_route(state: &State<Arc<StateData>>) -> Result<Option<Json<Batch>>, api::Error> {
    let last = state.last_batch.lock().or(Err(api::Error::InternalError))?;
    Ok(last.clone().map(Json))
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = read_settings().map_err(|e| {
        log::error!("Configuration error: {}", e);
        e
    })?;

    let gateway = api::gateway(
        &settings.gateway_host,
        settings.gateway_port,
        settings.http_timeout,
    )?;
    let credentials = settings
        .influx_username
        .clone()
        .zip(settings.influx_password.clone());
    let writer = InfluxWriter::new(&settings.influx_url, &settings.influx_database, credentials);
    let notifier = notifier(&settings)?;
    let mode = ClassifyMode::from_strict_flag(settings.strict_device_types);
    let poll_state = PollState::new(
        settings.interval,
        settings.report_interval,
        comma_separated(&settings.known_inverters),
    );

    log::info!(
        "the sunpower monitor is running at {}; polling {} every {}s",
        human_time_format(&Local::now()),
        gateway.base_url,
        settings.interval
    );

    let state = Arc::new(StateData {
        gateway,
        last_batch: Mutex::new(None),
    });

    tokio::spawn(poll_loop(
        Arc::clone(&state),
        writer,
        notifier,
        mode,
        poll_state,
        Duration::from_secs(settings.interval),
    ));

    let _rocket = rocket::build()
        .manage(state)
        .mount(
            "/",
            routes![metrics_route, dump_devices_route, last_batch_route],
        )
        .launch()
        .await?;

    log::info!("***** the sunpower monitor has exited by request *****");
    Ok(())
}
