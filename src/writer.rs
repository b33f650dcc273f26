use crate::api::Error;
use crate::model::{FieldValue, NormalizedPoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use influxdb::{Client, InfluxDbWriteable, Timestamp, Type, WriteQuery};

/// Destination of normalized points.
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// Persist `points`. `captured_at` stamps points that carry no device time of their own.
    async fn write(&self, points: &[NormalizedPoint], captured_at: DateTime<Utc>)
        -> Result<(), Error>;
}

pub struct InfluxWriter {
    client: Client,
}

impl InfluxWriter {
    pub fn new(url: &str, database: &str, credentials: Option<(String, String)>) -> Self {
        let client = Client::new(url, database);
        let client = match credentials {
            Some((username, password)) => client.with_auth(username, password),
            None => client,
        };
        InfluxWriter { client }
    }
}

/// Map influxdb client errors so an unreachable server is told apart from a rejected batch.
fn map_influx_err(error: influxdb::Error) -> Error {
    match error {
        influxdb::Error::ConnectionError { error } => Error::DatabaseUnreachable(error),
        influxdb::Error::AuthenticationError | influxdb::Error::AuthorizationError => {
            Error::DatabaseAuth(error.to_string())
        }
        influxdb::Error::DatabaseError { error } | influxdb::Error::InvalidQueryError { error } => {
            Error::MalformedBatch(error)
        }
        other => Error::DatabaseUnreachable(other.to_string()),
    }
}

pub fn write_query(point: &NormalizedPoint, captured_at: DateTime<Utc>) -> WriteQuery {
    // Timestamp::Seconds is unsigned; a device clock before the epoch is not usable.
    let seconds = point
        .timestamp()
        .and_then(|time| u128::try_from(time.timestamp()).ok())
        .or_else(|| u128::try_from(captured_at.timestamp()).ok())
        .unwrap_or_default();

    let query = point
        .tags
        .iter()
        .fold(
            Timestamp::Seconds(seconds).into_query(point.measurement.as_str()),
            |query, (tag, value)| query.add_tag(*tag, value.to_owned()),
        );

    point.fields.iter().fold(query, |query, (field, value)| {
        let value = match value {
            FieldValue::Float(v) => Type::Float(*v),
            FieldValue::Text(s) => Type::Text(s.to_owned()),
        };
        query.add_field(*field, value)
    })
}

#[async_trait]
impl PointWriter for InfluxWriter {
    async fn write(
        &self,
        points: &[NormalizedPoint],
        captured_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        if points.is_empty() {
            log::debug!("empty batch; nothing to write");
            return Ok(());
        }

        let queries: Vec<WriteQuery> = points
            .iter()
            .map(|point| write_query(point, captured_at))
            .collect();

        let response = self.client.query(queries).await.map_err(map_influx_err)?;
        log::trace!("influxdb write of {} points: {}", points.len(), response);
        Ok(())
    }
}
