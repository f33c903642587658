//! US Census Bureau Geocoder client.
//!
//! - Batch: `POST /geocoder/locations/addressbatch` (up to 10,000 rows)
//! - Single line: `GET /geocoder/locations/onelineaddress`
//!
//! Batch uploads are written to a temporary CSV file right before each
//! request and removed right after it, on success and failure alike. A
//! non-success status fails the batch; nothing is retried.
//!
//! See <https://geocoding.geo.census.gov/geocoder/Geocoding_Services_API.html>

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crime_route_progress::ProgressCallback;
use reqwest::multipart;
use tempfile::NamedTempFile;

use crate::{AddressInput, GeocodeError, GeocodeResult, GeocodedAddress, MatchStatus};

/// Maximum number of addresses per batch request (Census Bureau limit).
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Default batch size, one below the service limit.
pub const DEFAULT_BATCH_SIZE: usize = 9_999;

/// Default Census geocoder base URL.
pub const DEFAULT_BASE_URL: &str = "https://geocoding.geo.census.gov/geocoder";

/// Default address benchmark.
pub const DEFAULT_BENCHMARK: &str = "Public_AR_Current";

/// Connection settings for the Census geocoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusSettings {
    /// API base URL, without the `/locations/...` suffix.
    pub base_url: String,
    /// Benchmark name (e.g., `"Public_AR_Current"`).
    pub benchmark: String,
    /// Maximum addresses per batch request.
    pub max_batch_size: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Directory for temporary batch files. System temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for CensusSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            benchmark: DEFAULT_BENCHMARK.to_string(),
            max_batch_size: DEFAULT_BATCH_SIZE,
            timeout: Duration::from_secs(180),
            temp_dir: None,
        }
    }
}

/// Batch geocoder backed by the Census Bureau service.
pub struct CensusGeocoder {
    client: reqwest::Client,
    settings: CensusSettings,
}

impl CensusGeocoder {
    /// Creates a geocoder with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: CensusSettings) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    /// Creates a geocoder that shares an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, mut settings: CensusSettings) -> Self {
        settings.max_batch_size = settings.max_batch_size.clamp(1, MAX_BATCH_SIZE);
        Self { client, settings }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &CensusSettings {
        &self.settings
    }

    /// Geocodes all `addresses`, split into sequential batches of at most
    /// `max_batch_size` rows.
    ///
    /// Returns one result per input. Within a batch, results follow input
    /// order; batches are concatenated in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Service`] for the first batch the service
    /// rejects, or another [`GeocodeError`] if a request or temp file fails.
    pub async fn geocode_addresses(
        &self,
        addresses: &[AddressInput],
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<Vec<GeocodeResult>, GeocodeError> {
        let batch_count = addresses.len().div_ceil(self.settings.max_batch_size);
        progress.set_total(batch_count as u64);

        let mut results = Vec::with_capacity(addresses.len());

        for (idx, chunk) in addresses.chunks(self.settings.max_batch_size).enumerate() {
            let batch = idx + 1;
            progress.set_message(format!("Geocoding batch {batch}/{batch_count}"));
            log::info!(
                "Sending batch {batch}/{batch_count} of {} addresses to Census geocoder...",
                chunk.len()
            );

            let batch_results = self.geocode_batch(batch, chunk).await.inspect_err(|e| {
                log::error!("Census batch {batch} failed: {e}");
            })?;

            let matched = batch_results
                .iter()
                .filter(|r| r.match_status == MatchStatus::Match)
                .count();
            log::info!(
                "Census batch {batch}: {matched} matched, {} not matched",
                batch_results.len() - matched
            );

            results.extend(batch_results);
            progress.inc(1);
        }

        progress.finish(format!("Geocoded {} addresses", results.len()));
        Ok(results)
    }

    /// Geocodes one batch of at most [`MAX_BATCH_SIZE`] addresses.
    ///
    /// `batch` is the 1-based batch number used in errors and logs.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Service`] on a non-200 response, or another
    /// [`GeocodeError`] if the temp file, request or response parsing fails.
    pub async fn geocode_batch(
        &self,
        batch: usize,
        addresses: &[AddressInput],
    ) -> Result<Vec<GeocodeResult>, GeocodeError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        // Removed on drop, including when any step below fails
        let batch_file = self.write_batch_file(batch, addresses)?;
        let file_name = batch_file
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("addresses.csv")
            .to_string();
        let contents = tokio::fs::read(batch_file.path()).await?;

        let form = multipart::Form::new()
            .text("benchmark", self.settings.benchmark.clone())
            .part(
                "addressFile",
                multipart::Part::bytes(contents)
                    .file_name(file_name)
                    .mime_str("text/csv")?,
            );

        let url = format!("{}/locations/addressbatch", self.settings.base_url);
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.settings.timeout)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        batch_file.close()?;

        if status != reqwest::StatusCode::OK {
            return Err(GeocodeError::Service {
                batch,
                status: status.as_u16(),
                body,
            });
        }

        parse_batch_response(&body, addresses)
    }

    /// Geocodes one free-form address line (used for route endpoints).
    ///
    /// Returns `Ok(None)` when the service finds no match.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails, the service answers
    /// with a non-success status, or the JSON is malformed.
    pub async fn geocode_one_line(
        &self,
        address: &str,
    ) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let url = format!("{}/locations/onelineaddress", self.settings.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("address", address),
                ("benchmark", self.settings.benchmark.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GeocodeError::Service {
                batch: 0,
                status: status.as_u16(),
                body: resp.text().await?,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_one_line_response(&body)
    }

    fn write_batch_file(
        &self,
        batch: usize,
        addresses: &[AddressInput],
    ) -> Result<NamedTempFile, GeocodeError> {
        let prefix = format!("geocoding_batch_{batch}_");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".csv");

        let mut file = match &self.settings.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        // No header row: the service reads every line as an address
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file.as_file_mut());
        for addr in addresses {
            writer.write_record([
                addr.id.as_str(),
                addr.street.as_str(),
                addr.city.as_str(),
                addr.state.as_str(),
                addr.zip.as_deref().unwrap_or(""),
            ])?;
        }
        writer.flush()?;
        drop(writer);

        Ok(file)
    }
}

/// Parses a `"lon,lat"` coordinate string.
///
/// Missing, empty or malformed input yields `(None, None)` rather than an
/// error.
#[must_use]
pub fn parse_coordinates(coordinates: Option<&str>) -> (Option<f64>, Option<f64>) {
    let Some(s) = coordinates.map(str::trim).filter(|s| !s.is_empty()) else {
        return (None, None);
    };

    let parts: Vec<&str> = s.split(',').collect();
    if let [lon, lat] = parts.as_slice()
        && let (Ok(lon), Ok(lat)) = (lon.trim().parse::<f64>(), lat.trim().parse::<f64>())
        && lon.is_finite()
        && lat.is_finite()
    {
        return (Some(lon), Some(lat));
    }

    (None, None)
}

/// Parses the unheadered batch response.
///
/// Columns: `row_id, input_address, match_status, match_type,
/// matched_address, coordinates, tiger_line_id, side`. Unmatched rows carry
/// only the first three. The service does not preserve row order, so
/// results are re-ordered to follow `addresses`; inputs missing from the
/// response become no-match results.
fn parse_batch_response(
    body: &str,
    addresses: &[AddressInput],
) -> Result<Vec<GeocodeResult>, GeocodeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut by_id: BTreeMap<String, GeocodeResult> = BTreeMap::new();

    for record in reader.records() {
        let record = record?;
        if record.len() < 3 {
            log::warn!("Skipping short geocoder response row: {record:?}");
            continue;
        }

        let field = |i: usize| record.get(i).filter(|f| !f.is_empty()).map(String::from);
        let (longitude, latitude) = parse_coordinates(record.get(5));

        let result = GeocodeResult {
            row_id: record.get(0).unwrap_or_default().to_string(),
            input_address: record.get(1).unwrap_or_default().to_string(),
            match_status: MatchStatus::parse_lenient(record.get(2).unwrap_or_default()),
            match_type: field(3),
            matched_address: field(4),
            longitude,
            latitude,
            tiger_line_id: field(6),
            side: field(7),
        };
        by_id.insert(result.row_id.clone(), result);
    }

    let mut results = Vec::with_capacity(addresses.len());
    for addr in addresses {
        match by_id.remove(&addr.id) {
            Some(result) => results.push(result),
            None => {
                log::debug!("No geocoder row returned for id {}", addr.id);
                results.push(GeocodeResult::missing(addr));
            }
        }
    }

    if !by_id.is_empty() {
        log::warn!(
            "Geocoder returned {} rows with unknown ids; ignoring them",
            by_id.len()
        );
    }

    Ok(results)
}

/// Parses the JSON response from the single-line endpoint.
fn parse_one_line_response(
    body: &serde_json::Value,
) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let matches =
        body["result"]["addressMatches"]
            .as_array()
            .ok_or_else(|| GeocodeError::Parse {
                message: "Missing addressMatches array".to_string(),
            })?;

    let Some(first) = matches.first() else {
        return Ok(None);
    };

    let x = first["coordinates"]["x"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing x coordinate".to_string(),
        })?;
    let y = first["coordinates"]["y"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing y coordinate".to_string(),
        })?;

    Ok(Some(GeocodedAddress {
        latitude: y,
        longitude: x,
        matched_address: first["matchedAddress"].as_str().map(String::from),
    }))
}
