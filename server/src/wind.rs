//! Wind velocity layer: decoding of upstream wind JSON into a [`WindGrid`],
//! fallback data, and the periodic fetch from the wind endpoint.
//!
//! Upstream payloads come in two shapes. The canonical one is an object whose
//! `data` holds exactly two records, U then V, each with a numeric `data`
//! array of `nx*ny` samples. Anything else is searched for records labelled
//! `U-component` / `V-component`. In both cases defaults fill whatever header
//! fields are missing.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use shared::{WindGrid, WindHeader};

const U_LABEL: &str = "U-component";
const V_LABEL: &str = "V-component";

const DEFAULT_LO1: f64 = 2.09;
const DEFAULT_LA1: f64 = 41.47;
const DEFAULT_STEP: f64 = 0.1;
const DEFAULT_CELLS: usize = 3;
const DEFAULT_UNIT: &str = "m.s-1";

/// Largest accepted `nx*ny`; a 0.25 degree global grid is about 1.04M cells.
pub const MAX_CELLS: usize = 4_000_000;

// GRIB2 meteorological momentum parameters, as expected by velocity overlays
const CATEGORY_MOMENTUM: u8 = 2;
const PARAM_U_WIND: u8 = 2;
const PARAM_V_WIND: u8 = 3;

#[derive(Debug, Error, PartialEq)]
pub enum WindError {
    #[error("wind payload is not a JSON object")]
    NotAnObject,
    #[error("wind payload has no `data` array")]
    MissingData,
}

/// Decode any upstream payload into a grid.
///
/// On error the caller is expected to fall back to [`example_grid`].
pub fn adapt(payload: &Value) -> Result<WindGrid, WindError> {
    match decode_canonical(payload) {
        Some(grid) => Ok(grid),
        None => decode_labeled(payload),
    }
}

/// Accept the payload if it is a positional U/V record pair whose sample
/// arrays are numeric, non-empty and `nx*ny` long. Header fields come from the
/// U record, then the V record, then the payload's top-level `header`.
pub fn decode_canonical(payload: &Value) -> Option<WindGrid> {
    let records = payload.get("data")?.as_array()?;
    let [u_record, v_record] = records.as_slice() else {
        return None;
    };

    if !is_component(u_record, U_LABEL, PARAM_U_WIND)
        || !is_component(v_record, V_LABEL, PARAM_V_WIND)
    {
        return None;
    }

    let u = numeric_samples(u_record.get("data")?)?;
    let v = numeric_samples(v_record.get("data")?)?;

    let partial = PartialHeader::read(u_record.get("header"))
        .or(PartialHeader::read(v_record.get("header")))
        .or(PartialHeader::read(payload.get("header")));
    let header_known = partial.is_complete();
    let header = partial.resolve();

    if u.is_empty() || u.len() != v.len() || u.len() != header.cell_count() {
        return None;
    }

    Some(WindGrid {
        header,
        components: [u, v],
        header_known,
    })
}

/// Search the payload's records for labelled U and V components.
pub fn decode_labeled(payload: &Value) -> Result<WindGrid, WindError> {
    let object = payload.as_object().ok_or(WindError::NotAnObject)?;
    let records = object
        .get("data")
        .and_then(Value::as_array)
        .ok_or(WindError::MissingData)?;

    let u_record = find_component(records, U_LABEL);
    let v_record = find_component(records, V_LABEL);

    let partial = PartialHeader::read(u_record.or(v_record).and_then(|r| r.get("header")))
        .or(PartialHeader::read(object.get("header")));
    let header_known = partial.is_complete();
    let header = partial.resolve();

    let cells = header.cell_count();
    let u = component_samples(u_record, cells, U_LABEL);
    let v = component_samples(v_record, cells, V_LABEL);

    Ok(WindGrid {
        header,
        components: [u, v],
        header_known,
    })
}

/// Small fixed grid over Barcelona used when no usable upstream data exists.
pub fn example_grid() -> WindGrid {
    WindGrid {
        header: WindHeader {
            lo1: DEFAULT_LO1,
            la1: DEFAULT_LA1,
            dx: DEFAULT_STEP,
            dy: DEFAULT_STEP,
            nx: DEFAULT_CELLS,
            ny: DEFAULT_CELLS,
            ref_time: "2024-01-01T00:00:00Z".to_string(),
            parameter_unit: DEFAULT_UNIT.to_string(),
        },
        components: [
            vec![1.5, 2.0, 2.5, 1.0, 1.8, 2.2, 0.5, 1.2, 1.9],
            vec![-0.5, 0.0, 0.6, -1.0, 0.3, 0.8, -1.2, -0.4, 0.2],
        ],
        header_known: true,
    }
}

/// Render a grid as the two-record array consumed by velocity overlays.
pub fn velocity_json(grid: &WindGrid) -> Value {
    let record = |number: u8, name: &str, samples: &[f64]| {
        let h = &grid.header;
        json!({
            "header": {
                "parameterCategory": CATEGORY_MOMENTUM,
                "parameterNumber": number,
                "parameterNumberName": name,
                "parameterUnit": h.parameter_unit,
                "refTime": h.ref_time,
                "lo1": h.lo1,
                "la1": h.la1,
                "dx": h.dx,
                "dy": h.dy,
                "nx": h.nx,
                "ny": h.ny,
            },
            "data": samples,
        })
    };
    Value::Array(vec![
        record(PARAM_U_WIND, "U-component_of_wind", grid.u()),
        record(PARAM_V_WIND, "V-component_of_wind", grid.v()),
    ])
}

fn record_label(record: &Value) -> Option<&str> {
    record
        .get("header")
        .and_then(|h| h.get("parameterNumberName"))
        .and_then(Value::as_str)
        .or_else(|| record.get("name").and_then(Value::as_str))
}

fn has_label(record: &Value, label: &str) -> bool {
    record_label(record).map_or(false, |l| l.contains(label))
}

/// Unlabelled records may sit in either slot. A label or parameter number,
/// when present, has to agree with the slot.
fn is_component(record: &Value, label: &str, number: u8) -> bool {
    let label_ok = record_label(record).map_or(true, |l| l.contains(label));
    let number_ok = record
        .get("header")
        .and_then(|h| h.get("parameterNumber"))
        .and_then(Value::as_u64)
        .map_or(true, |n| n == u64::from(number));
    label_ok && number_ok
}

fn find_component<'a>(records: &'a [Value], label: &str) -> Option<&'a Value> {
    records.iter().find(|r| has_label(r, label))
}

fn numeric_samples(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn component_samples(record: Option<&Value>, cells: usize, label: &str) -> Vec<f64> {
    let samples = record
        .and_then(|r| r.get("data"))
        .and_then(numeric_samples)
        .unwrap_or_default();

    if samples.len() == cells {
        return samples;
    }
    if !samples.is_empty() {
        log::warn!(
            "{} has {} samples, expected {}; using zeros",
            label,
            samples.len(),
            cells
        );
    }
    vec![0.0; cells]
}

#[derive(Debug, Default)]
struct PartialHeader {
    lo1: Option<f64>,
    la1: Option<f64>,
    dx: Option<f64>,
    dy: Option<f64>,
    nx: Option<usize>,
    ny: Option<usize>,
    ref_time: Option<String>,
    parameter_unit: Option<String>,
}

impl PartialHeader {
    fn read(value: Option<&Value>) -> Self {
        let Some(object) = value.and_then(Value::as_object) else {
            return PartialHeader::default();
        };
        PartialHeader {
            lo1: finite(object, "lo1"),
            la1: finite(object, "la1"),
            dx: finite(object, "dx"),
            dy: finite(object, "dy"),
            nx: cell_count(object, "nx"),
            ny: cell_count(object, "ny"),
            ref_time: text(object, "refTime"),
            parameter_unit: text(object, "parameterUnit"),
        }
    }

    fn or(self, other: PartialHeader) -> Self {
        PartialHeader {
            lo1: self.lo1.or(other.lo1),
            la1: self.la1.or(other.la1),
            dx: self.dx.or(other.dx),
            dy: self.dy.or(other.dy),
            nx: self.nx.or(other.nx),
            ny: self.ny.or(other.ny),
            ref_time: self.ref_time.or(other.ref_time),
            parameter_unit: self.parameter_unit.or(other.parameter_unit),
        }
    }

    /// Whether the grid geometry is fully specified and of a usable size.
    fn is_complete(&self) -> bool {
        self.lo1.is_some()
            && self.la1.is_some()
            && self.dx.is_some()
            && self.dy.is_some()
            && matches!((self.nx, self.ny), (Some(nx), Some(ny)) if within_limit(nx, ny))
    }

    fn resolve(self) -> WindHeader {
        let nx = self.nx.unwrap_or(DEFAULT_CELLS);
        let ny = self.ny.unwrap_or(DEFAULT_CELLS);
        let (nx, ny) = if within_limit(nx, ny) {
            (nx, ny)
        } else {
            log::warn!(
                "Wind grid of {} x {} cells exceeds {}; using {} x {}",
                nx,
                ny,
                MAX_CELLS,
                DEFAULT_CELLS,
                DEFAULT_CELLS
            );
            (DEFAULT_CELLS, DEFAULT_CELLS)
        };
        WindHeader {
            lo1: self.lo1.unwrap_or(DEFAULT_LO1),
            la1: self.la1.unwrap_or(DEFAULT_LA1),
            dx: self.dx.unwrap_or(DEFAULT_STEP),
            dy: self.dy.unwrap_or(DEFAULT_STEP),
            nx,
            ny,
            ref_time: self
                .ref_time
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            parameter_unit: self
                .parameter_unit
                .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        }
    }
}

fn finite(object: &Map<String, Value>, key: &str) -> Option<f64> {
    object
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

fn cell_count(object: &Map<String, Value>, key: &str) -> Option<usize> {
    object
        .get(key)
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
}

fn within_limit(nx: usize, ny: usize) -> bool {
    nx.checked_mul(ny).map_or(false, |cells| cells <= MAX_CELLS)
}

fn text(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

/// HTTP endpoint serving wind JSON.
pub struct WindSource {
    client: reqwest::Client,
    url: String,
}

impl WindSource {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn fetch(&self) -> Result<Value> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to request wind data from {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Wind request failed with status: {}", status);
        }

        response
            .json()
            .await
            .context("Wind response is not valid JSON")
    }

    /// Fetch and decode. Network failures are returned; an unusable payload
    /// degrades to [`example_grid`].
    pub async fn load(&self) -> Result<WindGrid> {
        let payload = self.fetch().await?;
        match adapt(&payload) {
            Ok(grid) => Ok(grid),
            Err(err) => {
                log::warn!("Invalid wind data ({}), using example grid", err);
                Ok(example_grid())
            }
        }
    }

    /// Load now and then every `every`, publishing each new grid. A failed
    /// fetch keeps the previously published grid. Returns once every receiver
    /// is gone.
    pub async fn refresh_loop(self, every: Duration, tx: watch::Sender<WindGrid>) {
        publish_every(every, tx, || self.load()).await
    }
}

async fn publish_every<F, Fut>(every: Duration, tx: watch::Sender<WindGrid>, mut load: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WindGrid>>,
{
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match load().await {
            Ok(grid) => {
                log::info!("Wind updated: {} UTC", grid.header.ref_time);
                if tx.send(grid).is_err() {
                    return;
                }
            }
            Err(err) => log::warn!("Could not load wind layer: {:#}", err),
        }
    }
}
