use crate::capabilities::{GpuPowerReading, GpuQuery};
use crate::utils::command::run_checked;
use crate::utils::errors::ProvisionError;
use async_trait::async_trait;
use itertools::izip;
use log::info;
use polars::prelude::*;
use std::io::Cursor;

const QUERY_FIELDS: &str = "--query-gpu=index,name,driver_version,power.draw,power.limit";
const FIELD_COUNT: usize = 5;

/// GPU power report from the vendor query tool
pub struct NvidiaSmi;

fn text_column(frame: &DataFrame, position: usize) -> Result<Vec<Option<String>>, ProvisionError> {
    let column = &frame.get_columns()[position];
    let values = column
        .str()
        .map_err(|e| ProvisionError::Parse(format!("nvidia-smi column {}: {}", position, e)))?;
    Ok(values.iter().map(|v| v.map(|s| s.trim().to_string())).collect())
}

/// `[N/A]` and friends become `None`
fn watts(value: &Option<String>) -> Option<f64> {
    value.as_deref().and_then(|v| v.parse::<f64>().ok())
}

/// Parse `--format=csv,noheader,nounits` output, one row per GPU.
pub fn parse_power_csv(text: &str) -> Result<Vec<GpuPowerReading>, ProvisionError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // Read every field as text; nvidia-smi pads values and mixes in `[N/A]`.
    let frame = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()
        .map_err(|e| ProvisionError::Parse(format!("nvidia-smi output: {}", e)))?;

    if frame.width() != FIELD_COUNT {
        return Err(ProvisionError::Parse(format!(
            "nvidia-smi returned {} fields per GPU, expected {}",
            frame.width(),
            FIELD_COUNT
        )));
    }

    let indices = text_column(&frame, 0)?;
    let names = text_column(&frame, 1)?;
    let drivers = text_column(&frame, 2)?;
    let draws = text_column(&frame, 3)?;
    let limits = text_column(&frame, 4)?;

    izip!(&indices, &names, &drivers, &draws, &limits)
        .map(|(index, name, driver, draw, limit)| {
            let index = index
                .as_deref()
                .and_then(|i| i.parse::<u32>().ok())
                .ok_or_else(|| ProvisionError::Parse(format!("bad GPU index {:?}", index)))?;
            Ok(GpuPowerReading {
                index,
                name: name.clone().unwrap_or_default(),
                driver_version: driver.clone().unwrap_or_default(),
                power_draw_watts: watts(draw),
                power_limit_watts: watts(limit),
            })
        })
        .collect()
}

#[async_trait]
impl GpuQuery for NvidiaSmi {
    async fn power_state(&self) -> Result<Vec<GpuPowerReading>, ProvisionError> {
        let out = run_checked(
            "nvidia-smi",
            &[QUERY_FIELDS, "--format=csv,noheader,nounits"],
            &[],
            "check the driver with `nvidia-smi`; reinstall the NVIDIA driver package if it fails",
        )
        .await?;
        let readings = parse_power_csv(&out.stdout)?;
        info!("nvidia-smi reported {} GPU(s)", readings.len());
        Ok(readings)
    }
}
