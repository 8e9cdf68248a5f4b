use std::path::PathBuf;

use log::info;
use serde::Serialize;
use thiserror::Error;

use isalens_core::resolvers::StepTarget;
use isalens_core::utils::format_address;
use isalens_core::{
    format_value, open_snapshot, open_snapshot_with_binary, FormatOptions, LensConfig, LensError,
    ResolutionPolicy, Value, ValueSummary,
};

pub mod writer;

pub use writer::ReportWriter;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error(transparent)]
    Lens(#[from] LensError),
    #[error("Failed to write report: {0}")]
    WriteError(#[from] std::io::Error),
    #[error("Failed to serialize report: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// One `frame variable`-style request against a snapshot
#[derive(Debug, Clone)]
pub struct InspectRequest {
    pub snapshot: PathBuf,
    pub binary: Option<PathBuf>,
    pub config: LensConfig,
    pub frame: usize,
    pub path: String,
    pub policy: ResolutionPolicy,
    pub format: FormatOptions,
    pub step: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: String,
    pub frame: usize,
    pub function: String,
    pub policy: String,
    pub type_name: String,
    pub raw_type_name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<String>,
    pub resolved_via_runtime_call: bool,
    pub summary: ValueSummary,
    pub rendered: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepTarget>,
}

/// Opens the snapshot, evaluates the requested path in the requested frame
/// and collects everything the CLI prints
pub fn inspect_snapshot(request: &InspectRequest) -> Result<InspectReport, InspectError> {
    let session = match &request.binary {
        Some(binary) => open_snapshot_with_binary(&request.snapshot, binary, request.config.clone())?,
        None => open_snapshot(&request.snapshot, request.config.clone())?,
    };
    info!(
        "Session ready: {} types, {} identity tags",
        session.catalog().len(),
        session.catalog().tag_count()
    );

    let frame = session.frame(request.frame)?;
    let value = frame.evaluate(&request.path, request.policy)?;

    let step = match &request.step {
        Some(selector) => Some(session.dispatcher().step_into(&value, selector)?),
        None => None,
    };

    let resolved_via_runtime_call = match &value {
        Value::Dynamic(v) => v.identity().map(|i| i.via_runtime_call).unwrap_or(false),
        Value::Static(_) => false,
    };

    Ok(InspectReport {
        path: request.path.clone(),
        frame: request.frame,
        function: frame.function().to_string(),
        policy: value.policy().to_string(),
        type_name: value.type_name().to_string(),
        raw_type_name: value.raw_type_name().to_string(),
        address: format_address(value.address()),
        value: value.value_string(),
        resolution_error: value.resolution_error().map(str::to_string),
        resolved_via_runtime_call,
        summary: value.summarize(request.format.depth),
        rendered: format_value(&value, &request.path, &request.format),
        step,
    })
}
