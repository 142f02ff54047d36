use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::meta::Meta;
use crate::value::{Attrs, Evaluator};

pub const DEFAULT_SCHEDULING_PRIORITY: i64 = 100;
pub const DEFAULT_TIMEOUT: i64 = 36000;
pub const DEFAULT_MAX_SILENT: i64 = 7200;

/// Everything the scheduler needs to know about one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    #[serde(rename = "nixName")]
    pub name: String,
    pub system: String,
    #[serde(rename = "drvPath")]
    pub artifact_path: String,
    pub description: String,
    pub license: String,
    pub homepage: String,
    pub maintainers: String,
    pub scheduling_priority: i64,
    pub timeout: i64,
    pub max_silent: i64,
    pub is_channel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constituents: Option<String>,
    pub outputs: BTreeMap<String, String>,
}

/// Output name to store path, in the order the derivation lists them.
/// Falls back to a single `out` output taken from `outPath`.
pub fn query_outputs<E: Evaluator>(eval: &E, drv: &Attrs<E::Value>) -> Result<Vec<(String, String)>> {
    if let Some(outputs) = drv.get("outputs") {
        let outputs = eval.force_attrs(outputs)?;
        return outputs
            .iter()
            .map(|(name, path)| Ok::<_, Error>((name.to_string(), eval.force_string(path)?)))
            .collect();
    }
    match drv.get("outPath") {
        Some(path) => Ok(vec![("out".to_string(), eval.force_string(path)?)]),
        None => Ok(Vec::new()),
    }
}

/// `out` if the derivation has one, otherwise its first output.
pub fn primary_output(outputs: &[(String, String)]) -> Option<(&str, &str)> {
    outputs
        .iter()
        .find(|(name, _)| name == "out")
        .or_else(|| outputs.first())
        .map(|(name, path)| (name.as_str(), path.as_str()))
}

/// The derivation's `drvPath`, or the primary output path with a `.drv`
/// suffix when the document does not spell it out.
pub fn query_drv_path<E: Evaluator>(
    eval: &E,
    drv: &Attrs<E::Value>,
    primary_path: &str,
) -> Result<String> {
    match drv.get("drvPath") {
        Some(path) => eval.force_string(path),
        None => Ok(format!("{}.drv", primary_path)),
    }
}

/// Builds the descriptor of a node already classified as a job. Aggregate
/// constituents are filled in separately.
pub fn extract_job<E: Evaluator>(eval: &E, drv: &Attrs<E::Value>) -> Result<JobDescriptor> {
    let outputs = query_outputs(eval, drv)?;

    let system = match drv.get("system") {
        Some(system) => eval.force_string(system)?,
        None => "unknown".to_string(),
    };
    if system == "unknown" {
        return Err(Error::eval("derivation must have a ‘system’ attribute"));
    }

    let (_, primary_path) =
        primary_output(&outputs).ok_or_else(|| Error::eval("derivation has no outputs"))?;
    let artifact_path = query_drv_path(eval, drv, primary_path)?;

    let name = match drv.get("name") {
        Some(name) => eval.force_string(name)?,
        None => String::new(),
    };

    let meta = Meta::of(eval, drv)?;
    Ok(JobDescriptor {
        name,
        system,
        artifact_path,
        description: meta.string("description")?,
        license: meta.strings("license"),
        homepage: meta.string("homepage")?,
        maintainers: meta.strings("maintainers"),
        scheduling_priority: meta.int("schedulingPriority", DEFAULT_SCHEDULING_PRIORITY)?,
        timeout: meta.int("timeout", DEFAULT_TIMEOUT)?,
        max_silent: meta.int("maxSilent", DEFAULT_MAX_SILENT)?,
        is_channel: meta.bool("isHydraChannel", false)?,
        constituents: None,
        outputs: outputs.into_iter().collect(),
    })
}
