use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::value::{Attrs, Context, Evaluator};

/// Whether the derivation asks to be treated as an aggregate job.
pub fn is_aggregate<E: Evaluator>(eval: &E, drv: &Attrs<E::Value>) -> Result<bool> {
    match drv.get("_hydraAggregate") {
        Some(flag) => eval.force_bool(flag),
        None => Ok(false),
    }
}

/// Derivation paths referenced by the aggregate's `constituents`, joined
/// with spaces.
///
/// The constituents are coerced to a string only for the side effect of
/// collecting context; the string itself is thrown away.
pub fn resolve_constituents<E: Evaluator>(eval: &E, drv: &Attrs<E::Value>) -> Result<String> {
    let constituents = drv
        .get("constituents")
        .ok_or_else(|| Error::eval("derivation must have a ‘constituents’ attribute"))?;
    let (_, context) = eval.coerce_to_string(constituents)?;
    let drvs: Vec<&str> = referenced_drvs(&context).into_iter().collect();
    Ok(drvs.join(" "))
}

/// Picks the derivation path out of every `!<output>!<drvPath>` tag. Plain
/// source paths and whole-derivation tags are skipped.
pub fn referenced_drvs(context: &Context) -> BTreeSet<&str> {
    context
        .iter()
        .filter_map(|tag| tag.strip_prefix('!'))
        .filter_map(|rest| rest.split_once('!'))
        .map(|(_, drv)| drv)
        .collect()
}
