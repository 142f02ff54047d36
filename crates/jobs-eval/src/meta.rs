//! Reading `meta` attributes of a derivation.
//!
//! A member of the wrong type is treated as absent and the default is used.
//! Evaluation errors in `meta` or in a scalar member still fail the job.
//! Only the flattened license and maintainer strings skip over errors.

use crate::error::Result;
use crate::value::{Attrs, Evaluator, Whnf};

/// Flattens a license or maintainer value into one display string.
///
/// Strings contribute themselves, lists contribute their elements in order,
/// and attribute sets contribute their `shortName`. The pieces are joined
/// with `", "`.
pub fn meta_strings<E: Evaluator>(eval: &E, value: Option<&E::Value>) -> String {
    let mut parts = Vec::new();
    if let Some(value) = value {
        collect(eval, value, &mut parts);
    }
    parts.join(", ")
}

fn collect<E: Evaluator>(eval: &E, value: &E::Value, parts: &mut Vec<String>) {
    match eval.force(value) {
        Ok(Whnf::Str(s)) => parts.push(s),
        Ok(Whnf::List(items)) => {
            for item in &items {
                collect(eval, item, parts);
            }
        }
        Ok(Whnf::Attrs(attrs)) => {
            if let Some(Ok(name)) = attrs.get("shortName").map(|v| eval.force_string(v)) {
                parts.push(name);
            }
        }
        _ => {}
    }
}

/// Typed access to the members of a derivation's `meta` set.
pub struct Meta<'a, E: Evaluator> {
    eval: &'a E,
    attrs: Option<Attrs<E::Value>>,
}

impl<'a, E: Evaluator> Meta<'a, E> {
    /// Reads `meta` from a derivation. A missing or non-set `meta` behaves
    /// as an empty one.
    pub fn of(eval: &'a E, drv: &Attrs<E::Value>) -> Result<Self> {
        let attrs = match drv.get("meta") {
            Some(meta) => match eval.force(meta)? {
                Whnf::Attrs(attrs) => Some(attrs),
                _ => None,
            },
            None => None,
        };
        Ok(Self { eval, attrs })
    }

    fn force(&self, name: &str) -> Result<Option<Whnf<E::Value>>> {
        self.get(name).map(|v| self.eval.force(v)).transpose()
    }

    pub fn get(&self, name: &str) -> Option<&E::Value> {
        self.attrs.as_ref().and_then(|attrs| attrs.get(name))
    }

    pub fn string(&self, name: &str) -> Result<String> {
        Ok(match self.force(name)? {
            Some(Whnf::Str(s)) => s,
            _ => String::new(),
        })
    }

    pub fn strings(&self, name: &str) -> String {
        meta_strings(self.eval, self.get(name))
    }

    /// Integers may also be given as strings holding an integer.
    pub fn int(&self, name: &str, default: i64) -> Result<i64> {
        Ok(match self.force(name)? {
            Some(Whnf::Int(n)) => n,
            Some(Whnf::Str(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        })
    }

    /// Booleans may also be given as the strings `"true"` and `"false"`.
    pub fn bool(&self, name: &str, default: bool) -> Result<bool> {
        Ok(match self.force(name)? {
            Some(Whnf::Bool(b)) => b,
            Some(Whnf::Str(s)) if s == "true" => true,
            Some(Whnf::Str(s)) if s == "false" => false,
            _ => default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentEvaluator;
    use serde_json::json;

    fn drv(meta: serde_json::Value) -> (DocumentEvaluator, Attrs<crate::document::Value>) {
        let ev = DocumentEvaluator::from_json(&json!({
            "type": "derivation",
            "meta": meta
        }))
        .unwrap();
        let attrs = ev.force_attrs(ev.root()).unwrap();
        (ev, attrs)
    }

    #[test]
    fn licenses_flatten_in_order() {
        let (ev, attrs) = drv(json!({
            "license": [
                { "shortName": "gpl3" },
                "bsd",
                [{ "shortName": "mit" }, { "fullName": "No short name" }]
            ]
        }));
        assert_eq!(Meta::of(&ev, &attrs).unwrap().strings("license"), "gpl3, bsd, mit");
    }

    #[test]
    fn single_string_maintainer() {
        let (ev, attrs) = drv(json!({ "maintainers": "alice@example.org" }));
        assert_eq!(Meta::of(&ev, &attrs).unwrap().strings("maintainers"), "alice@example.org");
    }

    #[test]
    fn unusable_metadata_is_ignored() {
        let (ev, attrs) = drv(json!({
            "license": [42, { "__throw": "broken" }, "asl20"]
        }));
        assert_eq!(Meta::of(&ev, &attrs).unwrap().strings("license"), "asl20");
    }

    #[test]
    fn missing_meta_gives_defaults() {
        let ev = DocumentEvaluator::from_json(&json!({ "type": "derivation" })).unwrap();
        let attrs = ev.force_attrs(ev.root()).unwrap();
        let meta = Meta::of(&ev, &attrs).unwrap();
        assert_eq!(meta.string("description").unwrap(), "");
        assert_eq!(meta.strings("license"), "");
        assert_eq!(meta.int("timeout", 36000).unwrap(), 36000);
        assert!(!meta.bool("isHydraChannel", false).unwrap());
    }

    #[test]
    fn numeric_strings_and_string_booleans_are_accepted() {
        let (ev, attrs) = drv(json!({
            "timeout": "600",
            "maxSilent": "soon",
            "isHydraChannel": "true"
        }));
        let meta = Meta::of(&ev, &attrs).unwrap();
        assert_eq!(meta.int("timeout", 36000).unwrap(), 600);
        assert_eq!(meta.int("maxSilent", 7200).unwrap(), 7200);
        assert!(meta.bool("isHydraChannel", false).unwrap());
    }

    #[test]
    fn wrong_types_fall_back_to_defaults() {
        let (ev, attrs) = drv(json!({ "description": 7, "timeout": [1], "isHydraChannel": null }));
        let meta = Meta::of(&ev, &attrs).unwrap();
        assert_eq!(meta.string("description").unwrap(), "");
        assert_eq!(meta.int("timeout", 36000).unwrap(), 36000);
        assert!(!meta.bool("isHydraChannel", false).unwrap());
    }

    #[test]
    fn failing_members_are_errors() {
        let (ev, attrs) = drv(json!({
            "description": { "__throw": "no description" },
            "timeout": { "__throw": "no timeout" }
        }));
        let meta = Meta::of(&ev, &attrs).unwrap();
        assert_eq!(meta.string("description").unwrap_err().to_string(), "no description");
        assert_eq!(meta.int("timeout", 36000).unwrap_err().to_string(), "no timeout");
        assert_eq!(meta.string("homepage").unwrap(), "");

        let (ev, attrs) = drv(json!({ "__throw": "meta broken" }));
        let err = Meta::of(&ev, &attrs).err().expect("meta fails");
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "meta broken");
    }
}
