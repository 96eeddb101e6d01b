//! `--jq-expr` support: reshape each input document with a jq filter before
//! validation. Every filter output is validated as a separate document.
use anyhow::{anyhow, Context, Result};
use jaq_core::{load, Compiler, Ctx, RcIter};
use jaq_json::Val;
use serde_json::Value;

pub fn run_jaq(filter_src: &str, document: &Value) -> Result<Vec<Value>> {
    let defs = jaq_std::defs().chain(jaq_json::defs());
    let arena = load::Arena::default();
    let modules = load::Loader::new(defs)
        .load(&arena, load::File { code: filter_src, path: () })
        .map_err(|errs| anyhow!("invalid jq filter `{filter_src}`: {} parse errors", errs.len()))?;

    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|errs| {
            let names: Vec<&str> = errs.iter().flat_map(|(_, list)| list.iter().map(|(name, _)| *name)).collect();
            anyhow!("invalid jq filter `{filter_src}`: undefined {}", names.join(", "))
        })?;

    let no_inputs = RcIter::new(core::iter::empty());
    filter
        .run((Ctx::new([], &no_inputs), Val::from(document.clone())))
        .map(|output| {
            let output = output.map_err(|e| anyhow!("jq filter failed: {e:?}"))?;
            let text = output.to_string();
            serde_json::from_str(&text).with_context(|| format!("jq filter produced non-JSON output: {text}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn each_output_is_a_document() {
        let out = run_jaq(".items[] | {id}", &json!({"items": [{"id": 1, "x": 0}, {"id": 2}]})).unwrap();
        assert_eq!(out, vec![json!({"id": 1}), json!({"id": 2})]);
        assert!(run_jaq("empty", &json!(1)).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_filters() {
        assert!(run_jaq(".[", &json!(null)).is_err());
        let err = run_jaq("nosuchfn", &json!(null)).unwrap_err();
        assert!(err.to_string().contains("nosuchfn"), "{err}");
    }
}
