//! Replays the JSON fixtures under `fixtures/` against the library.
//!
//! ```text
//! cargo run -p dev-test-runner [FILTER_REGEX]
//! ```
//!
//! Each fixture compiles a schema and then either expects compile errors or
//! runs validation cases against it.
mod path_de;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;

use chisel::query::decode_query_string;
use chisel::{Mode, Schema, Value};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Fixture {
    /// schema source, one entry per line
    spec: Vec<String>,
    /// expected compile errors, `<file>:<line>: error: <message>` with file `fixture`
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    cases: Vec<Case>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Case {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    mode: CaseMode,
    #[serde(default)]
    input: Option<serde_json::Value>,
    /// raw query string; decoded before validation
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CaseMode {
    Immutable,
    Query,
    Json,
}

impl From<CaseMode> for Mode {
    fn from(mode: CaseMode) -> Self {
        match mode {
            CaseMode::Immutable => Mode::Immutable,
            CaseMode::Query => Mode::QueryString,
            CaseMode::Json => Mode::JsonInput,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    passed: usize,
    failed: Vec<String>,
}

impl Tally {
    fn record(&mut self, label: String, outcome: Result<()>) {
        match outcome {
            Ok(()) => {
                self.passed += 1;
                println!("✅ {label}");
            }
            Err(error) => {
                println!("❌ {label}: {error:#}");
                self.failed.push(label);
            }
        }
    }
}

fn main() -> Result<()> {
    let filter = std::env::args()
        .nth(1)
        .map(|pattern| Regex::new(&pattern).with_context(|| format!("invalid filter regex {pattern:?}")))
        .transpose()?;

    let fixtures_dir = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"));
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&fixtures_dir)
        .with_context(|| format!("failed to read {}", fixtures_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut tally = Tally::default();
    for path in paths {
        let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let fixture = load_fixture(&path)?;
        run_fixture(&stem, &fixture, filter.as_ref(), &mut tally);
    }

    println!("\n{} passed, {} failed", tally.passed, tally.failed.len());
    if !tally.failed.is_empty() {
        bail!("failing cases: {}", tally.failed.join(", "));
    }
    Ok(())
}

fn load_fixture(path: &Path) -> Result<Fixture> {
    let source = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    path_de::from_str_with_path(&source).with_context(|| format!("invalid fixture {}", path.display()))
}

fn run_fixture(stem: &str, fixture: &Fixture, filter: Option<&Regex>, tally: &mut Tally) {
    let selected = |label: &str| filter.is_none_or(|re| re.is_match(label));
    let text = fixture.spec.join("\n");
    let compiled = Schema::parse(&text, "fixture");

    if !fixture.errors.is_empty() || fixture.cases.is_empty() {
        let label = format!("{stem}::compile");
        if selected(&label) {
            let outcome = match &compiled {
                Ok(_) if fixture.errors.is_empty() => Ok(()),
                Ok(_) => Err(anyhow::anyhow!("compiled, expected {} errors", fixture.errors.len())),
                Err(errors) => {
                    let actual: Vec<String> = errors.errors.iter().map(ToString::to_string).collect();
                    if actual == fixture.errors {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("expected {:?}, got {:?}", fixture.errors, actual))
                    }
                }
            };
            tally.record(label, outcome);
        }
    }

    for case in &fixture.cases {
        let label = format!("{stem}::{}", case.name);
        if !selected(&label) {
            continue;
        }
        let outcome = match &compiled {
            Ok(schema) => run_case(schema, case),
            Err(errors) => Err(anyhow::anyhow!("schema failed to compile:\n{errors}")),
        };
        tally.record(label, outcome);
    }
}

fn run_case(schema: &Schema, case: &Case) -> Result<()> {
    let input = match (&case.input, &case.query) {
        (Some(json), None) => Value::from(json),
        (None, Some(query)) => Value::Object(decode_query_string(query)?),
        _ => bail!("a case needs exactly one of `input` or `query`"),
    };

    match (schema.validate(&case.type_name, &input, case.mode.into()), &case.output, &case.error) {
        (Ok(value), Some(expected), None) => {
            let actual = serde_json::to_value(&*value)?;
            if &actual != expected {
                bail!("expected {expected}, got {actual}");
            }
            Ok(())
        }
        (Ok(value), None, None) => {
            // no output given: validation must return the input untouched
            if *value != input {
                bail!("expected input back unchanged, got {}", serde_json::to_value(&*value)?);
            }
            Ok(())
        }
        (Err(error), None, Some(expected)) => {
            if &error.to_string() != expected {
                bail!("expected error {expected:?}, got {:?}", error.to_string());
            }
            Ok(())
        }
        (Ok(value), _, Some(expected)) => {
            bail!("expected error {expected:?}, got {}", serde_json::to_value(&*value)?)
        }
        (Err(error), _, _) => bail!("unexpected error: {error}"),
    }
}
