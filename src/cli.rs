//! CLI: compile schema sources, then check / validate / dump / refs.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;

use chisel::query::decode_query_string;
use chisel::refs::{action_referenced_types, referenced_types};
use chisel::{Mode, Schema, Type, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile schema-language sources and validate JSON or query-string inputs against them
#[derive(Parser, Debug)]
#[command(name = "chisel", version, about)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile the sources and report every error
    Check(CheckOut),
    /// validate inputs against one type
    Validate(ValidateOut),
    /// print the compiled schema as JSON
    Dump(DumpOut),
    /// list the user types a type or action depends on
    Refs(RefsOut),
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// One or more schema sources. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    spec: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// JSON inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1..)]
    input: Vec<String>,

    /// validate a literal query string instead of JSON files (implies `--mode query`)
    #[arg(long, conflicts_with_all = ["input", "jq_expr", "ndjson"])]
    query_string: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ModeArg {
    Immutable,
    Query,
    Json,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Immutable => Mode::Immutable,
            ModeArg::Query => Mode::QueryString,
            ModeArg::Json => Mode::JsonInput,
        }
    }
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,
}

#[derive(clap::Parser, Debug)]
struct ValidateOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// type to validate against (user type, builtin, or `<action>_input` style name)
    #[arg(long = "type", short = 't')]
    type_name: String,

    #[arg(long, value_enum, default_value_t = ModeArg::Json)]
    mode: ModeArg,

    /// print each normalized value to stdout
    #[arg(long)]
    emit: bool,
}

#[derive(clap::Parser, Debug)]
struct DumpOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct RefsOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// root user type
    #[arg(long = "type", short = 't', conflicts_with = "action", required_unless_present = "action")]
    type_name: Option<String>,

    /// root action
    #[arg(long)]
    action: Option<String>,
}

/// One value to validate and where it came from.
#[derive(Debug)]
struct Document {
    source: String,
    value: Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SchemaSettings {
    fn compile(&self) -> Result<Result<Schema, chisel::SpecErrors>> {
        let source_paths = resolve_file_path_patterns(&self.spec).context("failed to resolve schema paths")?;
        let mut parser = chisel::Parser::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read schema source ({source_path_str})"))?;
            parser.parse(&source, &source_path_str);
        }
        Ok(parser.finalize())
    }

    fn load(&self) -> Result<Schema> {
        match self.compile()? {
            Ok(schema) => Ok(schema),
            Err(errors) => {
                eprintln!("{}", errors.to_string().red());
                bail!("schema failed to compile ({} errors)", errors.len())
            }
        }
    }
}

impl InputSettings {
    fn load_documents(&self) -> Result<Vec<Document>> {
        if let Some(query) = self.query_string.as_ref() {
            let map = decode_query_string(query).context("failed to decode query string")?;
            return Ok(vec![Document { source: "<query-string>".to_string(), value: Value::Object(map) }]);
        }
        if self.input.is_empty() {
            bail!("no inputs: pass --input or --query-string");
        }

        let mut out = Vec::new();
        let source_paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;

            let mut json_values = Vec::new();
            if self.ndjson {
                for (ix, line) in source.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                    let json_value = serde_json::from_str::<serde_json::Value>(line)
                        .with_context(|| format!("failed to parse JSON ({source_path_str}:{})", ix + 1))?;
                    json_values.push((format!("{source_path_str}:{}", ix + 1), json_value));
                }
            } else {
                let json_value = serde_json::from_str::<serde_json::Value>(&source)
                    .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
                json_values.push((source_path_str.clone(), json_value));
            }

            for (label, json_value) in json_values {
                match self.jq_expr.as_ref() {
                    None => out.push(Document { source: label, value: Value::from(json_value) }),
                    Some(jq_expr) => {
                        let result = crate::jq_exec::run_jaq(jq_expr, &json_value)
                            .with_context(|| format!("failed to apply jq expression to ({label})"))?;
                        for (ix, json_value) in result.into_iter().enumerate() {
                            out.push(Document { source: format!("{label}#{ix}"), value: Value::from(json_value) });
                        }
                    }
                }
            }
        }
        tracing::info!(documents = out.len(), "loaded inputs");
        Ok(out)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// `Ok(false)` when inputs or sources were checked and found invalid.
    pub fn run(&self) -> Result<bool> {
        match &self.cmd {
            Command::Check(target) => match target.schema_settings.compile()? {
                Ok(schema) => {
                    println!(
                        "{} {} types, {} actions",
                        "✅".green(),
                        schema.types.len(),
                        schema.actions.len()
                    );
                    Ok(true)
                }
                Err(errors) => {
                    eprintln!("{}", errors.to_string().red());
                    eprintln!("{} {} errors", "❌".red(), errors.len());
                    Ok(false)
                }
            },
            Command::Validate(target) => {
                let schema = target.schema_settings.load()?;
                let mode = if target.input_settings.query_string.is_some() {
                    Mode::QueryString
                } else {
                    Mode::from(target.mode)
                };
                let documents = target.input_settings.load_documents()?;

                let results: Vec<_> = documents
                    .par_iter()
                    .map(|doc| (doc, schema.validate(&target.type_name, &doc.value, mode)))
                    .collect();

                let mut failures = 0;
                for (doc, result) in results {
                    match result {
                        Ok(value) => {
                            eprintln!("{} {}", "✅".green(), doc.source);
                            if target.emit {
                                println!("{}", serde_json::to_string(&*value)?);
                            }
                        }
                        Err(error) => {
                            failures += 1;
                            eprintln!("{} {}: {}", "❌".red(), doc.source, error.to_string().red());
                        }
                    }
                }
                Ok(failures == 0)
            }
            Command::Dump(target) => {
                let schema = target.schema_settings.load()?;
                let schema_src = serde_json::to_string_pretty(&schema)?;
                if let Some(out) = target.out.as_ref() {
                    if let Some(parent) = out.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(out, &schema_src).with_context(|| format!("failed to write {}", out.display()))?;
                } else {
                    println!("{schema_src}");
                }
                Ok(true)
            }
            Command::Refs(target) => {
                let schema = target.schema_settings.load()?;
                let refs = match (&target.type_name, &target.action) {
                    (Some(name), _) => {
                        if schema.get_type(name).is_none() {
                            bail!("unknown type '{name}'");
                        }
                        referenced_types(&schema.types, &Type::User(name.clone()))
                    }
                    (None, Some(name)) => {
                        let Some(action) = schema.action(name) else {
                            bail!("unknown action '{name}'");
                        };
                        action_referenced_types(&schema.types, action)
                    }
                    (None, None) => bail!("pass --type or --action"),
                };
                for (name, user_type) in refs {
                    let kind = match user_type {
                        chisel::UserType::Struct(st) if st.union => "union",
                        chisel::UserType::Struct(_) => "struct",
                        chisel::UserType::Enum(_) => "enum",
                        chisel::UserType::Typedef(_) => "typedef",
                    };
                    println!("{kind} {name}");
                }
                Ok(true)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
