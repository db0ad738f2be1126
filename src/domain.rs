//! Read-only domain documentation inputs.
//!
//! `<docs>/<Domain>/` holds `DB_*.json` (schema), optionally `API_*.json`
//! (interface document with a `paths` map), and one `*.txt` semantic
//! description. `<docs>/combined_db.json` is the schema of every domain
//! together and grounds SQL cases that join across domains.
use crate::error::CaseError;
use crate::store::TargetKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const COMBINED_SCHEMA_FILE: &str = "combined_db.json";
const HTTP_VERBS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

/// Schema document: tables -> columns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub format: String,
}

impl SchemaDocument {
    /// Markdown outline of every table and its columns, with formats and
    /// descriptions where the schema gives them.
    pub fn outline(&self) -> String {
        let mut lines = Vec::new();
        for table in &self.tables {
            lines.push(format!("- {}{}", table.name, described(&table.description)));
            for column in &table.columns {
                let format = if column.format.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", column.format)
                };
                lines.push(format!(
                    "  - {}{format}{}",
                    column.name,
                    described(&column.description)
                ));
            }
        }
        lines.join("\n")
    }
}

fn described(description: &str) -> String {
    let description = description.trim();
    if description.is_empty() {
        String::new()
    } else {
        format!(": {description}")
    }
}

/// One named operation of an interface document.
#[derive(Debug, Clone)]
pub struct Operation {
    pub path: String,
    /// Upper-case HTTP verb.
    pub method: String,
    /// The operation's own fragment of the interface document.
    pub fragment: Value,
}

impl Operation {
    /// Group slug used in artifact names, e.g. `/Accounts/Transfer` + POST ->
    /// `Accounts_Transfer_POST`.
    pub fn group(&self) -> String {
        let slug = self.path.replace('/', "_");
        let slug = slug.trim_matches('_');
        let slug = if slug.is_empty() { "root" } else { slug };
        format!("{slug}_{}", self.method)
    }
}

/// Interface document and where it lives, so it can be attached to a prompt.
#[derive(Debug, Clone)]
pub struct InterfaceDocument {
    pub path: PathBuf,
    pub raw: Value,
}

impl InterfaceDocument {
    /// Operations grouped by verb, in path order. GET is skipped unless asked for.
    pub fn operations(&self, include_get: bool) -> Vec<Operation> {
        let Some(paths) = self.raw.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut operations = Vec::new();
        for (path, methods) in paths {
            let Some(methods) = methods.as_object() else {
                continue;
            };
            for (method, fragment) in methods {
                let verb = method.to_ascii_lowercase();
                if !HTTP_VERBS.contains(&verb.as_str()) {
                    continue;
                }
                if verb == "get" && !include_get {
                    continue;
                }
                operations.push(Operation {
                    path: path.clone(),
                    method: verb.to_ascii_uppercase(),
                    fragment: fragment.clone(),
                });
            }
        }
        operations
    }
}

/// Everything the pipeline reads about one business domain.
#[derive(Debug, Clone)]
pub struct Domain {
    pub name: String,
    pub schema_text: String,
    pub schema: SchemaDocument,
    pub description: String,
    pub interface: Option<InterfaceDocument>,
}

/// Documentation root holding one directory per domain.
#[derive(Debug, Clone)]
pub struct DocsRoot {
    root: PathBuf,
}

impl DocsRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Domain directory names, sorted.
    pub fn domains(&self) -> Result<Vec<String>> {
        let mut domains = Vec::new();
        for entry in
            fs::read_dir(&self.root).with_context(|| format!("read {}", self.root.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            domains.push(name);
        }
        domains.sort();
        Ok(domains)
    }

    /// The combined schema of all domains, when one has been produced.
    pub fn combined_schema(&self) -> Result<Option<String>> {
        let path = self.root.join(COMBINED_SCHEMA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(text))
    }

    /// Load a domain with the documents `kind` requires.
    ///
    /// API cases need schema, interface, and description; SQL cases need
    /// schema and description. A missing document is a `MissingDocumentation`.
    pub fn load(&self, name: &str, kind: TargetKind) -> Result<Domain> {
        let dir = self.root.join(name);
        let files = sorted_files(&dir)?;
        let missing = |what: &'static str| CaseError::MissingDocumentation {
            domain: name.to_string(),
            what,
            dir: dir.clone(),
        };

        let schema_path = find_file(&files, |file| {
            file.starts_with("DB_") && file.ends_with(".json")
        })
        .ok_or_else(|| missing("a DB_*.json schema"))?;
        let description_path =
            find_file(&files, |file| file.ends_with(".txt")).ok_or_else(|| missing("a *.txt description"))?;
        let interface_path = find_file(&files, |file| {
            file.starts_with("API_") && file.ends_with(".json")
        });
        if kind == TargetKind::Api && interface_path.is_none() {
            return Err(missing("an API_*.json interface document").into());
        }

        let schema_path = dir.join(schema_path);
        let schema_text = fs::read_to_string(&schema_path)
            .with_context(|| format!("read {}", schema_path.display()))?;
        let schema: SchemaDocument = serde_json::from_str(&schema_text)
            .with_context(|| format!("parse schema {}", schema_path.display()))?;
        let description_path = dir.join(description_path);
        let description = fs::read_to_string(&description_path)
            .with_context(|| format!("read {}", description_path.display()))?;

        let interface = match interface_path {
            Some(file) if kind == TargetKind::Api => {
                let path = dir.join(file);
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                let raw: Value = serde_json::from_str(&text)
                    .with_context(|| format!("parse interface {}", path.display()))?;
                Some(InterfaceDocument { path, raw })
            }
            _ => None,
        };

        Ok(Domain {
            name: name.to_string(),
            schema_text,
            schema,
            description,
            interface,
        })
    }
}

fn sorted_files(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        if entry.path().is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

fn find_file<'a>(files: &'a [String], pred: impl Fn(&str) -> bool) -> Option<&'a str> {
    files.iter().map(String::as_str).find(|file| pred(file))
}
