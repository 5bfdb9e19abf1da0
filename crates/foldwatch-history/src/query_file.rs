use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::query::{QueryParameters, QueryValue, SELECT_ALL_NAME};

/// Saved queries persisted as JSON next to the history database.
///
/// The reserved select-all query is never stored; callers prepend it when
/// presenting choices.
pub struct QueryFile {
    path: PathBuf,
    queries: Vec<QueryParameters>,
}

impl QueryFile {
    /// Load saved queries, or start empty when the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let queries = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text).map_err(|err| Error::Query(err.to_string()))?
        } else {
            Vec::new()
        };

        let mut file = Self { path, queries };
        file.sort();
        Ok(file)
    }

    /// Saved queries, sorted by name.
    pub fn queries(&self) -> &[QueryParameters] {
        &self.queries
    }

    pub fn get(&self, name: &str) -> Option<&QueryParameters> {
        self.queries.iter().find(|q| q.name == name)
    }

    pub fn add(&mut self, query: QueryParameters) -> Result<()> {
        validate(&query)?;
        if self.get(&query.name).is_some() {
            return Err(Error::Query(format!(
                "a query named '{}' already exists",
                query.name
            )));
        }

        debug!(name = %query.name, fields = query.fields.len(), "saving query");
        self.queries.push(query);
        self.sort();
        self.save()
    }

    /// Replace the query named `name` wholesale; the replacement may rename it.
    pub fn replace(&mut self, name: &str, query: QueryParameters) -> Result<()> {
        validate(&query)?;
        let Some(index) = self.queries.iter().position(|q| q.name == name) else {
            return Err(Error::Query(format!("no query named '{name}'")));
        };
        if query.name != name && self.get(&query.name).is_some() {
            return Err(Error::Query(format!(
                "a query named '{}' already exists",
                query.name
            )));
        }

        self.queries[index] = query;
        self.sort();
        self.save()
    }

    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let before = self.queries.len();
        self.queries.retain(|q| q.name != name);
        if self.queries.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn sort(&mut self) {
        self.queries.sort_by(|a, b| a.name.cmp(&b.name));
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(&self.queries)
            .map_err(|err| Error::Query(err.to_string()))?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

fn validate(query: &QueryParameters) -> Result<()> {
    if query.name.trim().is_empty() {
        return Err(Error::Query("query name must not be empty".to_string()));
    }
    if query.name == SELECT_ALL_NAME {
        return Err(Error::Query(format!("'{SELECT_ALL_NAME}' is reserved")));
    }
    if query.fields.is_empty() {
        return Err(Error::Query(
            "a saved query needs at least one field".to_string(),
        ));
    }
    for field in &query.fields {
        if let QueryValue::Text(text) = &field.value {
            if text.is_empty() {
                return Err(Error::Query(format!(
                    "field '{}' has no value",
                    field.column.column_name()
                )));
            }
        }
    }
    Ok(())
}
