//! JSON export of the action catalog for UIs and docs.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::types::Action;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct CatalogExport<'a> {
    pub generated_at: DateTime<Utc>,
    pub action_count: usize,
    pub actions: Vec<&'a Action>,
}

impl<'a> CatalogExport<'a> {
    pub fn new(catalog: &'a Catalog, generated_at: DateTime<Utc>) -> Self {
        let actions = catalog.list();
        Self {
            generated_at,
            action_count: actions.len(),
            actions,
        }
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        if pretty {
            let mut out = serde_json::to_string_pretty(self)?;
            out.push('\n');
            Ok(out)
        } else {
            Ok(serde_json::to_string(self)?)
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let data = self.to_json(true)?;
        crate::io::atomic_write(path, data.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommandSpec;
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Action::new("zz", "Z", "d", "c", vec![CommandSpec::new(["true"])]),
            Action::new(
                "aa",
                "A",
                "d",
                "c",
                vec![CommandSpec::new(["make"]).in_dir("/x").with_env("K", "V")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn export_is_sorted_and_normalised() {
        let catalog = catalog();
        let export = CatalogExport::new(&catalog, Utc::now());
        let v: serde_json::Value = serde_json::from_str(&export.to_json(false).unwrap()).unwrap();
        assert_eq!(v["action_count"], 2);
        assert_eq!(v["actions"][0]["slug"], "aa");
        assert_eq!(v["actions"][0]["commands"][0]["cwd"], "/x");
        assert_eq!(v["actions"][0]["commands"][0]["env"]["K"], "V");
        // Absent cwd/env are omitted rather than null.
        let zz = &v["actions"][1]["commands"][0];
        assert!(zz.get("cwd").is_none());
        assert!(zz.get("env").is_none());
        assert!(v["actions"][1].get("notes").is_none());
    }

    #[test]
    fn write_to_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ui/src/actions.json");
        let catalog = catalog();
        CatalogExport::new(&catalog, Utc::now()).write_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\"generated_at\""));
    }
}
