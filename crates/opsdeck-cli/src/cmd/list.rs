use crate::output::{print_json, print_table};
use chrono::Utc;
use opsdeck_core::export::CatalogExport;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, catalog) = super::load_catalog(root)?;

    if json {
        return print_json(&CatalogExport::new(&catalog, Utc::now()));
    }

    let mut rows = Vec::with_capacity(catalog.len());
    for (category, actions) in catalog.grouped() {
        for action in actions {
            rows.push(vec![
                category.to_string(),
                action.slug.clone(),
                action.title.clone(),
                action.commands.len().to_string(),
            ]);
        }
    }
    print_table(&["CATEGORY", "SLUG", "TITLE", "STEPS"], rows);
    Ok(())
}
