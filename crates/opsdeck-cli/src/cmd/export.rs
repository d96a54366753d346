use anyhow::Context;
use chrono::Utc;
use opsdeck_core::export::CatalogExport;
use std::path::Path;

pub fn run(root: &Path, out: Option<&Path>, pretty: bool) -> anyhow::Result<()> {
    let (_, catalog) = super::load_catalog(root)?;
    let export = CatalogExport::new(&catalog, Utc::now());

    match out {
        Some(path) => {
            export
                .write_to(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Exported {} actions to {}", export.action_count, path.display());
        }
        None => {
            let json = export.to_json(pretty)?;
            println!("{}", json.trim_end());
        }
    }
    Ok(())
}
