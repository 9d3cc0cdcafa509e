//! Rendering of the build instructions and the package manifest.

use serde_json::json;

use super::LayerRecipe;
use crate::domain::{ProvisionError, Result};

/// Directory inside the build workspace that becomes the layer root.
const LAYER_ROOT: &str = "layer";

/// Build instructions for the remote build project.
///
/// Installs the pinned module, refuses to continue when the curated data
/// files exceed the recipe's budget, copies only the runtime subset into
/// `layer/nodejs/node_modules/<module>` and zips that tree into the declared
/// output file.
pub fn render_buildspec(recipe: &LayerRecipe) -> String {
    let module_dir = format!("node_modules/{}", recipe.module_name);
    let layer_module_dir = format!("{LAYER_ROOT}/nodejs/node_modules/{}", recipe.module_name);
    let data_paths = recipe
        .data_files
        .iter()
        .map(|file| format!("\"$MODULE_DIR/{}/{}\"", recipe.data_dir, file))
        .collect::<Vec<_>>()
        .join(" ");
    let budget = recipe.data_budget_bytes;

    let mut out = String::new();
    out.push_str("version: 0.2\n\n");
    out.push_str("phases:\n");
    out.push_str("  install:\n");
    out.push_str("    runtime-versions:\n");
    out.push_str(&format!("      nodejs: {}\n", recipe.node_major));
    out.push_str("  build:\n");
    out.push_str("    commands:\n");
    out.push_str("      - npm install --omit=dev --no-audit --no-fund\n");
    out.push_str(&format!("      - MODULE_DIR={module_dir}\n"));
    out.push_str(&format!("      - LAYER_MODULE_DIR={layer_module_dir}\n"));
    out.push_str(&format!("      - DATA_BYTES=$(cat {data_paths} | wc -c)\n"));
    out.push_str(&format!(
        "      - echo \"{} data files total ${{DATA_BYTES}} bytes, budget {budget}\"\n",
        recipe.module_name
    ));
    out.push_str(&format!(
        "      - if [ \"$DATA_BYTES\" -gt {budget} ]; then echo \"{} data files exceed the {budget} byte budget\" >&2; exit 1; fi\n",
        recipe.module_name
    ));
    out.push_str(&format!(
        "      - mkdir -p \"$LAYER_MODULE_DIR/{}\"\n",
        recipe.data_dir
    ));
    for path in &recipe.library_paths {
        if let Some((parent, _)) = path.rsplit_once('/') {
            out.push_str(&format!("      - mkdir -p \"$LAYER_MODULE_DIR/{parent}\"\n"));
        }
        out.push_str(&format!(
            "      - cp -R \"$MODULE_DIR/{path}\" \"$LAYER_MODULE_DIR/{path}\"\n"
        ));
    }
    for file in &recipe.data_files {
        out.push_str(&format!(
            "      - cp \"$MODULE_DIR/{dir}/{file}\" \"$LAYER_MODULE_DIR/{dir}/{file}\"\n",
            dir = recipe.data_dir
        ));
    }
    out.push_str(&format!(
        "      - cd {LAYER_ROOT} && zip -qr ../{} nodejs\n",
        recipe.output_file
    ));
    out.push_str("\nartifacts:\n");
    out.push_str("  files:\n");
    out.push_str(&format!("    - {}\n", recipe.output_file));
    out
}

/// `package.json` pinning the module at its exact version.
pub fn render_manifest(recipe: &LayerRecipe) -> Result<String> {
    let mut dependencies = serde_json::Map::new();
    dependencies.insert(
        recipe.module_name.clone(),
        json!(recipe.module_version),
    );
    let manifest = json!({
        "name": format!("{}-layer-build", recipe.module_name),
        "version": "1.0.0",
        "private": true,
        "description": format!("Builds the {} runtime layer", recipe.module_name),
        "dependencies": dependencies,
    });
    let mut rendered = serde_json::to_string_pretty(&manifest)
        .map_err(|e| ProvisionError::Packaging(format!("rendering package.json: {e}")))?;
    rendered.push('\n');
    Ok(rendered)
}
