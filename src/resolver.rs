// src/resolver.rs
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// `loadChildren` の指定子から、実際の routing ファイル (.ts) の候補を探す
///
/// - `load_children`: 抽出済みの指定子 (例: "./feature/feature.module" や
///   旧形式の "./feature/feature.module#FeatureModule")
/// - `parent_file`: その指定子を持つ親ファイルのパス
///
/// 存在する候補を優先度順の絶対パスで返す。パッケージ名など相対でない指定子は空。
pub fn resolve_load_children_paths(load_children: &str, parent_file: &Path) -> Result<Vec<PathBuf>> {
    let specifier = load_children.split('#').next().unwrap_or_default();
    if !specifier.starts_with("./") && !specifier.starts_with("../") {
        tracing::debug!(specifier, "non-relative loadChildren skipped");
        return Ok(Vec::new());
    }

    let parent_dir = parent_file.parent().unwrap_or_else(|| Path::new("."));
    let mut found = Vec::new();
    for candidate in candidate_paths(&parent_dir.join(specifier)) {
        let abs = candidate.absolutize()?.to_path_buf();
        if abs.is_file() && !found.contains(&abs) {
            found.push(abs);
        }
    }
    tracing::debug!(specifier, candidates = found.len(), "loadChildren resolved");
    Ok(found)
}

/// 典型的なファイル名パターン (routing モジュールを最優先)
fn candidate_paths(base: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // feature.module → feature-routing.module.ts
    if let Some(stem) = base.file_stem() {
        candidates.push(base.with_file_name(format!("{}-routing.module.ts", stem.to_string_lossy())));
    }

    // feature.module → feature.module.ts / admin.routes → admin.routes.ts
    let mut with_ts = base.as_os_str().to_owned();
    with_ts.push(".ts");
    candidates.push(PathBuf::from(with_ts));

    // ディレクトリを指している場合
    if let Some(name) = base.file_name() {
        let name = name.to_string_lossy();
        candidates.push(base.join(format!("{name}-routing.module.ts")));
        candidates.push(base.join(format!("{name}.routes.ts")));
    }
    candidates.push(base.join("index.ts"));

    candidates
}
