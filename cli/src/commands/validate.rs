// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `agent-graph validate`

use agent_graph_core::domain::graph::NodeKind;
use agent_graph_core::infrastructure::manifest_parser::{GraphManifest, ManifestParser};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

/// Parse a manifest file, attaching the path to any error
pub fn load(path: &Path) -> Result<GraphManifest> {
    ManifestParser::parse_file(path)
        .with_context(|| format!("Failed to load manifest {}", path.display()))
}

pub fn execute(path: &Path) -> Result<()> {
    println!("Validating {}...", path.display());
    let manifest = load(path)?;

    let agents = manifest
        .graph
        .nodes()
        .filter(|node| matches!(node.kind, NodeKind::Agent { .. }))
        .count();
    println!(
        "{} {} ({} nodes, {} agents, {} edges, entry '{}')",
        "✓".green(),
        manifest.name.bold(),
        manifest.graph.len(),
        agents,
        manifest.graph.edges().len(),
        manifest.entry
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
apiVersion: agent-graph/v1
kind: AgentGraph
metadata:
  name: solo
spec:
  agents:
    - id: orchestrator
"#;

    #[test]
    fn test_load_reports_path_on_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"apiVersion: agent-graph/v1\nkind: Workflow\n").unwrap();

        let err = load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_validate_minimal_manifest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        execute(file.path()).unwrap();
        assert_eq!(load(file.path()).unwrap().entry.as_str(), "orchestrator");
    }
}
