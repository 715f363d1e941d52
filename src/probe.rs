//! Read-only inspection of which stages each item has completed.
//!
//! Work items are discovered from the text-stage directory; every downstream
//! stage is judged by existence of its expected artifact only. The probe never
//! writes, so calling it repeatedly on an unchanged tree gives the same answer.
use crate::identity::ItemIdentity;
use crate::layout::{naming, PipelineLayout};
use crate::stage::{StageKind, StageStatus};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Status of one stage for one item, with the path that was checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageProbe {
    pub stage: StageKind,
    pub status: StageStatus,
    pub path: PathBuf,
}

/// Per-stage view of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemProbe {
    pub identity: ItemIdentity,
    pub stages: Vec<StageProbe>,
}

impl ItemProbe {
    pub fn status(&self, stage: StageKind) -> StageStatus {
        self.stages
            .iter()
            .find(|probe| probe.stage == stage)
            .map(|probe| probe.status)
            .unwrap_or(StageStatus::Missing)
    }

    /// First stage in pipeline order whose artifact is missing.
    pub fn first_missing(&self) -> Option<StageKind> {
        StageKind::ALL
            .into_iter()
            .find(|stage| !self.status(*stage).is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }
}

/// Probe results for every item found in the text-stage directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub items: BTreeMap<ItemIdentity, ItemProbe>,
}

impl ProbeReport {
    /// Items that still have at least one missing stage, in identity order.
    pub fn unprocessed(&self) -> Vec<&ItemProbe> {
        self.items
            .values()
            .filter(|item| !item.is_complete())
            .collect()
    }

    pub fn complete_count(&self) -> usize {
        self.items.values().filter(|item| item.is_complete()).count()
    }
}

/// Probe the stage artifacts of one item.
pub fn probe_item(layout: &PipelineLayout, identity: &ItemIdentity) -> ItemProbe {
    let stages = StageKind::ALL
        .into_iter()
        .map(|stage| {
            let path = layout.artifact_path(stage, identity);
            let status = if path.is_file() {
                StageStatus::Complete
            } else {
                StageStatus::Missing
            };
            StageProbe {
                stage,
                status,
                path,
            }
        })
        .collect();
    ItemProbe {
        identity: identity.clone(),
        stages,
    }
}

/// Probe every item discoverable from the text-stage directory.
pub fn probe_all(layout: &PipelineLayout) -> Result<ProbeReport> {
    let mut report = ProbeReport::default();
    for identity in discover_identities(layout)? {
        let probe = probe_item(layout, &identity);
        report.items.insert(identity, probe);
    }
    Ok(report)
}

/// List identities that have a text artifact; a missing directory yields none.
pub fn discover_identities(layout: &PipelineLayout) -> Result<Vec<ItemIdentity>> {
    let dir = layout.text_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read {}", dir.display())),
    };
    let text_naming = naming(StageKind::TextGenerated);
    let mut identities = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        if !entry.path().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if let Some(identity) = text_naming.identity_of(&name) {
            identities.push(identity);
        }
    }
    identities.sort();
    identities.dedup();
    Ok(identities)
}
