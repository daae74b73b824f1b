//! Vocabulary of the digital thread: entity kinds, relationship kinds, and the
//! link record itself.

use crate::core::error::ThreadError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence assigned to caller-asserted links.
pub const CONFIDENCE_EXPLICIT: f64 = 1.0;
/// Confidence assigned to links inferred from naming conventions.
pub const CONFIDENCE_NAME_MATCH: f64 = 0.7;
/// Confidence assigned to links inferred from control keywords.
pub const CONFIDENCE_KEYWORD_MATCH: f64 = 0.6;

pub const EVIDENCE_NAME_MATCH: &str = "auto_linked_by_name_match";
pub const EVIDENCE_KEYWORD_MATCH: &str = "auto_linked_by_keyword_match";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    DoorsRequirement,
    SysmlElement,
    CodeModule,
    TestFile,
    NistControl,
    StigRule,
    ComplianceArtifact,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::DoorsRequirement,
        EntityType::SysmlElement,
        EntityType::CodeModule,
        EntityType::TestFile,
        EntityType::NistControl,
        EntityType::StigRule,
        EntityType::ComplianceArtifact,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::DoorsRequirement => "doors_requirement",
            EntityType::SysmlElement => "sysml_element",
            EntityType::CodeModule => "code_module",
            EntityType::TestFile => "test_file",
            EntityType::NistControl => "nist_control",
            EntityType::StigRule => "stig_rule",
            EntityType::ComplianceArtifact => "compliance_artifact",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ThreadError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                ThreadError::Validation(format!(
                    "Invalid entity type '{}'. Must be one of: {}",
                    s,
                    Self::ALL.map(|t| t.as_str()).join(", ")
                ))
            })
    }

    /// External table and label column backing this type, if any.
    pub fn lookup_table(self) -> Option<(&'static str, &'static str)> {
        use crate::core::schemas;
        match self {
            EntityType::DoorsRequirement => Some((schemas::DOORS_REQUIREMENTS_TABLE, "title")),
            EntityType::SysmlElement => Some((schemas::SYSML_ELEMENTS_TABLE, "name")),
            EntityType::NistControl => Some((schemas::COMPLIANCE_CONTROLS_TABLE, "title")),
            EntityType::StigRule => Some((schemas::STIG_RULES_TABLE, "title")),
            EntityType::CodeModule | EntityType::TestFile | EntityType::ComplianceArtifact => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Satisfies,
    DerivesFrom,
    Implements,
    Verifies,
    TracesTo,
    Allocates,
    Refines,
    MapsTo,
}

impl LinkType {
    pub const ALL: [LinkType; 8] = [
        LinkType::Satisfies,
        LinkType::DerivesFrom,
        LinkType::Implements,
        LinkType::Verifies,
        LinkType::TracesTo,
        LinkType::Allocates,
        LinkType::Refines,
        LinkType::MapsTo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Satisfies => "satisfies",
            LinkType::DerivesFrom => "derives_from",
            LinkType::Implements => "implements",
            LinkType::Verifies => "verifies",
            LinkType::TracesTo => "traces_to",
            LinkType::Allocates => "allocates",
            LinkType::Refines => "refines",
            LinkType::MapsTo => "maps_to",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ThreadError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                ThreadError::Validation(format!(
                    "Invalid link type '{}'. Must be one of: {}",
                    s,
                    Self::ALL.map(|t| t.as_str()).join(", ")
                ))
            })
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn validate_confidence(confidence: f64) -> Result<(), ThreadError> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ThreadError::Validation(format!(
            "Invalid confidence {}. Must be within [0.0, 1.0]",
            confidence
        )));
    }
    Ok(())
}

/// One end of a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.as_str().to_string(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// A persisted link row.
///
/// Type fields are kept as stored strings: rows written around the link store
/// may carry values outside the enumerations, which integrity validation reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub project_id: String,
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    pub link_type: String,
    pub confidence: f64,
    pub evidence: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

impl Link {
    pub fn source(&self) -> EntityRef {
        EntityRef {
            entity_type: self.source_type.clone(),
            entity_id: self.source_id.clone(),
        }
    }

    pub fn target(&self) -> EntityRef {
        EntityRef {
            entity_type: self.target_type.clone(),
            entity_id: self.target_id.clone(),
        }
    }
}

/// Caller input for `create_link`. Types are unvalidated strings until the store checks them.
#[derive(Debug, Clone)]
pub struct NewLink<'a> {
    pub project_id: &'a str,
    pub source_type: &'a str,
    pub source_id: &'a str,
    pub target_type: &'a str,
    pub target_id: &'a str,
    pub link_type: &'a str,
    pub evidence: Option<&'a str>,
    pub confidence: f64,
    pub actor: &'a str,
}

impl<'a> NewLink<'a> {
    /// An explicit (confidence 1.0) link with no evidence.
    pub fn explicit(
        project_id: &'a str,
        source: (EntityType, &'a str),
        target: (EntityType, &'a str),
        link_type: LinkType,
        actor: &'a str,
    ) -> Self {
        Self {
            project_id,
            source_type: source.0.as_str(),
            source_id: source.1,
            target_type: target.0.as_str(),
            target_id: target.1,
            link_type: link_type.as_str(),
            evidence: None,
            confidence: CONFIDENCE_EXPLICIT,
            actor,
        }
    }
}

/// Rounded percentage, `0.0` when the denominator is zero.
pub fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let pct = numerator as f64 / denominator as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
