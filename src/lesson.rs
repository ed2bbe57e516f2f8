//! Lesson model – the logical source of an export.
//!
//! A lesson always has the same five sections in the same order. They are
//! stored as named fields so the order cannot drift; [`LessonDocument::sections`]
//! yields them in render order.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The five fixed lesson sections, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Introduction,
    Anatomy,
    Technique,
    Risks,
    Aftercare,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::Introduction,
        SectionKind::Anatomy,
        SectionKind::Technique,
        SectionKind::Risks,
        SectionKind::Aftercare,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Introduction => "introduction",
            SectionKind::Anatomy => "anatomy",
            SectionKind::Technique => "technique",
            SectionKind::Risks => "risks",
            SectionKind::Aftercare => "aftercare",
        }
    }
}

/// Reference to an illustration: a base64 `data:` URI or a file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn new(src: impl Into<String>) -> Self {
        Self(src.into())
    }

    pub fn is_data_uri(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Resolve the reference to raw encoded image bytes.
    pub fn load_bytes(&self) -> Result<Vec<u8>> {
        if self.is_data_uri() {
            parse_data_uri(&self.0)
        } else {
            fs::read(&self.0).map_err(|e| Error::Image(format!("{}: {e}", self.0)))
        }
    }

    /// Short, log-friendly form of the reference.
    pub fn describe(&self) -> String {
        if self.is_data_uri() {
            let header: String = self.0.chars().take_while(|c| *c != ',').take(40).collect();
            format!("{header}…")
        } else {
            self.0.clone()
        }
    }
}

/// One titled section of a lesson.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonSection {
    pub heading: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illustration: Option<ImageRef>,
}

/// A complete lesson as produced by the surrounding application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonDocument {
    pub title: String,
    #[serde(default)]
    pub introduction: LessonSection,
    #[serde(default)]
    pub anatomy: LessonSection,
    #[serde(default)]
    pub technique: LessonSection,
    #[serde(default)]
    pub risks: LessonSection,
    #[serde(default)]
    pub aftercare: LessonSection,
}

impl LessonDocument {
    /// Sections in their fixed render order.
    pub fn sections(&self) -> [(SectionKind, &LessonSection); 5] {
        [
            (SectionKind::Introduction, &self.introduction),
            (SectionKind::Anatomy, &self.anatomy),
            (SectionKind::Technique, &self.technique),
            (SectionKind::Risks, &self.risks),
            (SectionKind::Aftercare, &self.aftercare),
        ]
    }

    pub fn section(&self, kind: SectionKind) -> &LessonSection {
        match kind {
            SectionKind::Introduction => &self.introduction,
            SectionKind::Anatomy => &self.anatomy,
            SectionKind::Technique => &self.technique,
            SectionKind::Risks => &self.risks,
            SectionKind::Aftercare => &self.aftercare,
        }
    }

    pub fn section_mut(&mut self, kind: SectionKind) -> &mut LessonSection {
        match kind {
            SectionKind::Introduction => &mut self.introduction,
            SectionKind::Anatomy => &mut self.anatomy,
            SectionKind::Technique => &mut self.technique,
            SectionKind::Risks => &mut self.risks,
            SectionKind::Aftercare => &mut self.aftercare,
        }
    }

    /// Number of sections carrying an illustration (at most five).
    pub fn illustration_count(&self) -> usize {
        self.sections()
            .iter()
            .filter(|(_, s)| s.illustration.is_some())
            .count()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| Error::Lesson(format!("cannot read '{}': {e}", path.display())))?;
        Self::from_json(&json)
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the decoded bytes.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| Error::Image("not a data URI".to_string()))?;
    let comma_pos = rest.find(',').ok_or_else(|| {
        Error::Image("invalid data URI: missing `,` between header and data".to_string())
    })?;
    let header = &rest[..comma_pos];
    if !header.contains(";base64") {
        return Err(Error::Image(
            "only base64-encoded data URIs are supported".to_string(),
        ));
    }
    BASE64_STD
        .decode(rest[comma_pos + 1..].trim())
        .map_err(|e| Error::Image(format!("base64 decode error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_follow_fixed_order() {
        let mut lesson = LessonDocument::default();
        lesson.aftercare.heading = "Njega".into();
        lesson.introduction.heading = "Uvod".into();
        let kinds: Vec<_> = lesson.sections().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, SectionKind::ALL.to_vec());
        assert_eq!(lesson.sections()[0].1.heading, "Uvod");
        assert_eq!(lesson.sections()[4].1.heading, "Njega");
    }

    #[test]
    fn parses_json_with_missing_sections() {
        let json = r#"{
            "title": "Srce",
            "introduction": { "heading": "Uvod", "body": "Tekst" },
            "risks": { "heading": "Rizici", "body": "...", "illustration": "data:image/png;base64,AAAA" }
        }"#;
        let lesson = LessonDocument::from_json(json).unwrap();
        assert_eq!(lesson.title, "Srce");
        assert!(lesson.anatomy.heading.is_empty());
        assert_eq!(lesson.illustration_count(), 1);
        assert!(lesson.risks.illustration.as_ref().unwrap().is_data_uri());
    }

    #[test]
    fn invalid_json_is_a_lesson_error() {
        let err = LessonDocument::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Lesson(_)));
    }

    #[test]
    fn data_uri_decoding() {
        assert_eq!(parse_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert!(parse_data_uri("data:text/plain,hi").is_err());
        assert!(parse_data_uri("photo.png").is_err());
    }
}
