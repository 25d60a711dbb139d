//! Content kinds and the repository layout conventions used to detect them.

use std::fmt;
use std::path::Path;

use crate::document::ContentDocument;

pub const PACKS_DIR: &str = "Packs";
pub const INTEGRATIONS_DIR: &str = "Integrations";
pub const SCRIPTS_DIR: &str = "Scripts";
pub const PLAYBOOKS_DIR: &str = "Playbooks";
pub const TEST_PLAYBOOKS_DIR: &str = "TestPlaybooks";
pub const INCIDENT_FIELDS_DIR: &str = "IncidentFields";
pub const INDICATOR_FIELDS_DIR: &str = "IndicatorFields";
pub const INCIDENT_TYPES_DIR: &str = "IncidentTypes";
pub const INDICATOR_TYPES_DIR: &str = "IndicatorTypes";
pub const CLASSIFIERS_DIR: &str = "Classifiers";
pub const LAYOUTS_DIR: &str = "Layouts";
pub const WIDGETS_DIR: &str = "Widgets";
pub const DASHBOARDS_DIR: &str = "Dashboards";
pub const REPORTS_DIR: &str = "Reports";
pub const CONNECTIONS_DIR: &str = "Connections";

/// Directories inside a pack that hold content entities.
pub const CONTENT_ENTITIES_DIRS: &[&str] = &[
    INTEGRATIONS_DIR,
    SCRIPTS_DIR,
    PLAYBOOKS_DIR,
    TEST_PLAYBOOKS_DIR,
    INCIDENT_FIELDS_DIR,
    INDICATOR_FIELDS_DIR,
    INCIDENT_TYPES_DIR,
    INDICATOR_TYPES_DIR,
    CLASSIFIERS_DIR,
    LAYOUTS_DIR,
    WIDGETS_DIR,
    DASHBOARDS_DIR,
    REPORTS_DIR,
    CONNECTIONS_DIR,
];

/// Entity directories whose entries are per-entity package folders.
pub const UNIFIED_ENTITIES_DIRS: &[&str] = &[INTEGRATIONS_DIR, SCRIPTS_DIR];

pub const README_FILE_NAME: &str = "README.md";
pub const PACK_METADATA_FILE_NAME: &str = "pack_metadata.json";

/// The type of a content artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Integration,
    Script,
    Playbook,
    TestPlaybook,
    IncidentField,
    IndicatorField,
    IncidentType,
    Classifier,
    OldClassifier,
    Mapper,
    Layout,
    LayoutsContainer,
    Widget,
    Dashboard,
    Readme,
    Image,
    PackMetadata,
}

impl ContentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integration => "Integration",
            Self::Script => "Script",
            Self::Playbook => "Playbook",
            Self::TestPlaybook => "TestPlaybook",
            Self::IncidentField => "IncidentField",
            Self::IndicatorField => "IndicatorField",
            Self::IncidentType => "IncidentType",
            Self::Classifier => "Classifier",
            Self::OldClassifier => "OldClassifier",
            Self::Mapper => "Mapper",
            Self::Layout => "Layout",
            Self::LayoutsContainer => "LayoutsContainer",
            Self::Widget => "Widget",
            Self::Dashboard => "Dashboard",
            Self::Readme => "Readme",
            Self::Image => "Image",
            Self::PackMetadata => "PackMetadata",
        }
    }

    /// Whether the remote server accepts this kind through an import endpoint.
    #[must_use]
    pub const fn is_uploadable(self) -> bool {
        !matches!(
            self,
            Self::IndicatorField | Self::Mapper | Self::Readme | Self::Image | Self::PackMetadata
        )
    }

    /// Whether artifacts of this kind may live in a package folder with
    /// separate code, image and description files.
    #[must_use]
    pub const fn is_unifiable(self) -> bool {
        matches!(self, Self::Integration | Self::Script)
    }

    /// Detect the kind of the artifact at `path`.
    ///
    /// `document` is the parsed file when it is JSON/YAML; it disambiguates
    /// kinds that share a directory (classifiers vs. mappers, layouts vs.
    /// layout containers) and files living outside the usual layout.
    #[must_use]
    pub fn detect(path: &Path, document: Option<&ContentDocument>) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        if file_name == README_FILE_NAME {
            return Some(Self::Readme);
        }
        if file_name == PACK_METADATA_FILE_NAME {
            return Some(Self::PackMetadata);
        }

        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let entity_dir = entity_dir_of(path);
        match extension.as_str() {
            "png" => Some(Self::Image),
            "yml" | "yaml" => detect_yaml(entity_dir, file_name, document),
            "json" => detect_json(entity_dir, file_name, document),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closest content-entity directory above `path`: the parent itself, or the
/// grandparent when the file sits inside an integration/script package folder.
fn entity_dir_of(path: &Path) -> Option<&'static str> {
    let parent = path.parent()?;
    let parent_name = parent.file_name().and_then(|n| n.to_str());
    if let Some(name) = parent_name
        && let Some(dir) = CONTENT_ENTITIES_DIRS.iter().find(|d| **d == name)
    {
        return Some(*dir);
    }

    let grandparent_name = parent.parent()?.file_name()?.to_str()?;
    UNIFIED_ENTITIES_DIRS
        .iter()
        .find(|d| **d == grandparent_name)
        .copied()
}

fn detect_yaml(
    entity_dir: Option<&str>,
    file_name: &str,
    document: Option<&ContentDocument>,
) -> Option<ContentKind> {
    let has = |key: &str| document.is_some_and(|d| d.contains_key(key));
    match entity_dir {
        Some(INTEGRATIONS_DIR) => return Some(ContentKind::Integration),
        Some(SCRIPTS_DIR) => return Some(ContentKind::Script),
        Some(PLAYBOOKS_DIR) => return Some(ContentKind::Playbook),
        Some(TEST_PLAYBOOKS_DIR) => {
            // Test scripts are stored next to test playbooks.
            return Some(if has("script") && !has("tasks") {
                ContentKind::Script
            } else {
                ContentKind::TestPlaybook
            });
        }
        _ => {}
    }

    let lower = file_name.to_ascii_lowercase();
    if lower.starts_with("integration-") || (has("category") && has("script")) {
        Some(ContentKind::Integration)
    } else if lower.starts_with("playbook-") || has("tasks") {
        Some(ContentKind::Playbook)
    } else if lower.starts_with("script-") || has("script") {
        Some(ContentKind::Script)
    } else {
        None
    }
}

fn detect_json(
    entity_dir: Option<&str>,
    file_name: &str,
    document: Option<&ContentDocument>,
) -> Option<ContentKind> {
    match entity_dir {
        Some(INCIDENT_FIELDS_DIR) => return Some(ContentKind::IncidentField),
        Some(INDICATOR_FIELDS_DIR) => return Some(ContentKind::IndicatorField),
        Some(INCIDENT_TYPES_DIR) => return Some(ContentKind::IncidentType),
        Some(CLASSIFIERS_DIR) => return Some(classifier_kind(document)),
        Some(LAYOUTS_DIR) => return Some(layout_kind(file_name, document)),
        Some(WIDGETS_DIR) => return Some(ContentKind::Widget),
        Some(DASHBOARDS_DIR) => return Some(ContentKind::Dashboard),
        _ => {}
    }

    let lower = file_name.to_ascii_lowercase();
    if lower.starts_with("incidentfield-") {
        Some(ContentKind::IncidentField)
    } else if lower.starts_with("indicatorfield-") {
        Some(ContentKind::IndicatorField)
    } else if lower.starts_with("incidenttype-") {
        Some(ContentKind::IncidentType)
    } else if lower.starts_with("classifier-") || lower.starts_with("mapper-") {
        Some(classifier_kind(document))
    } else if lower.starts_with("layout") {
        Some(layout_kind(file_name, document))
    } else if lower.starts_with("widget-") {
        Some(ContentKind::Widget)
    } else if lower.starts_with("dashboard-") {
        Some(ContentKind::Dashboard)
    } else {
        None
    }
}

fn classifier_kind(document: Option<&ContentDocument>) -> ContentKind {
    match document.and_then(|d| d.get_str("type")) {
        Some("classification") => ContentKind::Classifier,
        Some(t) if t.starts_with("mapping") => ContentKind::Mapper,
        _ => ContentKind::OldClassifier,
    }
}

fn layout_kind(file_name: &str, document: Option<&ContentDocument>) -> ContentKind {
    let is_container_name = file_name
        .to_ascii_lowercase()
        .starts_with("layoutscontainer");
    let is_container_shape =
        document.is_some_and(|d| d.contains_key("group") && !d.contains_key("layout"));
    if is_container_name || is_container_shape {
        ContentKind::LayoutsContainer
    } else {
        ContentKind::Layout
    }
}
