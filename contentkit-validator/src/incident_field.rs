//! Incident field rules and backward-compatibility checks.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use contentkit::{ContentDocument, ContentVersion};
use regex::Regex;
use serde_json::Value;

use crate::error::{Findings, ValidationError};

/// Allowed `cliName` form.
pub const CLINAME_PATTERN: &str = "^[0-9a-z]+$";

static CLINAME_RE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(CLINAME_PATTERN) {
    Ok(re) => re,
    Err(e) => panic!("Invalid cliName regex: {e}"),
});

/// Lowest `fromVersion` accepted on a new incident field.
pub const MIN_FROM_VERSION: ContentVersion = ContentVersion::new(5, 0, 0);

/// Words that are synonyms of "incident" and may not appear in a field name.
const BAD_NAME_WORDS: &[&str] = &[
    "incident",
    "case",
    "alert",
    "event",
    "playbook",
    "ticket",
    "issue",
    "incidents",
    "cases",
    "alerts",
    "events",
    "playbooks",
    "tickets",
    "issues",
];

/// Published fields that predate the naming rule.
const WHITELISTED_NAMES: &[&str] = &[
    "XDR Alert Count",
    "XDR High Severity Alert Count",
    "XDR Medium Severity Alert Count",
    "XDR Low Severity Alert Count",
    "XDR Incident ID",
    "Detection Ticketed",
    "Claroty Alert Resolved",
    "Claroty Alert Type",
    "Code42 Alert Type",
    "Code42 File Events",
    "XDR Alerts",
    "Indeni Issue ID",
];

/// Values accepted in an incident field's `type`.
pub const FIELD_TYPES: &[&str] = &[
    "shortText",
    "longText",
    "boolean",
    "singleSelect",
    "multiSelect",
    "date",
    "user",
    "role",
    "number",
    "attachments",
    "tagsSelect",
    "internal",
    "url",
    "markdown",
    "grid",
    "timer",
    "html",
];

const INCIDENT_RESERVED: &[&str] = &[
    "id",
    "shardid",
    "modified",
    "autime",
    "account",
    "type",
    "rawtype",
    "phase",
    "rawphase",
    "name",
    "rawname",
    "status",
    "reason",
    "created",
    "parent",
    "occurred",
    "duedate",
    "reminder",
    "closed",
    "sla",
    "level",
    "investigationid",
    "details",
    "openduration",
    "droppedcount",
    "linkedcount",
    "closinguserId",
    "activatinguserId",
    "owner",
    "roles",
    "previousroles",
    "hasrole",
    "dbotcreatedBy",
    "activated",
    "closereason",
    "rawClosereason",
    "playbookid",
    "isplayground",
    "category",
    "rawcategory",
    "runstatus",
    "rawjson",
    "sourcebrand",
    "sourceinstance",
    "Lastopen",
    "canvases",
    "notifytime",
    "todotaskids",
    "scheduled",
    "labels",
];

const EVIDENCE_RESERVED: &[&str] = &[
    "id",
    "shardid",
    "modified",
    "incidentid",
    "entryid",
    "description",
    "tags",
    "tagsraw",
    "occurred",
    "markeddate",
    "fetched",
    "taskid",
    "markedby",
    "roles",
    "previousroles",
    "hasrole",
    "dbotcreatedBy",
];

const INDICATOR_RESERVED: &[&str] = &[
    "id",
    "modified",
    "type",
    "rawname",
    "name",
    "createdtime",
    "investigationids",
    "investigationscount",
    "isioc",
    "score",
    "lastseen",
    "lastreputationRun",
    "firstseen",
    "calculatedtime",
    "source",
    "rawsource",
    "manualscore",
    "setby",
    "manualsetTime",
    "comment",
    "modifiedtime",
    "sourceinstances",
    "sourcebrands",
    "context",
    "expiration",
    "expirationstatus",
    "manuallyeditedfields",
    "moduletofeedmap",
    "isshared",
];

/// The `group` an incident field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    Incident,
    Evidence,
    Indicator,
}

impl FieldGroup {
    /// Group for a `group` value; only the integers 0, 1 and 2 are groups.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_i64()? {
            0 => Some(Self::Incident),
            1 => Some(Self::Evidence),
            2 => Some(Self::Indicator),
            _ => None,
        }
    }

    /// Built-in keys of the group's index that a `cliName` may not shadow.
    #[must_use]
    pub const fn reserved_cli_names(self) -> &'static [&'static str] {
        match self {
            Self::Incident => INCIDENT_RESERVED,
            Self::Evidence => EVIDENCE_RESERVED,
            Self::Indicator => INDICATOR_RESERVED,
        }
    }
}

/// Validates one incident field JSON, optionally against its previous version.
#[derive(Debug)]
pub struct IncidentFieldValidator {
    current: ContentDocument,
    previous: Option<ContentDocument>,
    findings: Findings,
}

impl IncidentFieldValidator {
    #[must_use]
    pub fn new(
        file_path: impl Into<PathBuf>,
        current: ContentDocument,
        previous: Option<ContentDocument>,
    ) -> Self {
        Self {
            current,
            previous,
            findings: Findings::new(file_path),
        }
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        self.findings.file()
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        self.findings.errors()
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<ValidationError> {
        self.findings.into_errors()
    }

    /// Run every structural rule; all of them run so every error is reported.
    pub fn is_valid_file(&mut self) -> bool {
        let results = [
            self.is_valid_name(),
            self.is_valid_type(),
            self.is_valid_group(),
            self.is_valid_content_flag(),
            self.is_valid_system_flag(),
            self.is_valid_cliname(),
            self.is_valid_version(),
            self.is_current_valid_from_version(),
            self.is_valid_required(),
        ];
        results.iter().all(|ok| *ok)
    }

    /// True unless a previous version exists and `type` or `fromVersion` changed.
    pub fn is_backward_compatible(&mut self) -> bool {
        if self.previous.is_none() {
            return true;
        }
        let type_changed = self.is_changed_type();
        let from_version_changed = self.is_changed_from_version();
        !(type_changed || from_version_changed)
    }

    pub fn is_valid_name(&mut self) -> bool {
        let name = self.current.get_str("name").unwrap_or_default();
        if WHITELISTED_NAMES.contains(&name) {
            return true;
        }
        let bad_word = name
            .split_whitespace()
            .find(|word| BAD_NAME_WORDS.contains(&word.to_lowercase().as_str()));
        match bad_word {
            Some(word) => self.findings.fail(
                "is_valid_name",
                format!("The word '{word}' cannot be used in an incident field name."),
            ),
            None => true,
        }
    }

    pub fn is_valid_type(&mut self) -> bool {
        let field_type = self.current.get("type");
        if field_type
            .and_then(Value::as_str)
            .is_some_and(|t| FIELD_TYPES.contains(&t))
        {
            return true;
        }
        let shown = field_type.map_or_else(|| "null".to_owned(), Value::to_string);
        self.findings.fail(
            "is_valid_type",
            format!(
                "Type: `{shown}` is not one of available types.\navailable types: {}",
                FIELD_TYPES.join(", ")
            ),
        )
    }

    pub fn is_valid_group(&mut self) -> bool {
        let group = self.current.get("group");
        if group.and_then(FieldGroup::from_value).is_some() {
            return true;
        }
        let shown = group.map_or_else(|| "null".to_owned(), Value::to_string);
        self.findings
            .fail("is_valid_group", format!("Group {shown} is not a group field."))
    }

    pub fn is_valid_content_flag(&mut self) -> bool {
        if self.current.get_bool("content") == Some(true) {
            return true;
        }
        self.findings
            .fail("is_valid_content_flag", "The content key must be set to true.")
    }

    pub fn is_valid_system_flag(&mut self) -> bool {
        if matches!(self.current.get("system"), None | Some(Value::Bool(false))) {
            return true;
        }
        self.findings
            .fail("is_valid_system_flag", "The system key must be set to false.")
    }

    /// Not a reserved name for the field's group, then matching the regex.
    pub fn is_valid_cliname(&mut self) -> bool {
        self.is_cliname_is_builtin_key() && self.is_matching_cliname_regex()
    }

    pub fn is_matching_cliname_regex(&mut self) -> bool {
        let cli_name = self.current.get_str("cliName").unwrap_or_default();
        if CLINAME_RE.is_match(cli_name) {
            return true;
        }
        self.findings.fail(
            "is_matching_cliname_regex",
            format!(
                "Field `cliName` contains non-alphanumeric letters. must match regex: {CLINAME_PATTERN}"
            ),
        )
    }

    /// True when the `cliName` is not a built-in key of the field's group.
    pub fn is_cliname_is_builtin_key(&mut self) -> bool {
        let Some(cli_name) = self.current.get_str("cliName") else {
            return true;
        };
        let Some(group) = self.current.get("group").and_then(FieldGroup::from_value) else {
            return true;
        };
        if !group.reserved_cli_names().contains(&cli_name) {
            return true;
        }
        let message = format!("cliName field can not be {cli_name} as it's a builtin key.");
        self.findings.fail("is_cliname_is_builtin_key", message)
    }

    pub fn is_valid_version(&mut self) -> bool {
        if self.current.get_i64("version") == Some(-1) {
            return true;
        }
        self.findings.fail(
            "is_valid_version",
            "The version for our files should always be -1, please update the file.",
        )
    }

    /// On new files `fromVersion` must be at least 5.0.0. Existing files are
    /// covered by the backward-compatibility checks instead.
    pub fn is_current_valid_from_version(&mut self) -> bool {
        if self.previous.is_some() {
            return true;
        }
        let parsed = match self.current.get("fromVersion") {
            None => Some(ContentVersion::new(0, 0, 0)),
            Some(Value::String(raw)) => ContentVersion::parse(raw).ok(),
            Some(Value::Number(n)) => ContentVersion::parse(&n.to_string()).ok(),
            Some(_) => None,
        };
        match parsed {
            Some(version) if version >= MIN_FROM_VERSION => true,
            Some(_) => self.findings.fail(
                "is_current_valid_from_version",
                format!("fromVersion field in Incident Field needs to be higher or equal to {MIN_FROM_VERSION}"),
            ),
            None => self.findings.fail(
                "is_current_valid_from_version",
                "fromVersion field in Incident Field is not a valid version.",
            ),
        }
    }

    pub fn is_valid_required(&mut self) -> bool {
        if !self.current.is_truthy("required") {
            return true;
        }
        self.findings.fail(
            "is_valid_required",
            "New incident fields can not be required. change to:\nrequired: false.",
        )
    }

    /// Whether a non-empty previous `fromVersion` differs from the current one.
    pub fn is_changed_from_version(&mut self) -> bool {
        let Some(previous) = &self.previous else {
            return false;
        };
        if !previous.is_truthy("fromVersion") {
            return false;
        }
        if previous.get("fromVersion") == self.current.get("fromVersion") {
            return false;
        }
        self.findings.fail(
            "is_changed_from_version",
            "fromVersion might have been modified, please make sure it hasn't changed.",
        );
        true
    }

    /// Whether a non-empty previous `type` differs from the current one.
    pub fn is_changed_type(&mut self) -> bool {
        let Some(previous) = &self.previous else {
            return false;
        };
        if !previous.is_truthy("type") {
            return false;
        }
        if previous.get("type") == self.current.get("type") {
            return false;
        }
        self.findings
            .fail("is_changed_type", "Changing incident field type is not allowed.");
        true
    }
}
