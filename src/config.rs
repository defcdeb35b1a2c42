//! Configuration file (.treport.conf) parsing and handling
//!
//! The .treport.conf file uses INI format. The [DEFAULT] section holds the
//! report settings, [quality_gate] the gate rules, and each
//! [plugin.<id>] section configures one plugin instance.
//!
//! ```ini
//! [DEFAULT]
//! name=Nightly
//! output=build/report
//! history_path=.treport/history.jsonl
//! history_limit=20
//! plugins=data,raw
//!
//! [quality_gate]
//! max_failures=0
//!
//! [plugin.raw]
//! plugin=data
//! publish=true
//! group_by=feature
//!
//! [category.timeouts]
//! name=Timeouts
//! statuses=broken
//! message=timed out after \d+s
//! ```

use crate::categories::CategoryRule;
use crate::error::{Error, Result};
use crate::model::TestStatus;
use crate::quality_gate::QualityGateRule;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default name of the configuration file
pub const CONFIG_FILE: &str = ".treport.conf";

const PLUGIN_SECTION_PREFIX: &str = "plugin.";
const CATEGORY_SECTION_PREFIX: &str = "category.";

/// Plugin used when the configuration declares none
const DEFAULT_PLUGIN: &str = "data";

/// One plugin instance declared in the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    pub id: String,
    /// Built-in plugin implementing this instance
    pub implementation: String,
    pub enabled: bool,
    pub publish: bool,
    /// Remaining keys of the section, passed to the plugin
    pub options: BTreeMap<String, String>,
}

impl PluginConfig {
    fn new(id: &str) -> Self {
        PluginConfig {
            id: id.to_string(),
            implementation: id.to_string(),
            enabled: true,
            publish: false,
            options: BTreeMap::new(),
        }
    }
}

/// One failure category rule declared in the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryConfig {
    pub id: String,
    /// Display name; the section id when not given
    pub name: String,
    pub statuses: Vec<TestStatus>,
    pub message: Option<String>,
    pub trace: Option<String>,
}

impl CategoryConfig {
    pub fn to_rule(&self) -> Result<CategoryRule> {
        let mut rule = CategoryRule::new(&self.name).with_statuses(&self.statuses);
        if let Some(pattern) = &self.message {
            rule = rule.with_message(pattern)?;
        }
        if let Some(pattern) = &self.trace {
            rule = rule.with_trace(pattern)?;
        }
        Ok(rule)
    }
}

/// Configuration loaded from .treport.conf
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    /// Report name, recorded in history
    pub name: String,

    /// Directory plugins write into
    pub output: PathBuf,

    /// Local history file; no local history when unset
    pub history_path: Option<PathBuf>,

    /// Number of history points to keep
    pub history_limit: Option<i64>,

    /// Refresh plugins after every ingestion call
    pub realtime: bool,

    /// Where diagnostics of unexpected errors are written
    pub log_dir: PathBuf,

    /// Plugins in declared order
    pub plugins: Vec<PluginConfig>,

    pub quality_gate: Vec<QualityGateRule>,

    /// Custom failure categories, tried in declared order
    pub categories: Vec<CategoryConfig>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            name: "Test report".to_string(),
            output: PathBuf::from("test-report"),
            history_path: None,
            history_limit: None,
            realtime: false,
            log_dir: PathBuf::from(".treport"),
            plugins: vec![PluginConfig::new(DEFAULT_PLUGIN)],
            quality_gate: Vec::new(),
            categories: Vec::new(),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, value)))
}

impl ReportConfig {
    /// Load configuration from a .treport.conf file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        Self::parse(&contents)
    }

    /// Load `dir/.treport.conf` if present, defaults otherwise
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a string
    pub fn parse(contents: &str) -> Result<Self> {
        let ini: HashMap<String, HashMap<String, String>> = serde_ini::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", CONFIG_FILE, e)))?;

        let mut config = ReportConfig::default();
        let empty = HashMap::new();
        let default = ini.get("DEFAULT").unwrap_or(&empty);

        if let Some(name) = default.get("name") {
            if name.trim().is_empty() {
                return Err(Error::Config("name cannot be empty".to_string()));
            }
            config.name = name.trim().to_string();
        }
        if let Some(output) = default.get("output") {
            config.output = PathBuf::from(output.trim());
        }
        config.history_path = default
            .get("history_path")
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathBuf::from(p.trim()));
        if let Some(limit) = default.get("history_limit") {
            config.history_limit = Some(parse_number("history_limit", limit)?);
        }
        if let Some(realtime) = default.get("realtime") {
            config.realtime = parse_bool("realtime", realtime)?;
        }
        if let Some(log_dir) = default.get("log_dir") {
            config.log_dir = PathBuf::from(log_dir.trim());
        }

        if let Some(section) = ini.get("quality_gate") {
            config.quality_gate = parse_quality_gate(section)?;
        }

        config.plugins = parse_plugins(default.get("plugins"), &ini)?;
        config.categories = parse_categories(default.get("categories"), &ini)?;

        Ok(config)
    }

    /// Compiled category rules, in declared order
    pub fn category_rules(&self) -> Result<Vec<CategoryRule>> {
        self.categories.iter().map(CategoryConfig::to_rule).collect()
    }
}

fn parse_quality_gate(section: &HashMap<String, String>) -> Result<Vec<QualityGateRule>> {
    // Fixed order so violations come out the same way every run.
    let mut rules = Vec::new();
    if let Some(value) = section.get("max_failures") {
        rules.push(QualityGateRule::MaxFailures(parse_number("max_failures", value)?));
    }
    if let Some(value) = section.get("min_tests_count") {
        rules.push(QualityGateRule::MinTestsCount(parse_number(
            "min_tests_count",
            value,
        )?));
    }
    if let Some(value) = section.get("success_rate") {
        let rate: f64 = parse_number("success_rate", value)?;
        if !(0.0..=1.0).contains(&rate) {
            return Err(Error::Config(format!(
                "success_rate must be between 0 and 1, got {}",
                rate
            )));
        }
        rules.push(QualityGateRule::SuccessRate(rate));
    }
    if let Some(value) = section.get("max_duration") {
        let millis: u64 = parse_number("max_duration", value)?;
        rules.push(QualityGateRule::MaxDuration(Duration::from_millis(millis)));
    }

    if let Some(unknown) = section.keys().find(|key| {
        !matches!(
            key.as_str(),
            "max_failures" | "min_tests_count" | "success_rate" | "max_duration"
        )
    }) {
        return Err(Error::Config(format!(
            "Unknown quality_gate option '{}'",
            unknown
        )));
    }

    Ok(rules)
}

fn parse_plugin_section(id: &str, section: &HashMap<String, String>) -> Result<PluginConfig> {
    let mut plugin = PluginConfig::new(id);
    for (key, value) in section {
        match key.as_str() {
            "plugin" => plugin.implementation = value.trim().to_string(),
            "enabled" => plugin.enabled = parse_bool("enabled", value)?,
            "publish" => plugin.publish = parse_bool("publish", value)?,
            _ => {
                plugin.options.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(plugin)
}

fn parse_plugins(
    declared: Option<&String>,
    ini: &HashMap<String, HashMap<String, String>>,
) -> Result<Vec<PluginConfig>> {
    let sections: BTreeMap<&str, &HashMap<String, String>> = ini
        .iter()
        .filter_map(|(name, section)| {
            name.strip_prefix(PLUGIN_SECTION_PREFIX)
                .map(|id| (id, section))
        })
        .collect();

    let ids: Vec<String> = match declared {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
        None if sections.is_empty() => vec![DEFAULT_PLUGIN.to_string()],
        None => sections.keys().map(|id| id.to_string()).collect(),
    };

    let mut plugins: Vec<PluginConfig> = Vec::with_capacity(ids.len());
    for id in ids {
        if plugins.iter().any(|p| p.id == id) {
            return Err(Error::Config(format!("Duplicate plugin id '{}'", id)));
        }
        let plugin = match sections.get(id.as_str()) {
            Some(section) => parse_plugin_section(&id, section)?,
            None => PluginConfig::new(&id),
        };
        plugins.push(plugin);
    }

    if let Some(orphan) = sections
        .keys()
        .find(|id| !plugins.iter().any(|p| p.id == **id))
    {
        return Err(Error::Config(format!(
            "Section [plugin.{}] is not listed in plugins",
            orphan
        )));
    }

    Ok(plugins)
}

fn parse_statuses(value: &str) -> Result<Vec<TestStatus>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            TestStatus::ALL
                .into_iter()
                .find(|status| status.to_string() == name.to_ascii_lowercase())
                .ok_or_else(|| Error::Config(format!("Unknown status '{}'", name)))
        })
        .collect()
}

fn parse_category_section(
    id: &str,
    section: &HashMap<String, String>,
) -> Result<CategoryConfig> {
    let mut category = CategoryConfig {
        id: id.to_string(),
        name: id.to_string(),
        statuses: Vec::new(),
        message: None,
        trace: None,
    };
    for (key, value) in section {
        match key.as_str() {
            "name" => {
                if !value.trim().is_empty() {
                    category.name = value.trim().to_string();
                }
            }
            "statuses" => category.statuses = parse_statuses(value)?,
            "message" => category.message = Some(value.clone()),
            "trace" => category.trace = Some(value.clone()),
            other => {
                return Err(Error::Config(format!(
                    "Unknown option '{}' in [category.{}]",
                    other, id
                )))
            }
        }
    }
    // Surface bad patterns while loading rather than at report time.
    category.to_rule()?;
    Ok(category)
}

fn parse_categories(
    declared: Option<&String>,
    ini: &HashMap<String, HashMap<String, String>>,
) -> Result<Vec<CategoryConfig>> {
    let sections: BTreeMap<&str, &HashMap<String, String>> = ini
        .iter()
        .filter_map(|(name, section)| {
            name.strip_prefix(CATEGORY_SECTION_PREFIX)
                .map(|id| (id, section))
        })
        .collect();

    let ids: Vec<&str> = match declared {
        Some(list) => list.split(',').map(str::trim).filter(|id| !id.is_empty()).collect(),
        None => sections.keys().copied().collect(),
    };

    let mut categories: Vec<CategoryConfig> = Vec::with_capacity(ids.len());
    for id in ids {
        if categories.iter().any(|c| c.id == id) {
            return Err(Error::Config(format!("Duplicate category id '{}'", id)));
        }
        let section = sections
            .get(id)
            .ok_or_else(|| Error::Config(format!("Category '{}' has no [category.{}] section", id, id)))?;
        categories.push(parse_category_section(id, section)?);
    }

    if let Some(orphan) = sections
        .keys()
        .find(|id| !categories.iter().any(|c| c.id == **id))
    {
        return Err(Error::Config(format!(
            "Section [category.{}] is not listed in categories",
            orphan
        )));
    }

    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = ReportConfig::parse("").unwrap();
        assert_eq!(config, ReportConfig::default());
        assert_eq!(config.plugins[0].id, "data");
        assert_eq!(config.plugins[0].implementation, "data");
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
[DEFAULT]
name=Nightly
output=build/report
history_path=.treport/history.jsonl
history_limit=20
realtime=yes
log_dir=build/logs
plugins=data,raw

[quality_gate]
max_failures=0
success_rate=0.95
max_duration=60000

[plugin.raw]
plugin=data
publish=true
group_by=feature
"#;

        let config = ReportConfig::parse(config_str).unwrap();
        assert_eq!(config.name, "Nightly");
        assert_eq!(config.output, PathBuf::from("build/report"));
        assert_eq!(
            config.history_path,
            Some(PathBuf::from(".treport/history.jsonl"))
        );
        assert_eq!(config.history_limit, Some(20));
        assert!(config.realtime);
        assert_eq!(config.log_dir, PathBuf::from("build/logs"));
        assert_eq!(
            config.quality_gate,
            vec![
                QualityGateRule::MaxFailures(0),
                QualityGateRule::SuccessRate(0.95),
                QualityGateRule::MaxDuration(Duration::from_secs(60)),
            ]
        );

        assert_eq!(config.plugins.len(), 2);
        assert_eq!(config.plugins[0], PluginConfig::new("data"));
        let raw = &config.plugins[1];
        assert_eq!(raw.id, "raw");
        assert_eq!(raw.implementation, "data");
        assert!(raw.publish);
        assert!(raw.enabled);
        assert_eq!(raw.options.get("group_by").map(String::as_str), Some("feature"));
    }

    #[test]
    fn test_plugin_sections_without_list_are_sorted() {
        let config_str = r#"
[plugin.zeta]
plugin=data

[plugin.alpha]
plugin=data
enabled=false
"#;

        let config = ReportConfig::parse(config_str).unwrap();
        let ids: Vec<&str> = config.plugins.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
        assert!(!config.plugins[0].enabled);
    }

    #[test]
    fn test_duplicate_plugin_id() {
        let config_str = r#"
[DEFAULT]
plugins=data,data
"#;

        let result = ReportConfig::parse(config_str);
        assert!(result.unwrap_err().to_string().contains("Duplicate plugin id"));
    }

    #[test]
    fn test_unlisted_plugin_section() {
        let config_str = r#"
[DEFAULT]
plugins=data

[plugin.extra]
publish=true
"#;

        let result = ReportConfig::parse(config_str);
        assert!(result.unwrap_err().to_string().contains("plugin.extra"));
    }

    #[test]
    fn test_invalid_values() {
        let bad_bool = "[DEFAULT]\nrealtime=maybe\n";
        assert!(ReportConfig::parse(bad_bool)
            .unwrap_err()
            .to_string()
            .contains("realtime"));

        let bad_limit = "[DEFAULT]\nhistory_limit=lots\n";
        assert!(matches!(
            ReportConfig::parse(bad_limit),
            Err(Error::Config(_))
        ));

        let bad_rate = "[quality_gate]\nsuccess_rate=1.5\n";
        assert!(ReportConfig::parse(bad_rate)
            .unwrap_err()
            .to_string()
            .contains("success_rate"));

        let unknown_rule = "[quality_gate]\nmax_flakes=1\n";
        assert!(ReportConfig::parse(unknown_rule)
            .unwrap_err()
            .to_string()
            .contains("max_flakes"));
    }

    #[test]
    fn test_load_or_default() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            ReportConfig::load_or_default(temp.path()).unwrap(),
            ReportConfig::default()
        );

        fs::write(temp.path().join(CONFIG_FILE), "[DEFAULT]\nname=Local\n").unwrap();
        let config = ReportConfig::load_or_default(temp.path()).unwrap();
        assert_eq!(config.name, "Local");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let result = ReportConfig::load_from_file(&temp.path().join("nope.conf"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_categories() {
        let config_str = r#"
[DEFAULT]
categories=timeouts,asserts

[category.asserts]
message=^assert

[category.timeouts]
name=Timeouts
statuses=broken, failed
trace=TimeoutError
"#;

        let config = ReportConfig::parse(config_str).unwrap();
        assert_eq!(config.categories.len(), 2);
        let timeouts = &config.categories[0];
        assert_eq!(timeouts.id, "timeouts");
        assert_eq!(timeouts.name, "Timeouts");
        assert_eq!(timeouts.statuses, vec![TestStatus::Broken, TestStatus::Failed]);
        assert_eq!(timeouts.trace.as_deref(), Some("TimeoutError"));
        assert_eq!(config.categories[1].name, "asserts");
        assert!(config.categories[1].statuses.is_empty());

        let rules = config.category_rules().unwrap();
        assert_eq!(rules[0].name, "Timeouts");
        assert!(rules[1].message.is_some());
    }

    #[test]
    fn test_invalid_categories() {
        let bad_pattern = "[category.bad]\nmessage=(unclosed\n";
        match ReportConfig::parse(bad_pattern) {
            Err(Error::Config(message)) => assert!(message.contains("'bad'")),
            other => panic!("unexpected result: {:?}", other),
        }

        let bad_status = "[category.x]\nstatuses=failed,exploded\n";
        assert!(ReportConfig::parse(bad_status)
            .unwrap_err()
            .to_string()
            .contains("exploded"));

        let unknown_key = "[category.x]\nseverity=high\n";
        assert!(ReportConfig::parse(unknown_key)
            .unwrap_err()
            .to_string()
            .contains("severity"));

        let missing = "[DEFAULT]\ncategories=ghost\n";
        assert!(ReportConfig::parse(missing)
            .unwrap_err()
            .to_string()
            .contains("ghost"));
    }
}
