//! Module descriptor (`apaas.json`) types and loading

use crate::error::ApaasError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

/// Default descriptor file name inside a module directory
pub const DEFAULT_CONFIG_NAME: &str = "apaas.json";

/// A widget exposed by a custom module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomWidget {
    pub code: String,
    pub text: String,
}

/// Descriptor of a buildable custom module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Entry file, absolute or relative to the module directory
    pub entry: String,

    /// Output name: used as directory name and URL path segment
    pub output_name: String,

    /// Asset directories copied into the build output (required for `build`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_assets: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_widget_list: Option<Vec<CustomWidget>>,

    /// Unrecognised keys, preserved as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleDescriptor {
    /// Parse and validate descriptor JSON. `path` is only used in messages.
    pub fn from_json(text: &str, path: &Path) -> Result<Self, ApaasError> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            ApaasError::config(format!(
                "Failed to parse config file: {} ({})",
                path.display(),
                e
            ))
        })?;

        // Field-level checks first so the message names the offending field
        let object = value.as_object().ok_or_else(|| {
            ApaasError::config(format!(
                "Config file must contain a JSON object: {}",
                path.display()
            ))
        })?;
        for field in ["entry", "outputName"] {
            match object.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                _ => {
                    return Err(ApaasError::config(format!(
                        "Config file is missing a valid `{}` field: {}",
                        field,
                        path.display()
                    )))
                }
            }
        }
        if let Some(assets) = object.get("copyAssets") {
            if !assets.is_array() {
                return Err(ApaasError::config(format!(
                    "`copyAssets` must be an array in config file: {}",
                    path.display()
                )));
            }
        }

        let descriptor: ModuleDescriptor = serde_json::from_value(value).map_err(|e| {
            ApaasError::config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        validate_output_name(&descriptor.output_name, path)?;
        Ok(descriptor)
    }

    /// Read a descriptor file. The file is only ever opened for reading.
    pub fn load(path: &Path) -> Result<Self, ApaasError> {
        if !path.is_file() {
            return Err(ApaasError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            ApaasError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_json(&text, path)
    }

    /// Asset list, which `build` requires to be present
    pub fn require_copy_assets(&self, path: &Path) -> Result<&[String], ApaasError> {
        self.copy_assets.as_deref().ok_or_else(|| {
            ApaasError::config(format!(
                "`copyAssets` must be an array in config file: {}",
                path.display()
            ))
        })
    }
}

/// Output names become a directory and a URL segment, so they must be one plain segment
fn validate_output_name(name: &str, path: &Path) -> Result<(), ApaasError> {
    let invalid = name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_control);
    if invalid {
        return Err(ApaasError::config(format!(
            "`outputName` must be a single path segment, got '{}': {}",
            name,
            path.display()
        )));
    }
    Ok(())
}

/// The descriptor file name must be a `.json` file name
pub fn check_config_name(name: &str) -> Result<(), ApaasError> {
    if name.is_empty() || !name.ends_with(".json") {
        return Err(ApaasError::config(format!(
            "--name must be a .json file name: {}",
            name
        )));
    }
    Ok(())
}

/// Resolve `path` against `base` unless it is already absolute, dropping `.`/`..` lexically
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve the module directory and check it is an existing directory
pub fn resolve_module_dir(dir: &Path, cwd: &Path) -> Result<PathBuf, ApaasError> {
    let abs = resolve_against(cwd, dir);
    if !abs.exists() {
        return Err(ApaasError::path("Module directory does not exist", abs));
    }
    if !abs.is_dir() {
        return Err(ApaasError::path("Module path is not a directory", abs));
    }
    Ok(abs)
}

/// Resolve the descriptor's entry against the module directory; it must exist
pub fn resolve_entry(module_dir: &Path, entry: &str) -> Result<PathBuf, ApaasError> {
    let entry_path = resolve_against(module_dir, Path::new(entry));
    if !entry_path.exists() {
        return Err(ApaasError::path(
            format!("The entry `{}` declared in the module config is wrong", entry),
            entry_path,
        ));
    }
    Ok(entry_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ModuleDescriptor, ApaasError> {
        ModuleDescriptor::from_json(json, Path::new("apaas.json"))
    }

    #[test]
    fn test_parse_full_descriptor() {
        let d = parse(
            r#"{
                "entry": "./src/index.tsx",
                "outputName": "hello",
                "copyAssets": ["public/custom/hello"],
                "customWidgetList": [{"code": "w1", "text": "Widget"}],
                "owner": "team-a"
            }"#,
        )
        .unwrap();
        assert_eq!(d.entry, "./src/index.tsx");
        assert_eq!(d.output_name, "hello");
        assert_eq!(d.copy_assets.as_deref(), Some(&["public/custom/hello".to_string()][..]));
        assert_eq!(d.custom_widget_list.unwrap()[0].code, "w1");
        assert_eq!(d.extra.get("owner"), Some(&Value::from("team-a")));
    }

    #[test]
    fn test_unknown_fields_survive_reserialization() {
        let d = parse(r#"{"entry": "a.js", "outputName": "x", "meta": {"k": 1}}"#).unwrap();
        let out = serde_json::to_value(&d).unwrap();
        assert_eq!(out["meta"]["k"], 1);
        assert_eq!(out["outputName"], "x");
    }

    #[test]
    fn test_missing_entry_is_config_error() {
        let err = parse(r#"{"outputName": "x"}"#).unwrap_err();
        assert!(matches!(err, ApaasError::Config(_)));
        assert!(err.to_string().contains("`entry`"));
    }

    #[test]
    fn test_missing_output_name_is_config_error() {
        let err = parse(r#"{"entry": "a.js"}"#).unwrap_err();
        assert!(matches!(err, ApaasError::Config(_)));
        assert!(err.to_string().contains("`outputName`"));
    }

    #[test]
    fn test_mistyped_fields_are_config_errors() {
        assert!(matches!(
            parse(r#"{"entry": 1, "outputName": "x"}"#),
            Err(ApaasError::Config(_))
        ));
        assert!(matches!(
            parse(r#"{"entry": "a.js", "outputName": ""}"#),
            Err(ApaasError::Config(_))
        ));
        let err = parse(r#"{"entry": "a.js", "outputName": "x", "copyAssets": "public"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("copyAssets"));
    }

    #[test]
    fn test_unparsable_json_is_config_error() {
        assert!(matches!(parse("{ not json"), Err(ApaasError::Config(_))));
        assert!(matches!(parse("[]"), Err(ApaasError::Config(_))));
    }

    #[test]
    fn test_output_name_must_be_single_segment() {
        for bad in ["a/b", "..", ".", "a\\b"] {
            let json = format!(
                r#"{{"entry": "a.js", "outputName": "{}"}}"#,
                bad.replace('\\', "\\\\")
            );
            assert!(parse(&json).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_require_copy_assets() {
        let d = parse(r#"{"entry": "a.js", "outputName": "x"}"#).unwrap();
        assert!(d.require_copy_assets(Path::new("apaas.json")).is_err());

        let d = parse(r#"{"entry": "a.js", "outputName": "x", "copyAssets": []}"#).unwrap();
        assert!(d.require_copy_assets(Path::new("apaas.json")).unwrap().is_empty());
    }

    #[test]
    fn test_check_config_name() {
        assert!(check_config_name("apaas.json").is_ok());
        assert!(check_config_name("apaas.dev.json").is_ok());
        assert!(check_config_name("apaas.yaml").is_err());
        assert!(check_config_name("").is_err());
    }

    #[test]
    fn test_resolve_entry_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("widget.js"), "export default 1").unwrap();

        let resolved = resolve_entry(dir.path(), "./widget.js").unwrap();
        assert_eq!(resolved, dir.path().join("widget.js"));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_resolve_entry_missing_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_entry(dir.path(), "./missing.js").unwrap_err();
        match err {
            ApaasError::Path { path, .. } => assert_eq!(path, dir.path().join("missing.js")),
            other => panic!("expected path error, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_against_normalizes() {
        let base = Path::new("/work/modules/hello");
        assert_eq!(
            resolve_against(base, Path::new("../shared/./a.js")),
            PathBuf::from("/work/modules/shared/a.js")
        );
        assert_eq!(
            resolve_against(base, Path::new("/abs/a.js")),
            PathBuf::from("/abs/a.js")
        );
    }

    #[test]
    fn test_resolve_module_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "").unwrap();

        assert!(resolve_module_dir(Path::new("."), dir.path()).is_ok());
        assert!(matches!(
            resolve_module_dir(Path::new("file.txt"), dir.path()),
            Err(ApaasError::Path { .. })
        ));
        assert!(matches!(
            resolve_module_dir(Path::new("nope"), dir.path()),
            Err(ApaasError::Path { .. })
        ));
    }

    #[test]
    fn test_load_does_not_mutate_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apaas.json");
        let content = r#"{"entry": "a.js", "outputName": "x", "copyAssets": []}"#;
        std::fs::write(&path, content).unwrap();
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        ModuleDescriptor::load(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModuleDescriptor::load(&dir.path().join("apaas.json")).unwrap_err();
        assert!(matches!(err, ApaasError::Config(_)));
        assert!(err.to_string().contains("not found"));
    }
}
