// Launch profile discovery
//
// Pure reader over the project's Properties/launchSettings.json, found by
// walking up from a compiled artifact. Absent or malformed settings are
// treated as "no profile".

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How many directory levels above the artifact are searched.
pub const MAX_WALK_UP_LEVELS: usize = 5;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchProfile {
    pub environment_variables: HashMap<String, String>,
    pub application_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LaunchSettings {
    profiles: HashMap<String, LaunchProfile>,
}

/// Locate `Properties/launchSettings.json` at or above the artifact.
pub fn find_launch_settings(artifact: &Path) -> Option<PathBuf> {
    let mut dir = if artifact.is_dir() {
        Some(artifact)
    } else {
        artifact.parent()
    };
    for _ in 0..=MAX_WALK_UP_LEVELS {
        let current = dir?;
        let candidate = current.join("Properties").join("launchSettings.json");
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// The named profile near the artifact, or None.
pub fn load_profile(artifact: &Path, name: &str) -> Option<LaunchProfile> {
    let path = find_launch_settings(artifact)?;
    let text = std::fs::read_to_string(&path).ok()?;
    let settings: LaunchSettings = serde_json::from_str(&text).ok()?;
    settings.profiles.get(name).cloned()
}

/// Environment a launch inherits from its profile: the profile's variables
/// plus ASPNETCORE_URLS when the profile carries an applicationUrl. Explicit
/// overrides are applied by the caller and win.
pub fn resolve_environment(program: &str, profile_name: Option<&str>) -> HashMap<String, String> {
    let Some(name) = profile_name else {
        return HashMap::new();
    };
    let Some(profile) = load_profile(Path::new(program), name) else {
        return HashMap::new();
    };
    let mut env = profile.environment_variables;
    if let Some(url) = profile.application_url {
        env.insert("ASPNETCORE_URLS".to_string(), url);
    }
    env
}

/// Ports the application will bind, in profile order: every integer that
/// follows a colon in the semicolon-delimited URL list.
pub fn extract_ports(application_url: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for url in application_url.split(';') {
        let mut rest = url;
        while let Some(idx) = rest.find(':') {
            rest = &rest[idx + 1..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                continue;
            }
            if let Ok(port) = digits.parse::<u16>() {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
    }
    ports
}

/// Ports tracked for a watch session, drawn from the named profile.
pub fn profile_ports(project_dir: &Path, profile_name: Option<&str>) -> Vec<u16> {
    let Some(name) = profile_name else {
        return Vec::new();
    };
    load_profile(project_dir, name)
        .and_then(|profile| profile.application_url)
        .map(|url| extract_ports(&url))
        .unwrap_or_default()
}

/// Project directory for an artifact: the nearest ancestor holding a
/// .csproj file.
pub fn find_project_dir(artifact: &Path) -> Option<PathBuf> {
    let mut dir = if artifact.is_dir() {
        Some(artifact)
    } else {
        artifact.parent()
    };
    for _ in 0..=MAX_WALK_UP_LEVELS {
        let current = dir?;
        if has_csproj(current) {
            return Some(current.to_path_buf());
        }
        dir = current.parent();
    }
    None
}

fn has_csproj(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|entry| entry.path().extension().is_some_and(|ext| ext == "csproj"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"{
        "profiles": {
            "https": {
                "environmentVariables": { "ASPNETCORE_ENVIRONMENT": "Development" },
                "applicationUrl": "https://localhost:7179;http://localhost:5151"
            },
            "http": {
                "applicationUrl": "http://localhost:5151"
            }
        }
    }"#;

    fn project_with_settings(settings: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let properties = dir.path().join("Properties");
        std::fs::create_dir_all(&properties).unwrap();
        std::fs::write(properties.join("launchSettings.json"), settings).unwrap();
        dir
    }

    #[test]
    fn walks_up_from_build_output_to_settings() {
        let dir = project_with_settings(SETTINGS);
        let artifact = dir
            .path()
            .join("bin")
            .join("Debug")
            .join("net8.0")
            .join("Api.dll");
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(&artifact, b"").unwrap();

        let found = find_launch_settings(&artifact).unwrap();
        assert!(found.ends_with("Properties/launchSettings.json"));
    }

    #[test]
    fn resolves_environment_with_urls() {
        let dir = project_with_settings(SETTINGS);
        let artifact = dir.path().join("Api.dll");
        std::fs::write(&artifact, b"").unwrap();

        let env = resolve_environment(artifact.to_str().unwrap(), Some("https"));
        assert_eq!(
            env.get("ASPNETCORE_ENVIRONMENT").map(String::as_str),
            Some("Development")
        );
        assert_eq!(
            env.get("ASPNETCORE_URLS").map(String::as_str),
            Some("https://localhost:7179;http://localhost:5151")
        );
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn unknown_profile_resolves_to_empty_environment() {
        let dir = project_with_settings(SETTINGS);
        let artifact = dir.path().join("Api.dll");
        std::fs::write(&artifact, b"").unwrap();

        let env = resolve_environment(artifact.to_str().unwrap(), Some("staging"));
        assert!(env.is_empty());
    }

    #[test]
    fn malformed_settings_are_treated_as_absent() {
        let dir = project_with_settings("{ not json ");
        let artifact = dir.path().join("Api.dll");
        std::fs::write(&artifact, b"").unwrap();

        assert!(load_profile(&artifact, "https").is_none());
    }

    #[test]
    fn extract_ports_from_url_list() {
        assert_eq!(
            extract_ports("https://localhost:7179;http://localhost:5151"),
            vec![7179, 5151]
        );
        assert_eq!(extract_ports("http://localhost"), Vec::<u16>::new());
        assert_eq!(extract_ports(""), Vec::<u16>::new());
    }

    #[test]
    fn profile_ports_read_from_project_dir() {
        let dir = project_with_settings(SETTINGS);
        let ports = profile_ports(dir.path(), Some("https"));
        assert_eq!(ports, vec![7179, 5151]);
        assert!(profile_ports(dir.path(), None).is_empty());
    }

    #[test]
    fn project_dir_is_nearest_csproj_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Api.csproj"), b"<Project/>").unwrap();
        let artifact = dir
            .path()
            .join("bin")
            .join("Debug")
            .join("net8.0")
            .join("Api.dll");
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(&artifact, b"").unwrap();

        let project = find_project_dir(&artifact).unwrap();
        assert_eq!(project, dir.path());
    }
}
