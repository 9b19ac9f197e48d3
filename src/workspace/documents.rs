//! Default workspace documents

use eyre::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use super::Workspace;
use crate::config::{Config, InstanceConfig};

/// A file written into the workspace root if it does not exist yet
#[derive(Debug, Clone)]
pub struct Document {
    pub name: &'static str,
    pub content: String,
}

pub const RUNTIME_CONFIG_FILE: &str = "runtime.yaml";

/// The three identity documents the host runtime reads on startup
pub fn identity_documents(instance: &InstanceConfig) -> Vec<Document> {
    let name = &instance.name;

    vec![
        Document {
            name: "IDENTITY.md",
            content: format!(
                r#"# IDENTITY

- **Name:** {name}
- **Version:** {version}
- **Role:** Personal assistant running on this workspace
- **Persona:** see `{persona}`

Skills live in `skills/`. Long-term notes live in `memory/`.
"#,
                name = name,
                version = instance.version,
                persona = instance.persona,
            ),
        },
        Document {
            name: "SOUL.md",
            content: format!(
                r#"# SOUL

You are {name}.

## Voice
- Warm, direct, and concise
- Admit uncertainty instead of guessing

## Boundaries
- Ask before acting on anything irreversible
- Keep what you learn about the user in `memory/`, nowhere else
"#,
                name = name,
            ),
        },
        Document {
            name: "USER.md",
            content: format!(
                r#"# USER

Notes {name} keeps about the person it works for. Edit freely.

- **Name:**
- **Timezone:**
- **Preferred language:**
"#,
                name = name,
            ),
        },
    ]
}

#[derive(Debug, Serialize)]
struct RuntimeConfig {
    instance: RuntimeInstance,
    skills: RuntimeSkills,
    services: RuntimeServices,
}

#[derive(Debug, Serialize)]
struct RuntimeInstance {
    name: String,
    version: String,
    persona: String,
}

#[derive(Debug, Serialize)]
struct RuntimeSkills {
    dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct RuntimeServices {
    gateway: RuntimePort,
    dashboard: RuntimePort,
}

#[derive(Debug, Serialize)]
struct RuntimePort {
    port: u16,
}

/// Runtime configuration consumed by the host agent and its services
pub fn runtime_config(config: &Config, workspace: &Workspace) -> Result<Document> {
    let runtime = RuntimeConfig {
        instance: RuntimeInstance {
            name: config.instance.name.clone(),
            version: config.instance.version.clone(),
            persona: config.instance.persona.clone(),
        },
        skills: RuntimeSkills {
            dir: std::path::absolute(workspace.skills_dir()).unwrap_or_else(|_| workspace.skills_dir()),
        },
        services: RuntimeServices {
            gateway: RuntimePort {
                port: config.services.gateway.port,
            },
            dashboard: RuntimePort {
                port: config.services.dashboard.port,
            },
        },
    };

    let content = serde_yaml::to_string(&runtime).context("Failed to serialize runtime config")?;

    Ok(Document {
        name: RUNTIME_CONFIG_FILE,
        content,
    })
}
