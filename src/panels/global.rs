// Global panels - built once per engine from the host's description of itself

use serde_json::{json, Value};

use super::{GlobalContext, PackageInfo, Panel, RouteInfo};

/// Route table of the host application
#[derive(Debug)]
pub struct RoutesPanel {
    routes: Vec<RouteInfo>,
}

impl RoutesPanel {
    pub fn new(ctx: &GlobalContext<'_>) -> Self {
        let routes = ctx
            .app
            .routes
            .iter()
            .filter(|r| !r.pattern.starts_with(ctx.prefix))
            .cloned()
            .collect();
        Self { routes }
    }
}

impl Panel for RoutesPanel {
    fn name(&self) -> &'static str {
        "Routes"
    }

    fn nav_subtitle(&self) -> String {
        format!("{} routes", self.routes.len())
    }

    fn template(&self) -> &'static str {
        "panels/routes"
    }

    fn render_vars(&self) -> Value {
        json!({ "routes": self.routes })
    }
}

/// Effective configuration, as TOML
#[derive(Debug)]
pub struct ConfigurationPanel {
    toml: String,
}

impl ConfigurationPanel {
    pub fn new(ctx: &GlobalContext<'_>) -> Self {
        Self {
            toml: ctx.config.to_toml(),
        }
    }
}

impl Panel for ConfigurationPanel {
    fn name(&self) -> &'static str {
        "Configuration"
    }

    fn template(&self) -> &'static str {
        "panels/configuration"
    }

    fn render_vars(&self) -> Value {
        json!({ "config": self.toml })
    }
}

/// Middleware stack of the host application
#[derive(Debug)]
pub struct MiddlewaresPanel {
    middlewares: Vec<String>,
}

impl MiddlewaresPanel {
    pub fn new(ctx: &GlobalContext<'_>) -> Self {
        Self {
            middlewares: ctx.app.middlewares.clone(),
        }
    }
}

impl Panel for MiddlewaresPanel {
    fn name(&self) -> &'static str {
        "Middlewares"
    }

    fn has_content(&self) -> bool {
        !self.middlewares.is_empty()
    }

    fn template(&self) -> &'static str {
        "panels/middlewares"
    }

    fn render_vars(&self) -> Value {
        json!({ "middlewares": self.middlewares })
    }
}

/// Platform, toolbar and dependency versions
#[derive(Debug)]
pub struct VersionsPanel {
    packages: Vec<PackageInfo>,
}

impl VersionsPanel {
    pub fn new(ctx: &GlobalContext<'_>) -> Self {
        let mut packages = ctx.app.packages.clone();
        packages.sort_by_key(|p| p.name.to_lowercase());
        Self { packages }
    }
}

impl Panel for VersionsPanel {
    fn name(&self) -> &'static str {
        "Versions"
    }

    fn nav_subtitle(&self) -> String {
        format!("debug-toolbar {}", crate::config::VERSION)
    }

    fn template(&self) -> &'static str {
        "panels/versions"
    }

    fn render_vars(&self) -> Value {
        json!({
            "platform": {
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
                "family": std::env::consts::FAMILY,
            },
            "version": crate::config::VERSION,
            "packages": self.packages,
        })
    }
}
