//! Process environment of an app launch

use sitepm_core::{constants::NODE_ENV_VALUE, export_name, App, AppStatus, SiteInfo};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything besides the app and site that goes into an environment
#[derive(Debug, Clone, Default)]
pub struct EnvInputs {
    pub port: u16,
    /// Allow-listed variables taken from the daemon's own environment
    pub inherited: BTreeMap<String, String>,
    /// Binaries of the app's Node.js version, prepended to `PATH`
    pub node_bin: Option<PathBuf>,
    /// Only applied when the app has `inject_wp_env`
    pub wordpress: BTreeMap<String, String>,
}

/// Snapshot the allow-listed variables of the current process
pub fn inherited_env(allow: &[String]) -> BTreeMap<String, String> {
    allow
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
        .collect()
}

/// Compose the launch environment. Later groups override earlier ones:
/// port, runtime mode, site identity, inherited variables, WordPress
/// variables and finally the app's own overrides.
pub fn compose(app: &App, site: &SiteInfo, inputs: EnvInputs) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    env.insert("PORT".to_string(), inputs.port.to_string());
    env.insert("NODE_ENV".to_string(), NODE_ENV_VALUE.to_string());

    env.insert("SITE_ID".to_string(), site.id.clone());
    env.insert("SITE_NAME".to_string(), site.name.clone());
    env.insert("SITE_DOMAIN".to_string(), site.domain.clone());
    env.insert("SITE_URL".to_string(), site.url.clone());
    env.insert("SITE_PATH".to_string(), site.path.clone());

    env.extend(inputs.inherited);
    prepend_path(&mut env, inputs.node_bin);

    if app.inject_wp_env {
        env.extend(inputs.wordpress);
    }

    env.extend(app.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Environment for install and build commands: no port or site identity
pub fn provision_env(
    app: &App,
    inherited: BTreeMap<String, String>,
    node_bin: Option<PathBuf>,
) -> BTreeMap<String, String> {
    let mut env = inherited;
    env.insert("NODE_ENV".to_string(), NODE_ENV_VALUE.to_string());
    prepend_path(&mut env, node_bin);
    env.extend(app.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

fn prepend_path(env: &mut BTreeMap<String, String>, bin: Option<PathBuf>) {
    let Some(bin) = bin else {
        return;
    };

    let mut dirs = vec![bin];
    if let Some(existing) = env.get("PATH") {
        dirs.extend(std::env::split_paths(existing));
    }
    if let Ok(joined) = std::env::join_paths(dirs) {
        env.insert("PATH".to_string(), joined.to_string_lossy().to_string());
    }
}

/// `APP_<NAME>_URL` and `APP_<NAME>_PORT` for every running app with a port,
/// for injection into sibling processes of the site
pub fn exported_env(apps: &[App]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for app in apps {
        let Some(port) = app.port else {
            continue;
        };
        if app.status != AppStatus::Running {
            continue;
        }
        let name = export_name(&app.name);
        env.insert(format!("APP_{}_URL", name), format!("http://localhost:{}", port));
        env.insert(format!("APP_{}_PORT", name), port.to_string());
    }
    env
}


#[cfg(test)]
mod tests {
    use super::*;
    use sitepm_core::NewApp;

    fn app() -> App {
        NewApp::new("api", "https://github.com/acme/api.git").into_app()
    }

    fn site() -> SiteInfo {
        SiteInfo::new("site-1", "Blog")
            .with_domain("blog.local")
            .with_url("http://blog.local")
            .with_path("/srv/blog")
    }

    fn inputs() -> EnvInputs {
        let mut inherited = BTreeMap::new();
        inherited.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        inherited.insert("HOME".to_string(), "/home/dev".to_string());
        EnvInputs {
            port: 3001,
            inherited,
            ..Default::default()
        }
    }

    #[test]
    fn test_compose_base_variables() {
        let env = compose(&app(), &site(), inputs());
        assert_eq!(env["PORT"], "3001");
        assert_eq!(env["NODE_ENV"], "development");
        assert_eq!(env["SITE_ID"], "site-1");
        assert_eq!(env["SITE_NAME"], "Blog");
        assert_eq!(env["SITE_DOMAIN"], "blog.local");
        assert_eq!(env["SITE_URL"], "http://blog.local");
        assert_eq!(env["SITE_PATH"], "/srv/blog");
        assert_eq!(env["HOME"], "/home/dev");
    }

    #[test]
    fn test_user_overrides_win() {
        let mut app = app();
        app.env.insert("PORT".to_string(), "9999".to_string());
        app.env.insert("NODE_ENV".to_string(), "production".to_string());
        app.env.insert("API_KEY".to_string(), "secret".to_string());

        let env = compose(&app, &site(), inputs());
        assert_eq!(env["PORT"], "9999");
        assert_eq!(env["NODE_ENV"], "production");
        assert_eq!(env["API_KEY"], "secret");
    }

    #[test]
    fn test_wordpress_only_when_enabled() {
        let mut wp = BTreeMap::new();
        wp.insert("WP_HOME".to_string(), "http://blog.local".to_string());
        wp.insert("SITE_NAME".to_string(), "Blog (WordPress)".to_string());

        let mut with_wp = inputs();
        with_wp.wordpress = wp.clone();
        let env = compose(&app(), &site(), with_wp);
        assert!(!env.contains_key("WP_HOME"));

        let mut app = app();
        app.inject_wp_env = true;
        let mut with_wp = inputs();
        with_wp.wordpress = wp;
        let env = compose(&app, &site(), with_wp);
        assert_eq!(env["WP_HOME"], "http://blog.local");
        assert_eq!(env["SITE_NAME"], "Blog (WordPress)");
    }

    #[cfg(unix)]
    #[test]
    fn test_node_bin_prepended() {
        let mut with_node = inputs();
        with_node.node_bin = Some(PathBuf::from("/opt/node/20/bin"));
        let env = compose(&app(), &site(), with_node);
        assert_eq!(env["PATH"], "/opt/node/20/bin:/usr/bin:/bin");
    }

    #[test]
    fn test_inherited_env_is_allow_listed() {
        std::env::set_var("SITEPM_ENV_TEST_SECRET", "hidden");
        let inherited = inherited_env(&["PATH".to_string()]);
        assert!(!inherited.contains_key("SITEPM_ENV_TEST_SECRET"));
        assert_eq!(inherited.get("PATH"), std::env::var("PATH").ok().as_ref());
    }

    #[test]
    fn test_provision_env_has_no_port() {
        let mut app = app();
        app.env.insert("NPM_CONFIG_REGISTRY".to_string(), "http://registry.local".to_string());
        let env = provision_env(&app, inputs().inherited, None);
        assert!(!env.contains_key("PORT"));
        assert_eq!(env["NPM_CONFIG_REGISTRY"], "http://registry.local");
        assert_eq!(env["NODE_ENV"], "development");
    }

    #[test]
    fn test_exported_env() {
        let mut running = app();
        running.name = "my-api".to_string();
        running.status = AppStatus::Running;
        running.port = Some(3001);

        let mut stopped = app();
        stopped.name = "worker".to_string();
        stopped.status = AppStatus::Stopped;
        stopped.port = Some(3002);

        let env = exported_env(&[running, stopped]);
        assert_eq!(env.len(), 2);
        assert_eq!(env["APP_MY_API_URL"], "http://localhost:3001");
        assert_eq!(env["APP_MY_API_PORT"], "3001");
    }
}
