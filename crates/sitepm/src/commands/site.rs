//! Site notifications and the exported site environment

use anyhow::{bail, Result};
use sitepm_core::SiteInfo;
use sitepm_ipc::{Request, Response};

use crate::cli::SiteEvent;
use crate::output::{print_bulk, print_env};

pub async fn env(site: &str) -> Result<()> {
    let client = super::get_client();

    let response = client
        .send(&Request::SiteEnv {
            site: site.to_string(),
        })
        .await?;

    match response {
        Response::Env { env } => {
            print_env(&env);
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}

pub async fn notify(site: &str, event: SiteEvent) -> Result<()> {
    let client = super::get_client();
    let (action, request) = request_for(site, event);

    match client.send(&request).await? {
        Response::Bulk { report } => {
            if !print_bulk(action, &report) {
                bail!("{} apps failed", report.failed.len());
            }
            Ok(())
        }
        other => Err(super::daemon_error(other)),
    }
}

fn request_for(site: &str, event: SiteEvent) -> (&'static str, Request) {
    match event {
        SiteEvent::Started {
            name,
            domain,
            url,
            path,
        } => {
            let mut info = SiteInfo::new(site, name.unwrap_or_else(|| site.to_string()));
            if let Some(domain) = domain {
                info.url = format!("http://{}", domain);
                info = info.with_domain(domain);
            }
            if let Some(url) = url {
                info = info.with_url(url);
            }
            if let Some(path) = path {
                info = info.with_path(path);
            }
            ("started", Request::SiteStarted { site: info })
        }
        SiteEvent::Stopping => (
            "stopped",
            Request::SiteStopping {
                site: site.to_string(),
            },
        ),
        SiteEvent::Deleting => (
            "removed",
            Request::SiteDeleting {
                site: site.to_string(),
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_identity() {
        let (_, request) = request_for(
            "blog",
            SiteEvent::Started {
                name: Some("My Blog".to_string()),
                domain: Some("blog.test".to_string()),
                url: None,
                path: Some("/srv/blog".to_string()),
            },
        );

        match request {
            Request::SiteStarted { site } => {
                assert_eq!(site.id, "blog");
                assert_eq!(site.name, "My Blog");
                assert_eq!(site.domain, "blog.test");
                assert_eq!(site.url, "http://blog.test");
                assert_eq!(site.path, "/srv/blog");
            }
            _ => panic!("Wrong request"),
        }
    }

    #[test]
    fn test_started_defaults() {
        let (action, request) = request_for(
            "blog",
            SiteEvent::Started {
                name: None,
                domain: None,
                url: None,
                path: None,
            },
        );
        assert_eq!(action, "started");
        assert!(matches!(request, Request::SiteStarted { site } if site.domain == "blog.local"));
    }
}
