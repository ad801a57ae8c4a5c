//! Port leases per site

use parking_lot::Mutex;
use sitepm_core::{Error, Result, Settings};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of checking whether a port can be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortProbe {
    Free,
    InUse,
    /// Probing itself failed (no loopback, sandbox, ...)
    Unavailable,
}

type Prober = Arc<dyn Fn(u16) -> PortProbe + Send + Sync>;

/// Bind `127.0.0.1:port` and release it immediately
pub fn probe_loopback(port: u16) -> PortProbe {
    match TcpListener::bind(("127.0.0.1", port)) {
        Ok(_) => PortProbe::Free,
        Err(e) if e.kind() == ErrorKind::AddrInUse => PortProbe::InUse,
        Err(e) => {
            debug!("Probing port {} failed: {}", port, e);
            PortProbe::Unavailable
        }
    }
}

/// Owns every `(site, app) -> port` lease.
///
/// A port is never leased twice, across all sites.
pub struct PortAllocator {
    start: u16,
    end: u16,
    default_port: u16,
    leases: Mutex<HashMap<String, HashMap<String, u16>>>,
    probe: Prober,
}

impl PortAllocator {
    pub fn new(start: u16, end: u16, default_port: u16) -> Self {
        Self::with_probe(start, end, default_port, probe_loopback)
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.port_range_start,
            settings.port_range_end,
            settings.default_port,
        )
    }

    pub fn with_probe<F>(start: u16, end: u16, default_port: u16, probe: F) -> Self
    where
        F: Fn(u16) -> PortProbe + Send + Sync + 'static,
    {
        Self {
            start,
            end,
            default_port,
            leases: Mutex::new(HashMap::new()),
            probe: Arc::new(probe),
        }
    }

    /// The app's existing lease, or a new one
    pub fn allocate(&self, site_id: &str, app_id: &str) -> Result<u16> {
        let mut leases = self.leases.lock();

        if let Some(port) = leases.get(site_id).and_then(|s| s.get(app_id)) {
            return Ok(*port);
        }

        let taken = |port: u16| leases.values().any(|site| site.values().any(|p| *p == port));

        let mut probe_failed = false;
        let mut chosen = None;
        for port in self.start..=self.end {
            if taken(port) {
                continue;
            }
            match (self.probe)(port) {
                PortProbe::Free => {
                    chosen = Some(port);
                    break;
                }
                PortProbe::InUse => continue,
                PortProbe::Unavailable => {
                    probe_failed = true;
                    break;
                }
            }
        }

        let port = match chosen {
            Some(port) => port,
            None if probe_failed && !taken(self.default_port) => {
                warn!(
                    "Port probing unavailable, falling back to default port {}",
                    self.default_port
                );
                self.default_port
            }
            None => {
                return Err(Error::PortsExhausted {
                    start: self.start,
                    end: self.end,
                })
            }
        };

        leases
            .entry(site_id.to_string())
            .or_default()
            .insert(app_id.to_string(), port);
        debug!("Leased port {} to {}/{}", port, site_id, app_id);
        Ok(port)
    }

    /// Re-establish a persisted lease. False if another app holds the port.
    pub fn reserve(&self, site_id: &str, app_id: &str, port: u16) -> bool {
        let mut leases = self.leases.lock();
        let conflict = leases.iter().any(|(site, apps)| {
            apps.iter()
                .any(|(app, p)| *p == port && !(site == site_id && app == app_id))
        });
        if conflict {
            return false;
        }
        leases
            .entry(site_id.to_string())
            .or_default()
            .insert(app_id.to_string(), port);
        true
    }

    pub fn release(&self, site_id: &str, app_id: &str) -> Option<u16> {
        let mut leases = self.leases.lock();
        let site = leases.get_mut(site_id)?;
        let port = site.remove(app_id);
        if site.is_empty() {
            leases.remove(site_id);
        }
        port
    }

    pub fn release_site(&self, site_id: &str) {
        self.leases.lock().remove(site_id);
    }

    pub fn lease(&self, site_id: &str, app_id: &str) -> Option<u16> {
        self.leases
            .lock()
            .get(site_id)
            .and_then(|s| s.get(app_id))
            .copied()
    }

    /// All leases of a site, by app id
    pub fn site_leases(&self, site_id: &str) -> HashMap<String, u16> {
        self.leases.lock().get(site_id).cloned().unwrap_or_default()
    }
}
