//! Global interface registry
//!
//! Mirrors the compositor's `wl_registry` advertisements as a plain
//! id -> (name, version) table and hands out bound proxies once the initial
//! roundtrip has guaranteed the table is complete.

use log::{debug, warn};
use std::collections::HashMap;
use wayland_client::{protocol::wl_registry::WlRegistry, Dispatch, Proxy, QueueHandle};

use crate::error::{Result, WindowError};

/// One advertised global
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalInterface {
    /// Server-assigned numeric name, unique while the global lives
    pub id: u32,
    /// Interface name, e.g. `wl_compositor`
    pub name: String,
    /// Highest version the compositor supports
    pub version: u32,
}

/// Table of currently advertised globals
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    globals: HashMap<u32, GlobalInterface>,
    synced: bool,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an advertisement, replacing any previous entry for `id`
    pub fn record(&mut self, id: u32, name: &str, version: u32) {
        debug!("📋 global {} {} v{}", id, name, version);
        self.globals.insert(
            id,
            GlobalInterface {
                id,
                name: name.to_string(),
                version,
            },
        );
    }

    /// Forget a revoked global
    pub fn remove(&mut self, id: u32) -> Option<GlobalInterface> {
        let removed = self.globals.remove(&id);
        match &removed {
            Some(global) => debug!("🗑️ global {} {} removed", id, global.name),
            None => debug!("global {} removed but was never recorded", id),
        }
        removed
    }

    /// Mark the initial roundtrip as complete; binding is allowed from here on
    pub fn mark_synced(&mut self) {
        self.synced = true;
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// Find a live global called `name` advertised at `min_version` or newer
    pub fn find(&self, name: &str, min_version: u32) -> Result<&GlobalInterface> {
        self.find_all(name, min_version)
            .min_by_key(|global| global.id)
            .ok_or_else(|| WindowError::missing(name, min_version))
    }

    /// Every live global called `name` at `min_version` or newer, e.g. all seats
    pub fn find_all<'a, 'b>(
        &'a self,
        name: &'b str,
        min_version: u32,
    ) -> impl Iterator<Item = &'a GlobalInterface> + 'b
    where
        'a: 'b,
    {
        self.globals
            .values()
            .filter(move |global| global.name == name && global.version >= min_version)
    }

    /// Bind the global for interface `I` at exactly `version`
    pub fn bind<I, U, D>(
        &self,
        registry: &WlRegistry,
        qh: &QueueHandle<D>,
        version: u32,
        udata: U,
    ) -> Result<I>
    where
        I: Proxy + 'static,
        U: Send + Sync + 'static,
        D: Dispatch<I, U> + 'static,
    {
        let name = I::interface().name;
        self.ensure_synced(name)?;
        let global = self.find(name, version)?;
        debug!("🔗 binding {} (global {}) at v{}", name, global.id, version);
        Ok(registry.bind::<I, U, D>(global.id, version, qh, udata))
    }

    /// Bind every advertised instance of `I`, e.g. one proxy per seat,
    /// paired with its global id
    pub fn bind_all<I, U, D>(
        &self,
        registry: &WlRegistry,
        qh: &QueueHandle<D>,
        version: u32,
        udata: impl Fn() -> U,
    ) -> Result<Vec<(u32, I)>>
    where
        I: Proxy + 'static,
        U: Send + Sync + 'static,
        D: Dispatch<I, U> + 'static,
    {
        let name = I::interface().name;
        self.ensure_synced(name)?;
        let mut ids: Vec<u32> = self.find_all(name, version).map(|g| g.id).collect();
        ids.sort_unstable();
        Ok(ids
            .into_iter()
            .map(|id| (id, registry.bind::<I, U, D>(id, version, qh, udata())))
            .collect())
    }

    /// Binding is only safe once the initial roundtrip has completed
    fn ensure_synced(&self, name: &str) -> Result<()> {
        if self.synced {
            return Ok(());
        }
        warn!("⚠️ bind of {} requested before the initial roundtrip", name);
        Err(WindowError::Protocol(format!(
            "bind of {} before the registry was synchronised",
            name
        )))
    }
}
