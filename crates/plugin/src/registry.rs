//! Measure instances keyed by the id handed to the host
//!
//! The host only ever sees an integer id. The shared [`PluginContext`] is
//! created with the first measure and released with the last one.

use crate::context::{PlatformFactory, PluginContext};
use crate::host::{HostApi, LogLevel};
use crate::measure::Measure;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifier of a measure instance; never zero
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeasureId(pub usize);

pub struct Registry {
    platform: PlatformFactory,
    context: Option<PluginContext>,
    measures: HashMap<MeasureId, Measure>,
    next_id: usize,
}

impl Registry {
    pub fn new(platform: PlatformFactory) -> Self {
        Self {
            platform,
            context: None,
            measures: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn context(&self) -> Option<&PluginContext> {
        self.context.as_ref()
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    /// Register a measure and make sure the session cache runs
    pub fn initialize(&mut self, host: Arc<dyn HostApi>) -> MeasureId {
        let id = MeasureId(self.next_id);
        self.next_id += 1;

        if self.context.is_none() {
            match PluginContext::create(host.as_ref(), &self.platform) {
                Ok(context) => self.context = Some(context),
                Err(e) => host.log(
                    LogLevel::Error,
                    &format!("NowPlaying.dll: Initialization failed: {:#}", e),
                ),
            }
        }

        if let Some(context) = &self.context {
            if let Err(e) = context.ensure_started() {
                host.log(
                    LogLevel::Warning,
                    &format!("NowPlaying.dll: Media sessions unavailable: {:#}", e),
                );
            }
        }

        self.measures.insert(id, Measure::new(host));
        debug!("Measure {:?} initialized", id);
        id
    }

    pub fn reload(&mut self, id: MeasureId) {
        match self.measures.get_mut(&id) {
            Some(measure) => measure.reload(),
            None => warn!("Reload for unknown measure {:?}", id),
        }
    }

    pub fn update(&self, id: MeasureId) -> f64 {
        let cache = self.context.as_ref().map(|c| c.cache().as_ref());
        self.measures
            .get(&id)
            .map_or(0.0, |measure| measure.update(cache))
    }

    pub fn string(&mut self, id: MeasureId) -> Option<&[u16]> {
        let cache = self.context.as_ref().map(|c| c.cache().as_ref());
        self.measures.get_mut(&id)?.string(cache)
    }

    pub fn execute_bang(&self, id: MeasureId, args: &str) {
        let cache = self.context.as_ref().map(|c| c.cache().as_ref());
        match self.measures.get(&id) {
            Some(measure) => measure.execute(cache, args),
            None => warn!("Bang for unknown measure {:?}", id),
        }
    }

    /// Drop a measure; the last one releases the shared context
    pub fn finalize(&mut self, id: MeasureId) {
        if self.measures.remove(&id).is_none() {
            warn!("Finalize for unknown measure {:?}", id);
        }
        if self.measures.is_empty() {
            if let Some(context) = self.context.take() {
                context.shutdown();
            }
        }
    }
}
