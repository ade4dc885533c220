//! Runtime route registration
//!
//! Readers load the current [`Router`] snapshot lock-free; writers are
//! serialised and publish a rebuilt router. A dispatch racing a registration
//! may still see the previous snapshot.

use super::{Router, RouterBuilder};
use crate::error::RouterError;
use crate::storage::{DynamicHandler, DynamicRoute, StaticRoute};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct MutableRouter {
    current: ArcSwap<Router>,
    declarations: Mutex<RouterBuilder>,
}

impl MutableRouter {
    pub fn new(builder: RouterBuilder) -> Result<Self, RouterError> {
        let router = builder.build()?;
        Ok(Self {
            current: ArcSwap::new(Arc::new(router)),
            declarations: Mutex::new(builder),
        })
    }

    /// Current snapshot
    #[inline]
    pub fn load(&self) -> Arc<Router> {
        self.current.load_full()
    }

    /// Register a static route. On error the route is skipped and the
    /// current router stays in place.
    pub fn add_static(&self, route: StaticRoute) -> Result<(), RouterError> {
        self.update(|builder| builder.push_static(route))
    }

    pub fn add_dynamic(&self, route: DynamicRoute, handler: DynamicHandler) -> Result<(), RouterError> {
        self.update(|builder| builder.push_dynamic(route, handler))
    }

    fn update<F>(&self, declare: F) -> Result<(), RouterError>
    where
        F: FnOnce(&mut RouterBuilder),
    {
        let mut declarations = self.declarations.lock();
        let mut candidate = declarations.clone();
        declare(&mut candidate);

        match candidate.build() {
            Ok(router) => {
                debug!(routes = router.route_count(), "router updated");
                self.current.store(Arc::new(router));
                *declarations = candidate;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "route registration rejected");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for MutableRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableRouter")
            .field("current", &*self.current.load())
            .finish()
    }
}
