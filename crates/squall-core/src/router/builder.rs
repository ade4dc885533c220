//! Route declarations and their compilation into route tables

use super::error_responder::{ErrorResponder, JsonErrorResponder};
use super::table::{GroupTable, RouteTable};
use super::{NotFound, Router, UnmatchedPolicy};
use crate::date::DateHeaderCache;
use crate::error::RouterError;
use crate::http::{Method, StatusCode};
use crate::middleware::{apply_static, DynamicMiddleware, DynamicMiddlewareChain, StaticMiddleware};
use crate::response::RouteTemplate;
use crate::storage::{
    compile, DynamicHandler, DynamicResponder, DynamicRoute, HashedStaticStorage,
    StaticResponderStorage, StaticRoute,
};
use squall_router::{split_path, KeyWidth, PathComponent};
use std::sync::Arc;
use tracing::debug;

/// Routes, middleware and groups of one level
#[derive(Clone, Default)]
struct RouteSet {
    statics: Vec<StaticRoute>,
    dynamics: Vec<DynamicResponder>,
    middleware: DynamicMiddlewareChain,
    groups: Vec<RouteGroup>,
    /// First declaration error, reported by `build`
    error: Option<RouterError>,
}

/// Settings shared by every level while compiling
struct CompileContext<'a> {
    static_middleware: &'a [Arc<dyn StaticMiddleware>],
    allow_override: bool,
    width: KeyWidth,
    minimal: bool,
}

impl RouteSet {
    fn record(&mut self, result: Result<(), RouterError>) {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
    }

    fn add_dynamic(&mut self, route: DynamicRoute, handler: DynamicHandler, chain: DynamicMiddlewareChain) {
        self.dynamics
            .push(DynamicResponder::new(route, handler).with_middleware(chain));
    }

    fn add_dynamic_path(&mut self, method: Method, path: &str, handler: DynamicHandler) {
        match DynamicRoute::new(method, path) {
            Ok(route) => self.add_dynamic(route, handler, DynamicMiddlewareChain::new()),
            Err(err) => self.record(Err(err)),
        }
    }

    fn compile(
        &self,
        prefix: &[String],
        inherited: &DynamicMiddlewareChain,
        ctx: &CompileContext<'_>,
    ) -> Result<RouteTable, RouterError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let mut hashed = HashedStaticStorage::new();
        for route in &self.statics {
            route.validate()?;
            let mut route = route.clone();
            route.path = join_path(prefix, &route.path);
            route.template.head.version = route.version;
            apply_static(ctx.static_middleware, route.method, &mut route.template);
            let responder = route.template.compile()?;
            let line = route.start_line();
            if hashed.register(&line, route.case_sensitive, responder).is_some() && !ctx.allow_override {
                return Err(RouterError::DuplicateRoute {
                    route: String::from_utf8_lossy(&line).into_owned(),
                });
            }
        }

        let mut table = RouteTable::new(compile(&hashed, ctx.width, ctx.minimal));

        let chain = inherited.then(&self.middleware);
        for responder in &self.dynamics {
            let mut route = (*responder.route).clone();
            route.path = prefix
                .iter()
                .map(|literal| PathComponent::Literal(literal.clone()))
                .chain(route.path)
                .collect();
            route.template.head.version = route.version;
            apply_static(ctx.static_middleware, route.method, &mut route.template);
            route.template.head.validate()?;

            let storage = if route.case_sensitive {
                &mut table.dynamic_sensitive
            } else {
                &mut table.dynamic_insensitive
            };
            let responder = DynamicResponder::new(route, responder.handler.clone())
                .with_middleware(chain.then(&responder.middleware));
            storage.register(responder, ctx.allow_override)?;
        }

        for group in &self.groups {
            let mut group_prefix = prefix.to_vec();
            group_prefix.extend(group.prefix.iter().cloned());
            let nested = group.routes.compile(&group_prefix, &chain, ctx)?;
            debug!(prefix = %group.prefix_path(), routes = nested.len(), "route group compiled");
            table.groups.push(GroupTable {
                prefix: group_prefix,
                table: nested,
            });
        }

        Ok(table)
    }
}

/// `prefix` segments followed by `path`
fn join_path(prefix: &[String], path: &str) -> String {
    if prefix.is_empty() {
        return path.to_string();
    }
    let mut joined = String::new();
    for segment in prefix {
        joined.push('/');
        joined.push_str(segment);
    }
    if path != "/" {
        joined.push_str(path);
    }
    joined
}

/// Routes sharing a literal path prefix, with their own dynamic middleware.
///
/// Group routes are declared relative to the prefix and consulted only for
/// requests whose path starts with it, after the parent's own tiers.
#[derive(Clone)]
pub struct RouteGroup {
    prefix: Vec<String>,
    routes: RouteSet,
}

impl RouteGroup {
    /// `prefix` must be literal segments only (`/api/v1`)
    pub fn new(prefix: &str) -> Self {
        let mut routes = RouteSet::default();
        let segments: Vec<String> = split_path(prefix).map(str::to_string).collect();
        if !prefix.starts_with('/') || segments.iter().any(|s| s.starts_with([':', '*'])) {
            routes.record(Err(RouterError::InvalidRoute {
                route: prefix.to_string(),
                reason: "group prefix must be literal segments starting with '/'".to_string(),
            }));
        }
        Self {
            prefix: segments,
            routes,
        }
    }

    pub fn prefix_path(&self) -> String {
        join_path(&self.prefix, "/")
    }

    pub fn static_route(mut self, route: StaticRoute) -> Self {
        self.routes.statics.push(route);
        self
    }

    pub fn get_static(self, path: &str, template: RouteTemplate) -> Self {
        self.static_route(StaticRoute::get(path, template))
    }

    pub fn dynamic(mut self, route: DynamicRoute, handler: DynamicHandler) -> Self {
        self.routes.add_dynamic(route, handler, DynamicMiddlewareChain::new());
        self
    }

    /// Dynamic route with middleware of its own, run after the group's
    pub fn dynamic_with(mut self, route: DynamicRoute, handler: DynamicHandler, middleware: DynamicMiddlewareChain) -> Self {
        self.routes.add_dynamic(route, handler, middleware);
        self
    }

    pub fn get(mut self, path: &str, handler: DynamicHandler) -> Self {
        self.routes.add_dynamic_path(Method::Get, path, handler);
        self
    }

    pub fn post(mut self, path: &str, handler: DynamicHandler) -> Self {
        self.routes.add_dynamic_path(Method::Post, path, handler);
        self
    }

    pub fn middleware<M: DynamicMiddleware + 'static>(mut self, middleware: M) -> Self {
        self.routes.middleware.add(middleware);
        self
    }

    pub fn group(mut self, group: RouteGroup) -> Self {
        self.routes.groups.push(group);
        self
    }
}

/// Collects routes and settings, then compiles an immutable [`Router`]
#[derive(Clone)]
pub struct RouterBuilder {
    routes: RouteSet,
    static_middleware: Vec<Arc<dyn StaticMiddleware>>,
    not_found: Option<NotFoundDecl>,
    error_responder: Option<Arc<dyn ErrorResponder>>,
    unmatched: UnmatchedPolicy,
    allow_override: bool,
    width: KeyWidth,
    minimal: bool,
    dates: Option<Arc<DateHeaderCache>>,
}

#[derive(Clone)]
enum NotFoundDecl {
    Static(RouteTemplate),
    Dynamic(RouteTemplate, DynamicHandler),
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            routes: RouteSet::default(),
            static_middleware: Vec::new(),
            not_found: None,
            error_responder: Some(Arc::new(JsonErrorResponder)),
            unmatched: UnmatchedPolicy::default(),
            allow_override: false,
            width: KeyWidth::B8,
            minimal: false,
            dates: None,
        }
    }

    pub fn static_route(mut self, route: StaticRoute) -> Self {
        self.routes.statics.push(route);
        self
    }

    /// Case-sensitive `GET` static route
    pub fn get_static(self, path: &str, template: RouteTemplate) -> Self {
        self.static_route(StaticRoute::get(path, template))
    }

    /// Runs once per static route template at build time
    pub fn static_middleware<M: StaticMiddleware + 'static>(mut self, middleware: M) -> Self {
        self.static_middleware.push(Arc::new(middleware));
        self
    }

    pub fn dynamic(mut self, route: DynamicRoute, handler: DynamicHandler) -> Self {
        self.routes.add_dynamic(route, handler, DynamicMiddlewareChain::new());
        self
    }

    /// Dynamic route with middleware of its own, run after the global chain
    pub fn dynamic_with(mut self, route: DynamicRoute, handler: DynamicHandler, middleware: DynamicMiddlewareChain) -> Self {
        self.routes.add_dynamic(route, handler, middleware);
        self
    }

    pub fn get(mut self, path: &str, handler: DynamicHandler) -> Self {
        self.routes.add_dynamic_path(Method::Get, path, handler);
        self
    }

    pub fn post(mut self, path: &str, handler: DynamicHandler) -> Self {
        self.routes.add_dynamic_path(Method::Post, path, handler);
        self
    }

    pub fn put(mut self, path: &str, handler: DynamicHandler) -> Self {
        self.routes.add_dynamic_path(Method::Put, path, handler);
        self
    }

    pub fn delete(mut self, path: &str, handler: DynamicHandler) -> Self {
        self.routes.add_dynamic_path(Method::Delete, path, handler);
        self
    }

    /// Global dynamic middleware, run before group and route middleware
    pub fn middleware<M: DynamicMiddleware + 'static>(mut self, middleware: M) -> Self {
        self.routes.middleware.add(middleware);
        self
    }

    pub fn group(mut self, group: RouteGroup) -> Self {
        self.routes.groups.push(group);
        self
    }

    /// Static response for unmatched requests
    pub fn not_found(mut self, template: RouteTemplate) -> Self {
        self.not_found = Some(NotFoundDecl::Static(template));
        self
    }

    /// Handler for unmatched requests, starting from a 404 response
    pub fn not_found_handler(mut self, handler: DynamicHandler) -> Self {
        self.not_found = Some(NotFoundDecl::Dynamic(
            RouteTemplate::new(StatusCode::NOT_FOUND),
            handler,
        ));
        self
    }

    pub fn error_responder<R: ErrorResponder + 'static>(mut self, responder: R) -> Self {
        self.error_responder = Some(Arc::new(responder));
        self
    }

    /// Close the connection without a response when a responder fails
    pub fn without_error_responder(mut self) -> Self {
        self.error_responder = None;
        self
    }

    pub fn unmatched(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    /// Let later registrations replace earlier ones instead of failing
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    /// Starting key width for perfect-hash generation
    pub fn perfect_hash(mut self, width: KeyWidth) -> Self {
        self.width = width;
        self
    }

    /// Try tables of exactly one slot per route before power-of-two tables
    pub fn minimal_perfect_hash(mut self, minimal: bool) -> Self {
        self.minimal = minimal;
        self
    }

    /// Date cache spliced into dated responses (the global one by default)
    pub fn dates(mut self, dates: Arc<DateHeaderCache>) -> Self {
        self.dates = Some(dates);
        self
    }

    pub(crate) fn push_static(&mut self, route: StaticRoute) {
        self.routes.statics.push(route);
    }

    pub(crate) fn push_dynamic(&mut self, route: DynamicRoute, handler: DynamicHandler) {
        self.routes.add_dynamic(route, handler, DynamicMiddlewareChain::new());
    }

    pub fn build(&self) -> Result<Router, RouterError> {
        let ctx = CompileContext {
            static_middleware: &self.static_middleware,
            allow_override: self.allow_override,
            width: self.width,
            minimal: self.minimal,
        };
        let table = self.routes.compile(&[], &DynamicMiddlewareChain::new(), &ctx)?;

        let not_found = match &self.not_found {
            None => None,
            Some(NotFoundDecl::Static(template)) => {
                let mut template = template.clone();
                apply_static(&self.static_middleware, Method::Get, &mut template);
                Some(NotFound::Static(template.compile()?))
            }
            Some(NotFoundDecl::Dynamic(template, handler)) => {
                let route = DynamicRoute::new(Method::Get, "/*")?.template(template.clone());
                let responder = DynamicResponder::new(route, handler.clone())
                    .with_middleware(self.routes.middleware.clone());
                Some(NotFound::Dynamic(responder))
            }
        };

        let router = Router {
            table,
            not_found,
            error_responder: self.error_responder.clone(),
            unmatched: self.unmatched,
            dates: self
                .dates
                .clone()
                .unwrap_or_else(|| DateHeaderCache::global().clone()),
        };
        debug!(
            routes = router.route_count(),
            perfect_hash = router.table.statics.uses_perfect_hash(true),
            "router built"
        );
        Ok(router)
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
